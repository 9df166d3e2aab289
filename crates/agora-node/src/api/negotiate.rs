//! Negotiation endpoint.

use agora_core::{cancel_pair, AgoraError, CancelHandle};
use agora_negotiate::{NegotiationReport, NegotiationRequest};
use axum::extract::State;
use axum::Json;
use tracing::info;

use super::ApiError;
use crate::state::AppState;

/// Cancels the negotiation it guards when dropped.
///
/// Axum drops the handler future when the client goes away; the workflow
/// itself runs in its own task, so it stops only if it has not paid yet.
pub struct CancelOnDrop(pub CancelHandle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Run one negotiation.
pub async fn negotiate(
    State(state): State<AppState>,
    Json(request): Json<NegotiationRequest>,
) -> Result<Json<NegotiationReport>, ApiError> {
    if request.task_type.trim().is_empty() {
        return Err(ApiError::bad_request("task_type must not be empty"));
    }

    let (handle, signal) = cancel_pair();
    let _guard = CancelOnDrop(handle);

    let workflow = state.workflow.clone();
    let task = tokio::spawn(async move { workflow.run(request, &signal).await });

    let report = task
        .await
        .map_err(|e| AgoraError::internal(format!("negotiation task failed: {}", e)))??;

    info!(mission = %report.mission_id, state = %report.state, "negotiation finished");
    Ok(Json(report))
}
