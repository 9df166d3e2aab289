//! Feedback ledger endpoints.

use agora_core::{Feedback, FeedbackSummary};
use agora_ledger::FeedbackLedger;
use axum::extract::{Path, State};
use axum::Json;

use super::ApiError;
use crate::state::AppState;

/// Every entry recorded for an agent, oldest first.
pub async fn list_feedback(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<Vec<Feedback>>, ApiError> {
    Ok(Json(state.ledger.list_by_agent(&agent_id).await?))
}

/// Count, average and latest entry for an agent.
pub async fn feedback_summary(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<FeedbackSummary>, ApiError> {
    Ok(Json(state.ledger.summary(&agent_id).await?))
}
