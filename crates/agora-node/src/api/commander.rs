//! Commander endpoint.

use std::sync::Arc;

use agora_core::{cancel_pair, AgoraError};
use agora_negotiate::{BudgetOrchestrator, CommanderConfig, CommanderRun, PhaseSpec};
use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use super::negotiate::CancelOnDrop;
use super::ApiError;
use crate::state::AppState;

/// Body of `POST /api/v1/commander`.
#[derive(Debug, Deserialize)]
pub struct CommanderRequest {
    /// Spending cap; the node default when absent.
    #[serde(default, with = "agora_core::amount::option")]
    pub cap: Option<u128>,
    pub phases: Vec<PhaseSpec>,
    #[serde(default)]
    pub halt_on_failure: Option<bool>,
}

/// Run commander phases under one cap.
pub async fn run_commander(
    State(state): State<AppState>,
    Json(request): Json<CommanderRequest>,
) -> Result<Json<CommanderRun>, ApiError> {
    if request.phases.is_empty() {
        return Err(ApiError::bad_request("at least one phase is required"));
    }

    let cap = request.cap.unwrap_or(state.config.commander_cap);
    let config = CommanderConfig {
        halt_on_failure: request.halt_on_failure.unwrap_or_default(),
    };
    let orchestrator = Arc::new(BudgetOrchestrator::with_config(state.workflow.clone(), config));

    let (handle, signal) = cancel_pair();
    let _guard = CancelOnDrop(handle);

    let phases = request.phases;
    let task = tokio::spawn(async move { orchestrator.run(cap, phases, &signal).await });
    let run = task
        .await
        .map_err(|e| AgoraError::internal(format!("commander task failed: {}", e)))?;

    Ok(Json(run))
}
