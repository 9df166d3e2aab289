//! Registry endpoints.

use agora_core::{ServiceInfo, ServiceRegistry};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ApiError;
use crate::state::AppState;

/// Body of `POST /api/v1/services`.
#[derive(Debug, Deserialize)]
pub struct AdvertiseRequest {
    pub service: ServiceInfo,
    /// Listing lifetime; the node default when absent.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertiseResponse {
    pub id: String,
    pub ttl_secs: u64,
}

/// Live services for a task type.
pub async fn list_services(
    State(state): State<AppState>,
    Path(task_type): Path<String>,
) -> Result<Json<Vec<ServiceInfo>>, ApiError> {
    Ok(Json(state.registry.lookup(&task_type).await?))
}

/// Advertise a service.
pub async fn advertise_service(
    State(state): State<AppState>,
    Json(request): Json<AdvertiseRequest>,
) -> Result<(StatusCode, Json<AdvertiseResponse>), ApiError> {
    let ttl_secs = request.ttl_secs.unwrap_or(state.config.service_ttl_secs);
    if ttl_secs == 0 {
        return Err(ApiError::bad_request("ttl_secs must be positive"));
    }
    let service = request.service;
    if service.id.trim().is_empty() || service.task_type.trim().is_empty() {
        return Err(ApiError::bad_request("service id and task type are required"));
    }
    if agora_core::receipt::normalize_address(&service.provider_address).is_none() {
        return Err(ApiError::bad_request("provider address is not a 20-byte hex address"));
    }

    let id = service.id.clone();
    state
        .registry
        .advertise(service, Duration::from_secs(ttl_secs))
        .await?;

    Ok((StatusCode::CREATED, Json(AdvertiseResponse { id, ttl_secs })))
}
