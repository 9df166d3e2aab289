//! Demo seller endpoints, mounted under `/seller`.

use std::sync::Arc;

use agora_core::PaymentTx;
use agora_sdk::PAYMENT_HEADER;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use super::ApiError;
use crate::seller::DemoSeller;
use crate::state::AppState;

fn demo_seller(state: &AppState) -> Result<Arc<DemoSeller>, ApiError> {
    state
        .seller
        .clone()
        .ok_or_else(|| ApiError::not_found("demo seller is disabled"))
}

fn payment_required(message: impl Into<String>) -> Response {
    (
        StatusCode::PAYMENT_REQUIRED,
        Json(json!({ "code": "PAYMENT_INVALID", "message": message.into() })),
    )
        .into_response()
}

/// Quote without `X-Payment`, deliver with it.
pub async fn task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(task): Json<Value>,
) -> Result<Response, ApiError> {
    let seller = demo_seller(&state)?;

    let Some(proof) = headers.get(PAYMENT_HEADER) else {
        return Ok((StatusCode::PAYMENT_REQUIRED, Json(seller.quote(&task))).into_response());
    };

    let payment = match proof.to_str().ok().map(serde_json::from_str::<PaymentTx>) {
        Some(Ok(payment)) => payment,
        _ => return Ok(payment_required("X-Payment is not a payment JSON")),
    };

    match seller.deliver(&task, &payment).await {
        Ok(delivery) => Ok(Json(delivery).into_response()),
        Err(e) => Ok(payment_required(e.to_string())),
    }
}

/// `{average}` over this seller's recorded feedback.
pub async fn reputation(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(demo_seller(&state)?.reputation().await?))
}

pub async fn identity(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(demo_seller(&state)?.identity()))
}
