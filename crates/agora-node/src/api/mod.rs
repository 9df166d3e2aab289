//! HTTP API.

pub mod commander;
pub mod feedback;
pub mod health;
pub mod negotiate;
pub mod seller;
pub mod services;
pub mod wallet;
pub mod ws;

use agora_core::{AgoraError, ErrorBody, PaymentTx, WorkflowState};
use agora_negotiate::NegotiationFailure;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Error response: an `ErrorBody`, plus the workflow state and any payment
/// already made when a negotiation aborted.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: FailureBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FailureBody {
    #[serde(flatten)]
    error: ErrorBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<WorkflowState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment: Option<PaymentTx>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AgoraError::Internal {
            status: 400,
            code: "INVALID_REQUEST".to_string(),
            message: message.into(),
            details: serde_json::Value::Null,
        }
        .into()
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AgoraError::Internal {
            status: 404,
            code: "NOT_FOUND".to_string(),
            message: message.into(),
            details: serde_json::Value::Null,
        }
        .into()
    }
}

fn status_of(error: &AgoraError) -> StatusCode {
    StatusCode::from_u16(error.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl From<AgoraError> for ApiError {
    fn from(error: AgoraError) -> Self {
        Self {
            status: status_of(&error),
            body: FailureBody {
                error: error.to_body(),
                state: None,
                payment: None,
            },
        }
    }
}

impl From<NegotiationFailure> for ApiError {
    fn from(failure: NegotiationFailure) -> Self {
        Self {
            status: status_of(&failure.error),
            body: FailureBody {
                error: failure.error.to_body(),
                state: Some(failure.state),
                payment: failure.payment,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
