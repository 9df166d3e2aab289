//! Error types for Agora.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Agora operations.
#[derive(Error, Debug, Clone)]
pub enum AgoraError {
    /// No candidate services were available to select from.
    #[error("No candidate services available for task '{task_type}'")]
    NoCandidates { task_type: String },

    /// The quote asks for a payment scheme or asset this agent cannot settle.
    #[error("Unsupported payment scheme '{scheme}' / asset '{asset}'")]
    UnsupportedPaymentScheme { scheme: String, asset: String },

    /// The wallet does not hold enough funds for the quoted amount.
    #[error("Insufficient balance: have {balance}, need {required}")]
    InsufficientBalance { balance: u128, required: u128 },

    /// A receipt is missing one of its required fields.
    #[error("Malformed receipt: missing {field}")]
    MalformedReceipt { field: String },

    /// A payment would push commander spending over its cap.
    #[error("Budget exceeded: cap {cap}, spent {spent}, required {required}")]
    BudgetExceeded { cap: u128, spent: u128, required: u128 },

    /// A network operation did not finish in time.
    #[error("Operation '{operation}' timed out after {duration_ms}ms")]
    NetworkTimeout { operation: String, duration_ms: u64 },

    /// The workflow was cancelled before payment.
    #[error("Negotiation cancelled during {state}")]
    Cancelled { state: String },

    /// The seller endpoint failed or answered with something unusable.
    #[error("Seller error: {message}")]
    Seller { message: String },

    /// The quote failed a sanity check against the selected service.
    #[error("Quote rejected: {reason}")]
    QuoteRejected { reason: String },

    /// Catch-all for unexpected failures.
    #[error("Internal error: {message}")]
    Internal {
        status: u16,
        code: String,
        message: String,
        details: serde_json::Value,
    },
}

/// Discriminant of [`AgoraError`], suitable for exhaustive matching and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoCandidates,
    UnsupportedPaymentScheme,
    InsufficientBalance,
    MalformedReceipt,
    BudgetExceeded,
    NetworkTimeout,
    Cancelled,
    Seller,
    QuoteRejected,
    Internal,
}

impl AgoraError {
    /// Wrap an unexpected failure.
    pub fn internal(message: impl Into<String>) -> Self {
        AgoraError::Internal {
            status: 500,
            code: "INTERNAL_ERROR".to_string(),
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgoraError::NoCandidates { .. } => ErrorKind::NoCandidates,
            AgoraError::UnsupportedPaymentScheme { .. } => ErrorKind::UnsupportedPaymentScheme,
            AgoraError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            AgoraError::MalformedReceipt { .. } => ErrorKind::MalformedReceipt,
            AgoraError::BudgetExceeded { .. } => ErrorKind::BudgetExceeded,
            AgoraError::NetworkTimeout { .. } => ErrorKind::NetworkTimeout,
            AgoraError::Cancelled { .. } => ErrorKind::Cancelled,
            AgoraError::Seller { .. } => ErrorKind::Seller,
            AgoraError::QuoteRejected { .. } => ErrorKind::QuoteRejected,
            AgoraError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// HTTP-style status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            AgoraError::NoCandidates { .. } => 404,
            AgoraError::UnsupportedPaymentScheme { .. } => 400,
            AgoraError::InsufficientBalance { .. } => 402,
            AgoraError::MalformedReceipt { .. } => 422,
            AgoraError::BudgetExceeded { .. } => 402,
            AgoraError::NetworkTimeout { .. } => 504,
            AgoraError::Cancelled { .. } => 499,
            AgoraError::Seller { .. } => 502,
            AgoraError::QuoteRejected { .. } => 409,
            AgoraError::Internal { status, .. } => *status,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &str {
        match self {
            AgoraError::NoCandidates { .. } => "NO_CANDIDATES",
            AgoraError::UnsupportedPaymentScheme { .. } => "UNSUPPORTED_PAYMENT_SCHEME",
            AgoraError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            AgoraError::MalformedReceipt { .. } => "MALFORMED_RECEIPT",
            AgoraError::BudgetExceeded { .. } => "BUDGET_EXCEEDED",
            AgoraError::NetworkTimeout { .. } => "NETWORK_TIMEOUT",
            AgoraError::Cancelled { .. } => "CANCELLED",
            AgoraError::Seller { .. } => "SELLER_ERROR",
            AgoraError::QuoteRejected { .. } => "QUOTE_REJECTED",
            AgoraError::Internal { code, .. } => code,
        }
    }

    /// Structured details for rendering without re-deriving the failure.
    pub fn details(&self) -> serde_json::Value {
        match self {
            AgoraError::NoCandidates { task_type } => {
                serde_json::json!({ "taskType": task_type })
            }
            AgoraError::UnsupportedPaymentScheme { scheme, asset } => {
                serde_json::json!({ "scheme": scheme, "asset": asset })
            }
            AgoraError::InsufficientBalance { balance, required } => serde_json::json!({
                "balanceWei": balance.to_string(),
                "requiredWei": required.to_string(),
            }),
            AgoraError::MalformedReceipt { field } => serde_json::json!({ "field": field }),
            AgoraError::BudgetExceeded { cap, spent, required } => serde_json::json!({
                "capWei": cap.to_string(),
                "spentWei": spent.to_string(),
                "requiredWei": required.to_string(),
            }),
            AgoraError::NetworkTimeout { operation, duration_ms } => {
                serde_json::json!({ "operation": operation, "durationMs": duration_ms })
            }
            AgoraError::Cancelled { state } => serde_json::json!({ "state": state }),
            AgoraError::Seller { .. } | AgoraError::QuoteRejected { .. } => serde_json::Value::Null,
            AgoraError::Internal { details, .. } => details.clone(),
        }
    }

    /// Serializable rendering of this error.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }
}

/// Wire form of an error: code, message and optional details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

/// Convenience Result type for Agora operations.
pub type Result<T> = std::result::Result<T, AgoraError>;

impl From<serde_json::Error> for AgoraError {
    fn from(err: serde_json::Error) -> Self {
        AgoraError::Internal {
            status: 500,
            code: "SERIALIZATION_ERROR".to_string(),
            message: err.to_string(),
            details: serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_balance_details() {
        let err = AgoraError::InsufficientBalance {
            balance: 50,
            required: 100,
        };

        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert_eq!(err.code(), "INSUFFICIENT_BALANCE");
        assert_eq!(err.status(), 402);
        assert_eq!(
            err.details(),
            serde_json::json!({ "balanceWei": "50", "requiredWei": "100" })
        );
    }

    #[test]
    fn test_internal_carries_its_own_code() {
        let err = AgoraError::Internal {
            status: 503,
            code: "LEDGER_UNAVAILABLE".to_string(),
            message: "ledger down".to_string(),
            details: serde_json::json!({ "retryAfter": 5 }),
        };

        assert_eq!(err.status(), 503);
        assert_eq!(err.code(), "LEDGER_UNAVAILABLE");
        assert_eq!(err.to_body().details["retryAfter"], 5);
    }

    #[test]
    fn test_body_omits_null_details() {
        let body = AgoraError::Seller {
            message: "bad gateway".to_string(),
        }
        .to_body();
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("details"));
        assert!(json.contains("SELLER_ERROR"));
    }
}
