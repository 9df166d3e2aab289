//! # Agora Core
//!
//! Core types and primitives for buyer-agent negotiation.
//!
//! This crate provides the fundamental building blocks:
//! - [`ServiceInfo`], [`Quote`], [`PaymentTx`], [`Feedback`] - the data model
//! - [`Receipt`] - seller-signed delivery attestation and its verification
//! - [`CommanderBudget`] - spending ceiling across commander phases
//! - [`TraceEvent`] - ordered lifecycle events
//! - [`AgoraError`] - closed error type with stable codes

pub mod amount;
pub mod budget;
pub mod cancel;
pub mod collab;
pub mod error;
pub mod receipt;
pub mod trace;
pub mod types;

// Re-exports for convenience
pub use budget::CommanderBudget;
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use collab::{FeedbackPublisher, SellerClient, ServiceProbe, ServiceRegistry};
pub use error::{AgoraError, ErrorBody, ErrorKind, Result};
pub use receipt::{LocalSigner, Receipt, ReceiptVerification};
pub use trace::{LogTrace, MemoryTrace, TraceEvent, TraceEventType, TraceSink};
pub use types::*;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::budget::CommanderBudget;
    pub use crate::error::{AgoraError, ErrorKind, Result};
    pub use crate::receipt::{Receipt, ReceiptVerification};
    pub use crate::types::{
        Evaluation, Feedback, PaymentTx, Quote, ServiceInfo, Trend, WorkflowState,
    };
}
