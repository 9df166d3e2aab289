//! # Agora SDK
//!
//! HTTP implementations of the negotiation collaborators, plus a client for
//! Agora nodes.

pub mod client;
pub mod http;
pub mod stream;

pub use client::{AgoraClient, WalletInfo};
pub use http::{HttpFeedbackPublisher, HttpSellerClient, HttpServiceProbe, PAYMENT_HEADER};
pub use stream::TraceStream;

/// Prelude module for common imports.
pub mod prelude {
    pub use crate::client::AgoraClient;
    pub use crate::stream::TraceStream;
    pub use agora_core::prelude::*;
}
