//! Interfaces to the collaborators a negotiation talks to.
//!
//! Registry transport, seller HTTP and on-chain publication live outside the
//! core; these traits are the seams. HTTP implementations are in `agora-sdk`.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CounterpartyIdentity, Delivery, Feedback, PaymentTx, Quote, ServiceInfo};

/// Service discovery. The core only ever reads from it.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Advertise a service for `ttl`.
    async fn advertise(&self, service: ServiceInfo, ttl: Duration) -> Result<()>;

    /// All live services for a task type, in registry order.
    async fn lookup(&self, task_type: &str) -> Result<Vec<ServiceInfo>>;
}

/// Informational lookups against a seller's own endpoint.
///
/// Both return `None` for "unknown": timeouts, non-2xx, bad payloads.
#[async_trait]
pub trait ServiceProbe: Send + Sync {
    /// `GET {endpoint}/reputation` → `{average}`.
    async fn reputation(&self, endpoint: &str) -> Option<f64>;

    /// `GET {endpoint}/identity` → `{identity:{agentId}, onchain:{agentTokenId}}`.
    async fn identity(&self, endpoint: &str) -> Option<CounterpartyIdentity>;
}

/// The paid-request protocol of a seller.
#[async_trait]
pub trait SellerClient: Send + Sync {
    /// Ask for the payment requirement of a task.
    async fn request_quote(&self, service: &ServiceInfo, task: &serde_json::Value) -> Result<Quote>;

    /// Present proof of payment and receive the result with its receipt.
    async fn execute(
        &self,
        service: &ServiceInfo,
        task: &serde_json::Value,
        payment: &PaymentTx,
    ) -> Result<Delivery>;
}

/// Optional downstream copy of recorded feedback, e.g. an on-chain registry.
#[async_trait]
pub trait FeedbackPublisher: Send + Sync {
    async fn publish(&self, feedback: &Feedback) -> Result<()>;
}
