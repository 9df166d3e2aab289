//! Common types used across Agora.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::receipt::Receipt;

/// Direction of recent change in a counterparty's reputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Flat,
}

/// Prior reputation summary attached to a discovered service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationSummary {
    /// Average rating on a 0–5 scale.
    pub score: f64,

    /// Recent direction of the rating.
    #[serde(default)]
    pub trend: Trend,

    /// Number of ratings the average is built from.
    pub sample_count: u32,
}

/// A candidate seller, as returned by one discovery round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    /// Unique identifier of the service.
    pub id: String,

    /// Chain-style network identifier (e.g. "eip155:84532").
    pub network_id: String,

    /// Address that receives payment and signs receipts.
    pub provider_address: String,

    /// Base URL of the seller.
    pub endpoint: String,

    /// Declared task type.
    pub task_type: String,

    /// Advertised price in minor units.
    #[serde(with = "crate::amount")]
    pub price: u128,

    /// Currency of the price.
    pub currency: String,

    /// Prior reputation, if the registry knows one.
    #[serde(default)]
    pub reputation: Option<ReputationSummary>,
}

impl ServiceInfo {
    /// Trend from the prior summary, if any.
    pub fn trend(&self) -> Option<Trend> {
        self.reputation.as_ref().map(|r| r.trend)
    }

    /// Identity used when the seller does not advertise one.
    pub fn fallback_agent_id(&self) -> String {
        format!("{}:{}", self.network_id, self.provider_address).to_lowercase()
    }
}

/// A seller's payment requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Payment method identifier.
    pub scheme: String,

    /// Unit being transferred.
    pub asset: String,

    /// Required amount in minor units.
    #[serde(with = "crate::amount")]
    pub amount: u128,

    /// Address to pay.
    pub pay_to: String,

    /// Task context the quote refers to.
    #[serde(default)]
    pub task: serde_json::Value,
}

/// Result of a settled payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTx {
    pub tx_hash: String,
    pub from: String,
    pub to: String,
    #[serde(with = "crate::amount")]
    pub amount: u128,
}

/// What a seller hands back once paid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    /// The delivered work.
    pub result: String,

    /// Seller-signed attestation over the result.
    pub receipt: Receipt,
}

/// Score for delivered work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub score: f64,
    pub summary: String,
}

impl Evaluation {
    /// Feedback value derived from this evaluation: round(score × 10) in [0,100].
    pub fn feedback_value(&self) -> u8 {
        let scaled = (self.score * 10.0).round();
        if scaled.is_nan() {
            return 0;
        }
        scaled.clamp(0.0, 100.0) as u8
    }
}

/// One feedback entry about a counterparty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub agent_id: String,
    pub value: u8,
    pub tags: Vec<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub mission_id: Option<Uuid>,
    #[serde(default)]
    pub task_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate of all feedback recorded for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSummary {
    pub count: usize,
    pub average: f64,
    pub latest: Option<Feedback>,
}

/// Identity a counterparty advertises at `GET {endpoint}/identity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterpartyIdentity {
    pub agent_id: String,
    #[serde(default)]
    pub agent_token_id: Option<String>,
}

/// The buyer agent's own identity.
///
/// `registered_at` is supplied by whoever constructs the identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentIdentity {
    pub agent_id: String,
    pub address: String,
    pub network_id: String,
    pub registered_at: DateTime<Utc>,
}

impl AgentIdentity {
    pub fn new(
        agent_id: impl Into<String>,
        address: impl Into<String>,
        network_id: impl Into<String>,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            address: address.into(),
            network_id: network_id.into(),
            registered_at,
        }
    }
}

/// State of a negotiation workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Discovering,
    Selecting,
    Quoting,
    Paying,
    Executing,
    Verifying,
    Evaluating,
    Feedback,
    Done,
    Disputed,
}

impl WorkflowState {
    /// Returns true once money may have left the wallet.
    pub fn is_past_payment(&self) -> bool {
        !matches!(
            self,
            WorkflowState::Discovering
                | WorkflowState::Selecting
                | WorkflowState::Quoting
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Discovering => "discovering",
            WorkflowState::Selecting => "selecting",
            WorkflowState::Quoting => "quoting",
            WorkflowState::Paying => "paying",
            WorkflowState::Executing => "executing",
            WorkflowState::Verifying => "verifying",
            WorkflowState::Evaluating => "evaluating",
            WorkflowState::Feedback => "feedback",
            WorkflowState::Done => "done",
            WorkflowState::Disputed => "disputed",
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
