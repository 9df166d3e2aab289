//! Agora node client implementation.

use agora_core::{AgentIdentity, AgoraError, ErrorBody, Feedback, FeedbackSummary, Result, ServiceInfo};
use agora_negotiate::{CommanderRun, NegotiationReport, NegotiationRequest, PhaseSpec};
use agora_settle::Balance;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::stream::TraceStream;

/// Client for interacting with an Agora node.
#[derive(Clone)]
pub struct AgoraClient {
    /// Base URL of the node.
    base_url: String,

    /// HTTP client.
    http_client: reqwest::Client,
}

/// Wallet as reported by the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletInfo {
    pub address: String,
    pub balance: Balance,
    #[serde(default)]
    pub identity: Option<AgentIdentity>,
}

/// Body of `POST /api/v1/commander`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommanderRequest {
    #[serde(default, with = "agora_core::amount::option")]
    pub cap: Option<u128>,
    pub phases: Vec<PhaseSpec>,
    #[serde(default)]
    pub halt_on_failure: Option<bool>,
}

/// Body of `POST /api/v1/services`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvertiseRequest {
    pub service: ServiceInfo,
    pub ttl_secs: u64,
}

fn connection_error(error: reqwest::Error) -> AgoraError {
    AgoraError::Internal {
        status: 503,
        code: "CONNECTION_ERROR".to_string(),
        message: error.to_string(),
        details: serde_json::Value::Null,
    }
}

impl AgoraClient {
    /// Connect to a node, checking `/health` first.
    pub async fn connect(url: &str) -> Result<Self> {
        let base_url = url.trim_end_matches('/').to_string();
        let http_client = reqwest::Client::new();

        http_client
            .get(format!("{}/health", base_url))
            .send()
            .await
            .map_err(connection_error)?
            .error_for_status()
            .map_err(connection_error)?;

        Ok(Self {
            base_url,
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run one negotiation on the node.
    pub async fn negotiate(&self, request: &NegotiationRequest) -> Result<NegotiationReport> {
        let response = self
            .http_client
            .post(format!("{}/api/v1/negotiate", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(connection_error)?;
        read(response).await
    }

    /// Run commander phases under `cap` (the node default when `None`).
    pub async fn commander(&self, cap: Option<u128>, phases: Vec<PhaseSpec>) -> Result<CommanderRun> {
        let request = CommanderRequest {
            cap,
            phases,
            halt_on_failure: None,
        };
        let response = self
            .http_client
            .post(format!("{}/api/v1/commander", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(connection_error)?;
        read(response).await
    }

    /// Live services for a task type.
    pub async fn services(&self, task_type: &str) -> Result<Vec<ServiceInfo>> {
        let response = self
            .http_client
            .get(format!("{}/api/v1/services/{}", self.base_url, task_type))
            .send()
            .await
            .map_err(connection_error)?;
        read(response).await
    }

    /// Advertise a service in the node's registry.
    pub async fn advertise(&self, service: ServiceInfo, ttl_secs: u64) -> Result<()> {
        let response = self
            .http_client
            .post(format!("{}/api/v1/services", self.base_url))
            .json(&AdvertiseRequest { service, ttl_secs })
            .send()
            .await
            .map_err(connection_error)?;
        read::<serde_json::Value>(response).await.map(|_| ())
    }

    /// All feedback recorded for an agent.
    pub async fn feedback(&self, agent_id: &str) -> Result<Vec<Feedback>> {
        let response = self
            .http_client
            .get(format!("{}/api/v1/feedback/{}", self.base_url, agent_id))
            .send()
            .await
            .map_err(connection_error)?;
        read(response).await
    }

    pub async fn feedback_summary(&self, agent_id: &str) -> Result<FeedbackSummary> {
        let response = self
            .http_client
            .get(format!("{}/api/v1/feedback/{}/summary", self.base_url, agent_id))
            .send()
            .await
            .map_err(connection_error)?;
        read(response).await
    }

    pub async fn wallet(&self) -> Result<WalletInfo> {
        let response = self
            .http_client
            .get(format!("{}/api/v1/wallet", self.base_url))
            .send()
            .await
            .map_err(connection_error)?;
        read(response).await
    }

    /// Subscribe to the node's live trace.
    pub async fn trace(&self) -> Result<TraceStream> {
        let ws_url = format!(
            "{}/ws/trace",
            self.base_url.replace("http://", "ws://").replace("https://", "wss://")
        );
        TraceStream::connect(&ws_url).await
    }
}

/// Decode a success body, or turn an `ErrorBody` back into an error.
async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.map_err(|e| AgoraError::Internal {
            status: 502,
            code: "BAD_RESPONSE".to_string(),
            message: e.to_string(),
            details: serde_json::Value::Null,
        });
    }

    let text = response.text().await.unwrap_or_default();
    Err(remote_error(status.as_u16(), &text))
}

fn remote_error(status: u16, text: &str) -> AgoraError {
    match serde_json::from_str::<ErrorBody>(text) {
        Ok(body) => AgoraError::Internal {
            status,
            code: body.code,
            message: body.message,
            details: body.details,
        },
        Err(_) => AgoraError::Internal {
            status,
            code: "HTTP_ERROR".to_string(),
            message: text.to_string(),
            details: serde_json::Value::Null,
        },
    }
}
