//! HTTP implementations of the negotiation collaborators.

use std::time::Duration;

use agora_core::{
    AgoraError, CounterpartyIdentity, Delivery, Feedback, FeedbackPublisher, PaymentTx, Quote,
    Receipt, Result, SellerClient, ServiceInfo, ServiceProbe,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

/// Header carrying the JSON-encoded payment proof on the paid retry.
pub const PAYMENT_HEADER: &str = "X-Payment";

/// Default deadline for informational lookups.
pub const INFO_TIMEOUT: Duration = Duration::from_millis(1200);

fn join(endpoint: &str, path: &str) -> String {
    format!("{}/{}", endpoint.trim_end_matches('/'), path)
}

fn transport_error(operation: &str, timeout: Duration, error: reqwest::Error) -> AgoraError {
    if error.is_timeout() {
        AgoraError::NetworkTimeout {
            operation: operation.to_string(),
            duration_ms: timeout.as_millis() as u64,
        }
    } else {
        AgoraError::Seller {
            message: format!("{} failed: {}", operation, error),
        }
    }
}

/// Reads `/reputation` and `/identity` from seller endpoints.
///
/// Every call is a single request with a hard deadline; any failure is `None`.
#[derive(Clone)]
pub struct HttpServiceProbe {
    http_client: reqwest::Client,
}

impl HttpServiceProbe {
    pub fn new() -> Self {
        Self::with_timeout(INFO_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { http_client }
    }

    async fn get_json(&self, url: &str) -> Option<Value> {
        let response = match self.http_client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(url, error = %e, "probe failed");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(url, status = %response.status(), "probe answered non-2xx");
            return None;
        }
        response.json().await.ok()
    }
}

impl Default for HttpServiceProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceProbe for HttpServiceProbe {
    async fn reputation(&self, endpoint: &str) -> Option<f64> {
        let body = self.get_json(&join(endpoint, "reputation")).await?;
        parse_reputation(&body)
    }

    async fn identity(&self, endpoint: &str) -> Option<CounterpartyIdentity> {
        let body = self.get_json(&join(endpoint, "identity")).await?;
        parse_identity(&body)
    }
}

/// `{average}` → finite average, anything else → `None`.
pub fn parse_reputation(body: &Value) -> Option<f64> {
    body.get("average")?.as_f64().filter(|v| v.is_finite())
}

/// `{identity:{agentId}, onchain:{agentTokenId}}` → identity.
pub fn parse_identity(body: &Value) -> Option<CounterpartyIdentity> {
    let agent_id = body
        .pointer("/identity/agentId")?
        .as_str()
        .map(str::trim)
        .filter(|id| !id.is_empty())?
        .to_string();

    let agent_token_id = match body.pointer("/onchain/agentTokenId") {
        Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    };

    Some(CounterpartyIdentity {
        agent_id,
        agent_token_id,
    })
}

/// Talks the quote-then-pay protocol: `POST {endpoint}/task` answers 402 with
/// a quote, and the same request with an `X-Payment` header answers 200 with
/// `{result, receipt}`.
#[derive(Clone)]
pub struct HttpSellerClient {
    http_client: reqwest::Client,
    quote_timeout: Duration,
    execute_timeout: Duration,
}

impl HttpSellerClient {
    pub fn new() -> Self {
        Self::with_timeouts(INFO_TIMEOUT, Duration::from_secs(60))
    }

    pub fn with_timeouts(quote_timeout: Duration, execute_timeout: Duration) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            quote_timeout,
            execute_timeout,
        }
    }
}

impl Default for HttpSellerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SellerClient for HttpSellerClient {
    async fn request_quote(&self, service: &ServiceInfo, task: &Value) -> Result<Quote> {
        let url = join(&service.endpoint, "task");
        let response = self
            .http_client
            .post(&url)
            .timeout(self.quote_timeout)
            .json(task)
            .send()
            .await
            .map_err(|e| transport_error("quote", self.quote_timeout, e))?;

        let status = response.status();
        if status != StatusCode::PAYMENT_REQUIRED {
            let text = response.text().await.unwrap_or_default();
            return Err(AgoraError::Seller {
                message: format!("expected 402 with a quote, got {}: {}", status, text),
            });
        }

        response.json::<Quote>().await.map_err(|e| AgoraError::Seller {
            message: format!("unreadable quote: {}", e),
        })
    }

    async fn execute(&self, service: &ServiceInfo, task: &Value, payment: &PaymentTx) -> Result<Delivery> {
        let url = join(&service.endpoint, "task");
        let proof = serde_json::to_string(payment)?;
        let response = self
            .http_client
            .post(&url)
            .timeout(self.execute_timeout)
            .header(PAYMENT_HEADER, proof)
            .json(task)
            .send()
            .await
            .map_err(|e| transport_error("execute", self.execute_timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AgoraError::Seller {
                message: format!("paid request failed with {}: {}", status, text),
            });
        }

        let body: Value = response.json().await.map_err(|e| AgoraError::Seller {
            message: format!("unreadable delivery: {}", e),
        })?;
        parse_delivery(body)
    }
}

/// `{result, receipt}` → delivery, reporting receipt fields that are missing.
pub fn parse_delivery(mut body: Value) -> Result<Delivery> {
    let result = match body.get("result") {
        Some(Value::String(text)) => text.clone(),
        Some(other) if !other.is_null() => other.to_string(),
        _ => {
            return Err(AgoraError::Seller {
                message: "delivery has no result".to_string(),
            })
        }
    };
    let receipt = Receipt::from_value(body.get_mut("receipt").map(Value::take).unwrap_or(Value::Null))?;
    Ok(Delivery { result, receipt })
}

/// Posts recorded feedback to a remote reputation service.
#[derive(Clone)]
pub struct HttpFeedbackPublisher {
    url: String,
    http_client: reqwest::Client,
}

impl HttpFeedbackPublisher {
    pub fn new(url: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(INFO_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            http_client,
        }
    }
}

#[async_trait]
impl FeedbackPublisher for HttpFeedbackPublisher {
    async fn publish(&self, feedback: &Feedback) -> Result<()> {
        let response = self
            .http_client
            .post(&self.url)
            .json(feedback)
            .send()
            .await
            .map_err(|e| transport_error("publish feedback", INFO_TIMEOUT, e))?;

        if !response.status().is_success() {
            return Err(AgoraError::internal(format!(
                "feedback publication rejected with {}",
                response.status()
            )));
        }
        Ok(())
    }
}
