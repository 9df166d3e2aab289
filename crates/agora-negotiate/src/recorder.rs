//! Feedback recording against a counterparty identity.

use std::sync::Arc;
use std::time::Duration;

use agora_core::{
    Evaluation, Feedback, FeedbackPublisher, Result, ServiceInfo, ServiceProbe,
};
use agora_ledger::FeedbackLedger;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Tags every automatically recorded delivery carries.
pub const BASE_TAGS: [&str; 2] = ["auto", "delivery"];

/// What the feedback is about, beyond the evaluation itself.
#[derive(Debug, Clone, Default)]
pub struct FeedbackContext {
    pub mission_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub text: Option<String>,
}

/// Feedback as recorded. `published` is `None` when no publisher is configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFeedback {
    pub feedback: Feedback,
    pub agent_token_id: Option<String>,
    pub published: Option<bool>,
}

/// Turns evaluations into ledger entries.
#[derive(Clone)]
pub struct FeedbackRecorder {
    probe: Arc<dyn ServiceProbe>,
    ledger: Arc<dyn FeedbackLedger>,
    publisher: Option<Arc<dyn FeedbackPublisher>>,
    identity_timeout: Duration,
}

impl FeedbackRecorder {
    pub fn new(probe: Arc<dyn ServiceProbe>, ledger: Arc<dyn FeedbackLedger>) -> Self {
        Self {
            probe,
            ledger,
            publisher: None,
            identity_timeout: Duration::from_millis(1200),
        }
    }

    /// Also hand recorded feedback to `publisher`, best effort.
    pub fn with_publisher(mut self, publisher: Arc<dyn FeedbackPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_identity_timeout(mut self, timeout: Duration) -> Self {
        self.identity_timeout = timeout;
        self
    }

    pub fn ledger(&self) -> &Arc<dyn FeedbackLedger> {
        &self.ledger
    }

    /// Agent id advertised by the seller, else `network:provider` lower-cased.
    pub async fn resolve_agent(&self, service: &ServiceInfo) -> (String, Option<String>) {
        let advertised = tokio::time::timeout(self.identity_timeout, self.probe.identity(&service.endpoint))
            .await
            .ok()
            .flatten()
            .filter(|identity| !identity.agent_id.trim().is_empty());

        match advertised {
            Some(identity) => (identity.agent_id, identity.agent_token_id),
            None => (service.fallback_agent_id(), None),
        }
    }

    /// Append feedback for `service` derived from `evaluation`.
    pub async fn record(
        &self,
        service: &ServiceInfo,
        evaluation: &Evaluation,
        context: FeedbackContext,
    ) -> Result<RecordedFeedback> {
        let (agent_id, agent_token_id) = self.resolve_agent(service).await;

        let feedback = Feedback {
            agent_id,
            value: evaluation.feedback_value(),
            tags: merge_tags(&context.tags),
            text: context.text.or_else(|| Some(evaluation.summary.clone())),
            service_id: Some(service.id.clone()),
            mission_id: context.mission_id,
            task_type: Some(service.task_type.clone()),
            created_at: Utc::now(),
        };

        self.ledger.append(feedback.clone()).await?;
        info!(agent = %feedback.agent_id, value = feedback.value, "feedback recorded");

        let published = match &self.publisher {
            Some(publisher) => match publisher.publish(&feedback).await {
                Ok(()) => Some(true),
                Err(e) => {
                    warn!(agent = %feedback.agent_id, error = %e, "feedback publication failed, continuing");
                    Some(false)
                }
            },
            None => None,
        };

        Ok(RecordedFeedback {
            feedback,
            agent_token_id,
            published,
        })
    }
}

/// Base tags first, then caller tags, without duplicates.
fn merge_tags(extra: &[String]) -> Vec<String> {
    let mut tags: Vec<String> = BASE_TAGS.iter().map(|t| t.to_string()).collect();
    for tag in extra {
        let tag = tag.trim();
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}
