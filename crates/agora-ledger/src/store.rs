//! Feedback ledger implementations.

use std::collections::HashMap;
use std::sync::Arc;

use agora_core::{Feedback, FeedbackSummary, ReputationSummary, Result, Trend};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

/// Number of most recent entries compared against the rest to derive a trend.
const TREND_WINDOW: usize = 3;

/// Difference (0–100 scale) between recent and older averages that counts as movement.
const TREND_THRESHOLD: f64 = 5.0;

/// Append-only store of feedback keyed by agent id.
#[async_trait]
pub trait FeedbackLedger: Send + Sync {
    /// Append an entry. Duplicates are kept.
    async fn append(&self, feedback: Feedback) -> Result<()>;

    /// All entries for an agent, oldest first.
    async fn list_by_agent(&self, agent_id: &str) -> Result<Vec<Feedback>>;

    /// Count, mean value and latest entry for an agent.
    async fn summary(&self, agent_id: &str) -> Result<FeedbackSummary> {
        Ok(summarize(&self.list_by_agent(agent_id).await?))
    }

    /// Prior reputation in the registry's 0–5 form, `None` without history.
    async fn reputation(&self, agent_id: &str) -> Result<Option<ReputationSummary>> {
        Ok(reputation_of(&self.list_by_agent(agent_id).await?))
    }
}

/// Aggregate a list of entries.
pub fn summarize(entries: &[Feedback]) -> FeedbackSummary {
    FeedbackSummary {
        count: entries.len(),
        average: mean(entries),
        latest: entries.last().cloned(),
    }
}

/// Derive a 0–5 reputation summary and trend from feedback history.
pub fn reputation_of(entries: &[Feedback]) -> Option<ReputationSummary> {
    if entries.is_empty() {
        return None;
    }

    let trend = if entries.len() > TREND_WINDOW {
        let (older, recent) = entries.split_at(entries.len() - TREND_WINDOW);
        let delta = mean(recent) - mean(older);
        if delta > TREND_THRESHOLD {
            Trend::Up
        } else if delta < -TREND_THRESHOLD {
            Trend::Down
        } else {
            Trend::Flat
        }
    } else {
        Trend::Flat
    };

    Some(ReputationSummary {
        score: mean(entries) / 20.0,
        trend,
        sample_count: entries.len() as u32,
    })
}

fn mean(entries: &[Feedback]) -> f64 {
    if entries.is_empty() {
        return 0.0;
    }
    entries.iter().map(|f| f.value as f64).sum::<f64>() / entries.len() as f64
}

/// In-memory implementation of FeedbackLedger.
#[derive(Default)]
pub struct InMemoryFeedbackLedger {
    /// agent id -> entries (append-only).
    entries: Arc<RwLock<HashMap<String, Vec<Feedback>>>>,
}

impl InMemoryFeedbackLedger {
    /// Create a new in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entries across all agents.
    pub async fn len(&self) -> usize {
        self.entries.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// All agent ids with at least one entry.
    pub async fn agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = self.entries.read().await.keys().cloned().collect();
        agents.sort();
        agents
    }
}

#[async_trait]
impl FeedbackLedger for InMemoryFeedbackLedger {
    async fn append(&self, feedback: Feedback) -> Result<()> {
        debug!(agent = %feedback.agent_id, value = feedback.value, "feedback appended");
        let mut entries = self.entries.write().await;
        entries
            .entry(feedback.agent_id.clone())
            .or_default()
            .push(feedback);
        Ok(())
    }

    async fn list_by_agent(&self, agent_id: &str) -> Result<Vec<Feedback>> {
        let entries = self.entries.read().await;
        Ok(entries.get(agent_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn feedback(agent: &str, value: u8) -> Feedback {
        Feedback {
            agent_id: agent.to_string(),
            value,
            tags: vec!["auto".to_string(), "delivery".to_string()],
            text: None,
            service_id: None,
            mission_id: None,
            task_type: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_and_list() {
        let ledger = InMemoryFeedbackLedger::new();
        ledger.append(feedback("a", 90)).await.unwrap();
        ledger.append(feedback("b", 50)).await.unwrap();
        ledger.append(feedback("a", 70)).await.unwrap();

        let entries = ledger.list_by_agent("a").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].value, 90);
        assert_eq!(ledger.len().await, 3);
        assert_eq!(ledger.agents().await, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_summary_averages_duplicates() {
        let ledger = InMemoryFeedbackLedger::new();
        ledger.append(feedback("a", 90)).await.unwrap();
        ledger.append(feedback("a", 90)).await.unwrap();
        ledger.append(feedback("a", 60)).await.unwrap();

        let summary = ledger.summary("a").await.unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.average, 80.0);
        assert_eq!(summary.latest.unwrap().value, 60);
    }

    #[tokio::test]
    async fn test_summary_of_unknown_agent() {
        let ledger = InMemoryFeedbackLedger::new();
        let summary = ledger.summary("nobody").await.unwrap();
        assert_eq!(summary.count, 0);
        assert_eq!(summary.average, 0.0);
        assert!(summary.latest.is_none());
        assert!(ledger.reputation("nobody").await.unwrap().is_none());
    }

    #[test]
    fn test_reputation_trend() {
        let rising: Vec<Feedback> = [50, 50, 50, 90, 90, 90].iter().map(|v| feedback("a", *v)).collect();
        let rep = reputation_of(&rising).unwrap();
        assert_eq!(rep.trend, Trend::Up);
        assert_eq!(rep.sample_count, 6);
        assert_eq!(rep.score, 3.5);

        let falling: Vec<Feedback> = [90, 90, 90, 50, 50, 50].iter().map(|v| feedback("a", *v)).collect();
        assert_eq!(reputation_of(&falling).unwrap().trend, Trend::Down);

        let short: Vec<Feedback> = [10, 90].iter().map(|v| feedback("a", *v)).collect();
        assert_eq!(reputation_of(&short).unwrap().trend, Trend::Flat);
    }
}
