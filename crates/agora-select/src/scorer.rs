//! Reputation scoring for discovered services.

use std::sync::Arc;
use std::time::Duration;

use agora_core::{ReputationSummary, ServiceInfo, ServiceProbe, Trend};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for the reputation scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Hard deadline for the `/reputation` probe in milliseconds.
    pub probe_timeout_ms: u64,

    /// Bonus applied for an upward trend.
    pub trend_up_bonus: f64,

    /// Penalty applied for a downward trend.
    pub trend_down_penalty: f64,

    /// Providers with fewer samples than this get the exploration floor.
    pub min_samples: u32,

    /// Lowest score an under-sampled provider can receive.
    pub sparse_floor: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 1200,
            trend_up_bonus: 3.0,
            trend_down_penalty: 8.0,
            min_samples: 3,
            sparse_floor: 55.0,
        }
    }
}

/// Turns trust signals for a service into a comparable 0–100 score.
#[derive(Clone)]
pub struct ReputationScorer {
    probe: Arc<dyn ServiceProbe>,
    config: ScorerConfig,
}

impl ReputationScorer {
    pub fn new(probe: Arc<dyn ServiceProbe>) -> Self {
        Self::with_config(probe, ScorerConfig::default())
    }

    pub fn with_config(probe: Arc<dyn ServiceProbe>, config: ScorerConfig) -> Self {
        Self { probe, config }
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Score a service.
    ///
    /// Uses the prior summary when present; otherwise asks the service's own
    /// endpoint once. `None` means "unknown", which is not the same as zero.
    pub async fn score(&self, service: &ServiceInfo) -> Option<f64> {
        if let Some(summary) = &service.reputation {
            return Some(self.normalize(summary));
        }

        let deadline = Duration::from_millis(self.config.probe_timeout_ms);
        match tokio::time::timeout(deadline, self.probe.reputation(&service.endpoint)).await {
            Ok(Some(average)) if average.is_finite() => Some(round2(average.clamp(0.0, 100.0))),
            Ok(Some(average)) => {
                debug!(service = %service.id, %average, "non-finite reputation ignored");
                None
            }
            Ok(None) => None,
            Err(_) => {
                debug!(service = %service.id, "reputation probe timed out");
                None
            }
        }
    }

    /// Normalize a 0–5 summary onto the 0–100 scale.
    pub fn normalize(&self, summary: &ReputationSummary) -> f64 {
        let adjustment = match summary.trend {
            Trend::Up => self.config.trend_up_bonus,
            Trend::Down => -self.config.trend_down_penalty,
            Trend::Flat => 0.0,
        };

        let mut value = summary.score * 20.0 + adjustment;
        if !value.is_finite() {
            value = 0.0;
        }
        if summary.sample_count < self.config.min_samples {
            value = value.max(self.config.sparse_floor);
        }

        round2(value.clamp(0.0, 100.0))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
