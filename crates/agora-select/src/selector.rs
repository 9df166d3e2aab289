//! Ranking and selection of candidate services.

use std::collections::HashMap;
use std::sync::Arc;

use agora_core::{AgoraError, Result, ServiceInfo, Trend};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::scorer::ReputationScorer;

/// Scores keyed by service id. Services with an unknown score are absent.
pub type ScoreMap = HashMap<String, f64>;

/// Which rule picked the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionTier {
    /// Well-reputed and not trending down.
    Strong,
    /// Only weak scores available; price and score balanced.
    Balanced,
    /// No scores at all; cheapest wins.
    Exploration,
}

/// Outcome of a selection round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub service: ServiceInfo,
    pub scores: ScoreMap,
    pub tier: SelectionTier,
}

/// Picks one candidate given their scores.
pub trait SelectionPolicy: Send + Sync {
    /// Index into `candidates` of the chosen service, `None` only when empty.
    fn choose(&self, candidates: &[ServiceInfo], scores: &ScoreMap) -> Option<(usize, SelectionTier)>;
}

/// Configuration for [`BalancedPolicy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Score above which a service is considered strong.
    pub strong_threshold: f64,

    /// Weight of the score in the strong tier (the rest goes to price).
    pub strong_score_weight: f64,

    /// Weight of the score among weakly-scored services.
    pub weak_score_weight: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            strong_threshold: 70.0,
            strong_score_weight: 0.7,
            weak_score_weight: 0.5,
        }
    }
}

/// Default policy: reputation first, price as a balancing term, cheapest
/// only when nothing is known. Ties keep input order.
#[derive(Debug, Clone, Default)]
pub struct BalancedPolicy {
    config: PolicyConfig,
}

impl BalancedPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    fn best_by_utility(
        candidates: &[ServiceInfo],
        tier: &[usize],
        scores: &ScoreMap,
        score_weight: f64,
    ) -> usize {
        let min_price = tier.iter().map(|&i| candidates[i].price).min().unwrap_or(0);

        let mut best = tier[0];
        let mut best_utility = f64::NEG_INFINITY;
        for &i in tier {
            let score = scores.get(&candidates[i].id).copied().unwrap_or(0.0);
            let utility = score_weight * score / 100.0
                + (1.0 - score_weight) * price_factor(candidates[i].price, min_price);
            // Strictly greater keeps the earliest candidate on ties.
            if utility > best_utility {
                best = i;
                best_utility = utility;
            }
        }
        best
    }
}

/// 1.0 for the cheapest price in a tier, proportionally less for dearer ones.
fn price_factor(price: u128, min_price: u128) -> f64 {
    if price == 0 {
        1.0
    } else {
        min_price as f64 / price as f64
    }
}

impl SelectionPolicy for BalancedPolicy {
    fn choose(&self, candidates: &[ServiceInfo], scores: &ScoreMap) -> Option<(usize, SelectionTier)> {
        if candidates.is_empty() {
            return None;
        }

        let strong: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                scores
                    .get(&c.id)
                    .map_or(false, |s| *s > self.config.strong_threshold)
                    && c.trend() != Some(Trend::Down)
            })
            .map(|(i, _)| i)
            .collect();
        if !strong.is_empty() {
            let pick = Self::best_by_utility(candidates, &strong, scores, self.config.strong_score_weight);
            return Some((pick, SelectionTier::Strong));
        }

        let scored: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| scores.contains_key(&c.id))
            .map(|(i, _)| i)
            .collect();
        if !scored.is_empty() {
            let pick = Self::best_by_utility(candidates, &scored, scores, self.config.weak_score_weight);
            return Some((pick, SelectionTier::Balanced));
        }

        let mut cheapest = 0;
        for (i, c) in candidates.iter().enumerate() {
            if c.price < candidates[cheapest].price {
                cheapest = i;
            }
        }
        Some((cheapest, SelectionTier::Exploration))
    }
}

/// Configuration for the selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Maximum reputation lookups in flight at once.
    pub max_concurrency: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self { max_concurrency: 8 }
    }
}

/// Scores candidates concurrently, then applies a [`SelectionPolicy`].
#[derive(Clone)]
pub struct ServiceSelector {
    scorer: ReputationScorer,
    policy: Arc<dyn SelectionPolicy>,
    config: SelectorConfig,
}

impl ServiceSelector {
    /// Create a selector with the default balanced policy.
    pub fn new(scorer: ReputationScorer) -> Self {
        Self {
            scorer,
            policy: Arc::new(BalancedPolicy::default()),
            config: SelectorConfig::default(),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn SelectionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_config(mut self, config: SelectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Score every candidate, waiting for all lookups to finish.
    pub async fn score_all(&self, candidates: &[ServiceInfo]) -> ScoreMap {
        let limit = self.config.max_concurrency.max(1);

        let lookups: Vec<_> = candidates
            .iter()
            .map(|candidate| {
                async move { (candidate.id.clone(), self.scorer.score(candidate).await) }.boxed()
            })
            .collect();
        let results: Vec<(String, Option<f64>)> = stream::iter(lookups)
            .buffer_unordered(limit)
            .collect()
            .await;

        let scores: ScoreMap = results
            .into_iter()
            .filter_map(|(id, score)| score.map(|s| (id, s)))
            .collect();

        debug!(
            candidates = candidates.len(),
            scored = scores.len(),
            "reputation lookups complete"
        );
        scores
    }

    /// Score and pick one service for `task_type`.
    pub async fn select(&self, task_type: &str, candidates: &[ServiceInfo]) -> Result<Selection> {
        if candidates.is_empty() {
            return Err(AgoraError::NoCandidates {
                task_type: task_type.to_string(),
            });
        }

        let scores = self.score_all(candidates).await;
        self.choose(task_type, candidates, scores)
    }

    /// Apply the policy to already-computed scores.
    pub fn choose(&self, task_type: &str, candidates: &[ServiceInfo], scores: ScoreMap) -> Result<Selection> {
        let (index, tier) = self
            .policy
            .choose(candidates, &scores)
            .ok_or_else(|| AgoraError::NoCandidates {
                task_type: task_type.to_string(),
            })?;

        let service = candidates
            .get(index)
            .cloned()
            .ok_or_else(|| AgoraError::internal(format!("selection policy returned index {} of {}", index, candidates.len())))?;

        info!(
            service = %service.id,
            price = %service.price,
            score = ?scores.get(&service.id),
            ?tier,
            "service selected"
        );

        Ok(Selection { service, scores, tier })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::{CounterpartyIdentity, ReputationSummary, ServiceProbe};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Probe answering from a table keyed by endpoint, tracking concurrency.
    #[derive(Default)]
    struct TableProbe {
        averages: HashMap<String, f64>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ServiceProbe for TableProbe {
        async fn reputation(&self, endpoint: &str) -> Option<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.averages.get(endpoint).copied()
        }

        async fn identity(&self, _endpoint: &str) -> Option<CounterpartyIdentity> {
            None
        }
    }

    fn candidate(id: &str, price: u128) -> ServiceInfo {
        ServiceInfo {
            id: id.to_string(),
            network_id: "eip155:84532".to_string(),
            provider_address: format!("0x{:0>40}", id.len()),
            endpoint: format!("http://{}.test", id),
            task_type: "summarize".to_string(),
            price,
            currency: "ETH".to_string(),
            reputation: None,
        }
    }

    fn scores(pairs: &[(&str, f64)]) -> ScoreMap {
        pairs.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    fn selector_with(probe: TableProbe) -> ServiceSelector {
        ServiceSelector::new(ReputationScorer::new(Arc::new(probe)))
    }

    #[tokio::test]
    async fn test_empty_fails_with_no_candidates() {
        let selector = selector_with(TableProbe::default());
        let err = selector.select("summarize", &[]).await.unwrap_err();
        assert_eq!(err.kind(), agora_core::ErrorKind::NoCandidates);
    }

    #[test]
    fn test_unknown_score_not_picked_for_price_alone() {
        let candidates = vec![candidate("a", 10), candidate("b", 5), candidate("c", 1)];
        let policy = BalancedPolicy::default();

        let (index, tier) = policy
            .choose(&candidates, &scores(&[("a", 80.0), ("b", 40.0)]))
            .unwrap();
        assert_eq!(candidates[index].id, "a");
        assert_eq!(tier, SelectionTier::Strong);
    }

    #[test]
    fn test_strong_tier_balances_price() {
        let candidates = vec![candidate("premium", 100), candidate("good", 10)];
        let (index, _) = BalancedPolicy::default()
            .choose(&candidates, &scores(&[("premium", 90.0), ("good", 75.0)]))
            .unwrap();
        assert_eq!(candidates[index].id, "good");
    }

    #[test]
    fn test_down_trend_excluded_from_strong() {
        let mut falling = candidate("falling", 1);
        falling.reputation = Some(ReputationSummary {
            score: 4.9,
            trend: Trend::Down,
            sample_count: 40,
        });
        let candidates = vec![falling, candidate("steady", 10)];

        let (index, tier) = BalancedPolicy::default()
            .choose(&candidates, &scores(&[("falling", 90.0), ("steady", 72.0)]))
            .unwrap();
        assert_eq!(candidates[index].id, "steady");
        assert_eq!(tier, SelectionTier::Strong);
    }

    #[test]
    fn test_weak_scores_allow_non_cheapest() {
        let candidates = vec![candidate("cheap", 5), candidate("better", 6)];
        let (index, tier) = BalancedPolicy::default()
            .choose(&candidates, &scores(&[("cheap", 10.0), ("better", 65.0)]))
            .unwrap();
        assert_eq!(candidates[index].id, "better");
        assert_eq!(tier, SelectionTier::Balanced);
    }

    #[test]
    fn test_all_unknown_prefers_cheapest() {
        let candidates = vec![candidate("a", 7), candidate("b", 3), candidate("c", 3)];
        let (index, tier) = BalancedPolicy::default()
            .choose(&candidates, &ScoreMap::new())
            .unwrap();
        assert_eq!(candidates[index].id, "b");
        assert_eq!(tier, SelectionTier::Exploration);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let candidates = vec![candidate("first", 10), candidate("second", 10)];
        let (index, _) = BalancedPolicy::default()
            .choose(&candidates, &scores(&[("first", 80.0), ("second", 80.0)]))
            .unwrap();
        assert_eq!(index, 0);
    }

    #[test]
    fn test_always_picks_from_input() {
        let policy = BalancedPolicy::default();
        let pool: Vec<ServiceInfo> = (0..6).map(|i| candidate(&format!("s{}", i), (i * 7 % 5 + 1) as u128)).collect();
        for len in 1..=pool.len() {
            let subset = &pool[..len];
            for weights in [&[][..], &[("s0", 90.0)][..], &[("s1", 20.0), ("s3", 75.0)][..]] {
                let (index, _) = policy.choose(subset, &scores(weights)).unwrap();
                assert!(index < subset.len());
            }
        }
    }

    #[tokio::test]
    async fn test_score_all_waits_for_every_lookup_and_skips_unknown() {
        let mut probe = TableProbe::default();
        for id in ["a", "b", "c", "d"] {
            probe.averages.insert(format!("http://{}.test", id), 50.0);
        }
        let probe = Arc::new(probe);
        let selector = ServiceSelector::new(ReputationScorer::new(probe.clone()))
            .with_config(SelectorConfig { max_concurrency: 2 });

        let candidates: Vec<ServiceInfo> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|id| candidate(id, 1))
            .collect();
        let scores = selector.score_all(&candidates).await;

        assert_eq!(probe.calls.load(Ordering::SeqCst), 5);
        assert_eq!(scores.len(), 4);
        assert!(!scores.contains_key("e"));
        assert!(probe.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_select_end_to_end() {
        let mut probe = TableProbe::default();
        probe.averages.insert("http://a.test".to_string(), 80.0);
        probe.averages.insert("http://b.test".to_string(), 40.0);
        let selector = selector_with(probe);

        let candidates = vec![candidate("a", 10), candidate("b", 5), candidate("c", 1)];
        let selection = selector.select("summarize", &candidates).await.unwrap();

        assert_eq!(selection.service.id, "a");
        assert_eq!(selection.scores.len(), 2);
    }
}
