//! # Agora Select
//!
//! Reputation scoring and service selection for Agora buyer agents.

pub mod scorer;
pub mod selector;

pub use scorer::{ReputationScorer, ScorerConfig};
pub use selector::{
    BalancedPolicy, PolicyConfig, ScoreMap, Selection, SelectionPolicy, SelectionTier,
    SelectorConfig, ServiceSelector,
};
