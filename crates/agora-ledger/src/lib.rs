//! # Agora Ledger
//!
//! Append-only feedback ledger and an in-memory service registry.

pub mod registry;
pub mod store;

pub use registry::InMemoryRegistry;
pub use store::{reputation_of, summarize, FeedbackLedger, InMemoryFeedbackLedger};
