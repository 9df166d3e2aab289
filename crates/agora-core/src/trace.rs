//! Lifecycle trace events.
//!
//! Workflows emit an ordered stream of `{type, at, data}` events. Sinks are
//! purely observational: nothing in a negotiation depends on them.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

/// Types of trace events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventType {
    /// A negotiation started.
    WorkflowStarted,
    /// The workflow moved to a new state.
    StateEntered,
    /// Candidates were discovered.
    CandidatesDiscovered,
    /// Reputation scores were computed.
    CandidatesScored,
    /// A service was selected.
    ServiceSelected,
    /// A quote arrived from the seller.
    QuoteReceived,
    /// A payment was accepted by the wallet and debited.
    PaymentSubmitted,
    /// A payment reached the configured confirmation depth.
    PaymentConfirmed,
    /// The seller delivered a result.
    DeliveryReceived,
    /// The receipt was checked.
    ReceiptVerified,
    /// Verification failed and a dispute was raised.
    DisputeRaised,
    /// The result was evaluated.
    Evaluated,
    /// Feedback was appended to the ledger.
    FeedbackRecorded,
    /// A best-effort side call failed and was skipped.
    BestEffortFailed,
    /// The workflow reached a terminal state.
    WorkflowCompleted,
    /// The workflow aborted.
    WorkflowFailed,
    /// A commander phase started.
    PhaseStarted,
    /// A commander phase finished.
    PhaseFinished,
}

/// One lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    #[serde(rename = "type")]
    pub event_type: TraceEventType,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl TraceEvent {
    pub fn new(event_type: TraceEventType) -> Self {
        Self {
            event_type,
            at: Utc::now(),
            data: serde_json::Value::Null,
        }
    }

    /// Add data to the event.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Receives trace events as they happen.
pub trait TraceSink: Send + Sync {
    fn emit(&self, event: &TraceEvent);
}

/// Sink that writes events to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTrace;

impl TraceSink for LogTrace {
    fn emit(&self, event: &TraceEvent) {
        info!(event = ?event.event_type, data = %event.data, "trace");
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryTrace {
    events: Mutex<Vec<TraceEvent>>,
}

impl MemoryTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all events seen so far.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Event types in order.
    pub fn types(&self) -> Vec<TraceEventType> {
        self.events().into_iter().map(|e| e.event_type).collect()
    }
}

impl TraceSink for MemoryTrace {
    fn emit(&self, event: &TraceEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Compute the Merkle root of a trace.
pub fn trace_digest(trace: &[TraceEvent]) -> String {
    if trace.is_empty() {
        return "0".repeat(64);
    }

    // Hash each event
    let mut hashes: Vec<Vec<u8>> = trace
        .iter()
        .map(|event| {
            let json = serde_json::to_string(event).unwrap_or_default();
            Sha256::digest(json.as_bytes()).to_vec()
        })
        .collect();

    while hashes.len() > 1 {
        let mut next_level = Vec::with_capacity(hashes.len().div_ceil(2));

        for chunk in hashes.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(&chunk[0]);
            // Duplicate last hash if odd number
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next_level.push(hasher.finalize().to_vec());
        }

        hashes = next_level;
    }

    hashes
        .first()
        .map(hex::encode)
        .unwrap_or_else(|| "0".repeat(64))
}
