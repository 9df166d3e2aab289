//! # Agora Negotiate
//!
//! The buyer-side negotiation workflow and its multi-phase commander variant.
//!
//! A [`NegotiationWorkflow`] discovers and selects a seller, settles its
//! quote, verifies the signed receipt, evaluates the result and records
//! feedback. A [`BudgetOrchestrator`] runs several workflows under one
//! spending cap.

pub mod commander;
pub mod evaluator;
pub mod recorder;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use commander::{
    BudgetOrchestrator, CommanderConfig, CommanderPhaseResult, CommanderRun, PhaseOutcome, PhaseSpec,
};
pub use evaluator::{Evaluator, LengthHeuristic};
pub use recorder::{FeedbackContext, FeedbackRecorder, RecordedFeedback};
pub use workflow::{
    DisputeReason, DisputeReport, NegotiationFailure, NegotiationReport, NegotiationRequest,
    NegotiationWorkflow, WorkflowConfig,
};
