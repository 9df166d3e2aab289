//! Multi-phase runs under one spending cap.

use std::sync::Arc;

use agora_core::{
    CancelSignal, CommanderBudget, ErrorBody, PaymentTx, ServiceInfo, TraceEvent, TraceEventType,
    WorkflowState,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::workflow::{NegotiationReport, NegotiationRequest, NegotiationWorkflow};

/// Tag added to every feedback entry recorded by a commander phase.
pub const COMMANDER_TAG: &str = "commander";

/// Commander configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommanderConfig {
    /// Stop after the first failed phase instead of running the rest.
    #[serde(default)]
    pub halt_on_failure: bool,
}

/// One phase to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub label: String,
    pub task_type: String,
    #[serde(default)]
    pub task: serde_json::Value,
    #[serde(default)]
    pub candidates: Option<Vec<ServiceInfo>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PhaseSpec {
    pub fn new(label: impl Into<String>, task_type: impl Into<String>, task: serde_json::Value) -> Self {
        Self {
            label: label.into(),
            task_type: task_type.into(),
            task,
            candidates: None,
            tags: Vec::new(),
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<ServiceInfo>) -> Self {
        self.candidates = Some(candidates);
        self
    }
}

/// How a phase ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PhaseOutcome {
    /// The workflow reached `Done` or `Disputed`.
    Completed { report: Box<NegotiationReport> },
    /// The workflow aborted.
    Failed {
        error: ErrorBody,
        state: WorkflowState,
        payment: Option<PaymentTx>,
        trace: Vec<TraceEvent>,
    },
}

impl PhaseOutcome {
    /// Whatever was actually paid in this phase.
    pub fn payment(&self) -> Option<&PaymentTx> {
        match self {
            PhaseOutcome::Completed { report } => Some(&report.payment),
            PhaseOutcome::Failed { payment, .. } => payment.as_ref(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PhaseOutcome::Failed { .. })
    }
}

/// Result of one phase with the budget as it stood afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommanderPhaseResult {
    pub index: usize,
    pub label: String,
    pub outcome: PhaseOutcome,
    pub budget: CommanderBudget,
}

/// A complete commander run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommanderRun {
    pub mission_id: Uuid,
    pub phases: Vec<CommanderPhaseResult>,
    pub budget: CommanderBudget,
    /// Set when phases were skipped by `halt_on_failure`.
    pub halted: bool,
    /// Set when cancellation stopped the run between phases.
    pub cancelled: bool,
}

/// Runs phases one after another, each limited to what the budget has left.
pub struct BudgetOrchestrator {
    workflow: Arc<NegotiationWorkflow>,
    config: CommanderConfig,
}

impl BudgetOrchestrator {
    pub fn new(workflow: Arc<NegotiationWorkflow>) -> Self {
        Self::with_config(workflow, CommanderConfig::default())
    }

    pub fn with_config(workflow: Arc<NegotiationWorkflow>, config: CommanderConfig) -> Self {
        Self { workflow, config }
    }

    pub fn config(&self) -> &CommanderConfig {
        &self.config
    }

    /// Run `phases` in order under a cap of `cap` minor units.
    pub async fn run(&self, cap: u128, phases: Vec<PhaseSpec>, cancel: &CancelSignal) -> CommanderRun {
        let mission_id = Uuid::new_v4();
        let mut budget = CommanderBudget::new(cap);
        let mut results = Vec::with_capacity(phases.len());
        let mut halted = false;
        let mut cancelled = false;
        let sink = self.workflow.trace_sink();

        info!(mission = %mission_id, cap = %cap, phases = phases.len(), "commander run started");

        for (index, phase) in phases.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!(mission = %mission_id, index, "commander cancelled between phases");
                cancelled = true;
                break;
            }

            sink.emit(&TraceEvent::new(TraceEventType::PhaseStarted).with_data(json!({
                "missionId": mission_id,
                "index": index,
                "label": phase.label,
                "remaining": budget.remaining().to_string(),
            })));

            let mut tags = phase.tags.clone();
            tags.push(COMMANDER_TAG.to_string());
            let request = NegotiationRequest {
                task_type: phase.task_type.clone(),
                task: phase.task.clone(),
                candidates: phase.candidates.clone(),
                tags,
                mission_id: Some(mission_id),
                max_spend: None,
            };

            let outcome = match self.workflow.run_within(request, Some(budget), cancel).await {
                Ok(report) => PhaseOutcome::Completed {
                    report: Box::new(report),
                },
                Err(failure) => PhaseOutcome::Failed {
                    error: failure.error.to_body(),
                    state: failure.state,
                    payment: failure.payment,
                    trace: failure.trace,
                },
            };

            if let Some(payment) = outcome.payment() {
                if let Err(e) = budget.record(payment.amount) {
                    // Quotes are checked against the same budget before paying.
                    error!(mission = %mission_id, index, error = %e, "payment exceeded commander budget");
                }
            }

            let failed = outcome.is_failed();
            if failed {
                warn!(mission = %mission_id, index, label = %phase.label, "commander phase failed");
            }

            sink.emit(&TraceEvent::new(TraceEventType::PhaseFinished).with_data(json!({
                "missionId": mission_id,
                "index": index,
                "label": phase.label,
                "failed": failed,
                "spent": budget.spent().to_string(),
            })));

            results.push(CommanderPhaseResult {
                index,
                label: phase.label,
                outcome,
                budget,
            });

            if failed && self.config.halt_on_failure {
                halted = true;
                break;
            }
        }

        info!(
            mission = %mission_id,
            spent = %budget.spent(),
            cap = %budget.cap(),
            phases = results.len(),
            "commander run finished"
        );

        CommanderRun {
            mission_id,
            phases: results,
            budget,
            halted,
            cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, workflow_with, MockSeller, StubProbe, BUYER, KEY_A};
    use agora_core::{cancel_pair, AgoraError, Delivery, LocalSigner, Quote, Result, SellerClient};
    use agora_ledger::InMemoryFeedbackLedger;
    use agora_settle::{PaymentSettler, SettlerConfig, SimulatedWallet};
    use async_trait::async_trait;
    use std::time::Duration;

    fn phase(label: &str, service: ServiceInfo) -> PhaseSpec {
        PhaseSpec::new(label, "summarize", json!({ "step": label })).with_candidates(vec![service])
    }

    #[tokio::test]
    async fn test_second_phase_exceeds_budget() {
        let seller = MockSeller::new(LocalSigner::from_hex(KEY_A).unwrap());
        let first = seller.service("first", 60);
        let second = seller.service("second", 50);
        let h = harness(seller, StubProbe::default(), 1_000);
        let commander = BudgetOrchestrator::new(Arc::new(h.workflow));

        let run = commander
            .run(100, vec![phase("one", first), phase("two", second)], &CancelSignal::never())
            .await;

        assert_eq!(run.phases.len(), 2);
        assert!(!run.phases[0].outcome.is_failed());
        assert_eq!(run.phases[0].budget.spent(), 60);

        match &run.phases[1].outcome {
            PhaseOutcome::Failed { error, payment, .. } => {
                assert_eq!(error.code, "BUDGET_EXCEEDED");
                assert!(payment.is_none());
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(run.budget.spent(), 60);
        assert_eq!(h.wallet.transfers().await.len(), 1);
        assert_eq!(h.seller.executions.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disputed_phase_still_counts_spend() {
        let seller = MockSeller::new(LocalSigner::from_hex(KEY_A).unwrap())
            .claiming("0x00000000000000000000000000000000000000cc");
        let svc = seller.service("svc", 30);
        let h = harness(seller, StubProbe::default(), 1_000);
        let commander = BudgetOrchestrator::new(Arc::new(h.workflow));

        let run = commander
            .run(100, vec![phase("one", svc)], &CancelSignal::never())
            .await;

        match &run.phases[0].outcome {
            PhaseOutcome::Completed { report } => assert!(report.is_disputed()),
            other => panic!("expected completed, got {:?}", other),
        }
        assert_eq!(run.budget.spent(), 30);
    }

    #[tokio::test]
    async fn test_halt_on_failure_skips_remaining() {
        let seller = MockSeller::new(LocalSigner::from_hex(KEY_A).unwrap());
        let pricey = seller.service("pricey", 500);
        let cheap = seller.service("cheap", 5);
        let h = harness(seller, StubProbe::default(), 1_000);
        let commander = BudgetOrchestrator::with_config(
            Arc::new(h.workflow),
            CommanderConfig {
                halt_on_failure: true,
            },
        );

        let run = commander
            .run(100, vec![phase("one", pricey), phase("two", cheap)], &CancelSignal::never())
            .await;

        assert!(run.halted);
        assert_eq!(run.phases.len(), 1);
        assert_eq!(run.budget.spent(), 0);
    }

    #[tokio::test]
    async fn test_failures_do_not_halt_by_default() {
        let seller = MockSeller::new(LocalSigner::from_hex(KEY_A).unwrap());
        let pricey = seller.service("pricey", 500);
        let cheap = seller.service("cheap", 5);
        let h = harness(seller, StubProbe::default(), 1_000);
        let commander = BudgetOrchestrator::new(Arc::new(h.workflow));

        let run = commander
            .run(100, vec![phase("one", pricey), phase("two", cheap)], &CancelSignal::never())
            .await;

        assert!(!run.halted);
        assert!(run.phases[0].outcome.is_failed());
        assert!(!run.phases[1].outcome.is_failed());
        assert_eq!(run.budget.spent(), 5);
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_between_phases() {
        let seller = MockSeller::new(LocalSigner::from_hex(KEY_A).unwrap());
        let svc = seller.service("svc", 5);
        let h = harness(seller, StubProbe::default(), 1_000);
        let commander = BudgetOrchestrator::new(Arc::new(h.workflow));
        let (handle, signal) = cancel_pair();
        handle.cancel();

        let run = commander.run(100, vec![phase("one", svc)], &signal).await;

        assert!(run.cancelled);
        assert!(run.phases.is_empty());
        assert!(h.wallet.transfers().await.is_empty());
    }

    #[tokio::test]
    async fn test_unconfirmed_payment_still_counts_against_cap() {
        let seller = MockSeller::new(LocalSigner::from_hex(KEY_A).unwrap());
        let first = seller.service("first", 60);
        let second = seller.service("second", 60);
        // Two 50ms blocks never fit in the 75ms payment deadline.
        let wallet = Arc::new(SimulatedWallet::new(BUYER, 1_000).with_block_time(Duration::from_millis(50)));
        let settler = PaymentSettler::with_config(
            wallet.clone(),
            SettlerConfig {
                confirmations: 2,
                payment_timeout_ms: 75,
                ..SettlerConfig::default()
            },
        );
        let workflow = workflow_with(
            Arc::new(seller),
            settler,
            StubProbe::default(),
            Arc::new(InMemoryFeedbackLedger::new()),
        );
        let commander = BudgetOrchestrator::new(Arc::new(workflow));

        let run = commander
            .run(100, vec![phase("one", first), phase("two", second)], &CancelSignal::never())
            .await;

        match &run.phases[0].outcome {
            PhaseOutcome::Failed { error, payment, .. } => {
                assert_eq!(error.code, "NETWORK_TIMEOUT");
                assert_eq!(payment.as_ref().map(|p| p.amount), Some(60));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(run.phases[0].budget.spent(), 60);

        match &run.phases[1].outcome {
            PhaseOutcome::Failed { error, payment, .. } => {
                assert_eq!(error.code, "BUDGET_EXCEEDED");
                assert!(payment.is_none());
            }
            other => panic!("expected failure, got {:?}", other),
        }

        let transfers = wallet.transfers().await;
        assert_eq!(transfers.len(), 1);
        assert!(transfers.iter().map(|t| t.amount).sum::<u128>() <= 100);
        assert_eq!(run.budget.spent(), 60);
    }

    /// Takes the payment, then fails to deliver.
    struct BrokenExecution(MockSeller);

    #[async_trait]
    impl SellerClient for BrokenExecution {
        async fn request_quote(&self, service: &ServiceInfo, task: &serde_json::Value) -> Result<Quote> {
            self.0.request_quote(service, task).await
        }

        async fn execute(
            &self,
            _service: &ServiceInfo,
            _task: &serde_json::Value,
            _payment: &PaymentTx,
        ) -> Result<Delivery> {
            Err(AgoraError::Seller {
                message: "worker crashed".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_failure_after_payment_counts_spend() {
        let seller = MockSeller::new(LocalSigner::from_hex(KEY_A).unwrap());
        let svc = seller.service("svc", 25);
        let wallet = Arc::new(SimulatedWallet::new(BUYER, 1_000));
        let workflow = workflow_with(
            Arc::new(BrokenExecution(seller)),
            PaymentSettler::new(wallet.clone()),
            StubProbe::default(),
            Arc::new(InMemoryFeedbackLedger::new()),
        );
        let commander = BudgetOrchestrator::new(Arc::new(workflow));

        let run = commander
            .run(100, vec![phase("one", svc)], &CancelSignal::never())
            .await;

        match &run.phases[0].outcome {
            PhaseOutcome::Failed { state, payment, .. } => {
                assert_eq!(*state, WorkflowState::Executing);
                assert_eq!(payment.as_ref().map(|p| p.amount), Some(25));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(run.budget.spent(), 25);
        assert_eq!(wallet.transfers().await.len(), 1);
    }
}
