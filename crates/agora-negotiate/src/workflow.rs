//! The buyer-side negotiation workflow.
//!
//! One run walks `Discovering → Selecting → Quoting → Paying → Executing →
//! Verifying → Evaluating → Feedback → Done`, or stops in `Disputed` when the
//! delivery cannot be attributed to the selected seller. Payment happens at
//! most once per run and is never retried.

use std::future::Future;
use std::sync::Arc;

use agora_core::receipt::{result_digest, same_address};
use agora_core::trace::trace_digest;
use agora_core::{
    AgoraError, CancelSignal, CommanderBudget, Delivery, Evaluation, LogTrace, PaymentTx, Quote,
    ReceiptVerification, Result, SellerClient, ServiceInfo, ServiceRegistry, TraceEvent,
    TraceEventType, TraceSink, WorkflowState,
};
use agora_ledger::FeedbackLedger;
use agora_select::{ScoreMap, SelectionTier, ServiceSelector};
use agora_settle::PaymentSettler;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::evaluator::{Evaluator, LengthHeuristic};
use crate::recorder::{FeedbackContext, FeedbackRecorder, RecordedFeedback};

/// Tunables for a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Reject quotes whose payee is not the selected provider or whose amount
    /// exceeds the advertised price.
    pub check_quotes: bool,

    /// Attach a prior reputation from the feedback ledger to candidates that
    /// arrive without one.
    pub ledger_priors: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            check_quotes: true,
            ledger_priors: true,
        }
    }
}

/// One negotiation to run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NegotiationRequest {
    pub task_type: String,

    #[serde(default)]
    pub task: serde_json::Value,

    /// Scripted candidates. Without them the registry is asked.
    #[serde(default)]
    pub candidates: Option<Vec<ServiceInfo>>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub mission_id: Option<Uuid>,

    /// Most this negotiation may pay.
    #[serde(default, with = "agora_core::amount::option")]
    pub max_spend: Option<u128>,
}

impl NegotiationRequest {
    pub fn new(task_type: impl Into<String>, task: serde_json::Value) -> Self {
        Self {
            task_type: task_type.into(),
            task,
            ..Self::default()
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<ServiceInfo>) -> Self {
        self.candidates = Some(candidates);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_mission(mut self, mission_id: Uuid) -> Self {
        self.mission_id = Some(mission_id);
        self
    }

    pub fn with_max_spend(mut self, max_spend: u128) -> Self {
        self.max_spend = Some(max_spend);
        self
    }
}

/// Why a delivery was disputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeReason {
    /// The signature does not recover to the claimed provider.
    InvalidSignature,
    /// The receipt names someone other than the selected provider.
    ProviderMismatch,
    /// `resultHash` is not the digest of the delivered result.
    ResultHashMismatch,
}

/// Evidence collected when a delivery is disputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeReport {
    pub reasons: Vec<DisputeReason>,
    pub service_id: String,
    pub expected_provider: String,
    pub claimed_provider: String,
    pub recovered_signer: Option<String>,
    pub tx_hash: String,
    pub raised_at: DateTime<Utc>,
}

/// Everything a finished negotiation produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationReport {
    pub mission_id: Uuid,
    pub state: WorkflowState,
    pub service: ServiceInfo,
    pub tier: SelectionTier,
    pub scores: ScoreMap,
    pub quote: Quote,
    pub payment: PaymentTx,
    pub result: String,
    pub verification: ReceiptVerification,
    pub evaluation: Option<Evaluation>,
    pub feedback: Option<RecordedFeedback>,
    pub dispute: Option<DisputeReport>,
    pub trace: Vec<TraceEvent>,
    pub trace_digest: String,
}

impl NegotiationReport {
    pub fn is_disputed(&self) -> bool {
        self.state == WorkflowState::Disputed
    }
}

/// An aborted negotiation.
///
/// `payment` is set whenever money already left the wallet, so callers can
/// account for it.
#[derive(Debug, Error)]
#[error("negotiation failed while {state}: {error}")]
pub struct NegotiationFailure {
    pub error: AgoraError,
    pub state: WorkflowState,
    pub payment: Option<PaymentTx>,
    pub trace: Vec<TraceEvent>,
}

/// Per-run bookkeeping: current state and the ordered trace.
struct Run<'a> {
    state: WorkflowState,
    events: Vec<TraceEvent>,
    sink: &'a dyn TraceSink,
    payment: Option<PaymentTx>,
}

impl<'a> Run<'a> {
    fn new(sink: &'a dyn TraceSink) -> Self {
        Self {
            state: WorkflowState::Discovering,
            events: Vec::new(),
            sink,
            payment: None,
        }
    }

    fn emit(&mut self, event_type: TraceEventType, data: serde_json::Value) {
        let event = TraceEvent::new(event_type).with_data(data);
        self.sink.emit(&event);
        self.events.push(event);
    }

    fn enter(&mut self, state: WorkflowState) {
        debug!(from = %self.state, to = %state, "workflow transition");
        self.state = state;
        self.emit(TraceEventType::StateEntered, json!({ "state": state }));
    }

    fn fail(mut self, error: AgoraError) -> NegotiationFailure {
        warn!(state = %self.state, code = error.code(), error = %error, "negotiation failed");
        self.emit(
            TraceEventType::WorkflowFailed,
            json!({
                "state": self.state,
                "code": error.code(),
                "message": error.to_string(),
                "paid": self.payment.is_some(),
            }),
        );
        NegotiationFailure {
            error,
            state: self.state,
            payment: self.payment,
            trace: self.events,
        }
    }
}

/// Runs negotiations against one seller client and one funding wallet.
pub struct NegotiationWorkflow {
    registry: Option<Arc<dyn ServiceRegistry>>,
    selector: ServiceSelector,
    seller: Arc<dyn SellerClient>,
    settler: PaymentSettler,
    evaluator: Arc<dyn Evaluator>,
    recorder: FeedbackRecorder,
    trace: Arc<dyn TraceSink>,
    config: WorkflowConfig,
}

impl NegotiationWorkflow {
    pub fn new(
        selector: ServiceSelector,
        seller: Arc<dyn SellerClient>,
        settler: PaymentSettler,
        recorder: FeedbackRecorder,
    ) -> Self {
        Self {
            registry: None,
            selector,
            seller,
            settler,
            evaluator: Arc::new(LengthHeuristic),
            recorder,
            trace: Arc::new(LogTrace),
            config: WorkflowConfig::default(),
        }
    }

    /// Discover candidates here when a request carries none.
    pub fn with_registry(mut self, registry: Arc<dyn ServiceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_trace(mut self, trace: Arc<dyn TraceSink>) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn trace_sink(&self) -> &Arc<dyn TraceSink> {
        &self.trace
    }

    pub fn settler(&self) -> &PaymentSettler {
        &self.settler
    }

    pub fn ledger(&self) -> &Arc<dyn FeedbackLedger> {
        self.recorder.ledger()
    }

    /// Run one negotiation. `request.max_spend`, if set, caps the payment.
    pub async fn run(
        &self,
        request: NegotiationRequest,
        cancel: &CancelSignal,
    ) -> std::result::Result<NegotiationReport, NegotiationFailure> {
        let budget = request.max_spend.map(CommanderBudget::new);
        self.run_within(request, budget, cancel).await
    }

    /// Run one negotiation whose payment must fit in `budget`.
    pub async fn run_within(
        &self,
        request: NegotiationRequest,
        budget: Option<CommanderBudget>,
        cancel: &CancelSignal,
    ) -> std::result::Result<NegotiationReport, NegotiationFailure> {
        let mut run = Run::new(self.trace.as_ref());
        let mission_id = request.mission_id.unwrap_or_else(Uuid::new_v4);

        info!(mission = %mission_id, task_type = %request.task_type, "negotiation started");
        run.emit(
            TraceEventType::WorkflowStarted,
            json!({ "missionId": mission_id, "taskType": request.task_type }),
        );
        run.enter(WorkflowState::Discovering);

        let agreement = match self.negotiate(&mut run, &request, budget.as_ref(), cancel).await {
            Ok(agreement) => agreement,
            Err(e) => return Err(run.fail(e)),
        };
        let service = &agreement.service;

        run.enter(WorkflowState::Paying);
        let pending = match self.settler.submit(&agreement.quote).await {
            Ok(pending) => pending,
            Err(e) => return Err(run.fail(e)),
        };
        let payment = pending.tx.clone();
        // Recorded before confirmation so every later failure still reports the spend.
        run.payment = Some(payment.clone());
        run.emit(
            TraceEventType::PaymentSubmitted,
            json!({ "txHash": payment.tx_hash, "to": payment.to, "amount": payment.amount.to_string() }),
        );
        if let Err(e) = self.settler.confirm(&pending).await {
            return Err(run.fail(e));
        }
        run.emit(
            TraceEventType::PaymentConfirmed,
            json!({ "txHash": payment.tx_hash, "confirmations": self.settler.config().confirmations }),
        );

        run.enter(WorkflowState::Executing);
        let execution = self.seller.execute(service, &request.task, &payment);
        let delivery = match guarded(run.state, cancel, execution).await {
            Ok(delivery) => delivery,
            Err(e) => return Err(run.fail(e)),
        };
        run.emit(
            TraceEventType::DeliveryReceived,
            json!({ "resultHash": delivery.receipt.result_hash, "length": delivery.result.len() }),
        );

        run.enter(WorkflowState::Verifying);
        let verification = match delivery.receipt.verify() {
            Ok(verification) => verification,
            Err(e) => return Err(run.fail(e)),
        };
        run.emit(
            TraceEventType::ReceiptVerified,
            json!({ "isValid": verification.is_valid, "provider": verification.provider }),
        );

        let reasons = dispute_reasons(service, &delivery, &verification);
        if !reasons.is_empty() {
            let dispute = DisputeReport {
                reasons,
                service_id: service.id.clone(),
                expected_provider: service.provider_address.clone(),
                claimed_provider: delivery.receipt.provider.clone(),
                recovered_signer: verification.recovered.clone(),
                tx_hash: payment.tx_hash.clone(),
                raised_at: Utc::now(),
            };
            warn!(mission = %mission_id, service = %service.id, reasons = ?dispute.reasons, "delivery disputed");
            run.emit(TraceEventType::DisputeRaised, json!(dispute));
            run.enter(WorkflowState::Disputed);
            run.emit(TraceEventType::WorkflowCompleted, json!({ "state": WorkflowState::Disputed }));

            return Ok(finish(
                run,
                mission_id,
                agreement,
                payment,
                delivery.result,
                verification,
                None,
                None,
                Some(dispute),
            ));
        }

        run.enter(WorkflowState::Evaluating);
        let evaluation = self.evaluator.evaluate(&delivery.result);
        run.emit(
            TraceEventType::Evaluated,
            json!({ "score": evaluation.score, "summary": evaluation.summary }),
        );

        run.enter(WorkflowState::Feedback);
        let context = FeedbackContext {
            mission_id: Some(mission_id),
            tags: request.tags.clone(),
            text: None,
        };
        let recorded = match self.recorder.record(service, &evaluation, context).await {
            Ok(recorded) => recorded,
            Err(e) => return Err(run.fail(e)),
        };
        run.emit(
            TraceEventType::FeedbackRecorded,
            json!({ "agentId": recorded.feedback.agent_id, "value": recorded.feedback.value }),
        );
        if recorded.published == Some(false) {
            run.emit(
                TraceEventType::BestEffortFailed,
                json!({ "operation": "feedback_publish", "agentId": recorded.feedback.agent_id }),
            );
        }

        run.enter(WorkflowState::Done);
        run.emit(TraceEventType::WorkflowCompleted, json!({ "state": WorkflowState::Done }));
        info!(mission = %mission_id, service = %service.id, tx = %payment.tx_hash, "negotiation done");

        Ok(finish(
            run,
            mission_id,
            agreement,
            payment,
            delivery.result,
            verification,
            Some(evaluation),
            Some(recorded),
            None,
        ))
    }

    /// Discovery, selection and quoting, up to an accepted quote.
    async fn negotiate(
        &self,
        run: &mut Run<'_>,
        request: &NegotiationRequest,
        budget: Option<&CommanderBudget>,
        cancel: &CancelSignal,
    ) -> Result<Agreement> {
        let candidates = guarded(run.state, cancel, self.discover(request)).await?;
        run.emit(
            TraceEventType::CandidatesDiscovered,
            json!({
                "count": candidates.len(),
                "ids": candidates.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            }),
        );

        run.enter(WorkflowState::Selecting);
        let scores = guarded(run.state, cancel, async {
            Ok::<_, AgoraError>(self.selector.score_all(&candidates).await)
        })
        .await?;
        run.emit(TraceEventType::CandidatesScored, json!({ "scores": scores }));

        let selection = self.selector.choose(&request.task_type, &candidates, scores)?;
        run.emit(
            TraceEventType::ServiceSelected,
            json!({ "serviceId": selection.service.id, "tier": selection.tier }),
        );
        let service = selection.service;

        run.enter(WorkflowState::Quoting);
        let quote = guarded(
            run.state,
            cancel,
            self.seller.request_quote(&service, &request.task),
        )
        .await?;
        run.emit(
            TraceEventType::QuoteReceived,
            json!({
                "scheme": quote.scheme,
                "asset": quote.asset,
                "amount": quote.amount.to_string(),
                "payTo": quote.pay_to,
            }),
        );

        self.settler.validate(&quote)?;
        if self.config.check_quotes {
            check_quote(&service, &quote)?;
        }
        if let Some(budget) = budget {
            budget.ensure_affordable(quote.amount)?;
        }

        if cancel.is_cancelled() {
            return Err(AgoraError::Cancelled {
                state: run.state.to_string(),
            });
        }

        Ok(Agreement {
            service,
            tier: selection.tier,
            scores: selection.scores,
            quote,
        })
    }

    async fn discover(&self, request: &NegotiationRequest) -> Result<Vec<ServiceInfo>> {
        let candidates = match (&request.candidates, &self.registry) {
            (Some(candidates), _) => candidates.clone(),
            (None, Some(registry)) => registry.lookup(&request.task_type).await?,
            (None, None) => Vec::new(),
        };

        if candidates.is_empty() {
            return Err(AgoraError::NoCandidates {
                task_type: request.task_type.clone(),
            });
        }

        if !self.config.ledger_priors {
            return Ok(candidates);
        }

        // Priors are looked up under the same agent id the recorder writes to.
        let enriched = join_all(candidates.into_iter().map(|mut candidate| async move {
            if candidate.reputation.is_none() {
                let (agent_id, _) = self.recorder.resolve_agent(&candidate).await;
                match self.ledger().reputation(&agent_id).await {
                    Ok(prior) => candidate.reputation = prior,
                    Err(e) => debug!(service = %candidate.id, agent = %agent_id, error = %e, "ledger prior unavailable"),
                }
            }
            candidate
        }))
        .await;
        Ok(enriched)
    }
}

struct Agreement {
    service: ServiceInfo,
    tier: SelectionTier,
    scores: ScoreMap,
    quote: Quote,
}

#[allow(clippy::too_many_arguments)]
fn finish(
    run: Run<'_>,
    mission_id: Uuid,
    agreement: Agreement,
    payment: PaymentTx,
    result: String,
    verification: ReceiptVerification,
    evaluation: Option<Evaluation>,
    feedback: Option<RecordedFeedback>,
    dispute: Option<DisputeReport>,
) -> NegotiationReport {
    let digest = trace_digest(&run.events);
    NegotiationReport {
        mission_id,
        state: run.state,
        service: agreement.service,
        tier: agreement.tier,
        scores: agreement.scores,
        quote: agreement.quote,
        payment,
        result,
        verification,
        evaluation,
        feedback,
        dispute,
        trace: run.events,
        trace_digest: digest,
    }
}

/// Await `work` unless cancellation arrives first. From `Paying` on the
/// money may be gone, so cancellation no longer applies.
async fn guarded<T>(
    state: WorkflowState,
    cancel: &CancelSignal,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    if state.is_past_payment() {
        return work.await;
    }
    if cancel.is_cancelled() {
        return Err(AgoraError::Cancelled {
            state: state.to_string(),
        });
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AgoraError::Cancelled { state: state.to_string() }),
        result = work => result,
    }
}

fn check_quote(service: &ServiceInfo, quote: &Quote) -> Result<()> {
    if !same_address(&quote.pay_to, &service.provider_address) {
        return Err(AgoraError::QuoteRejected {
            reason: format!(
                "payee {} is not the selected provider {}",
                quote.pay_to, service.provider_address
            ),
        });
    }
    if quote.amount > service.price {
        return Err(AgoraError::QuoteRejected {
            reason: format!(
                "quoted {} exceeds advertised price {}",
                quote.amount, service.price
            ),
        });
    }
    Ok(())
}

fn dispute_reasons(
    service: &ServiceInfo,
    delivery: &Delivery,
    verification: &ReceiptVerification,
) -> Vec<DisputeReason> {
    let mut reasons = Vec::new();
    if !verification.is_valid {
        reasons.push(DisputeReason::InvalidSignature);
    }
    if !same_address(&delivery.receipt.provider, &service.provider_address) {
        reasons.push(DisputeReason::ProviderMismatch);
    }
    if !delivery
        .receipt
        .result_hash
        .eq_ignore_ascii_case(&result_digest(&delivery.result))
    {
        reasons.push(DisputeReason::ResultHashMismatch);
    }
    reasons
}
