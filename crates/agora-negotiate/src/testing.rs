//! Mock collaborators shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use agora_core::{
    AgoraError, CounterpartyIdentity, Delivery, Feedback, FeedbackPublisher, LocalSigner,
    PaymentTx, Quote, Result, SellerClient, ServiceInfo, ServiceProbe,
};
use agora_ledger::InMemoryFeedbackLedger;
use agora_select::{ReputationScorer, ServiceSelector};
use agora_settle::{PaymentSettler, SimulatedWallet};
use async_trait::async_trait;

use crate::recorder::FeedbackRecorder;
use crate::workflow::NegotiationWorkflow;

pub const BUYER: &str = "0x00000000000000000000000000000000000000aa";

pub const KEY_A: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

pub fn service(id: &str, price: u128) -> ServiceInfo {
    ServiceInfo {
        id: id.to_string(),
        network_id: "eip155:84532".to_string(),
        provider_address: "0x00000000000000000000000000000000000000Bb".to_string(),
        endpoint: format!("http://{}.test", id),
        task_type: "summarize".to_string(),
        price,
        currency: "ETH".to_string(),
        reputation: None,
    }
}

/// Probe answering from fixed tables keyed by endpoint.
#[derive(Default)]
pub struct StubProbe {
    reputation: HashMap<String, f64>,
    identity: Option<CounterpartyIdentity>,
}

impl StubProbe {
    pub fn with_reputation(mut self, endpoint: &str, average: f64) -> Self {
        self.reputation.insert(endpoint.to_string(), average);
        self
    }

    pub fn with_identity(mut self, identity: CounterpartyIdentity) -> Self {
        self.identity = Some(identity);
        self
    }
}

#[async_trait]
impl ServiceProbe for StubProbe {
    async fn reputation(&self, endpoint: &str) -> Option<f64> {
        self.reputation.get(endpoint).copied()
    }

    async fn identity(&self, _endpoint: &str) -> Option<CounterpartyIdentity> {
        self.identity.clone()
    }
}

#[derive(Default)]
pub struct FailingPublisher {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl FeedbackPublisher for FailingPublisher {
    async fn publish(&self, _feedback: &Feedback) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AgoraError::internal("registry unreachable"))
    }
}

/// Seller that signs every receipt with one key.
pub struct MockSeller {
    signer: LocalSigner,
    result: String,
    quote_amount: Option<u128>,
    claimed_provider: Option<String>,
    pub quotes: AtomicUsize,
    pub executions: AtomicUsize,
}

impl MockSeller {
    pub fn new(signer: LocalSigner) -> Self {
        Self {
            signer,
            result: "a".repeat(300),
            quote_amount: None,
            claimed_provider: None,
            quotes: AtomicUsize::new(0),
            executions: AtomicUsize::new(0),
        }
    }

    pub fn address(&self) -> String {
        self.signer.address().to_string()
    }

    /// A listing whose provider is this seller's signing address.
    pub fn service(&self, id: &str, price: u128) -> ServiceInfo {
        ServiceInfo {
            provider_address: self.address(),
            ..service(id, price)
        }
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = result.into();
        self
    }

    /// Quote this amount instead of the advertised price.
    pub fn quoting(mut self, amount: u128) -> Self {
        self.quote_amount = Some(amount);
        self
    }

    /// Put another address in the receipt's `provider` field.
    pub fn claiming(mut self, provider: impl Into<String>) -> Self {
        self.claimed_provider = Some(provider.into());
        self
    }
}

#[async_trait]
impl SellerClient for MockSeller {
    async fn request_quote(&self, service: &ServiceInfo, task: &serde_json::Value) -> Result<Quote> {
        self.quotes.fetch_add(1, Ordering::SeqCst);
        Ok(Quote {
            scheme: "exact-native".to_string(),
            asset: "native".to_string(),
            amount: self.quote_amount.unwrap_or(service.price),
            pay_to: service.provider_address.clone(),
            task: task.clone(),
        })
    }

    async fn execute(
        &self,
        _service: &ServiceInfo,
        _task: &serde_json::Value,
        payment: &PaymentTx,
    ) -> Result<Delivery> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let mut receipt = self.signer.sign_receipt(payment.tx_hash.clone(), &self.result)?;
        if let Some(provider) = &self.claimed_provider {
            receipt.provider = provider.clone();
        }
        Ok(Delivery {
            result: self.result.clone(),
            receipt,
        })
    }
}

/// Everything a workflow test wants to inspect afterwards.
pub struct Harness {
    pub workflow: NegotiationWorkflow,
    pub wallet: Arc<SimulatedWallet>,
    pub ledger: Arc<InMemoryFeedbackLedger>,
    pub seller: Arc<MockSeller>,
}

pub fn harness(seller: MockSeller, probe: StubProbe, balance: u128) -> Harness {
    let wallet = Arc::new(SimulatedWallet::new(BUYER, balance));
    let ledger = Arc::new(InMemoryFeedbackLedger::new());
    let seller = Arc::new(seller);

    let workflow = workflow_with(
        seller.clone(),
        PaymentSettler::new(wallet.clone()),
        probe,
        ledger.clone(),
    );

    Harness {
        workflow,
        wallet,
        ledger,
        seller,
    }
}

/// A workflow over arbitrary collaborators, for tests that wrap the mocks.
pub fn workflow_with(
    seller: Arc<dyn SellerClient>,
    settler: PaymentSettler,
    probe: StubProbe,
    ledger: Arc<InMemoryFeedbackLedger>,
) -> NegotiationWorkflow {
    let probe: Arc<dyn ServiceProbe> = Arc::new(probe);
    NegotiationWorkflow::new(
        ServiceSelector::new(ReputationScorer::new(probe.clone())),
        seller,
        settler,
        FeedbackRecorder::new(probe, ledger),
    )
}
