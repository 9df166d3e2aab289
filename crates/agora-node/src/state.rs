//! Application state.

use std::sync::Arc;
use std::time::Duration;

use agora_core::{
    AgentIdentity, FeedbackPublisher, SellerClient, ServiceProbe, TraceEvent, TraceSink,
};
use agora_ledger::{InMemoryFeedbackLedger, InMemoryRegistry};
use agora_negotiate::{FeedbackRecorder, NegotiationWorkflow};
use agora_sdk::{HttpFeedbackPublisher, HttpSellerClient, HttpServiceProbe};
use agora_select::{ReputationScorer, ScorerConfig, SelectorConfig, ServiceSelector};
use agora_settle::{PaymentSettler, SettlerConfig, SimulatedWallet};
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::NodeConfig;
use crate::seller::DemoSeller;

/// Trace sink that fans events out to websocket subscribers.
pub struct BroadcastTrace {
    tx: broadcast::Sender<TraceEvent>,
}

impl BroadcastTrace {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TraceEvent> {
        self.tx.subscribe()
    }
}

impl TraceSink for BroadcastTrace {
    fn emit(&self, event: &TraceEvent) {
        debug!(event = ?event.event_type, "trace");
        // No subscribers is fine.
        let _ = self.tx.send(event.clone());
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<NodeConfig>,

    /// This buyer's identity, fixed at startup.
    pub identity: Arc<AgentIdentity>,

    /// The negotiation workflow all requests run through.
    pub workflow: Arc<NegotiationWorkflow>,

    pub registry: Arc<InMemoryRegistry>,

    pub ledger: Arc<InMemoryFeedbackLedger>,

    pub wallet: Arc<SimulatedWallet>,

    pub trace: Arc<BroadcastTrace>,

    /// Present when the demo seller is enabled.
    pub seller: Option<Arc<DemoSeller>>,
}

impl AppState {
    /// State talking HTTP to sellers.
    pub fn new(config: NodeConfig) -> anyhow::Result<Self> {
        let probe = Arc::new(HttpServiceProbe::with_timeout(config.info_timeout()));
        let seller = Arc::new(HttpSellerClient::with_timeouts(
            config.info_timeout(),
            config.execute_timeout(),
        ));
        let publisher = config
            .feedback_publish_url
            .clone()
            .map(|url| Arc::new(HttpFeedbackPublisher::new(url)) as Arc<dyn FeedbackPublisher>);

        Self::assemble(config, probe, seller, publisher)
    }

    /// State with explicit collaborators.
    pub fn assemble(
        config: NodeConfig,
        probe: Arc<dyn ServiceProbe>,
        seller_client: Arc<dyn SellerClient>,
        publisher: Option<Arc<dyn FeedbackPublisher>>,
    ) -> anyhow::Result<Self> {
        let wallet = Arc::new(
            SimulatedWallet::new(config.wallet_address.clone(), config.wallet_balance)
                .with_block_time(Duration::from_millis(config.block_time_ms)),
        );
        let ledger = Arc::new(InMemoryFeedbackLedger::new());
        let registry = Arc::new(InMemoryRegistry::new());
        let trace = Arc::new(BroadcastTrace::new(256));

        let identity = AgentIdentity::new(
            config.agent_id.clone(),
            config.wallet_address.clone(),
            config.network_id.clone(),
            Utc::now(),
        );

        let scorer = ReputationScorer::with_config(
            probe.clone(),
            ScorerConfig {
                probe_timeout_ms: config.info_timeout_ms,
                ..ScorerConfig::default()
            },
        );
        let selector = ServiceSelector::new(scorer).with_config(SelectorConfig {
            max_concurrency: config.max_concurrency,
        });
        let settler = PaymentSettler::with_config(
            wallet.clone(),
            SettlerConfig {
                scheme: config.scheme.clone(),
                asset: config.asset.clone(),
                confirmations: config.confirmations,
                payment_timeout_ms: config.payment_timeout_ms,
            },
        );
        let mut recorder = FeedbackRecorder::new(probe, ledger.clone())
            .with_identity_timeout(config.info_timeout());
        if let Some(publisher) = publisher {
            recorder = recorder.with_publisher(publisher);
        }

        let workflow = NegotiationWorkflow::new(selector, seller_client, settler, recorder)
            .with_registry(registry.clone())
            .with_trace(trace.clone());

        let seller = if config.demo_seller {
            Some(Arc::new(DemoSeller::new(&config, ledger.clone(), wallet.clone())?))
        } else {
            None
        };

        Ok(Self {
            config: Arc::new(config),
            identity: Arc::new(identity),
            workflow: Arc::new(workflow),
            registry,
            ledger,
            wallet,
            trace,
            seller,
        })
    }

    /// Endpoint under which the demo seller is reachable.
    pub fn seller_endpoint(&self) -> String {
        format!("{}/seller", self.config.public_url.trim_end_matches('/'))
    }
}
