//! # Agora Node
//!
//! Buyer-agent node: negotiation API, live trace and an optional demo seller.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod api;
mod config;
mod engine;
mod seller;
mod state;

use config::NodeConfig;
use engine::Engine;
use state::AppState;

/// Run the Agora node server.
pub async fn run_server(config: NodeConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Agora node starting");

    let addr = config.socket_addr()?;
    let state = AppState::new(config)?;

    info!(
        agent = %state.identity.agent_id,
        wallet = %state.identity.address,
        network = %state.identity.network_id,
        "buyer identity"
    );
    if let Some(seller) = &state.seller {
        info!(address = %seller.address(), endpoint = %state.seller_endpoint(), "demo seller enabled");
    }

    let engine = Arc::new(Engine::new(state.clone()));
    tokio::spawn(engine.run());

    let app = create_router(state);

    info!("Listening on http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the API router.
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(api::health::health_check))
        // Negotiation
        .route("/api/v1/negotiate", post(api::negotiate::negotiate))
        .route("/api/v1/commander", post(api::commander::run_commander))
        // Registry
        .route("/api/v1/services", post(api::services::advertise_service))
        .route("/api/v1/services/:task_type", get(api::services::list_services))
        // Feedback ledger
        .route("/api/v1/feedback/:agent_id", get(api::feedback::list_feedback))
        .route("/api/v1/feedback/:agent_id/summary", get(api::feedback::feedback_summary))
        .route("/api/v1/wallet", get(api::wallet::wallet_info))
        // Live trace
        .route("/ws/trace", get(api::ws::trace_stream));

    if state.seller.is_some() {
        router = router
            .route("/seller/task", post(api::seller::task))
            .route("/seller/reputation", get(api::seller::reputation))
            .route("/seller/identity", get(api::seller::identity));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = NodeConfig::from_env()?;
    run_server(config).await
}
