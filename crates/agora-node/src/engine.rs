//! Background upkeep of the node's registry.

use std::sync::Arc;

use agora_core::ServiceRegistry;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Keeps the demo seller listed and expired listings pruned.
pub struct Engine {
    state: AppState,
}

impl Engine {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Run the upkeep loop. Re-advertises at half the listing TTL.
    pub async fn run(self: Arc<Self>) {
        info!("registry upkeep started");

        let period = (self.state.config.service_ttl() / 2).max(Duration::from_secs(1));
        let mut ticker = interval(period);

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// One round of upkeep.
    pub async fn tick(&self) {
        let pruned = self.state.registry.prune().await;
        if pruned > 0 {
            debug!(pruned, "expired listings removed");
        }

        if let Some(seller) = &self.state.seller {
            let listing = seller.listing(&self.state.seller_endpoint());
            if let Err(e) = self
                .state
                .registry
                .advertise(listing, self.state.config.service_ttl())
                .await
            {
                warn!(error = %e, "demo seller advertisement failed, continuing");
            }
        }
    }
}
