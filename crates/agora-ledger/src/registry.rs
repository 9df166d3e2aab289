//! In-memory service registry with TTL expiry.

use std::time::Duration;

use agora_core::{AgoraError, Result, ServiceInfo, ServiceRegistry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct Listing {
    service: ServiceInfo,
    expires_at: DateTime<Utc>,
}

/// Registry kept in process memory.
///
/// Re-advertising a service id replaces its listing in place; lookups return
/// live listings in first-advertised order.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    listings: RwLock<Vec<Listing>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired listings. Returns how many were removed.
    pub async fn prune(&self) -> usize {
        let now = Utc::now();
        let mut listings = self.listings.write().await;
        let before = listings.len();
        listings.retain(|l| l.expires_at > now);
        before - listings.len()
    }
}

#[async_trait]
impl ServiceRegistry for InMemoryRegistry {
    async fn advertise(&self, service: ServiceInfo, ttl: Duration) -> Result<()> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| AgoraError::internal(format!("invalid ttl: {}", e)))?;
        let listing = Listing {
            expires_at: Utc::now() + ttl,
            service,
        };

        debug!(service = %listing.service.id, task = %listing.service.task_type, "service advertised");

        let mut listings = self.listings.write().await;
        match listings.iter_mut().find(|l| l.service.id == listing.service.id) {
            Some(existing) => *existing = listing,
            None => listings.push(listing),
        }
        Ok(())
    }

    async fn lookup(&self, task_type: &str) -> Result<Vec<ServiceInfo>> {
        let now = Utc::now();
        let listings = self.listings.read().await;
        Ok(listings
            .iter()
            .filter(|l| l.expires_at > now && l.service.task_type == task_type)
            .map(|l| l.service.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(id: &str, task_type: &str, price: u128) -> ServiceInfo {
        ServiceInfo {
            id: id.to_string(),
            network_id: "eip155:84532".to_string(),
            provider_address: "0x0000000000000000000000000000000000000001".to_string(),
            endpoint: format!("http://{}.test", id),
            task_type: task_type.to_string(),
            price,
            currency: "ETH".to_string(),
            reputation: None,
        }
    }

    #[tokio::test]
    async fn test_lookup_filters_by_task_type() {
        let registry = InMemoryRegistry::new();
        let ttl = Duration::from_secs(60);
        registry.advertise(service("a", "summarize", 1), ttl).await.unwrap();
        registry.advertise(service("b", "translate", 1), ttl).await.unwrap();
        registry.advertise(service("c", "summarize", 2), ttl).await.unwrap();

        let found = registry.lookup("summarize").await.unwrap();
        let ids: Vec<&str> = found.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_readvertise_replaces_in_place() {
        let registry = InMemoryRegistry::new();
        let ttl = Duration::from_secs(60);
        registry.advertise(service("a", "summarize", 1), ttl).await.unwrap();
        registry.advertise(service("b", "summarize", 1), ttl).await.unwrap();
        registry.advertise(service("a", "summarize", 9), ttl).await.unwrap();

        let found = registry.lookup("summarize").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, "a");
        assert_eq!(found[0].price, 9);
    }

    #[tokio::test]
    async fn test_expired_listings_are_hidden() {
        let registry = InMemoryRegistry::new();
        registry
            .advertise(service("a", "summarize", 1), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(registry.lookup("summarize").await.unwrap().is_empty());
        assert_eq!(registry.prune().await, 1);
    }
}
