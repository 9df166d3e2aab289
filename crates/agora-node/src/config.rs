//! Node configuration.
//!
//! Every setting has a default and can be overridden by an `AGORA_*`
//! environment variable, optionally loaded from a `.env` file.

use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Configuration of an Agora node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: String,

    /// URL other agents reach this node at. Used for the demo seller listing.
    pub public_url: String,

    /// Chain-style network id of the wallet and listings.
    pub network_id: String,

    /// Agent id of this buyer.
    pub agent_id: String,

    /// Deadline for reputation and identity lookups.
    pub info_timeout_ms: u64,

    /// Deadline for a paid seller request.
    pub execute_timeout_ms: u64,

    /// Deadline for balance check, transfer and confirmation.
    pub payment_timeout_ms: u64,

    /// Blocks to wait for after a transfer.
    pub confirmations: u32,

    /// Parallel reputation lookups during selection.
    pub max_concurrency: usize,

    /// Address of the simulated funding wallet.
    pub wallet_address: String,

    /// Opening balance of the simulated wallet, in minor units.
    #[serde(with = "agora_core::amount")]
    pub wallet_balance: u128,

    /// Simulated block time.
    pub block_time_ms: u64,

    /// The payment scheme this node settles.
    pub scheme: String,

    /// The asset this node pays with.
    pub asset: String,

    /// Commander cap used when a request does not carry one.
    #[serde(with = "agora_core::amount")]
    pub commander_cap: u128,

    /// Serve a demo seller under `/seller`.
    pub demo_seller: bool,

    /// Hex secret key of the demo seller. Random when unset.
    pub seller_key: Option<String>,

    /// Price the demo seller advertises and quotes.
    #[serde(with = "agora_core::amount")]
    pub seller_price: u128,

    /// Task type the demo seller serves.
    pub seller_task_type: String,

    /// Lifetime of registry listings.
    pub service_ttl_secs: u64,

    /// Where recorded feedback is also posted, if anywhere.
    pub feedback_publish_url: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            public_url: "http://127.0.0.1:3000".to_string(),
            network_id: "eip155:84532".to_string(),
            agent_id: "agora-buyer".to_string(),
            info_timeout_ms: 1200,
            execute_timeout_ms: 60_000,
            payment_timeout_ms: 120_000,
            confirmations: 1,
            max_concurrency: 8,
            wallet_address: "0x1111111111111111111111111111111111111111".to_string(),
            wallet_balance: 1_000_000_000_000_000_000,
            block_time_ms: 0,
            scheme: "exact-native".to_string(),
            asset: "native".to_string(),
            commander_cap: 100_000_000_000_000_000,
            demo_seller: true,
            seller_key: None,
            seller_price: 1_000_000_000_000_000,
            seller_task_type: "summarize".to_string(),
            service_ttl_secs: 300,
            feedback_publish_url: None,
        }
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {}='{}': {}", key, raw, e)),
        _ => Ok(default),
    }
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl NodeConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let d = Self::default();
        let config = Self {
            bind_addr: parse(&lookup, "AGORA_BIND_ADDR", d.bind_addr)?,
            public_url: parse(&lookup, "AGORA_PUBLIC_URL", d.public_url)?,
            network_id: parse(&lookup, "AGORA_NETWORK_ID", d.network_id)?,
            agent_id: parse(&lookup, "AGORA_AGENT_ID", d.agent_id)?,
            info_timeout_ms: parse(&lookup, "AGORA_INFO_TIMEOUT_MS", d.info_timeout_ms)?,
            execute_timeout_ms: parse(&lookup, "AGORA_EXECUTE_TIMEOUT_MS", d.execute_timeout_ms)?,
            payment_timeout_ms: parse(&lookup, "AGORA_PAYMENT_TIMEOUT_MS", d.payment_timeout_ms)?,
            confirmations: parse(&lookup, "AGORA_CONFIRMATIONS", d.confirmations)?,
            max_concurrency: parse(&lookup, "AGORA_MAX_CONCURRENCY", d.max_concurrency)?,
            wallet_address: parse(&lookup, "AGORA_WALLET_ADDRESS", d.wallet_address)?,
            wallet_balance: parse(&lookup, "AGORA_WALLET_BALANCE", d.wallet_balance)?,
            block_time_ms: parse(&lookup, "AGORA_BLOCK_TIME_MS", d.block_time_ms)?,
            scheme: parse(&lookup, "AGORA_SCHEME", d.scheme)?,
            asset: parse(&lookup, "AGORA_ASSET", d.asset)?,
            commander_cap: parse(&lookup, "AGORA_COMMANDER_CAP", d.commander_cap)?,
            demo_seller: parse(&lookup, "AGORA_DEMO_SELLER", d.demo_seller)?,
            seller_key: optional(&lookup, "AGORA_SELLER_KEY"),
            seller_price: parse(&lookup, "AGORA_SELLER_PRICE", d.seller_price)?,
            seller_task_type: parse(&lookup, "AGORA_SELLER_TASK_TYPE", d.seller_task_type)?,
            service_ttl_secs: parse(&lookup, "AGORA_SERVICE_TTL_SECS", d.service_ttl_secs)?,
            feedback_publish_url: optional(&lookup, "AGORA_FEEDBACK_PUBLISH_URL"),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.socket_addr()?;
        anyhow::ensure!(self.max_concurrency > 0, "AGORA_MAX_CONCURRENCY must be at least 1");
        anyhow::ensure!(self.service_ttl_secs > 0, "AGORA_SERVICE_TTL_SECS must be at least 1");
        anyhow::ensure!(
            agora_core::receipt::normalize_address(&self.wallet_address).is_some(),
            "AGORA_WALLET_ADDRESS is not a 20-byte hex address"
        );
        Ok(())
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.bind_addr
            .parse()
            .with_context(|| format!("invalid bind address '{}'", self.bind_addr))
    }

    pub fn info_timeout(&self) -> Duration {
        Duration::from_millis(self.info_timeout_ms)
    }

    pub fn execute_timeout(&self) -> Duration {
        Duration::from_millis(self.execute_timeout_ms)
    }

    pub fn service_ttl(&self) -> Duration {
        Duration::from_secs(self.service_ttl_secs)
    }
}
