//! Funding wallet interface and an in-memory simulation.
//!
//! Key storage and transaction signing belong to the wallet; the settler only
//! sees the address, the balance, and a submit/confirm pair for sending value.

use std::collections::HashMap;
use std::time::Duration;

use agora_core::receipt::normalize_address;
use agora_core::{AgoraError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use tokio::sync::Mutex;
use tracing::debug;

/// A wallet balance in minor units plus a human rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    #[serde(with = "agora_core::amount")]
    pub wei: u128,
    pub display: String,
}

impl Balance {
    pub fn from_wei(wei: u128) -> Self {
        Self {
            wei,
            display: format_units(wei, 18),
        }
    }
}

/// Render a minor-unit amount with `decimals` places, trimming trailing zeros.
pub fn format_units(amount: u128, decimals: u32) -> String {
    let base = 10u128.pow(decimals);
    let whole = amount / base;
    let frac = amount % base;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0width$}", frac, width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Signing/funding capability of one agent identity.
///
/// Sending value is split in two so a caller always learns the tx hash of
/// money that left the wallet, even if confirmation later times out.
#[async_trait]
pub trait FundingWallet: Send + Sync {
    /// Address payments are sent from.
    fn address(&self) -> String;

    /// Current spendable balance.
    async fn balance(&self) -> Result<Balance>;

    /// Sign and broadcast a transfer of `amount` to `to`. Returns the tx hash.
    ///
    /// An error means nothing was sent.
    async fn submit(&self, to: &str, amount: u128) -> Result<String>;

    /// Wait until `tx_hash` is `confirmations` blocks deep.
    async fn confirm(&self, tx_hash: &str, confirmations: u32) -> Result<()>;
}

/// One transfer executed by a [`SimulatedWallet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedTransfer {
    pub tx_hash: String,
    pub to: String,
    pub amount: u128,
    pub nonce: u64,
}

#[derive(Debug, Default)]
struct SimLedger {
    balance: u128,
    nonce: u64,
    credits: HashMap<String, u128>,
    history: Vec<SimulatedTransfer>,
}

/// In-memory wallet for demos and tests.
///
/// Confirmation is simulated with a fixed delay per block.
#[derive(Debug)]
pub struct SimulatedWallet {
    address: String,
    block_time: Duration,
    ledger: Mutex<SimLedger>,
}

impl SimulatedWallet {
    pub fn new(address: impl Into<String>, balance: u128) -> Self {
        let address = address.into();
        let address = normalize_address(&address).unwrap_or(address);
        Self {
            address,
            block_time: Duration::ZERO,
            ledger: Mutex::new(SimLedger {
                balance,
                ..SimLedger::default()
            }),
        }
    }

    pub fn with_block_time(mut self, block_time: Duration) -> Self {
        self.block_time = block_time;
        self
    }

    /// Total received by `address` from this wallet.
    pub async fn credited(&self, address: &str) -> u128 {
        let key = normalize_address(address).unwrap_or_else(|| address.to_string());
        self.ledger.lock().await.credits.get(&key).copied().unwrap_or(0)
    }

    /// Every transfer so far, oldest first.
    pub async fn transfers(&self) -> Vec<SimulatedTransfer> {
        self.ledger.lock().await.history.clone()
    }
}

#[async_trait]
impl FundingWallet for SimulatedWallet {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn balance(&self) -> Result<Balance> {
        Ok(Balance::from_wei(self.ledger.lock().await.balance))
    }

    async fn submit(&self, to: &str, amount: u128) -> Result<String> {
        let to = normalize_address(to).ok_or_else(|| AgoraError::internal(format!("invalid recipient address '{}'", to)))?;

        let mut ledger = self.ledger.lock().await;
        if ledger.balance < amount {
            return Err(AgoraError::InsufficientBalance {
                balance: ledger.balance,
                required: amount,
            });
        }
        ledger.balance -= amount;
        ledger.nonce += 1;
        *ledger.credits.entry(to.clone()).or_default() += amount;

        let mut hasher = Keccak256::new();
        hasher.update(self.address.as_bytes());
        hasher.update(to.as_bytes());
        hasher.update(amount.to_be_bytes());
        hasher.update(ledger.nonce.to_be_bytes());
        let transfer = SimulatedTransfer {
            tx_hash: format!("0x{}", hex::encode(hasher.finalize())),
            to,
            amount,
            nonce: ledger.nonce,
        };
        debug!(tx = %transfer.tx_hash, nonce = transfer.nonce, "simulated transfer submitted");
        ledger.history.push(transfer.clone());

        Ok(transfer.tx_hash)
    }

    async fn confirm(&self, tx_hash: &str, confirmations: u32) -> Result<()> {
        let known = self.ledger.lock().await.history.iter().any(|t| t.tx_hash == tx_hash);
        if !known {
            return Err(AgoraError::internal(format!("unknown transaction {}", tx_hash)));
        }

        for block in 1..=confirmations {
            tokio::time::sleep(self.block_time).await;
            debug!(tx = %tx_hash, block, "simulated confirmation");
        }
        Ok(())
    }
}
