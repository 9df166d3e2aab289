//! Payment settlement against a funding wallet.

use std::sync::Arc;
use std::time::Duration;

use agora_core::{AgoraError, PaymentTx, Quote, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::wallet::FundingWallet;

/// Configuration for the settler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlerConfig {
    /// The single payment scheme this agent settles.
    pub scheme: String,

    /// The single native asset this agent pays with.
    pub asset: String,

    /// Blocks to wait for before a payment counts as settled.
    pub confirmations: u32,

    /// Deadline for balance check and confirmation together.
    pub payment_timeout_ms: u64,
}

impl Default for SettlerConfig {
    fn default() -> Self {
        Self {
            scheme: "exact-native".to_string(),
            asset: "native".to_string(),
            confirmations: 1,
            payment_timeout_ms: 120_000,
        }
    }
}

/// Validates quotes and executes the corresponding transfer.
///
/// Clones share one submission lock, so a settler per wallet identity keeps
/// payments from that identity strictly sequential.
#[derive(Clone)]
pub struct PaymentSettler {
    wallet: Arc<dyn FundingWallet>,
    config: SettlerConfig,
    submit_lock: Arc<Mutex<()>>,
}

impl PaymentSettler {
    pub fn new(wallet: Arc<dyn FundingWallet>) -> Self {
        Self::with_config(wallet, SettlerConfig::default())
    }

    pub fn with_config(wallet: Arc<dyn FundingWallet>, config: SettlerConfig) -> Self {
        Self {
            wallet,
            config,
            submit_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn config(&self) -> &SettlerConfig {
        &self.config
    }

    pub fn wallet(&self) -> &Arc<dyn FundingWallet> {
        &self.wallet
    }

    /// Reject quotes for any scheme or asset other than the supported pair.
    pub fn validate(&self, quote: &Quote) -> Result<()> {
        if quote.scheme != self.config.scheme || quote.asset != self.config.asset {
            return Err(AgoraError::UnsupportedPaymentScheme {
                scheme: quote.scheme.clone(),
                asset: quote.asset.clone(),
            });
        }
        Ok(())
    }

    /// Pay exactly the quoted amount to the quoted payee.
    ///
    /// This is a real transfer: callers must invoke it at most once per
    /// accepted quote and never retry after it returns an error. Once it
    /// returns `Ok` the money has left the wallet; confirm it with
    /// [`PaymentSettler::confirm`].
    pub async fn submit(&self, quote: &Quote) -> Result<PendingPayment> {
        self.validate(quote)?;

        let deadline = Instant::now() + Duration::from_millis(self.config.payment_timeout_ms);
        let _guard = self.submit_lock.lock().await;

        let balance = match tokio::time::timeout_at(deadline, self.wallet.balance()).await {
            Ok(balance) => balance?,
            Err(_) => return Err(self.timed_out("balance check", quote)),
        };
        if balance.wei < quote.amount {
            warn!(
                balance = %balance.wei,
                required = %quote.amount,
                "insufficient balance, payment not attempted"
            );
            return Err(AgoraError::InsufficientBalance {
                balance: balance.wei,
                required: quote.amount,
            });
        }

        // Not raced against the deadline: a submission either fails with
        // nothing sent or yields the hash of what was sent.
        let tx_hash = self.wallet.submit(&quote.pay_to, quote.amount).await?;
        info!(tx = %tx_hash, to = %quote.pay_to, amount = %quote.amount, "payment submitted");

        Ok(PendingPayment {
            tx: PaymentTx {
                tx_hash,
                from: self.wallet.address(),
                to: quote.pay_to.clone(),
                amount: quote.amount,
            },
            deadline,
        })
    }

    /// Wait for the configured confirmation depth within what is left of
    /// the payment deadline.
    pub async fn confirm(&self, pending: &PendingPayment) -> Result<()> {
        let confirmations = self.config.confirmations.max(1);
        let tx = &pending.tx;

        match tokio::time::timeout_at(
            pending.deadline,
            self.wallet.confirm(&tx.tx_hash, confirmations),
        )
        .await
        {
            Ok(result) => {
                result?;
                info!(tx = %tx.tx_hash, confirmations, "payment confirmed");
                Ok(())
            }
            Err(_) => {
                warn!(tx = %tx.tx_hash, amount = %tx.amount, "payment sent but not confirmed in time");
                Err(AgoraError::NetworkTimeout {
                    operation: "payment confirmation".to_string(),
                    duration_ms: self.config.payment_timeout_ms,
                })
            }
        }
    }

    fn timed_out(&self, operation: &str, quote: &Quote) -> AgoraError {
        warn!(to = %quote.pay_to, amount = %quote.amount, operation, "payment timed out before sending");
        AgoraError::NetworkTimeout {
            operation: operation.to_string(),
            duration_ms: self.config.payment_timeout_ms,
        }
    }
}

/// A submitted payment awaiting confirmation.
#[derive(Debug, Clone)]
pub struct PendingPayment {
    pub tx: PaymentTx,
    deadline: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::{Balance, SimulatedWallet};
    use agora_core::ErrorKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ME: &str = "0x00000000000000000000000000000000000000aa";
    const SELLER: &str = "0x00000000000000000000000000000000000000bb";

    /// Wallet that fails the test if anyone tries to move money.
    struct NoTransferWallet {
        balance: u128,
    }

    #[async_trait]
    impl FundingWallet for NoTransferWallet {
        fn address(&self) -> String {
            ME.to_string()
        }

        async fn balance(&self) -> Result<Balance> {
            Ok(Balance::from_wei(self.balance))
        }

        async fn submit(&self, _to: &str, _amount: u128) -> Result<String> {
            panic!("submit must not be called");
        }

        async fn confirm(&self, _tx_hash: &str, _confirmations: u32) -> Result<()> {
            panic!("confirm must not be called");
        }
    }

    /// Wallet that records the highest number of overlapping submissions.
    struct SlowWallet {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl FundingWallet for SlowWallet {
        fn address(&self) -> String {
            ME.to_string()
        }

        async fn balance(&self) -> Result<Balance> {
            Ok(Balance::from_wei(u128::MAX))
        }

        async fn submit(&self, _to: &str, _amount: u128) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(15)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok("0xabc".to_string())
        }

        async fn confirm(&self, _tx_hash: &str, _confirmations: u32) -> Result<()> {
            Ok(())
        }
    }

    fn quote(amount: u128) -> Quote {
        Quote {
            scheme: "exact-native".to_string(),
            asset: "native".to_string(),
            amount,
            pay_to: SELLER.to_string(),
            task: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_insufficient_balance_never_transfers() {
        let settler = PaymentSettler::new(Arc::new(NoTransferWallet { balance: 50 }));
        let err = settler.submit(&quote(100)).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert_eq!(
            err.details(),
            serde_json::json!({ "balanceWei": "50", "requiredWei": "100" })
        );
    }

    #[tokio::test]
    async fn test_unsupported_scheme_never_transfers() {
        let settler = PaymentSettler::new(Arc::new(NoTransferWallet { balance: 1_000 }));

        let mut q = quote(10);
        q.scheme = "exact-erc20".to_string();
        let err = settler.submit(&q).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedPaymentScheme);

        let mut q = quote(10);
        q.asset = "usdc".to_string();
        assert_eq!(settler.submit(&q).await.unwrap_err().kind(), ErrorKind::UnsupportedPaymentScheme);
    }

    #[tokio::test]
    async fn test_pays_exact_amount() {
        let wallet = Arc::new(SimulatedWallet::new(ME, 500));
        let settler = PaymentSettler::new(wallet.clone());

        let pending = settler.submit(&quote(120)).await.unwrap();
        settler.confirm(&pending).await.unwrap();

        let tx = pending.tx;
        assert_eq!(tx.amount, 120);
        assert_eq!(tx.to, SELLER);
        assert_eq!(tx.from, ME);
        assert_eq!(wallet.credited(SELLER).await, 120);
        assert_eq!(wallet.balance().await.unwrap().wei, 380);
    }

    #[tokio::test]
    async fn test_confirmation_timeout_keeps_the_sent_payment() {
        let wallet = Arc::new(
            SimulatedWallet::new(ME, 500).with_block_time(Duration::from_millis(200)),
        );
        let config = SettlerConfig {
            payment_timeout_ms: 20,
            ..SettlerConfig::default()
        };
        let settler = PaymentSettler::with_config(wallet.clone(), config);

        let pending = settler.submit(&quote(7)).await.unwrap();
        let err = settler.confirm(&pending).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NetworkTimeout);
        assert_eq!(pending.tx.amount, 7);
        assert_eq!(wallet.transfers().await[0].tx_hash, pending.tx.tx_hash);
        assert_eq!(wallet.balance().await.unwrap().wei, 493);
    }

    #[tokio::test]
    async fn test_submissions_are_serialized() {
        let wallet = Arc::new(SlowWallet {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let settler = PaymentSettler::new(wallet.clone());

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let settler = settler.clone();
                tokio::spawn(async move { settler.submit(&quote(1)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(wallet.peak.load(Ordering::SeqCst), 1);
    }
}
