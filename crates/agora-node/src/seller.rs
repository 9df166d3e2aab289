//! Demo seller served by the node itself.
//!
//! It quotes a fixed price, accepts payments it can see in the node's
//! simulated wallet, and signs a receipt over every delivered result.

use std::collections::HashSet;
use std::sync::Arc;

use agora_core::receipt::{result_digest, same_address};
use agora_core::{
    AgoraError, Delivery, FeedbackSummary, LocalSigner, PaymentTx, Quote, Result, ServiceInfo,
};
use agora_ledger::FeedbackLedger;
use agora_settle::SimulatedWallet;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::NodeConfig;

/// A seller agent backed by an in-process key.
pub struct DemoSeller {
    signer: LocalSigner,
    agent_id: String,
    network_id: String,
    task_type: String,
    price: u128,
    scheme: String,
    asset: String,
    ledger: Arc<dyn FeedbackLedger>,
    wallet: Arc<SimulatedWallet>,
    redeemed: Mutex<HashSet<String>>,
}

impl DemoSeller {
    pub fn new(
        config: &NodeConfig,
        ledger: Arc<dyn FeedbackLedger>,
        wallet: Arc<SimulatedWallet>,
    ) -> Result<Self> {
        let signer = match &config.seller_key {
            Some(key) => LocalSigner::from_hex(key)?,
            None => LocalSigner::random(),
        };
        Ok(Self {
            signer,
            agent_id: "agora-demo-seller".to_string(),
            network_id: config.network_id.clone(),
            task_type: config.seller_task_type.clone(),
            price: config.seller_price,
            scheme: config.scheme.clone(),
            asset: config.asset.clone(),
            ledger,
            wallet,
            redeemed: Mutex::new(HashSet::new()),
        })
    }

    pub fn address(&self) -> &str {
        self.signer.address()
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// The listing this seller advertises at `endpoint`.
    pub fn listing(&self, endpoint: &str) -> ServiceInfo {
        ServiceInfo {
            id: format!("demo-{}", self.task_type),
            network_id: self.network_id.clone(),
            provider_address: self.address().to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            task_type: self.task_type.clone(),
            price: self.price,
            currency: "ETH".to_string(),
            reputation: None,
        }
    }

    pub fn quote(&self, task: &Value) -> Quote {
        Quote {
            scheme: self.scheme.clone(),
            asset: self.asset.clone(),
            amount: self.price,
            pay_to: self.address().to_string(),
            task: task.clone(),
        }
    }

    /// Check the payment and hand over the signed result.
    pub async fn deliver(&self, task: &Value, payment: &PaymentTx) -> Result<Delivery> {
        self.check_payment(payment).await?;

        let request_hash = result_digest(&task.to_string());
        let result = perform(&self.task_type, task);
        let receipt = self.signer.sign_receipt(request_hash, &result)?;

        info!(tx = %payment.tx_hash, result_hash = %receipt.result_hash, "demo seller delivered");
        Ok(Delivery { result, receipt })
    }

    async fn check_payment(&self, payment: &PaymentTx) -> Result<()> {
        if !same_address(&payment.to, self.address()) || payment.amount < self.price {
            return Err(AgoraError::Seller {
                message: format!(
                    "payment {} does not cover {} to {}",
                    payment.tx_hash,
                    self.price,
                    self.address()
                ),
            });
        }

        let seen = self
            .wallet
            .transfers()
            .await
            .into_iter()
            .any(|t| t.tx_hash == payment.tx_hash && same_address(&t.to, self.address()) && t.amount >= self.price);
        if !seen {
            warn!(tx = %payment.tx_hash, "payment not found on ledger");
            return Err(AgoraError::Seller {
                message: format!("payment {} not found", payment.tx_hash),
            });
        }

        let mut redeemed = self.redeemed.lock().await;
        if !redeemed.insert(payment.tx_hash.clone()) {
            return Err(AgoraError::Seller {
                message: format!("payment {} already redeemed", payment.tx_hash),
            });
        }
        Ok(())
    }

    /// `{average}` over feedback recorded for this seller; null without history.
    pub async fn reputation(&self) -> Result<Value> {
        let FeedbackSummary { count, average, .. } = self.ledger.summary(&self.agent_id).await?;
        let average = if count > 0 { Some(average) } else { None };
        Ok(json!({ "average": average, "count": count }))
    }

    pub fn identity(&self) -> Value {
        json!({
            "identity": {
                "agentId": self.agent_id,
                "address": self.address(),
                "networkId": self.network_id,
            },
            "onchain": { "agentTokenId": null },
        })
    }
}

/// The demo "work": a deterministic digest of the task.
fn perform(task_type: &str, task: &Value) -> String {
    let input = match task.get("text").and_then(Value::as_str) {
        Some(text) => text.to_string(),
        None => task.to_string(),
    };
    let words: Vec<&str> = input.split_whitespace().collect();
    let preview: Vec<&str> = words.iter().take(40).copied().collect();

    format!(
        "{} of {} words / {} characters.\nOpening: {}\nDigest: {}",
        task_type,
        words.len(),
        input.chars().count(),
        preview.join(" "),
        result_digest(&input)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::{Feedback, ErrorKind};
    use agora_ledger::InMemoryFeedbackLedger;
    use agora_settle::FundingWallet;
    use chrono::Utc;

    const BUYER: &str = "0x1111111111111111111111111111111111111111";

    fn seller(wallet: Arc<SimulatedWallet>, ledger: Arc<InMemoryFeedbackLedger>) -> DemoSeller {
        let config = NodeConfig {
            seller_key: Some("4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318".to_string()),
            seller_price: 10,
            ..NodeConfig::default()
        };
        DemoSeller::new(&config, ledger, wallet).unwrap()
    }

    #[tokio::test]
    async fn test_paid_delivery_has_valid_receipt() {
        let wallet = Arc::new(SimulatedWallet::new(BUYER, 100));
        let seller = seller(wallet.clone(), Arc::new(InMemoryFeedbackLedger::new()));
        let task = json!({ "text": "the quick brown fox" });

        let quote = seller.quote(&task);
        let tx_hash = wallet.submit(&quote.pay_to, quote.amount).await.unwrap();
        let payment = PaymentTx {
            tx_hash,
            from: BUYER.to_string(),
            to: quote.pay_to.clone(),
            amount: quote.amount,
        };

        let delivery = seller.deliver(&task, &payment).await.unwrap();
        let verification = delivery.receipt.verify().unwrap();
        assert!(verification.is_valid);
        assert_eq!(delivery.receipt.result_hash, result_digest(&delivery.result));
        assert!(delivery.result.contains("4 words"));

        // The same payment cannot be redeemed twice.
        let err = seller.deliver(&task, &payment).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Seller);
    }

    #[tokio::test]
    async fn test_unknown_payment_is_refused() {
        let wallet = Arc::new(SimulatedWallet::new(BUYER, 100));
        let seller = seller(wallet, Arc::new(InMemoryFeedbackLedger::new()));
        let payment = PaymentTx {
            tx_hash: "0xfeed".to_string(),
            from: BUYER.to_string(),
            to: seller.address().to_string(),
            amount: 10,
        };

        assert!(seller.deliver(&json!({}), &payment).await.is_err());
    }

    #[tokio::test]
    async fn test_reputation_reflects_ledger() {
        let ledger = Arc::new(InMemoryFeedbackLedger::new());
        let seller = seller(Arc::new(SimulatedWallet::new(BUYER, 0)), ledger.clone());
        assert!(seller.reputation().await.unwrap()["average"].is_null());

        ledger
            .append(Feedback {
                agent_id: seller.agent_id().to_string(),
                value: 80,
                tags: vec![],
                text: None,
                service_id: None,
                mission_id: None,
                task_type: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(seller.reputation().await.unwrap()["average"], 80.0);
    }
}
