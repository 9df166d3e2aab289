//! Wallet endpoint.

use agora_core::AgentIdentity;
use agora_settle::{Balance, FundingWallet};
use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub address: String,
    pub balance: Balance,
    pub identity: AgentIdentity,
}

/// Address, balance and identity of the funding wallet.
pub async fn wallet_info(State(state): State<AppState>) -> Result<Json<WalletResponse>, ApiError> {
    Ok(Json(WalletResponse {
        address: state.wallet.address(),
        balance: state.wallet.balance().await?,
        identity: (*state.identity).clone(),
    }))
}
