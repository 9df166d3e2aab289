//! # Agora Settle
//!
//! Payment settlement for Agora buyer agents: quote validation, balance
//! checks, submission and confirmation through a [`FundingWallet`].

pub mod settler;
pub mod wallet;

pub use settler::{PaymentSettler, PendingPayment, SettlerConfig};
pub use wallet::{format_units, Balance, FundingWallet, SimulatedTransfer, SimulatedWallet};
