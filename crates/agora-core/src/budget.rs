//! Commander spending budget.

use serde::{Deserialize, Serialize};

use crate::error::{AgoraError, Result};

/// A hard spending ceiling shared by the phases of one commander run.
///
/// `spent <= cap` holds after every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommanderBudget {
    #[serde(with = "crate::amount")]
    cap: u128,
    #[serde(with = "crate::amount")]
    spent: u128,
}

impl CommanderBudget {
    /// Create a budget with nothing spent.
    pub fn new(cap: u128) -> Self {
        Self { cap, spent: 0 }
    }

    pub fn cap(&self) -> u128 {
        self.cap
    }

    pub fn spent(&self) -> u128 {
        self.spent
    }

    /// What may still be spent.
    pub fn remaining(&self) -> u128 {
        self.cap - self.spent
    }

    /// Check if budget can cover an amount
    pub fn can_afford(&self, amount: u128) -> bool {
        amount <= self.remaining()
    }

    /// Fail with `BudgetExceeded` if `amount` does not fit.
    pub fn ensure_affordable(&self, amount: u128) -> Result<()> {
        if self.can_afford(amount) {
            Ok(())
        } else {
            Err(self.exceeded(amount))
        }
    }

    /// Account for a settled payment. Leaves the budget untouched on failure.
    pub fn record(&mut self, amount: u128) -> Result<()> {
        self.ensure_affordable(amount)?;
        self.spent += amount;
        Ok(())
    }

    fn exceeded(&self, required: u128) -> AgoraError {
        AgoraError::BudgetExceeded {
            cap: self.cap,
            spent: self.spent,
            required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_record_and_remaining() {
        let mut budget = CommanderBudget::new(100);
        budget.record(60).unwrap();

        assert_eq!(budget.spent(), 60);
        assert_eq!(budget.remaining(), 40);
        assert!(budget.can_afford(40));
        assert!(!budget.can_afford(41));
    }

    #[test]
    fn test_overspend_is_rejected_without_mutation() {
        let mut budget = CommanderBudget::new(100);
        budget.record(60).unwrap();

        let err = budget.record(50).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BudgetExceeded);
        assert_eq!(err.details()["requiredWei"], "50");
        assert_eq!(budget.spent(), 60);
    }

    #[test]
    fn test_exact_cap_is_allowed() {
        let mut budget = CommanderBudget::new(100);
        budget.record(100).unwrap();
        assert_eq!(budget.remaining(), 0);
        assert!(budget.can_afford(0));
    }
}
