use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::ids::Id;
use crate::money::Money;

/// An immutable journal record of a single debit (negative amount) or
/// credit (positive amount) against one account, within one transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: Id,
    pub account_id: Id,
    pub transfer_id: Id,
    pub amount: Money,
    pub account_previous_balance: Money,
    pub account_current_balance: Money,
    pub account_version: i64,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    pub fn new(
        account_id: Id,
        transfer_id: Id,
        amount: Money,
        previous_balance: Money,
        current_balance: Money,
        account_version: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Entry {
            id: Id::generate(),
            account_id,
            transfer_id,
            amount,
            account_previous_balance: previous_balance,
            account_current_balance: current_balance,
            account_version,
            created_at: now,
        }
    }

    /// `current == previous + amount`, and the signed amount must match the
    /// balance delta it claims to record.
    pub fn validate(&self) -> Result<(), LedgerError> {
        let expected = self.account_previous_balance + self.amount;
        if expected != self.account_current_balance {
            return Err(LedgerError::Internal(anyhow::anyhow!(
                "entry {} balance delta mismatch: {} + {} != {}",
                self.id,
                self.account_previous_balance,
                self.amount,
                self.account_current_balance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn validates_consistent_delta() {
        let e = Entry::new(
            Id::generate(),
            Id::generate(),
            Money::new(dec!(-10)),
            Money::new(dec!(100)),
            Money::new(dec!(90)),
            1,
            Utc::now(),
        );
        assert!(e.validate().is_ok());
    }

    #[test]
    fn rejects_inconsistent_delta() {
        let e = Entry::new(
            Id::generate(),
            Id::generate(),
            Money::new(dec!(-10)),
            Money::new(dec!(100)),
            Money::new(dec!(95)),
            1,
            Utc::now(),
        );
        assert!(e.validate().is_err());
    }
}
