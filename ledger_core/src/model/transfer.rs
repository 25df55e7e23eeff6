use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::ids::Id;
use crate::money::Money;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: Id,
    pub from_account_id: Id,
    pub to_account_id: Id,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
    pub event_at: DateTime<Utc>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub reversed_transfer_id: Option<Id>,
}

impl Transfer {
    pub fn new(
        from_account_id: Id,
        to_account_id: Id,
        amount: Money,
        event_at: Option<DateTime<Utc>>,
        metadata: HashMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Transfer {
            id: Id::generate(),
            from_account_id,
            to_account_id,
            amount,
            created_at: now,
            event_at: event_at.unwrap_or(now),
            metadata,
            reversed_transfer_id: None,
        }
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.from_account_id == self.to_account_id {
            return Err(LedgerError::SameAccount);
        }
        if !self.amount.is_positive() {
            return Err(LedgerError::InvalidAmount);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_same_account() {
        let a = Id::generate();
        let t = Transfer::new(a, a, Money::new(dec!(1)), None, HashMap::new(), Utc::now());
        assert!(matches!(t.validate(), Err(LedgerError::SameAccount)));
    }

    #[test]
    fn rejects_non_positive_amount() {
        let t = Transfer::new(
            Id::generate(),
            Id::generate(),
            Money::ZERO,
            None,
            HashMap::new(),
            Utc::now(),
        );
        assert!(matches!(t.validate(), Err(LedgerError::InvalidAmount)));
    }

    #[test]
    fn accepts_well_formed_transfer() {
        let t = Transfer::new(
            Id::generate(),
            Id::generate(),
            Money::new(dec!(10)),
            None,
            HashMap::new(),
            Utc::now(),
        );
        assert!(t.validate().is_ok());
    }
}
