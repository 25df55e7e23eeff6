use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::ids::Id;
use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    Active,
    Voided,
    Captured,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hold {
    pub id: Id,
    pub account_id: Id,
    pub amount: Money,
    pub status: HoldStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Hold {
    pub fn new(
        account_id: Id,
        amount: Money,
        expires_at: Option<DateTime<Utc>>,
        metadata: HashMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Hold {
            id: Id::generate(),
            account_id,
            amount,
            status: HoldStatus::Active,
            expires_at,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if !self.amount.is_positive() {
            return Err(LedgerError::InvalidAmount);
        }
        Ok(())
    }

    pub fn require_active(&self) -> Result<(), LedgerError> {
        if self.status != HoldStatus::Active {
            return Err(LedgerError::HoldNotActive(self.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn starts_active() {
        let h = Hold::new(
            Id::generate(),
            Money::new(dec!(10)),
            None,
            HashMap::new(),
            Utc::now(),
        );
        assert_eq!(h.status, HoldStatus::Active);
        assert!(h.require_active().is_ok());
    }

    #[test]
    fn rejects_non_positive_amount() {
        let h = Hold::new(Id::generate(), Money::ZERO, None, HashMap::new(), Utc::now());
        assert!(h.validate().is_err());
    }

    #[test]
    fn non_active_fails_require_active() {
        let mut h = Hold::new(
            Id::generate(),
            Money::new(dec!(10)),
            None,
            HashMap::new(),
            Utc::now(),
        );
        h.status = HoldStatus::Voided;
        assert!(matches!(h.require_active(), Err(LedgerError::HoldNotActive(_))));
    }
}
