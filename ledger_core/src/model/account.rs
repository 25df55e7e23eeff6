use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::ids::Id;
use crate::money::Money;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Id,
    pub name: String,
    pub currency: String,
    pub balance: Money,
    pub encumbered: Money,
    pub version: i64,
    pub allow_negative: bool,
    pub allow_positive: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(
        name: impl Into<String>,
        currency: impl Into<String>,
        allow_negative: bool,
        allow_positive: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Account {
            id: Id::generate(),
            name: name.into(),
            currency: currency.into(),
            balance: Money::ZERO,
            encumbered: Money::ZERO,
            version: 0,
            allow_negative,
            allow_positive,
            created_at: now,
            updated_at: now,
        }
    }

    /// `available = balance - encumbered`.
    pub fn available(&self) -> Money {
        self.balance - self.encumbered
    }

    /// Checks whether debiting `amt` from `balance` (not `available`; see
    /// Design Note H1) would be allowed, without mutating anything.
    pub fn validate_debit(&self, amt: Money) -> Result<(), LedgerError> {
        let new_balance = self.balance - amt;
        if !self.allow_negative && new_balance.is_negative() {
            return Err(LedgerError::NegativeBalanceNotAllowed(self.id));
        }
        if !self.allow_positive && new_balance.is_positive() {
            return Err(LedgerError::PositiveBalanceNotAllowed(self.id));
        }
        Ok(())
    }

    pub fn validate_credit(&self, amt: Money) -> Result<(), LedgerError> {
        let new_balance = self.balance + amt;
        if !self.allow_negative && new_balance.is_negative() {
            return Err(LedgerError::NegativeBalanceNotAllowed(self.id));
        }
        if !self.allow_positive && new_balance.is_positive() {
            return Err(LedgerError::PositiveBalanceNotAllowed(self.id));
        }
        Ok(())
    }

    /// Applies a debit in memory, returning the new balance. Callers must
    /// have already called `validate_debit`.
    pub fn apply_debit(&mut self, amt: Money, now: DateTime<Utc>) -> Money {
        self.balance = self.balance - amt;
        self.version += 1;
        self.updated_at = now;
        self.balance
    }

    pub fn apply_credit(&mut self, amt: Money, now: DateTime<Utc>) -> Money {
        self.balance = self.balance + amt;
        self.version += 1;
        self.updated_at = now;
        self.balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn available_excludes_encumbered() {
        let mut a = Account::new("a", "USD", true, true, now());
        a.balance = Money::new(dec!(100));
        a.encumbered = Money::new(dec!(40));
        assert_eq!(a.available(), Money::new(dec!(60)));
    }

    #[test]
    fn rejects_negative_balance_when_disallowed() {
        let mut a = Account::new("a", "USD", false, true, now());
        a.balance = Money::new(dec!(50));
        assert!(a.validate_debit(Money::new(dec!(100))).is_err());
        assert!(a.validate_debit(Money::new(dec!(50))).is_ok());
    }

    #[test]
    fn rejects_positive_balance_when_disallowed() {
        let a = Account::new("a", "USD", true, false, now());
        assert!(a.validate_credit(Money::new(dec!(1))).is_err());
        assert!(a.validate_credit(Money::ZERO).is_ok());
    }

    #[test]
    fn apply_debit_increments_version() {
        let mut a = Account::new("a", "USD", true, true, now());
        let before = a.version;
        a.apply_debit(Money::new(dec!(10)), now());
        assert_eq!(a.version, before + 1);
        assert_eq!(a.balance, Money::new(dec!(-10)));
    }
}
