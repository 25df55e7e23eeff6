//! Domain error taxonomy. These variants are the ones allowed to cross the
//! engine boundary; storage and transport details never leak past `Storage`
//! and `Internal`, which carry an opaque message only.

use thiserror::Error;

use crate::ids::Id;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("account not found: {0}")]
    AccountNotFound(Id),

    #[error("transfer not found: {0}")]
    TransferNotFound(Id),

    #[error("hold not found: {0}")]
    HoldNotFound(Id),

    #[error("from and to accounts must differ")]
    SameAccount,

    #[error("amount must be positive")]
    InvalidAmount,

    #[error("accounts do not share a currency")]
    CurrencyMismatch,

    #[error("operation would make account {0} balance negative")]
    NegativeBalanceNotAllowed(Id),

    #[error("operation would make account {0} balance positive")]
    PositiveBalanceNotAllowed(Id),

    #[error("hold {0} is not active")]
    HoldNotActive(Id),

    #[error("transfer {0} has already been reversed")]
    TransferAlreadyReversed(Id),

    #[error("idempotency key reused with a different request body")]
    IdempotencyKeyReused,

    #[error("idempotency key header present but empty")]
    EmptyIdempotencyKey,

    #[error("ledger is inconsistent: sum(balances)={sum_balances}, sum(entries)={sum_entries}")]
    InconsistentLedger {
        sum_balances: String,
        sum_entries: String,
    },

    #[error("operation timed out or was cancelled")]
    DeadlineExceeded,

    #[error("store error exhausted retries: {0}")]
    RetriesExhausted(String),

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl LedgerError {
    /// A coarse classification used by transport adapters to pick a status
    /// code without matching every variant by hand.
    pub fn kind(&self) -> ErrorKind {
        use LedgerError::*;
        match self {
            AccountNotFound(_) | TransferNotFound(_) | HoldNotFound(_) => ErrorKind::NotFound,
            SameAccount | InvalidAmount | CurrencyMismatch => ErrorKind::InvalidInput,
            NegativeBalanceNotAllowed(_)
            | PositiveBalanceNotAllowed(_)
            | HoldNotActive(_)
            | TransferAlreadyReversed(_) => ErrorKind::PreconditionFailed,
            IdempotencyKeyReused | EmptyIdempotencyKey => ErrorKind::IdempotencyConflict,
            InconsistentLedger { .. } => ErrorKind::Internal,
            DeadlineExceeded => ErrorKind::DeadlineExceeded,
            RetriesExhausted(_) => ErrorKind::Transient,
            Internal(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    PreconditionFailed,
    IdempotencyConflict,
    Transient,
    DeadlineExceeded,
    Internal,
}

/// Errors surfaced by the store abstraction (C3), before the engine maps
/// them onto [`LedgerError`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,

    #[error("retryable store error: {0}")]
    Retryable(String),

    #[error("store error: {0}")]
    Other(#[source] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e {
            if let Some(code) = db_err.code() {
                // 40001 = serialization_failure, 40P01 = deadlock_detected
                if code == "40001" || code == "40P01" {
                    return StoreError::Retryable(e.to_string());
                }
            }
        }
        if matches!(e, sqlx::Error::RowNotFound) {
            return StoreError::NotFound;
        }
        StoreError::Other(anyhow::anyhow!(e.to_string()))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
pub type StoreResult<T> = Result<T, StoreError>;
