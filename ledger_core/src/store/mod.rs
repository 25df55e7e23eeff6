//! Store abstraction (C3): transactional repository contracts. The engine
//! depends only on these traits; `postgres` and `memory` are the two
//! implementations shipped in this crate.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::ids::Id;
use crate::model::{Account, AuditLog, Entry, Hold, OutboxEvent, Transfer};
use crate::money::Money;

/// Marker trait for a live transactional context. Each store implementation
/// supplies its own concrete type (a `sqlx::Transaction` for Postgres, an
/// interior-mutable guard for the in-memory fake); the engine only ever
/// threads `&mut Tx` through repository calls, never inspects it.
pub trait Tx: Send {}

#[async_trait]
pub trait AccountRepository<T: Tx>: Send + Sync {
    async fn create(&self, tx: &mut T, account: &Account) -> StoreResult<()>;
    async fn get_by_id(&self, id: Id) -> StoreResult<Account>;
    async fn get_by_id_for_update(&self, tx: &mut T, id: Id) -> StoreResult<Account>;
    /// Returns rows in the same order as `ids`; errors if any id is missing.
    async fn get_by_ids_for_update(&self, tx: &mut T, ids: &[Id]) -> StoreResult<Vec<Account>>;
    async fn update_balance(
        &self,
        tx: &mut T,
        id: Id,
        new_balance: Money,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<i64>;
    async fn update_encumbered_balance(
        &self,
        tx: &mut T,
        id: Id,
        new_encumbered: Money,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn list(&self, limit: i64, offset: i64) -> StoreResult<Vec<Account>>;
}

#[async_trait]
pub trait TransferRepository<T: Tx>: Send + Sync {
    async fn create(&self, tx: &mut T, transfer: &Transfer) -> StoreResult<()>;
    async fn mark_reversed(&self, tx: &mut T, id: Id, reversal_id: Id) -> StoreResult<()>;
    async fn get_by_id(&self, id: Id) -> StoreResult<Transfer>;
    async fn list_by_account(&self, account_id: Id, limit: i64, offset: i64) -> StoreResult<Vec<Transfer>>;
}

#[async_trait]
pub trait EntryRepository<T: Tx>: Send + Sync {
    async fn create(&self, tx: &mut T, entry: &Entry) -> StoreResult<()>;
    async fn get_by_transfer(&self, transfer_id: Id) -> StoreResult<Vec<Entry>>;
    async fn get_by_account(&self, account_id: Id, limit: i64, offset: i64) -> StoreResult<Vec<Entry>>;
    /// Balance implied by the latest entry with `created_at <= at`, or the
    /// account's opening balance (zero) if none exists yet.
    async fn get_balance_at_time(&self, account_id: Id, at: DateTime<Utc>) -> StoreResult<Money>;
}

#[async_trait]
pub trait HoldRepository<T: Tx>: Send + Sync {
    async fn create(&self, tx: &mut T, hold: &Hold) -> StoreResult<()>;
    async fn get_by_id(&self, id: Id) -> StoreResult<Hold>;
    async fn get_by_id_for_update(&self, tx: &mut T, id: Id) -> StoreResult<Hold>;
    async fn update_status(
        &self,
        tx: &mut T,
        id: Id,
        status: crate::model::HoldStatus,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn list_by_account(&self, account_id: Id, limit: i64, offset: i64) -> StoreResult<Vec<Hold>>;
}

#[async_trait]
pub trait OutboxRepository<T: Tx>: Send + Sync {
    async fn create(&self, tx: &mut T, event: &OutboxEvent) -> StoreResult<()>;
    async fn get_unpublished(&self, limit: i64) -> StoreResult<Vec<OutboxEvent>>;
    async fn mark_published(&self, id: Id, at: DateTime<Utc>) -> StoreResult<()>;
    async fn delete_published(&self, before: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait AuditRepository<T: Tx>: Send + Sync {
    async fn create(&self, entry: &AuditLog) -> StoreResult<()>;
    async fn create_tx(&self, tx: &mut T, entry: &AuditLog) -> StoreResult<()>;
    async fn list(&self, resource_type: Option<&str>, resource_id: Option<&str>, limit: i64, offset: i64) -> StoreResult<Vec<AuditLog>>;
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// `(sum of account balances, sum of entry amounts)`.
    async fn check_consistency(&self) -> StoreResult<(Money, Money)>;
}

/// Uniform begin/commit/rollback surface so the engine can be generic over
/// the concrete store without naming `MemoryStore`/`PostgresStore`.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    type Tx: Tx;

    async fn begin(&self) -> StoreResult<Self::Tx>;
    async fn commit(&self, tx: Self::Tx) -> StoreResult<()>;
    async fn rollback(&self, tx: Self::Tx) -> StoreResult<()>;
}

/// The full set of repository capabilities the engine needs, bundled so
/// engine functions can take one bound instead of seven.
pub trait Store:
    TransactionalStore
    + AccountRepository<<Self as TransactionalStore>::Tx>
    + TransferRepository<<Self as TransactionalStore>::Tx>
    + EntryRepository<<Self as TransactionalStore>::Tx>
    + HoldRepository<<Self as TransactionalStore>::Tx>
    + OutboxRepository<<Self as TransactionalStore>::Tx>
    + AuditRepository<<Self as TransactionalStore>::Tx>
    + LedgerRepository
{
}

impl<S> Store for S where
    S: TransactionalStore
        + AccountRepository<<S as TransactionalStore>::Tx>
        + TransferRepository<<S as TransactionalStore>::Tx>
        + EntryRepository<<S as TransactionalStore>::Tx>
        + HoldRepository<<S as TransactionalStore>::Tx>
        + OutboxRepository<<S as TransactionalStore>::Tx>
        + AuditRepository<<S as TransactionalStore>::Tx>
        + LedgerRepository
{
}
