//! Postgres implementation of the store traits (C3), grounded on the
//! transactional patterns used elsewhere in the pack: a schema bootstrap run
//! once at startup, `SELECT ... FOR UPDATE` for the rows the engine needs to
//! serialize against, and one `sqlx::Transaction` per unit of work.

pub mod accounts;
pub mod audit;
pub mod entries;
pub mod holds;
pub mod outbox;
pub mod schema;
pub mod transfers;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::error::StoreResult;
use crate::money::Money;

use super::{LedgerRepository, TransactionalStore, Tx};

/// A Postgres-backed transaction. Owns a pooled connection for its whole
/// lifetime (`'static`), so it can be threaded through the engine the same
/// way the in-memory fake's guard is.
pub type PgTx = Transaction<'static, Postgres>;

impl Tx for PgTx {}

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        PostgresStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn init_schema(&self) -> StoreResult<()> {
        schema::init_schema(&self.pool).await
    }
}

#[async_trait]
impl TransactionalStore for PostgresStore {
    type Tx = PgTx;

    async fn begin(&self) -> StoreResult<PgTx> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: PgTx) -> StoreResult<()> {
        Ok(tx.commit().await?)
    }

    async fn rollback(&self, tx: PgTx) -> StoreResult<()> {
        Ok(tx.rollback().await?)
    }
}

#[async_trait]
impl LedgerRepository for PostgresStore {
    async fn check_consistency(&self) -> StoreResult<(Money, Money)> {
        let balances_row = sqlx::query("SELECT COALESCE(SUM(balance), 0) AS total FROM accounts")
            .fetch_one(&self.pool)
            .await?;
        let entries_row = sqlx::query("SELECT COALESCE(SUM(amount), 0) AS total FROM entries")
            .fetch_one(&self.pool)
            .await?;
        Ok((
            Money::new(balances_row.try_get("total")?),
            Money::new(entries_row.try_get("total")?),
        ))
    }
}
