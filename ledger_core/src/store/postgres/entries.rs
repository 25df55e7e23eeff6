use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Row};

use crate::error::{StoreError, StoreResult};
use crate::ids::Id;
use crate::model::Entry;
use crate::money::Money;

use super::{PgTx, PostgresStore};
use crate::store::EntryRepository;

fn row_to_entry(row: PgRow) -> StoreResult<Entry> {
    let parse = |s: String| Id::from_string(&s).map_err(|e| StoreError::Other(anyhow::anyhow!(e.to_string())));
    Ok(Entry {
        id: parse(row.try_get("id")?)?,
        account_id: parse(row.try_get("account_id")?)?,
        transfer_id: parse(row.try_get("transfer_id")?)?,
        amount: Money::new(row.try_get("amount")?),
        account_previous_balance: Money::new(row.try_get("account_previous_balance")?),
        account_current_balance: Money::new(row.try_get("account_current_balance")?),
        account_version: row.try_get("account_version")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl EntryRepository<PgTx> for PostgresStore {
    async fn create(&self, tx: &mut PgTx, entry: &Entry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO entries
                (id, account_id, transfer_id, amount, account_previous_balance, account_current_balance, account_version, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.account_id.to_string())
        .bind(entry.transfer_id.to_string())
        .bind(entry.amount.as_decimal())
        .bind(entry.account_previous_balance.as_decimal())
        .bind(entry.account_current_balance.as_decimal())
        .bind(entry.account_version)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn get_by_transfer(&self, transfer_id: Id) -> StoreResult<Vec<Entry>> {
        let rows = sqlx::query("SELECT * FROM entries WHERE transfer_id = $1 ORDER BY id")
            .bind(transfer_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_entry).collect()
    }

    async fn get_by_account(&self, account_id: Id, limit: i64, offset: i64) -> StoreResult<Vec<Entry>> {
        let rows = sqlx::query(
            "SELECT * FROM entries WHERE account_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(account_id.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_entry).collect()
    }

    async fn get_balance_at_time(&self, account_id: Id, at: DateTime<Utc>) -> StoreResult<Money> {
        let row = sqlx::query(
            r#"
            SELECT account_current_balance FROM entries
            WHERE account_id = $1 AND created_at <= $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(account_id.to_string())
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(match row {
            Some(row) => Money::new(row.try_get("account_current_balance")?),
            None => Money::ZERO,
        })
    }
}
