use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Row};

use crate::error::{StoreError, StoreResult};
use crate::ids::Id;
use crate::model::Account;
use crate::money::Money;

use super::{PgTx, PostgresStore};
use crate::store::AccountRepository;

fn row_to_account(row: PgRow) -> StoreResult<Account> {
    let id: String = row.try_get("id")?;
    Ok(Account {
        id: Id::from_string(&id).map_err(|e| StoreError::Other(anyhow::anyhow!(e.to_string())))?,
        name: row.try_get("name")?,
        currency: row.try_get("currency")?,
        balance: Money::new(row.try_get("balance")?),
        encumbered: Money::new(row.try_get("encumbered")?),
        version: row.try_get("version")?,
        allow_negative: row.try_get("allow_negative")?,
        allow_positive: row.try_get("allow_positive")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl AccountRepository<PgTx> for PostgresStore {
    async fn create(&self, tx: &mut PgTx, account: &Account) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts
                (id, name, currency, balance, encumbered, version, allow_negative, allow_positive, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(account.id.to_string())
        .bind(&account.name)
        .bind(&account.currency)
        .bind(account.balance.as_decimal())
        .bind(account.encumbered.as_decimal())
        .bind(account.version)
        .bind(account.allow_negative)
        .bind(account.allow_positive)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Id) -> StoreResult<Account> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = $1")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        row_to_account(row)
    }

    async fn get_by_id_for_update(&self, tx: &mut PgTx, id: Id) -> StoreResult<Account> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(id.to_string())
            .fetch_one(&mut **tx)
            .await?;
        row_to_account(row)
    }

    /// Locks rows in the order `ids` was given in. Callers are responsible
    /// for passing ids in canonical (ascending) order to avoid deadlocking
    /// against a concurrent transaction locking the same accounts.
    async fn get_by_ids_for_update(&self, tx: &mut PgTx, ids: &[Id]) -> StoreResult<Vec<Account>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.get_by_id_for_update(tx, *id).await?);
        }
        Ok(out)
    }

    async fn update_balance(
        &self,
        tx: &mut PgTx,
        id: Id,
        new_balance: Money,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let row = sqlx::query(
            "UPDATE accounts SET balance = $1, version = version + 1, updated_at = $2 WHERE id = $3 RETURNING version",
        )
        .bind(new_balance.as_decimal())
        .bind(updated_at)
        .bind(id.to_string())
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.try_get("version")?)
    }

    async fn update_encumbered_balance(
        &self,
        tx: &mut PgTx,
        id: Id,
        new_encumbered: Money,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE accounts SET encumbered = $1, updated_at = $2 WHERE id = $3")
            .bind(new_encumbered.as_decimal())
            .bind(updated_at)
            .bind(id.to_string())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn list(&self, limit: i64, offset: i64) -> StoreResult<Vec<Account>> {
        let rows = sqlx::query("SELECT * FROM accounts ORDER BY id LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_account).collect()
    }
}
