use async_trait::async_trait;
use sqlx::{postgres::PgRow, Row};

use crate::error::{StoreError, StoreResult};
use crate::ids::Id;
use crate::model::Transfer;

use super::{PgTx, PostgresStore};
use crate::store::TransferRepository;

fn row_to_transfer(row: PgRow) -> StoreResult<Transfer> {
    let id: String = row.try_get("id")?;
    let from_account_id: String = row.try_get("from_account_id")?;
    let to_account_id: String = row.try_get("to_account_id")?;
    let reversed_transfer_id: Option<String> = row.try_get("reversed_transfer_id")?;
    let parse = |s: &str| Id::from_string(s).map_err(|e| StoreError::Other(anyhow::anyhow!(e.to_string())));
    Ok(Transfer {
        id: parse(&id)?,
        from_account_id: parse(&from_account_id)?,
        to_account_id: parse(&to_account_id)?,
        amount: crate::money::Money::new(row.try_get("amount")?),
        created_at: row.try_get("created_at")?,
        event_at: row.try_get("event_at")?,
        metadata: serde_json::from_value(row.try_get("metadata")?)
            .map_err(|e| StoreError::Other(anyhow::anyhow!(e)))?,
        reversed_transfer_id: reversed_transfer_id.map(|s| parse(&s)).transpose()?,
    })
}

#[async_trait]
impl TransferRepository<PgTx> for PostgresStore {
    async fn create(&self, tx: &mut PgTx, transfer: &Transfer) -> StoreResult<()> {
        let metadata = serde_json::to_value(&transfer.metadata)
            .map_err(|e| StoreError::Other(anyhow::anyhow!(e)))?;
        sqlx::query(
            r#"
            INSERT INTO transfers
                (id, from_account_id, to_account_id, amount, created_at, event_at, metadata, reversed_transfer_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(transfer.id.to_string())
        .bind(transfer.from_account_id.to_string())
        .bind(transfer.to_account_id.to_string())
        .bind(transfer.amount.as_decimal())
        .bind(transfer.created_at)
        .bind(transfer.event_at)
        .bind(metadata)
        .bind(transfer.reversed_transfer_id.map(|id| id.to_string()))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Atomically claims `id` as reversed by `reversal_id`. A second caller
    /// racing to reverse the same transfer sees zero rows affected.
    async fn mark_reversed(&self, tx: &mut PgTx, id: Id, reversal_id: Id) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE transfers SET reversed_by = $1 WHERE id = $2 AND reversed_by IS NULL",
        )
        .bind(reversal_id.to_string())
        .bind(id.to_string())
        .execute(&mut **tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Other(anyhow::anyhow!(
                "transfer {} already reversed or missing",
                id
            )));
        }
        Ok(())
    }

    async fn get_by_id(&self, id: Id) -> StoreResult<Transfer> {
        let row = sqlx::query("SELECT * FROM transfers WHERE id = $1")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        row_to_transfer(row)
    }

    async fn list_by_account(&self, account_id: Id, limit: i64, offset: i64) -> StoreResult<Vec<Transfer>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM transfers
            WHERE from_account_id = $1 OR to_account_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(account_id.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_transfer).collect()
    }
}
