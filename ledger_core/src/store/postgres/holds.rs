use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Row};

use crate::error::{StoreError, StoreResult};
use crate::ids::Id;
use crate::model::{Hold, HoldStatus};
use crate::money::Money;

use super::{PgTx, PostgresStore};
use crate::store::HoldRepository;

fn status_to_db(status: HoldStatus) -> &'static str {
    match status {
        HoldStatus::Active => "active",
        HoldStatus::Voided => "voided",
        HoldStatus::Captured => "captured",
    }
}

fn status_from_db(s: &str) -> StoreResult<HoldStatus> {
    match s {
        "active" => Ok(HoldStatus::Active),
        "voided" => Ok(HoldStatus::Voided),
        "captured" => Ok(HoldStatus::Captured),
        other => Err(StoreError::Other(anyhow::anyhow!("unknown hold status {other}"))),
    }
}

fn row_to_hold(row: PgRow) -> StoreResult<Hold> {
    let parse = |s: String| Id::from_string(&s).map_err(|e| StoreError::Other(anyhow::anyhow!(e.to_string())));
    let status: String = row.try_get("status")?;
    let metadata: serde_json::Value = row.try_get("metadata")?;
    Ok(Hold {
        id: parse(row.try_get("id")?)?,
        account_id: parse(row.try_get("account_id")?)?,
        amount: Money::new(row.try_get("amount")?),
        status: status_from_db(&status)?,
        expires_at: row.try_get("expires_at")?,
        metadata: serde_json::from_value(metadata).map_err(|e| StoreError::Other(anyhow::anyhow!(e)))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl HoldRepository<PgTx> for PostgresStore {
    async fn create(&self, tx: &mut PgTx, hold: &Hold) -> StoreResult<()> {
        let metadata = serde_json::to_value(&hold.metadata).map_err(|e| StoreError::Other(anyhow::anyhow!(e)))?;
        sqlx::query(
            r#"
            INSERT INTO holds
                (id, account_id, amount, status, expires_at, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(hold.id.to_string())
        .bind(hold.account_id.to_string())
        .bind(hold.amount.as_decimal())
        .bind(status_to_db(hold.status))
        .bind(hold.expires_at)
        .bind(metadata)
        .bind(hold.created_at)
        .bind(hold.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Id) -> StoreResult<Hold> {
        let row = sqlx::query("SELECT * FROM holds WHERE id = $1")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        row_to_hold(row)
    }

    async fn get_by_id_for_update(&self, tx: &mut PgTx, id: Id) -> StoreResult<Hold> {
        let row = sqlx::query("SELECT * FROM holds WHERE id = $1 FOR UPDATE")
            .bind(id.to_string())
            .fetch_one(&mut **tx)
            .await?;
        row_to_hold(row)
    }

    async fn update_status(
        &self,
        tx: &mut PgTx,
        id: Id,
        status: HoldStatus,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE holds SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(status_to_db(status))
            .bind(updated_at)
            .bind(id.to_string())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn list_by_account(&self, account_id: Id, limit: i64, offset: i64) -> StoreResult<Vec<Hold>> {
        let rows = sqlx::query(
            "SELECT * FROM holds WHERE account_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(account_id.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_hold).collect()
    }
}
