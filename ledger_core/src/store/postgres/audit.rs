use async_trait::async_trait;
use sqlx::{postgres::PgRow, Row};

use crate::error::{StoreError, StoreResult};
use crate::ids::Id;
use crate::model::{AuditLog, AuditStatus, RequestProvenance};

use super::{PgTx, PostgresStore};
use crate::store::AuditRepository;

fn status_to_db(status: AuditStatus) -> &'static str {
    match status {
        AuditStatus::Success => "success",
        AuditStatus::Failure => "failure",
    }
}

fn status_from_db(s: &str) -> StoreResult<AuditStatus> {
    match s {
        "success" => Ok(AuditStatus::Success),
        "failure" => Ok(AuditStatus::Failure),
        other => Err(StoreError::Other(anyhow::anyhow!("unknown audit status {other}"))),
    }
}

fn row_to_audit(row: PgRow) -> StoreResult<AuditLog> {
    let status: String = row.try_get("status")?;
    Ok(AuditLog {
        id: Id::from_string(row.try_get::<String, _>("id")?.as_str())
            .map_err(|e| StoreError::Other(anyhow::anyhow!(e.to_string())))?,
        actor: row.try_get("actor")?,
        action: row.try_get("action")?,
        resource_type: row.try_get("resource_type")?,
        resource_id: row.try_get("resource_id")?,
        before: row.try_get("before")?,
        after: row.try_get("after")?,
        status: status_from_db(&status)?,
        error: row.try_get("error")?,
        provenance: RequestProvenance {
            ip: row.try_get("ip")?,
            user_agent: row.try_get("user_agent")?,
            request_id: row.try_get("request_id")?,
        },
        created_at: row.try_get("created_at")?,
    })
}

async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    entry: &AuditLog,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs
            (id, actor, action, resource_type, resource_id, before, after, status, error, ip, user_agent, request_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(entry.id.to_string())
    .bind(&entry.actor)
    .bind(&entry.action)
    .bind(&entry.resource_type)
    .bind(&entry.resource_id)
    .bind(&entry.before)
    .bind(&entry.after)
    .bind(status_to_db(entry.status))
    .bind(&entry.error)
    .bind(&entry.provenance.ip)
    .bind(&entry.provenance.user_agent)
    .bind(&entry.provenance.request_id)
    .bind(entry.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl AuditRepository<PgTx> for PostgresStore {
    async fn create(&self, entry: &AuditLog) -> StoreResult<()> {
        insert(&self.pool, entry).await
    }

    async fn create_tx(&self, tx: &mut PgTx, entry: &AuditLog) -> StoreResult<()> {
        insert(&mut **tx, entry).await
    }

    async fn list(
        &self,
        resource_type: Option<&str>,
        resource_id: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<AuditLog>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM audit_logs
            WHERE ($1::TEXT IS NULL OR resource_type = $1)
              AND ($2::TEXT IS NULL OR resource_id = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(resource_type)
        .bind(resource_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_audit).collect()
    }
}
