use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Row};

use crate::error::{StoreError, StoreResult};
use crate::ids::Id;
use crate::model::{EventType, OutboxEvent};

use super::{PgTx, PostgresStore};
use crate::store::OutboxRepository;

fn event_type_to_db(event_type: EventType) -> &'static str {
    match event_type {
        EventType::AccountCreated => "account_created",
        EventType::TransferCreated => "transfer_created",
        EventType::TransferReversed => "transfer_reversed",
        EventType::HoldCreated => "hold_created",
        EventType::HoldVoided => "hold_voided",
        EventType::HoldCaptured => "hold_captured",
    }
}

fn event_type_from_db(s: &str) -> StoreResult<EventType> {
    match s {
        "account_created" => Ok(EventType::AccountCreated),
        "transfer_created" => Ok(EventType::TransferCreated),
        "transfer_reversed" => Ok(EventType::TransferReversed),
        "hold_created" => Ok(EventType::HoldCreated),
        "hold_voided" => Ok(EventType::HoldVoided),
        "hold_captured" => Ok(EventType::HoldCaptured),
        other => Err(StoreError::Other(anyhow::anyhow!("unknown event type {other}"))),
    }
}

fn row_to_event(row: PgRow) -> StoreResult<OutboxEvent> {
    let event_type: String = row.try_get("event_type")?;
    Ok(OutboxEvent {
        id: Id::from_string(row.try_get::<String, _>("id")?.as_str())
            .map_err(|e| StoreError::Other(anyhow::anyhow!(e.to_string())))?,
        aggregate_type: row.try_get("aggregate_type")?,
        aggregate_id: Id::from_string(row.try_get::<String, _>("aggregate_id")?.as_str())
            .map_err(|e| StoreError::Other(anyhow::anyhow!(e.to_string())))?,
        event_type: event_type_from_db(&event_type)?,
        payload: row.try_get("payload")?,
        created_at: row.try_get("created_at")?,
        published: row.try_get("published")?,
        published_at: row.try_get("published_at")?,
    })
}

#[async_trait]
impl OutboxRepository<PgTx> for PostgresStore {
    async fn create(&self, tx: &mut PgTx, event: &OutboxEvent) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events
                (id, aggregate_type, aggregate_id, event_type, payload, created_at, published, published_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.id.to_string())
        .bind(&event.aggregate_type)
        .bind(event.aggregate_id.to_string())
        .bind(event_type_to_db(event.event_type))
        .bind(&event.payload)
        .bind(event.created_at)
        .bind(event.published)
        .bind(event.published_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Skips rows already locked by a concurrent drainer instead of blocking
    /// on them, so more than one outbox worker could run without serialising
    /// on the same batch (only one is started by default; see C8).
    async fn get_unpublished(&self, limit: i64) -> StoreResult<Vec<OutboxEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM outbox_events
            WHERE NOT published
            ORDER BY created_at
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_event).collect()
    }

    async fn mark_published(&self, id: Id, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE outbox_events SET published = TRUE, published_at = $1 WHERE id = $2")
            .bind(at)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_published(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM outbox_events WHERE published AND created_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
