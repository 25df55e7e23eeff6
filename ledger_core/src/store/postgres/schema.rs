//! Schema bootstrap. No migration framework: every statement is
//! `CREATE TABLE/INDEX IF NOT EXISTS`, so `init_schema` is safe to call on
//! every process start against a database that already has the tables.
//!
//! Ids are stored as the 26-character Crockford base32 ULID string rather
//! than a native `UUID` column; it sorts identically to the in-process
//! representation and needs no extension.

use sqlx::PgPool;

use crate::error::StoreResult;

pub async fn init_schema(pool: &PgPool) -> StoreResult<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            currency TEXT NOT NULL,
            balance NUMERIC NOT NULL,
            encumbered NUMERIC NOT NULL,
            version BIGINT NOT NULL,
            allow_negative BOOLEAN NOT NULL,
            allow_positive BOOLEAN NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transfers (
            id TEXT PRIMARY KEY,
            from_account_id TEXT NOT NULL REFERENCES accounts(id),
            to_account_id TEXT NOT NULL REFERENCES accounts(id),
            amount NUMERIC NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            event_at TIMESTAMPTZ NOT NULL,
            metadata JSONB NOT NULL,
            reversed_transfer_id TEXT REFERENCES transfers(id),
            -- Set on the ORIGINAL transfer the moment a reversal claims it;
            -- distinct from `reversed_transfer_id`, which lives on the
            -- reversal row and points back at the original. Not surfaced on
            -- the domain `Transfer` type, just a claim guard against two
            -- concurrent reversals of the same transfer.
            reversed_by TEXT REFERENCES transfers(id)
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transfers_from ON transfers(from_account_id, created_at)")
        .execute(&mut *tx)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transfers_to ON transfers(to_account_id, created_at)")
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL REFERENCES accounts(id),
            transfer_id TEXT NOT NULL REFERENCES transfers(id),
            amount NUMERIC NOT NULL,
            account_previous_balance NUMERIC NOT NULL,
            account_current_balance NUMERIC NOT NULL,
            account_version BIGINT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_account_created ON entries(account_id, created_at)")
        .execute(&mut *tx)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_transfer ON entries(transfer_id)")
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS holds (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL REFERENCES accounts(id),
            amount NUMERIC NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('active', 'voided', 'captured')),
            expires_at TIMESTAMPTZ,
            metadata JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_holds_account ON holds(account_id, created_at)")
        .execute(&mut *tx)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_holds_active ON holds(account_id) WHERE status = 'active'")
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS outbox_events (
            id TEXT PRIMARY KEY,
            aggregate_type TEXT NOT NULL,
            aggregate_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            payload JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            published BOOLEAN NOT NULL,
            published_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_outbox_unpublished ON outbox_events(created_at) WHERE NOT published",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            actor TEXT NOT NULL,
            action TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            before JSONB,
            after JSONB,
            status TEXT NOT NULL CHECK (status IN ('success', 'failure')),
            error TEXT,
            ip TEXT,
            user_agent TEXT,
            request_id TEXT,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_audit_resource ON audit_logs(resource_type, resource_id, created_at)",
    )
    .execute(&mut *tx)
    .await?;

    // Minimal actor identity. User management itself is out of scope; this
    // table exists only so `audit_logs.actor` can carry a real foreign key
    // when a caller authenticates instead of acting as the system actor.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
