//! The transactional ledger engine (C5–C7, plus account/read operations).
//! Generic over any [`Store`] implementation so the same code runs against
//! `PostgresStore` in production and `MemoryStore` in tests.

pub mod hold;
pub mod reversal;
pub mod transfer;

use std::sync::Arc;

use chrono::Utc;

use crate::error::{LedgerError, LedgerResult};
use crate::ids::Id;
use crate::model::{Account, AuditLog, EventType, OutboxEvent, RequestProvenance};
use crate::store::{AccountRepository, AuditRepository, OutboxRepository, Store};

pub use transfer::{BatchTransferInput, TransferInput};

/// Caller context threaded through every mutating call: who initiated it,
/// for the audit trail, plus request provenance.
#[derive(Debug, Clone, Default)]
pub struct ActorContext {
    pub actor: Option<String>,
    pub provenance: RequestProvenance,
}

impl ActorContext {
    pub fn system() -> Self {
        ActorContext {
            actor: Some(AuditLog::SYSTEM_ACTOR.to_string()),
            provenance: RequestProvenance::default(),
        }
    }

    fn actor_str(&self) -> &str {
        self.actor.as_deref().unwrap_or(AuditLog::SYSTEM_ACTOR)
    }
}

pub struct Engine<S: Store> {
    store: Arc<S>,
    /// Whether mutations append an audit row. Spec treats the audit sink as
    /// optionally wired; tests that only care about ledger invariants can
    /// turn it off to keep the in-memory fake's audit vector empty.
    audit_enabled: bool,
}

impl<S: Store> Engine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Engine {
            store,
            audit_enabled: true,
        }
    }

    pub fn with_audit(store: Arc<S>, audit_enabled: bool) -> Self {
        Engine { store, audit_enabled }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn create_account(
        &self,
        name: impl Into<String>,
        currency: impl Into<String>,
        allow_negative: bool,
        allow_positive: bool,
        ctx: &ActorContext,
    ) -> LedgerResult<Account> {
        let now = Utc::now();
        let account = Account::new(name, currency, allow_negative, allow_positive, now);

        let mut tx = self.store.begin().await.map_err(crate::txn::classify_store_error)?;
        AccountRepository::create(self.store.as_ref(), &mut tx, &account)
            .await
            .map_err(crate::txn::classify_store_error)?;

        let payload = serde_json::json!({
            "accountId": account.id.to_string(),
            "name": account.name,
            "currency": account.currency,
        });
        let event = OutboxEvent::new("account", account.id, EventType::AccountCreated, payload, now);
        OutboxRepository::create(self.store.as_ref(), &mut tx, &event)
            .await
            .map_err(crate::txn::classify_store_error)?;

        if self.audit_enabled {
            let audit = AuditLog::success(
                ctx.actor_str(),
                "account.create",
                "account",
                account.id.to_string(),
                None,
                Some(serde_json::to_value(&account).unwrap_or(serde_json::Value::Null)),
                ctx.provenance.clone(),
                now,
            );
            AuditRepository::create_tx(self.store.as_ref(), &mut tx, &audit)
                .await
                .map_err(crate::txn::classify_store_error)?;
        }

        self.store.commit(tx).await.map_err(crate::txn::classify_store_error)?;
        Ok(account)
    }

    pub async fn get_account(&self, id: Id) -> LedgerResult<Account> {
        AccountRepository::get_by_id(self.store.as_ref(), id)
            .await
            .map_err(|e| map_not_found(e, || LedgerError::AccountNotFound(id)))
    }

    pub async fn list_accounts(&self, limit: i64, offset: i64) -> LedgerResult<Vec<Account>> {
        AccountRepository::list(self.store.as_ref(), limit, offset)
            .await
            .map_err(crate::txn::classify_store_error)
    }
}

/// Maps a bare `StoreError::NotFound` onto the caller-supplied domain error,
/// leaving every other variant to the generic classifier.
fn map_not_found(err: crate::error::StoreError, not_found: impl FnOnce() -> LedgerError) -> LedgerError {
    match err {
        crate::error::StoreError::NotFound => not_found(),
        other => crate::txn::classify_store_error(other),
    }
}

pub(crate) use map_not_found as engine_map_not_found;
