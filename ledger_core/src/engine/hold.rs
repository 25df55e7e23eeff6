use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::{LedgerError, LedgerResult};
use crate::ids::Id;
use crate::model::{AuditLog, Entry, EventType, Hold, HoldStatus, OutboxEvent, Transfer};
use crate::money::Money;
use crate::store::{AccountRepository, AuditRepository, EntryRepository, HoldRepository, OutboxRepository, Store, TransferRepository};
use crate::txn::{classify_store_error, Retrier};

use super::{ActorContext, Engine};

impl<S: Store> Engine<S> {
    /// Places a hold (§4.7). Checked against `balance`, not `available`
    /// (Design Note H1): encumbering a second hold on top of a first does
    /// not require headroom below the first hold, only below the raw
    /// balance.
    pub async fn create_hold(
        &self,
        account_id: Id,
        amount: Money,
        expires_at: Option<DateTime<Utc>>,
        metadata: HashMap<String, serde_json::Value>,
        ctx: &ActorContext,
    ) -> LedgerResult<Hold> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount);
        }

        let store = self.store();
        let audit_enabled = self.audit_enabled;

        Retrier::run(|| async {
            let mut tx = store.begin().await.map_err(classify_store_error)?;

            let mut account = AccountRepository::get_by_id_for_update(store.as_ref(), &mut tx, account_id)
                .await
                .map_err(|e| super::engine_map_not_found(e, || LedgerError::AccountNotFound(account_id)))?;

            account.validate_debit(amount)?;

            let now = Utc::now();
            let new_encumbered = account.encumbered + amount;
            AccountRepository::update_encumbered_balance(store.as_ref(), &mut tx, account_id, new_encumbered, now)
                .await
                .map_err(classify_store_error)?;

            let hold = Hold::new(account_id, amount, expires_at, metadata, now);
            hold.validate()?;
            HoldRepository::create(store.as_ref(), &mut tx, &hold)
                .await
                .map_err(classify_store_error)?;

            let payload = serde_json::json!({
                "holdId": hold.id.to_string(),
                "accountId": account_id.to_string(),
                "amount": amount.to_string(),
            });
            let event = OutboxEvent::new("hold", hold.id, EventType::HoldCreated, payload, now);
            OutboxRepository::create(store.as_ref(), &mut tx, &event)
                .await
                .map_err(classify_store_error)?;

            if audit_enabled {
                let audit = AuditLog::success(
                    ctx.actor_str(),
                    "hold.create",
                    "hold",
                    hold.id.to_string(),
                    None,
                    Some(serde_json::to_value(&hold).unwrap_or(serde_json::Value::Null)),
                    ctx.provenance.clone(),
                    now,
                );
                AuditRepository::create_tx(store.as_ref(), &mut tx, &audit)
                    .await
                    .map_err(classify_store_error)?;
            }

            store.commit(tx).await.map_err(classify_store_error)?;
            Ok(hold)
        })
        .await
    }

    /// Releases a hold's encumbrance without moving any money.
    pub async fn void_hold(&self, hold_id: Id, ctx: &ActorContext) -> LedgerResult<Hold> {
        let store = self.store();
        let audit_enabled = self.audit_enabled;

        Retrier::run(|| async {
            let mut tx = store.begin().await.map_err(classify_store_error)?;

            let hold = HoldRepository::get_by_id_for_update(store.as_ref(), &mut tx, hold_id)
                .await
                .map_err(|e| super::engine_map_not_found(e, || LedgerError::HoldNotFound(hold_id)))?;
            hold.require_active()?;

            let mut account = AccountRepository::get_by_id_for_update(store.as_ref(), &mut tx, hold.account_id)
                .await
                .map_err(classify_store_error)?;

            let now = Utc::now();
            account.encumbered = account.encumbered - hold.amount;
            AccountRepository::update_encumbered_balance(store.as_ref(), &mut tx, hold.account_id, account.encumbered, now)
                .await
                .map_err(classify_store_error)?;

            HoldRepository::update_status(store.as_ref(), &mut tx, hold_id, HoldStatus::Voided, now)
                .await
                .map_err(classify_store_error)?;

            let payload = serde_json::json!({"holdId": hold_id.to_string()});
            let event = OutboxEvent::new("hold", hold_id, EventType::HoldVoided, payload, now);
            OutboxRepository::create(store.as_ref(), &mut tx, &event)
                .await
                .map_err(classify_store_error)?;

            if audit_enabled {
                let audit = AuditLog::success(
                    ctx.actor_str(),
                    "hold.void",
                    "hold",
                    hold_id.to_string(),
                    None,
                    None,
                    ctx.provenance.clone(),
                    now,
                );
                AuditRepository::create_tx(store.as_ref(), &mut tx, &audit)
                    .await
                    .map_err(classify_store_error)?;
            }

            store.commit(tx).await.map_err(classify_store_error)?;
            let mut voided = hold;
            voided.status = HoldStatus::Voided;
            voided.updated_at = now;
            Ok(voided)
        })
        .await
    }

    /// Captures a hold (§4.7): releases its encumbrance and moves the held
    /// amount from the hold's account to `to_account_id` as a regular
    /// transfer.
    pub async fn capture_hold(&self, hold_id: Id, to_account_id: Id, ctx: &ActorContext) -> LedgerResult<Transfer> {
        let store = self.store();
        let audit_enabled = self.audit_enabled;

        Retrier::run(|| async {
            let mut tx = store.begin().await.map_err(classify_store_error)?;

            let hold = HoldRepository::get_by_id_for_update(store.as_ref(), &mut tx, hold_id)
                .await
                .map_err(|e| super::engine_map_not_found(e, || LedgerError::HoldNotFound(hold_id)))?;
            hold.require_active()?;

            if hold.account_id == to_account_id {
                return Err(LedgerError::SameAccount);
            }
            let mut account_ids = [hold.account_id, to_account_id];
            account_ids.sort();

            let locked = AccountRepository::get_by_ids_for_update(store.as_ref(), &mut tx, &account_ids)
                .await
                .map_err(|e| super::engine_map_not_found(e, || LedgerError::AccountNotFound(account_ids[0])))?;
            let mut accounts: std::collections::HashMap<Id, _> = locked.into_iter().map(|a| (a.id, a)).collect();

            let mut from = accounts
                .remove(&hold.account_id)
                .ok_or(LedgerError::AccountNotFound(hold.account_id))?;
            let mut to = accounts
                .remove(&to_account_id)
                .ok_or(LedgerError::AccountNotFound(to_account_id))?;

            if from.currency != to.currency {
                return Err(LedgerError::CurrencyMismatch);
            }
            from.validate_debit(hold.amount)?;
            to.validate_credit(hold.amount)?;

            let now = Utc::now();
            from.encumbered = from.encumbered - hold.amount;
            AccountRepository::update_encumbered_balance(store.as_ref(), &mut tx, from.id, from.encumbered, now)
                .await
                .map_err(classify_store_error)?;

            let mut metadata = hold.metadata.clone();
            metadata.insert("hold_id".to_string(), serde_json::Value::String(hold_id.to_string()));
            let transfer = Transfer::new(from.id, to.id, hold.amount, None, metadata, now);
            TransferRepository::create(store.as_ref(), &mut tx, &transfer)
                .await
                .map_err(classify_store_error)?;

            let from_previous = from.balance;
            let from_current = from.apply_debit(hold.amount, now);
            let debit = Entry::new(from.id, transfer.id, -hold.amount, from_previous, from_current, from.version, now);
            debit.validate()?;
            EntryRepository::create(store.as_ref(), &mut tx, &debit)
                .await
                .map_err(classify_store_error)?;
            AccountRepository::update_balance(store.as_ref(), &mut tx, from.id, from.balance, now)
                .await
                .map_err(classify_store_error)?;

            let to_previous = to.balance;
            let to_current = to.apply_credit(hold.amount, now);
            let credit = Entry::new(to.id, transfer.id, hold.amount, to_previous, to_current, to.version, now);
            credit.validate()?;
            EntryRepository::create(store.as_ref(), &mut tx, &credit)
                .await
                .map_err(classify_store_error)?;
            AccountRepository::update_balance(store.as_ref(), &mut tx, to.id, to.balance, now)
                .await
                .map_err(classify_store_error)?;

            HoldRepository::update_status(store.as_ref(), &mut tx, hold_id, HoldStatus::Captured, now)
                .await
                .map_err(classify_store_error)?;

            let payload = serde_json::json!({
                "holdId": hold_id.to_string(),
                "transferId": transfer.id.to_string(),
                "to": to_account_id.to_string(),
            });
            let event = OutboxEvent::new("hold", hold_id, EventType::HoldCaptured, payload, now);
            OutboxRepository::create(store.as_ref(), &mut tx, &event)
                .await
                .map_err(classify_store_error)?;

            if audit_enabled {
                let audit = AuditLog::success(
                    ctx.actor_str(),
                    "hold.capture",
                    "hold",
                    hold_id.to_string(),
                    None,
                    Some(serde_json::to_value(&transfer).unwrap_or(serde_json::Value::Null)),
                    ctx.provenance.clone(),
                    now,
                );
                AuditRepository::create_tx(store.as_ref(), &mut tx, &audit)
                    .await
                    .map_err(classify_store_error)?;
            }

            store.commit(tx).await.map_err(classify_store_error)?;
            Ok(transfer)
        })
        .await
    }

    pub async fn get_hold(&self, id: Id) -> LedgerResult<Hold> {
        HoldRepository::get_by_id(self.store().as_ref(), id)
            .await
            .map_err(|e| super::engine_map_not_found(e, || LedgerError::HoldNotFound(id)))
    }

    pub async fn list_holds_by_account(&self, account_id: Id, limit: i64, offset: i64) -> LedgerResult<Vec<Hold>> {
        HoldRepository::list_by_account(self.store().as_ref(), account_id, limit, offset)
            .await
            .map_err(classify_store_error)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal_macros::dec;

    use crate::store::memory::MemoryStore;

    use super::*;

    async fn engine() -> Engine<MemoryStore> {
        Engine::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn hold_encumbers_balance() {
        let engine = engine().await;
        let ctx = ActorContext::system();
        let a = engine.create_account("a", "USD", false, true, &ctx).await.unwrap();
        let b = engine.create_account("b", "USD", true, true, &ctx).await.unwrap();
        engine
            .create_transfer(crate::engine::TransferInput::new(b.id, a.id, Money::new(dec!(100))), &ctx)
            .await
            .unwrap();

        let hold = engine
            .create_hold(a.id, Money::new(dec!(40)), None, HashMap::new(), &ctx)
            .await
            .unwrap();

        let account = engine.get_account(a.id).await.unwrap();
        assert_eq!(account.encumbered, Money::new(dec!(40)));
        assert_eq!(account.available(), Money::new(dec!(60)));
        assert_eq!(hold.status, HoldStatus::Active);
    }

    #[tokio::test]
    async fn void_releases_encumbrance() {
        let engine = engine().await;
        let ctx = ActorContext::system();
        let a = engine.create_account("a", "USD", false, true, &ctx).await.unwrap();
        let b = engine.create_account("b", "USD", true, true, &ctx).await.unwrap();
        engine
            .create_transfer(crate::engine::TransferInput::new(b.id, a.id, Money::new(dec!(100))), &ctx)
            .await
            .unwrap();
        let hold = engine
            .create_hold(a.id, Money::new(dec!(40)), None, HashMap::new(), &ctx)
            .await
            .unwrap();

        let voided = engine.void_hold(hold.id, &ctx).await.unwrap();
        assert_eq!(voided.status, HoldStatus::Voided);

        let account = engine.get_account(a.id).await.unwrap();
        assert_eq!(account.encumbered, Money::ZERO);
    }

    #[tokio::test]
    async fn capture_moves_money_and_closes_hold() {
        let engine = engine().await;
        let ctx = ActorContext::system();
        let a = engine.create_account("a", "USD", false, true, &ctx).await.unwrap();
        let b = engine.create_account("b", "USD", true, true, &ctx).await.unwrap();
        engine
            .create_transfer(crate::engine::TransferInput::new(b.id, a.id, Money::new(dec!(100))), &ctx)
            .await
            .unwrap();
        let hold = engine
            .create_hold(a.id, Money::new(dec!(40)), None, HashMap::new(), &ctx)
            .await
            .unwrap();

        let transfer = engine.capture_hold(hold.id, b.id, &ctx).await.unwrap();
        assert_eq!(transfer.from_account_id, a.id);
        assert_eq!(transfer.to_account_id, b.id);

        let a_after = engine.get_account(a.id).await.unwrap();
        assert_eq!(a_after.balance, Money::new(dec!(60)));
        assert_eq!(a_after.encumbered, Money::ZERO);

        let captured = engine.get_hold(hold.id).await.unwrap();
        assert_eq!(captured.status, HoldStatus::Captured);

        let second = engine.capture_hold(hold.id, b.id, &ctx).await;
        assert!(matches!(second, Err(LedgerError::HoldNotActive(id)) if id == hold.id));
    }
}
