use std::collections::HashMap;

use chrono::Utc;

use crate::error::{LedgerError, LedgerResult, StoreError};
use crate::ids::Id;
use crate::model::{AuditLog, Entry, EventType, OutboxEvent, Transfer};
use crate::store::{AccountRepository, AuditRepository, EntryRepository, OutboxRepository, Store, TransferRepository};
use crate::txn::{classify_store_error, Retrier};

use super::{ActorContext, Engine};

impl<S: Store> Engine<S> {
    /// Reverses `original_id` (§4.6): builds a new transfer with endpoints
    /// swapped and the same amount, claims the original against a second
    /// reversal via [`TransferRepository::mark_reversed`], and applies it
    /// through the same balance/entry machinery as a regular transfer so
    /// every invariant that holds for transfers holds for reversals too.
    pub async fn reverse_transfer(
        &self,
        original_id: Id,
        extra_metadata: HashMap<String, serde_json::Value>,
        ctx: &ActorContext,
    ) -> LedgerResult<Transfer> {
        let store = self.store();
        let audit_enabled = self.audit_enabled;

        let original = TransferRepository::get_by_id(store.as_ref(), original_id)
            .await
            .map_err(|e| super::engine_map_not_found(e, || LedgerError::TransferNotFound(original_id)))?;

        let mut metadata = original.metadata.clone();
        metadata.extend(extra_metadata);
        metadata.insert("reversal_of".to_string(), serde_json::Value::String(original_id.to_string()));

        let mut account_ids = [original.from_account_id, original.to_account_id];
        account_ids.sort();

        Retrier::run(|| async {
            let mut tx = store.begin().await.map_err(classify_store_error)?;

            let reversal_id = Id::generate();
            match TransferRepository::mark_reversed(store.as_ref(), &mut tx, original_id, reversal_id).await {
                Ok(()) => {}
                Err(StoreError::NotFound) => return Err(LedgerError::TransferNotFound(original_id)),
                Err(_) => return Err(LedgerError::TransferAlreadyReversed(original_id)),
            }

            let locked = AccountRepository::get_by_ids_for_update(store.as_ref(), &mut tx, &account_ids)
                .await
                .map_err(|e| super::engine_map_not_found(e, || LedgerError::AccountNotFound(account_ids[0])))?;
            let mut accounts: HashMap<Id, _> = locked.into_iter().map(|a| (a.id, a)).collect();

            // Endpoints swap: the money flows from the original recipient
            // back to the original sender.
            let mut from = accounts
                .remove(&original.to_account_id)
                .ok_or(LedgerError::AccountNotFound(original.to_account_id))?;
            let mut to = accounts
                .remove(&original.from_account_id)
                .ok_or(LedgerError::AccountNotFound(original.from_account_id))?;

            if from.currency != to.currency {
                return Err(LedgerError::CurrencyMismatch);
            }
            from.validate_debit(original.amount)?;
            to.validate_credit(original.amount)?;

            let now = Utc::now();
            let reversal = Transfer {
                id: reversal_id,
                from_account_id: from.id,
                to_account_id: to.id,
                amount: original.amount,
                created_at: now,
                event_at: now,
                metadata: metadata.clone(),
                reversed_transfer_id: Some(original_id),
            };
            TransferRepository::create(store.as_ref(), &mut tx, &reversal)
                .await
                .map_err(classify_store_error)?;

            let from_previous = from.balance;
            let from_current = from.apply_debit(original.amount, now);
            let debit = Entry::new(from.id, reversal.id, -original.amount, from_previous, from_current, from.version, now);
            debit.validate()?;
            EntryRepository::create(store.as_ref(), &mut tx, &debit)
                .await
                .map_err(classify_store_error)?;
            AccountRepository::update_balance(store.as_ref(), &mut tx, from.id, from.balance, now)
                .await
                .map_err(classify_store_error)?;

            let to_previous = to.balance;
            let to_current = to.apply_credit(original.amount, now);
            let credit = Entry::new(to.id, reversal.id, original.amount, to_previous, to_current, to.version, now);
            credit.validate()?;
            EntryRepository::create(store.as_ref(), &mut tx, &credit)
                .await
                .map_err(classify_store_error)?;
            AccountRepository::update_balance(store.as_ref(), &mut tx, to.id, to.balance, now)
                .await
                .map_err(classify_store_error)?;

            let payload = serde_json::json!({
                "transferId": reversal.id.to_string(),
                "reversalOf": original_id.to_string(),
                "from": reversal.from_account_id.to_string(),
                "to": reversal.to_account_id.to_string(),
                "amount": reversal.amount.to_string(),
            });
            let event = OutboxEvent::new("transfer", reversal.id, EventType::TransferReversed, payload, now);
            OutboxRepository::create(store.as_ref(), &mut tx, &event)
                .await
                .map_err(classify_store_error)?;

            if audit_enabled {
                let audit = AuditLog::success(
                    ctx.actor_str(),
                    "transfer.reverse",
                    "transfer",
                    reversal.id.to_string(),
                    Some(serde_json::to_value(&original).unwrap_or(serde_json::Value::Null)),
                    Some(serde_json::to_value(&reversal).unwrap_or(serde_json::Value::Null)),
                    ctx.provenance.clone(),
                    now,
                );
                AuditRepository::create_tx(store.as_ref(), &mut tx, &audit)
                    .await
                    .map_err(classify_store_error)?;
            }

            store.commit(tx).await.map_err(classify_store_error)?;
            Ok(reversal)
        })
        .await
    }
}
