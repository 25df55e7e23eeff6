use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::{LedgerError, LedgerResult};
use crate::ids::Id;
use crate::model::{Account, AuditLog, Entry, EventType, OutboxEvent, Transfer};
use crate::money::Money;
use crate::store::{AccountRepository, AuditRepository, EntryRepository, OutboxRepository, Store, TransferRepository};
use crate::txn::{classify_store_error, Retrier};

use super::{ActorContext, Engine};

#[derive(Debug, Clone)]
pub struct TransferInput {
    pub from: Id,
    pub to: Id,
    pub amount: Money,
    pub event_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TransferInput {
    pub fn new(from: Id, to: Id, amount: Money) -> Self {
        TransferInput {
            from,
            to,
            amount,
            event_at: None,
            metadata: HashMap::new(),
        }
    }

    fn validate(&self) -> LedgerResult<()> {
        if self.from == self.to {
            return Err(LedgerError::SameAccount);
        }
        if !self.amount.is_positive() {
            return Err(LedgerError::InvalidAmount);
        }
        Ok(())
    }
}

pub type BatchTransferInput = Vec<TransferInput>;

impl<S: Store> Engine<S> {
    pub async fn create_transfer(&self, input: TransferInput, ctx: &ActorContext) -> LedgerResult<Transfer> {
        let mut transfers = self.create_batch_transfer(vec![input], ctx).await?;
        Ok(transfers.remove(0))
    }

    /// Step 1–5 of the batch execution protocol (§4.5): collect and sort the
    /// distinct account ids referenced by the batch, lock them in that order,
    /// apply each transfer in input order against an in-memory working set,
    /// and commit once. The whole closure re-runs on a retryable store error.
    pub async fn create_batch_transfer(
        &self,
        batch: BatchTransferInput,
        ctx: &ActorContext,
    ) -> LedgerResult<Vec<Transfer>> {
        for input in &batch {
            input.validate()?;
        }

        let mut account_ids: Vec<Id> = batch.iter().flat_map(|t| [t.from, t.to]).collect();
        account_ids.sort();
        account_ids.dedup();

        let store = self.store();
        let audit_enabled = self.audit_enabled;

        Retrier::run(|| async {
            let mut tx = store.begin().await.map_err(classify_store_error)?;

            let locked = AccountRepository::get_by_ids_for_update(store.as_ref(), &mut tx, &account_ids)
                .await
                .map_err(|e| super::engine_map_not_found(e, || LedgerError::AccountNotFound(account_ids[0])))?;

            let mut working: HashMap<Id, Account> = locked.into_iter().map(|a| (a.id, a)).collect();
            let mut created = Vec::with_capacity(batch.len());

            for input in &batch {
                let now = Utc::now();
                let from = working
                    .get(&input.from)
                    .cloned()
                    .ok_or(LedgerError::AccountNotFound(input.from))?;
                let to = working
                    .get(&input.to)
                    .cloned()
                    .ok_or(LedgerError::AccountNotFound(input.to))?;

                if from.currency != to.currency {
                    return Err(LedgerError::CurrencyMismatch);
                }
                from.validate_debit(input.amount)?;
                to.validate_credit(input.amount)?;

                let transfer = Transfer::new(
                    input.from,
                    input.to,
                    input.amount,
                    input.event_at,
                    input.metadata.clone(),
                    now,
                );
                TransferRepository::create(store.as_ref(), &mut tx, &transfer)
                    .await
                    .map_err(classify_store_error)?;

                let mut from = from;
                let from_previous = from.balance;
                let from_current = from.apply_debit(input.amount, now);
                let debit = Entry::new(
                    from.id,
                    transfer.id,
                    -input.amount,
                    from_previous,
                    from_current,
                    from.version,
                    now,
                );
                debit.validate()?;
                EntryRepository::create(store.as_ref(), &mut tx, &debit)
                    .await
                    .map_err(classify_store_error)?;
                AccountRepository::update_balance(store.as_ref(), &mut tx, from.id, from.balance, now)
                    .await
                    .map_err(classify_store_error)?;

                let mut to = to;
                let to_previous = to.balance;
                let to_current = to.apply_credit(input.amount, now);
                let credit = Entry::new(to.id, transfer.id, input.amount, to_previous, to_current, to.version, now);
                credit.validate()?;
                EntryRepository::create(store.as_ref(), &mut tx, &credit)
                    .await
                    .map_err(classify_store_error)?;
                AccountRepository::update_balance(store.as_ref(), &mut tx, to.id, to.balance, now)
                    .await
                    .map_err(classify_store_error)?;

                working.insert(from.id, from);
                working.insert(to.id, to);

                let payload = serde_json::json!({
                    "transferId": transfer.id.to_string(),
                    "from": transfer.from_account_id.to_string(),
                    "to": transfer.to_account_id.to_string(),
                    "amount": transfer.amount.to_string(),
                    "eventAt": transfer.event_at.to_rfc3339(),
                });
                let event = OutboxEvent::new(
                    "transfer",
                    transfer.id,
                    EventType::TransferCreated,
                    payload,
                    now,
                );
                OutboxRepository::create(store.as_ref(), &mut tx, &event)
                    .await
                    .map_err(classify_store_error)?;

                if audit_enabled {
                    let audit = AuditLog::success(
                        ctx.actor_str(),
                        "transfer.create",
                        "transfer",
                        transfer.id.to_string(),
                        None,
                        Some(serde_json::to_value(&transfer).unwrap_or(serde_json::Value::Null)),
                        ctx.provenance.clone(),
                        now,
                    );
                    AuditRepository::create_tx(store.as_ref(), &mut tx, &audit)
                        .await
                        .map_err(classify_store_error)?;
                }

                created.push(transfer);
            }

            store.commit(tx).await.map_err(classify_store_error)?;
            Ok(created)
        })
        .await
    }

    pub async fn get_transfer(&self, id: Id) -> LedgerResult<Transfer> {
        TransferRepository::get_by_id(self.store().as_ref(), id)
            .await
            .map_err(|e| super::engine_map_not_found(e, || LedgerError::TransferNotFound(id)))
    }

    pub async fn list_transfers_by_account(&self, account_id: Id, limit: i64, offset: i64) -> LedgerResult<Vec<Transfer>> {
        TransferRepository::list_by_account(self.store().as_ref(), account_id, limit, offset)
            .await
            .map_err(classify_store_error)
    }

    pub async fn get_entries_by_transfer(&self, transfer_id: Id) -> LedgerResult<Vec<Entry>> {
        EntryRepository::get_by_transfer(self.store().as_ref(), transfer_id)
            .await
            .map_err(classify_store_error)
    }

    pub async fn get_entries_by_account(&self, account_id: Id, limit: i64, offset: i64) -> LedgerResult<Vec<Entry>> {
        EntryRepository::get_by_account(self.store().as_ref(), account_id, limit, offset)
            .await
            .map_err(classify_store_error)
    }

    pub async fn get_balance_at(&self, account_id: Id, at: DateTime<Utc>) -> LedgerResult<Money> {
        EntryRepository::get_balance_at_time(self.store().as_ref(), account_id, at)
            .await
            .map_err(classify_store_error)
    }
}
