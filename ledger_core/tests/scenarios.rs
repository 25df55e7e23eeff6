//! The eight concrete scenarios from the specification's testable
//! properties, run end to end against the in-memory store.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal_macros::dec;

use ledger_core::engine::{ActorContext, Engine, TransferInput};
use ledger_core::error::LedgerError;
use ledger_core::model::HoldStatus;
use ledger_core::money::Money;
use ledger_core::outbox_worker::DEFAULT_BATCH_SIZE;
use ledger_core::store::memory::MemoryStore;
use ledger_core::store::OutboxRepository;

fn engine() -> Engine<MemoryStore> {
    Engine::new(Arc::new(MemoryStore::new()))
}

async fn seeded_accounts(engine: &Engine<MemoryStore>, ctx: &ActorContext) -> (ledger_core::model::Account, ledger_core::model::Account) {
    let a = engine.create_account("A", "USD", true, true, ctx).await.unwrap();
    let b = engine.create_account("B", "USD", false, true, ctx).await.unwrap();
    let funder = engine.create_account("funder", "USD", true, true, ctx).await.unwrap();
    engine
        .create_transfer(TransferInput::new(funder.id, a.id, Money::new(dec!(1000))), ctx)
        .await
        .unwrap();
    (engine.get_account(a.id).await.unwrap(), engine.get_account(b.id).await.unwrap())
}

#[tokio::test]
async fn scenario_1_happy_path_transfer() {
    let engine = engine();
    let ctx = ActorContext::system();
    let (a, b) = seeded_accounts(&engine, &ctx).await;

    let transfer = engine
        .create_transfer(TransferInput::new(a.id, b.id, Money::new(dec!(100.50))), &ctx)
        .await
        .unwrap();
    assert_eq!(transfer.amount, Money::new(dec!(100.50)));

    let a_after = engine.get_account(a.id).await.unwrap();
    let b_after = engine.get_account(b.id).await.unwrap();
    assert_eq!(a_after.balance, Money::new(dec!(899.50)));
    assert_eq!(b_after.balance, Money::new(dec!(100.50)));

    let entries = engine.get_entries_by_transfer(transfer.id).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries.iter().fold(Money::ZERO, |acc, e| acc + e.amount), Money::ZERO);

    let outbox = OutboxRepository::get_unpublished(engine.store().as_ref(), DEFAULT_BATCH_SIZE)
        .await
        .unwrap();
    assert!(outbox
        .iter()
        .any(|e| e.aggregate_id == transfer.id && e.event_type == ledger_core::model::EventType::TransferCreated));
}

#[tokio::test]
async fn scenario_2_reject_same_account() {
    let engine = engine();
    let ctx = ActorContext::system();
    let (a, _b) = seeded_accounts(&engine, &ctx).await;

    let result = engine
        .create_transfer(TransferInput::new(a.id, a.id, Money::new(dec!(10))), &ctx)
        .await;
    assert!(matches!(result, Err(LedgerError::SameAccount)));

    let unchanged = engine.get_account(a.id).await.unwrap();
    assert_eq!(unchanged.balance, a.balance);
}

#[tokio::test]
async fn scenario_3_reject_negative_overflow() {
    let engine = engine();
    let ctx = ActorContext::system();
    let a = engine.create_account("a", "USD", false, true, &ctx).await.unwrap();
    let b = engine.create_account("b", "USD", true, true, &ctx).await.unwrap();
    let funder = engine.create_account("funder", "USD", true, true, &ctx).await.unwrap();
    engine
        .create_transfer(TransferInput::new(funder.id, a.id, Money::new(dec!(50))), &ctx)
        .await
        .unwrap();

    let result = engine
        .create_transfer(TransferInput::new(a.id, b.id, Money::new(dec!(100))), &ctx)
        .await;
    assert!(matches!(result, Err(LedgerError::NegativeBalanceNotAllowed(id)) if id == a.id));

    let entries = engine.get_entries_by_account(a.id, 100, 0).await.unwrap();
    assert!(entries.iter().all(|e| e.amount != Money::new(dec!(-100))));
    let a_after = engine.get_account(a.id).await.unwrap();
    assert_eq!(a_after.balance, Money::new(dec!(50)));
}

#[tokio::test]
async fn scenario_4_currency_mismatch() {
    let engine = engine();
    let ctx = ActorContext::system();
    let a = engine.create_account("a", "USD", true, true, &ctx).await.unwrap();
    let b = engine.create_account("b", "EUR", true, true, &ctx).await.unwrap();

    let result = engine
        .create_transfer(TransferInput::new(a.id, b.id, Money::new(dec!(10))), &ctx)
        .await;
    assert!(matches!(result, Err(LedgerError::CurrencyMismatch)));
}

#[tokio::test]
async fn scenario_5_hold_lifecycle_void_and_capture() {
    let engine = engine();
    let ctx = ActorContext::system();
    let a = engine.create_account("a", "USD", false, true, &ctx).await.unwrap();
    let b = engine.create_account("b", "USD", true, true, &ctx).await.unwrap();
    let funder = engine.create_account("funder", "USD", true, true, &ctx).await.unwrap();
    engine
        .create_transfer(TransferInput::new(funder.id, a.id, Money::new(dec!(100))), &ctx)
        .await
        .unwrap();

    let hold = engine
        .create_hold(a.id, Money::new(dec!(50)), None, HashMap::new(), &ctx)
        .await
        .unwrap();
    let mid = engine.get_account(a.id).await.unwrap();
    assert_eq!(mid.encumbered, Money::new(dec!(50)));
    assert_eq!(mid.available(), Money::new(dec!(50)));

    let voided = engine.void_hold(hold.id, &ctx).await.unwrap();
    assert_eq!(voided.status, HoldStatus::Voided);
    let after_void = engine.get_account(a.id).await.unwrap();
    assert_eq!(after_void.encumbered, Money::ZERO);
    assert_eq!(after_void.balance, Money::new(dec!(100)));

    // Alternative branch: capture a fresh hold instead of voiding.
    let hold2 = engine
        .create_hold(a.id, Money::new(dec!(50)), None, HashMap::new(), &ctx)
        .await
        .unwrap();
    let transfer = engine.capture_hold(hold2.id, b.id, &ctx).await.unwrap();
    let a_final = engine.get_account(a.id).await.unwrap();
    let b_final = engine.get_account(b.id).await.unwrap();
    assert_eq!(a_final.balance, Money::new(dec!(50)));
    assert_eq!(a_final.encumbered, Money::ZERO);
    assert_eq!(b_final.balance, Money::new(dec!(50)));
    assert_eq!(transfer.amount, Money::new(dec!(50)));
    let captured = engine.get_hold(hold2.id).await.unwrap();
    assert_eq!(captured.status, HoldStatus::Captured);
}

#[tokio::test]
async fn scenario_6_reversal_restores_balances_and_rejects_twice() {
    let engine = engine();
    let ctx = ActorContext::system();
    let (a, b) = seeded_accounts(&engine, &ctx).await;

    let transfer = engine
        .create_transfer(TransferInput::new(a.id, b.id, Money::new(dec!(500))), &ctx)
        .await
        .unwrap();
    let reversal = engine.reverse_transfer(transfer.id, HashMap::new(), &ctx).await.unwrap();
    assert_eq!(reversal.from_account_id, b.id);
    assert_eq!(reversal.to_account_id, a.id);
    assert_eq!(reversal.reversed_transfer_id, Some(transfer.id));

    let a_after = engine.get_account(a.id).await.unwrap();
    let b_after = engine.get_account(b.id).await.unwrap();
    assert_eq!(a_after.balance, a.balance);
    assert_eq!(b_after.balance, b.balance);

    let second = engine.reverse_transfer(transfer.id, HashMap::new(), &ctx).await;
    assert!(matches!(second, Err(LedgerError::TransferAlreadyReversed(id)) if id == transfer.id));
}

#[tokio::test]
async fn scenario_7_idempotent_replay_debits_exactly_once() {
    use ledger_core::idempotency::{admit, MemoryIdempotencyStore, Outcome, DEFAULT_TTL};

    let engine = engine();
    let ctx = ActorContext::system();
    let (a, b) = seeded_accounts(&engine, &ctx).await;
    let idem = MemoryIdempotencyStore::new();

    let call = || async {
        admit(&idem, "K1", "fp-same", DEFAULT_TTL, || async {
            let transfer = engine
                .create_transfer(TransferInput::new(a.id, b.id, Money::new(dec!(20))), &ctx)
                .await?;
            Ok(serde_json::json!({"transferId": transfer.id.to_string()}))
        })
        .await
        .unwrap()
    };

    let first = call().await.into_inner();
    let second = call().await.into_inner();
    assert_eq!(first, second, "replay must return the identical response body");

    let a_after = engine.get_account(a.id).await.unwrap();
    assert_eq!(a_after.balance, a.balance - Money::new(dec!(20)), "debited exactly once despite two calls");
}

#[tokio::test]
async fn scenario_8_concurrency_stress_no_deadlocks_escape() {
    let engine = Arc::new(engine());
    let ctx = ActorContext::system();
    let a = engine.create_account("a", "USD", false, true, &ctx).await.unwrap();
    let b = engine.create_account("b", "USD", true, true, &ctx).await.unwrap();
    let funder = engine.create_account("funder", "USD", true, true, &ctx).await.unwrap();
    engine
        .create_transfer(TransferInput::new(funder.id, a.id, Money::new(dec!(1000))), &ctx)
        .await
        .unwrap();

    let mut handles = Vec::with_capacity(100);
    for _ in 0..100 {
        let engine = engine.clone();
        let ctx = ActorContext::system();
        handles.push(tokio::spawn(async move {
            engine
                .create_transfer(TransferInput::new(a.id, b.id, Money::new(dec!(10))), &ctx)
                .await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        let result = handle.await.expect("task panicked, a deadlock or unhandled error escaped");
        if result.is_ok() {
            succeeded += 1;
        }
    }
    assert_eq!(succeeded, 100, "exactly 100 concurrent transfers of 10 against a balance of 1000 must all succeed");

    let a_after = engine.get_account(a.id).await.unwrap();
    let b_after = engine.get_account(b.id).await.unwrap();
    assert_eq!(a_after.balance, Money::ZERO);
    assert_eq!(b_after.balance, Money::new(dec!(1000)));
}
