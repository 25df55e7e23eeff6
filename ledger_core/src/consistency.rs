//! Consistency checker (C10): the two ledger-wide invariants — sum of
//! account balances and sum of entry amounts both settle at zero — asked of
//! the store directly rather than reconstructed from the engine, since a
//! drift would mean the invariant was already violated before this check
//! ever runs.

use crate::error::{LedgerError, LedgerResult};
use crate::money::Money;
use crate::store::{LedgerRepository, Store};

pub async fn check_consistency<S: Store>(store: &S) -> LedgerResult<()> {
    let (sum_balances, sum_entries) = LedgerRepository::check_consistency(store)
        .await
        .map_err(crate::txn::classify_store_error)?;

    if sum_balances != Money::ZERO || sum_entries != Money::ZERO {
        return Err(LedgerError::InconsistentLedger {
            sum_balances: sum_balances.to_string(),
            sum_entries: sum_entries.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal_macros::dec;

    use crate::engine::{ActorContext, Engine, TransferInput};
    use crate::store::memory::MemoryStore;

    use super::*;

    #[tokio::test]
    async fn balanced_ledger_passes() {
        let store = Arc::new(MemoryStore::new());
        let engine = Engine::new(store.clone());
        let ctx = ActorContext::system();
        let a = engine.create_account("a", "USD", true, true, &ctx).await.unwrap();
        let b = engine.create_account("b", "USD", true, true, &ctx).await.unwrap();
        engine
            .create_transfer(TransferInput::new(a.id, b.id, Money::new(dec!(25))), &ctx)
            .await
            .unwrap();

        assert!(check_consistency(store.as_ref()).await.is_ok());
    }
}
