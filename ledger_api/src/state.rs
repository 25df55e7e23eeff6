use std::future::Future;
use std::sync::Arc;

use ledger_core::error::LedgerResult;
use ledger_core::fingerprint::fingerprint;
use ledger_core::idempotency::{admit, Outcome};
use ledger_core::Application;

#[derive(Clone)]
pub struct AppState {
    pub app: Arc<Application>,
}

/// Runs a mutating handler body under idempotency admission when the
/// caller supplied an `Idempotency-Key` header, otherwise runs it directly.
/// `operation` namespaces the key (§6: `idempotency:<method>:<key>`) so the
/// same key reused across different operations (e.g. `POST /transfers` vs
/// `POST /holds`) never collide.
/// Returns the response body alongside whether it was a fresh execution or
/// a replay, so the route handler can pick the right status code.
pub async fn run_mutation<F, Fut>(
    state: &AppState,
    operation: &str,
    idempotency_key: Option<String>,
    request_body: &serde_json::Value,
    op: F,
) -> LedgerResult<(bool, serde_json::Value)>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = LedgerResult<serde_json::Value>>,
{
    match idempotency_key {
        None => {
            let body = op().await?;
            Ok((true, body))
        }
        Some(key) => {
            let namespaced_key = format!("{operation}:{key}");
            let fp = fingerprint(request_body);
            let outcome = admit(
                state.app.idempotency.as_ref(),
                &namespaced_key,
                &fp,
                state.app.config.idempotency_ttl,
                op,
            )
            .await?;
            let is_fresh = !matches!(outcome, Outcome::Replayed(_));
            Ok((is_fresh, outcome.into_inner()))
        }
    }
}
