//! Transaction manager and retrier (C4). The engine never retries by hand:
//! every mutating call is wrapped in [`Retrier::run`], which re-executes the
//! whole closure — including re-beginning the transaction — on a
//! [`StoreError::Retryable`], using the corpus's usual exponential-backoff
//! shape.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::{LedgerError, StoreError};

const INITIAL_BACKOFF: Duration = Duration::from_millis(50);
const MAX_BACKOFF: Duration = Duration::from_secs(1);
const MAX_RETRIES: u32 = 3;
const MAX_ELAPSED: Duration = Duration::from_secs(10);

/// Default deadline applied to a mutating operation absent an explicit one.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);

pub struct Retrier;

impl Retrier {
    /// Runs `body` up to `MAX_RETRIES + 1` times, retrying only on
    /// `StoreError::Retryable`, capped by both an attempt count and a total
    /// elapsed-time budget. `body` is expected to begin its own transaction
    /// on each call so a retry gets a fresh one.
    pub async fn run<F, Fut, T>(mut body: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, LedgerError>>,
    {
        let start = Instant::now();
        let mut attempt = 0u32;
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match body().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let retryable = matches!(&err, LedgerError::Internal(source)
                        if source.downcast_ref::<StoreError>().map_or(false, |e| matches!(e, StoreError::Retryable(_))));

                    if !retryable || attempt >= MAX_RETRIES || start.elapsed() >= MAX_ELAPSED {
                        if retryable {
                            return Err(LedgerError::RetriesExhausted(err.to_string()));
                        }
                        return Err(err);
                    }

                    attempt += 1;
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }
}

/// Maps a [`StoreError`] surfaced mid-engine into the [`LedgerError`] the
/// `Retrier` inspects. Not-found mappings are the caller's responsibility
/// (they know which entity was being looked up); this only classifies the
/// retryable/internal split.
pub fn classify_store_error(err: StoreError) -> LedgerError {
    match err {
        StoreError::Retryable(_) => LedgerError::Internal(anyhow::anyhow!(err)),
        StoreError::NotFound => LedgerError::Internal(anyhow::anyhow!("unexpected not-found")),
        StoreError::Other(e) => LedgerError::Internal(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_on_retryable_error_then_succeeds() {
        let attempts = AtomicU32::new(0);
        let result = Retrier::run(|| async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(classify_store_error(StoreError::Retryable("conflict".into())))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_domain_errors() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), LedgerError> = Retrier::run(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(LedgerError::InvalidAmount)
        })
        .await;
        assert!(matches!(result, Err(LedgerError::InvalidAmount)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_after_max_retries() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), LedgerError> = Retrier::run(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(classify_store_error(StoreError::Retryable("conflict".into())))
        })
        .await;
        assert!(matches!(result, Err(LedgerError::RetriesExhausted(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_RETRIES + 1);
    }
}
