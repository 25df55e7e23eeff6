//! Idempotency store (C9). A mutation that carries an idempotency key is
//! bound to a `(key, fingerprint)` pair; replaying the same key with the
//! same fingerprint returns the cached response instead of re-running the
//! operation, replaying with a different fingerprint is rejected, and an
//! unreachable store degrades to non-idempotent execution rather than
//! failing the request (§4.9). `key` here is already namespaced by the
//! caller to `<operation>:<raw key>` (§6: `idempotency:<method>:<key>`) so
//! the same raw key reused across two different operations never collides.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::LedgerError;

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Result of the atomic check-and-set.
#[derive(Debug, Clone)]
pub enum Admission {
    /// No prior call under this key; the fingerprint was just recorded.
    Fresh,
    /// A prior call recorded this fingerprint.
    Replay { stored_fingerprint: String },
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically returns `Admission::Fresh` and persists `fingerprint`
    /// under `key` if absent, or `Admission::Replay` with the fingerprint
    /// already stored.
    async fn check_and_set(&self, key: &str, fingerprint: &str, ttl: Duration) -> anyhow::Result<Admission>;

    /// Caches the response body for a key, for subsequent replays. Only
    /// called after a successful (2xx) operation.
    async fn store_response(&self, key: &str, response: &serde_json::Value, ttl: Duration) -> anyhow::Result<()>;

    async fn get_response(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>>;
}

/// Outcome of [`admit`], threaded back to the transport adapter so it can
/// tell a fresh 2xx apart from a replayed one.
pub enum Outcome<T> {
    Fresh(T),
    Replayed(T),
    /// The store was unreachable; the operation ran anyway, non-idempotently.
    Degraded(T),
}

impl<T> Outcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            Outcome::Fresh(v) | Outcome::Replayed(v) | Outcome::Degraded(v) => v,
        }
    }
}

/// Runs `op` under idempotency admission control. `op` must return a
/// `serde_json::Value` response body on success; only that path is cached.
/// Errors from `op` propagate without being cached, letting the caller
/// retry with the same key.
pub async fn admit<F, Fut>(
    store: &dyn IdempotencyStore,
    key: &str,
    fingerprint: &str,
    ttl: Duration,
    op: F,
) -> Result<Outcome<serde_json::Value>, LedgerError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<serde_json::Value, LedgerError>>,
{
    let admission = match store.check_and_set(key, fingerprint, ttl).await {
        Ok(admission) => Some(admission),
        Err(err) => {
            tracing::warn!(error = %err, "idempotency store unreachable, degrading to non-idempotent");
            None
        }
    };

    match admission {
        None => {
            let response = op().await?;
            Ok(Outcome::Degraded(response))
        }
        Some(Admission::Fresh) => {
            let response = op().await?;
            if let Err(err) = store.store_response(key, &response, ttl).await {
                tracing::warn!(error = %err, "failed to cache idempotent response");
            }
            Ok(Outcome::Fresh(response))
        }
        Some(Admission::Replay { stored_fingerprint }) => {
            if stored_fingerprint != fingerprint {
                return Err(LedgerError::IdempotencyKeyReused);
            }
            match store.get_response(key).await {
                Ok(Some(cached)) => Ok(Outcome::Replayed(cached)),
                // Fingerprint recorded but the response hasn't landed yet
                // (racing with the first caller, or it failed and was never
                // cached) — nothing sensible to replay, so run again.
                Ok(None) => {
                    let response = op().await?;
                    if let Err(err) = store.store_response(key, &response, ttl).await {
                        tracing::warn!(error = %err, "failed to cache idempotent response");
                    }
                    Ok(Outcome::Fresh(response))
                }
                Err(err) => {
                    tracing::warn!(error = %err, "idempotency store unreachable reading cached response");
                    let response = op().await?;
                    Ok(Outcome::Degraded(response))
                }
            }
        }
    }
}

/// In-memory implementation: the unreachable-store fallback path's
/// unit-test double, and the default for tests that don't need Redis.
#[derive(Default)]
pub struct MemoryIdempotencyStore {
    entries: Mutex<HashMap<String, Entry>>,
}

struct Entry {
    fingerprint: String,
    response: Option<serde_json::Value>,
    expires_at: std::time::Instant,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn prune_if_expired(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get(key) {
            if entry.expires_at <= std::time::Instant::now() {
                entries.remove(key);
            }
        }
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn check_and_set(&self, key: &str, fingerprint: &str, ttl: Duration) -> anyhow::Result<Admission> {
        self.prune_if_expired(key).await;
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get(key) {
            return Ok(Admission::Replay {
                stored_fingerprint: entry.fingerprint.clone(),
            });
        }
        entries.insert(
            key.to_string(),
            Entry {
                fingerprint: fingerprint.to_string(),
                response: None,
                expires_at: std::time::Instant::now() + ttl,
            },
        );
        Ok(Admission::Fresh)
    }

    async fn store_response(&self, key: &str, response: &serde_json::Value, ttl: Duration) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().await;
        let expires_at = std::time::Instant::now() + ttl;
        entries
            .entry(key.to_string())
            .and_modify(|e| {
                e.response = Some(response.clone());
                e.expires_at = expires_at;
            })
            .or_insert(Entry {
                fingerprint: String::new(),
                response: Some(response.clone()),
                expires_at,
            });
        Ok(())
    }

    async fn get_response(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
        self.prune_if_expired(key).await;
        let entries = self.entries.lock().await;
        Ok(entries.get(key).and_then(|e| e.response.clone()))
    }
}

/// Redis-backed implementation, grounded on `SET key value NX EX ttl` for
/// the atomic check-and-set.
pub struct RedisIdempotencyStore {
    client: redis::Client,
}

impl RedisIdempotencyStore {
    pub fn new(client: redis::Client) -> Self {
        RedisIdempotencyStore { client }
    }

    pub fn from_url(url: &str) -> anyhow::Result<Self> {
        Ok(RedisIdempotencyStore::new(redis::Client::open(url)?))
    }

    /// `key` already carries the `<method>:<key>` namespacing applied by
    /// the caller (§6: `idempotency:<method>:<key>`); this only adds the
    /// Redis-side `idempotency:` prefix and per-purpose suffix.
    fn fingerprint_key(key: &str) -> String {
        format!("idempotency:{key}:fp")
    }

    fn response_key(key: &str) -> String {
        format!("idempotency:{key}:resp")
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn check_and_set(&self, key: &str, fingerprint: &str, ttl: Duration) -> anyhow::Result<Admission> {
        use redis::AsyncCommands;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let set: Option<String> = conn
            .set_options(
                Self::fingerprint_key(key),
                fingerprint,
                redis::SetOptions::default()
                    .conditional_set(redis::ExistenceCheck::NX)
                    .with_expiration(redis::SetExpiry::EX(ttl.as_secs() as usize)),
            )
            .await?;
        if set.is_some() {
            return Ok(Admission::Fresh);
        }
        let stored_fingerprint: String = conn.get(Self::fingerprint_key(key)).await?;
        Ok(Admission::Replay { stored_fingerprint })
    }

    async fn store_response(&self, key: &str, response: &serde_json::Value, ttl: Duration) -> anyhow::Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let body = serde_json::to_string(response)?;
        conn.set_ex::<_, _, ()>(Self::response_key(key), body, ttl.as_secs()).await?;
        Ok(())
    }

    async fn get_response(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
        use redis::AsyncCommands;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let body: Option<String> = conn.get(Self::response_key(key)).await?;
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn fresh_call_runs_and_caches() {
        let store = MemoryIdempotencyStore::new();
        let mut calls = 0;
        let outcome = admit(&store, "key-1", "fp-1", DEFAULT_TTL, || async {
            calls += 1;
            Ok(json!({"ok": true}))
        })
        .await
        .unwrap();
        assert!(matches!(outcome, Outcome::Fresh(_)));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn replay_with_same_fingerprint_returns_cached_response() {
        let store = MemoryIdempotencyStore::new();
        admit(&store, "key-1", "fp-1", DEFAULT_TTL, || async { Ok(json!({"n": 1})) })
            .await
            .unwrap();

        let mut calls = 0;
        let outcome = admit(&store, "key-1", "fp-1", DEFAULT_TTL, || async {
            calls += 1;
            Ok(json!({"n": 2}))
        })
        .await
        .unwrap();

        assert_eq!(calls, 0);
        match outcome {
            Outcome::Replayed(body) => assert_eq!(body, json!({"n": 1})),
            _ => panic!("expected replay"),
        }
    }

    #[tokio::test]
    async fn replay_with_different_fingerprint_is_rejected() {
        let store = MemoryIdempotencyStore::new();
        admit(&store, "key-1", "fp-1", DEFAULT_TTL, || async { Ok(json!({})) })
            .await
            .unwrap();

        let result = admit(&store, "key-1", "fp-2", DEFAULT_TTL, || async { Ok(json!({})) }).await;
        assert!(matches!(result, Err(LedgerError::IdempotencyKeyReused)));
    }

    struct UnreachableStore;

    #[async_trait]
    impl IdempotencyStore for UnreachableStore {
        async fn check_and_set(&self, _key: &str, _fingerprint: &str, _ttl: Duration) -> anyhow::Result<Admission> {
            anyhow::bail!("connection refused")
        }
        async fn store_response(&self, _key: &str, _response: &serde_json::Value, _ttl: Duration) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }
        async fn get_response(&self, _key: &str) -> anyhow::Result<Option<serde_json::Value>> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn unreachable_store_degrades_instead_of_failing() {
        let store = UnreachableStore;
        let mut calls = 0;
        let outcome = admit(&store, "key-1", "fp-1", DEFAULT_TTL, || async {
            calls += 1;
            Ok(json!({"ok": true}))
        })
        .await
        .unwrap();
        assert_eq!(calls, 1);
        assert!(matches!(outcome, Outcome::Degraded(_)));
    }
}
