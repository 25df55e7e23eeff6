//! Double-entry ledger engine: accounts, transfers, holds, the transactional
//! outbox, idempotency, and the consistency checker. Transport-agnostic —
//! `ledger_api` is the thin HTTP/RPC adapter on top of this crate.

pub mod config;
pub mod consistency;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod idempotency;
pub mod ids;
pub mod model;
pub mod money;
pub mod outbox_worker;
pub mod store;
pub mod txn;

use std::sync::Arc;

use config::Config;
use engine::Engine;
use idempotency::IdempotencyStore;
use store::postgres::PostgresStore;

/// Everything a transport adapter needs, bundled once at startup and handed
/// around as an `Arc` (Design Note "Global singletons") instead of being
/// threaded through every handler signature by hand.
pub struct Application {
    pub engine: Engine<PostgresStore>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub config: Config,
}

impl Application {
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.database_max_conns)
            .min_connections(config.database_min_conns)
            .connect(&config.database_url)
            .await?;

        let store = PostgresStore::new(pool);
        store.init_schema().await?;

        let idempotency: Arc<dyn IdempotencyStore> = match &config.redis_url {
            Some(url) => Arc::new(idempotency::RedisIdempotencyStore::from_url(url)?),
            None => {
                tracing::warn!("REDIS_URL not set, using in-memory idempotency store (not safe across replicas)");
                Arc::new(idempotency::MemoryIdempotencyStore::new())
            }
        };

        Ok(Application {
            engine: Engine::new(Arc::new(store)),
            idempotency,
            config,
        })
    }
}
