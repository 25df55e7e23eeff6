//! Outbox drainer (C8): a single background task that polls for
//! unpublished events and hands them to a pluggable delivery sink, matching
//! the "spawn a background task, tick on an interval, select on shutdown"
//! shape the simulation loop uses for its own background tasks.
//!
//! Only one instance of this worker is ever spawned (Design Note, §9): the
//! drain query's `FOR UPDATE SKIP LOCKED` clause would let a second instance
//! run safely, but nothing in this crate starts one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::interval;

use crate::model::OutboxEvent;
use crate::store::{OutboxRepository, Store};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_BATCH_SIZE: i64 = 100;

/// Where drained events go. Swappable so tests can assert on delivered
/// events without standing up a real message broker.
#[async_trait]
pub trait OutboxSink: Send + Sync {
    async fn deliver(&self, event: &OutboxEvent) -> anyhow::Result<()>;
}

/// Logs every event at info level and otherwise does nothing; the default
/// sink until a real publisher (webhook, Kafka, SNS) is wired in.
pub struct LoggingSink;

#[async_trait]
impl OutboxSink for LoggingSink {
    async fn deliver(&self, event: &OutboxEvent) -> anyhow::Result<()> {
        tracing::info!(
            event_id = %event.id,
            event_type = event.event_type.as_wire_str(),
            aggregate_id = %event.aggregate_id,
            "delivering outbox event"
        );
        Ok(())
    }
}

pub struct OutboxWorker<S: Store> {
    store: Arc<S>,
    sink: Arc<dyn OutboxSink>,
    poll_interval: Duration,
    batch_size: i64,
}

impl<S: Store> OutboxWorker<S> {
    pub fn new(store: Arc<S>, sink: Arc<dyn OutboxSink>) -> Self {
        OutboxWorker {
            store,
            sink,
            poll_interval: DEFAULT_POLL_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Drains at most one batch. Exposed separately from `run` so tests can
    /// call it deterministically without waiting on a tick.
    pub async fn drain_once(&self) -> anyhow::Result<usize> {
        let events = OutboxRepository::get_unpublished(self.store.as_ref(), self.batch_size).await?;
        let count = events.len();
        for event in &events {
            match self.sink.deliver(event).await {
                Ok(()) => {
                    OutboxRepository::mark_published(self.store.as_ref(), event.id, Utc::now()).await?;
                }
                Err(err) => {
                    // Left unpublished; the next poll retries it. At-least-once
                    // delivery, never exactly-once past this boundary.
                    tracing::warn!(event_id = %event.id, error = %err, "outbox delivery failed, will retry");
                }
            }
        }
        Ok(count)
    }

    /// Runs until `shutdown` reports `true`. The flag is only checked
    /// between ticks, never mid-batch, so a batch always drains completely
    /// once started.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.poll_interval);
        tracing::info!(poll_interval_secs = self.poll_interval.as_secs(), "outbox worker started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.drain_once().await {
                        tracing::error!(error = %err, "outbox drain failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("outbox worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use rust_decimal_macros::dec;

    use crate::engine::{ActorContext, Engine, TransferInput};
    use crate::money::Money;
    use crate::store::memory::MemoryStore;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<crate::ids::Id>>,
    }

    #[async_trait]
    impl OutboxSink for RecordingSink {
        async fn deliver(&self, event: &OutboxEvent) -> anyhow::Result<()> {
            self.delivered.lock().unwrap().push(event.id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn drain_once_publishes_and_marks_events() {
        let store = Arc::new(MemoryStore::new());
        let engine = Engine::new(store.clone());
        let ctx = ActorContext::system();
        let a = engine.create_account("a", "USD", true, true, &ctx).await.unwrap();
        let b = engine.create_account("b", "USD", true, true, &ctx).await.unwrap();
        engine
            .create_transfer(TransferInput::new(a.id, b.id, Money::new(dec!(5))), &ctx)
            .await
            .unwrap();

        let sink = Arc::new(RecordingSink::default());
        let worker = OutboxWorker::new(store.clone(), sink.clone());
        // Two account.created events plus one transfer.created event.
        let drained = worker.drain_once().await.unwrap();
        assert_eq!(drained, 3);
        assert_eq!(sink.delivered.lock().unwrap().len(), 3);

        let remaining = OutboxRepository::get_unpublished(store.as_ref(), 100).await.unwrap();
        assert!(remaining.is_empty());
    }
}
