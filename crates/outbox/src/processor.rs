//! Relay from the outbox table to the message bus.

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures_util::FutureExt;

use crate::bus::{MessageBus, MessageMetadata};
use crate::error::{OutboxError, Result};
use crate::lock::LockProvider;
use crate::repository::OutboxRepository;

/// Name of the lock that serializes relay invocations.
pub const LOCK_KEY: &str = "outbox_event_processor";

/// How long a relay may hold the lock before others may take it over.
pub const LOCK_TTL: Duration = Duration::from_secs(60);

pub const DEFAULT_DOMAIN: &str = "order";

/// Publishes pending outbox rows, at least once each.
///
/// Only one invocation at a time does any work: whoever holds
/// [`LOCK_KEY`] publishes, everyone else returns 0 immediately.
pub struct OutboxProcessor<R, B, L> {
    repository: R,
    bus: B,
    locks: L,
    domain: String,
}

impl<R, B, L> OutboxProcessor<R, B, L>
where
    R: OutboxRepository,
    B: MessageBus,
    L: LockProvider,
{
    pub fn new(repository: R, bus: B, locks: L) -> Self {
        Self {
            repository,
            bus,
            locks,
            domain: DEFAULT_DOMAIN.to_owned(),
        }
    }

    /// Sets the routing key prefix.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Publishes up to `batch_size` pending rows and returns how many were
    /// published and stored as processed.
    ///
    /// A row whose publish fails stays pending with its retry count bumped;
    /// the rest of the batch carries on. The lock is released on every path,
    /// including a panic inside the batch.
    #[tracing::instrument(skip(self))]
    pub async fn process_outbox_events(&self, batch_size: usize) -> Result<usize> {
        let Some(token) = self.locks.acquire(LOCK_KEY, LOCK_TTL).await? else {
            metrics::counter!("outbox_lock_contention_total").increment(1);
            tracing::info!("outbox processor is already running");
            return Ok(0);
        };

        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.process_batch(batch_size))
            .catch_unwind()
            .await;

        if let Err(err) = self.locks.release(&token).await {
            tracing::error!(error = %err, "failed to release outbox lock");
        }
        metrics::histogram!("outbox_batch_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        outcome.unwrap_or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_owned());
            tracing::error!(%message, "outbox batch panicked");
            Err(OutboxError::BatchPanicked(message))
        })
    }

    async fn process_batch(&self, batch_size: usize) -> Result<usize> {
        let events = self.repository.find_unprocessed(batch_size).await?;
        if events.is_empty() {
            tracing::debug!("no unprocessed outbox events");
            return Ok(0);
        }
        tracing::info!(count = events.len(), "found unprocessed outbox events");

        let mut processed = 0;
        for mut event in events {
            let topic = event.routing_key(&self.domain);
            let metadata = MessageMetadata::for_event(&event);

            let published = match self.bus.publish(&topic, &event.payload, &metadata).await {
                Ok(()) => {
                    event.mark_as_processed();
                    metrics::counter!("outbox_events_published_total", "event_type" => event.event_type.clone())
                        .increment(1);
                    tracing::info!(
                        outbox_id = %event.id,
                        event_type = %event.event_type,
                        %topic,
                        "outbox event published"
                    );
                    true
                }
                Err(err) => {
                    event.record_failure(err.to_string());
                    metrics::counter!("outbox_events_failed_total", "event_type" => event.event_type.clone())
                        .increment(1);
                    tracing::error!(
                        outbox_id = %event.id,
                        retry_count = event.retry_count,
                        error = %err,
                        "error publishing outbox event"
                    );
                    false
                }
            };

            // Only a row whose new state is stored counts as processed; one
            // that failed to store stays pending and is published again.
            match self.repository.update(&event).await {
                Ok(()) if published => processed += 1,
                Ok(()) => {}
                Err(err) => tracing::error!(
                    outbox_id = %event.id,
                    error = %err,
                    "failed to persist outbox event state"
                ),
            }
        }

        Ok(processed)
    }
}

impl<R, B, L> std::fmt::Debug for OutboxProcessor<R, B, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxProcessor")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use common::AggregateId;
    use event_store::EventId;

    use super::*;
    use crate::bus::InMemoryMessageBus;
    use crate::error::PublishError;
    use crate::event::OutboxEvent;
    use crate::lock::InMemoryLockProvider;
    use crate::memory::InMemoryOutboxRepository;

    type Processor = OutboxProcessor<InMemoryOutboxRepository, InMemoryMessageBus, InMemoryLockProvider>;

    struct Fixture {
        processor: Processor,
        repository: InMemoryOutboxRepository,
        bus: InMemoryMessageBus,
        locks: InMemoryLockProvider,
    }

    fn fixture() -> Fixture {
        let repository = InMemoryOutboxRepository::new();
        let bus = InMemoryMessageBus::new();
        let locks = InMemoryLockProvider::new();
        Fixture {
            processor: OutboxProcessor::new(repository.clone(), bus.clone(), locks.clone()),
            repository,
            bus,
            locks,
        }
    }

    async fn seed(repository: &InMemoryOutboxRepository, count: usize) -> Vec<OutboxEvent> {
        let mut rows = Vec::new();
        for i in 0..count {
            let mut row = OutboxEvent::new(
                EventId::new(),
                "OrderStatusChangedEvent",
                AggregateId::new(),
                format!("{{\"n\":{i}}}"),
            );
            row.created_at += chrono::Duration::milliseconds(i as i64);
            repository.save(&row).await.unwrap();
            rows.push(row);
        }
        rows
    }

    #[tokio::test]
    async fn test_every_row_published_exactly_once() {
        let f = fixture();
        let rows = seed(&f.repository, 5).await;

        assert_eq!(f.processor.process_outbox_events(2).await.unwrap(), 2);
        assert_eq!(f.processor.process_outbox_events(2).await.unwrap(), 2);
        assert_eq!(f.processor.process_outbox_events(2).await.unwrap(), 1);
        assert_eq!(f.processor.process_outbox_events(2).await.unwrap(), 0);

        let delivered = f.bus.delivered().await;
        let ids: Vec<_> = delivered.iter().map(|m| m.metadata.message_id).collect();
        let expected: Vec<_> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, expected);
        assert_eq!(f.repository.count_unprocessed().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_message_shape() {
        let f = fixture();
        let rows = seed(&f.repository, 1).await;

        f.processor.process_outbox_events(10).await.unwrap();

        let message = &f.bus.delivered().await[0];
        assert_eq!(message.topic, "order.order_status_changed");
        assert_eq!(message.payload, rows[0].payload);
        assert_eq!(message.metadata.event_type, "OrderStatusChangedEvent");
        assert_eq!(message.metadata.content_type, "application/json");
        assert_eq!(message.metadata.aggregate_id, rows[0].aggregate_id);
    }

    #[tokio::test]
    async fn test_custom_domain_prefix() {
        let repository = InMemoryOutboxRepository::new();
        let bus = InMemoryMessageBus::new();
        let processor = OutboxProcessor::new(repository.clone(), bus.clone(), InMemoryLockProvider::new())
            .with_domain("sales");
        seed(&repository, 1).await;

        processor.process_outbox_events(1).await.unwrap();
        assert_eq!(bus.delivered().await[0].topic, "sales.order_status_changed");
    }

    #[tokio::test]
    async fn test_failed_row_does_not_stop_batch() {
        let f = fixture();
        let rows = seed(&f.repository, 3).await;
        f.bus.fail_message(rows[1].id).await;

        assert_eq!(f.processor.process_outbox_events(10).await.unwrap(), 2);

        let failed = f.repository.find_by_id(rows[1].id).await.unwrap().unwrap();
        assert!(!failed.is_processed);
        assert_eq!(failed.retry_count, 1);
        assert!(failed.error.as_deref().unwrap().contains("rejected"));

        for row in [&rows[0], &rows[2]] {
            let stored = f.repository.find_by_id(row.id).await.unwrap().unwrap();
            assert!(stored.is_processed);
            assert!(stored.processed_at.is_some());
        }

        f.bus.heal_message(rows[1].id).await;
        assert_eq!(f.processor.process_outbox_events(10).await.unwrap(), 1);
        let healed = f.repository.find_by_id(rows[1].id).await.unwrap().unwrap();
        assert!(healed.is_processed);
        assert_eq!(healed.retry_count, 1);
    }

    #[tokio::test]
    async fn test_held_lock_skips_processing() {
        let f = fixture();
        seed(&f.repository, 2).await;
        let token = f.locks.acquire(LOCK_KEY, LOCK_TTL).await.unwrap().unwrap();

        assert_eq!(f.processor.process_outbox_events(10).await.unwrap(), 0);
        assert_eq!(f.bus.delivery_count().await, 0);
        assert_eq!(f.repository.count_unprocessed().await.unwrap(), 2);

        f.locks.release(&token).await.unwrap();
        assert_eq!(f.processor.process_outbox_events(10).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_lock_released_after_batch() {
        let f = fixture();
        seed(&f.repository, 1).await;

        f.processor.process_outbox_events(10).await.unwrap();
        assert!(!f.locks.is_held(LOCK_KEY).await);

        f.processor.process_outbox_events(10).await.unwrap();
        assert!(!f.locks.is_held(LOCK_KEY).await);
    }

    #[tokio::test]
    async fn test_row_not_counted_when_its_state_is_not_stored() {
        let f = fixture();
        seed(&f.repository, 2).await;
        f.repository.set_fail_on_update(true);

        assert_eq!(f.processor.process_outbox_events(10).await.unwrap(), 0);
        assert_eq!(f.bus.delivery_count().await, 2);
        // Still pending, so the next run publishes them again.
        assert_eq!(f.repository.count_unprocessed().await.unwrap(), 2);

        f.repository.set_fail_on_update(false);
        assert_eq!(f.processor.process_outbox_events(10).await.unwrap(), 2);
        assert_eq!(f.bus.delivery_count().await, 4);
        assert_eq!(f.repository.count_unprocessed().await.unwrap(), 0);
    }

    struct PanickingBus;

    #[async_trait]
    impl MessageBus for PanickingBus {
        async fn publish(
            &self,
            _topic: &str,
            _payload: &str,
            _metadata: &MessageMetadata,
        ) -> std::result::Result<(), PublishError> {
            panic!("broker client bug");
        }
    }

    #[tokio::test]
    async fn test_panic_releases_lock() {
        let repository = InMemoryOutboxRepository::new();
        let locks = InMemoryLockProvider::new();
        let processor = OutboxProcessor::new(repository.clone(), PanickingBus, locks.clone());
        seed(&repository, 1).await;

        let result = processor.process_outbox_events(10).await;

        assert!(matches!(result, Err(OutboxError::BatchPanicked(msg)) if msg == "broker client bug"));
        assert!(!locks.is_held(LOCK_KEY).await);
    }
}
