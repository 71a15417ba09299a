//! Outbox side of the domain's publisher port.

use async_trait::async_trait;
use domain::{EventPublisher, OrderError};
use event_store::PersistableEvent;

use crate::event::OutboxEvent;
use crate::repository::OutboxRepository;

/// Publishes domain events by writing them to the outbox.
///
/// Nothing reaches the broker here; the relay picks the rows up once the
/// surrounding transaction has committed.
#[derive(Debug, Clone)]
pub struct OutboxPublisher<R> {
    repository: R,
}

impl<R: OutboxRepository> OutboxPublisher<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }
}

#[async_trait]
impl<R: OutboxRepository> EventPublisher for OutboxPublisher<R> {
    async fn publish(&self, event: &dyn PersistableEvent) -> Result<(), OrderError> {
        let row = OutboxEvent::from_event(event).map_err(|err| {
            OrderError::Publish(format!("cannot serialize {}: {err}", event.event_type()))
        })?;

        self.repository.save(&row).await?;
        tracing::debug!(
            outbox_id = %row.id,
            event_id = %row.event_id,
            event_type = %row.event_type,
            "event written to outbox"
        );
        Ok(())
    }
}
