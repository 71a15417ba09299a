//! Port through which committed domain events leave the write side.

use async_trait::async_trait;
use event_store::PersistableEvent;

use crate::error::OrderError;

/// Hands a domain event to the delivery pipeline.
///
/// Called inside the business transaction; an implementation must write
/// through the same transaction so a rollback discards the event too.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &dyn PersistableEvent) -> Result<(), OrderError>;
}

#[async_trait]
impl<P: EventPublisher + ?Sized> EventPublisher for std::sync::Arc<P> {
    async fn publish(&self, event: &dyn PersistableEvent) -> Result<(), OrderError> {
        (**self).publish(event).await
    }
}
