//! Outbox repository port.

use std::sync::Arc;

use async_trait::async_trait;
use persistence::Result;
use uuid::Uuid;

use crate::event::OutboxEvent;

/// Storage for outbox rows.
///
/// `save` runs inside the business transaction; a failure there aborts it.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Inserts a pending row.
    async fn save(&self, event: &OutboxEvent) -> Result<()>;

    /// Persists processing state: `processed_at`, `is_processed`,
    /// `retry_count` and `error`.
    async fn update(&self, event: &OutboxEvent) -> Result<()>;

    /// Pending rows, oldest first, at most `limit`.
    async fn find_unprocessed(&self, limit: usize) -> Result<Vec<OutboxEvent>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OutboxEvent>>;

    async fn count_unprocessed(&self) -> Result<u64>;
}

#[async_trait]
impl<R: OutboxRepository + ?Sized> OutboxRepository for Arc<R> {
    async fn save(&self, event: &OutboxEvent) -> Result<()> {
        (**self).save(event).await
    }

    async fn update(&self, event: &OutboxEvent) -> Result<()> {
        (**self).update(event).await
    }

    async fn find_unprocessed(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        (**self).find_unprocessed(limit).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OutboxEvent>> {
        (**self).find_by_id(id).await
    }

    async fn count_unprocessed(&self) -> Result<u64> {
        (**self).count_unprocessed().await
    }
}
