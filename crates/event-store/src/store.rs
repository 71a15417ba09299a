use async_trait::async_trait;

use crate::{AggregateId, Result, StoredEvent, Version};

/// Core trait for event store implementations.
///
/// The store is append-only: records are never updated or deleted, and
/// `(aggregate_id, version)` is unique across the store.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends one record.
    ///
    /// Fails with `DuplicateVersion` if the aggregate already has an event
    /// with the same version; the stored event is left untouched.
    async fn append(&self, event: StoredEvent) -> Result<()>;

    /// Retrieves all events of an aggregate, oldest first.
    ///
    /// Events are ordered by occurrence time, ties broken by version.
    async fn get_events_for_aggregate(&self, aggregate_id: AggregateId)
    -> Result<Vec<StoredEvent>>;

    /// Retrieves all events with the given tag across aggregates, oldest first.
    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<StoredEvent>>;

    /// Gets the highest stored version of an aggregate.
    ///
    /// Returns None if the aggregate has no events.
    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Checks if an aggregate exists (has any events).
    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Sorts records the way every store returns them.
pub(crate) fn sort_chronologically(events: &mut [StoredEvent]) {
    events.sort_by(|a, b| {
        a.occurred_at
            .cmp(&b.occurred_at)
            .then(a.version.cmp(&b.version))
    });
}
