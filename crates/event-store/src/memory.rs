use std::sync::Arc;

use async_trait::async_trait;
use persistence::{InMemoryTransactionScope, Journal};

use crate::{
    AggregateId, EventStoreError, Result, StoredEvent, Version,
    store::{EventStore, sort_chronologically},
};

/// In-memory event store implementation for tests and local runs.
///
/// Enlisted in an [`InMemoryTransactionScope`], appends made inside a
/// transaction disappear again when it rolls back.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    events: Arc<Journal<Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    /// Creates a new empty store outside any transaction scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new empty store that joins transactions on `scope`.
    pub fn with_scope(scope: &InMemoryTransactionScope) -> Self {
        let store = Self::new();
        scope.enlist(store.events.clone());
        store
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: StoredEvent) -> Result<()> {
        let mut store = self.events.write().await;

        let duplicate = store
            .iter()
            .any(|e| e.aggregate_id == event.aggregate_id && e.version == event.version);
        if duplicate {
            return Err(EventStoreError::DuplicateVersion {
                aggregate_id: event.aggregate_id,
                version: event.version,
            });
        }

        store.push(event);
        Ok(())
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>> {
        let store = self.events.read().await;
        let mut events: Vec<_> = store
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect();
        sort_chronologically(&mut events);
        Ok(events)
    }

    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<StoredEvent>> {
        let store = self.events.read().await;
        let mut events: Vec<_> = store
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect();
        sort_chronologically(&mut events);
        Ok(events)
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let store = self.events.read().await;
        Ok(store
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .map(|e| e.version)
            .max())
    }
}
