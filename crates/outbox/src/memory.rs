use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use persistence::{InMemoryTransactionScope, Journal, PersistenceError, Result};
use uuid::Uuid;

use crate::event::OutboxEvent;
use crate::repository::OutboxRepository;

/// In-memory outbox for tests and local runs.
#[derive(Clone, Default)]
pub struct InMemoryOutboxRepository {
    rows: Arc<Journal<Vec<OutboxEvent>>>,
    fail_on_update: Arc<AtomicBool>,
}

impl InMemoryOutboxRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository whose inserts join transactions on `scope`.
    pub fn with_scope(scope: &InMemoryTransactionScope) -> Self {
        let repository = Self::new();
        scope.enlist(repository.rows.clone());
        repository
    }

    /// Makes `update` fail until switched off again.
    pub fn set_fail_on_update(&self, fail: bool) {
        self.fail_on_update.store(fail, Ordering::SeqCst);
    }

    /// All rows in insertion order.
    pub async fn all(&self) -> Vec<OutboxEvent> {
        self.rows.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

impl std::fmt::Debug for InMemoryOutboxRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryOutboxRepository").finish_non_exhaustive()
    }
}

#[async_trait]
impl OutboxRepository for InMemoryOutboxRepository {
    async fn save(&self, event: &OutboxEvent) -> Result<()> {
        let mut rows = self.rows.write().await;
        if rows
            .iter()
            .any(|row| row.id == event.id || row.event_id == event.event_id)
        {
            return Err(PersistenceError::Backend(format!(
                "outbox already holds event {}",
                event.event_id
            )));
        }
        rows.push(event.clone());
        Ok(())
    }

    async fn update(&self, event: &OutboxEvent) -> Result<()> {
        if self.fail_on_update.load(Ordering::SeqCst) {
            return Err(PersistenceError::Backend("injected update failure".into()));
        }

        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|row| row.id == event.id)
            .ok_or_else(|| PersistenceError::Backend(format!("outbox row {} not found", event.id)))?;

        row.processed_at = event.processed_at;
        row.is_processed = event.is_processed;
        row.retry_count = event.retry_count;
        row.error = event.error.clone();
        Ok(())
    }

    async fn find_unprocessed(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        let rows = self.rows.read().await;
        let mut pending: Vec<_> = rows.iter().filter(|row| !row.is_processed).cloned().collect();
        pending.sort_by_key(|row| row.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OutboxEvent>> {
        Ok(self.rows.read().await.iter().find(|row| row.id == id).cloned())
    }

    async fn count_unprocessed(&self) -> Result<u64> {
        let rows = self.rows.read().await;
        Ok(rows.iter().filter(|row| !row.is_processed).count() as u64)
    }
}
