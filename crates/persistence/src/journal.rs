//! In-memory transactional state.
//!
//! A [`Journal`] wraps a value that in-memory stores mutate. Journals enlisted
//! in an [`InMemoryTransactionScope`] are checkpointed on `begin`, restored on
//! `rollback` and released on `commit`, which gives in-memory repositories the
//! same all-or-nothing behaviour a database transaction gives the Postgres
//! ones.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{
    Mutex as AsyncMutex, OwnedMutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use crate::error::PersistenceError;
use crate::transaction::TransactionScope;
use crate::unit_of_work::ScopeId;

/// State that can take part in an in-memory transaction.
#[async_trait]
pub trait Journaled: Send + Sync {
    /// Remembers the current state.
    async fn checkpoint(&self);

    /// Puts back the state remembered by the last checkpoint.
    async fn restore(&self);

    /// Forgets the last checkpoint, keeping the current state.
    async fn release(&self);
}

/// A value guarded by an async lock, with a single checkpoint slot.
#[derive(Debug, Default)]
pub struct Journal<T> {
    state: RwLock<T>,
    checkpoint: AsyncMutex<Option<T>>,
}

impl<T> Journal<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: RwLock::new(value),
            checkpoint: AsyncMutex::new(None),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, T> {
        self.state.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.state.write().await
    }
}

#[async_trait]
impl<T> Journaled for Journal<T>
where
    T: Clone + Send + Sync,
{
    async fn checkpoint(&self) {
        let snapshot = self.state.read().await.clone();
        *self.checkpoint.lock().await = Some(snapshot);
    }

    async fn restore(&self) {
        if let Some(snapshot) = self.checkpoint.lock().await.take() {
            *self.state.write().await = snapshot;
        }
    }

    async fn release(&self) {
        self.checkpoint.lock().await.take();
    }
}

struct ScopeInner {
    id: ScopeId,
    gate: Arc<AsyncMutex<()>>,
    participants: Mutex<Vec<Arc<dyn Journaled>>>,
}

/// Transaction scope for in-memory stores.
///
/// Cloning the scope shares it: stores built on any clone take part in the
/// same transactions. Units of work on one scope run one at a time, so a
/// rollback never discards another unit's committed writes.
#[derive(Clone)]
pub struct InMemoryTransactionScope {
    inner: Arc<ScopeInner>,
}

impl InMemoryTransactionScope {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                id: ScopeId::next(),
                gate: Arc::new(AsyncMutex::new(())),
                participants: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Adds a journal to every future transaction on this scope.
    pub fn enlist(&self, participant: Arc<dyn Journaled>) {
        self.participants().push(participant);
    }

    fn participants(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn Journaled>>> {
        self.inner
            .participants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryTransactionScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryTransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransactionScope")
            .field("id", &self.inner.id)
            .field("participants", &self.participants().len())
            .finish()
    }
}

/// An open in-memory transaction. Holds the scope's gate until it finishes.
///
/// Dropped without commit or rollback, for example when its unit of work is
/// cancelled, it restores the checkpoints on a background task before
/// letting the next unit of work in.
pub struct InMemoryTransaction {
    gate: Mutex<Option<OwnedMutexGuard<()>>>,
    participants: Vec<Arc<dyn Journaled>>,
}

impl InMemoryTransaction {
    fn finish(&self) -> Result<OwnedMutexGuard<()>, PersistenceError> {
        self.gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(PersistenceError::NoActiveTransaction("finish"))
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        let Ok(gate) = self.finish() else {
            return;
        };
        let participants = std::mem::take(&mut self.participants);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            tracing::warn!("in-memory transaction abandoned, restoring checkpoints");
            runtime.spawn(async move {
                for participant in participants {
                    participant.restore().await;
                }
                drop(gate);
            });
        }
    }
}

#[async_trait]
impl TransactionScope for InMemoryTransactionScope {
    type Transaction = InMemoryTransaction;

    fn id(&self) -> ScopeId {
        self.inner.id
    }

    async fn begin(&self) -> Result<InMemoryTransaction, PersistenceError> {
        let gate = self.inner.gate.clone().lock_owned().await;
        let participants = self.participants().clone();
        for participant in &participants {
            participant.checkpoint().await;
        }
        Ok(InMemoryTransaction {
            gate: Mutex::new(Some(gate)),
            participants,
        })
    }

    async fn commit(&self, transaction: &InMemoryTransaction) -> Result<(), PersistenceError> {
        let gate = transaction
            .finish()
            .map_err(|_| PersistenceError::NoActiveTransaction("commit"))?;
        for participant in &transaction.participants {
            participant.release().await;
        }
        drop(gate);
        Ok(())
    }

    async fn rollback(&self, transaction: &InMemoryTransaction) -> Result<(), PersistenceError> {
        let gate = transaction
            .finish()
            .map_err(|_| PersistenceError::NoActiveTransaction("roll back"))?;
        for participant in &transaction.participants {
            participant.restore().await;
        }
        drop(gate);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn rollback_restores_every_participant() {
        let scope = InMemoryTransactionScope::new();
        let numbers = Arc::new(Journal::new(vec![1]));
        let names = Arc::new(Journal::new(String::from("a")));
        scope.enlist(numbers.clone());
        scope.enlist(names.clone());

        let tx = scope.begin().await.unwrap();
        numbers.write().await.push(2);
        names.write().await.push('b');
        scope.rollback(&tx).await.unwrap();

        assert_eq!(*numbers.read().await, vec![1]);
        assert_eq!(*names.read().await, "a");
    }

    #[tokio::test]
    async fn commit_keeps_changes() {
        let scope = InMemoryTransactionScope::new();
        let numbers = Arc::new(Journal::new(Vec::<u8>::new()));
        scope.enlist(numbers.clone());

        let tx = scope.begin().await.unwrap();
        numbers.write().await.push(7);
        scope.commit(&tx).await.unwrap();

        // A finished transaction cannot be rolled back afterwards.
        assert!(matches!(
            scope.rollback(&tx).await,
            Err(PersistenceError::NoActiveTransaction(_))
        ));
        assert_eq!(*numbers.read().await, vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn second_begin_waits_for_the_first_to_finish() {
        let scope = InMemoryTransactionScope::new();
        let other = scope.clone();
        assert_eq!(scope.id(), other.id());

        let first = scope.begin().await.unwrap();
        let blocked = tokio::time::timeout(Duration::from_secs(1), other.begin()).await;
        assert!(blocked.is_err());

        scope.commit(&first).await.unwrap();
        let second = other.begin().await.unwrap();
        other.commit(&second).await.unwrap();
    }

    #[tokio::test]
    async fn dropped_transaction_restores_and_frees_the_scope() {
        let scope = InMemoryTransactionScope::new();
        let numbers = Arc::new(Journal::new(vec![1]));
        scope.enlist(numbers.clone());

        let tx = scope.begin().await.unwrap();
        numbers.write().await.push(2);
        drop(tx);

        let next = scope.begin().await.unwrap();
        assert_eq!(*numbers.read().await, vec![1]);
        scope.commit(&next).await.unwrap();
    }

    #[test]
    fn scopes_get_distinct_ids() {
        assert_ne!(
            InMemoryTransactionScope::new().id(),
            InMemoryTransactionScope::new().id()
        );
    }
}
