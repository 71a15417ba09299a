//! Transaction service.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;

use crate::error::{PersistenceError, Transient};
use crate::unit_of_work::{self, ScopeId};

/// A connection-like handle that can open, commit and roll back transactions.
///
/// A transaction belongs to the unit of work that opened it: repositories
/// built on the scope route a task's statements through the transaction that
/// task entered, and concurrent units of work on clones of the same scope
/// never share one.
#[async_trait]
pub trait TransactionScope: Send + Sync {
    /// State of one open transaction.
    type Transaction: Send + Sync + 'static;

    /// Identifies this scope; clones share it.
    fn id(&self) -> ScopeId;

    /// Opens a transaction.
    async fn begin(&self) -> Result<Self::Transaction, PersistenceError>;

    /// Commits `transaction`.
    async fn commit(&self, transaction: &Self::Transaction) -> Result<(), PersistenceError>;

    /// Rolls back `transaction`.
    async fn rollback(&self, transaction: &Self::Transaction) -> Result<(), PersistenceError>;

    /// Returns true while the calling task runs inside a transaction on this
    /// scope.
    fn is_active(&self) -> bool {
        unit_of_work::current::<Self::Transaction>(self.id()).is_some()
    }
}

/// Runs units of work atomically on a [`TransactionScope`].
#[derive(Debug, Clone)]
pub struct TransactionService<S> {
    scope: S,
}

impl<S: TransactionScope> TransactionService<S> {
    /// Creates a service over the given scope.
    pub fn new(scope: S) -> Self {
        Self { scope }
    }

    /// Returns the underlying scope.
    pub fn scope(&self) -> &S {
        &self.scope
    }

    /// Runs `callback` inside a transaction.
    ///
    /// When the calling task already runs inside a transaction on the scope
    /// the callback simply joins it and the outer caller keeps ownership of
    /// commit and rollback. Otherwise a transaction is opened for this call,
    /// committed when the callback returns `Ok`, and rolled back when it
    /// returns `Err` or panics. The callback's error is returned unchanged and
    /// a panic is resumed after the rollback.
    pub async fn execute<F, Fut, T, E>(&self, callback: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<PersistenceError>,
    {
        if self.scope.is_active() {
            return callback().await;
        }

        let transaction = Arc::new(self.scope.begin().await?);
        let outcome = AssertUnwindSafe(unit_of_work::enter(
            self.scope.id(),
            transaction.clone(),
            callback(),
        ))
        .catch_unwind()
        .await;

        match outcome {
            Ok(Ok(value)) => {
                self.scope.commit(&transaction).await?;
                Ok(value)
            }
            Ok(Err(err)) => {
                self.rollback(&transaction).await;
                Err(err)
            }
            Err(panic) => {
                tracing::error!("unit of work panicked, rolling back");
                self.rollback(&transaction).await;
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn rollback(&self, transaction: &S::Transaction) {
        if let Err(err) = self.scope.rollback(transaction).await {
            tracing::error!(error = %err, "transaction rollback failed");
        }
    }

    /// Like [`execute`](Self::execute), but retries transient failures
    /// (deadlocks, lock timeouts) up to `max_retries` times, sleeping
    /// `delay * attempt` before each retry.
    pub async fn execute_with_retry<F, Fut, T, E>(
        &self,
        mut callback: F,
        max_retries: u32,
        delay: Duration,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<PersistenceError> + Transient + Display,
    {
        let mut attempt: u32 = 0;
        loop {
            match self.execute(&mut callback).await {
                Err(err) if err.is_transient() && attempt < max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        error = %err,
                        attempt,
                        max_retries,
                        "transient transaction failure, retrying"
                    );
                    tokio::time::sleep(delay * attempt).await;
                }
                outcome => return outcome,
            }
        }
    }
}
