//! Shared PostgreSQL session.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgQueryResult, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;

use crate::error::{PersistenceError, Result};
use crate::transaction::TransactionScope;
use crate::unit_of_work::{self, ScopeId};

/// Opens a connection pool.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Runs the workspace migrations against the pool.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// A pool shared by every Postgres repository.
///
/// Statements issued from inside a [`TransactionService`] unit of work go
/// through the transaction that unit opened; everything else runs straight
/// on the pool. Concurrent units of work on clones of one session each get
/// their own transaction and connection.
///
/// [`TransactionService`]: crate::TransactionService
#[derive(Clone)]
pub struct PgSession {
    pool: PgPool,
    id: ScopeId,
}

/// An open Postgres transaction, empty once committed or rolled back.
///
/// Dropped while still open, sqlx rolls it back when the connection returns
/// to the pool.
pub struct PgTransaction {
    inner: Mutex<Option<Transaction<'static, Postgres>>>,
}

impl PgTransaction {
    async fn take(&self, action: &'static str) -> Result<Transaction<'static, Postgres>> {
        self.inner
            .lock()
            .await
            .take()
            .ok_or(PersistenceError::NoActiveTransaction(action))
    }
}

/// Runs `$query` with `$method` on the task's open transaction, or the pool.
macro_rules! route {
    ($session:expr, $query:expr, $method:ident) => {{
        match $session.current() {
            Some(transaction) => {
                let mut guard = transaction.inner.lock().await;
                let tx = guard
                    .as_mut()
                    .ok_or(PersistenceError::NoActiveTransaction("run a statement"))?;
                $query.$method(&mut **tx).await?
            }
            None => $query.$method(&$session.pool).await?,
        }
    }};
}

impl PgSession {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            id: ScopeId::next(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn current(&self) -> Option<Arc<PgTransaction>> {
        unit_of_work::current::<PgTransaction>(self.id)
    }

    pub async fn execute<'q>(&self, query: Query<'q, Postgres, PgArguments>) -> Result<PgQueryResult> {
        Ok(route!(self, query, execute))
    }

    pub async fn fetch_all<'q>(&self, query: Query<'q, Postgres, PgArguments>) -> Result<Vec<PgRow>> {
        Ok(route!(self, query, fetch_all))
    }

    pub async fn fetch_optional<'q>(
        &self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Result<Option<PgRow>> {
        Ok(route!(self, query, fetch_optional))
    }

    pub async fn fetch_one<'q>(&self, query: Query<'q, Postgres, PgArguments>) -> Result<PgRow> {
        Ok(route!(self, query, fetch_one))
    }
}

impl std::fmt::Debug for PgSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSession")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TransactionScope for PgSession {
    type Transaction = PgTransaction;

    fn id(&self) -> ScopeId {
        self.id
    }

    async fn begin(&self) -> Result<PgTransaction> {
        let tx = self.pool.begin().await?;
        tracing::trace!("transaction opened");
        Ok(PgTransaction {
            inner: Mutex::new(Some(tx)),
        })
    }

    async fn commit(&self, transaction: &PgTransaction) -> Result<()> {
        transaction.take("commit").await?.commit().await?;
        tracing::trace!("transaction committed");
        Ok(())
    }

    async fn rollback(&self, transaction: &PgTransaction) -> Result<()> {
        transaction.take("roll back").await?.rollback().await?;
        tracing::debug!("transaction rolled back");
        Ok(())
    }
}
