//! Outbox error types.

use persistence::PersistenceError;
use thiserror::Error;

/// A message could not be handed to the broker.
///
/// Scoped to one outbox row: the processor records it on the row and moves on.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Broker rejected message for {topic}: {reason}")]
    Rejected { topic: String, reason: String },

    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

/// The lock backend failed. Not being granted the lock is not an error.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Lock storage error: {0}")]
    Storage(#[from] PersistenceError),
}

impl From<sqlx::Error> for LockError {
    fn from(err: sqlx::Error) -> Self {
        LockError::Storage(PersistenceError::Database(err))
    }
}

/// Failures that abort a relay invocation.
#[derive(Debug, Error)]
pub enum OutboxError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Lock(#[from] LockError),

    /// The batch panicked; the lock was released before this was returned.
    #[error("Outbox batch panicked: {0}")]
    BatchPanicked(String),
}

/// Result type for outbox operations.
pub type Result<T> = std::result::Result<T, OutboxError>;
