use thiserror::Error;

/// SQLSTATE codes Postgres raises when a transaction lost a lock race:
/// `deadlock_detected` and `lock_not_available`.
const TRANSIENT_SQLSTATES: [&str; 2] = ["40P01", "55P03"];

/// Errors raised while reading or writing persisted state.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A value could not be serialized for storage or read back.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row could not be mapped back to its type.
    #[error("Corrupted row in {table}: {reason}")]
    CorruptedRow { table: &'static str, reason: String },

    /// A transaction was used after it was committed or rolled back.
    #[error("No active transaction to {0}")]
    NoActiveTransaction(&'static str),

    /// A storage backend without a driver error type failed.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl PersistenceError {
    /// Creates a corrupted-row error for the given table.
    pub fn corrupted(table: &'static str, reason: impl Into<String>) -> Self {
        Self::CorruptedRow {
            table,
            reason: reason.into(),
        }
    }
}

/// Result type for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Classifies errors a transaction retry can recover from.
pub trait Transient {
    /// Returns true if retrying the whole transaction may succeed.
    fn is_transient(&self) -> bool;
}

impl Transient for PersistenceError {
    fn is_transient(&self) -> bool {
        match self {
            PersistenceError::Database(err) => is_transient_database_error(err),
            PersistenceError::Backend(message) => mentions_lock_failure(message),
            _ => false,
        }
    }
}

/// Returns true for deadlocks and lock timeouts reported by the driver.
pub fn is_transient_database_error(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err
        && let Some(code) = db_err.code()
        && TRANSIENT_SQLSTATES.contains(&code.as_ref())
    {
        return true;
    }
    mentions_lock_failure(&err.to_string())
}

fn mentions_lock_failure(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("deadlock") || message.contains("lock timeout")
}
