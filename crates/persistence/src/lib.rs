//! Persistence plumbing shared by the event store, the order repository and
//! the outbox.
//!
//! - [`TransactionService`] runs a unit of work inside its own transaction,
//!   joining the task's already open one instead of nesting.
//! - [`PgSession`] is the Postgres transaction scope; repositories route their
//!   statements through it so they take part in the open transaction.
//! - [`InMemoryTransactionScope`] and [`Journal`] give the in-memory adapters
//!   real rollback semantics for tests.

pub mod error;
pub mod journal;
pub mod session;
pub mod transaction;
pub mod unit_of_work;

pub use error::{PersistenceError, Result, Transient, is_transient_database_error};
pub use journal::{InMemoryTransaction, InMemoryTransactionScope, Journal, Journaled};
pub use session::{PgSession, PgTransaction, connect, run_migrations};
pub use transaction::{TransactionScope, TransactionService};
pub use unit_of_work::ScopeId;
