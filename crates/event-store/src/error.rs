use persistence::{PersistenceError, Transient};
use thiserror::Error;

use crate::{AggregateId, Version};

/// Boxed error carried by decoders and deserialization failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// An event with this aggregate id and version is already stored.
    #[error("Event version {version} already exists for aggregate {aggregate_id}")]
    DuplicateVersion {
        aggregate_id: AggregateId,
        version: Version,
    },

    /// A stored record carries a tag no decoder is registered for.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// A stored payload could not be decoded into its event type.
    #[error("Failed to deserialize {event_type}: {source}")]
    Deserialization {
        event_type: String,
        #[source]
        source: BoxError,
    },

    /// A record was built without one of its required fields.
    #[error("Stored event is missing {0}")]
    IncompleteRecord(&'static str),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The underlying storage failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl From<sqlx::Error> for EventStoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(PersistenceError::Database(err))
    }
}

impl Transient for EventStoreError {
    fn is_transient(&self) -> bool {
        matches!(self, EventStoreError::Persistence(err) if err.is_transient())
    }
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
