//! Transactional outbox for the order write side.
//!
//! Domain events are written to the `outbox_events` table in the same
//! transaction as the business change ([`OutboxPublisher`]). A relay
//! ([`OutboxProcessor`], looped by [`RelayRunner`]) later publishes pending
//! rows to a [`MessageBus`] under a named lock, giving at-least-once delivery.

pub mod bus;
pub mod error;
pub mod event;
pub mod lock;
pub mod memory;
pub mod postgres;
pub mod processor;
pub mod publisher;
pub mod repository;
pub mod runner;

#[cfg(feature = "kafka")]
pub use bus::KafkaMessageBus;
pub use bus::{
    CONTENT_TYPE_JSON, DeliveredMessage, InMemoryMessageBus, LoggingMessageBus, MessageBus,
    MessageMetadata,
};
pub use error::{LockError, OutboxError, PublishError, Result};
pub use event::{OutboxEvent, routing_key};
pub use lock::{InMemoryLockProvider, LockProvider, LockToken, PostgresLockProvider};
pub use memory::InMemoryOutboxRepository;
pub use postgres::PostgresOutboxRepository;
pub use processor::{DEFAULT_DOMAIN, LOCK_KEY, LOCK_TTL, OutboxProcessor};
pub use publisher::OutboxPublisher;
pub use repository::OutboxRepository;
pub use runner::{RelayRunner, RelaySummary};
