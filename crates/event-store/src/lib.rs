pub mod error;
pub mod event;
pub mod log;
pub mod memory;
pub mod postgres;
pub mod registry;
pub mod store;

pub use common::AggregateId;
pub use error::{BoxError, EventStoreError, Result};
pub use event::{EventId, PersistableEvent, StoredEvent, StoredEventBuilder, Version};
pub use log::EventLog;
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use registry::{Decoder, EventRegistry};
pub use store::{EventStore, EventStoreExt};
