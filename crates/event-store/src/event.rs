use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{AggregateId, EventStoreError, Result};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EventId> for Uuid {
    fn from(id: EventId) -> Self {
        id.0
    }
}

/// Sequence number of an event within its aggregate.
///
/// The first event of an aggregate has version 1 and every later event
/// increments it by one, so `(aggregate_id, version)` identifies an event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Version of an aggregate that has no events yet.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Version carried by the first event of an aggregate.
    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// A domain event that can be written to the event store.
///
/// `to_map` must produce a flat map that the decoder registered for
/// `event_type` turns back into an equal event.
pub trait PersistableEvent: Send + Sync {
    fn event_id(&self) -> EventId;

    /// Stable tag identifying the event type in storage and routing.
    fn event_type(&self) -> &'static str;

    fn aggregate_id(&self) -> AggregateId;

    fn aggregate_type(&self) -> &'static str;

    fn version(&self) -> Version;

    fn occurred_at(&self) -> DateTime<Utc>;

    fn to_map(&self) -> Map<String, Value>;
}

/// A single row of the event store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: EventId,

    /// Stable tag of the event, e.g. `OrderCreatedEvent`.
    pub event_type: String,

    pub aggregate_id: AggregateId,

    /// The type of aggregate, e.g. `Order`.
    pub aggregate_type: String,

    /// The version of the aggregate after this event.
    pub version: Version,

    /// When the event happened in the domain.
    pub occurred_at: DateTime<Utc>,

    /// When the event was written to the store.
    pub recorded_at: DateTime<Utc>,

    /// The flat event map produced by [`PersistableEvent::to_map`].
    pub payload: Map<String, Value>,

    pub metadata: Map<String, Value>,
}

impl StoredEvent {
    pub fn builder() -> StoredEventBuilder {
        StoredEventBuilder::default()
    }

    /// Builds the record for a domain event.
    pub fn from_event<E: PersistableEvent + ?Sized>(event: &E) -> Self {
        let mut metadata = Map::new();
        metadata.insert("event_name".into(), Value::from(event.event_type()));
        metadata.insert("schema_version".into(), Value::from(1));

        Self {
            event_id: event.event_id(),
            event_type: event.event_type().to_owned(),
            aggregate_id: event.aggregate_id(),
            aggregate_type: event.aggregate_type().to_owned(),
            version: event.version(),
            occurred_at: event.occurred_at(),
            recorded_at: Utc::now(),
            payload: event.to_map(),
            metadata,
        }
    }
}

/// Builder for stored events, mostly useful in tests and tooling.
#[derive(Debug, Default)]
pub struct StoredEventBuilder {
    event_id: Option<EventId>,
    event_type: Option<String>,
    aggregate_id: Option<AggregateId>,
    aggregate_type: Option<String>,
    version: Option<Version>,
    occurred_at: Option<DateTime<Utc>>,
    payload: Map<String, Value>,
    metadata: Map<String, Value>,
}

impl StoredEventBuilder {
    /// Sets the event ID. If not set, a new ID will be generated.
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Sets the occurrence time. If not set, the current time will be used.
    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    pub fn payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Builds the record, failing if the type, aggregate or version is unset.
    pub fn build(self) -> Result<StoredEvent> {
        Ok(StoredEvent {
            event_id: self.event_id.unwrap_or_default(),
            event_type: self
                .event_type
                .ok_or(EventStoreError::IncompleteRecord("event_type"))?,
            aggregate_id: self
                .aggregate_id
                .ok_or(EventStoreError::IncompleteRecord("aggregate_id"))?,
            aggregate_type: self
                .aggregate_type
                .ok_or(EventStoreError::IncompleteRecord("aggregate_type"))?,
            version: self
                .version
                .ok_or(EventStoreError::IncompleteRecord("version"))?,
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            recorded_at: Utc::now(),
            payload: self.payload,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_new_creates_unique_ids() {
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn version_ordering() {
        let v1 = Version::new(1);
        let v2 = Version::new(2);
        assert!(v1 < v2);
        assert_eq!(v1.next(), v2);
        assert_eq!(Version::initial().next(), Version::first());
    }

    #[test]
    fn builder_fills_defaults() {
        let aggregate_id = AggregateId::new();
        let mut payload = Map::new();
        payload.insert("item".into(), Value::from("test"));

        let event = StoredEvent::builder()
            .event_type("TestEvent")
            .aggregate_id(aggregate_id)
            .aggregate_type("TestAggregate")
            .version(Version::first())
            .payload(payload.clone())
            .metadata("correlation_id", Value::from("123"))
            .build()
            .unwrap();

        assert_eq!(event.event_type, "TestEvent");
        assert_eq!(event.aggregate_id, aggregate_id);
        assert_eq!(event.version, Version::first());
        assert_eq!(event.payload, payload);
        assert_eq!(event.metadata.get("correlation_id"), Some(&Value::from("123")));
        assert!(event.recorded_at >= event.occurred_at);
    }

    #[test]
    fn builder_reports_missing_fields() {
        let result = StoredEvent::builder().event_type("TestEvent").build();
        assert!(matches!(
            result,
            Err(EventStoreError::IncompleteRecord("aggregate_id"))
        ));
    }
}
