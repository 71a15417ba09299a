//! Typed access to an event store.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::{AggregateId, EventRegistry, EventStore, PersistableEvent, Result, StoredEvent};

/// Wraps an [`EventStore`] with a registry so callers read and write typed
/// events instead of raw records.
pub struct EventLog<S, E> {
    store: S,
    registry: Arc<EventRegistry<E>>,
    _event: PhantomData<fn() -> E>,
}

impl<S, E> EventLog<S, E>
where
    S: EventStore,
    E: PersistableEvent,
{
    pub fn new(store: S, registry: Arc<EventRegistry<E>>) -> Self {
        Self {
            store,
            registry,
            _event: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &EventRegistry<E> {
        &self.registry
    }

    /// Serializes and appends one event.
    pub async fn append(&self, event: &E) -> Result<()> {
        let record = StoredEvent::from_event(event);
        tracing::debug!(
            event_id = %record.event_id,
            event_type = %record.event_type,
            aggregate_id = %record.aggregate_id,
            version = %record.version,
            "appending event"
        );
        self.store.append(record).await?;
        metrics::counter!("event_store_events_appended_total", "event_type" => event.event_type())
            .increment(1);
        Ok(())
    }

    pub async fn get_events_for_aggregate(&self, aggregate_id: AggregateId) -> Result<Vec<E>> {
        let records = self.store.get_events_for_aggregate(aggregate_id).await?;
        self.decode_all(&records)
    }

    pub async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<E>> {
        let records = self.store.get_events_by_type(event_type).await?;
        self.decode_all(&records)
    }

    fn decode_all(&self, records: &[StoredEvent]) -> Result<Vec<E>> {
        records
            .iter()
            .map(|record| self.registry.decode(record))
            .collect()
    }
}

impl<S: Clone, E> Clone for EventLog<S, E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            registry: Arc::clone(&self.registry),
            _event: PhantomData,
        }
    }
}

impl<S, E> std::fmt::Debug for EventLog<S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use serde_json::{Map, Value};

    use super::*;
    use crate::{BoxError, EventId, EventStoreError, InMemoryEventStore, Version};

    #[derive(Debug, Clone, PartialEq)]
    struct Counted {
        event_id: EventId,
        counter_id: AggregateId,
        version: Version,
        occurred_at: DateTime<Utc>,
        value: i64,
    }

    impl PersistableEvent for Counted {
        fn event_id(&self) -> EventId {
            self.event_id
        }

        fn event_type(&self) -> &'static str {
            "CountedEvent"
        }

        fn aggregate_id(&self) -> AggregateId {
            self.counter_id
        }

        fn aggregate_type(&self) -> &'static str {
            "Counter"
        }

        fn version(&self) -> Version {
            self.version
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.occurred_at
        }

        fn to_map(&self) -> Map<String, Value> {
            let mut map = Map::new();
            map.insert("event_id".into(), Value::from(self.event_id.to_string()));
            map.insert("counter_id".into(), Value::from(self.counter_id.to_string()));
            map.insert("version".into(), Value::from(self.version.as_i64()));
            map.insert("occurred_at".into(), Value::from(self.occurred_at.to_rfc3339()));
            map.insert("value".into(), Value::from(self.value));
            map
        }
    }

    fn decode_counted(map: &Map<String, Value>) -> std::result::Result<Counted, BoxError> {
        let text = |key: &str| {
            map.get(key)
                .and_then(Value::as_str)
                .ok_or_else(|| format!("missing {key}"))
        };
        let number = |key: &str| {
            map.get(key)
                .and_then(Value::as_i64)
                .ok_or_else(|| format!("missing {key}"))
        };
        Ok(Counted {
            event_id: text("event_id")?.parse()?,
            counter_id: text("counter_id")?.parse()?,
            version: Version::new(number("version")?),
            occurred_at: DateTime::parse_from_rfc3339(text("occurred_at")?)?.with_timezone(&Utc),
            value: number("value")?,
        })
    }

    fn counted(counter_id: AggregateId, version: i64, occurred_at: DateTime<Utc>) -> Counted {
        Counted {
            event_id: EventId::new(),
            counter_id,
            version: Version::new(version),
            occurred_at,
            value: version * 10,
        }
    }

    fn log() -> EventLog<InMemoryEventStore, Counted> {
        let registry = EventRegistry::<Counted>::new().register("CountedEvent", decode_counted);
        EventLog::new(InMemoryEventStore::new(), Arc::new(registry))
    }

    #[tokio::test]
    async fn typed_round_trip() {
        let log = log();
        let id = AggregateId::new();
        let now = Utc::now();
        let first = counted(id, 1, now);
        let second = counted(id, 2, now + Duration::seconds(1));

        log.append(&second).await.unwrap();
        log.append(&first).await.unwrap();

        let events = log.get_events_for_aggregate(id).await.unwrap();
        assert_eq!(events, vec![first.clone(), second.clone()]);

        let by_type = log.get_events_by_type("CountedEvent").await.unwrap();
        assert_eq!(by_type.len(), 2);
    }

    #[tokio::test]
    async fn unregistered_records_fail_the_read() {
        let log = log();
        let id = AggregateId::new();
        log.append(&counted(id, 1, Utc::now())).await.unwrap();

        let stranger = StoredEvent::builder()
            .event_type("ResetEvent")
            .aggregate_id(id)
            .aggregate_type("Counter")
            .version(Version::new(2))
            .build()
            .unwrap();
        log.store().append(stranger).await.unwrap();

        let result = log.get_events_for_aggregate(id).await;
        assert!(matches!(result, Err(EventStoreError::UnknownEventType(_))));
    }
}
