//! Order domain events.
//!
//! Events travel as flat JSON maps: into the event store, into outbox
//! payloads, and back. Every map carries `event_id`, `aggregate_id`,
//! `occurred_at`, `version` and `event_name`, plus the keys of its type.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use event_store::{AggregateId, BoxError, EventId, EventRegistry, PersistableEvent, Version};
use serde_json::{Map, Value, json};
use thiserror::Error;
use uuid::Uuid;

use super::{CustomerId, OrderId, OrderItem, OrderStatus};
use crate::money::Money;

/// Aggregate type recorded with every order event.
pub const ORDER_AGGREGATE_TYPE: &str = "Order";

/// A map could not be turned back into an event.
#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Expected a {expected} map, got {found}")]
    UnexpectedEventName {
        expected: &'static str,
        found: String,
    },
}

impl EventDecodeError {
    fn invalid(field: &'static str, reason: impl ToString) -> Self {
        Self::InvalidField {
            field,
            reason: reason.to_string(),
        }
    }
}

/// Current time truncated to what the event map can carry.
pub(crate) fn event_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// The order was placed.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderCreated {
    pub event_id: EventId,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub total_amount: Money,
    pub items: Vec<OrderItem>,
    pub occurred_at: DateTime<Utc>,
    pub version: Version,
}

impl OrderCreated {
    pub const EVENT_TYPE: &'static str = "OrderCreatedEvent";

    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = common_fields(
            self.event_id,
            self.order_id,
            self.occurred_at,
            self.version,
            Self::EVENT_TYPE,
        );
        map.insert("order_id".into(), Value::from(self.order_id.to_string()));
        map.insert(
            "customer_id".into(),
            Value::from(self.customer_id.to_string()),
        );
        map.insert("total_amount".into(), money_value(&self.total_amount));
        map.insert(
            "items".into(),
            Value::Array(self.items.iter().map(item_value).collect()),
        );
        map
    }

    pub fn from_map(map: &Map<String, Value>) -> Result<Self, EventDecodeError> {
        let reader = MapReader::new(map, Self::EVENT_TYPE)?;
        let items: Vec<OrderItem> = serde_json::from_value(reader.value("items")?.clone())
            .map_err(|e| EventDecodeError::invalid("items", e))?;

        Ok(Self {
            event_id: EventId::from_uuid(reader.uuid("event_id")?),
            order_id: AggregateId::from_uuid(reader.uuid("order_id")?),
            customer_id: CustomerId::from_uuid(reader.uuid("customer_id")?),
            total_amount: reader.money("total_amount")?,
            items,
            occurred_at: reader.timestamp("occurred_at")?,
            version: reader.version()?,
        })
    }
}

/// The order moved from one status to another.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatusChanged {
    pub event_id: EventId,
    pub order_id: OrderId,
    pub previous_status: OrderStatus,
    pub new_status: OrderStatus,
    pub occurred_at: DateTime<Utc>,
    pub version: Version,
}

impl OrderStatusChanged {
    pub const EVENT_TYPE: &'static str = "OrderStatusChangedEvent";

    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = common_fields(
            self.event_id,
            self.order_id,
            self.occurred_at,
            self.version,
            Self::EVENT_TYPE,
        );
        map.insert("order_id".into(), Value::from(self.order_id.to_string()));
        map.insert(
            "previous_status".into(),
            Value::from(self.previous_status.as_str()),
        );
        map.insert("new_status".into(), Value::from(self.new_status.as_str()));
        map
    }

    pub fn from_map(map: &Map<String, Value>) -> Result<Self, EventDecodeError> {
        let reader = MapReader::new(map, Self::EVENT_TYPE)?;

        Ok(Self {
            event_id: EventId::from_uuid(reader.uuid("event_id")?),
            order_id: AggregateId::from_uuid(reader.uuid("order_id")?),
            previous_status: reader.status("previous_status")?,
            new_status: reader.status("new_status")?,
            occurred_at: reader.timestamp("occurred_at")?,
            version: reader.version()?,
        })
    }
}

/// Events raised by the order aggregate.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderEvent {
    Created(OrderCreated),
    StatusChanged(OrderStatusChanged),
}

impl OrderEvent {
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::Created(e) => e.order_id,
            OrderEvent::StatusChanged(e) => e.order_id,
        }
    }

    pub fn to_map(&self) -> Map<String, Value> {
        match self {
            OrderEvent::Created(e) => e.to_map(),
            OrderEvent::StatusChanged(e) => e.to_map(),
        }
    }
}

impl From<OrderCreated> for OrderEvent {
    fn from(event: OrderCreated) -> Self {
        OrderEvent::Created(event)
    }
}

impl From<OrderStatusChanged> for OrderEvent {
    fn from(event: OrderStatusChanged) -> Self {
        OrderEvent::StatusChanged(event)
    }
}

impl PersistableEvent for OrderEvent {
    fn event_id(&self) -> EventId {
        match self {
            OrderEvent::Created(e) => e.event_id,
            OrderEvent::StatusChanged(e) => e.event_id,
        }
    }

    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => OrderCreated::EVENT_TYPE,
            OrderEvent::StatusChanged(_) => OrderStatusChanged::EVENT_TYPE,
        }
    }

    fn aggregate_id(&self) -> AggregateId {
        self.order_id()
    }

    fn aggregate_type(&self) -> &'static str {
        ORDER_AGGREGATE_TYPE
    }

    fn version(&self) -> Version {
        match self {
            OrderEvent::Created(e) => e.version,
            OrderEvent::StatusChanged(e) => e.version,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::Created(e) => e.occurred_at,
            OrderEvent::StatusChanged(e) => e.occurred_at,
        }
    }

    fn to_map(&self) -> Map<String, Value> {
        OrderEvent::to_map(self)
    }
}

/// Registry of every order event tag, built once at startup.
pub fn order_event_registry() -> EventRegistry<OrderEvent> {
    EventRegistry::new()
        .register(OrderCreated::EVENT_TYPE, decode_created)
        .register(OrderStatusChanged::EVENT_TYPE, decode_status_changed)
}

fn decode_created(map: &Map<String, Value>) -> Result<OrderEvent, BoxError> {
    Ok(OrderCreated::from_map(map)?.into())
}

fn decode_status_changed(map: &Map<String, Value>) -> Result<OrderEvent, BoxError> {
    Ok(OrderStatusChanged::from_map(map)?.into())
}

fn common_fields(
    event_id: EventId,
    aggregate_id: AggregateId,
    occurred_at: DateTime<Utc>,
    version: Version,
    event_name: &'static str,
) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("event_id".into(), Value::from(event_id.to_string()));
    map.insert("aggregate_id".into(), Value::from(aggregate_id.to_string()));
    map.insert(
        "occurred_at".into(),
        Value::from(occurred_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
    );
    map.insert("version".into(), Value::from(version.as_i64()));
    map.insert("event_name".into(), Value::from(event_name));
    map
}

fn money_value(money: &Money) -> Value {
    json!({ "amount": money.amount(), "currency": money.currency() })
}

fn item_value(item: &OrderItem) -> Value {
    json!({
        "product_id": item.product_id().as_str(),
        "quantity": item.quantity(),
        "price": money_value(&item.price()),
    })
}

struct MapReader<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> MapReader<'a> {
    fn new(map: &'a Map<String, Value>, expected: &'static str) -> Result<Self, EventDecodeError> {
        if let Some(name) = map.get("event_name").and_then(Value::as_str)
            && name != expected
        {
            return Err(EventDecodeError::UnexpectedEventName {
                expected,
                found: name.to_owned(),
            });
        }
        Ok(Self { map })
    }

    fn value(&self, field: &'static str) -> Result<&'a Value, EventDecodeError> {
        self.map
            .get(field)
            .ok_or(EventDecodeError::MissingField(field))
    }

    fn str(&self, field: &'static str) -> Result<&'a str, EventDecodeError> {
        self.value(field)?
            .as_str()
            .ok_or_else(|| EventDecodeError::invalid(field, "expected a string"))
    }

    fn uuid(&self, field: &'static str) -> Result<Uuid, EventDecodeError> {
        Uuid::parse_str(self.str(field)?).map_err(|e| EventDecodeError::invalid(field, e))
    }

    fn timestamp(&self, field: &'static str) -> Result<DateTime<Utc>, EventDecodeError> {
        DateTime::parse_from_rfc3339(self.str(field)?)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| EventDecodeError::invalid(field, e))
    }

    fn version(&self) -> Result<Version, EventDecodeError> {
        self.value("version")?
            .as_i64()
            .map(Version::new)
            .ok_or_else(|| EventDecodeError::invalid("version", "expected an integer"))
    }

    fn money(&self, field: &'static str) -> Result<Money, EventDecodeError> {
        serde_json::from_value(self.value(field)?.clone())
            .map_err(|e| EventDecodeError::invalid(field, e))
    }

    fn status(&self, field: &'static str) -> Result<OrderStatus, EventDecodeError> {
        self.str(field)?
            .parse()
            .map_err(|e| EventDecodeError::invalid(field, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::ProductId;

    fn item(sku: &str, quantity: u32, cents: i64) -> OrderItem {
        OrderItem::new(
            ProductId::new(sku).unwrap(),
            quantity,
            Money::new(cents, "USD").unwrap(),
        )
        .unwrap()
    }

    fn created() -> OrderCreated {
        OrderCreated {
            event_id: EventId::new(),
            order_id: AggregateId::new(),
            customer_id: CustomerId::new(),
            total_amount: Money::new(2598, "USD").unwrap(),
            items: vec![item("SKU-1", 2, 999), item("SKU-2", 1, 600)],
            occurred_at: event_timestamp(),
            version: Version::first(),
        }
    }

    fn status_changed() -> OrderStatusChanged {
        OrderStatusChanged {
            event_id: EventId::new(),
            order_id: AggregateId::new(),
            previous_status: OrderStatus::Created,
            new_status: OrderStatus::Paid,
            occurred_at: event_timestamp(),
            version: Version::new(2),
        }
    }

    #[test]
    fn test_created_map_round_trip_is_stable() {
        let event = created();
        let map = event.to_map();
        let decoded = OrderCreated::from_map(&map).unwrap();

        assert_eq!(decoded.to_map(), map);
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_status_changed_map_round_trip_is_stable() {
        let event = status_changed();
        let map = event.to_map();
        let decoded = OrderStatusChanged::from_map(&map).unwrap();

        assert_eq!(decoded.to_map(), map);
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_map_layout() {
        let event = created();
        let map = event.to_map();

        assert_eq!(map["event_name"], "OrderCreatedEvent");
        assert_eq!(map["aggregate_id"], map["order_id"]);
        assert_eq!(map["version"], 1);
        assert_eq!(
            map["total_amount"],
            json!({"amount": 2598, "currency": "USD"})
        );
        assert_eq!(
            map["items"][0],
            json!({"product_id": "SKU-1", "quantity": 2, "price": {"amount": 999, "currency": "USD"}})
        );
        let occurred_at = map["occurred_at"].as_str().unwrap();
        assert!(occurred_at.ends_with('Z'));
    }

    #[test]
    fn test_missing_field_is_reported() {
        let mut map = status_changed().to_map();
        map.remove("new_status");

        assert!(matches!(
            OrderStatusChanged::from_map(&map),
            Err(EventDecodeError::MissingField("new_status"))
        ));
    }

    #[test]
    fn test_bad_values_are_reported() {
        let mut map = status_changed().to_map();
        map.insert("new_status".into(), Value::from("shipped"));
        assert!(matches!(
            OrderStatusChanged::from_map(&map),
            Err(EventDecodeError::InvalidField { field: "new_status", .. })
        ));

        let mut map = created().to_map();
        map.insert("occurred_at".into(), Value::from("yesterday"));
        assert!(matches!(
            OrderCreated::from_map(&map),
            Err(EventDecodeError::InvalidField { field: "occurred_at", .. })
        ));

        let mut map = created().to_map();
        map.insert("total_amount".into(), json!({"amount": 1, "currency": "DOLLARS"}));
        assert!(OrderCreated::from_map(&map).is_err());
    }

    #[test]
    fn test_wrong_event_name_is_rejected() {
        let map = status_changed().to_map();
        assert!(matches!(
            OrderCreated::from_map(&map),
            Err(EventDecodeError::UnexpectedEventName { .. })
        ));
    }

    #[test]
    fn test_registry_knows_both_tags() {
        let registry = order_event_registry();
        assert!(registry.contains("OrderCreatedEvent"));
        assert!(registry.contains("OrderStatusChangedEvent"));
        assert!(!registry.contains("OrderShippedEvent"));
    }

    #[test]
    fn test_persistable_fields_follow_variant() {
        let inner = status_changed();
        let event = OrderEvent::from(inner.clone());

        assert_eq!(event.event_type(), "OrderStatusChangedEvent");
        assert_eq!(event.aggregate_type(), "Order");
        assert_eq!(event.aggregate_id(), inner.order_id);
        assert_eq!(PersistableEvent::version(&event), Version::new(2));
        assert_eq!(PersistableEvent::to_map(&event), inner.to_map());
    }
}
