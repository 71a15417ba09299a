//! Outbox rows.

use chrono::{DateTime, SubsecRound, Utc};
use common::AggregateId;
use event_store::{EventId, PersistableEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A domain event waiting in the outbox table to be relayed to the broker.
///
/// Rows are written pending inside the business transaction. The relay marks
/// them processed after a successful publish, or bumps `retry_count` and keeps
/// the error otherwise. Rows are never deleted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub event_id: EventId,

    /// Stable tag of the event, e.g. `OrderCreatedEvent`.
    pub event_type: String,

    pub aggregate_id: AggregateId,

    /// The event's flat map serialized as JSON.
    pub payload: String,

    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub is_processed: bool,
    pub retry_count: i32,

    /// Error of the last failed publish attempt.
    pub error: Option<String>,
}

impl OutboxEvent {
    /// Creates a pending row.
    pub fn new(
        event_id: EventId,
        event_type: impl Into<String>,
        aggregate_id: AggregateId,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            event_type: event_type.into(),
            aggregate_id,
            payload: payload.into(),
            created_at: Utc::now().trunc_subsecs(6),
            processed_at: None,
            is_processed: false,
            retry_count: 0,
            error: None,
        }
    }

    /// Creates a pending row carrying a domain event.
    pub fn from_event(event: &dyn PersistableEvent) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_string(&Value::Object(event.to_map()))?;
        Ok(Self::new(
            event.event_id(),
            event.event_type(),
            event.aggregate_id(),
            payload,
        ))
    }

    pub fn mark_as_processed(&mut self) {
        self.is_processed = true;
        self.processed_at = Some(Utc::now().trunc_subsecs(6));
    }

    /// Records a failed publish attempt. The row stays pending.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.retry_count += 1;
        self.error = Some(error.into());
    }

    /// Broker routing key for this row within `domain`.
    pub fn routing_key(&self, domain: &str) -> String {
        routing_key(domain, &self.event_type)
    }
}

/// Builds `<domain>.<snake_case tag>`, dropping a trailing `Event` from the
/// tag: `OrderStatusChangedEvent` becomes `order.order_status_changed`.
pub fn routing_key(domain: &str, event_type: &str) -> String {
    let name = match event_type.strip_suffix("Event") {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => event_type,
    };

    let mut key = String::with_capacity(domain.len() + name.len() + 8);
    key.push_str(domain);
    key.push('.');
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                key.push('_');
            }
            key.push(ch.to_ascii_lowercase());
        } else {
            key.push(ch);
        }
    }
    key
}
