//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use event_store::{EventId, Version};

use super::events::event_timestamp;
use super::{
    CustomerId, OrderCreated, OrderEvent, OrderId, OrderItem, OrderStatus, OrderStatusChanged,
};
use crate::error::{OrderError, ValidationError};
use crate::money::Money;

/// Order aggregate root.
///
/// Every state change records exactly one event and bumps the version; the
/// recorded events wait in a buffer until [`Order::release_events`] hands them
/// to the persistence layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    id: OrderId,
    customer_id: CustomerId,
    status: OrderStatus,
    items: Vec<OrderItem>,
    total_amount: Money,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    version: Version,
    pending_events: Vec<OrderEvent>,
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Sum of the item subtotals.
    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Number of recorded events not yet released.
    pub fn pending_events(&self) -> usize {
        self.pending_events.len()
    }
}

// Command methods
impl Order {
    /// Places a new order.
    ///
    /// Fails if `items` is empty or the items use more than one currency.
    pub fn create(
        order_id: OrderId,
        customer_id: CustomerId,
        items: Vec<OrderItem>,
    ) -> Result<Order, OrderError> {
        let created_at = event_timestamp();
        let mut order = Order::empty(order_id, customer_id, created_at, items.first())?;
        for item in items {
            order.add_item(item)?;
        }

        order.version = Version::first();
        order.record(OrderCreated {
            event_id: EventId::new(),
            order_id,
            customer_id,
            total_amount: order.total_amount,
            items: order.items.clone(),
            occurred_at: created_at,
            version: order.version,
        });
        Ok(order)
    }

    /// Attaches an item and recomputes the total. Records no event.
    pub(crate) fn add_item(&mut self, item: OrderItem) -> Result<(), ValidationError> {
        self.items.push(item);
        match self.calculate_total_amount() {
            Ok(total) => {
                self.total_amount = total;
                Ok(())
            }
            Err(err) => {
                self.items.pop();
                Err(err)
            }
        }
    }

    /// Moves the order to `new_status` if the state machine allows it.
    pub fn change_status(&mut self, new_status: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(new_status) {
            return Err(OrderError::InvalidStateTransition {
                order_id: self.id,
                current: self.status,
                target: new_status,
            });
        }

        let previous_status = self.status;
        let now = event_timestamp();
        self.status = new_status;
        self.updated_at = Some(now);
        self.version = self.version.next();
        self.record(OrderStatusChanged {
            event_id: EventId::new(),
            order_id: self.id,
            previous_status,
            new_status,
            occurred_at: now,
            version: self.version,
        });
        Ok(())
    }

    pub fn mark_as_paid(&mut self) -> Result<(), OrderError> {
        self.change_status(OrderStatus::Paid)
    }

    pub fn cancel(&mut self) -> Result<(), OrderError> {
        self.change_status(OrderStatus::Cancelled)
    }

    /// Sums the item subtotals.
    pub fn calculate_total_amount(&self) -> Result<Money, ValidationError> {
        let (first, rest) = self.items.split_first().ok_or(ValidationError::NoItems)?;
        let mut total = first.subtotal()?;
        for item in rest {
            if item.price().currency_code() != total.currency_code() {
                return Err(ValidationError::MixedCurrencies);
            }
            total = total.add(&item.subtotal()?)?;
        }
        Ok(total)
    }

    /// Drains the recorded events. A second call returns nothing.
    pub fn release_events(&mut self) -> Vec<OrderEvent> {
        std::mem::take(&mut self.pending_events)
    }

    fn record(&mut self, event: impl Into<OrderEvent>) {
        self.pending_events.push(event.into());
    }
}

// Rebuilding
impl Order {
    /// Rebuilds an order from persisted state without recording events.
    pub fn reconstruct(
        id: OrderId,
        customer_id: CustomerId,
        status: OrderStatus,
        items: Vec<OrderItem>,
        created_at: DateTime<Utc>,
        updated_at: Option<DateTime<Utc>>,
        version: Version,
    ) -> Result<Order, ValidationError> {
        let mut order = Order::empty(id, customer_id, created_at, items.first())?;
        for item in items {
            order.add_item(item)?;
        }
        order.status = status;
        order.updated_at = updated_at;
        order.version = version;
        Ok(order)
    }

    /// Replays an ordered event history.
    ///
    /// The first event must be `OrderCreated`. The result has no pending
    /// events and the version of the last event.
    pub fn from_history(
        events: impl IntoIterator<Item = OrderEvent>,
    ) -> Result<Order, OrderError> {
        let mut events = events.into_iter();
        let mut order = match events.next() {
            Some(OrderEvent::Created(created)) if created.version != Version::first() => {
                return Err(OrderError::InvalidHistory(format!(
                    "order {} history starts at version {}",
                    created.order_id, created.version
                )));
            }
            Some(OrderEvent::Created(created)) => Order::reconstruct(
                created.order_id,
                created.customer_id,
                OrderStatus::Created,
                created.items,
                created.occurred_at,
                None,
                created.version,
            )?,
            Some(other) => {
                return Err(OrderError::InvalidHistory(format!(
                    "order {} history starts with {:?} instead of a creation event",
                    other.order_id(),
                    other
                )));
            }
            None => return Err(OrderError::InvalidHistory("history is empty".into())),
        };

        for event in events {
            order.apply(event)?;
        }
        Ok(order)
    }

    fn apply(&mut self, event: OrderEvent) -> Result<(), OrderError> {
        match event {
            OrderEvent::Created(created) => Err(OrderError::InvalidHistory(format!(
                "order {} was created twice",
                created.order_id
            ))),
            OrderEvent::StatusChanged(changed) => {
                if changed.order_id != self.id || changed.previous_status != self.status {
                    return Err(OrderError::InvalidHistory(format!(
                        "status change {} does not follow order {} in status {}",
                        changed.event_id, self.id, self.status
                    )));
                }
                if changed.version != self.version.next() {
                    return Err(OrderError::InvalidHistory(format!(
                        "order {} expected version {} but got {}",
                        self.id,
                        self.version.next(),
                        changed.version
                    )));
                }
                self.status = changed.new_status;
                self.updated_at = Some(changed.occurred_at);
                self.version = changed.version;
                Ok(())
            }
        }
    }

    fn empty(
        id: OrderId,
        customer_id: CustomerId,
        created_at: DateTime<Utc>,
        first_item: Option<&OrderItem>,
    ) -> Result<Order, ValidationError> {
        let first_item = first_item.ok_or(ValidationError::NoItems)?;
        Ok(Order {
            id,
            customer_id,
            status: OrderStatus::Created,
            items: Vec::new(),
            total_amount: Money::with_currency(0, first_item.price().currency_code())?,
            created_at,
            updated_at: None,
            version: Version::initial(),
            pending_events: Vec::new(),
        })
    }
}
