//! Write side of the order context.
//!
//! This crate provides:
//! - `Money` and the order value objects
//! - the `Order` aggregate with its status state machine and domain events
//! - the write repository port with in-memory and PostgreSQL adapters
//! - the event publisher port the outbox plugs into
//! - `OrderService`, which runs each command as one atomic unit

pub mod error;
pub mod money;
pub mod order;
pub mod publisher;
pub mod repository;

pub use error::{ErrorClass, OrderError, ValidationError};
pub use money::{Currency, Money};
pub use order::{
    ChangeOrderStatus, CreateOrder, CustomerId, EventDecodeError, ORDER_AGGREGATE_TYPE, Order,
    OrderCreated, OrderEvent, OrderId, OrderItem, OrderService, OrderStatus, OrderStatusChanged,
    ProductId, order_event_registry,
};
pub use publisher::EventPublisher;
pub use repository::{InMemoryOrderRepository, OrderRepository, PostgresOrderRepository};
