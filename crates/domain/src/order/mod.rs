//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;
mod state;
mod value_objects;

pub use aggregate::Order;
pub use commands::{ChangeOrderStatus, CreateOrder};
pub use events::{
    EventDecodeError, ORDER_AGGREGATE_TYPE, OrderCreated, OrderEvent, OrderStatusChanged,
    order_event_registry,
};
pub use service::OrderService;
pub use state::OrderStatus;
pub use value_objects::{CustomerId, OrderId, OrderItem, ProductId};
