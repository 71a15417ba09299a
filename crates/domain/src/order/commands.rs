//! Order commands.

use super::{CustomerId, OrderId, OrderItem, OrderStatus};

/// Command to place a new order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    /// The order ID to create.
    pub order_id: OrderId,

    /// The customer placing the order.
    pub customer_id: CustomerId,

    /// Validated items; must not be empty.
    pub items: Vec<OrderItem>,
}

impl CreateOrder {
    pub fn new(order_id: OrderId, customer_id: CustomerId, items: Vec<OrderItem>) -> Self {
        Self {
            order_id,
            customer_id,
            items,
        }
    }

    /// Creates the command with a generated order ID.
    pub fn for_customer(customer_id: CustomerId, items: Vec<OrderItem>) -> Self {
        Self::new(OrderId::new(), customer_id, items)
    }
}

/// Command to move an order to another status.
#[derive(Debug, Clone, Copy)]
pub struct ChangeOrderStatus {
    pub order_id: OrderId,
    pub new_status: OrderStatus,
}

impl ChangeOrderStatus {
    pub fn new(order_id: OrderId, new_status: OrderStatus) -> Self {
        Self {
            order_id,
            new_status,
        }
    }
}
