//! Write-side persistence of order state.

mod memory;
mod postgres;

pub use memory::InMemoryOrderRepository;
pub use postgres::PostgresOrderRepository;

use async_trait::async_trait;

use crate::error::OrderError;
use crate::order::{Order, OrderId};

/// Stores the current state of orders.
///
/// Implementations write through the active transaction scope, so a save
/// made inside `TransactionService::execute` rolls back with it.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts or replaces the order.
    async fn save(&self, order: &Order) -> Result<(), OrderError>;

    /// Loads an order, failing with [`OrderError::NotFound`] if it is absent.
    async fn find_by_id(&self, order_id: OrderId) -> Result<Order, OrderError>;

    async fn exists(&self, order_id: OrderId) -> Result<bool, OrderError>;
}
