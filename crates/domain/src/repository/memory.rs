use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use persistence::{InMemoryTransactionScope, Journal, PersistenceError};

use super::OrderRepository;
use crate::error::OrderError;
use crate::order::{Order, OrderId};

/// In-memory order repository for tests and local runs.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<Journal<HashMap<OrderId, Order>>>,
    fail_on_save: Arc<AtomicBool>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository whose writes join transactions on `scope`.
    pub fn with_scope(scope: &InMemoryTransactionScope) -> Self {
        let repository = Self::new();
        scope.enlist(repository.orders.clone());
        repository
    }

    /// Makes every following `save` fail until switched off again.
    pub fn set_fail_on_save(&self, fail: bool) {
        self.fail_on_save.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

impl std::fmt::Debug for InMemoryOrderRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryOrderRepository")
            .field("fail_on_save", &self.fail_on_save.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save(&self, order: &Order) -> Result<(), OrderError> {
        if self.fail_on_save.load(Ordering::SeqCst) {
            return Err(PersistenceError::Backend("injected save failure".into()).into());
        }

        let mut stored = order.clone();
        stored.release_events();
        self.orders.write().await.insert(order.id(), stored);
        Ok(())
    }

    async fn find_by_id(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.orders
            .read()
            .await
            .get(&order_id)
            .cloned()
            .ok_or(OrderError::NotFound(order_id))
    }

    async fn exists(&self, order_id: OrderId) -> Result<bool, OrderError> {
        Ok(self.orders.read().await.contains_key(&order_id))
    }
}
