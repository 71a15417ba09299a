//! Order application service.

use event_store::{EventLog, EventStore};
use persistence::{TransactionScope, TransactionService};

use super::{ChangeOrderStatus, CreateOrder, Order, OrderEvent, OrderId, OrderStatus};
use crate::error::OrderError;
use crate::publisher::EventPublisher;
use crate::repository::OrderRepository;

/// Command handlers for orders.
///
/// Every command saves the order, appends its events to the event store and
/// publishes them in one transaction, so either all three writes happen or
/// none do.
pub struct OrderService<T, R, S, P> {
    transactions: TransactionService<T>,
    repository: R,
    events: EventLog<S, OrderEvent>,
    publisher: P,
}

impl<T, R, S, P> OrderService<T, R, S, P>
where
    T: TransactionScope,
    R: OrderRepository,
    S: EventStore,
    P: EventPublisher,
{
    pub fn new(
        transactions: TransactionService<T>,
        repository: R,
        events: EventLog<S, OrderEvent>,
        publisher: P,
    ) -> Self {
        Self {
            transactions,
            repository,
            events,
            publisher,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn events(&self) -> &EventLog<S, OrderEvent> {
        &self.events
    }

    /// Places a new order.
    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id))]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<Order, OrderError> {
        let mut order = Order::create(cmd.order_id, cmd.customer_id, cmd.items)?;
        self.persist(&mut order).await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            customer_id = %order.customer_id(),
            total = %order.total_amount(),
            "order created"
        );
        Ok(order)
    }

    /// Moves an existing order to another status.
    #[tracing::instrument(skip(self))]
    pub async fn change_status(&self, cmd: ChangeOrderStatus) -> Result<Order, OrderError> {
        let mut order = self.repository.find_by_id(cmd.order_id).await?;
        let previous = order.status();
        order.change_status(cmd.new_status)?;
        self.persist(&mut order).await?;

        metrics::counter!("order_status_changes_total", "status" => cmd.new_status.as_str())
            .increment(1);
        tracing::info!(%previous, current = %order.status(), "order status changed");
        Ok(order)
    }

    pub async fn mark_as_paid(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.change_status(ChangeOrderStatus::new(order_id, OrderStatus::Paid))
            .await
    }

    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.change_status(ChangeOrderStatus::new(order_id, OrderStatus::Cancelled))
            .await
    }

    /// Loads the current state of an order.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.repository.find_by_id(order_id).await
    }

    /// Returns the recorded events of an order, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn get_order_history(&self, order_id: OrderId) -> Result<Vec<OrderEvent>, OrderError> {
        let events = self.events.get_events_for_aggregate(order_id).await?;
        if events.is_empty() {
            return Err(OrderError::NotFound(order_id));
        }
        Ok(events)
    }

    async fn persist(&self, order: &mut Order) -> Result<(), OrderError> {
        let events = order.release_events();
        let (order, events) = (&*order, &events);

        self.transactions
            .execute(|| async move {
                self.repository.save(order).await?;
                for event in events {
                    self.events.append(event).await?;
                    self.publisher.publish(event).await?;
                }
                Ok::<_, OrderError>(())
            })
            .await
    }
}

impl<T, R, S, P> std::fmt::Debug for OrderService<T, R, S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderService").finish_non_exhaustive()
    }
}
