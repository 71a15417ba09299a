use async_trait::async_trait;
use event_store::Version;
use persistence::{PersistenceError, PgSession};
use serde_json::Value;
use sqlx::{Row, postgres::PgRow};
use uuid::Uuid;

use super::OrderRepository;
use crate::error::OrderError;
use crate::order::{CustomerId, Order, OrderId, OrderItem, OrderStatus};

const TABLE: &str = "orders";

/// PostgreSQL-backed order repository.
///
/// One row per order; items are kept as a JSONB array of item snapshots.
#[derive(Clone, Debug)]
pub struct PostgresOrderRepository {
    session: PgSession,
}

impl PostgresOrderRepository {
    pub fn new(session: PgSession) -> Self {
        Self { session }
    }

    fn row_to_order(row: PgRow) -> Result<Order, PersistenceError> {
        let status: String = row.try_get("status")?;
        let status: OrderStatus = status
            .parse()
            .map_err(|err| PersistenceError::corrupted(TABLE, format!("{err}")))?;
        let items: Vec<OrderItem> = serde_json::from_value(row.try_get::<Value, _>("items")?)
            .map_err(|err| PersistenceError::corrupted(TABLE, format!("items: {err}")))?;

        Order::reconstruct(
            OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            status,
            items,
            row.try_get("created_at")?,
            row.try_get("updated_at")?,
            Version::new(row.try_get("version")?),
        )
        .map_err(|err| PersistenceError::corrupted(TABLE, format!("{err}")))
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn save(&self, order: &Order) -> Result<(), OrderError> {
        let items = serde_json::to_value(order.items()).map_err(PersistenceError::from)?;
        let total = order.total_amount();

        let query = sqlx::query(
            r#"
            INSERT INTO orders
                (id, customer_id, status, total_amount, currency, items, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                total_amount = EXCLUDED.total_amount,
                currency = EXCLUDED.currency,
                items = EXCLUDED.items,
                updated_at = EXCLUDED.updated_at,
                version = EXCLUDED.version
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.customer_id().as_uuid())
        .bind(order.status().as_str())
        .bind(total.amount())
        .bind(total.currency().to_owned())
        .bind(items)
        .bind(order.created_at())
        .bind(order.updated_at())
        .bind(order.version().as_i64());

        self.session.execute(query).await?;
        tracing::debug!(order_id = %order.id(), status = %order.status(), "order saved");
        Ok(())
    }

    async fn find_by_id(&self, order_id: OrderId) -> Result<Order, OrderError> {
        let row = self
            .session
            .fetch_optional(
                sqlx::query(
                    "SELECT id, customer_id, status, items, created_at, updated_at, version \
                     FROM orders WHERE id = $1",
                )
                .bind(order_id.as_uuid()),
            )
            .await?;

        match row {
            Some(row) => Ok(Self::row_to_order(row)?),
            None => Err(OrderError::NotFound(order_id)),
        }
    }

    async fn exists(&self, order_id: OrderId) -> Result<bool, OrderError> {
        let row = self
            .session
            .fetch_one(
                sqlx::query("SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1) AS found")
                    .bind(order_id.as_uuid()),
            )
            .await?;
        let found: bool = row.try_get("found").map_err(PersistenceError::from)?;
        Ok(found)
    }
}
