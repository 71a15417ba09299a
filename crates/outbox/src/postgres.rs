use async_trait::async_trait;
use common::AggregateId;
use event_store::EventId;
use persistence::{PgSession, Result};
use sqlx::{Row, postgres::PgRow};
use uuid::Uuid;

use crate::event::OutboxEvent;
use crate::repository::OutboxRepository;

const SELECT_COLUMNS: &str = "SELECT id, event_id, event_type, aggregate_id, payload, created_at, \
     processed_at, is_processed, retry_count, error FROM outbox_events";

/// PostgreSQL-backed outbox (`outbox_events` table).
///
/// Inserts go through the shared [`PgSession`] so they commit with the
/// business transaction.
#[derive(Clone, Debug)]
pub struct PostgresOutboxRepository {
    session: PgSession,
}

impl PostgresOutboxRepository {
    pub fn new(session: PgSession) -> Self {
        Self { session }
    }

    fn row_to_event(row: PgRow) -> Result<OutboxEvent> {
        Ok(OutboxEvent {
            id: row.try_get("id")?,
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            processed_at: row.try_get("processed_at")?,
            is_processed: row.try_get("is_processed")?,
            retry_count: row.try_get("retry_count")?,
            error: row.try_get("error")?,
        })
    }
}

#[async_trait]
impl OutboxRepository for PostgresOutboxRepository {
    async fn save(&self, event: &OutboxEvent) -> Result<()> {
        let query = sqlx::query(
            r#"
            INSERT INTO outbox_events
                (id, event_id, event_type, aggregate_id, payload, created_at, processed_at, is_processed, retry_count, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.id)
        .bind(event.event_id.as_uuid())
        .bind(&event.event_type)
        .bind(event.aggregate_id.as_uuid())
        .bind(&event.payload)
        .bind(event.created_at)
        .bind(event.processed_at)
        .bind(event.is_processed)
        .bind(event.retry_count)
        .bind(&event.error);

        self.session.execute(query).await?;
        Ok(())
    }

    async fn update(&self, event: &OutboxEvent) -> Result<()> {
        let query = sqlx::query(
            "UPDATE outbox_events \
             SET processed_at = $2, is_processed = $3, retry_count = $4, error = $5 \
             WHERE id = $1",
        )
        .bind(event.id)
        .bind(event.processed_at)
        .bind(event.is_processed)
        .bind(event.retry_count)
        .bind(&event.error);

        self.session.execute(query).await?;
        Ok(())
    }

    async fn find_unprocessed(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        let sql =
            format!("{SELECT_COLUMNS} WHERE is_processed = FALSE ORDER BY created_at ASC LIMIT $1");
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .session
            .fetch_all(sqlx::query(&sql).bind(limit))
            .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OutboxEvent>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = $1");
        let row = self
            .session
            .fetch_optional(sqlx::query(&sql).bind(id))
            .await?;

        row.map(Self::row_to_event).transpose()
    }

    async fn count_unprocessed(&self) -> Result<u64> {
        let row = self
            .session
            .fetch_one(sqlx::query(
                "SELECT COUNT(*) AS pending FROM outbox_events WHERE is_processed = FALSE",
            ))
            .await?;
        let pending: i64 = row.try_get("pending")?;
        Ok(u64::try_from(pending).unwrap_or_default())
    }
}
