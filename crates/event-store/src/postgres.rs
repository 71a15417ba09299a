use async_trait::async_trait;
use persistence::{PersistenceError, PgSession};
use serde_json::{Map, Value};
use sqlx::{Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventId, EventStoreError, Result, StoredEvent, Version, store::EventStore,
};

const UNIQUE_AGGREGATE_VERSION: &str = "uq_event_store_aggregate_version";

const SELECT_COLUMNS: &str = "SELECT id, aggregate_id, aggregate_type, event_type, event_data, \
     event_metadata, version, occurred_at, recorded_at FROM event_store";

/// PostgreSQL-backed event store implementation.
///
/// Statements go through the shared [`PgSession`], so an append made inside
/// an open transaction commits or rolls back with it.
#[derive(Clone, Debug)]
pub struct PostgresEventStore {
    session: PgSession,
}

impl PostgresEventStore {
    pub fn new(session: PgSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &PgSession {
        &self.session
    }

    fn row_to_event(row: PgRow) -> Result<StoredEvent> {
        let event_type: String = row.try_get("event_type")?;
        let payload = into_object(row.try_get("event_data")?, "event_data", &event_type)?;
        let metadata = into_object(row.try_get("event_metadata")?, "event_metadata", &event_type)?;

        Ok(StoredEvent {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            occurred_at: row.try_get("occurred_at")?,
            recorded_at: row.try_get("recorded_at")?,
            payload,
            metadata,
        })
    }
}

fn into_object(value: Value, column: &str, event_type: &str) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(EventStoreError::Deserialization {
            event_type: event_type.to_owned(),
            source: format!("{column} is not a JSON object: {other}").into(),
        }),
    }
}

fn is_duplicate_version(err: &PersistenceError) -> bool {
    matches!(
        err,
        PersistenceError::Database(sqlx::Error::Database(db_err))
            if db_err.constraint() == Some(UNIQUE_AGGREGATE_VERSION)
    )
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append(&self, event: StoredEvent) -> Result<()> {
        let query = sqlx::query(
            r#"
            INSERT INTO event_store
                (id, aggregate_id, aggregate_type, event_type, event_data, event_metadata, version, occurred_at, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(event.event_id.as_uuid())
        .bind(event.aggregate_id.as_uuid())
        .bind(&event.aggregate_type)
        .bind(&event.event_type)
        .bind(Value::Object(event.payload.clone()))
        .bind(Value::Object(event.metadata.clone()))
        .bind(event.version.as_i64())
        .bind(event.occurred_at)
        .bind(event.recorded_at);

        match self.session.execute(query).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_version(&err) => Err(EventStoreError::DuplicateVersion {
                aggregate_id: event.aggregate_id,
                version: event.version,
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE aggregate_id = $1 ORDER BY occurred_at ASC, version ASC"
        );
        let rows = self
            .session
            .fetch_all(sqlx::query(&sql).bind(aggregate_id.as_uuid()))
            .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<StoredEvent>> {
        let sql =
            format!("{SELECT_COLUMNS} WHERE event_type = $1 ORDER BY occurred_at ASC, version ASC");
        let rows = self
            .session
            .fetch_all(sqlx::query(&sql).bind(event_type))
            .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let row = self
            .session
            .fetch_one(
                sqlx::query("SELECT MAX(version) AS version FROM event_store WHERE aggregate_id = $1")
                    .bind(aggregate_id.as_uuid()),
            )
            .await?;
        let version: Option<i64> = row.try_get("version")?;

        Ok(version.map(Version::new))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn object_columns_pass_through() {
        let map = into_object(json!({"order_id": "x"}), "event_data", "OrderCreatedEvent").unwrap();
        assert_eq!(map["order_id"], "x");
    }

    #[test]
    fn non_object_payload_is_a_deserialization_error() {
        let err = into_object(json!([1, 2]), "event_data", "OrderCreatedEvent").unwrap_err();
        match err {
            EventStoreError::Deserialization { event_type, source } => {
                assert_eq!(event_type, "OrderCreatedEvent");
                assert!(source.to_string().contains("event_data is not a JSON object"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
