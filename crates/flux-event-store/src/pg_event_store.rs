//! `PostgreSQL` implementation of the `EventStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use flux_core::error::FluxError;
use flux_core::event::{Event, EventMetadata};
use flux_core::store::{EventStore, validate_batch, validate_page};

use crate::schema::FEED_APPEND_LOCK;

/// PostgreSQL-backed event store.
///
/// Appends run in one transaction covering the aggregate record, the event
/// log and the feed index; the version guard is a conditional `UPDATE` on
/// the aggregate row.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Creates a new `PgEventStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Version recorded on the aggregate row, read outside any append.
    async fn persisted_version(&self, aggregate_id: &str) -> Result<i64, FluxError> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM flux_aggregates WHERE aggregate_id = $1")
                .bind(aggregate_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;
        Ok(version.unwrap_or(0))
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    event_id: Uuid,
    aggregate_id: String,
    aggregate_name: String,
    aggregate_version: i64,
    event_type: String,
    payload: serde_json::Value,
    occurred_at: DateTime<Utc>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Self {
            metadata: EventMetadata {
                event_id: row.event_id,
                aggregate_id: row.aggregate_id,
                aggregate_name: row.aggregate_name,
                aggregate_version: row.aggregate_version,
                event_type: row.event_type,
                occurred_at: row.occurred_at,
            },
            payload: row.payload,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FeedRow {
    event_id: Uuid,
    aggregate_id: String,
    aggregate_name: String,
    aggregate_version: i64,
    event_type: String,
    occurred_at: DateTime<Utc>,
}

impl From<FeedRow> for EventMetadata {
    fn from(row: FeedRow) -> Self {
        Self {
            event_id: row.event_id,
            aggregate_id: row.aggregate_id,
            aggregate_name: row.aggregate_name,
            aggregate_version: row.aggregate_version,
            event_type: row.event_type,
            occurred_at: row.occurred_at,
        }
    }
}

fn storage_error(err: sqlx::Error) -> FluxError {
    tracing::error!(error = %err, "event store query failed");
    FluxError::Storage(err.to_string())
}

/// Primary key of `flux_events`.
const EVENT_ID_CONSTRAINT: &str = "flux_events_pkey";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db) => db.constraint(),
        _ => None,
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn save_events(&self, aggregate_id: &str, events: &[Event]) -> Result<(), FluxError> {
        let (Some(first), Some(last)) = (events.first(), events.last()) else {
            return Ok(());
        };
        validate_batch(aggregate_id, events)?;
        let expected = first.metadata.aggregate_version;
        let new_version = last.metadata.aggregate_version + 1;

        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        // A concurrent creator holds the unique index lock until it commits;
        // we then see the row and fall through to the guarded update.
        let created = sqlx::query(
            "INSERT INTO flux_aggregates (aggregate_id, version) VALUES ($1, 0) \
             ON CONFLICT (aggregate_id) DO NOTHING",
        )
        .bind(aggregate_id)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?
        .rows_affected()
            == 1;

        let updated = sqlx::query(
            "UPDATE flux_aggregates SET version = $2 \
             WHERE aggregate_id = $1 AND ($3 OR version = $4)",
        )
        .bind(aggregate_id)
        .bind(new_version)
        .bind(created)
        .bind(expected)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?
        .rows_affected();

        if updated == 0 {
            let actual: i64 =
                sqlx::query_scalar("SELECT version FROM flux_aggregates WHERE aggregate_id = $1")
                    .bind(aggregate_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(storage_error)?;
            tx.rollback().await.map_err(storage_error)?;
            tracing::warn!(aggregate_id, expected, actual, "append rejected: version conflict");
            return Err(FluxError::ConcurrencyConflict {
                aggregate_id: aggregate_id.to_owned(),
                expected,
                actual,
            });
        }

        for event in events {
            let meta = &event.metadata;
            let inserted = sqlx::query(
                "INSERT INTO flux_events \
                 (event_id, aggregate_id, aggregate_name, aggregate_version, event_type, payload, occurred_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(meta.event_id)
            .bind(aggregate_id)
            .bind(&meta.aggregate_name)
            .bind(meta.aggregate_version)
            .bind(&meta.event_type)
            .bind(&event.payload)
            .bind(meta.occurred_at)
            .execute(&mut *tx)
            .await;

            if let Err(err) = inserted {
                if !is_unique_violation(&err) {
                    return Err(storage_error(err));
                }
                tx.rollback().await.map_err(storage_error)?;
                if violated_constraint(&err) == Some(EVENT_ID_CONSTRAINT) {
                    tracing::warn!(aggregate_id, event_id = %meta.event_id, "append rejected: event id already stored");
                    return Err(FluxError::Validation(format!(
                        "event {} is already stored",
                        meta.event_id
                    )));
                }
                let actual = self.persisted_version(aggregate_id).await?;
                tracing::warn!(aggregate_id, expected, actual, "append rejected: version taken");
                return Err(FluxError::ConcurrencyConflict {
                    aggregate_id: aggregate_id.to_owned(),
                    expected,
                    actual,
                });
            }
        }

        // Held until commit, so feed positions are handed out in commit order
        // and a reader paging by position never sees a later gap fill in.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(FEED_APPEND_LOCK)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        for event in events {
            let meta = &event.metadata;
            sqlx::query(
                "INSERT INTO flux_feed \
                 (event_id, aggregate_id, aggregate_name, aggregate_version, event_type, occurred_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(meta.event_id)
            .bind(aggregate_id)
            .bind(&meta.aggregate_name)
            .bind(meta.aggregate_version)
            .bind(&meta.event_type)
            .bind(meta.occurred_at)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;
        tracing::info!(
            aggregate_id,
            count = events.len(),
            version = new_version,
            "events appended"
        );
        Ok(())
    }

    async fn get_events(&self, aggregate_id: &str) -> Result<Vec<Event>, FluxError> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT event_id, aggregate_id, aggregate_name, aggregate_version, event_type, payload, occurred_at \
             FROM flux_events WHERE aggregate_id = $1 ORDER BY aggregate_version",
        )
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        tracing::debug!(aggregate_id, count = rows.len(), "events loaded");
        Ok(rows.into_iter().map(Event::from).collect())
    }

    async fn get_event_metadata_from(
        &self,
        offset: i64,
        count: i64,
    ) -> Result<Vec<EventMetadata>, FluxError> {
        validate_page(offset, count)?;

        let rows: Vec<FeedRow> = sqlx::query_as(
            "SELECT event_id, aggregate_id, aggregate_name, aggregate_version, event_type, occurred_at \
             FROM flux_feed ORDER BY position OFFSET $1 LIMIT $2",
        )
        .bind(offset)
        .bind(count)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        tracing::debug!(offset, count, returned = rows.len(), "feed page loaded");
        Ok(rows.into_iter().map(EventMetadata::from).collect())
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Option<Event>, FluxError> {
        let row: Option<EventRow> = sqlx::query_as(
            "SELECT event_id, aggregate_id, aggregate_name, aggregate_version, event_type, payload, occurred_at \
             FROM flux_events WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(row.map(Event::from))
    }
}
