//! `PostgreSQL` implementation of the `OffsetStore` trait.

use async_trait::async_trait;
use sqlx::PgPool;

use flux_core::error::FluxError;
use flux_core::store::{OffsetStore, START_OF_FEED};

/// PostgreSQL-backed consumer offset store. One row per consumer identity.
#[derive(Debug, Clone)]
pub struct PgOffsetStore {
    pool: PgPool,
}

impl PgOffsetStore {
    /// Creates a new `PgOffsetStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OffsetStore for PgOffsetStore {
    async fn get_offset(&self, consumer_id: &str) -> Result<i64, FluxError> {
        let offset: Option<i64> = sqlx::query_scalar(
            "SELECT offset_value FROM flux_consumer_offsets WHERE consumer_id = $1",
        )
        .bind(consumer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FluxError::Storage(e.to_string()))?;

        Ok(offset.unwrap_or(START_OF_FEED))
    }

    async fn save_offset(&self, consumer_id: &str, offset: i64) -> Result<(), FluxError> {
        if offset < START_OF_FEED {
            return Err(FluxError::Validation(format!("invalid offset {offset}")));
        }

        sqlx::query(
            "INSERT INTO flux_consumer_offsets (consumer_id, offset_value) VALUES ($1, $2) \
             ON CONFLICT (consumer_id) DO UPDATE \
             SET offset_value = EXCLUDED.offset_value, updated_at = NOW()",
        )
        .bind(consumer_id)
        .bind(offset)
        .execute(&self.pool)
        .await
        .map_err(|e| FluxError::Storage(e.to_string()))?;

        tracing::debug!(consumer_id, offset, "offset saved");
        Ok(())
    }
}
