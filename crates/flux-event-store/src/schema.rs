//! Event store database schema.

use sqlx::PgPool;
use sqlx::migrate::{MigrateError, Migrator};

/// Embedded migrations creating the aggregate, event, feed and offset
/// tables.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Serializes feed appends so feed positions follow commit order.
pub(crate) const FEED_APPEND_LOCK: i64 = 0x666c_7578_6665_6564;

/// Applies pending migrations.
///
/// # Errors
///
/// Returns `MigrateError` if a migration fails or the database is
/// unreachable.
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}
