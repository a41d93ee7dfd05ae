//! Connection settings for the PostgreSQL backend.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Default pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Default time to wait for a pooled connection before failing.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings used to open the connection pool shared by the event store and
/// the offset store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// Upper bound on waiting for a connection; store calls fail with a
    /// storage error instead of blocking indefinitely.
    pub acquire_timeout: Duration,
}

impl StoreConfig {
    /// Creates a config with default pool settings.
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    /// Opens a connection pool.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` if the database cannot be reached.
    pub async fn connect(&self) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(&self.database_url)
            .await
    }
}
