//! Server configuration read from the environment.

use std::net::SocketAddr;
use std::time::Duration;

use flux_event_store::StoreConfig;

use crate::error::AppError;
use crate::state::DEFAULT_PAGE_SIZE;

/// Settings for the feed server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Database connection settings.
    pub store: StoreConfig,
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Entries per feed page.
    pub page_size: i64,
}

impl ServerConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is missing or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// Recognised keys: `DATABASE_URL` (required), `HOST` (default
    /// `0.0.0.0`), `PORT` (default `3000`), `DATABASE_MAX_CONNECTIONS`,
    /// `DATABASE_ACQUIRE_TIMEOUT_SECS` and `FEED_PAGE_SIZE`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is missing or a value
    /// does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL").ok_or_else(|| {
            AppError::Config("DATABASE_URL environment variable must be set".to_owned())
        })?;

        let mut store = StoreConfig::new(database_url);
        if let Some(max) = parse(&lookup, "DATABASE_MAX_CONNECTIONS")? {
            store.max_connections = max;
        }
        if let Some(secs) = parse::<u64>(&lookup, "DATABASE_ACQUIRE_TIMEOUT_SECS")? {
            store.acquire_timeout = Duration::from_secs(secs);
        }

        let page_size = parse(&lookup, "FEED_PAGE_SIZE")?.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size <= 0 {
            return Err(AppError::Config(format!(
                "FEED_PAGE_SIZE must be positive, got {page_size}"
            )));
        }

        Ok(Self {
            store,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parse(&lookup, "PORT")?.unwrap_or(3000),
            page_size,
        })
    }

    /// The socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `host:port` is not a valid address.
    pub fn addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| AppError::Config(format!("{key} is invalid: {e}")))
        })
        .transpose()
}
