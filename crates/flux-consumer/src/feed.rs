//! Sources the consumer reads the global event feed from.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flux_core::error::FluxError;
use flux_core::event::Event;
use flux_core::feed::FeedDocument;
use flux_core::store::EventStore;

/// Default request timeout for [`HttpFeed`].
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// A readable, globally ordered event feed.
#[async_trait]
pub trait EventFeed: Send + Sync {
    /// Returns up to `count` events starting at feed position `offset`, in
    /// feed order.
    async fn fetch(&self, offset: i64, count: i64) -> Result<Vec<Event>, FluxError>;
}

/// Reads the feed straight from an event store in the same process.
#[derive(Clone)]
pub struct StoreFeed {
    store: Arc<dyn EventStore>,
}

impl StoreFeed {
    /// Creates a feed over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventFeed for StoreFeed {
    async fn fetch(&self, offset: i64, count: i64) -> Result<Vec<Event>, FluxError> {
        let metadata = self.store.get_event_metadata_from(offset, count).await?;
        let mut events = Vec::with_capacity(metadata.len());
        for meta in metadata {
            let event = self.store.get_event(meta.event_id).await?.ok_or_else(|| {
                FluxError::Storage(format!("feed entry {} has no stored event", meta.event_id))
            })?;
            events.push(event);
        }
        Ok(events)
    }
}

/// Reads the feed from a remote HTTP feed endpoint.
///
/// Pages come from `GET {base_url}/events?offset=N`; each entry's payload is
/// then fetched from the entry's link. The feed document carries no
/// aggregate id, so events read this way have an empty `aggregate_id`.
#[derive(Debug, Clone)]
pub struct HttpFeed {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFeed {
    /// Creates a feed client with [`DEFAULT_HTTP_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// Returns `FluxError::Storage` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, FluxError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| FluxError::Storage(format!("failed to build feed client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Creates a feed client around an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { client, base_url }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, FluxError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FluxError::Storage(format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FluxError::Storage(format!("GET {url} responded {status}")));
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                FluxError::Decode(format!("GET {url}: {e}"))
            } else {
                FluxError::Storage(format!("GET {url} failed: {e}"))
            }
        })
    }
}

#[async_trait]
impl EventFeed for HttpFeed {
    async fn fetch(&self, offset: i64, count: i64) -> Result<Vec<Event>, FluxError> {
        let page_url = format!("{}/events?offset={offset}", self.base_url);
        let document: FeedDocument = self.get_json(&page_url).await?;
        let take = usize::try_from(count.max(0)).unwrap_or(usize::MAX);

        let mut events = Vec::new();
        for entry in document.events.into_iter().take(take) {
            let payload: serde_json::Value = self.get_json(&entry.url).await?;
            events.push(Event {
                metadata: entry.to_metadata(String::new()),
                payload,
            });
        }
        tracing::debug!(offset, fetched = events.len(), "remote feed page fetched");
        Ok(events)
    }
}
