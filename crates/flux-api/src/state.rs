//! Shared application state.

use std::sync::Arc;

use flux_core::feed::FeedGenerator;
use flux_core::store::EventStore;

/// Default number of entries per feed page.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Event store backing the feed.
    pub event_store: Arc<dyn EventStore>,
    /// Renders feed pages.
    pub feed: FeedGenerator,
    /// Entries per feed page.
    pub page_size: i64,
}

impl AppState {
    /// Create new application state with the default page size.
    #[must_use]
    pub fn new(event_store: Arc<dyn EventStore>) -> Self {
        Self {
            event_store,
            feed: FeedGenerator::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Overrides the feed page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size;
        self
    }
}
