//! Test offset stores.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use flux_core::error::FluxError;
use flux_core::store::{OffsetStore, START_OF_FEED};

/// An offset store held in process memory that records every write.
#[derive(Debug, Default)]
pub struct InMemoryOffsetStore {
    offsets: Mutex<HashMap<String, i64>>,
    writes: Mutex<Vec<(String, i64)>>,
}

impl InMemoryOffsetStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all `save_offset` calls in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn writes(&self) -> Vec<(String, i64)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl OffsetStore for InMemoryOffsetStore {
    async fn get_offset(&self, consumer_id: &str) -> Result<i64, FluxError> {
        Ok(self
            .offsets
            .lock()
            .unwrap()
            .get(consumer_id)
            .copied()
            .unwrap_or(START_OF_FEED))
    }

    async fn save_offset(&self, consumer_id: &str, offset: i64) -> Result<(), FluxError> {
        self.offsets
            .lock()
            .unwrap()
            .insert(consumer_id.to_owned(), offset);
        self.writes
            .lock()
            .unwrap()
            .push((consumer_id.to_owned(), offset));
        Ok(())
    }
}

/// An offset store that reads the start of the feed but fails every write.
/// Simulates a crash between dispatch and offset persistence.
#[derive(Debug)]
pub struct FailingOffsetStore;

#[async_trait]
impl OffsetStore for FailingOffsetStore {
    async fn get_offset(&self, _consumer_id: &str) -> Result<i64, FluxError> {
        Ok(START_OF_FEED)
    }

    async fn save_offset(&self, _consumer_id: &str, _offset: i64) -> Result<(), FluxError> {
        Err(FluxError::Storage("connection refused".into()))
    }
}
