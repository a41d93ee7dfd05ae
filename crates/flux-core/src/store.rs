//! Event store and offset store abstractions.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::FluxError;
use crate::event::{Event, EventMetadata};

/// Offset of a consumer that has not processed anything yet.
pub const START_OF_FEED: i64 = 0;

/// Durable, versioned event log per aggregate plus a global feed index.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends `events` to the aggregate's stream under an optimistic
    /// version check.
    ///
    /// The batch must be contiguous in `aggregate_version`. For an existing
    /// aggregate it is accepted only if the persisted version equals the
    /// first event's version; the whole batch is rejected otherwise. The
    /// aggregate record, its events and the feed index entries are written
    /// atomically. An empty batch is a no-op.
    async fn save_events(&self, aggregate_id: &str, events: &[Event]) -> Result<(), FluxError>;

    /// Loads the full history of an aggregate in version order. Unknown
    /// aggregates yield an empty list.
    async fn get_events(&self, aggregate_id: &str) -> Result<Vec<Event>, FluxError>;

    /// Returns up to `count` feed entries starting at position `offset` of
    /// the global, insertion-ordered feed.
    async fn get_event_metadata_from(
        &self,
        offset: i64,
        count: i64,
    ) -> Result<Vec<EventMetadata>, FluxError>;

    /// Looks up a single event by id.
    async fn get_event(&self, event_id: Uuid) -> Result<Option<Event>, FluxError>;
}

/// Durable cursor per consumer identity.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    /// Returns the last recorded offset, or [`START_OF_FEED`].
    async fn get_offset(&self, consumer_id: &str) -> Result<i64, FluxError>;

    /// Overwrites the recorded offset.
    async fn save_offset(&self, consumer_id: &str, offset: i64) -> Result<(), FluxError>;
}

/// Checks the preconditions shared by every `save_events` implementation:
/// all events belong to `aggregate_id` and versions are contiguous.
///
/// # Errors
///
/// Returns `FluxError::Validation` describing the first violation.
pub fn validate_batch(aggregate_id: &str, events: &[Event]) -> Result<(), FluxError> {
    let Some(first) = events.first() else {
        return Ok(());
    };
    if first.metadata.aggregate_version < 0 {
        return Err(FluxError::Validation(format!(
            "negative aggregate version {} for aggregate {aggregate_id}",
            first.metadata.aggregate_version
        )));
    }
    let mut expected = first.metadata.aggregate_version;
    for event in events {
        if event.metadata.aggregate_id != aggregate_id {
            return Err(FluxError::Validation(format!(
                "event {} belongs to aggregate {}, not {aggregate_id}",
                event.metadata.event_id, event.metadata.aggregate_id
            )));
        }
        if event.metadata.aggregate_version != expected {
            return Err(FluxError::Validation(format!(
                "non-contiguous batch for aggregate {aggregate_id}: expected version {expected}, got {}",
                event.metadata.aggregate_version
            )));
        }
        expected += 1;
    }
    Ok(())
}

/// Rejects negative feed positions and page sizes.
///
/// # Errors
///
/// Returns `FluxError::Validation` if either argument is negative.
pub fn validate_page(offset: i64, count: i64) -> Result<(), FluxError> {
    if offset < 0 {
        return Err(FluxError::Validation(format!("invalid offset {offset}")));
    }
    if count < 0 {
        return Err(FluxError::Validation(format!("invalid count {count}")));
    }
    Ok(())
}
