//! Feed document model shared by the HTTP transport and remote consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::EventMetadata;

/// A page of the global event feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedDocument {
    /// Human-readable feed description.
    pub description: String,
    /// Entries in feed order.
    pub events: Vec<FeedEntry>,
}

/// One event in a feed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    /// Event identifier.
    pub event_id: Uuid,
    /// Link to the event's raw payload.
    pub url: String,
    /// Logical name of the owning aggregate.
    pub aggregate_name: String,
    /// Aggregate version the event was recorded at.
    pub aggregate_version: i64,
    /// Logical event type.
    pub event_type: String,
    /// Creation time.
    pub created: DateTime<Utc>,
}

/// Builds feed documents from event metadata. Stateless; construct one
/// wherever a feed is served.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedGenerator;

impl FeedGenerator {
    /// Creates a new generator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Renders `metadata` as a feed document whose entry links live under
    /// `base_url`.
    #[must_use]
    pub fn generate(
        &self,
        base_url: &str,
        description: &str,
        metadata: &[EventMetadata],
    ) -> FeedDocument {
        let base_url = base_url.trim_end_matches('/');
        FeedDocument {
            description: description.to_owned(),
            events: metadata
                .iter()
                .map(|meta| FeedEntry {
                    event_id: meta.event_id,
                    url: format!("{base_url}/{}", meta.event_id),
                    aggregate_name: meta.aggregate_name.clone(),
                    aggregate_version: meta.aggregate_version,
                    event_type: meta.event_type.clone(),
                    created: meta.occurred_at,
                })
                .collect(),
        }
    }
}

impl FeedEntry {
    /// Rebuilds event metadata from a feed entry. The aggregate id is not
    /// part of the feed document and must be supplied by the caller.
    #[must_use]
    pub fn to_metadata(&self, aggregate_id: String) -> EventMetadata {
        EventMetadata {
            event_id: self.event_id,
            aggregate_id,
            aggregate_name: self.aggregate_name.clone(),
            aggregate_version: self.aggregate_version,
            event_type: self.event_type.clone(),
            occurred_at: self.created,
        }
    }
}
