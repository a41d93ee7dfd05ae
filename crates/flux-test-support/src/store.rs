//! Test event stores: in-memory and failing `EventStore` implementations.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use flux_core::error::FluxError;
use flux_core::event::{Event, EventMetadata};
use flux_core::store::{EventStore, validate_batch, validate_page};
use uuid::Uuid;

#[derive(Debug, Default)]
struct AggregateRecord {
    version: i64,
    events: Vec<Event>,
}

#[derive(Debug, Default)]
struct State {
    aggregates: HashMap<String, AggregateRecord>,
    feed: Vec<EventMetadata>,
    locations: HashMap<Uuid, (String, usize)>,
}

/// An event store held in process memory. A single mutex covers the
/// aggregate records and the feed index, so every append is atomic.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    state: Mutex<State>,
}

impl InMemoryEventStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Persisted version of an aggregate, if it has a record.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn version_of(&self, aggregate_id: &str) -> Option<i64> {
        self.state
            .lock()
            .unwrap()
            .aggregates
            .get(aggregate_id)
            .map(|record| record.version)
    }

    /// Total number of feed entries.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn feed_len(&self) -> usize {
        self.state.lock().unwrap().feed.len()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn save_events(&self, aggregate_id: &str, events: &[Event]) -> Result<(), FluxError> {
        let (Some(first), Some(last)) = (events.first(), events.last()) else {
            return Ok(());
        };
        validate_batch(aggregate_id, events)?;

        let mut state = self.state.lock().unwrap();
        let state = &mut *state;
        let created = !state.aggregates.contains_key(aggregate_id);
        let record = state
            .aggregates
            .entry(aggregate_id.to_owned())
            .or_default();
        if !created && record.version != first.metadata.aggregate_version {
            return Err(FluxError::ConcurrencyConflict {
                aggregate_id: aggregate_id.to_owned(),
                expected: first.metadata.aggregate_version,
                actual: record.version,
            });
        }

        for event in events {
            state.locations.insert(
                event.metadata.event_id,
                (aggregate_id.to_owned(), record.events.len()),
            );
            record.events.push(event.clone());
            state.feed.push(event.metadata.clone());
        }
        record.version = last.metadata.aggregate_version + 1;
        Ok(())
    }

    async fn get_events(&self, aggregate_id: &str) -> Result<Vec<Event>, FluxError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .aggregates
            .get(aggregate_id)
            .map(|record| record.events.clone())
            .unwrap_or_default())
    }

    async fn get_event_metadata_from(
        &self,
        offset: i64,
        count: i64,
    ) -> Result<Vec<EventMetadata>, FluxError> {
        validate_page(offset, count)?;
        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        let take = usize::try_from(count).unwrap_or(usize::MAX);
        Ok(self
            .state
            .lock()
            .unwrap()
            .feed
            .iter()
            .skip(skip)
            .take(take)
            .cloned()
            .collect())
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Option<Event>, FluxError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .locations
            .get(&event_id)
            .and_then(|(aggregate_id, index)| {
                state
                    .aggregates
                    .get(aggregate_id)
                    .and_then(|record| record.events.get(*index))
            })
            .cloned())
    }
}

/// An event store that always returns a storage error. Useful for testing
/// error-handling paths.
#[derive(Debug)]
pub struct FailingEventStore;

#[async_trait]
impl EventStore for FailingEventStore {
    async fn save_events(&self, _aggregate_id: &str, _events: &[Event]) -> Result<(), FluxError> {
        Err(FluxError::Storage("connection refused".into()))
    }

    async fn get_events(&self, _aggregate_id: &str) -> Result<Vec<Event>, FluxError> {
        Err(FluxError::Storage("connection refused".into()))
    }

    async fn get_event_metadata_from(
        &self,
        _offset: i64,
        _count: i64,
    ) -> Result<Vec<EventMetadata>, FluxError> {
        Err(FluxError::Storage("connection refused".into()))
    }

    async fn get_event(&self, _event_id: Uuid) -> Result<Option<Event>, FluxError> {
        Err(FluxError::Storage("connection refused".into()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use flux_core::error::FluxError;
    use flux_core::event::{Event, EventPayload};
    use flux_core::store::EventStore;
    use serde::Serialize;

    use super::InMemoryEventStore;

    #[derive(Serialize)]
    struct EventPayloadData {
        data: String,
    }

    impl EventPayload for EventPayloadData {}

    fn event(aggregate_id: &str, version: i64) -> Event {
        Event::new(
            aggregate_id,
            "sample_aggregate",
            version,
            &EventPayloadData {
                data: "payload".to_owned(),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_events_stores_per_aggregate() {
        let store = InMemoryEventStore::new();

        store
            .save_events("aggregate-1", &[event("aggregate-1", 0), event("aggregate-1", 1)])
            .await
            .unwrap();
        store
            .save_events("aggregate-2", &[event("aggregate-2", 0), event("aggregate-2", 1)])
            .await
            .unwrap();

        assert_eq!(store.get_events("aggregate-1").await.unwrap().len(), 2);
        assert_eq!(store.get_events("aggregate-2").await.unwrap().len(), 2);
        assert_eq!(store.version_of("aggregate-1"), Some(2));
    }

    #[tokio::test]
    async fn test_save_events_rejects_wrong_version_without_partial_write() {
        let store = InMemoryEventStore::new();
        store
            .save_events("a", &[event("a", 0), event("a", 1)])
            .await
            .unwrap();

        let rejected = store.save_events("a", &[event("a", 0), event("a", 1)]).await;
        let accepted = store.save_events("a", &[event("a", 2)]).await;

        assert!(matches!(
            rejected,
            Err(FluxError::ConcurrencyConflict {
                expected: 0,
                actual: 2,
                ..
            })
        ));
        assert!(accepted.is_ok());
        assert_eq!(store.get_events("a").await.unwrap().len(), 3);
        assert_eq!(store.feed_len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_saves_at_same_version_admit_exactly_one() {
        let store = Arc::new(InMemoryEventStore::new());
        store.save_events("a", &[event("a", 0)]).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.save_events("a", &[event("a", 1), event("a", 2)]).await
            }));
        }
        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(store.get_events("a").await.unwrap().len(), 3);
        assert_eq!(store.feed_len(), 3);
    }

    #[tokio::test]
    async fn test_metadata_pages_are_contiguous() {
        let store = InMemoryEventStore::new();
        let events: Vec<Event> = (0..4).map(|v| event("aggregate1", v)).collect();
        store.save_events("aggregate1", &events).await.unwrap();

        let first = store.get_event_metadata_from(1, 2).await.unwrap();
        let second = store.get_event_metadata_from(3, 5).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first[0].event_id, events[1].id());
        assert_eq!(first[1].event_id, events[2].id());
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].event_id, events[3].id());
        assert!(store.get_event_metadata_from(10, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_event_finds_by_id_and_misses_gracefully() {
        let store = InMemoryEventStore::new();
        let expected = event("a-id", 0);
        store
            .save_events("a-id", std::slice::from_ref(&expected))
            .await
            .unwrap();

        let found = store.get_event(expected.id()).await.unwrap();
        let missing = store.get_event(uuid::Uuid::new_v4()).await.unwrap();

        assert_eq!(found, Some(expected));
        assert!(missing.is_none());
    }
}
