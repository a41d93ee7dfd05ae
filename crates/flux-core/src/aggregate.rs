//! Aggregate: an in-memory accumulator of events for one entity.

use std::fmt;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::error::FluxError;
use crate::event::{Event, EventPayload, short_type_name};
use crate::store::EventStore;

/// Capabilities a domain entity exposes to its aggregate.
///
/// Both methods are optional. An entity that does not override
/// [`Entity::aggregate_name`] is named after its Rust type; one that does not
/// override [`Entity::apply_event`] ignores replayed events and only its
/// version advances.
pub trait Entity: Send + Sync {
    /// Logical name recorded on every event of this aggregate.
    fn aggregate_name(&self) -> String {
        short_type_name::<Self>()
    }

    /// Folds one event into the entity state.
    ///
    /// # Errors
    ///
    /// Implementations return `FluxError::Decode` when the payload does not
    /// match any known shape.
    fn apply_event(&mut self, _event: &Event) -> Result<(), FluxError> {
        Ok(())
    }
}

/// An entity bound to its id, version and pending events.
///
/// Not synchronized: one caller owns an `Aggregate` at a time.
pub struct Aggregate<E: Entity> {
    id: String,
    name: String,
    version: i64,
    uncommitted_events: Vec<Event>,
    entity: E,
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
}

impl<E: Entity> Aggregate<E> {
    /// Creates a fresh aggregate at version 0 with no history.
    pub fn new(id: impl Into<String>, entity: E, store: Arc<dyn EventStore>) -> Self {
        let name = entity.aggregate_name();
        Self {
            id: id.into(),
            name,
            version: 0,
            uncommitted_events: Vec::new(),
            entity,
            store,
            clock: Arc::new(SystemClock),
        }
    }

    /// Loads an aggregate by replaying its persisted history through
    /// `entity`. An id without history yields the same result as
    /// [`Aggregate::new`].
    ///
    /// # Errors
    ///
    /// Returns `FluxError::Storage` if the history cannot be read and any
    /// error raised by [`Entity::apply_event`] during replay.
    pub async fn load(
        id: impl Into<String>,
        entity: E,
        store: Arc<dyn EventStore>,
    ) -> Result<Self, FluxError> {
        let mut aggregate = Self::new(id, entity, store);
        let history = aggregate.store.get_events(&aggregate.id).await?;
        for event in &history {
            aggregate.entity.apply_event(event)?;
            aggregate.version = event.metadata.aggregate_version + 1;
        }
        tracing::debug!(
            aggregate_id = %aggregate.id,
            version = aggregate.version,
            replayed = history.len(),
            "aggregate loaded"
        );
        Ok(aggregate)
    }

    /// Replaces the clock used to stamp new events.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Records one change: builds an event at the current version, folds it
    /// into the entity, buffers it and bumps the version.
    ///
    /// # Errors
    ///
    /// Returns `FluxError::Serialization` if the payload cannot be encoded or
    /// the entity's apply error. Nothing is buffered on failure.
    pub fn update<P: EventPayload + ?Sized>(&mut self, payload: &P) -> Result<(), FluxError> {
        let event = Event::new_at(
            &self.id,
            &self.name,
            self.version,
            payload,
            self.clock.now(),
        )?;
        self.entity.apply_event(&event)?;
        self.uncommitted_events.push(event);
        self.version += 1;
        Ok(())
    }

    /// Records several changes in order, each at the version produced by
    /// the previous one.
    ///
    /// # Errors
    ///
    /// Stops at the first failing payload; earlier payloads stay buffered.
    pub fn update_all<'a, P, I>(&mut self, payloads: I) -> Result<(), FluxError>
    where
        P: EventPayload + 'a,
        I: IntoIterator<Item = &'a P>,
    {
        for payload in payloads {
            self.update(payload)?;
        }
        Ok(())
    }

    /// Commits buffered events to the store in one append.
    ///
    /// # Errors
    ///
    /// Returns the store's error (`ConcurrencyConflict`, `Storage`, ...). The
    /// buffer is left intact so the caller can reconcile and retry.
    pub async fn save(&mut self) -> Result<(), FluxError> {
        if self.uncommitted_events.is_empty() {
            return Ok(());
        }

        if let Err(err) = self
            .store
            .save_events(&self.id, &self.uncommitted_events)
            .await
        {
            if err.is_conflict() {
                tracing::warn!(aggregate_id = %self.id, error = %err, "aggregate save rejected");
            } else {
                tracing::error!(aggregate_id = %self.id, error = %err, "aggregate save failed");
            }
            return Err(err);
        }

        tracing::info!(
            aggregate_id = %self.id,
            saved = self.uncommitted_events.len(),
            version = self.version,
            "aggregate saved"
        );
        self.uncommitted_events.clear();
        Ok(())
    }

    /// Aggregate identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Logical aggregate name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of events applied, persisted or pending.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Events recorded since the last successful save.
    #[must_use]
    pub fn uncommitted_events(&self) -> &[Event] {
        &self.uncommitted_events
    }

    /// The domain entity.
    #[must_use]
    pub fn entity(&self) -> &E {
        &self.entity
    }

    /// Consumes the aggregate, returning the domain entity.
    pub fn into_entity(self) -> E {
        self.entity
    }
}

impl<E: Entity + fmt::Debug> fmt::Debug for Aggregate<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregate")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("uncommitted_events", &self.uncommitted_events.len())
            .field("entity", &self.entity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    use super::{Aggregate, Entity};
    use crate::error::FluxError;
    use crate::event::{Event, EventMetadata, EventPayload};
    use crate::store::EventStore;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum AccountEvent {
        Deposited { amount: u64 },
        Withdrawn { amount: u64 },
    }

    impl EventPayload for AccountEvent {
        fn event_type(&self) -> String {
            match self {
                AccountEvent::Deposited { .. } => "account.deposited".to_owned(),
                AccountEvent::Withdrawn { .. } => "account.withdrawn".to_owned(),
            }
        }
    }

    #[derive(Debug, Default, PartialEq)]
    struct Account {
        balance: u64,
        applied: usize,
    }

    impl Entity for Account {
        fn apply_event(&mut self, event: &Event) -> Result<(), FluxError> {
            match event.decode::<AccountEvent>()? {
                AccountEvent::Deposited { amount } => self.balance += amount,
                AccountEvent::Withdrawn { amount } => self.balance -= amount,
            }
            self.applied += 1;
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct Named;

    impl Entity for Named {
        fn aggregate_name(&self) -> String {
            "ledger".to_owned()
        }
    }

    #[derive(Debug, Default)]
    struct Plain;

    impl Entity for Plain {}

    #[derive(Default)]
    struct MemoryStore {
        streams: Mutex<HashMap<String, Vec<Event>>>,
        save_calls: AtomicUsize,
    }

    #[async_trait]
    impl EventStore for MemoryStore {
        async fn save_events(&self, aggregate_id: &str, events: &[Event]) -> Result<(), FluxError> {
            self.save_calls.fetch_add(1, Ordering::SeqCst);
            let mut streams = self.streams.lock().unwrap();
            let stream = streams.entry(aggregate_id.to_owned()).or_default();
            let actual = i64::try_from(stream.len()).unwrap();
            let expected = events[0].metadata.aggregate_version;
            if !stream.is_empty() && actual != expected {
                return Err(FluxError::ConcurrencyConflict {
                    aggregate_id: aggregate_id.to_owned(),
                    expected,
                    actual,
                });
            }
            stream.extend_from_slice(events);
            Ok(())
        }

        async fn get_events(&self, aggregate_id: &str) -> Result<Vec<Event>, FluxError> {
            Ok(self
                .streams
                .lock()
                .unwrap()
                .get(aggregate_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn get_event_metadata_from(
            &self,
            _offset: i64,
            _count: i64,
        ) -> Result<Vec<EventMetadata>, FluxError> {
            Ok(Vec::new())
        }

        async fn get_event(&self, _event_id: Uuid) -> Result<Option<Event>, FluxError> {
            Ok(None)
        }
    }

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::default())
    }

    #[test]
    fn test_new_aggregate_starts_empty_at_version_zero() {
        let aggregate = Aggregate::new("account-1", Account::default(), store());

        assert_eq!(aggregate.id(), "account-1");
        assert_eq!(aggregate.version(), 0);
        assert!(aggregate.uncommitted_events().is_empty());
    }

    #[test]
    fn test_aggregate_name_defaults_to_type_name_and_can_be_overridden() {
        assert_eq!(Aggregate::new("a", Plain, store()).name(), "Plain");
        assert_eq!(Aggregate::new("b", Named, store()).name(), "ledger");
    }

    #[test]
    fn test_update_buffers_events_with_monotonic_versions() {
        // Arrange
        let mut aggregate = Aggregate::new("account-1", Account::default(), store());

        // Act
        aggregate
            .update_all(&[
                AccountEvent::Deposited { amount: 100 },
                AccountEvent::Withdrawn { amount: 30 },
            ])
            .unwrap();
        aggregate
            .update(&AccountEvent::Deposited { amount: 5 })
            .unwrap();

        // Assert
        let versions: Vec<i64> = aggregate
            .uncommitted_events()
            .iter()
            .map(Event::version)
            .collect();
        assert_eq!(versions, vec![0, 1, 2]);
        assert_eq!(aggregate.version(), 3);
        assert_eq!(aggregate.entity().balance, 75);
        assert_eq!(
            aggregate.uncommitted_events()[1].metadata.event_type,
            "account.withdrawn"
        );
        assert_eq!(aggregate.uncommitted_events()[0].metadata.aggregate_name, "Account");
    }

    #[tokio::test]
    async fn test_save_persists_buffer_and_clears_it() {
        // Arrange
        let store = store();
        let mut aggregate = Aggregate::new("A", Account::default(), store.clone());
        aggregate
            .update(&AccountEvent::Deposited { amount: 1 })
            .unwrap();
        aggregate
            .update(&AccountEvent::Deposited { amount: 2 })
            .unwrap();

        // Act
        aggregate.save().await.unwrap();

        // Assert
        assert!(aggregate.uncommitted_events().is_empty());
        assert_eq!(aggregate.version(), 2);
        let persisted = store.get_events("A").await.unwrap();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[0].version(), 0);
        assert_eq!(
            persisted[0].decode::<AccountEvent>().unwrap(),
            AccountEvent::Deposited { amount: 1 }
        );
        assert_eq!(persisted[1].version(), 1);
        assert_eq!(
            persisted[1].decode::<AccountEvent>().unwrap(),
            AccountEvent::Deposited { amount: 2 }
        );
    }

    #[tokio::test]
    async fn test_save_with_empty_buffer_does_not_touch_store() {
        let store = store();
        let mut aggregate = Aggregate::new("A", Account::default(), store.clone());

        aggregate.save().await.unwrap();
        aggregate.save().await.unwrap();

        assert_eq!(store.save_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_aggregate_save_is_rejected_and_keeps_buffer() {
        // Arrange
        let store = store();
        let mut stale = Aggregate::new("A", Account::default(), store.clone());
        let mut fresh = Aggregate::new("A", Account::default(), store.clone());
        fresh
            .update_all(&[
                AccountEvent::Deposited { amount: 1 },
                AccountEvent::Deposited { amount: 2 },
            ])
            .unwrap();
        fresh.save().await.unwrap();

        // Act
        stale
            .update(&AccountEvent::Deposited { amount: 3 })
            .unwrap();
        let result = stale.save().await;

        // Assert
        match result {
            Err(FluxError::ConcurrencyConflict {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 0);
                assert_eq!(actual, 2);
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
        assert_eq!(stale.uncommitted_events().len(), 1);
        assert_eq!(store.get_events("A").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_load_replays_history_through_entity() {
        // Arrange
        let store = store();
        let mut writer = Aggregate::new("A", Account::default(), store.clone());
        writer
            .update_all(&[
                AccountEvent::Deposited { amount: 50 },
                AccountEvent::Withdrawn { amount: 20 },
            ])
            .unwrap();
        writer.save().await.unwrap();

        // Act
        let loaded = Aggregate::load("A", Account::default(), store.clone())
            .await
            .unwrap();

        // Assert
        assert_eq!(loaded.version(), 2);
        assert!(loaded.uncommitted_events().is_empty());
        let mut folded = Account::default();
        for event in store.get_events("A").await.unwrap() {
            folded.apply_event(&event).unwrap();
        }
        assert_eq!(loaded.into_entity(), folded);
    }

    #[tokio::test]
    async fn test_load_unknown_id_behaves_like_new() {
        let loaded = Aggregate::load("ghost", Account::default(), store())
            .await
            .unwrap();

        assert_eq!(loaded.version(), 0);
        assert_eq!(loaded.entity(), &Account::default());
    }

    #[tokio::test]
    async fn test_loaded_aggregate_continues_versioning_and_saves() {
        let store = store();
        let mut first = Aggregate::new("A", Account::default(), store.clone());
        first
            .update(&AccountEvent::Deposited { amount: 10 })
            .unwrap();
        first.save().await.unwrap();

        let mut second = Aggregate::load("A", Account::default(), store.clone())
            .await
            .unwrap();
        second
            .update(&AccountEvent::Deposited { amount: 10 })
            .unwrap();
        second.save().await.unwrap();

        let versions: Vec<i64> = store
            .get_events("A")
            .await
            .unwrap()
            .iter()
            .map(Event::version)
            .collect();
        assert_eq!(versions, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_load_propagates_decode_failure() {
        #[derive(Serialize)]
        struct Garbage {
            nonsense: bool,
        }
        impl EventPayload for Garbage {}

        let store = store();
        let mut writer = Aggregate::new("A", Plain, store.clone());
        writer.update(&Garbage { nonsense: true }).unwrap();
        writer.save().await.unwrap();

        let result = Aggregate::load("A", Account::default(), store).await;

        assert!(matches!(result, Err(FluxError::Decode(_))));
    }
}
