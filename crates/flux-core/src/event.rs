//! Event model: one immutable state change plus its metadata.

use chrono::{DateTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::FluxError;

/// Everything about an event except its payload. This is what the global
/// feed index stores and serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Aggregate this event belongs to.
    pub aggregate_id: String,
    /// Logical type name of the owning aggregate.
    pub aggregate_name: String,
    /// Version of the aggregate before this event was applied (0, 1, 2, ...).
    pub aggregate_version: i64,
    /// Logical payload type, used for consumer dispatch.
    pub event_type: String,
    /// Creation time, millisecond precision.
    pub occurred_at: DateTime<Utc>,
}

/// A persisted or pending event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Serialized payload.
    pub payload: serde_json::Value,
}

/// Trait implemented by every value that can be recorded as an event
/// payload.
///
/// The default event type is the payload's short Rust type name. Enums that
/// carry several kinds of change override [`EventPayload::event_type`] to
/// name each variant.
pub trait EventPayload: Serialize {
    /// Returns the logical event type name.
    fn event_type(&self) -> String {
        short_type_name::<Self>()
    }
}

impl Event {
    /// Creates an event stamped with the system clock.
    ///
    /// # Errors
    ///
    /// Returns `FluxError::Serialization` if the payload cannot be encoded.
    pub fn new<P: EventPayload + ?Sized>(
        aggregate_id: &str,
        aggregate_name: &str,
        aggregate_version: i64,
        payload: &P,
    ) -> Result<Self, FluxError> {
        Self::new_at(
            aggregate_id,
            aggregate_name,
            aggregate_version,
            payload,
            SystemClock.now(),
        )
    }

    /// Creates an event stamped with `occurred_at`, rounded to milliseconds.
    ///
    /// # Errors
    ///
    /// Returns `FluxError::Serialization` if the payload cannot be encoded.
    pub fn new_at<P: EventPayload + ?Sized>(
        aggregate_id: &str,
        aggregate_name: &str,
        aggregate_version: i64,
        payload: &P,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, FluxError> {
        let payload_value = serde_json::to_value(payload).map_err(|e| {
            FluxError::Serialization(format!(
                "failed to encode {} payload: {e}",
                payload.event_type()
            ))
        })?;

        Ok(Self {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                aggregate_id: aggregate_id.to_owned(),
                aggregate_name: aggregate_name.to_owned(),
                aggregate_version,
                event_type: payload.event_type(),
                occurred_at: occurred_at.round_subsecs(3),
            },
            payload: payload_value,
        })
    }

    /// Unique event identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.metadata.event_id
    }

    /// Aggregate version this event was recorded at.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.metadata.aggregate_version
    }

    /// Decodes the payload into `T`.
    ///
    /// # Errors
    ///
    /// Returns `FluxError::Decode` if the payload does not fit `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, FluxError> {
        T::deserialize(&self.payload).map_err(|e| {
            FluxError::Decode(format!(
                "event {} ({}): {e}",
                self.metadata.event_id, self.metadata.event_type
            ))
        })
    }
}

/// Returns the type name of `T` without its module path.
#[must_use]
pub fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    match full.split_once('<') {
        Some((path, generics)) => {
            let base = path.rsplit("::").next().unwrap_or(path);
            format!("{base}<{generics}")
        }
        None => full.rsplit("::").next().unwrap_or(full).to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{TimeZone, Utc};
    use serde::{Deserialize, Serialize};

    use super::{Event, EventPayload, short_type_name};
    use crate::error::FluxError;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct SomeData {
        data: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct SomePayload {
        some_data: SomeData,
    }

    impl EventPayload for SomePayload {}

    #[derive(Debug, Serialize)]
    enum Ledger {
        Opened { owner: String },
        Closed,
    }

    impl EventPayload for Ledger {
        fn event_type(&self) -> String {
            match self {
                Ledger::Opened { .. } => "ledger.opened".to_owned(),
                Ledger::Closed => "ledger.closed".to_owned(),
            }
        }
    }

    #[derive(Serialize)]
    struct Unencodable(HashMap<(i32, i32), i32>);

    impl EventPayload for Unencodable {}

    fn sample() -> SomePayload {
        SomePayload {
            some_data: SomeData {
                data: "some data".to_owned(),
            },
        }
    }

    #[test]
    fn test_new_event_stamps_metadata() {
        // Arrange
        let payload = sample();

        // Act
        let event = Event::new("agg-id", "SomeAggregate", 1, &payload).unwrap();

        // Assert
        assert_eq!(event.id().to_string().len(), 36);
        assert_eq!(event.metadata.aggregate_id, "agg-id");
        assert_eq!(event.metadata.aggregate_name, "SomeAggregate");
        assert_eq!(event.version(), 1);
        assert_eq!(event.metadata.event_type, "SomePayload");
    }

    #[test]
    fn test_new_event_ids_are_unique() {
        let a = Event::new("agg-id", "SomeAggregate", 0, &sample()).unwrap();
        let b = Event::new("agg-id", "SomeAggregate", 0, &sample()).unwrap();

        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_new_at_rounds_timestamp_to_milliseconds() {
        let instant = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
            + chrono::TimeDelta::microseconds(1_500);

        let event = Event::new_at("agg-id", "SomeAggregate", 0, &sample(), instant).unwrap();

        assert_eq!(event.metadata.occurred_at.timestamp_subsec_micros() % 1_000, 0);
    }

    #[test]
    fn test_payload_can_override_event_type() {
        let opened = Event::new(
            "ledger-1",
            "Ledger",
            0,
            &Ledger::Opened {
                owner: "ada".to_owned(),
            },
        )
        .unwrap();
        let closed = Event::new("ledger-1", "Ledger", 1, &Ledger::Closed).unwrap();

        assert_eq!(opened.metadata.event_type, "ledger.opened");
        assert_eq!(closed.metadata.event_type, "ledger.closed");
    }

    #[test]
    fn test_decode_restores_payload() {
        let event = Event::new("agg-id", "SomeAggregate", 0, &sample()).unwrap();

        let decoded: SomePayload = event.decode().unwrap();

        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_decode_into_incompatible_shape_fails() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Other {
            amount: u64,
        }

        let event = Event::new("agg-id", "SomeAggregate", 0, &sample()).unwrap();

        let result = event.decode::<Other>();

        match result {
            Err(FluxError::Decode(msg)) => assert!(msg.contains("SomePayload")),
            other => panic!("expected Decode, got {other:?}"),
        }
    }

    #[test]
    fn test_unencodable_payload_is_a_serialization_error() {
        let mut map = HashMap::new();
        map.insert((1, 2), 3);

        let result = Event::new("agg-id", "SomeAggregate", 0, &Unencodable(map));

        assert!(matches!(result, Err(FluxError::Serialization(_))));
    }

    #[test]
    fn test_short_type_name_strips_module_path() {
        assert_eq!(short_type_name::<SomePayload>(), "SomePayload");
        assert_eq!(short_type_name::<String>(), "String");
    }
}
