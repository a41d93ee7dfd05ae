//! Domain error types.

use thiserror::Error;

/// Top-level error type shared by the event store, aggregates and consumers.
///
/// Absence is never an error here: unknown aggregates, events and offsets
/// come back as empty collections, `None` or the start-of-feed offset.
#[derive(Debug, Error)]
pub enum FluxError {
    /// Malformed caller input, rejected before touching storage.
    #[error("validation error: {0}")]
    Validation(String),

    /// Optimistic concurrency conflict.
    #[error(
        "concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: String,
        /// The version the writer expected to find.
        expected: i64,
        /// The version actually persisted.
        actual: i64,
    },

    /// An event payload did not match the requested shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// A payload could not be encoded while creating an event.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The storage engine (or remote feed) failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A consumer handler reported a failure.
    #[error("handler error: {0}")]
    Handler(String),
}

impl FluxError {
    /// Returns `true` for a rejected optimistic append.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Returns `true` when repeating the operation may succeed: conflicts
    /// after reloading the aggregate, storage faults after the engine
    /// recovers.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. } | Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::FluxError;

    #[test]
    fn test_conflict_is_retryable_and_distinguishable() {
        let err = FluxError::ConcurrencyConflict {
            aggregate_id: "account-1".to_owned(),
            expected: 0,
            actual: 2,
        };

        assert!(err.is_conflict());
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "concurrency conflict on aggregate account-1: expected version 0, found 2"
        );
    }

    #[test]
    fn test_storage_fault_is_retryable_but_not_a_conflict() {
        let err = FluxError::Storage("connection refused".into());

        assert!(!err.is_conflict());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_decode_and_validation_are_not_retryable() {
        assert!(!FluxError::Decode("missing field".into()).is_retryable());
        assert!(!FluxError::Validation("negative offset".into()).is_retryable());
    }
}
