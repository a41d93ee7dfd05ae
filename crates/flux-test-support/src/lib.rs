//! Shared test doubles and utilities for the Flux event store.

mod clock;
mod offsets;
mod store;

pub use clock::FixedClock;
pub use offsets::{FailingOffsetStore, InMemoryOffsetStore};
pub use store::{FailingEventStore, InMemoryEventStore};
