//! Flux Core: event-sourcing building blocks.
//!
//! Events, aggregates and the storage contracts every backend and consumer
//! depends on. It contains no infrastructure code.

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod event;
pub mod feed;
pub mod store;
