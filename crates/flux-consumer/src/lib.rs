//! Flux Consumer: polls the event feed, dispatches events to handlers and
//! tracks progress in an offset store.
//!
//! Delivery is at-least-once: the offset is written only after a whole page
//! has been handled, so a crash in between redelivers that page.

pub mod consumer;
pub mod feed;
pub mod handler;

pub use consumer::{ConsumerConfig, CycleReport, EventConsumer};
pub use feed::{EventFeed, HttpFeed, StoreFeed};
pub use handler::{DecodingHandler, EventHandler, HandlerFailurePolicy, decoding};
