//! Flux Event Store: PostgreSQL persistence for events and consumer offsets.

pub mod config;
pub mod pg_event_store;
pub mod pg_offset_store;
pub mod schema;

pub use config::StoreConfig;
pub use pg_event_store::PgEventStore;
pub use pg_offset_store::PgOffsetStore;
