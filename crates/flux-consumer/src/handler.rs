//! Event handlers invoked by the consumer.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use flux_core::error::FluxError;
use flux_core::event::{Event, EventMetadata};
use serde::de::DeserializeOwned;

/// Receives the events of one registered type.
///
/// Delivery is at-least-once, so handlers must tolerate seeing the same
/// event again after a restart.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles one event.
    async fn handle(&self, event: &Event) -> Result<(), FluxError>;
}

#[async_trait]
impl<H: EventHandler + ?Sized> EventHandler for Arc<H> {
    async fn handle(&self, event: &Event) -> Result<(), FluxError> {
        (**self).handle(event).await
    }
}

/// What the consumer does when a handler fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HandlerFailurePolicy {
    /// Abort the cycle without moving the offset and stop the consumer.
    #[default]
    Propagate,
    /// Log the failure and continue with the next event. Payloads that
    /// fail to decode still stop the cycle.
    Skip,
}

/// Handler that decodes the payload into `P` before calling a closure.
pub struct DecodingHandler<P, F> {
    f: F,
    _payload: PhantomData<fn() -> P>,
}

/// Wraps `f` in a [`DecodingHandler`].
pub fn decoding<P, F>(f: F) -> DecodingHandler<P, F>
where
    P: DeserializeOwned,
    F: Fn(P, &EventMetadata) -> Result<(), FluxError> + Send + Sync,
{
    DecodingHandler {
        f,
        _payload: PhantomData,
    }
}

#[async_trait]
impl<P, F> EventHandler for DecodingHandler<P, F>
where
    P: DeserializeOwned + Send + 'static,
    F: Fn(P, &EventMetadata) -> Result<(), FluxError> + Send + Sync,
{
    async fn handle(&self, event: &Event) -> Result<(), FluxError> {
        let payload = event.decode::<P>()?;
        (self.f)(payload, &event.metadata)
    }
}
