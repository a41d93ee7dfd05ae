//! The polling consumer.
//!
//! Each cycle reads the consumer's offset, fetches the next page of the
//! feed, hands every event with a registered type to its handler in feed
//! order, and only then writes the new offset. Cycles never overlap, and
//! cancellation is only observed between cycles.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use flux_core::error::FluxError;
use flux_core::store::OffsetStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::feed::EventFeed;
use crate::handler::{EventHandler, HandlerFailurePolicy};

/// Default pause between polling cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of events requested per cycle.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Consumer settings.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Identity under which the offset is stored.
    pub consumer_id: String,
    /// Pause between cycles.
    pub poll_interval: Duration,
    /// Events requested per cycle.
    pub page_size: i64,
    /// Behaviour when a handler fails.
    pub failure_policy: HandlerFailurePolicy,
}

impl ConsumerConfig {
    /// Creates a config with default interval, page size and policy.
    #[must_use]
    pub fn new(consumer_id: impl Into<String>) -> Self {
        Self {
            consumer_id: consumer_id.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            page_size: DEFAULT_PAGE_SIZE,
            failure_policy: HandlerFailurePolicy::default(),
        }
    }

    /// Sets the pause between cycles.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the handler failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, failure_policy: HandlerFailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }
}

/// Outcome of one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Offset after the cycle.
    pub offset: i64,
    /// Events in the fetched page.
    pub fetched: usize,
    /// Events passed to a handler successfully.
    pub dispatched: usize,
    /// Events with no registered handler.
    pub ignored: usize,
    /// Handler failures skipped under [`HandlerFailurePolicy::Skip`].
    pub failed: usize,
}

/// Why a cycle stopped early. The offset is untouched in every case.
#[derive(Debug)]
enum CycleFailure {
    /// Reading the offset or the feed failed.
    Fetch(FluxError),
    /// A handler failed under [`HandlerFailurePolicy::Propagate`].
    Dispatch(FluxError),
    /// The new offset could not be written.
    Commit(FluxError),
}

impl From<CycleFailure> for FluxError {
    fn from(failure: CycleFailure) -> Self {
        match failure {
            CycleFailure::Fetch(err) | CycleFailure::Dispatch(err) | CycleFailure::Commit(err) => {
                err
            }
        }
    }
}

/// Polls a feed and dispatches events to handlers by event type.
pub struct EventConsumer {
    config: ConsumerConfig,
    feed: Arc<dyn EventFeed>,
    offsets: Arc<dyn OffsetStore>,
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl EventConsumer {
    /// Creates a consumer with no handlers.
    #[must_use]
    pub fn new(
        config: ConsumerConfig,
        feed: Arc<dyn EventFeed>,
        offsets: Arc<dyn OffsetStore>,
    ) -> Self {
        Self {
            config,
            feed,
            offsets,
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` for events of `event_type`, replacing any
    /// previous handler for that type.
    #[must_use]
    pub fn on(mut self, event_type: impl Into<String>, handler: impl EventHandler + 'static) -> Self {
        self.handlers.insert(event_type.into(), Arc::new(handler));
        self
    }

    /// Event types this consumer dispatches.
    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// The consumer's settings.
    #[must_use]
    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Runs a single fetch, dispatch and offset-commit cycle.
    ///
    /// # Errors
    ///
    /// Returns the fetch, handler or offset-store error that stopped the
    /// cycle. The stored offset is unchanged when an error is returned.
    pub async fn poll_once(&self) -> Result<CycleReport, FluxError> {
        self.cycle().await.map_err(FluxError::from)
    }

    /// Polls until `shutdown` is cancelled.
    ///
    /// Fetch and commit failures are logged and retried on the next cycle.
    /// A handler failure under [`HandlerFailurePolicy::Propagate`] stops the
    /// loop and is returned.
    ///
    /// # Errors
    ///
    /// Returns the propagated handler error.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), FluxError> {
        let consumer_id = self.config.consumer_id.as_str();
        tracing::info!(consumer_id, "consumer started");

        while !shutdown.is_cancelled() {
            match self.cycle().await {
                Ok(report) if report.fetched > 0 => {
                    tracing::info!(
                        consumer_id,
                        offset = report.offset,
                        dispatched = report.dispatched,
                        ignored = report.ignored,
                        failed = report.failed,
                        "feed page consumed"
                    );
                }
                Ok(_) => {}
                Err(CycleFailure::Fetch(err)) => {
                    tracing::warn!(consumer_id, error = %err, "feed fetch failed, retrying next cycle");
                }
                Err(CycleFailure::Commit(err)) => {
                    tracing::warn!(consumer_id, error = %err, "offset commit failed, page will be redelivered");
                }
                Err(CycleFailure::Dispatch(err)) => {
                    tracing::error!(consumer_id, error = %err, "handler failed, stopping consumer");
                    return Err(err);
                }
            }

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        tracing::info!(consumer_id, "consumer stopped");
        Ok(())
    }

    /// Runs [`EventConsumer::run`] on its own task.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<Result<(), FluxError>> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn cycle(&self) -> Result<CycleReport, CycleFailure> {
        let consumer_id = self.config.consumer_id.as_str();
        let offset = self
            .offsets
            .get_offset(consumer_id)
            .await
            .map_err(CycleFailure::Fetch)?;
        let page = self
            .feed
            .fetch(offset, self.config.page_size)
            .await
            .map_err(CycleFailure::Fetch)?;

        let mut report = CycleReport {
            offset,
            fetched: page.len(),
            ..CycleReport::default()
        };
        if page.is_empty() {
            return Ok(report);
        }

        for event in &page {
            let Some(handler) = self.handlers.get(&event.metadata.event_type) else {
                report.ignored += 1;
                continue;
            };
            match handler.handle(event).await {
                Ok(()) => report.dispatched += 1,
                // Undecodable payloads are never skipped, whatever the policy.
                Err(err @ FluxError::Decode(_)) => return Err(CycleFailure::Dispatch(err)),
                Err(err) => match self.config.failure_policy {
                    HandlerFailurePolicy::Propagate => return Err(CycleFailure::Dispatch(err)),
                    HandlerFailurePolicy::Skip => {
                        tracing::warn!(
                            consumer_id,
                            event_id = %event.metadata.event_id,
                            event_type = %event.metadata.event_type,
                            error = %err,
                            "handler failed, skipping event"
                        );
                        report.failed += 1;
                    }
                },
            }
        }

        let consumed = i64::try_from(page.len())
            .map_err(|_| CycleFailure::Fetch(FluxError::Validation("feed page too large".into())))?;
        let next = offset + consumed;
        self.offsets
            .save_offset(consumer_id, next)
            .await
            .map_err(CycleFailure::Commit)?;
        report.offset = next;
        Ok(report)
    }
}
