//! Outbox consumer loop
//!
//! Claims pending records, dispatches each to its handler and reports the
//! outcome back to the store exactly once per delivery.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};
use userrole_core::{EventRecord, ProcessingOutcome};

use super::handler::HandlerRegistry;
use super::poller::{EventPoller, PollerConfig, PollerError};
use crate::persistence::EventStore;

/// Counters for a worker run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Handler succeeded and the success was recorded
    pub processed: u64,
    /// Handler failed (or timed out) and the failure was recorded
    pub failed: u64,
    /// The outcome could not be written back; the record stays claimed
    /// until its lease expires
    pub unreported: u64,
    /// Claim lapsed before the handler ran; the record was left for the
    /// next consumer without a delivery
    pub expired: u64,
}

impl WorkerStats {
    /// Deliveries attempted; `expired` records never reached a handler
    pub fn total(&self) -> u64 {
        self.processed + self.failed + self.unreported
    }

    fn merge(&mut self, other: WorkerStats) {
        self.processed += other.processed;
        self.failed += other.failed;
        self.unreported += other.unreported;
        self.expired += other.expired;
    }
}

/// Signals a running [`OutboxWorker`] to stop after its current batch
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Event consumer
///
/// # Example
///
/// ```ignore
/// use userrole_outbox::{HandlerRegistry, OutboxWorker, PollerConfig};
///
/// let mut worker = OutboxWorker::new(store, registry, "worker-1", PollerConfig::default());
/// let handle = worker.shutdown_handle();
///
/// tokio::spawn(async move { worker.run().await });
///
/// // ... later
/// handle.shutdown();
/// ```
pub struct OutboxWorker {
    store: Arc<dyn EventStore>,
    registry: HandlerRegistry,
    poller: EventPoller,
    handler_timeout: Duration,
    shutdown: ShutdownHandle,
}

impl OutboxWorker {
    /// Create a new worker
    pub fn new(
        store: Arc<dyn EventStore>,
        registry: HandlerRegistry,
        consumer_id: impl Into<String>,
        config: PollerConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let poller = EventPoller::new(store.clone(), consumer_id.into(), config, shutdown_rx);
        Self {
            store,
            registry,
            poller,
            handler_timeout: Duration::from_secs(30),
            shutdown: ShutdownHandle {
                tx: Arc::new(shutdown_tx),
            },
        }
    }

    /// Upper bound on a single handler invocation. A timeout counts as a
    /// failed attempt.
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn consumer_id(&self) -> &str {
        self.poller.consumer_id()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Request shutdown; `run` returns once the current batch is reported
    pub fn shutdown(&self) {
        info!(consumer_id = %self.consumer_id(), "Outbox worker shutdown requested");
        self.shutdown.shutdown();
    }

    /// Poll until shutdown, returning totals for the whole run
    #[instrument(skip(self), fields(consumer_id = %self.poller.consumer_id()))]
    pub async fn run(&mut self) -> WorkerStats {
        info!(
            event_types = ?self.registry.event_types(),
            max_attempts = self.poller.config().max_attempts,
            batch_size = self.poller.config().batch_size,
            "Outbox worker started"
        );
        if !self.poller.config().lease_covers_batch(self.handler_timeout) {
            warn!(
                lease_ms = self.poller.config().lease.as_millis() as u64,
                batch_budget_ms = self
                    .poller
                    .config()
                    .batch_budget(self.handler_timeout)
                    .as_millis() as u64,
                "Claim lease is shorter than a full batch of slow handlers; late records will be skipped"
            );
        }

        let mut totals = WorkerStats::default();
        loop {
            match self.poller.poll().await {
                Ok(batch) => totals.merge(self.process_batch(batch).await),
                Err(PollerError::Shutdown) => break,
                Err(e) => error!("Poll error: {}", e),
            }

            if self.poller.wait().await {
                break;
            }
        }

        info!(
            processed = totals.processed,
            failed = totals.failed,
            unreported = totals.unreported,
            expired = totals.expired,
            "Outbox worker stopped"
        );
        totals
    }

    /// Claim and process a single batch
    pub async fn run_once(&mut self) -> Result<WorkerStats, PollerError> {
        let batch = self.poller.poll().await?;
        Ok(self.process_batch(batch).await)
    }

    /// Handle records in order, reporting each outcome once.
    ///
    /// A record is only delivered while this worker's claim on it is live,
    /// and the handler is cut off when the claim runs out. Records whose
    /// claim lapsed while earlier ones were handled are skipped so another
    /// consumer that re-claimed them is the only one delivering.
    pub async fn process_batch(&self, batch: Vec<EventRecord>) -> WorkerStats {
        let mut stats = WorkerStats::default();
        for event in batch {
            let Some(budget) = self.handler_budget(&event) else {
                warn!(
                    event_id = event.event_id,
                    "Claim expired before delivery, leaving event to the next consumer"
                );
                stats.expired += 1;
                continue;
            };

            let outcome = self.dispatch(&event, budget).await;
            let success = outcome.is_success();

            match self.store.mark_processed(event.event_id, outcome).await {
                Ok(true) if success => stats.processed += 1,
                Ok(true) => stats.failed += 1,
                Ok(false) => {
                    warn!(event_id = event.event_id, "Event vanished before it was marked");
                    stats.unreported += 1;
                }
                Err(e) => {
                    error!(event_id = event.event_id, "Failed to mark event: {}", e);
                    stats.unreported += 1;
                }
            }
        }
        stats
    }

    /// How long the handler may run for `event`: the handler timeout, cut
    /// short by what is left on the claim. `None` once the claim has lapsed.
    fn handler_budget(&self, event: &EventRecord) -> Option<Duration> {
        match event.lease_remaining(Utc::now(), self.poller.config().lease) {
            None => Some(self.handler_timeout),
            Some(remaining) if remaining.is_zero() => None,
            Some(remaining) => Some(remaining.min(self.handler_timeout)),
        }
    }

    async fn dispatch(&self, event: &EventRecord, budget: Duration) -> ProcessingOutcome {
        let outcome = match tokio::time::timeout(budget, self.registry.dispatch(event)).await {
            Ok(outcome) => outcome,
            Err(_) if budget < self.handler_timeout => ProcessingOutcome::failed(format!(
                "claim lease ran out after {}ms",
                budget.as_millis()
            )),
            Err(_) => ProcessingOutcome::failed(format!(
                "handler timed out after {}ms",
                budget.as_millis()
            )),
        };

        match outcome.error_message() {
            None => debug!(
                event_id = event.event_id,
                event_type = %event.event_type,
                "Event handled"
            ),
            Some(message) => warn!(
                event_id = event.event_id,
                event_type = %event.event_type,
                attempt = event.attempts + 1,
                error = message,
                "Event handler failed"
            ),
        }
        outcome
    }
}
