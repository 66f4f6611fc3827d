//! Event polling with exponential backoff
//!
//! Claims batches of pending records with adaptive polling intervals.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, instrument, trace, warn};
use userrole_core::EventRecord;

use crate::persistence::{EventStore, StoreError};

/// Polling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollerConfig {
    /// Minimum poll interval (when events are available)
    #[serde(with = "duration_millis")]
    pub min_interval: Duration,

    /// Maximum poll interval (when idle)
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Backoff multiplier when no events found
    pub backoff_multiplier: f64,

    /// Maximum events to claim per poll
    pub batch_size: u32,

    /// Attempts cap; keep it stable for the lifetime of a consumer
    pub max_attempts: u32,

    /// How long a claim keeps other consumers away
    #[serde(with = "duration_millis")]
    pub lease: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(5),
            backoff_multiplier: 1.5,
            batch_size: 10,
            max_attempts: 5,
            lease: Duration::from_secs(300),
        }
    }
}

impl PollerConfig {
    /// Create a new poller configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set minimum poll interval
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Set maximum poll interval
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    /// Set batch size
    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the attempts cap
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the claim lease
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Longest a full batch can take when every handler runs to `handler_timeout`
    pub fn batch_budget(&self, handler_timeout: Duration) -> Duration {
        handler_timeout.saturating_mul(self.batch_size)
    }

    /// Whether the lease covers a full batch of slow handlers
    pub fn lease_covers_batch(&self, handler_timeout: Duration) -> bool {
        self.lease >= self.batch_budget(handler_timeout)
    }
}

/// Event poller with adaptive backoff
///
/// Polls for events with exponential backoff when idle or when the store
/// fails, and resets to minimum interval when events are found.
pub struct EventPoller {
    store: Arc<dyn EventStore>,
    consumer_id: String,
    config: PollerConfig,
    current_interval: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl EventPoller {
    /// Create a new event poller
    pub fn new(
        store: Arc<dyn EventStore>,
        consumer_id: String,
        config: PollerConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            consumer_id,
            current_interval: config.min_interval,
            config,
            shutdown_rx,
        }
    }

    /// Poll for available events
    ///
    /// Returns claimed events and updates internal backoff state.
    #[instrument(skip(self), fields(consumer_id = %self.consumer_id))]
    pub async fn poll(&mut self) -> Result<Vec<EventRecord>, PollerError> {
        if *self.shutdown_rx.borrow() {
            debug!("Poller shutdown requested");
            return Err(PollerError::Shutdown);
        }

        let events = match self
            .store
            .claim_unprocessed(
                &self.consumer_id,
                self.config.max_attempts,
                self.config.batch_size,
                self.config.lease,
            )
            .await
        {
            Ok(events) => events,
            Err(e) => {
                self.increase_backoff();
                warn!(
                    error = %e,
                    interval_ms = self.current_interval.as_millis(),
                    "Claim failed, backing off"
                );
                return Err(PollerError::Store(e));
            }
        };

        if events.is_empty() {
            self.increase_backoff();
            trace!(
                interval_ms = self.current_interval.as_millis(),
                "No events found, backing off"
            );
        } else {
            self.reset_backoff();
            debug!(count = events.len(), "Claimed events");
        }

        Ok(events)
    }

    /// Wait for the current backoff interval
    ///
    /// Returns `true` if shutdown was signaled during the wait.
    pub async fn wait(&mut self) -> bool {
        if self.is_shutdown() {
            return true;
        }
        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(self.current_interval) => false,
            _ = shutdown_rx.changed() => {
                debug!("Shutdown signal received during wait");
                true
            }
        }
    }

    /// Get the current poll interval
    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn consumer_id(&self) -> &str {
        &self.consumer_id
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Reset backoff to minimum interval
    fn reset_backoff(&mut self) {
        self.current_interval = self.config.min_interval;
    }

    /// Increase backoff interval
    fn increase_backoff(&mut self) {
        let new_interval = Duration::from_secs_f64(
            self.current_interval.as_secs_f64() * self.config.backoff_multiplier,
        );
        self.current_interval = new_interval.min(self.config.max_interval);
    }
}

/// Poller errors
#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Worker shutdown
    #[error("worker is shutting down")]
    Shutdown,
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryEventStore;
    use userrole_core::NewEvent;

    fn poller(store: Arc<InMemoryEventStore>, config: PollerConfig) -> (EventPoller, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (EventPoller::new(store, "worker-1".to_string(), config, rx), tx)
    }

    #[test]
    fn test_default_config() {
        let config = PollerConfig::default();
        assert_eq!(config.min_interval, Duration::from_millis(100));
        assert_eq!(config.max_interval, Duration::from_secs(5));
        assert_eq!(config.backoff_multiplier, 1.5);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.lease, Duration::from_secs(300));
        assert!(config.lease_covers_batch(Duration::from_secs(30)));
    }

    #[test]
    fn test_lease_against_batch_budget() {
        let config = PollerConfig::new()
            .with_batch_size(10)
            .with_lease(Duration::from_secs(60));
        assert_eq!(
            config.batch_budget(Duration::from_secs(30)),
            Duration::from_secs(300)
        );
        assert!(!config.lease_covers_batch(Duration::from_secs(30)));
        assert!(config.lease_covers_batch(Duration::from_secs(6)));
    }

    #[test]
    fn test_config_builder() {
        let config = PollerConfig::new()
            .with_min_interval(Duration::from_millis(50))
            .with_max_interval(Duration::from_secs(10))
            .with_backoff_multiplier(0.5)
            .with_batch_size(0)
            .with_max_attempts(3)
            .with_lease(Duration::from_secs(5));

        assert_eq!(config.min_interval, Duration::from_millis(50));
        assert_eq!(config.max_interval, Duration::from_secs(10));
        assert_eq!(config.backoff_multiplier, 1.0);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.lease, Duration::from_secs(5));
    }

    #[test]
    fn test_config_serde_millis() {
        let config = PollerConfig::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["min_interval"], 100);
        assert_eq!(json["lease"], 300_000);

        let parsed: PollerConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, config);
    }

    #[tokio::test]
    async fn test_backoff_grows_when_idle_and_resets_on_work() {
        let store = Arc::new(InMemoryEventStore::new());
        let config = PollerConfig::new()
            .with_min_interval(Duration::from_millis(100))
            .with_max_interval(Duration::from_millis(300))
            .with_backoff_multiplier(2.0);
        let (mut poller, _tx) = poller(store.clone(), config);

        assert!(poller.poll().await.unwrap().is_empty());
        assert_eq!(poller.current_interval(), Duration::from_millis(200));
        assert!(poller.poll().await.unwrap().is_empty());
        assert_eq!(poller.current_interval(), Duration::from_millis(300));

        store
            .append(NewEvent::new("UserCreated", "users/create", "{}"))
            .await
            .unwrap();
        assert_eq!(poller.poll().await.unwrap().len(), 1);
        assert_eq!(poller.current_interval(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_poll_after_shutdown() {
        let store = Arc::new(InMemoryEventStore::new());
        let (mut poller, tx) = poller(store, PollerConfig::default());

        tx.send(true).unwrap();
        assert!(poller.is_shutdown());
        assert!(matches!(poller.poll().await, Err(PollerError::Shutdown)));
        assert!(poller.wait().await);
    }
}
