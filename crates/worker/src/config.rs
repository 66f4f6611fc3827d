// Worker configuration loaded from environment variables
// Decision: DATABASE_URL is required; a worker has nothing to drain without it

use std::time::Duration;

use userrole_outbox::PollerConfig;
use uuid::Uuid;

use crate::WorkerError;

/// Complete worker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    /// Consumer id recorded on claimed records
    pub worker_id: String,
    pub poller: PollerConfig,
    pub handler_timeout: Duration,
    /// Deliver events here; `None` logs them instead
    pub webhook_url: Option<String>,
    pub webhook_timeout: Duration,
}

impl WorkerConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, WorkerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WorkerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = PollerConfig::default();

        let database_url = var("DATABASE_URL").ok_or(WorkerError::MissingVar("DATABASE_URL"))?;
        let worker_id = var("WORKER_ID").unwrap_or_else(|| format!("worker-{}", Uuid::now_v7()));

        let poller = PollerConfig::new()
            .with_max_attempts(parse_or(
                &var,
                "OUTBOX_MAX_ATTEMPTS",
                defaults.max_attempts,
            )?)
            .with_batch_size(parse_or(&var, "OUTBOX_BATCH_SIZE", defaults.batch_size)?)
            .with_min_interval(Duration::from_millis(parse_or(
                &var,
                "OUTBOX_POLL_MIN_MS",
                100,
            )?))
            .with_max_interval(Duration::from_millis(parse_or(
                &var,
                "OUTBOX_POLL_MAX_MS",
                5000,
            )?))
            .with_lease(Duration::from_secs(parse_or(
                &var,
                "OUTBOX_LEASE_SECS",
                defaults.lease.as_secs(),
            )?));

        if poller.min_interval > poller.max_interval {
            return Err(WorkerError::InvalidVar {
                name: "OUTBOX_POLL_MIN_MS",
                value: poller.min_interval.as_millis().to_string(),
                reason: "greater than OUTBOX_POLL_MAX_MS".to_string(),
            });
        }

        let handler_timeout =
            Duration::from_secs(parse_or(&var, "OUTBOX_HANDLER_TIMEOUT_SECS", 30)?);

        // A claim must outlive the slowest possible batch or a second worker
        // re-claims records this one has not reached yet
        if !poller.lease_covers_batch(handler_timeout) {
            return Err(WorkerError::InvalidVar {
                name: "OUTBOX_LEASE_SECS",
                value: poller.lease.as_secs().to_string(),
                reason: format!(
                    "shorter than OUTBOX_BATCH_SIZE x OUTBOX_HANDLER_TIMEOUT_SECS ({}s)",
                    poller.batch_budget(handler_timeout).as_secs()
                ),
            });
        }

        Ok(Self {
            database_url,
            database_max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 5)?,
            worker_id,
            poller,
            handler_timeout,
            webhook_url: var("OUTBOX_WEBHOOK_URL"),
            webhook_timeout: Duration::from_secs(parse_or(
                &var,
                "OUTBOX_WEBHOOK_TIMEOUT_SECS",
                10,
            )?),
        })
    }
}

fn parse_or<T, V>(var: &V, name: &'static str, default: T) -> Result<T, WorkerError>
where
    V: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(v) => v.trim().parse().map_err(|e: T::Err| WorkerError::InvalidVar {
            name,
            reason: e.to_string(),
            value: v,
        }),
        None => Ok(default),
    }
}
