//! EventStore trait definition

use std::time::Duration;

use async_trait::async_trait;
use userrole_core::event::InvalidEvent;
use userrole_core::{EventId, EventRecord, NewEvent, ProcessingOutcome};

/// Error type for store operations
///
/// A missing event id is not an error: `mark_processed` reports it as
/// `Ok(false)` and `get` as `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The persistence layer is unreachable or rejected the statement
    #[error("storage failure: {0}")]
    Storage(String),

    /// Append input failed validation
    #[error("invalid event: {0}")]
    InvalidEvent(#[from] InvalidEvent),
}

impl StoreError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}

/// Append-only persistence of event records.
///
/// Implementations never retry internally; retry and backoff belong to the
/// caller. `max_attempts` only filters what scans return.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append a new pending record and return its id.
    ///
    /// Atomic: either the full record is stored or nothing is visible.
    async fn append(&self, event: NewEvent) -> Result<EventId, StoreError>;

    /// Record the outcome of one processing attempt.
    ///
    /// Increments `attempts` by exactly one, stamps `process_time`, overwrites
    /// `error_message` (cleared on success) and releases any claim. Returns
    /// `false` when no record has this id.
    ///
    /// `processed` becomes `processed OR success`: a success is sticky, so a
    /// late failure report for an already processed record leaves it processed.
    async fn mark_processed(
        &self,
        event_id: EventId,
        outcome: ProcessingOutcome,
    ) -> Result<bool, StoreError>;

    /// Read-only snapshot of unprocessed records with `attempts < max_attempts`,
    /// oldest first, at most `limit` records.
    async fn scan_unprocessed(
        &self,
        max_attempts: u32,
        limit: u32,
    ) -> Result<Vec<EventRecord>, StoreError>;

    /// Fetch a single record
    async fn get(&self, event_id: EventId) -> Result<Option<EventRecord>, StoreError>;

    /// Unprocessed records that ran out of attempts, oldest first.
    async fn scan_exhausted(
        &self,
        max_attempts: u32,
        limit: u32,
    ) -> Result<Vec<EventRecord>, StoreError>;

    /// Lease a batch of eligible records to `consumer_id`.
    ///
    /// Same eligibility and order as [`EventStore::scan_unprocessed`], minus
    /// records another consumer claimed less than `lease` ago. Claiming never
    /// changes `attempts`; the lease ends with the next `mark_processed`.
    async fn claim_unprocessed(
        &self,
        consumer_id: &str,
        max_attempts: u32,
        limit: u32,
        lease: Duration,
    ) -> Result<Vec<EventRecord>, StoreError>;
}

/// Oldest first, id as tie breaker for records appended in the same instant
pub(crate) fn sort_oldest_first(records: &mut [EventRecord]) {
    records.sort_by(|a, b| {
        a.event_time
            .cmp(&b.event_time)
            .then(a.event_id.cmp(&b.event_id))
    });
}
