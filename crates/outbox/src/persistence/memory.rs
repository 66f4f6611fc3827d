//! In-memory implementation of EventStore for dev mode and testing

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, warn};
use userrole_core::{EventId, EventRecord, NewEvent, ProcessingOutcome};

use super::store::{sort_oldest_first, EventStore, StoreError};

/// In-memory implementation of EventStore
///
/// Provides the same semantics as the PostgreSQL implementation. Ids start at
/// 1 and are handed out from an atomic counter, so they are never reused.
///
/// # Example
///
/// ```
/// use userrole_outbox::InMemoryEventStore;
///
/// let store = InMemoryEventStore::new();
/// assert!(store.is_empty());
/// ```
pub struct InMemoryEventStore {
    events: RwLock<BTreeMap<EventId, EventRecord>>,
    next_id: AtomicI64,
}

impl InMemoryEventStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            events: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Number of records not yet processed, regardless of attempts
    pub fn unprocessed_count(&self) -> usize {
        self.events.read().values().filter(|e| !e.processed).count()
    }

    fn select<F>(&self, limit: u32, predicate: F) -> Vec<EventRecord>
    where
        F: Fn(&EventRecord) -> bool,
    {
        let mut selected: Vec<EventRecord> = self
            .events
            .read()
            .values()
            .filter(|e| predicate(e))
            .cloned()
            .collect();
        sort_oldest_first(&mut selected);
        selected.truncate(limit as usize);
        selected
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: NewEvent) -> Result<EventId, StoreError> {
        event.validate()?;

        let event_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = EventRecord {
            event_id,
            event_type: event.event_type,
            subject: event.subject,
            data: event.data,
            event_time: Utc::now(),
            processed: false,
            process_time: None,
            attempts: 0,
            error_message: None,
            claimed_by: None,
            claimed_at: None,
        };

        debug!(event_id, event_type = %record.event_type, "appended event");
        self.events.write().insert(event_id, record);
        Ok(event_id)
    }

    async fn mark_processed(
        &self,
        event_id: EventId,
        outcome: ProcessingOutcome,
    ) -> Result<bool, StoreError> {
        let mut events = self.events.write();
        let Some(record) = events.get_mut(&event_id) else {
            warn!(event_id, "mark_processed for unknown event, ignoring");
            return Ok(false);
        };

        record.processed = record.processed || outcome.is_success();
        record.process_time = Some(Utc::now());
        record.attempts = record.attempts.saturating_add(1);
        record.error_message = outcome.error_message().map(str::to_string);
        record.claimed_by = None;
        record.claimed_at = None;

        debug!(
            event_id,
            success = outcome.is_success(),
            attempts = record.attempts,
            "marked event"
        );
        Ok(true)
    }

    async fn scan_unprocessed(
        &self,
        max_attempts: u32,
        limit: u32,
    ) -> Result<Vec<EventRecord>, StoreError> {
        Ok(self.select(limit, |e| e.is_eligible(max_attempts)))
    }

    async fn get(&self, event_id: EventId) -> Result<Option<EventRecord>, StoreError> {
        Ok(self.events.read().get(&event_id).cloned())
    }

    async fn scan_exhausted(
        &self,
        max_attempts: u32,
        limit: u32,
    ) -> Result<Vec<EventRecord>, StoreError> {
        Ok(self.select(limit, |e| {
            !e.processed && !e.is_eligible(max_attempts)
        }))
    }

    async fn claim_unprocessed(
        &self,
        consumer_id: &str,
        max_attempts: u32,
        limit: u32,
        lease: Duration,
    ) -> Result<Vec<EventRecord>, StoreError> {
        // Select and stamp under one write lock so two claims never overlap
        let mut events = self.events.write();
        let now = Utc::now();

        let mut candidates: Vec<EventRecord> = events
            .values()
            .filter(|e| e.is_eligible(max_attempts) && !e.claim_is_live(now, lease))
            .cloned()
            .collect();
        sort_oldest_first(&mut candidates);
        candidates.truncate(limit as usize);

        for candidate in candidates.iter_mut() {
            candidate.claimed_by = Some(consumer_id.to_string());
            candidate.claimed_at = Some(now);
            if let Some(stored) = events.get_mut(&candidate.event_id) {
                stored.claimed_by = candidate.claimed_by.clone();
                stored.claimed_at = candidate.claimed_at;
            }
        }

        if !candidates.is_empty() {
            debug!(consumer_id, count = candidates.len(), "claimed events");
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use userrole_core::EventStatus;

    fn user_created(n: i64) -> NewEvent {
        NewEvent::new("UserCreated", "users/create", format!(r#"{{"id":{}}}"#, n))
    }

    async fn fail(store: &InMemoryEventStore, id: EventId, times: usize) {
        for _ in 0..times {
            assert!(store
                .mark_processed(id, ProcessingOutcome::failed("db timeout"))
                .await
                .unwrap());
        }
    }

    #[tokio::test]
    async fn test_append_assigns_unique_ids() {
        let store = InMemoryEventStore::new();
        let mut ids = Vec::new();
        for n in 0..20 {
            ids.push(store.append(user_created(n)).await.unwrap());
        }

        let unique: HashSet<EventId> = ids.iter().copied().collect();
        assert_eq!(unique.len(), 20);
        assert_eq!(ids[0], 1);
        assert_eq!(store.len(), 20);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_get_distinct_ids() {
        let store = Arc::new(InMemoryEventStore::new());
        let tasks: Vec<_> = (0..50)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move { store.append(user_created(n)).await.unwrap() })
            })
            .collect();

        let mut ids = HashSet::new();
        for task in tasks {
            assert!(ids.insert(task.await.unwrap()));
        }
        assert_eq!(ids.len(), 50);
        assert_eq!(store.len(), 50);
        assert_eq!(ids.iter().max(), Some(&50));
    }

    #[tokio::test]
    async fn test_append_initial_state() {
        let store = InMemoryEventStore::new();
        let id = store.append(user_created(1)).await.unwrap();

        let record = store.get(id).await.unwrap().unwrap();
        assert!(!record.processed);
        assert_eq!(record.attempts, 0);
        assert!(record.process_time.is_none());
        assert!(record.error_message.is_none());
        assert_eq!(record.data, r#"{"id":1}"#);
    }

    #[tokio::test]
    async fn test_append_rejects_blank_type() {
        let store = InMemoryEventStore::new();
        let result = store.append(NewEvent::new("", "users/create", "{}")).await;
        assert!(matches!(result, Err(StoreError::InvalidEvent(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_retry_scenario() {
        let store = InMemoryEventStore::new();
        let id = store
            .append(NewEvent::new("UserCreated", "users/create", r#"{"id":1}"#))
            .await
            .unwrap();
        assert_eq!(id, 1);

        let batch = store.scan_unprocessed(3, 10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].event_id, 1);
        assert_eq!(batch[0].attempts, 0);

        fail(&store, id, 1).await;
        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.attempts, 1);
        assert!(!record.processed);
        assert_eq!(record.error_message.as_deref(), Some("db timeout"));
        assert_eq!(store.scan_unprocessed(3, 10).await.unwrap().len(), 1);

        fail(&store, id, 2).await;
        assert!(store.scan_unprocessed(3, 10).await.unwrap().is_empty());

        let again = store.scan_unprocessed(5, 10).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_attempts_count_every_report() {
        let store = InMemoryEventStore::new();
        let id = store.append(user_created(1)).await.unwrap();

        fail(&store, id, 2).await;
        store
            .mark_processed(id, ProcessingOutcome::Succeeded)
            .await
            .unwrap();
        fail(&store, id, 1).await;

        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.attempts, 4);
        assert!(record.processed, "a later failure must not reopen the event");
    }

    #[tokio::test]
    async fn test_success_twice_is_idempotent_except_attempts() {
        let store = InMemoryEventStore::new();
        let id = store.append(user_created(1)).await.unwrap();
        fail(&store, id, 1).await;

        for expected in [2, 3] {
            store
                .mark_processed(id, ProcessingOutcome::Succeeded)
                .await
                .unwrap();
            let record = store.get(id).await.unwrap().unwrap();
            assert!(record.processed);
            assert_eq!(record.attempts, expected);
            assert!(record.error_message.is_none());
            assert!(record.process_time.is_some());
        }
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_processed_never_scanned() {
        let store = InMemoryEventStore::new();
        let id = store.append(user_created(1)).await.unwrap();
        store
            .mark_processed(id, ProcessingOutcome::Succeeded)
            .await
            .unwrap();

        for max_attempts in [1, 5, u32::MAX] {
            assert!(store
                .scan_unprocessed(max_attempts, 100)
                .await
                .unwrap()
                .is_empty());
            assert!(store
                .scan_exhausted(max_attempts, 100)
                .await
                .unwrap()
                .is_empty());
        }
    }

    #[tokio::test]
    async fn test_mark_unknown_event_is_noop() {
        let store = InMemoryEventStore::new();
        let updated = store
            .mark_processed(99, ProcessingOutcome::Succeeded)
            .await
            .unwrap();
        assert!(!updated);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_scan_is_ordered_and_truncated() {
        let store = InMemoryEventStore::new();
        for n in 0..5 {
            store.append(user_created(n)).await.unwrap();
        }

        let batch = store.scan_unprocessed(3, 3).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert!(batch
            .windows(2)
            .all(|w| (w[0].event_time, w[0].event_id) < (w[1].event_time, w[1].event_id)));
        assert_eq!(
            batch.iter().map(|e| e.event_id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        assert!(store.scan_unprocessed(3, 0).await.unwrap().is_empty());
        assert!(store.scan_unprocessed(0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scan_does_not_mutate() {
        let store = InMemoryEventStore::new();
        let id = store.append(user_created(1)).await.unwrap();

        let first = store.scan_unprocessed(3, 10).await.unwrap();
        let second = store.scan_unprocessed(3, 10).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.get(id).await.unwrap().unwrap().attempts, 0);
    }

    #[tokio::test]
    async fn test_scan_exhausted_lists_poison_messages() {
        let store = InMemoryEventStore::new();
        let poison = store.append(user_created(1)).await.unwrap();
        let healthy = store.append(user_created(2)).await.unwrap();
        fail(&store, poison, 3).await;

        let exhausted = store.scan_exhausted(3, 10).await.unwrap();
        assert_eq!(exhausted.len(), 1);
        assert_eq!(exhausted[0].event_id, poison);
        assert_eq!(exhausted[0].status(3), EventStatus::Exhausted);

        let pending = store.scan_unprocessed(3, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_id, healthy);
    }

    #[tokio::test]
    async fn test_claims_do_not_overlap() {
        let store = InMemoryEventStore::new();
        for n in 0..4 {
            store.append(user_created(n)).await.unwrap();
        }
        let lease = Duration::from_secs(60);

        let a = store.claim_unprocessed("worker-a", 3, 3, lease).await.unwrap();
        let b = store.claim_unprocessed("worker-b", 3, 3, lease).await.unwrap();

        assert_eq!(a.len(), 3);
        assert_eq!(b.len(), 1);
        assert!(a.iter().all(|e| e.claimed_by.as_deref() == Some("worker-a")));
        assert_eq!(b[0].event_id, 4);

        // Claiming leaves attempts alone and scans still see claimed records
        assert!(a.iter().all(|e| e.attempts == 0));
        assert_eq!(store.scan_unprocessed(3, 10).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_mark_processed_releases_claim() {
        let store = InMemoryEventStore::new();
        let id = store.append(user_created(1)).await.unwrap();
        let lease = Duration::from_secs(60);

        store.claim_unprocessed("worker-a", 3, 10, lease).await.unwrap();
        assert!(store
            .claim_unprocessed("worker-b", 3, 10, lease)
            .await
            .unwrap()
            .is_empty());

        fail(&store, id, 1).await;
        let record = store.get(id).await.unwrap().unwrap();
        assert!(record.claimed_by.is_none());

        let reclaimed = store.claim_unprocessed("worker-b", 3, 10, lease).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_reclaimed() {
        let store = InMemoryEventStore::new();
        store.append(user_created(1)).await.unwrap();

        store
            .claim_unprocessed("worker-a", 3, 10, Duration::ZERO)
            .await
            .unwrap();
        let stolen = store
            .claim_unprocessed("worker-b", 3, 10, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(stolen.len(), 1);
        assert_eq!(stolen[0].claimed_by.as_deref(), Some("worker-b"));
    }
}
