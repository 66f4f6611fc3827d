// Event service: read-only operator view of the event store
//
// Writes to the event store happen inside the user/role transactions; this
// service only inspects what consumers have left behind.

use std::sync::Arc;

use userrole_core::{EventId, EventRecord, EventStatus};
use userrole_outbox::EventStore;

use super::ServiceError;

pub const DEFAULT_LIST_LIMIT: u32 = 100;
pub const MAX_LIST_LIMIT: u32 = 1000;

pub struct EventService {
    store: Arc<dyn EventStore>,
    max_attempts: u32,
}

impl EventService {
    /// `max_attempts` is the cap consumers run with; it decides which
    /// unprocessed records count as exhausted.
    pub fn new(store: Arc<dyn EventStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Pending or exhausted records, oldest first
    pub async fn list(
        &self,
        status: EventStatus,
        max_attempts: Option<u32>,
        limit: Option<u32>,
    ) -> Result<Vec<EventRecord>, ServiceError> {
        let max_attempts = max_attempts.unwrap_or(self.max_attempts);
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);

        let records = match status {
            EventStatus::Pending => self.store.scan_unprocessed(max_attempts, limit).await?,
            EventStatus::Exhausted => self.store.scan_exhausted(max_attempts, limit).await?,
            EventStatus::Processed => {
                return Err(ServiceError::validation(
                    "status must be pending or exhausted",
                ))
            }
        };
        Ok(records)
    }

    pub async fn get(&self, event_id: EventId) -> Result<Option<EventRecord>, ServiceError> {
        Ok(self.store.get(event_id).await?)
    }
}
