//! PostgreSQL implementation of EventStore
//!
//! Production persistence using the `event_store` table:
//! - Ids from a BIGSERIAL sequence, event_time defaulted by the database
//! - Single-statement attempts increment (row-level atomic read-modify-write)
//! - Lease claiming with SKIP LOCKED

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor, PgPool};
use tracing::{debug, error, instrument, warn};
use userrole_core::{EventId, EventRecord, NewEvent, ProcessingOutcome};

use super::store::{sort_oldest_first, EventStore, StoreError};

const EVENT_COLUMNS: &str = "event_id, event_type, subject, data, event_time, processed, \
                             process_time, attempts, error_message, claimed_by, claimed_at";

/// Row shape of the `event_store` table
#[derive(Debug, Clone, FromRow)]
struct EventRow {
    event_id: i64,
    event_type: String,
    subject: String,
    data: String,
    event_time: DateTime<Utc>,
    processed: bool,
    process_time: Option<DateTime<Utc>>,
    attempts: i32,
    error_message: Option<String>,
    claimed_by: Option<String>,
    claimed_at: Option<DateTime<Utc>>,
}

impl From<EventRow> for EventRecord {
    fn from(row: EventRow) -> Self {
        Self {
            event_id: row.event_id,
            event_type: row.event_type,
            subject: row.subject,
            data: row.data,
            event_time: row.event_time,
            processed: row.processed,
            process_time: row.process_time,
            attempts: row.attempts,
            error_message: row.error_message,
            claimed_by: row.claimed_by,
            claimed_at: row.claimed_at,
        }
    }
}

fn storage_error(context: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |e| {
        error!("Failed to {}: {}", context, e);
        StoreError::Storage(format!("{}: {}", context, e))
    }
}

/// PostgreSQL implementation of EventStore
///
/// The pool is the injected storage handle: connections are acquired per
/// statement and returned when the statement completes.
///
/// # Example
///
/// ```ignore
/// use userrole_outbox::PostgresEventStore;
/// use sqlx::PgPool;
///
/// let pool = PgPool::connect("postgres://localhost/userrole").await?;
/// let store = PostgresEventStore::new(pool);
/// ```
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Create a new PostgreSQL store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Append through any executor, typically an open transaction.
    ///
    /// Lets a business write and its event commit or roll back together.
    pub async fn append_with<'e, E>(executor: E, event: &NewEvent) -> Result<EventId, StoreError>
    where
        E: PgExecutor<'e>,
    {
        event.validate()?;

        let event_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO event_store (event_type, subject, data)
            VALUES ($1, $2, $3)
            RETURNING event_id
            "#,
        )
        .bind(&event.event_type)
        .bind(&event.subject)
        .bind(&event.data)
        .fetch_one(executor)
        .await
        .map_err(storage_error("append event"))?;

        debug!(event_id, event_type = %event.event_type, "appended event");
        Ok(event_id)
    }

    async fn fetch_batch(
        &self,
        condition: &str,
        max_attempts: u32,
        limit: u32,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM event_store WHERE {} ORDER BY event_time ASC, event_id ASC LIMIT $2",
            EVENT_COLUMNS, condition
        );

        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(i64::from(max_attempts))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error("scan events"))?;

        Ok(rows.into_iter().map(EventRecord::from).collect())
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[instrument(skip(self, event), fields(event_type = %event.event_type))]
    async fn append(&self, event: NewEvent) -> Result<EventId, StoreError> {
        Self::append_with(&self.pool, &event).await
    }

    #[instrument(skip(self, outcome), fields(success = outcome.is_success()))]
    async fn mark_processed(
        &self,
        event_id: EventId,
        outcome: ProcessingOutcome,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE event_store
            SET processed = processed OR $2,
                process_time = NOW(),
                attempts = attempts + 1,
                error_message = $3,
                claimed_by = NULL,
                claimed_at = NULL
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(outcome.is_success())
        .bind(outcome.error_message())
        .execute(&self.pool)
        .await
        .map_err(storage_error("mark event processed"))?;

        if result.rows_affected() == 0 {
            warn!(event_id, "mark_processed for unknown event, ignoring");
            return Ok(false);
        }

        debug!(event_id, "marked event");
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn scan_unprocessed(
        &self,
        max_attempts: u32,
        limit: u32,
    ) -> Result<Vec<EventRecord>, StoreError> {
        self.fetch_batch("processed = FALSE AND attempts < $1", max_attempts, limit)
            .await
    }

    #[instrument(skip(self))]
    async fn get(&self, event_id: EventId) -> Result<Option<EventRecord>, StoreError> {
        let sql = format!("SELECT {} FROM event_store WHERE event_id = $1", EVENT_COLUMNS);
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error("get event"))?;

        Ok(row.map(EventRecord::from))
    }

    #[instrument(skip(self))]
    async fn scan_exhausted(
        &self,
        max_attempts: u32,
        limit: u32,
    ) -> Result<Vec<EventRecord>, StoreError> {
        self.fetch_batch("processed = FALSE AND attempts >= $1", max_attempts, limit)
            .await
    }

    #[instrument(skip(self))]
    async fn claim_unprocessed(
        &self,
        consumer_id: &str,
        max_attempts: u32,
        limit: u32,
        lease: Duration,
    ) -> Result<Vec<EventRecord>, StoreError> {
        // Select and stamp in one statement; SKIP LOCKED keeps concurrent
        // claimers off each other's rows.
        let sql = format!(
            r#"
            WITH claimable AS (
                SELECT event_id
                FROM event_store
                WHERE processed = FALSE
                  AND attempts < $1
                  AND (claimed_at IS NULL OR claimed_at <= NOW() - make_interval(secs => $3))
                ORDER BY event_time ASC, event_id ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE event_store e
            SET claimed_by = $4,
                claimed_at = NOW()
            FROM claimable c
            WHERE e.event_id = c.event_id
            RETURNING {}
            "#,
            EVENT_COLUMNS
                .split(", ")
                .map(|c| format!("e.{}", c.trim()))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(i64::from(max_attempts))
            .bind(i64::from(limit))
            .bind(lease.as_secs_f64())
            .bind(consumer_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error("claim events"))?;

        // RETURNING order is unspecified
        let mut claimed: Vec<EventRecord> = rows.into_iter().map(EventRecord::from).collect();
        sort_oldest_first(&mut claimed);

        if !claimed.is_empty() {
            debug!(consumer_id, count = claimed.len(), "claimed events");
        }
        Ok(claimed)
    }
}
