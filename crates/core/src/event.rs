// Event store records
//
// An event record describes one domain occurrence (UserCreated, ...) and the
// processing state a consumer reports back for it. The store treats `data` as
// opaque text; typed payloads below are a convenience for producers and handlers.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Identifier assigned by the store on append. Never reused.
pub type EventId = i64;

// ============================================================================
// Event Type Constants
// ============================================================================

pub const USER_CREATED: &str = "UserCreated";
pub const ROLE_CREATED: &str = "RoleCreated";
pub const ROLE_ASSIGNED: &str = "RoleAssigned";

/// Subjects identifying the resource path an event concerns
pub mod subject {
    pub const USERS_CREATE: &str = "users/create";
    pub const ROLES_CREATE: &str = "roles/create";

    pub fn user_roles(user_id: i64) -> String {
        format!("users/{}/roles", user_id)
    }
}

// ============================================================================
// Event Record
// ============================================================================

/// One row of the event store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct EventRecord {
    /// Store-assigned identifier
    pub event_id: EventId,
    /// Kind of domain event (e.g., "UserCreated")
    #[cfg_attr(feature = "openapi", schema(example = "UserCreated"))]
    pub event_type: String,
    /// Resource path the event concerns (e.g., "users/create")
    #[cfg_attr(feature = "openapi", schema(example = "users/create"))]
    pub subject: String,
    /// Serialized payload, interpreted according to `event_type`
    pub data: String,
    /// Creation time; defines consumption order
    pub event_time: DateTime<Utc>,
    /// Set only by a successful processing report
    pub processed: bool,
    /// Time of the most recent processing report
    pub process_time: Option<DateTime<Utc>>,
    /// Number of processing reports received
    pub attempts: i32,
    /// Error text from the last failed report, cleared on success
    pub error_message: Option<String>,
    /// Consumer currently holding a lease on this record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    /// When the lease was taken
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl EventRecord {
    /// Whether a scan bounded by `max_attempts` may return this record.
    pub fn is_eligible(&self, max_attempts: u32) -> bool {
        !self.processed && i64::from(self.attempts) < i64::from(max_attempts)
    }

    /// Derive the lifecycle status under the given attempts cap.
    ///
    /// Exhaustion is relative to the cap: raising `max_attempts` turns an
    /// exhausted record back into a pending one.
    pub fn status(&self, max_attempts: u32) -> EventStatus {
        if self.processed {
            EventStatus::Processed
        } else if self.is_eligible(max_attempts) {
            EventStatus::Pending
        } else {
            EventStatus::Exhausted
        }
    }

    /// Whether another consumer still holds an unexpired lease at `now`.
    pub fn claim_is_live(&self, now: DateTime<Utc>, lease: Duration) -> bool {
        self.lease_remaining(now, lease)
            .is_some_and(|remaining| !remaining.is_zero())
    }

    /// Time left on the current claim at `now`; `None` when unclaimed.
    pub fn lease_remaining(&self, now: DateTime<Utc>, lease: Duration) -> Option<Duration> {
        let claimed_at = self.claimed_at?;
        let Some(expires_at) = chrono::Duration::from_std(lease)
            .ok()
            .and_then(|lease| claimed_at.checked_add_signed(lease))
        else {
            return Some(lease);
        };
        Some((expires_at - now).to_std().unwrap_or(Duration::ZERO))
    }

    /// Decode the payload as JSON into `T`.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.data)
    }
}

/// Lifecycle status of an event record under a given attempts cap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Not yet processed, attempts remaining
    Pending,
    /// A consumer reported success
    Processed,
    /// Still unprocessed but out of attempts (poison message)
    Exhausted,
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processed => write!(f, "processed"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processed" => Ok(Self::Processed),
            "exhausted" => Ok(Self::Exhausted),
            other => Err(format!("unknown event status: {}", other)),
        }
    }
}

// ============================================================================
// Append input
// ============================================================================

/// Input for appending a new record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub event_type: String,
    pub subject: String,
    pub data: String,
}

/// Rejected append input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidEvent {
    #[error("event type must not be empty")]
    EmptyEventType,

    #[error("event subject must not be empty")]
    EmptySubject,
}

impl NewEvent {
    pub fn new(
        event_type: impl Into<String>,
        subject: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            subject: subject.into(),
            data: data.into(),
        }
    }

    /// Build an event from a typed payload, serialized as JSON.
    pub fn from_payload<P: EventPayload>(
        subject: impl Into<String>,
        payload: &P,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            P::EVENT_TYPE,
            subject,
            serde_json::to_string(payload)?,
        ))
    }

    pub fn validate(&self) -> Result<(), InvalidEvent> {
        if self.event_type.trim().is_empty() {
            return Err(InvalidEvent::EmptyEventType);
        }
        if self.subject.trim().is_empty() {
            return Err(InvalidEvent::EmptySubject);
        }
        Ok(())
    }
}

// ============================================================================
// Processing outcome
// ============================================================================

/// Result a consumer reports for one processing attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    Succeeded,
    /// Carries the error text recorded on the event
    Failed(String),
}

impl ProcessingOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Error text to store; `None` clears the column.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Succeeded => None,
            Self::Failed(message) => Some(message.as_str()),
        }
    }
}

impl<E: std::fmt::Display> From<Result<(), E>> for ProcessingOutcome {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::Succeeded,
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

// ============================================================================
// Typed payloads
// ============================================================================

/// A payload with a fixed event type tag
pub trait EventPayload: Serialize {
    const EVENT_TYPE: &'static str;
}

/// Data for `UserCreated`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCreatedData {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl EventPayload for UserCreatedData {
    const EVENT_TYPE: &'static str = USER_CREATED;
}

/// Data for `RoleCreated`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleCreatedData {
    pub role_id: i64,
    pub name: String,
}

impl EventPayload for RoleCreatedData {
    const EVENT_TYPE: &'static str = ROLE_CREATED;
}

/// Data for `RoleAssigned`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAssignedData {
    pub user_id: i64,
    pub role_id: i64,
    pub role_name: String,
}

impl EventPayload for RoleAssignedData {
    const EVENT_TYPE: &'static str = ROLE_ASSIGNED;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(processed: bool, attempts: i32) -> EventRecord {
        EventRecord {
            event_id: 1,
            event_type: USER_CREATED.to_string(),
            subject: subject::USERS_CREATE.to_string(),
            data: r#"{"user_id":1,"username":"ana","email":"ana@example.com"}"#.to_string(),
            event_time: Utc::now(),
            processed,
            process_time: None,
            attempts,
            error_message: None,
            claimed_by: None,
            claimed_at: None,
        }
    }

    #[test]
    fn test_status_is_relative_to_cap() {
        let rec = record(false, 3);
        assert_eq!(rec.status(3), EventStatus::Exhausted);
        assert_eq!(rec.status(5), EventStatus::Pending);
        assert!(!rec.is_eligible(3));
        assert!(rec.is_eligible(4));
    }

    #[test]
    fn test_processed_is_never_eligible() {
        let rec = record(true, 0);
        assert_eq!(rec.status(10), EventStatus::Processed);
        assert!(!rec.is_eligible(u32::MAX));
    }

    #[test]
    fn test_zero_cap_excludes_everything() {
        assert!(!record(false, 0).is_eligible(0));
    }

    #[test]
    fn test_claim_lease_expiry() {
        let now = Utc::now();
        let mut rec = record(false, 0);
        assert!(!rec.claim_is_live(now, Duration::from_secs(30)));

        rec.claimed_at = Some(now - chrono::Duration::seconds(10));
        assert!(rec.claim_is_live(now, Duration::from_secs(30)));
        assert!(!rec.claim_is_live(now, Duration::from_secs(5)));
    }

    #[test]
    fn test_lease_remaining() {
        let now = Utc::now();
        let mut rec = record(false, 0);
        assert_eq!(rec.lease_remaining(now, Duration::from_secs(30)), None);

        rec.claimed_at = Some(now - chrono::Duration::seconds(10));
        assert_eq!(
            rec.lease_remaining(now, Duration::from_secs(30)),
            Some(Duration::from_secs(20))
        );
        assert_eq!(
            rec.lease_remaining(now, Duration::from_secs(5)),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_new_event_validation() {
        assert!(NewEvent::new("UserCreated", "users/create", "{}")
            .validate()
            .is_ok());
        assert_eq!(
            NewEvent::new("  ", "users/create", "{}").validate(),
            Err(InvalidEvent::EmptyEventType)
        );
        assert_eq!(
            NewEvent::new("UserCreated", "", "{}").validate(),
            Err(InvalidEvent::EmptySubject)
        );
    }

    #[test]
    fn test_from_payload_tags_event_type() {
        let payload = RoleCreatedData {
            role_id: 7,
            name: "admin".to_string(),
        };
        let event = NewEvent::from_payload(subject::ROLES_CREATE, &payload).unwrap();
        assert_eq!(event.event_type, ROLE_CREATED);
        assert_eq!(event.subject, "roles/create");

        let json: serde_json::Value = serde_json::from_str(&event.data).unwrap();
        assert_eq!(json["role_id"], 7);
        assert_eq!(json["name"], "admin");
    }

    #[test]
    fn test_payload_decoding() {
        let data: UserCreatedData = record(false, 0).payload().unwrap();
        assert_eq!(data.username, "ana");
        assert!(data.roles.is_empty());
    }

    #[test]
    fn test_outcome_from_result() {
        let ok: Result<(), String> = Ok(());
        assert_eq!(ProcessingOutcome::from(ok), ProcessingOutcome::Succeeded);

        let err: Result<(), String> = Err("db timeout".to_string());
        let outcome = ProcessingOutcome::from(err);
        assert!(!outcome.is_success());
        assert_eq!(outcome.error_message(), Some("db timeout"));
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            EventStatus::Pending,
            EventStatus::Processed,
            EventStatus::Exhausted,
        ] {
            assert_eq!(status.to_string().parse::<EventStatus>(), Ok(status));
        }
        assert!("done".parse::<EventStatus>().is_err());
    }

    #[test]
    fn test_user_roles_subject() {
        assert_eq!(subject::user_roles(42), "users/42/roles");
    }
}
