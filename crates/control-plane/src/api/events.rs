// Event store HTTP routes
// Read-only: records are appended by user/role writes and marked by consumers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use userrole_core::{EventId, EventRecord, EventStatus};
use userrole_outbox::EventStore;
use utoipa::{IntoParams, ToSchema};

use super::common::{ApiError, ErrorResponse, ListResponse};
use crate::services::EventService;

/// Query parameters for event listing
#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct ListEventsQuery {
    /// `pending` (default) or `exhausted`
    pub status: Option<EventStatus>,
    /// Attempts cap; defaults to the server's OUTBOX_MAX_ATTEMPTS
    pub max_attempts: Option<u32>,
    /// Batch size, at most 1000
    pub limit: Option<u32>,
}

/// An event record with its status under the server's attempts cap
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventResponse {
    #[serde(flatten)]
    pub event: EventRecord,
    pub status: EventStatus,
}

/// App state for events routes
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EventService>,
}

impl AppState {
    pub fn new(store: Arc<dyn EventStore>, max_attempts: u32) -> Self {
        Self {
            service: Arc::new(EventService::new(store, max_attempts)),
        }
    }

    fn respond(&self, event: EventRecord, max_attempts: u32) -> EventResponse {
        EventResponse {
            status: event.status(max_attempts),
            event,
        }
    }
}

/// Create event routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/events", get(list_events))
        .route("/v1/events/:event_id", get(get_event))
        .with_state(state)
}

/// GET /v1/events - List pending or exhausted events, oldest first
#[utoipa::path(
    get,
    path = "/v1/events",
    params(ListEventsQuery),
    responses(
        (status = 200, description = "Event records", body = ListResponse<EventResponse>),
        (status = 400, description = "Invalid status", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "events"
)]
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> Result<Json<ListResponse<EventResponse>>, ApiError> {
    let max_attempts = query
        .max_attempts
        .unwrap_or_else(|| state.service.max_attempts());
    let events = state
        .service
        .list(
            query.status.unwrap_or(EventStatus::Pending),
            Some(max_attempts),
            query.limit,
        )
        .await?;

    Ok(Json(ListResponse::new(
        events
            .into_iter()
            .map(|e| state.respond(e, max_attempts))
            .collect(),
    )))
}

/// GET /v1/events/{event_id} - Get a single event record
#[utoipa::path(
    get,
    path = "/v1/events/{event_id}",
    params(
        ("event_id" = i64, Path, description = "Event ID")
    ),
    responses(
        (status = 200, description = "Event found", body = EventResponse),
        (status = 404, description = "Event not found", body = ErrorResponse)
    ),
    tag = "events"
)]
pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<Json<EventResponse>, ApiError> {
    let event = state.service.get(event_id).await?.ok_or_else(|| {
        ErrorResponse::new(format!("event {} not found", event_id))
            .into_response(StatusCode::NOT_FOUND)
    })?;
    Ok(Json(state.respond(event, state.service.max_attempts())))
}
