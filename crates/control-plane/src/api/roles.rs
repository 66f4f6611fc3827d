// Roles API routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use userrole_core::Role;
use utoipa::ToSchema;

use super::common::{ApiError, ErrorResponse, ListResponse};
use super::validation::validate_create_role;
use crate::services::RoleService;
use crate::storage::StorageBackend;

/// Request to create a role
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateRoleRequest {
    /// Unique role name
    #[schema(example = "auditor")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "Read-only access to reports")]
    pub description: Option<String>,
}

/// App state for roles routes
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RoleService>,
}

impl AppState {
    pub fn new(db: Arc<StorageBackend>) -> Self {
        Self {
            service: Arc::new(RoleService::new(db)),
        }
    }
}

/// Create roles routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/roles", post(create_role).get(list_roles))
        .route("/v1/roles/:role_id", get(get_role))
        .with_state(state)
}

/// POST /v1/roles - Create a role
#[utoipa::path(
    post,
    path = "/v1/roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 409, description = "Role name already exists", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "roles"
)]
pub async fn create_role(
    State(state): State<AppState>,
    Json(req): Json<CreateRoleRequest>,
) -> Result<(StatusCode, Json<Role>), ApiError> {
    validate_create_role(&req)?;
    let role = state.service.create(req).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

/// GET /v1/roles - List roles
#[utoipa::path(
    get,
    path = "/v1/roles",
    responses(
        (status = 200, description = "List of roles", body = ListResponse<Role>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "roles"
)]
pub async fn list_roles(
    State(state): State<AppState>,
) -> Result<Json<ListResponse<Role>>, ApiError> {
    let roles = state.service.list().await?;
    Ok(Json(ListResponse::new(roles)))
}

/// GET /v1/roles/{role_id} - Get role by ID
#[utoipa::path(
    get,
    path = "/v1/roles/{role_id}",
    params(
        ("role_id" = i64, Path, description = "Role ID")
    ),
    responses(
        (status = 200, description = "Role found", body = Role),
        (status = 404, description = "Role not found", body = ErrorResponse)
    ),
    tag = "roles"
)]
pub async fn get_role(
    State(state): State<AppState>,
    Path(role_id): Path<i64>,
) -> Result<Json<Role>, ApiError> {
    let role = state.service.get(role_id).await?.ok_or_else(|| {
        ErrorResponse::new(format!("role {} not found", role_id))
            .into_response(StatusCode::NOT_FOUND)
    })?;
    Ok(Json(role))
}
