// Users API routes
// Decision: Creating a user and assigning a role each append an event in the same transaction

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use userrole_core::User;
use utoipa::{IntoParams, ToSchema};

use super::common::{ApiError, ErrorResponse, ListResponse};
use super::validation::validate_create_user;
use crate::services::UserService;
use crate::storage::StorageBackend;

/// Request to create a new user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    /// Unique login name. Surrounding whitespace is trimmed.
    #[schema(example = "jdoe")]
    pub username: String,
    /// Unique email address. Stored lowercased.
    #[schema(example = "jdoe@example.com")]
    pub email: String,
    /// Optional plaintext password, stored as an Argon2id hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "Jane")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "Doe")]
    pub last_name: Option<String>,
    /// Defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    /// Existing roles to assign on creation.
    #[serde(default)]
    #[schema(example = json!([1]))]
    pub role_ids: Vec<i64>,
}

/// Request to assign a role to a user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    pub role_id: i64,
}

/// Query parameters for listing users
#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct ListUsersQuery {
    /// Case-insensitive substring match on username or email
    #[serde(default)]
    pub search: Option<String>,
}

/// App state for users routes
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<UserService>,
}

impl AppState {
    pub fn new(db: Arc<StorageBackend>) -> Self {
        Self {
            service: Arc::new(UserService::new(db)),
        }
    }
}

/// Create users routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/users", post(create_user).get(list_users))
        .route("/v1/users/:user_id", get(get_user))
        .route("/v1/users/:user_id/roles", post(assign_role))
        .with_state(state)
}

/// POST /v1/users - Create a user
#[utoipa::path(
    post,
    path = "/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid request or unknown role", body = ErrorResponse),
        (status = 409, description = "Username or email already exists", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    validate_create_user(&req)?;
    let user = state.service.create(req).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /v1/users - List users
#[utoipa::path(
    get,
    path = "/v1/users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "List of users", body = ListResponse<User>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<ListResponse<User>>, ApiError> {
    let users = state.service.list(query.search.as_deref()).await?;
    Ok(Json(ListResponse::new(users)))
}

/// GET /v1/users/{user_id} - Get user by ID
#[utoipa::path(
    get,
    path = "/v1/users/{user_id}",
    params(
        ("user_id" = i64, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User found", body = User),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    let user = state.service.get(user_id).await?.ok_or_else(|| {
        ErrorResponse::new(format!("user {} not found", user_id))
            .into_response(StatusCode::NOT_FOUND)
    })?;
    Ok(Json(user))
}

/// POST /v1/users/{user_id}/roles - Assign a role
#[utoipa::path(
    post,
    path = "/v1/users/{user_id}/roles",
    params(
        ("user_id" = i64, Path, description = "User ID")
    ),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assigned, updated user returned", body = User),
        (status = 404, description = "User or role not found", body = ErrorResponse),
        (status = 409, description = "Role already assigned", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "users"
)]
pub async fn assign_role(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(req): Json<AssignRoleRequest>,
) -> Result<Json<User>, ApiError> {
    let user = state.service.assign_role(user_id, req).await?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_user_request_defaults() {
        let req: CreateUserRequest =
            serde_json::from_str(r#"{"username": "jdoe", "email": "jdoe@example.com"}"#).unwrap();
        assert!(req.password.is_none());
        assert!(req.active.is_none());
        assert!(req.role_ids.is_empty());
    }

    #[test]
    fn test_list_users_query_deserialize() {
        let query: ListUsersQuery = serde_json::from_str(r#"{"search": "test"}"#).unwrap();
        assert_eq!(query.search, Some("test".to_string()));

        let query: ListUsersQuery = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(query.search, None);
    }
}
