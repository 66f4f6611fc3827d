// Input size validation for user and role APIs
//
// Last-resort limits that run before any service logic. These are hard
// limits, not configurable. Field-level rules (required fields, formats)
// live in the services and return specific messages.

use super::common::ErrorResponse;
use super::roles::CreateRoleRequest;
use super::users::CreateUserRequest;
use axum::http::StatusCode;
use axum::Json;

// =============================================================================
// Input Size Limits
// =============================================================================

/// Maximum size for username, email, first and last name fields.
pub const MAX_SHORT_FIELD_BYTES: usize = 1024; // 1 KB

/// Maximum size for a plaintext password. Argon2 cost grows with input.
pub const MAX_PASSWORD_BYTES: usize = 1024; // 1 KB

/// Maximum size for role description.
pub const MAX_ROLE_DESCRIPTION_BYTES: usize = 10 * 1024; // 10 KB

/// Maximum number of roles assigned when creating a user.
pub const MAX_INITIAL_ROLES: usize = 100;

/// Generic validation error message returned to clients.
pub const VALIDATION_ERROR_MESSAGE: &str = "Input exceeds allowed limits";

// =============================================================================
// Validation Functions
// =============================================================================

/// Validation error - returns generic message to avoid leaking details
#[derive(Debug)]
pub struct ValidationError;

impl From<ValidationError> for (StatusCode, Json<ErrorResponse>) {
    fn from(_: ValidationError) -> Self {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(VALIDATION_ERROR_MESSAGE)),
        )
    }
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.len() > max {
        tracing::warn!(
            "{} exceeds limit: {} bytes (max: {})",
            field,
            value.len(),
            max
        );
        return Err(ValidationError);
    }
    Ok(())
}

/// Validate create-user request sizes
pub fn validate_create_user(req: &CreateUserRequest) -> Result<(), ValidationError> {
    check_len("Username", &req.username, MAX_SHORT_FIELD_BYTES)?;
    check_len("Email", &req.email, MAX_SHORT_FIELD_BYTES)?;
    if let Some(first_name) = &req.first_name {
        check_len("First name", first_name, MAX_SHORT_FIELD_BYTES)?;
    }
    if let Some(last_name) = &req.last_name {
        check_len("Last name", last_name, MAX_SHORT_FIELD_BYTES)?;
    }
    if let Some(password) = &req.password {
        check_len("Password", password, MAX_PASSWORD_BYTES)?;
    }
    if req.role_ids.len() > MAX_INITIAL_ROLES {
        tracing::warn!(
            "Initial roles count exceeds limit: {} (max: {})",
            req.role_ids.len(),
            MAX_INITIAL_ROLES
        );
        return Err(ValidationError);
    }
    Ok(())
}

/// Validate create-role request sizes
pub fn validate_create_role(req: &CreateRoleRequest) -> Result<(), ValidationError> {
    check_len("Role name", &req.name, MAX_SHORT_FIELD_BYTES)?;
    if let Some(description) = &req.description {
        check_len("Role description", description, MAX_ROLE_DESCRIPTION_BYTES)?;
    }
    Ok(())
}
