// User service for business logic

use std::sync::Arc;

use tracing::info;
use userrole_core::User;

use super::ServiceError;
use crate::api::users::{AssignRoleRequest, CreateUserRequest};
use crate::storage::password::hash_password;
use crate::storage::{CreateUserRow, StorageBackend};

const MAX_USERNAME_CHARS: usize = 64;
const MIN_PASSWORD_CHARS: usize = 8;

pub struct UserService {
    db: Arc<StorageBackend>,
}

impl UserService {
    pub fn new(db: Arc<StorageBackend>) -> Self {
        Self { db }
    }

    /// Create a user with its initial roles; appends `UserCreated`
    pub async fn create(&self, req: CreateUserRequest) -> Result<User, ServiceError> {
        let username = req.username.trim().to_string();
        validate_username(&username)?;
        let email = req.email.trim().to_lowercase();
        validate_email(&email)?;

        let password_hash = match req.password.as_deref() {
            Some(password) => {
                if password.chars().count() < MIN_PASSWORD_CHARS {
                    return Err(ServiceError::validation(format!(
                        "password must be at least {} characters",
                        MIN_PASSWORD_CHARS
                    )));
                }
                Some(hash_password(password).map_err(|e| ServiceError::Internal(e.to_string()))?)
            }
            None => None,
        };

        let mut role_ids = req.role_ids;
        role_ids.sort_unstable();
        role_ids.dedup();

        let input = CreateUserRow {
            username,
            email,
            password_hash,
            first_name: non_blank(req.first_name),
            last_name: non_blank(req.last_name),
            active: req.active.unwrap_or(true),
        };
        // An unknown role in the body is a bad request, not a missing resource
        let created = self
            .db
            .create_user(input, &role_ids)
            .await
            .map_err(|e| match ServiceError::from(e) {
                ServiceError::NotFound(m) => ServiceError::Validation(m),
                other => other,
            })?;

        info!(
            user_id = created.user.user_id,
            username = %created.user.username,
            roles = created.roles.len(),
            "User created"
        );
        Ok(created.into())
    }

    pub async fn get(&self, user_id: i64) -> Result<Option<User>, ServiceError> {
        Ok(self.db.get_user(user_id).await?.map(User::from))
    }

    pub async fn list(&self, search: Option<&str>) -> Result<Vec<User>, ServiceError> {
        let rows = self.db.list_users(search).await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    /// Assign an existing role; appends `RoleAssigned`
    pub async fn assign_role(
        &self,
        user_id: i64,
        req: AssignRoleRequest,
    ) -> Result<User, ServiceError> {
        let updated = self.db.assign_role(user_id, req.role_id).await?;
        info!(user_id, role_id = req.role_id, "Role assigned");
        Ok(updated.into())
    }
}

fn validate_username(username: &str) -> Result<(), ServiceError> {
    if username.is_empty() {
        return Err(ServiceError::validation("username is required"));
    }
    if username.chars().count() > MAX_USERNAME_CHARS {
        return Err(ServiceError::validation(format!(
            "username must be at most {} characters",
            MAX_USERNAME_CHARS
        )));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(ServiceError::validation("username must not contain spaces"));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), ServiceError> {
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace) =>
        {
            Ok(())
        }
        _ => Err(ServiceError::validation("email is not a valid address")),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
