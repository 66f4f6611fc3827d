// Database row types and storage errors

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use userrole_core::{Role, User};
use userrole_outbox::StoreError;

// ============================================
// Users
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateUserRow {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub active: bool,
}

/// A user row joined with its roles, ordered by role id
#[derive(Debug, Clone)]
pub struct UserWithRoles {
    pub user: UserRow,
    pub roles: Vec<RoleRow>,
}

impl From<UserWithRoles> for User {
    fn from(row: UserWithRoles) -> Self {
        Self {
            user_id: row.user.user_id,
            username: row.user.username,
            email: row.user.email,
            first_name: row.user.first_name,
            last_name: row.user.last_name,
            active: row.user.active,
            roles: row.roles.into_iter().map(Role::from).collect(),
            created_at: row.user.created_at,
            updated_at: row.user.updated_at,
        }
    }
}

// ============================================
// Roles
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct RoleRow {
    pub role_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateRoleRow {
    pub name: String,
    pub description: Option<String>,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Self {
            role_id: row.role_id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

// ============================================
// Errors
// ============================================

/// Storage errors that callers act on; everything else is `Internal`
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Unique constraint hit (username, email, role name, assignment)
    #[error("{0}")]
    Conflict(String),

    /// A referenced user or role does not exist
    #[error("{0}")]
    NotFound(String),

    /// Event append failed; the business write was rolled back
    #[error("event append failed: {0}")]
    Event(#[from] StoreError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        Self::Internal(e.into())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(e.into())
    }
}
