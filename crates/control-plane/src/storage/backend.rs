// Storage backend abstraction
// Decision: Use enum dispatch for simplicity over trait objects
//
// This module provides a unified StorageBackend enum that can work with
// either PostgreSQL (production) or in-memory (dev mode) storage. Each
// variant owns the event store its writes append to.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::PgPool;
use userrole_outbox::EventStore;

use super::memory::InMemoryDatabase;
use super::models::*;
use super::repositories::Database;

/// Storage backend that can be either PostgreSQL or in-memory
#[derive(Clone)]
pub enum StorageBackend {
    /// PostgreSQL database (production)
    Postgres(Database),
    /// In-memory database (dev mode)
    InMemory(Arc<InMemoryDatabase>),
}

impl StorageBackend {
    /// Create a PostgreSQL storage backend from a database URL
    pub async fn postgres(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let db = Database::from_url(database_url, max_connections, acquire_timeout).await?;
        Ok(Self::Postgres(db))
    }

    /// Create an in-memory storage backend
    pub fn in_memory() -> Self {
        Self::InMemory(Arc::new(InMemoryDatabase::new()))
    }

    /// Check if this is dev mode (in-memory)
    pub fn is_dev_mode(&self) -> bool {
        matches!(self, Self::InMemory(_))
    }

    /// Get the PostgreSQL pool if using PostgreSQL backend
    /// Returns None for in-memory backend
    pub fn pool(&self) -> Option<&PgPool> {
        match self {
            Self::Postgres(db) => Some(db.pool()),
            Self::InMemory(_) => None,
        }
    }

    /// The event store that business writes append to
    pub fn event_store(&self) -> Arc<dyn EventStore> {
        match self {
            Self::Postgres(db) => Arc::new(db.events().clone()),
            Self::InMemory(db) => db.events().clone(),
        }
    }

    // ============================================
    // Users
    // ============================================

    pub async fn create_user(
        &self,
        input: CreateUserRow,
        role_ids: &[i64],
    ) -> Result<UserWithRoles, StorageError> {
        match self {
            Self::Postgres(db) => db.create_user(input, role_ids).await,
            Self::InMemory(db) => db.create_user(input, role_ids).await,
        }
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<UserWithRoles>, StorageError> {
        match self {
            Self::Postgres(db) => db.get_user(user_id).await,
            Self::InMemory(db) => db.get_user(user_id).await,
        }
    }

    pub async fn list_users(&self, search: Option<&str>) -> Result<Vec<UserWithRoles>, StorageError> {
        match self {
            Self::Postgres(db) => db.list_users(search).await,
            Self::InMemory(db) => db.list_users(search).await,
        }
    }

    pub async fn assign_role(
        &self,
        user_id: i64,
        role_id: i64,
    ) -> Result<UserWithRoles, StorageError> {
        match self {
            Self::Postgres(db) => db.assign_role(user_id, role_id).await,
            Self::InMemory(db) => db.assign_role(user_id, role_id).await,
        }
    }

    // ============================================
    // Roles
    // ============================================

    pub async fn create_role(&self, input: CreateRoleRow) -> Result<RoleRow, StorageError> {
        match self {
            Self::Postgres(db) => db.create_role(input).await,
            Self::InMemory(db) => db.create_role(input).await,
        }
    }

    pub async fn get_role(&self, role_id: i64) -> Result<Option<RoleRow>, StorageError> {
        match self {
            Self::Postgres(db) => db.get_role(role_id).await,
            Self::InMemory(db) => db.get_role(role_id).await,
        }
    }

    pub async fn list_roles(&self) -> Result<Vec<RoleRow>, StorageError> {
        match self {
            Self::Postgres(db) => db.list_roles().await,
            Self::InMemory(db) => db.list_roles().await,
        }
    }
}
