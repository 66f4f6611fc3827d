// PostgreSQL repository for users, roles and their events
// Decision: Each business write and its event append share one transaction
// Decision: Unique and foreign key violations become typed StorageError variants

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgConnection, PgPool};
use userrole_core::event::subject;
use userrole_core::{NewEvent, RoleAssignedData, RoleCreatedData, UserCreatedData};
use userrole_outbox::PostgresEventStore;

use super::models::*;

const USER_COLUMNS: &str = "user_id, username, email, password_hash, first_name, last_name, \
                            active, created_at, updated_at";
const ROLE_COLUMNS: &str = "role_id, name, description, created_at";

/// Role row tagged with the user it is assigned to
#[derive(Debug, FromRow)]
struct UserRoleRow {
    user_id: i64,
    role_id: i64,
    name: String,
    description: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

fn conflict_or_internal(e: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            let message = match db.constraint() {
                Some("users_username_key") => "username already exists",
                Some("users_email_key") => "email already exists",
                Some("roles_name_key") => "role name already exists",
                _ => "resource already exists",
            };
            return StorageError::Conflict(message.to_string());
        }
    }
    e.into()
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    events: PostgresEventStore,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        let events = PostgresEventStore::new(pool.clone());
        Self { pool, events }
    }

    /// Create database connection from URL
    pub async fn from_url(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn events(&self) -> &PostgresEventStore {
        &self.events
    }

    // ============================================
    // Users
    // ============================================

    /// Insert a user with its roles and append `UserCreated`, atomically
    pub async fn create_user(
        &self,
        input: CreateUserRow,
        role_ids: &[i64],
    ) -> Result<UserWithRoles, StorageError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO users (username, email, password_hash, first_name, last_name, active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&input.username)
            .bind(&input.email)
            .bind(&input.password_hash)
            .bind(&input.first_name)
            .bind(&input.last_name)
            .bind(input.active)
            .fetch_one(&mut *tx)
            .await
            .map_err(conflict_or_internal)?;

        let roles = Self::roles_by_ids(&mut tx, role_ids).await?;
        if roles.len() != role_ids.len() {
            let missing = role_ids
                .iter()
                .find(|id| !roles.iter().any(|r| r.role_id == **id))
                .copied()
                .unwrap_or_default();
            return Err(StorageError::NotFound(format!("role {} not found", missing)));
        }

        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id)
            SELECT $1, UNNEST($2::BIGINT[])
            "#,
        )
        .bind(user.user_id)
        .bind(role_ids)
        .execute(&mut *tx)
        .await?;

        let event = NewEvent::from_payload(
            subject::USERS_CREATE,
            &UserCreatedData {
                user_id: user.user_id,
                username: user.username.clone(),
                email: user.email.clone(),
                roles: roles.iter().map(|r| r.name.clone()).collect(),
            },
        )?;
        PostgresEventStore::append_with(&mut *tx, &event).await?;

        tx.commit().await?;
        Ok(UserWithRoles { user, roles })
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<UserWithRoles>, StorageError> {
        let sql = format!("SELECT {} FROM users WHERE user_id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(user) = user else {
            return Ok(None);
        };
        let mut roles = self.roles_for_users(&[user.user_id]).await?;
        Ok(Some(UserWithRoles {
            roles: roles.remove(&user.user_id).unwrap_or_default(),
            user,
        }))
    }

    pub async fn list_users(&self, search: Option<&str>) -> Result<Vec<UserWithRoles>, StorageError> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));
        let sql = format!(
            r#"
            SELECT {}
            FROM users
            WHERE $1::TEXT IS NULL OR username ILIKE $1 OR email ILIKE $1
            ORDER BY created_at DESC, user_id DESC
            "#,
            USER_COLUMNS
        );
        let users = sqlx::query_as::<_, UserRow>(&sql)
            .bind(pattern)
            .fetch_all(&self.pool)
            .await?;

        let ids: Vec<i64> = users.iter().map(|u| u.user_id).collect();
        let mut roles = self.roles_for_users(&ids).await?;
        Ok(users
            .into_iter()
            .map(|user| UserWithRoles {
                roles: roles.remove(&user.user_id).unwrap_or_default(),
                user,
            })
            .collect())
    }

    /// Link a role to a user and append `RoleAssigned`, atomically
    pub async fn assign_role(
        &self,
        user_id: i64,
        role_id: i64,
    ) -> Result<UserWithRoles, StorageError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE users SET updated_at = NOW() WHERE user_id = $1 RETURNING {}",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("user {} not found", user_id)))?;

        let role = Self::roles_by_ids(&mut tx, &[role_id])
            .await?
            .pop()
            .ok_or_else(|| StorageError::NotFound(format!("role {} not found", role_id)))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(role_id)
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() == 0 {
            return Err(StorageError::Conflict(format!(
                "role {} already assigned to user {}",
                role_id, user_id
            )));
        }

        let event = NewEvent::from_payload(
            subject::user_roles(user_id),
            &RoleAssignedData {
                user_id,
                role_id,
                role_name: role.name.clone(),
            },
        )?;
        PostgresEventStore::append_with(&mut *tx, &event).await?;

        let sql = format!(
            r#"
            SELECT r.{}
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.role_id
            WHERE ur.user_id = $1
            ORDER BY r.role_id
            "#,
            ROLE_COLUMNS.replace(", ", ", r.")
        );
        let roles = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(user_id)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(UserWithRoles { user, roles })
    }

    // ============================================
    // Roles
    // ============================================

    /// Insert a role and append `RoleCreated`, atomically
    pub async fn create_role(&self, input: CreateRoleRow) -> Result<RoleRow, StorageError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO roles (name, description) VALUES ($1, $2) RETURNING {}",
            ROLE_COLUMNS
        );
        let role = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(&input.name)
            .bind(&input.description)
            .fetch_one(&mut *tx)
            .await
            .map_err(conflict_or_internal)?;

        let event = NewEvent::from_payload(
            subject::ROLES_CREATE,
            &RoleCreatedData {
                role_id: role.role_id,
                name: role.name.clone(),
            },
        )?;
        PostgresEventStore::append_with(&mut *tx, &event).await?;

        tx.commit().await?;
        Ok(role)
    }

    pub async fn get_role(&self, role_id: i64) -> Result<Option<RoleRow>, StorageError> {
        let sql = format!("SELECT {} FROM roles WHERE role_id = $1", ROLE_COLUMNS);
        let row = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(role_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn list_roles(&self) -> Result<Vec<RoleRow>, StorageError> {
        let sql = format!("SELECT {} FROM roles ORDER BY role_id", ROLE_COLUMNS);
        let rows = sqlx::query_as::<_, RoleRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    // ============================================
    // Helpers
    // ============================================

    async fn roles_by_ids(
        conn: &mut PgConnection,
        role_ids: &[i64],
    ) -> Result<Vec<RoleRow>, StorageError> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM roles WHERE role_id = ANY($1) ORDER BY role_id",
            ROLE_COLUMNS
        );
        let rows = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(role_ids)
            .fetch_all(conn)
            .await?;
        Ok(rows)
    }

    async fn roles_for_users(
        &self,
        user_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<RoleRow>>, StorageError> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, UserRoleRow>(
            r#"
            SELECT ur.user_id, r.role_id, r.name, r.description, r.created_at
            FROM user_roles ur
            JOIN roles r ON r.role_id = ur.role_id
            WHERE ur.user_id = ANY($1)
            ORDER BY ur.user_id, r.role_id
            "#,
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_user: HashMap<i64, Vec<RoleRow>> = HashMap::new();
        for row in rows {
            by_user.entry(row.user_id).or_default().push(RoleRow {
                role_id: row.role_id,
                name: row.name,
                description: row.description,
                created_at: row.created_at,
            });
        }
        Ok(by_user)
    }
}
