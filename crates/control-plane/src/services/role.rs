// Role service for business logic

use std::sync::Arc;

use userrole_core::Role;

use super::ServiceError;
use crate::api::roles::CreateRoleRequest;
use crate::storage::{CreateRoleRow, StorageBackend};

const MAX_ROLE_NAME_CHARS: usize = 64;

pub struct RoleService {
    db: Arc<StorageBackend>,
}

impl RoleService {
    pub fn new(db: Arc<StorageBackend>) -> Self {
        Self { db }
    }

    /// Create a role; appends `RoleCreated`
    pub async fn create(&self, req: CreateRoleRequest) -> Result<Role, ServiceError> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::validation("role name is required"));
        }
        if name.chars().count() > MAX_ROLE_NAME_CHARS {
            return Err(ServiceError::validation(format!(
                "role name must be at most {} characters",
                MAX_ROLE_NAME_CHARS
            )));
        }

        let row = self
            .db
            .create_role(CreateRoleRow {
                name,
                description: req
                    .description
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty()),
            })
            .await?;
        tracing::info!(role_id = row.role_id, name = %row.name, "Role created");
        Ok(row.into())
    }

    pub async fn get(&self, role_id: i64) -> Result<Option<Role>, ServiceError> {
        Ok(self.db.get_role(role_id).await?.map(Role::from))
    }

    pub async fn list(&self) -> Result<Vec<Role>, ServiceError> {
        let rows = self.db.list_roles().await?;
        Ok(rows.into_iter().map(Role::from).collect())
    }
}
