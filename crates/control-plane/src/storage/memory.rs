// In-memory storage implementation for dev mode
// Decision: Use parking_lot for thread-safe access
// Decision: Sequential i64 ids, matching the BIGSERIAL columns in PostgreSQL
//
// This implementation provides the same API as the PostgreSQL repository,
// backed by in-memory maps, allowing the control-plane to run without a
// database for development. Business writes are undone when the event append
// fails, so callers observe the same all-or-nothing behavior.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use userrole_core::event::subject;
use userrole_core::{NewEvent, RoleAssignedData, RoleCreatedData, UserCreatedData};
use userrole_outbox::{EventStore, InMemoryEventStore};

use super::models::*;

/// In-memory database for dev mode
/// All data is stored in memory and lost on restart
pub struct InMemoryDatabase {
    users: RwLock<BTreeMap<i64, UserRow>>,
    roles: RwLock<BTreeMap<i64, RoleRow>>,
    user_roles: RwLock<BTreeSet<(i64, i64)>>,
    next_user_id: AtomicI64,
    next_role_id: AtomicI64,
    events: Arc<InMemoryEventStore>,
}

impl Default for InMemoryDatabase {
    fn default() -> Self {
        Self {
            users: RwLock::default(),
            roles: RwLock::default(),
            user_roles: RwLock::default(),
            next_user_id: AtomicI64::new(1),
            next_role_id: AtomicI64::new(1),
            events: Arc::new(InMemoryEventStore::new()),
        }
    }
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &Arc<InMemoryEventStore> {
        &self.events
    }

    // ============================================
    // Users
    // ============================================

    pub async fn create_user(
        &self,
        input: CreateUserRow,
        role_ids: &[i64],
    ) -> Result<UserWithRoles, StorageError> {
        let roles = self.roles_by_ids(role_ids)?;

        let user = {
            let mut users = self.users.write();
            if users.values().any(|u| u.username == input.username) {
                return Err(StorageError::Conflict("username already exists".into()));
            }
            if users.values().any(|u| u.email == input.email) {
                return Err(StorageError::Conflict("email already exists".into()));
            }
            let now = Utc::now();
            let user = UserRow {
                user_id: self.next_user_id.fetch_add(1, Ordering::SeqCst),
                username: input.username,
                email: input.email,
                password_hash: input.password_hash,
                first_name: input.first_name,
                last_name: input.last_name,
                active: input.active,
                created_at: now,
                updated_at: now,
            };
            users.insert(user.user_id, user.clone());
            user
        };
        self.user_roles
            .write()
            .extend(roles.iter().map(|r| (user.user_id, r.role_id)));

        let event = NewEvent::from_payload(
            subject::USERS_CREATE,
            &UserCreatedData {
                user_id: user.user_id,
                username: user.username.clone(),
                email: user.email.clone(),
                roles: roles.iter().map(|r| r.name.clone()).collect(),
            },
        );
        if let Err(e) = self.append(event).await {
            self.user_roles.write().retain(|(u, _)| *u != user.user_id);
            self.users.write().remove(&user.user_id);
            return Err(e);
        }

        Ok(UserWithRoles { user, roles })
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<UserWithRoles>, StorageError> {
        let user = self.users.read().get(&user_id).cloned();
        Ok(user.map(|user| self.with_roles(user)))
    }

    pub async fn list_users(&self, search: Option<&str>) -> Result<Vec<UserWithRoles>, StorageError> {
        let pattern = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        let mut users: Vec<UserRow> = self
            .users
            .read()
            .values()
            .filter(|u| match &pattern {
                Some(p) => {
                    u.username.to_lowercase().contains(p) || u.email.to_lowercase().contains(p)
                }
                None => true,
            })
            .cloned()
            .collect();
        users.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.user_id.cmp(&a.user_id))
        });
        Ok(users.into_iter().map(|u| self.with_roles(u)).collect())
    }

    pub async fn assign_role(
        &self,
        user_id: i64,
        role_id: i64,
    ) -> Result<UserWithRoles, StorageError> {
        if !self.users.read().contains_key(&user_id) {
            return Err(StorageError::NotFound(format!("user {} not found", user_id)));
        }
        let role = self
            .roles
            .read()
            .get(&role_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("role {} not found", role_id)))?;

        if !self.user_roles.write().insert((user_id, role_id)) {
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
                role_name: role.name,
            },
        );
        if let Err(e) = self.append(event).await {
            self.user_roles.write().remove(&(user_id, role_id));
            return Err(e);
        }

        let user = {
            let mut users = self.users.write();
            let user = users
                .get_mut(&user_id)
                .ok_or_else(|| StorageError::NotFound(format!("user {} not found", user_id)))?;
            user.updated_at = Utc::now();
            user.clone()
        };
        Ok(self.with_roles(user))
    }

    // ============================================
    // Roles
    // ============================================

    pub async fn create_role(&self, input: CreateRoleRow) -> Result<RoleRow, StorageError> {
        let role = {
            let mut roles = self.roles.write();
            if roles.values().any(|r| r.name == input.name) {
                return Err(StorageError::Conflict("role name already exists".into()));
            }
            let role = RoleRow {
                role_id: self.next_role_id.fetch_add(1, Ordering::SeqCst),
                name: input.name,
                description: input.description,
                created_at: Utc::now(),
            };
            roles.insert(role.role_id, role.clone());
            role
        };

        let event = NewEvent::from_payload(
            subject::ROLES_CREATE,
            &RoleCreatedData {
                role_id: role.role_id,
                name: role.name.clone(),
            },
        );
        if let Err(e) = self.append(event).await {
            self.roles.write().remove(&role.role_id);
            return Err(e);
        }

        Ok(role)
    }

    pub async fn get_role(&self, role_id: i64) -> Result<Option<RoleRow>, StorageError> {
        Ok(self.roles.read().get(&role_id).cloned())
    }

    pub async fn list_roles(&self) -> Result<Vec<RoleRow>, StorageError> {
        Ok(self.roles.read().values().cloned().collect())
    }

    // ============================================
    // Helpers
    // ============================================

    async fn append(&self, event: Result<NewEvent, serde_json::Error>) -> Result<(), StorageError> {
        self.events.append(event?).await?;
        Ok(())
    }

    fn roles_by_ids(&self, role_ids: &[i64]) -> Result<Vec<RoleRow>, StorageError> {
        let roles = self.roles.read();
        role_ids
            .iter()
            .map(|id| {
                roles
                    .get(id)
                    .cloned()
                    .ok_or_else(|| StorageError::NotFound(format!("role {} not found", id)))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|mut found| {
                found.sort_by_key(|r| r.role_id);
                found
            })
    }

    fn with_roles(&self, user: UserRow) -> UserWithRoles {
        let role_ids: Vec<i64> = self
            .user_roles
            .read()
            .range((user.user_id, i64::MIN)..=(user.user_id, i64::MAX))
            .map(|(_, role_id)| *role_id)
            .collect();
        let roles = self.roles.read();
        UserWithRoles {
            roles: role_ids
                .iter()
                .filter_map(|id| roles.get(id).cloned())
                .collect(),
            user,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use userrole_core::ROLE_ASSIGNED;

    fn user_input(username: &str) -> CreateUserRow {
        CreateUserRow {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password_hash: None,
            first_name: None,
            last_name: None,
            active: true,
        }
    }

    fn role_input(name: &str) -> CreateRoleRow {
        CreateRoleRow {
            name: name.to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_create_user_appends_event() {
        let db = InMemoryDatabase::new();
        let admin = db.create_role(role_input("admin")).await.unwrap();

        let created = db
            .create_user(user_input("jdoe"), &[admin.role_id])
            .await
            .unwrap();
        assert_eq!(created.user.user_id, 1);
        assert_eq!(created.roles.len(), 1);

        let events = db.events().scan_unprocessed(5, 10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, "UserCreated");
        assert_eq!(events[1].subject, "users/create");
        let data: UserCreatedData = events[1].payload().unwrap();
        assert_eq!(data.user_id, 1);
        assert_eq!(data.roles, vec!["admin".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_role_writes_nothing() {
        let db = InMemoryDatabase::new();

        let err = db.create_user(user_input("jdoe"), &[42]).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
        assert!(db.list_users(None).await.unwrap().is_empty());
        assert!(db.events().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_username_and_email() {
        let db = InMemoryDatabase::new();
        db.create_user(user_input("jdoe"), &[]).await.unwrap();

        let err = db.create_user(user_input("jdoe"), &[]).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(ref m) if m == "username already exists"));

        let mut other = user_input("other");
        other.email = "jdoe@example.com".to_string();
        let err = db.create_user(other, &[]).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(ref m) if m == "email already exists"));
        assert_eq!(db.events().len(), 1);
    }

    #[tokio::test]
    async fn test_assign_role() {
        let db = InMemoryDatabase::new();
        let user = db.create_user(user_input("jdoe"), &[]).await.unwrap();
        let role = db.create_role(role_input("auditor")).await.unwrap();

        let updated = db.assign_role(user.user.user_id, role.role_id).await.unwrap();
        assert_eq!(updated.roles.len(), 1);
        assert_eq!(updated.roles[0].name, "auditor");

        let err = db
            .assign_role(user.user.user_id, role.role_id)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        let err = db.assign_role(99, role.role_id).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));

        let events = db.events().scan_unprocessed(5, 10).await.unwrap();
        let assigned: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == ROLE_ASSIGNED)
            .collect();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].subject, "users/1/roles");
    }

    #[tokio::test]
    async fn test_list_users_search_newest_first() {
        let db = InMemoryDatabase::new();
        db.create_user(user_input("alice"), &[]).await.unwrap();
        db.create_user(user_input("bob"), &[]).await.unwrap();

        let all = db.list_users(None).await.unwrap();
        assert_eq!(all[0].user.username, "bob");
        assert_eq!(all[1].user.username, "alice");

        let found = db.list_users(Some(" ALI ")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user.username, "alice");
    }
}
