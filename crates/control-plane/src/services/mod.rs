// Services layer for business logic
// Services own business logic and validation, calling storage directly

pub mod event;
pub mod role;
pub mod user;

pub use event::EventService;
pub use role::RoleService;
pub use user::UserService;

use crate::storage::StorageError;
use userrole_outbox::StoreError;

/// Errors surfaced to the HTTP layer
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Request is well-formed JSON but semantically invalid
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Storage or event store failure; details are logged, not returned
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Conflict(m) => Self::Conflict(m),
            StorageError::NotFound(m) => Self::NotFound(m),
            StorageError::Event(e) => Self::Internal(e.to_string()),
            StorageError::Internal(e) => Self::Internal(format!("{:#}", e)),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        Self::Internal(e.to_string())
    }
}
