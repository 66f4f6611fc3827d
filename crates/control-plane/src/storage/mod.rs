// Storage layer for the userrole control-plane
// Decision: Support both PostgreSQL (production) and in-memory (dev mode)
//
// Users, roles and user_roles live here; the event_store table is owned by
// userrole-outbox and written through it inside the same transaction.

pub mod backend;
pub mod memory;
pub mod models;
pub mod password;
pub mod repositories;

pub use backend::StorageBackend;
pub use memory::InMemoryDatabase;
pub use models::*;
pub use repositories::Database;
