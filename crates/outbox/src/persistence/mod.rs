//! Persistence layer for the event store
//!
//! This module provides:
//! - [`EventStore`] trait with the append / mark-processed / scan operations
//! - [`InMemoryEventStore`] for dev mode and tests
//! - [`PostgresEventStore`] for production

mod memory;
mod postgres;
mod store;

pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{EventStore, StoreError};
