//! # Event Store
//!
//! An outbox-style table recording domain events for later asynchronous
//! processing, plus the consumer side that drains it.
//!
//! ## Lifecycle
//!
//! ```text
//!         append()
//! [none] ─────────────→ [pending, attempts=0]
//!                            │ mark_processed(Failed)
//!                            ├──────────────────────→ [pending, attempts=n+1]
//!                            │ mark_processed(Succeeded)
//!                            └──────────────────────→ [processed]
//! [pending, attempts >= max_attempts] = exhausted (excluded from scans)
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐        ┌──────────────────────────────┐
//! │  request handlers    │ append │          EventStore          │
//! │  (control-plane)     ├───────►│  (PostgreSQL / in-memory)    │
//! └──────────────────────┘        └──────────────┬───────────────┘
//!                                  claim / mark  │
//!                                 ┌──────────────▼───────────────┐
//!                                 │         OutboxWorker          │
//!                                 │  EventPoller → HandlerRegistry│
//!                                 └──────────────────────────────┘
//! ```
//!
//! Delivery is at-least-once: a record may reach a handler more than once.
//!
//! ## Example
//!
//! ```
//! use userrole_core::{NewEvent, ProcessingOutcome};
//! use userrole_outbox::{EventStore, InMemoryEventStore};
//!
//! # tokio_test_block_on(async {
//! let store = InMemoryEventStore::new();
//! let id = store
//!     .append(NewEvent::new("UserCreated", "users/create", r#"{"id":1}"#))
//!     .await?;
//!
//! let batch = store.scan_unprocessed(3, 10).await?;
//! assert_eq!(batch[0].event_id, id);
//!
//! store.mark_processed(id, ProcessingOutcome::Succeeded).await?;
//! assert!(store.scan_unprocessed(3, 10).await?.is_empty());
//! # Ok::<(), userrole_outbox::StoreError>(())
//! # }).unwrap();
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod persistence;
pub mod worker;

pub use persistence::{EventStore, InMemoryEventStore, PostgresEventStore, StoreError};
pub use worker::{
    EventHandler, EventPoller, HandlerError, HandlerRegistry, LoggingHandler, OutboxWorker,
    PollerConfig, PollerError, ShutdownHandle, WorkerStats,
};
