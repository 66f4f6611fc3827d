//! Event consumer
//!
//! This module provides:
//! - [`OutboxWorker`] - Claim, dispatch and report loop
//! - [`HandlerRegistry`] - Event type to [`EventHandler`] routing
//! - [`PollerConfig`] - Polling with exponential backoff
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                  OutboxWorker                 │
//! │  ┌─────────────┐                              │
//! │  │ EventPoller │ claim_unprocessed (lease)    │
//! │  └──────┬──────┘                              │
//! │         ▼                                     │
//! │  ┌─────────────────────────────────────────┐  │
//! │  │ HandlerRegistry (timeout per handler)   │  │
//! │  └──────┬──────────────────────────────────┘  │
//! │         ▼                                     │
//! │  mark_processed(outcome), once per delivery   │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Records are processed one at a time in claim order, so a single consumer
//! observes events for the same user in the order they were appended.

mod handler;
mod poller;
mod runner;

pub use handler::{EventHandler, HandlerError, HandlerRegistry, LoggingHandler};
pub use poller::{EventPoller, PollerConfig, PollerError};
pub use runner::{OutboxWorker, ShutdownHandle, WorkerStats};
