// Userrole control plane library
// Decision: Shared library for binaries (API server, OpenAPI export)

// API routes and types (shared for OpenAPI generation)
pub mod api;

// Router assembly
pub mod app;

pub mod config;

// Services layer
pub mod services;
pub use services::{EventService, RoleService, UserService};

// Storage layer
pub mod storage;

// OpenAPI spec generation
pub mod openapi;
