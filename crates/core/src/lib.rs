// Core domain types for userrole
//
// Key design decisions:
// - Event records describe one domain occurrence and its processing state
// - The event payload is opaque text to the store; typed payloads live here
// - Users and roles are plain entities shared by the API and the worker

pub mod event;
pub mod telemetry;
pub mod user;

pub use event::{
    EventId, EventPayload, EventRecord, EventStatus, InvalidEvent, NewEvent, ProcessingOutcome,
    RoleAssignedData, RoleCreatedData, UserCreatedData, ROLE_ASSIGNED, ROLE_CREATED,
    USER_CREATED,
};
pub use user::{Role, User};
