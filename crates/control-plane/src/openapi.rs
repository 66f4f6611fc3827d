// OpenAPI specification generation
//
// This module defines the OpenAPI spec for the userrole API.
// It can be used by both the main API server (for Swagger UI)
// and the export-openapi binary (for static spec generation).

use crate::api;
use crate::api::{ErrorResponse, ListResponse};
use userrole_core::{EventRecord, EventStatus, Role, User};
use utoipa::OpenApi;

/// OpenAPI documentation for the userrole API
#[derive(OpenApi)]
#[openapi(
    paths(
        api::users::create_user,
        api::users::list_users,
        api::users::get_user,
        api::users::assign_role,
        api::roles::create_role,
        api::roles::list_roles,
        api::roles::get_role,
        api::events::list_events,
        api::events::get_event,
    ),
    components(
        schemas(
            User, Role, EventRecord, EventStatus, ErrorResponse,
            api::users::CreateUserRequest,
            api::users::AssignRoleRequest,
            api::roles::CreateRoleRequest,
            api::events::EventResponse,
            ListResponse<User>,
            ListResponse<Role>,
            ListResponse<api::events::EventResponse>,
        )
    ),
    tags(
        (name = "users", description = "User management endpoints"),
        (name = "roles", description = "Role management endpoints"),
        (name = "events", description = "Event store inspection endpoints")
    ),
    info(
        title = "Userrole API",
        version = "0.1.0",
        description = "API for creating users and assigning roles, with an event store of domain events",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI spec as a pretty-printed JSON string
    pub fn to_json() -> Result<String, serde_json::Error> {
        Self::openapi().to_pretty_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_lists_paths() {
        let json: serde_json::Value = serde_json::from_str(&ApiDoc::to_json().unwrap()).unwrap();
        let paths = json["paths"].as_object().unwrap();
        assert!(paths.contains_key("/v1/users"));
        assert!(paths.contains_key("/v1/users/{user_id}/roles"));
        assert!(paths.contains_key("/v1/events/{event_id}"));
    }
}
