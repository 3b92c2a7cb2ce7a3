//! # OpenAPI Document Assembly
//!
//! Collects every documented route into one OpenAPI 3.1 document served at
//! `/openapi.json`. `desk openapi` writes the same document to disk.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the bearer token security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "`Authorization: Bearer <role>:<user_id>:<secret>`, or the bare secret for admin access.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "servicedesk API",
        version = "0.1.0",
        description = "Multi-tenant service desk and project management backend.\n\nEvery `/v1/*` call needs a bearer token and an `X-Organization-ID` header. State-changing calls also need `X-CSRF-Token` when CSRF protection is enabled. Errors share one JSON envelope carrying a correlation id and timestamp.",
        license(name = "AGPL-3.0-or-later")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    paths(
        // ── Session ──────────────────────────────────────────────────
        crate::csrf::issue_token,
        // ── Directory ────────────────────────────────────────────────
        crate::routes::users::create_user,
        crate::routes::users::list_users,
        crate::routes::users::get_user,
        crate::routes::users::update_user,
        crate::routes::users::deactivate_user,
        crate::routes::teams::create_team,
        crate::routes::teams::list_teams,
        crate::routes::teams::get_team,
        crate::routes::teams::update_team,
        crate::routes::teams::delete_team,
        crate::routes::teams::list_members,
        crate::routes::teams::add_member,
        crate::routes::teams::remove_member,
        // ── Project management ───────────────────────────────────────
        crate::routes::projects::create_project,
        crate::routes::projects::list_projects,
        crate::routes::projects::get_project,
        crate::routes::projects::update_project,
        crate::routes::projects::archive_project,
        crate::routes::projects::get_board,
        crate::routes::projects::get_velocity,
        crate::routes::projects::get_progress,
        crate::routes::sprints::create_sprint,
        crate::routes::sprints::list_sprints,
        crate::routes::sprints::get_sprint,
        crate::routes::sprints::update_sprint,
        crate::routes::sprints::start_sprint,
        crate::routes::sprints::complete_sprint,
        crate::routes::sprints::cancel_sprint,
        crate::routes::sprints::get_capacity,
        crate::routes::sprints::get_burndown,
        crate::routes::tasks::create_task,
        crate::routes::tasks::list_tasks,
        crate::routes::tasks::get_task,
        crate::routes::tasks::update_task,
        crate::routes::tasks::delete_task,
        crate::routes::tasks::move_task,
        crate::routes::tasks::list_comments,
        crate::routes::tasks::add_comment,
        // ── ITSM ─────────────────────────────────────────────────────
        crate::routes::incidents::create_incident,
        crate::routes::incidents::list_incidents,
        crate::routes::incidents::get_incident,
        crate::routes::incidents::update_incident,
        crate::routes::incidents::transition_incident,
        crate::routes::incidents::assign_incident,
        crate::routes::incidents::get_incident_sla,
        crate::routes::problems::create_problem,
        crate::routes::problems::list_problems,
        crate::routes::problems::get_problem,
        crate::routes::problems::update_problem,
        crate::routes::problems::transition_problem,
        crate::routes::problems::link_incident,
        crate::routes::changes::create_change,
        crate::routes::changes::list_changes,
        crate::routes::changes::get_change,
        crate::routes::changes::update_change,
        crate::routes::changes::transition_change_status,
        crate::routes::releases::create_release,
        crate::routes::releases::list_releases,
        crate::routes::releases::get_release,
        crate::routes::releases::update_release,
        crate::routes::releases::transition_release,
        crate::routes::releases::link_change,
        crate::routes::slas::create_sla,
        crate::routes::slas::list_slas,
        crate::routes::slas::get_sla,
        crate::routes::slas::update_sla,
        crate::routes::slas::delete_sla,
        crate::routes::catalog::create_item,
        crate::routes::catalog::list_items,
        crate::routes::catalog::get_item,
        crate::routes::catalog::update_item,
        crate::routes::catalog::delete_item,
        crate::routes::catalog::request_item,
        // ── Workflows ────────────────────────────────────────────────
        crate::routes::workflows::create_workflow,
        crate::routes::workflows::list_workflows,
        crate::routes::workflows::get_workflow,
        crate::routes::workflows::update_workflow,
        crate::routes::workflows::delete_workflow,
        crate::routes::workflows::start_instance,
        crate::routes::workflows::list_instances,
        crate::routes::workflows::get_instance,
        crate::routes::workflows::advance_instance,
        // ── People ───────────────────────────────────────────────────
        crate::routes::leave::create_leave,
        crate::routes::leave::list_leave,
        crate::routes::leave::get_leave,
        crate::routes::leave::approve_leave,
        crate::routes::leave::reject_leave,
        crate::routes::leave::cancel_leave,
        crate::routes::notifications::list_notifications,
        crate::routes::notifications::unread_count,
        crate::routes::notifications::mark_read,
        crate::routes::notifications::mark_all_read,
        // ── Reports ──────────────────────────────────────────────────
        crate::routes::reports::summary,
        crate::routes::reports::incident_report,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::csrf::CsrfToken,
        crate::records::UserRecord,
        crate::records::TeamRecord,
        crate::records::ProjectRecord,
        crate::records::SprintRecord,
        crate::records::TaskRecord,
        crate::records::CommentRecord,
        crate::records::IncidentRecord,
        crate::records::ProblemRecord,
        crate::records::ChangeRecord,
        crate::records::ReleaseRecord,
        crate::records::SlaPolicyRecord,
        crate::records::CatalogField,
        crate::records::CatalogItemRecord,
        crate::records::WorkflowRecord,
        crate::records::WorkflowInstanceRecord,
        crate::records::LeaveRequestRecord,
        crate::records::NotificationKind,
        crate::records::NotificationRecord,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "security", description = "CSRF token issuance"),
        (name = "users", description = "Organization members"),
        (name = "teams", description = "Teams and membership"),
        (name = "projects", description = "Projects, boards, velocity and progress"),
        (name = "sprints", description = "Sprint lifecycle, capacity and burndown"),
        (name = "tasks", description = "Tasks, board moves and comments"),
        (name = "incidents", description = "Incidents and service requests with SLA clocks"),
        (name = "problems", description = "Problem management"),
        (name = "changes", description = "Change enablement with type-aware approval"),
        (name = "releases", description = "Releases and their changes"),
        (name = "slas", description = "SLA policies"),
        (name = "catalog", description = "Service catalog and ordering"),
        (name = "workflows", description = "Configurable workflows and instances"),
        (name = "leave", description = "Leave requests and approvals"),
        (name = "notifications", description = "Per-user notification inbox"),
        (name = "reports", description = "Dashboards and incident metrics"),
    )
)]
pub struct ApiDoc;

/// Serves the document at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_has_title_and_security_scheme() {
        let doc = ApiDoc::openapi();
        assert_eq!(doc.info.title, "servicedesk API");
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }

    #[test]
    fn document_covers_each_resource_family() {
        let doc = ApiDoc::openapi();
        for path in [
            "/v1/csrf-token",
            "/v1/users",
            "/v1/teams/{id}/members/{user_id}",
            "/v1/pm/projects/{id}/board",
            "/v1/pm/sprints/{id}/capacity",
            "/v1/pm/tasks/{id}/move",
            "/v1/itsm/incidents/{id}/sla",
            "/v1/itsm/problems/{id}/incidents",
            "/v1/itsm/changes/{id}/transition",
            "/v1/itsm/releases/{id}/changes",
            "/v1/itsm/slas/{id}",
            "/v1/itsm/catalog/{id}/requests",
            "/v1/workflow-instances/{id}/advance",
            "/v1/leave-requests/{id}/approve",
            "/v1/notifications/read-all",
            "/v1/reports/incidents",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn error_envelope_is_a_component() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.schemas.contains_key("ErrorBody"));
    }
}
