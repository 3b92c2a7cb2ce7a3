//! # API Route Modules
//!
//! One module per resource family. Every handler takes the caller's
//! [`OrgContext`](crate::extractors::OrgContext) and reads and writes only
//! that organization's records.
//!
//! - `users`, `teams`: directory.
//! - `projects`, `sprints`, `tasks`: project management, boards, planning.
//! - `incidents`, `problems`, `changes`, `releases`: ITSM tickets.
//! - `slas`, `catalog`: SLA policies and the service catalog.
//! - `workflows`: configurable workflows and their instances.
//! - `leave`: leave requests and approvals.
//! - `notifications`: per-user inbox.
//! - `reports`: dashboards.

pub mod catalog;
pub mod changes;
pub mod incidents;
pub mod leave;
pub mod notifications;
pub mod problems;
pub mod projects;
pub mod releases;
pub mod reports;
pub mod slas;
pub mod sprints;
pub mod tasks;
pub mod teams;
pub mod users;
pub mod workflows;

use uuid::Uuid;

use crate::error::AppError;
use crate::records::UserRecord;
use crate::state::AppState;

/// Resolve a user id referenced by a request body, e.g. an assignee.
pub(crate) fn ensure_user(state: &AppState, org: Uuid, user_id: Uuid) -> Result<UserRecord, AppError> {
    state
        .users
        .get_scoped(org, &user_id)
        .filter(|u| u.active)
        .ok_or_else(|| {
            AppError::Validation(format!(
                "user {user_id} is not an active member of this organization"
            ))
        })
}

/// Trim an optional text field, treating blank as absent.
pub(crate) fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
