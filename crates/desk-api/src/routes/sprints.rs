//! # Sprints
//!
//! Time-boxed iterations of a project. Lifecycle endpoints drive the sprint
//! state machine (`PLANNED -> ACTIVE -> COMPLETED`, or `CANCELLED`):
//!
//! - `start` snapshots the committed story points. A project has at most
//!   one active sprint.
//! - `complete` records the points actually done and moves unfinished
//!   tasks to another open sprint of the project, or back to the backlog.
//! - `cancel` returns every task of the sprint to the backlog.
//!
//! `capacity` and `burndown` are read-only planning views computed by
//! `desk-engine` from the sprint's members, leave and tasks.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use desk_core::{paginate, working_dates, Page, PageRequest, Role};
use desk_engine::{
    burndown, compute_capacity, compute_velocity, BurndownPoint, CapacityInput, CapacityReport,
    Completion, MemberAvailability, DEFAULT_WINDOW,
};
use desk_state::{transition, LeaveStatus, SprintStatus};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::clean;
use super::projects::{completed_sprint_outcomes, require_open_project};
use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, require_non_empty, OrgContext, Validate};
use crate::records::{SprintRecord, TaskRecord};
use crate::state::AppState;

fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<(), String> {
    if end < start {
        Err(format!("end_date {end} is before start_date {start}"))
    } else {
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSprintRequest {
    pub project_id: Uuid,
    pub name: String,
    pub goal: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Validate for CreateSprintRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("name", &self.name)?;
        validate_range(self.start_date, self.end_date)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSprintRequest {
    pub name: Option<String>,
    pub goal: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl Validate for UpdateSprintRequest {
    fn validate(&self) -> Result<(), String> {
        match &self.name {
            Some(name) => require_non_empty("name", name),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CompleteSprintRequest {
    /// Open sprint of the same project receiving unfinished tasks. The
    /// backlog receives them when absent.
    pub move_incomplete_to: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CancelSprintRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CompleteSprintResponse {
    pub sprint: SprintRecord,
    /// Unfinished tasks that left the sprint.
    pub moved_task_ids: Vec<Uuid>,
    /// Where they went; `null` is the backlog.
    pub moved_to: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SprintQuery {
    pub project_id: Option<Uuid>,
    #[param(value_type = Option<String>)]
    pub status: Option<SprintStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CapacityQuery {
    /// Override the project's focus factor for this calculation.
    pub focus_factor: Option<f64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/pm/sprints", get(list_sprints).post(create_sprint))
        .route("/v1/pm/sprints/{id}", get(get_sprint).put(update_sprint))
        .route("/v1/pm/sprints/{id}/start", post(start_sprint))
        .route("/v1/pm/sprints/{id}/complete", post(complete_sprint))
        .route("/v1/pm/sprints/{id}/cancel", post(cancel_sprint))
        .route("/v1/pm/sprints/{id}/capacity", get(get_capacity))
        .route("/v1/pm/sprints/{id}/burndown", get(get_burndown))
}

fn sprint_tasks(state: &AppState, org: Uuid, sprint_id: Uuid) -> Vec<TaskRecord> {
    state
        .tasks
        .filter_scoped(org, |t| t.sprint_id == Some(sprint_id))
}

fn points(tasks: &[TaskRecord]) -> f64 {
    tasks.iter().filter_map(|t| t.story_points).sum()
}

/// Detach tasks from their sprint, reassigning them to `to`.
async fn move_tasks(
    state: &AppState,
    org: Uuid,
    tasks: &[TaskRecord],
    to: Option<Uuid>,
    actor: Option<Uuid>,
) -> Result<Vec<Uuid>, AppError> {
    let mut moved = Vec::with_capacity(tasks.len());
    for task in tasks {
        let record = state.tasks.mutate(org, task.id, |t| {
            t.sprint_id = to;
            t.updated_at = Utc::now();
            Ok(t.clone())
        })?;
        state.persist(&record, "move_sprint", actor).await?;
        moved.push(record.id);
    }
    Ok(moved)
}

/// POST /v1/pm/sprints: Plan a sprint.
#[utoipa::path(
    post,
    path = "/v1/pm/sprints",
    request_body = CreateSprintRequest,
    responses(
        (status = 201, description = "Sprint planned", body = SprintRecord),
        (status = 409, description = "Project archived", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "sprints"
)]
pub async fn create_sprint(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    body: Result<Json<CreateSprintRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SprintRecord>), AppError> {
    require_role(&caller, Role::Manager)?;
    let req = extract_validated_json(body)?;
    let project = require_open_project(&state, org, req.project_id)?;

    let now = Utc::now();
    let record = SprintRecord {
        id: Uuid::new_v4(),
        org_id: org,
        project_id: project.id,
        name: req.name.trim().to_string(),
        goal: clean(req.goal),
        start_date: req.start_date,
        end_date: req.end_date,
        status: SprintStatus::Planned,
        committed_points: 0.0,
        completed_points: 0.0,
        started_at: None,
        completed_at: None,
        history: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    state.sprints.put(record.clone());
    state.persist(&record, "create", caller.user_id).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /v1/pm/sprints: List sprints.
#[utoipa::path(
    get,
    path = "/v1/pm/sprints",
    params(SprintQuery),
    responses((status = 200, description = "Page of sprints", body = serde_json::Value)),
    tag = "sprints"
)]
pub async fn list_sprints(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    query: Result<Query<SprintQuery>, QueryRejection>,
) -> Result<Json<Page<SprintRecord>>, AppError> {
    let q = extract_query(query)?;
    let sprints = state.sprints.filter_scoped(org, |s| {
        q.project_id.map_or(true, |p| s.project_id == p) && q.status.map_or(true, |st| s.status == st)
    });
    Ok(Json(paginate(sprints, &PageRequest::new(q.limit, q.offset))))
}

/// GET /v1/pm/sprints/{id}: Get a sprint.
#[utoipa::path(
    get,
    path = "/v1/pm/sprints/{id}",
    params(("id" = Uuid, Path, description = "Sprint ID")),
    responses(
        (status = 200, description = "Sprint found", body = SprintRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "sprints"
)]
pub async fn get_sprint(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
) -> Result<Json<SprintRecord>, AppError> {
    state.sprints.require(org, id).map(Json)
}

/// PUT /v1/pm/sprints/{id}: Edit a sprint that has not started.
#[utoipa::path(
    put,
    path = "/v1/pm/sprints/{id}",
    params(("id" = Uuid, Path, description = "Sprint ID")),
    request_body = UpdateSprintRequest,
    responses(
        (status = 200, description = "Sprint updated", body = SprintRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Sprint already started", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "sprints"
)]
pub async fn update_sprint(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateSprintRequest>, JsonRejection>,
) -> Result<Json<SprintRecord>, AppError> {
    require_role(&caller, Role::Manager)?;
    let req = extract_validated_json(body)?;
    let record = state.sprints.mutate(org, id, |s| {
        if s.status != SprintStatus::Planned {
            return Err(AppError::Conflict(format!(
                "sprint is {}; only planned sprints can be edited",
                s.status
            )));
        }
        let start = req.start_date.unwrap_or(s.start_date);
        let end = req.end_date.unwrap_or(s.end_date);
        validate_range(start, end).map_err(AppError::Validation)?;
        s.start_date = start;
        s.end_date = end;
        if let Some(name) = req.name {
            s.name = name.trim().to_string();
        }
        if req.goal.is_some() {
            s.goal = clean(req.goal);
        }
        s.updated_at = Utc::now();
        Ok(s.clone())
    })?;
    state.persist(&record, "update", caller.user_id).await?;
    Ok(Json(record))
}

/// POST /v1/pm/sprints/{id}/start: Start a planned sprint.
#[utoipa::path(
    post,
    path = "/v1/pm/sprints/{id}/start",
    params(("id" = Uuid, Path, description = "Sprint ID")),
    responses(
        (status = 200, description = "Sprint started", body = SprintRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Invalid transition or another sprint is active", body = crate::error::ErrorBody),
    ),
    tag = "sprints"
)]
pub async fn start_sprint(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<SprintRecord>, AppError> {
    require_role(&caller, Role::Manager)?;
    let sprint = state.sprints.require(org, id)?;
    require_open_project(&state, org, sprint.project_id)?;
    let committed = points(&sprint_tasks(&state, org, id));

    let record = state.sprints.mutate_among(org, id, |s, others| {
        let active = others
            .iter()
            .find(|o| o.project_id == s.project_id && o.status == SprintStatus::Active);
        if let Some(other) = active {
            return Err(AppError::Conflict(format!(
                "sprint '{}' is already active in this project",
                other.name
            )));
        }
        transition(&mut s.status, SprintStatus::Active, &mut s.history, caller.user_id, None)?;
        let now = Utc::now();
        s.committed_points = committed;
        s.started_at = Some(now);
        s.updated_at = now;
        Ok(s.clone())
    })?;
    state.persist(&record, "start", caller.user_id).await?;
    tracing::info!(sprint_id = %id, committed_points = committed, "sprint started");
    Ok(Json(record))
}

/// POST /v1/pm/sprints/{id}/complete: Close an active sprint.
#[utoipa::path(
    post,
    path = "/v1/pm/sprints/{id}/complete",
    params(("id" = Uuid, Path, description = "Sprint ID")),
    request_body = CompleteSprintRequest,
    responses(
        (status = 200, description = "Sprint completed", body = CompleteSprintResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Sprint not active", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid target sprint", body = crate::error::ErrorBody),
    ),
    tag = "sprints"
)]
pub async fn complete_sprint(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Option<Json<CompleteSprintRequest>>,
) -> Result<Json<CompleteSprintResponse>, AppError> {
    require_role(&caller, Role::Manager)?;
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let sprint = state.sprints.require(org, id)?;

    if let Some(target_id) = req.move_incomplete_to {
        if target_id == id {
            return Err(AppError::Validation(
                "move_incomplete_to must name a different sprint".into(),
            ));
        }
        let target = state.sprints.require(org, target_id).map_err(|_| {
            AppError::Validation(format!("target sprint {target_id} does not exist"))
        })?;
        if target.project_id != sprint.project_id {
            return Err(AppError::Validation(
                "target sprint belongs to another project".into(),
            ));
        }
        if !matches!(target.status, SprintStatus::Planned | SprintStatus::Active) {
            return Err(AppError::Validation(format!(
                "target sprint is {} and cannot receive tasks",
                target.status
            )));
        }
    }

    let tasks = sprint_tasks(&state, org, id);
    let completed: f64 = tasks
        .iter()
        .filter(|t| t.status.is_done())
        .filter_map(|t| t.story_points)
        .sum();

    let record = state.sprints.mutate(org, id, |s| {
        transition(&mut s.status, SprintStatus::Completed, &mut s.history, caller.user_id, None)?;
        let now = Utc::now();
        s.completed_points = completed;
        s.completed_at = Some(now);
        s.updated_at = now;
        Ok(s.clone())
    })?;
    state.persist(&record, "complete", caller.user_id).await?;

    let unfinished: Vec<TaskRecord> = tasks.into_iter().filter(|t| !t.status.is_done()).collect();
    let moved_task_ids =
        move_tasks(&state, org, &unfinished, req.move_incomplete_to, caller.user_id).await?;
    tracing::info!(
        sprint_id = %id,
        completed_points = completed,
        moved = moved_task_ids.len(),
        "sprint completed"
    );

    Ok(Json(CompleteSprintResponse {
        sprint: record,
        moved_task_ids,
        moved_to: req.move_incomplete_to,
    }))
}

/// POST /v1/pm/sprints/{id}/cancel: Cancel a sprint; its tasks return to the backlog.
#[utoipa::path(
    post,
    path = "/v1/pm/sprints/{id}/cancel",
    params(("id" = Uuid, Path, description = "Sprint ID")),
    request_body = CancelSprintRequest,
    responses(
        (status = 200, description = "Sprint cancelled", body = SprintRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Sprint already closed", body = crate::error::ErrorBody),
    ),
    tag = "sprints"
)]
pub async fn cancel_sprint(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelSprintRequest>>,
) -> Result<Json<SprintRecord>, AppError> {
    require_role(&caller, Role::Manager)?;
    let reason = body.and_then(|Json(r)| clean(r.reason));
    let record = state.sprints.mutate(org, id, |s| {
        transition(&mut s.status, SprintStatus::Cancelled, &mut s.history, caller.user_id, reason)?;
        s.updated_at = Utc::now();
        Ok(s.clone())
    })?;
    state.persist(&record, "cancel", caller.user_id).await?;
    let tasks = sprint_tasks(&state, org, id);
    move_tasks(&state, org, &tasks, None, caller.user_id).await?;
    Ok(Json(record))
}

/// GET /v1/pm/sprints/{id}/capacity: Team capacity and point forecast.
///
/// Members are the project team's active users; approved leave inside the
/// sprint is subtracted, and the forecast uses the project's velocity over
/// its last completed sprints.
#[utoipa::path(
    get,
    path = "/v1/pm/sprints/{id}/capacity",
    params(("id" = Uuid, Path, description = "Sprint ID"), CapacityQuery),
    responses(
        (status = 200, description = "Capacity report", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid focus factor", body = crate::error::ErrorBody),
    ),
    tag = "sprints"
)]
pub async fn get_capacity(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
    query: Result<Query<CapacityQuery>, QueryRejection>,
) -> Result<Json<CapacityReport>, AppError> {
    let q = extract_query(query)?;
    let sprint = state.sprints.require(org, id)?;
    let project = state.projects.require(org, sprint.project_id)?;

    let member_ids = project
        .team_id
        .and_then(|team| state.teams.get_scoped(org, &team))
        .map(|team| team.member_ids)
        .unwrap_or_default();
    let members = member_ids
        .iter()
        .filter_map(|user_id| state.users.get_scoped(org, user_id))
        .filter(|u| u.active)
        .map(|u| {
            let leave_dates = state
                .leave_requests
                .filter_scoped(org, |l| {
                    l.user_id == u.id
                        && l.status == LeaveStatus::Approved
                        && l.overlaps(sprint.start_date, sprint.end_date)
                })
                .into_iter()
                .flat_map(|l| working_dates(l.start_date, l.end_date))
                .collect();
            MemberAvailability {
                user_id: u.id,
                name: Some(u.name),
                hours_per_day: u.hours_per_day,
                allocation: 1.0,
                leave_dates,
            }
        })
        .collect();

    let committed_points = match sprint.status {
        SprintStatus::Planned => points(&sprint_tasks(&state, org, id)),
        _ => sprint.committed_points,
    };
    let velocity = compute_velocity(
        &completed_sprint_outcomes(&state, org, project.id),
        DEFAULT_WINDOW,
    );

    let input = CapacityInput {
        start_date: sprint.start_date,
        end_date: sprint.end_date,
        focus_factor: q.focus_factor.unwrap_or(project.focus_factor),
        members,
        committed_points,
        average_velocity: (velocity.sprints_considered > 0).then_some(velocity.average),
        historical_focus_hours: None,
    };
    Ok(Json(compute_capacity(&input)?))
}

/// GET /v1/pm/sprints/{id}/burndown: Remaining versus ideal points per working day.
#[utoipa::path(
    get,
    path = "/v1/pm/sprints/{id}/burndown",
    params(("id" = Uuid, Path, description = "Sprint ID")),
    responses(
        (status = 200, description = "Burndown series", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "sprints"
)]
pub async fn get_burndown(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<BurndownPoint>>, AppError> {
    let sprint = state.sprints.require(org, id)?;
    let tasks = sprint_tasks(&state, org, id);
    let total = match sprint.status {
        SprintStatus::Planned => points(&tasks),
        _ => sprint.committed_points,
    };
    let completions: Vec<Completion> = tasks
        .iter()
        .filter(|t| t.status.is_done())
        .filter_map(|t| {
            Some(Completion {
                date: t.completed_at?.date_naive(),
                points: t.story_points?,
            })
        })
        .collect();
    Ok(Json(burndown(sprint.start_date, sprint.end_date, total, &completions)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(validate_range(d(3), d(14)).is_ok());
        assert!(validate_range(d(3), d(3)).is_ok());
        assert!(validate_range(d(14), d(3)).is_err());
    }

    #[test]
    fn complete_request_body_is_optional_fields() {
        let req: CompleteSprintRequest = serde_json::from_str("{}").unwrap();
        assert!(req.move_incomplete_to.is_none());
    }
}
