//! # Projects
//!
//! Projects own tasks and sprints. Besides CRUD this module serves the
//! project's Kanban board, its velocity over completed sprints and a
//! progress summary. The board and velocity helpers are shared with the
//! task and sprint routes.

use std::collections::HashMap;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use desk_core::{paginate, Page, PageRequest, ProjectKey, Role};
use desk_engine::{
    compute_velocity, Board, Card, ProjectProgress, SprintOutcome, VelocityReport, DEFAULT_WINDOW,
};
use desk_state::{SprintStatus, TaskStatus};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{clean, ensure_user};
use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, require_non_empty, OrgContext, Validate};
use crate::records::{ProjectRecord, TaskRecord};
use crate::state::AppState;

const DEFAULT_FOCUS_FACTOR: f64 = 0.8;

fn validate_focus_factor(value: Option<f64>) -> Result<(), String> {
    match value {
        Some(f) if !(f > 0.0 && f <= 1.0) => Err(format!("focus_factor must be in (0, 1], got {f}")),
        _ => Ok(()),
    }
}

fn validate_wip_limits(limits: Option<&HashMap<TaskStatus, u32>>) -> Result<(), String> {
    match limits.and_then(|l| l.iter().find(|(_, limit)| **limit == 0)) {
        Some((status, _)) => Err(format!("WIP limit for {status} must be at least 1")),
        None => Ok(()),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProjectRequest {
    /// 2 to 10 upper-case letters or digits, starting with a letter.
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub lead_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    #[schema(value_type = Option<Object>)]
    pub wip_limits: Option<HashMap<TaskStatus, u32>>,
    /// Share of contracted hours available for sprint work. Defaults to 0.8.
    pub focus_factor: Option<f64>,
}

impl Validate for CreateProjectRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("name", &self.name)?;
        validate_focus_factor(self.focus_factor)?;
        validate_wip_limits(self.wip_limits.as_ref())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub lead_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    #[schema(value_type = Option<Object>)]
    pub wip_limits: Option<HashMap<TaskStatus, u32>>,
    pub focus_factor: Option<f64>,
}

impl Validate for UpdateProjectRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            require_non_empty("name", name)?;
        }
        validate_focus_factor(self.focus_factor)?;
        validate_wip_limits(self.wip_limits.as_ref())
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProjectQuery {
    /// Include archived projects (default false).
    pub include_archived: Option<bool>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BoardQuery {
    /// Restrict the board to one sprint; all project tasks otherwise.
    pub sprint_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VelocityQuery {
    /// Number of most recent completed sprints (default 3, 0 for all).
    pub window: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/pm/projects", get(list_projects).post(create_project))
        .route("/v1/pm/projects/{id}", get(get_project).put(update_project))
        .route("/v1/pm/projects/{id}/archive", post(archive_project))
        .route("/v1/pm/projects/{id}/board", get(get_board))
        .route("/v1/pm/projects/{id}/velocity", get(get_velocity))
        .route("/v1/pm/projects/{id}/progress", get(get_progress))
}

// -- Shared helpers -----------------------------------------------------------

/// Fetch a project that still accepts new work.
pub(crate) fn require_open_project(
    state: &AppState,
    org: Uuid,
    id: Uuid,
) -> Result<ProjectRecord, AppError> {
    let project = state.projects.require(org, id)?;
    if project.archived {
        return Err(AppError::Conflict(format!(
            "project {} is archived",
            project.key
        )));
    }
    Ok(project)
}

/// Board for the tasks of `project` in `sprint` (`None` is the backlog).
pub(crate) fn sprint_board(
    state: &AppState,
    org: Uuid,
    project: &ProjectRecord,
    sprint: Option<Uuid>,
) -> Board {
    let tasks = state
        .tasks
        .filter_scoped(org, |t| t.project_id == project.id && t.sprint_id == sprint);
    Board::build(tasks.iter().map(card), &project.wip_limits)
}

pub(crate) fn card(task: &TaskRecord) -> Card {
    Card {
        task_id: task.id,
        status: task.status,
        rank: task.rank,
    }
}

/// Completed sprints of a project as velocity inputs.
pub(crate) fn completed_sprint_outcomes(
    state: &AppState,
    org: Uuid,
    project_id: Uuid,
) -> Vec<SprintOutcome> {
    state
        .sprints
        .filter_scoped(org, |s| {
            s.project_id == project_id && s.status == SprintStatus::Completed
        })
        .into_iter()
        .map(|s| SprintOutcome {
            sprint_id: Some(s.id),
            name: Some(s.name),
            end_date: s.end_date,
            committed_points: s.committed_points,
            completed_points: s.completed_points,
        })
        .collect()
}

// -- Handlers -----------------------------------------------------------------

/// POST /v1/pm/projects: Create a project.
#[utoipa::path(
    post,
    path = "/v1/pm/projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = ProjectRecord),
        (status = 409, description = "Key already in use", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "projects"
)]
pub async fn create_project(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    body: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ProjectRecord>), AppError> {
    require_role(&caller, Role::Manager)?;
    let req = extract_validated_json(body)?;
    let key = ProjectKey::new(&req.key)?;
    if let Some(lead) = req.lead_id {
        ensure_user(&state, org, lead)?;
    }
    if let Some(team) = req.team_id {
        state.teams.require(org, team).map_err(|_| {
            AppError::Validation(format!("team {team} does not exist"))
        })?;
    }

    let now = Utc::now();
    let record = ProjectRecord {
        id: Uuid::new_v4(),
        org_id: org,
        key: key.to_string(),
        name: req.name.trim().to_string(),
        description: clean(req.description),
        lead_id: req.lead_id,
        team_id: req.team_id,
        archived: false,
        next_task_number: 1,
        wip_limits: req.wip_limits.unwrap_or_default(),
        focus_factor: req.focus_factor.unwrap_or(DEFAULT_FOCUS_FACTOR),
        created_at: now,
        updated_at: now,
    };
    if !state
        .projects
        .put_unless(record.clone(), |p| p.key == key.as_str())
    {
        return Err(AppError::Conflict(format!("project key {key} is already in use")));
    }
    state.persist(&record, "create", caller.user_id).await?;
    tracing::info!(project_id = %record.id, key = %record.key, "project created");
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /v1/pm/projects: List projects.
#[utoipa::path(
    get,
    path = "/v1/pm/projects",
    params(ProjectQuery),
    responses((status = 200, description = "Page of projects", body = serde_json::Value)),
    tag = "projects"
)]
pub async fn list_projects(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    query: Result<Query<ProjectQuery>, QueryRejection>,
) -> Result<Json<Page<ProjectRecord>>, AppError> {
    let q = extract_query(query)?;
    let include_archived = q.include_archived.unwrap_or(false);
    let projects = state
        .projects
        .filter_scoped(org, |p| include_archived || !p.archived);
    Ok(Json(paginate(projects, &PageRequest::new(q.limit, q.offset))))
}

/// GET /v1/pm/projects/{id}: Get a project.
#[utoipa::path(
    get,
    path = "/v1/pm/projects/{id}",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project found", body = ProjectRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "projects"
)]
pub async fn get_project(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ProjectRecord>, AppError> {
    state.projects.require(org, id).map(Json)
}

/// PUT /v1/pm/projects/{id}: Update a project. The key is immutable.
#[utoipa::path(
    put,
    path = "/v1/pm/projects/{id}",
    params(("id" = Uuid, Path, description = "Project ID")),
    request_body = UpdateProjectRequest,
    responses(
        (status = 200, description = "Project updated", body = ProjectRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "projects"
)]
pub async fn update_project(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateProjectRequest>, JsonRejection>,
) -> Result<Json<ProjectRecord>, AppError> {
    require_role(&caller, Role::Manager)?;
    let req = extract_validated_json(body)?;
    if let Some(lead) = req.lead_id {
        ensure_user(&state, org, lead)?;
    }
    if let Some(team) = req.team_id {
        state.teams.require(org, team).map_err(|_| {
            AppError::Validation(format!("team {team} does not exist"))
        })?;
    }

    let record = state.projects.mutate(org, id, |p| {
        if let Some(name) = req.name {
            p.name = name.trim().to_string();
        }
        if req.description.is_some() {
            p.description = clean(req.description);
        }
        if req.lead_id.is_some() {
            p.lead_id = req.lead_id;
        }
        if req.team_id.is_some() {
            p.team_id = req.team_id;
        }
        if let Some(limits) = req.wip_limits {
            p.wip_limits = limits;
        }
        if let Some(focus) = req.focus_factor {
            p.focus_factor = focus;
        }
        p.updated_at = Utc::now();
        Ok(p.clone())
    })?;
    state.persist(&record, "update", caller.user_id).await?;
    Ok(Json(record))
}

/// POST /v1/pm/projects/{id}/archive: Archive a project.
#[utoipa::path(
    post,
    path = "/v1/pm/projects/{id}/archive",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project archived", body = ProjectRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already archived or sprint active", body = crate::error::ErrorBody),
    ),
    tag = "projects"
)]
pub async fn archive_project(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ProjectRecord>, AppError> {
    require_role(&caller, Role::Manager)?;
    let active = state
        .sprints
        .filter_scoped(org, |s| s.project_id == id && s.status == SprintStatus::Active);
    if let Some(sprint) = active.first() {
        return Err(AppError::Conflict(format!(
            "sprint '{}' is still active",
            sprint.name
        )));
    }

    let record = state.projects.mutate(org, id, |p| {
        if p.archived {
            return Err(AppError::Conflict(format!("project {} is already archived", p.key)));
        }
        p.archived = true;
        p.updated_at = Utc::now();
        Ok(p.clone())
    })?;
    state.persist(&record, "archive", caller.user_id).await?;
    Ok(Json(record))
}

/// GET /v1/pm/projects/{id}/board: Kanban board.
#[utoipa::path(
    get,
    path = "/v1/pm/projects/{id}/board",
    params(("id" = Uuid, Path, description = "Project ID"), BoardQuery),
    responses(
        (status = 200, description = "Board columns in workflow order", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "projects"
)]
pub async fn get_board(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
    query: Result<Query<BoardQuery>, QueryRejection>,
) -> Result<Json<Board>, AppError> {
    let q = extract_query(query)?;
    let project = state.projects.require(org, id)?;
    let board = match q.sprint_id {
        Some(sprint_id) => {
            let sprint = state.sprints.require(org, sprint_id)?;
            if sprint.project_id != project.id {
                return Err(AppError::Validation(format!(
                    "sprint {sprint_id} belongs to another project"
                )));
            }
            sprint_board(&state, org, &project, Some(sprint_id))
        }
        None => {
            let tasks = state.tasks.filter_scoped(org, |t| t.project_id == project.id);
            Board::build(tasks.iter().map(card), &project.wip_limits)
        }
    };
    Ok(Json(board))
}

/// GET /v1/pm/projects/{id}/velocity: Velocity over completed sprints.
#[utoipa::path(
    get,
    path = "/v1/pm/projects/{id}/velocity",
    params(("id" = Uuid, Path, description = "Project ID"), VelocityQuery),
    responses(
        (status = 200, description = "Velocity report", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "projects"
)]
pub async fn get_velocity(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
    query: Result<Query<VelocityQuery>, QueryRejection>,
) -> Result<Json<VelocityReport>, AppError> {
    let q = extract_query(query)?;
    let project = state.projects.require(org, id)?;
    let outcomes = completed_sprint_outcomes(&state, org, project.id);
    Ok(Json(compute_velocity(
        &outcomes,
        q.window.unwrap_or(DEFAULT_WINDOW),
    )))
}

/// GET /v1/pm/projects/{id}/progress: Task and point completion.
#[utoipa::path(
    get,
    path = "/v1/pm/projects/{id}/progress",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Progress summary", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "projects"
)]
pub async fn get_progress(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ProjectProgress>, AppError> {
    let project = state.projects.require(org, id)?;
    let tasks = state.tasks.filter_scoped(org, |t| t.project_id == project.id);
    Ok(Json(ProjectProgress::from_tasks(
        tasks.iter().map(|t| (t.status, t.story_points)),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focus_factor_bounds() {
        assert!(validate_focus_factor(None).is_ok());
        assert!(validate_focus_factor(Some(1.0)).is_ok());
        assert!(validate_focus_factor(Some(0.0)).is_err());
        assert!(validate_focus_factor(Some(1.2)).is_err());
    }

    #[test]
    fn zero_wip_limit_is_rejected() {
        let mut limits = HashMap::new();
        limits.insert(TaskStatus::InProgress, 3);
        assert!(validate_wip_limits(Some(&limits)).is_ok());
        limits.insert(TaskStatus::InReview, 0);
        assert!(validate_wip_limits(Some(&limits)).is_err());
    }
}
