//! # Tasks
//!
//! Work items of a project. Task keys (`OPS-12`) are allocated from the
//! project's counter under its store lock, so two concurrent creates never
//! share a key.
//!
//! Status is not editable through `PUT`: it changes only through
//! `POST /v1/pm/tasks/{id}/move`, which places the card on the board of the
//! task's sprint (or the project backlog) and enforces WIP limits.

use std::collections::HashMap;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use desk_core::{paginate, Page, PageRequest, Priority, ProjectKey, Role};
use desk_engine::{BoardError, MoveOutcome};
use desk_state::{transition, SprintStatus, TaskStatus, TaskType};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::projects::{require_open_project, sprint_board};
use super::{clean, ensure_user};
use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{
    extract_json, extract_query, extract_validated_json, require_non_empty, OrgContext, PageParams,
    Validate,
};
use crate::records::{CommentRecord, NotificationKind, TaskRecord};
use crate::state::AppState;

fn validate_estimates(points: Option<f64>, hours: Option<f64>) -> Result<(), String> {
    if points.is_some_and(|p| p < 0.0 || p.is_nan()) {
        return Err("story_points must not be negative".into());
    }
    if hours.is_some_and(|h| h < 0.0 || h.is_nan()) {
        return Err("estimate_hours must not be negative".into());
    }
    Ok(())
}

fn normalize_labels(labels: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for label in labels {
        let label = label.trim().to_lowercase();
        if !label.is_empty() && !out.contains(&label) {
            out.push(label);
        }
    }
    out
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTaskRequest {
    pub project_id: Uuid,
    pub sprint_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = Option<String>)]
    pub task_type: Option<TaskType>,
    /// Defaults to `TODO` inside a sprint and `BACKLOG` outside one.
    #[schema(value_type = Option<String>)]
    pub status: Option<TaskStatus>,
    #[schema(value_type = Option<String>)]
    pub priority: Option<Priority>,
    pub assignee_id: Option<Uuid>,
    pub story_points: Option<f64>,
    pub estimate_hours: Option<f64>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub due_date: Option<NaiveDate>,
}

impl Validate for CreateTaskRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("title", &self.title)?;
        validate_estimates(self.story_points, self.estimate_hours)
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<String>)]
    pub task_type: Option<TaskType>,
    #[schema(value_type = Option<String>)]
    pub priority: Option<Priority>,
    pub assignee_id: Option<Uuid>,
    /// Clear the assignee.
    #[serde(default)]
    pub unassign: bool,
    pub story_points: Option<f64>,
    pub estimate_hours: Option<f64>,
    pub labels: Option<Vec<String>>,
    pub due_date: Option<NaiveDate>,
    /// Move the task into this sprint of the same project.
    pub sprint_id: Option<Uuid>,
    /// Move the task out of its sprint into the backlog.
    #[serde(default)]
    pub move_to_backlog: bool,
}

impl Validate for UpdateTaskRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(title) = &self.title {
            require_non_empty("title", title)?;
        }
        if self.unassign && self.assignee_id.is_some() {
            return Err("assignee_id and unassign are mutually exclusive".into());
        }
        if self.move_to_backlog && self.sprint_id.is_some() {
            return Err("sprint_id and move_to_backlog are mutually exclusive".into());
        }
        validate_estimates(self.story_points, self.estimate_hours)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MoveTaskRequest {
    #[schema(value_type = String)]
    pub status: TaskStatus,
    /// Zero-based position in the target column; the end when absent.
    pub index: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MoveTaskResponse {
    pub task: TaskRecord,
    #[schema(value_type = Object)]
    pub outcome: MoveOutcome,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCommentRequest {
    pub body: String,
}

impl Validate for CreateCommentRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("body", &self.body)
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TaskQuery {
    pub project_id: Option<Uuid>,
    pub sprint_id: Option<Uuid>,
    /// Only tasks outside any sprint.
    pub backlog: Option<bool>,
    pub assignee_id: Option<Uuid>,
    #[param(value_type = Option<String>)]
    pub status: Option<TaskStatus>,
    pub label: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/pm/tasks", get(list_tasks).post(create_task))
        .route(
            "/v1/pm/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/v1/pm/tasks/{id}/move", post(move_task))
        .route(
            "/v1/pm/tasks/{id}/comments",
            get(list_comments).post(add_comment),
        )
}

/// Resolve a sprint a task may join: same project, not closed.
fn open_sprint_of(state: &AppState, org: Uuid, project_id: Uuid, sprint_id: Uuid) -> Result<(), AppError> {
    let sprint = state
        .sprints
        .require(org, sprint_id)
        .map_err(|_| AppError::Validation(format!("sprint {sprint_id} does not exist")))?;
    if sprint.project_id != project_id {
        return Err(AppError::Validation(format!(
            "sprint {sprint_id} belongs to another project"
        )));
    }
    if !matches!(sprint.status, SprintStatus::Planned | SprintStatus::Active) {
        return Err(AppError::Conflict(format!(
            "sprint '{}' is {} and cannot receive tasks",
            sprint.name, sprint.status
        )));
    }
    Ok(())
}

async fn notify_assignee(state: &AppState, task: &TaskRecord, caller: &CallerIdentity) {
    if let Some(assignee) = task.assignee_id {
        if caller.user_id != Some(assignee) {
            state
                .notify(
                    task.org_id,
                    assignee,
                    NotificationKind::TaskAssigned,
                    format!("{} assigned to you: {}", task.key, task.title),
                    Some(format!("/v1/pm/tasks/{}", task.id)),
                )
                .await;
        }
    }
}

/// POST /v1/pm/tasks: Create a task.
#[utoipa::path(
    post,
    path = "/v1/pm/tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created", body = TaskRecord),
        (status = 409, description = "Project archived or sprint closed", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub async fn create_task(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    body: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskRecord>), AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_validated_json(body)?;
    let project = require_open_project(&state, org, req.project_id)?;
    if let Some(sprint_id) = req.sprint_id {
        open_sprint_of(&state, org, project.id, sprint_id)?;
    }
    if let Some(assignee) = req.assignee_id {
        ensure_user(&state, org, assignee)?;
    }

    let (key, project) = state.projects.mutate(org, project.id, |p| {
        let key = ProjectKey::new(&p.key)?.task_key(p.next_task_number);
        p.next_task_number += 1;
        p.updated_at = Utc::now();
        Ok((key, p.clone()))
    })?;
    state.persist(&project, "allocate_task_key", caller.user_id).await?;

    let status = req.status.unwrap_or(if req.sprint_id.is_some() {
        TaskStatus::Todo
    } else {
        TaskStatus::Backlog
    });
    let rank = sprint_board(&state, org, &project, req.sprint_id).next_rank(status);
    let now = Utc::now();
    let record = TaskRecord {
        id: Uuid::new_v4(),
        org_id: org,
        project_id: project.id,
        sprint_id: req.sprint_id,
        key,
        title: req.title.trim().to_string(),
        description: clean(req.description),
        task_type: req.task_type.unwrap_or_default(),
        status,
        priority: req.priority.unwrap_or_default(),
        assignee_id: req.assignee_id,
        reporter_id: caller.user_id,
        story_points: req.story_points,
        estimate_hours: req.estimate_hours,
        rank,
        labels: normalize_labels(req.labels),
        due_date: req.due_date,
        completed_at: status.is_done().then_some(now),
        history: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    state.tasks.put(record.clone());
    state.persist(&record, "create", caller.user_id).await?;
    notify_assignee(&state, &record, &caller).await;
    tracing::debug!(task_id = %record.id, key = %record.key, "task created");
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /v1/pm/tasks: List tasks.
#[utoipa::path(
    get,
    path = "/v1/pm/tasks",
    params(TaskQuery),
    responses((status = 200, description = "Page of tasks", body = serde_json::Value)),
    tag = "tasks"
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    query: Result<Query<TaskQuery>, QueryRejection>,
) -> Result<Json<Page<TaskRecord>>, AppError> {
    let q = extract_query(query)?;
    let label = q.label.as_deref().map(str::to_lowercase);
    let tasks = state.tasks.filter_scoped(org, |t| {
        q.project_id.map_or(true, |p| t.project_id == p)
            && q.sprint_id.map_or(true, |s| t.sprint_id == Some(s))
            && q.backlog.map_or(true, |b| t.sprint_id.is_none() == b)
            && q.assignee_id.map_or(true, |a| t.assignee_id == Some(a))
            && q.status.map_or(true, |s| t.status == s)
            && label.as_ref().map_or(true, |l| t.labels.contains(l))
    });
    Ok(Json(paginate(tasks, &PageRequest::new(q.limit, q.offset))))
}

/// GET /v1/pm/tasks/{id}: Get a task.
#[utoipa::path(
    get,
    path = "/v1/pm/tasks/{id}",
    params(("id" = Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task found", body = TaskRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub async fn get_task(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskRecord>, AppError> {
    state.tasks.require(org, id).map(Json)
}

/// PUT /v1/pm/tasks/{id}: Update a task's fields.
#[utoipa::path(
    put,
    path = "/v1/pm/tasks/{id}",
    params(("id" = Uuid, Path, description = "Task ID")),
    request_body = UpdateTaskRequest,
    responses(
        (status = 200, description = "Task updated", body = TaskRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Target sprint closed", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub async fn update_task(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<Json<TaskRecord>, AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_validated_json(body)?;
    let current = state.tasks.require(org, id)?;
    if let Some(assignee) = req.assignee_id {
        ensure_user(&state, org, assignee)?;
    }

    // A sprint change puts the card at the end of its column on the new board.
    let new_sprint = match (req.sprint_id, req.move_to_backlog) {
        (Some(sprint_id), _) if current.sprint_id != Some(sprint_id) => {
            open_sprint_of(&state, org, current.project_id, sprint_id)?;
            Some(Some(sprint_id))
        }
        (None, true) if current.sprint_id.is_some() => Some(None),
        _ => None,
    };
    let new_rank = match new_sprint {
        Some(sprint) => {
            let project = state.projects.require(org, current.project_id)?;
            Some(sprint_board(&state, org, &project, sprint).next_rank(current.status))
        }
        None => None,
    };

    let record = state.tasks.mutate(org, id, |t| {
        if let Some(title) = req.title {
            t.title = title.trim().to_string();
        }
        if req.description.is_some() {
            t.description = clean(req.description);
        }
        if let Some(task_type) = req.task_type {
            t.task_type = task_type;
        }
        if let Some(priority) = req.priority {
            t.priority = priority;
        }
        if req.unassign {
            t.assignee_id = None;
        } else if req.assignee_id.is_some() {
            t.assignee_id = req.assignee_id;
        }
        if req.story_points.is_some() {
            t.story_points = req.story_points;
        }
        if req.estimate_hours.is_some() {
            t.estimate_hours = req.estimate_hours;
        }
        if let Some(labels) = req.labels {
            t.labels = normalize_labels(labels);
        }
        if req.due_date.is_some() {
            t.due_date = req.due_date;
        }
        if let (Some(sprint), Some(rank)) = (new_sprint, new_rank) {
            t.sprint_id = sprint;
            t.rank = rank;
        }
        t.updated_at = Utc::now();
        Ok(t.clone())
    })?;
    state.persist(&record, "update", caller.user_id).await?;
    if record.assignee_id.is_some() && record.assignee_id != current.assignee_id {
        notify_assignee(&state, &record, &caller).await;
    }
    Ok(Json(record))
}

/// DELETE /v1/pm/tasks/{id}: Delete a task and its comments.
#[utoipa::path(
    delete,
    path = "/v1/pm/tasks/{id}",
    params(("id" = Uuid, Path, description = "Task ID")),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub async fn delete_task(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::Agent)?;
    state.tasks.require(org, id)?;
    state.tasks.remove(&id);
    state.persist_removal::<TaskRecord>(id, caller.user_id).await?;
    for comment in state.comments.filter_scoped(org, |c| c.task_id == id) {
        state.comments.remove(&comment.id);
        state
            .persist_removal::<CommentRecord>(comment.id, caller.user_id)
            .await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Commit the moved card. The board the move was planned on is a snapshot,
/// so the card's column and the destination's WIP limit are re-checked
/// under the store lock.
fn commit_move(
    state: &AppState,
    org: Uuid,
    planned: &TaskRecord,
    wip_limits: &HashMap<TaskStatus, u32>,
    outcome: &MoveOutcome,
    rank: i64,
    actor: Option<Uuid>,
) -> Result<TaskRecord, AppError> {
    state.tasks.mutate_among(org, planned.id, |t, others| {
        if t.status != outcome.from || t.sprint_id != planned.sprint_id {
            return Err(AppError::Conflict(format!("task {} was moved concurrently", t.key)));
        }
        if outcome.from != outcome.to {
            if let Some(&limit) = wip_limits.get(&outcome.to) {
                let occupied = others
                    .iter()
                    .filter(|o| {
                        o.project_id == t.project_id
                            && o.sprint_id == t.sprint_id
                            && o.status == outcome.to
                    })
                    .count();
                if occupied >= limit as usize {
                    return Err(BoardError::WipLimitExceeded { status: outcome.to, limit }.into());
                }
            }
            transition(&mut t.status, outcome.to, &mut t.history, actor, None)?;
            t.completed_at = outcome.to.is_done().then(Utc::now);
        }
        t.rank = rank;
        t.updated_at = Utc::now();
        Ok(t.clone())
    })
}

/// POST /v1/pm/tasks/{id}/move: Drag a card to a column position.
///
/// The moved card is committed first, then every other card whose rank
/// changed; when the gap between neighbours is exhausted the whole target
/// column is re-ranked.
#[utoipa::path(
    post,
    path = "/v1/pm/tasks/{id}/move",
    params(("id" = Uuid, Path, description = "Task ID")),
    request_body = MoveTaskRequest,
    responses(
        (status = 200, description = "Task moved", body = MoveTaskResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "WIP limit reached", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub async fn move_task(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<MoveTaskRequest>, JsonRejection>,
) -> Result<Json<MoveTaskResponse>, AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_json(body)?;
    let task = state.tasks.require(org, id)?;
    let project = state.projects.require(org, task.project_id)?;
    let mut board = sprint_board(&state, org, &project, task.sprint_id);
    let outcome = board.move_card(id, req.status, req.index.unwrap_or(usize::MAX))?;
    let rank = outcome
        .changes
        .iter()
        .find(|c| c.task_id == id)
        .map_or(outcome.rank, |c| c.rank);

    let task = commit_move(&state, org, &task, &project.wip_limits, &outcome, rank, caller.user_id)?;
    state.persist(&task, "move", caller.user_id).await?;

    for change in outcome.changes.iter().filter(|c| c.task_id != id) {
        let record = state.tasks.mutate(org, change.task_id, |t| {
            t.rank = change.rank;
            t.updated_at = Utc::now();
            Ok(t.clone())
        })?;
        state.persist(&record, "rerank", caller.user_id).await?;
    }
    if outcome.rebalanced {
        tracing::debug!(task_id = %id, column = %outcome.to, "board column re-ranked");
    }
    Ok(Json(MoveTaskResponse { task, outcome }))
}

/// GET /v1/pm/tasks/{id}/comments: List a task's comments, oldest first.
#[utoipa::path(
    get,
    path = "/v1/pm/tasks/{id}/comments",
    params(("id" = Uuid, Path, description = "Task ID"), PageParams),
    responses(
        (status = 200, description = "Page of comments", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub async fn list_comments(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
    query: Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<Page<CommentRecord>>, AppError> {
    let page = extract_query(query)?.page();
    state.tasks.require(org, id)?;
    let comments = state.comments.filter_scoped(org, |c| c.task_id == id);
    Ok(Json(paginate(comments, &page)))
}

/// POST /v1/pm/tasks/{id}/comments: Comment on a task.
#[utoipa::path(
    post,
    path = "/v1/pm/tasks/{id}/comments",
    params(("id" = Uuid, Path, description = "Task ID")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment added", body = CommentRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub async fn add_comment(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<CreateCommentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CommentRecord>), AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_validated_json(body)?;
    state.tasks.require(org, id)?;
    let now = Utc::now();
    let record = CommentRecord {
        id: Uuid::new_v4(),
        org_id: org,
        task_id: id,
        author_id: caller.user_id,
        body: req.body.trim().to_string(),
        created_at: now,
        updated_at: now,
    };
    state.comments.put(record.clone());
    state.persist(&record, "create", caller.user_id).await?;
    Ok((StatusCode::CREATED, Json(record)))
}
