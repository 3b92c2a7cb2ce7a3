//! # Problems
//!
//! Root-cause investigations behind one or more incidents. A problem may
//! only be declared a `KNOWN_ERROR` once a workaround is documented, and an
//! incident belongs to at most one problem.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use desk_core::{paginate, Page, PageRequest, Priority, Role, TicketKind};
use desk_state::{transition, Lifecycle, ProblemStatus};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{clean, ensure_user};
use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query, extract_validated_json, require_non_empty, OrgContext, Validate};
use crate::records::{IncidentRecord, ProblemRecord};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProblemRequest {
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = Option<String>)]
    pub priority: Option<Priority>,
    pub assignee_id: Option<Uuid>,
    /// Incidents to link immediately.
    #[serde(default)]
    pub incident_ids: Vec<Uuid>,
}

impl Validate for CreateProblemRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("title", &self.title)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProblemRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<String>)]
    pub priority: Option<Priority>,
    pub assignee_id: Option<Uuid>,
    pub root_cause: Option<String>,
    pub workaround: Option<String>,
}

impl Validate for UpdateProblemRequest {
    fn validate(&self) -> Result<(), String> {
        match &self.title {
            Some(title) => require_non_empty("title", title),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProblemTransitionRequest {
    #[schema(value_type = String)]
    pub to: ProblemStatus,
    pub reason: Option<String>,
    /// Recorded with the transition; required for `KNOWN_ERROR` unless
    /// already documented.
    pub workaround: Option<String>,
    pub root_cause: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LinkIncidentRequest {
    pub incident_id: Uuid,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProblemQuery {
    #[param(value_type = Option<String>)]
    pub status: Option<ProblemStatus>,
    pub assignee_id: Option<Uuid>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/itsm/problems", get(list_problems).post(create_problem))
        .route("/v1/itsm/problems/{id}", get(get_problem).put(update_problem))
        .route("/v1/itsm/problems/{id}/transition", post(transition_problem))
        .route("/v1/itsm/problems/{id}/incidents", post(link_incident))
}

/// Point `incident_id` at `problem_id`, refusing incidents already owned by
/// another problem.
fn claim_incident(
    state: &AppState,
    org: Uuid,
    incident_id: Uuid,
    problem_id: Uuid,
) -> Result<IncidentRecord, AppError> {
    state.incidents.mutate(org, incident_id, |i| {
        match i.problem_id {
            Some(existing) if existing != problem_id => Err(AppError::Conflict(format!(
                "{} is already linked to problem {existing}",
                i.number
            ))),
            _ => {
                i.problem_id = Some(problem_id);
                i.updated_at = Utc::now();
                Ok(i.clone())
            }
        }
    })
}

/// POST /v1/itsm/problems: Open a problem.
#[utoipa::path(
    post,
    path = "/v1/itsm/problems",
    request_body = CreateProblemRequest,
    responses(
        (status = 201, description = "Problem opened", body = ProblemRecord),
        (status = 404, description = "Linked incident not found", body = crate::error::ErrorBody),
        (status = 409, description = "Incident linked elsewhere", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "problems"
)]
pub async fn create_problem(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    body: Result<Json<CreateProblemRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ProblemRecord>), AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_validated_json(body)?;
    if let Some(assignee) = req.assignee_id {
        ensure_user(&state, org, assignee)?;
    }
    let mut incident_ids: Vec<Uuid> = Vec::new();
    for id in req.incident_ids {
        let incident = state.incidents.require(org, id)?;
        if incident.problem_id.is_some() {
            return Err(AppError::Conflict(format!(
                "{} is already linked to a problem",
                incident.number
            )));
        }
        if !incident_ids.contains(&id) {
            incident_ids.push(id);
        }
    }

    let now = Utc::now();
    let record = ProblemRecord {
        id: Uuid::new_v4(),
        org_id: org,
        number: state.next_ticket_number(org, TicketKind::Problem),
        title: req.title.trim().to_string(),
        description: clean(req.description),
        status: ProblemStatus::New,
        priority: req.priority.unwrap_or_default(),
        assignee_id: req.assignee_id,
        root_cause: None,
        workaround: None,
        incident_ids,
        history: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    state.problems.put(record.clone());
    state.persist(&record, "create", caller.user_id).await?;
    for incident_id in &record.incident_ids {
        let incident = claim_incident(&state, org, *incident_id, record.id)?;
        state.persist(&incident, "link_problem", caller.user_id).await?;
    }
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /v1/itsm/problems: List problems.
#[utoipa::path(
    get,
    path = "/v1/itsm/problems",
    params(ProblemQuery),
    responses((status = 200, description = "Page of problems", body = serde_json::Value)),
    tag = "problems"
)]
pub async fn list_problems(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    query: Result<Query<ProblemQuery>, QueryRejection>,
) -> Result<Json<Page<ProblemRecord>>, AppError> {
    let q = extract_query(query)?;
    let problems = state.problems.filter_scoped(org, |p| {
        q.status.map_or(true, |s| p.status == s) && q.assignee_id.map_or(true, |a| p.assignee_id == Some(a))
    });
    Ok(Json(paginate(problems, &PageRequest::new(q.limit, q.offset))))
}

/// GET /v1/itsm/problems/{id}: Get a problem.
#[utoipa::path(
    get,
    path = "/v1/itsm/problems/{id}",
    params(("id" = Uuid, Path, description = "Problem ID")),
    responses(
        (status = 200, description = "Problem found", body = ProblemRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "problems"
)]
pub async fn get_problem(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ProblemRecord>, AppError> {
    state.problems.require(org, id).map(Json)
}

/// PUT /v1/itsm/problems/{id}: Edit a problem.
#[utoipa::path(
    put,
    path = "/v1/itsm/problems/{id}",
    params(("id" = Uuid, Path, description = "Problem ID")),
    request_body = UpdateProblemRequest,
    responses(
        (status = 200, description = "Problem updated", body = ProblemRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Problem closed", body = crate::error::ErrorBody),
    ),
    tag = "problems"
)]
pub async fn update_problem(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateProblemRequest>, JsonRejection>,
) -> Result<Json<ProblemRecord>, AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_validated_json(body)?;
    if let Some(assignee) = req.assignee_id {
        ensure_user(&state, org, assignee)?;
    }
    let record = state.problems.mutate(org, id, |p| {
        if p.status.is_terminal() {
            return Err(AppError::Conflict(format!("{} is {}", p.number, p.status)));
        }
        if let Some(title) = req.title {
            p.title = title.trim().to_string();
        }
        if req.description.is_some() {
            p.description = clean(req.description);
        }
        if let Some(priority) = req.priority {
            p.priority = priority;
        }
        if req.assignee_id.is_some() {
            p.assignee_id = req.assignee_id;
        }
        if req.root_cause.is_some() {
            p.root_cause = clean(req.root_cause);
        }
        if req.workaround.is_some() {
            p.workaround = clean(req.workaround);
        }
        p.updated_at = Utc::now();
        Ok(p.clone())
    })?;
    state.persist(&record, "update", caller.user_id).await?;
    Ok(Json(record))
}

/// POST /v1/itsm/problems/{id}/transition: Change status.
#[utoipa::path(
    post,
    path = "/v1/itsm/problems/{id}/transition",
    params(("id" = Uuid, Path, description = "Problem ID")),
    request_body = ProblemTransitionRequest,
    responses(
        (status = 200, description = "Status changed", body = ProblemRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Transition not allowed", body = crate::error::ErrorBody),
        (status = 422, description = "Known error without workaround", body = crate::error::ErrorBody),
    ),
    tag = "problems"
)]
pub async fn transition_problem(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ProblemTransitionRequest>, JsonRejection>,
) -> Result<Json<ProblemRecord>, AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_json(body)?;
    let workaround = clean(req.workaround);
    let root_cause = clean(req.root_cause);
    let reason = clean(req.reason);

    let record = state.problems.mutate(org, id, |p| {
        if req.to == ProblemStatus::KnownError && workaround.is_none() && p.workaround.is_none() {
            return Err(AppError::Validation(
                "a workaround is required to declare a known error".into(),
            ));
        }
        transition(&mut p.status, req.to, &mut p.history, caller.user_id, reason)?;
        if workaround.is_some() {
            p.workaround = workaround;
        }
        if root_cause.is_some() {
            p.root_cause = root_cause;
        }
        p.updated_at = Utc::now();
        Ok(p.clone())
    })?;
    state.persist(&record, "transition", caller.user_id).await?;
    Ok(Json(record))
}

/// POST /v1/itsm/problems/{id}/incidents: Link an incident.
#[utoipa::path(
    post,
    path = "/v1/itsm/problems/{id}/incidents",
    params(("id" = Uuid, Path, description = "Problem ID")),
    request_body = LinkIncidentRequest,
    responses(
        (status = 200, description = "Incident linked", body = ProblemRecord),
        (status = 404, description = "Problem or incident not found", body = crate::error::ErrorBody),
        (status = 409, description = "Incident linked to another problem", body = crate::error::ErrorBody),
    ),
    tag = "problems"
)]
pub async fn link_incident(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<LinkIncidentRequest>, JsonRejection>,
) -> Result<Json<ProblemRecord>, AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_json(body)?;
    let problem = state.problems.require(org, id)?;
    if problem.status.is_terminal() {
        return Err(AppError::Conflict(format!("{} is {}", problem.number, problem.status)));
    }
    let incident = claim_incident(&state, org, req.incident_id, id)?;
    state.persist(&incident, "link_problem", caller.user_id).await?;

    let record = state.problems.mutate(org, id, |p| {
        if !p.incident_ids.contains(&req.incident_id) {
            p.incident_ids.push(req.incident_id);
            p.updated_at = Utc::now();
        }
        Ok(p.clone())
    })?;
    state.persist(&record, "link_incident", caller.user_id).await?;
    Ok(Json(record))
}
