//! # Changes
//!
//! Change requests follow a type-aware lifecycle: STANDARD and EMERGENCY
//! changes may be approved straight from `SUBMITTED`, NORMAL changes must go
//! through `UNDER_REVIEW`. Entering `APPROVED` or `REJECTED` is a decision;
//! it needs a manager and records who made it. Scheduling needs a planned
//! window.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use desk_core::{paginate, Page, PageRequest, Role, TicketKind};
use desk_state::{transition_change, ChangeStatus, ChangeType, Lifecycle, RiskLevel};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{clean, ensure_user};
use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query, extract_validated_json, require_non_empty, OrgContext, Validate};
use crate::records::{ChangeRecord, NotificationKind};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateChangeRequest {
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = Option<String>)]
    pub change_type: Option<ChangeType>,
    #[schema(value_type = Option<String>)]
    pub risk: Option<RiskLevel>,
    pub assignee_id: Option<Uuid>,
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_end: Option<DateTime<Utc>>,
    pub implementation_plan: Option<String>,
    pub rollback_plan: Option<String>,
}

impl Validate for CreateChangeRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("title", &self.title)?;
        check_window(self.planned_start, self.planned_end)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateChangeRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<String>)]
    pub risk: Option<RiskLevel>,
    pub assignee_id: Option<Uuid>,
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_end: Option<DateTime<Utc>>,
    pub implementation_plan: Option<String>,
    pub rollback_plan: Option<String>,
}

impl Validate for UpdateChangeRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(title) = &self.title {
            require_non_empty("title", title)?;
        }
        check_window(self.planned_start, self.planned_end)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangeTransitionRequest {
    #[schema(value_type = String)]
    pub to: ChangeStatus,
    pub reason: Option<String>,
    /// Planned window, applied before a move to `SCHEDULED`.
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ChangeQuery {
    #[param(value_type = Option<String>)]
    pub status: Option<ChangeStatus>,
    #[param(value_type = Option<String>)]
    pub change_type: Option<ChangeType>,
    #[param(value_type = Option<String>)]
    pub risk: Option<RiskLevel>,
    pub requester_id: Option<Uuid>,
    pub release_id: Option<Uuid>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/itsm/changes", get(list_changes).post(create_change))
        .route("/v1/itsm/changes/{id}", get(get_change).put(update_change))
        .route("/v1/itsm/changes/{id}/transition", post(transition_change_status))
}

fn check_window(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<(), String> {
    match (start, end) {
        (Some(start), Some(end)) if start >= end => {
            Err("planned_start must be before planned_end".to_string())
        }
        _ => Ok(()),
    }
}

/// Apply a status move to `change`, including the scheduling and decision
/// side effects.
fn apply_transition(
    change: &mut ChangeRecord,
    req: &ChangeTransitionRequest,
    actor: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let start = req.planned_start.or(change.planned_start);
    let end = req.planned_end.or(change.planned_end);
    if req.to == ChangeStatus::Scheduled && (start.is_none() || end.is_none()) {
        return Err(AppError::Validation(
            "planned_start and planned_end are required to schedule a change".into(),
        ));
    }
    check_window(start, end).map_err(AppError::Validation)?;

    transition_change(
        change.change_type,
        &mut change.status,
        req.to,
        &mut change.history,
        actor,
        req.reason.clone(),
    )?;
    change.planned_start = start;
    change.planned_end = end;
    if req.to.is_decision() {
        change.approver_id = actor;
        if req.to == ChangeStatus::Approved {
            change.approved_at = Some(now);
        }
    }
    change.updated_at = now;
    Ok(())
}

/// POST /v1/itsm/changes: Raise a change request.
#[utoipa::path(
    post,
    path = "/v1/itsm/changes",
    request_body = CreateChangeRequest,
    responses(
        (status = 201, description = "Change created", body = ChangeRecord),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "changes"
)]
pub async fn create_change(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    body: Result<Json<CreateChangeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ChangeRecord>), AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_validated_json(body)?;
    if let Some(assignee) = req.assignee_id {
        ensure_user(&state, org, assignee)?;
    }
    let now = Utc::now();
    let record = ChangeRecord {
        id: Uuid::new_v4(),
        org_id: org,
        number: state.next_ticket_number(org, TicketKind::Change),
        title: req.title.trim().to_string(),
        description: clean(req.description),
        change_type: req.change_type.unwrap_or_default(),
        risk: req.risk.unwrap_or_default(),
        status: ChangeStatus::Draft,
        requester_id: caller.user_id,
        assignee_id: req.assignee_id,
        approver_id: None,
        approved_at: None,
        planned_start: req.planned_start,
        planned_end: req.planned_end,
        implementation_plan: clean(req.implementation_plan),
        rollback_plan: clean(req.rollback_plan),
        release_id: None,
        history: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    state.changes.put(record.clone());
    state.persist(&record, "create", caller.user_id).await?;
    tracing::info!(change = %record.number, change_type = ?record.change_type, "change raised");
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /v1/itsm/changes: List changes.
#[utoipa::path(
    get,
    path = "/v1/itsm/changes",
    params(ChangeQuery),
    responses((status = 200, description = "Page of changes", body = serde_json::Value)),
    tag = "changes"
)]
pub async fn list_changes(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    query: Result<Query<ChangeQuery>, QueryRejection>,
) -> Result<Json<Page<ChangeRecord>>, AppError> {
    let q = extract_query(query)?;
    let changes = state.changes.filter_scoped(org, |c| {
        q.status.map_or(true, |s| c.status == s)
            && q.change_type.map_or(true, |t| c.change_type == t)
            && q.risk.map_or(true, |r| c.risk == r)
            && q.requester_id.map_or(true, |r| c.requester_id == Some(r))
            && q.release_id.map_or(true, |r| c.release_id == Some(r))
    });
    Ok(Json(paginate(changes, &PageRequest::new(q.limit, q.offset))))
}

/// GET /v1/itsm/changes/{id}: Get a change.
#[utoipa::path(
    get,
    path = "/v1/itsm/changes/{id}",
    params(("id" = Uuid, Path, description = "Change ID")),
    responses(
        (status = 200, description = "Change found", body = ChangeRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "changes"
)]
pub async fn get_change(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ChangeRecord>, AppError> {
    state.changes.require(org, id).map(Json)
}

/// PUT /v1/itsm/changes/{id}: Edit a change.
#[utoipa::path(
    put,
    path = "/v1/itsm/changes/{id}",
    params(("id" = Uuid, Path, description = "Change ID")),
    request_body = UpdateChangeRequest,
    responses(
        (status = 200, description = "Change updated", body = ChangeRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Change closed", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "changes"
)]
pub async fn update_change(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateChangeRequest>, JsonRejection>,
) -> Result<Json<ChangeRecord>, AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_validated_json(body)?;
    if let Some(assignee) = req.assignee_id {
        ensure_user(&state, org, assignee)?;
    }
    let record = state.changes.mutate(org, id, |c| {
        if c.status.is_terminal() {
            return Err(AppError::Conflict(format!("{} is {}", c.number, c.status)));
        }
        let start = req.planned_start.or(c.planned_start);
        let end = req.planned_end.or(c.planned_end);
        check_window(start, end).map_err(AppError::Validation)?;
        c.planned_start = start;
        c.planned_end = end;
        if let Some(title) = req.title {
            c.title = title.trim().to_string();
        }
        if req.description.is_some() {
            c.description = clean(req.description);
        }
        if let Some(risk) = req.risk {
            c.risk = risk;
        }
        if req.assignee_id.is_some() {
            c.assignee_id = req.assignee_id;
        }
        if req.implementation_plan.is_some() {
            c.implementation_plan = clean(req.implementation_plan);
        }
        if req.rollback_plan.is_some() {
            c.rollback_plan = clean(req.rollback_plan);
        }
        c.updated_at = Utc::now();
        Ok(c.clone())
    })?;
    state.persist(&record, "update", caller.user_id).await?;
    Ok(Json(record))
}

/// POST /v1/itsm/changes/{id}/transition: Change status.
#[utoipa::path(
    post,
    path = "/v1/itsm/changes/{id}/transition",
    params(("id" = Uuid, Path, description = "Change ID")),
    request_body = ChangeTransitionRequest,
    responses(
        (status = 200, description = "Status changed", body = ChangeRecord),
        (status = 403, description = "Decision requires a manager", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Transition not allowed", body = crate::error::ErrorBody),
        (status = 422, description = "Missing planned window", body = crate::error::ErrorBody),
    ),
    tag = "changes"
)]
pub async fn transition_change_status(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ChangeTransitionRequest>, JsonRejection>,
) -> Result<Json<ChangeRecord>, AppError> {
    let mut req = extract_json(body)?;
    req.reason = clean(req.reason);
    if req.to.is_decision() {
        require_role(&caller, Role::Manager)?;
    } else {
        require_role(&caller, Role::Agent)?;
    }

    let now = Utc::now();
    let record = state.changes.mutate(org, id, |c| {
        apply_transition(c, &req, caller.user_id, now)?;
        Ok(c.clone())
    })?;
    state.persist(&record, "transition", caller.user_id).await?;

    if req.to.is_decision() {
        if let Some(requester) = record.requester_id.filter(|r| Some(*r) != caller.user_id) {
            let (kind, verb) = match req.to {
                ChangeStatus::Approved => (NotificationKind::ChangeApproved, "approved"),
                _ => (NotificationKind::ChangeRejected, "rejected"),
            };
            state
                .notify(
                    org,
                    requester,
                    kind,
                    format!("{} was {verb}", record.number),
                    Some(format!("/v1/itsm/changes/{}", record.id)),
                )
                .await;
        }
    }
    Ok(Json(record))
}
