//! # Leave Requests
//!
//! Staff file requests for themselves; managers may file on behalf of
//! others and decide requests, never their own. Pending and approved
//! requests hold their dates: a second request overlapping them is refused.
//! Approved leave removes the member's working days from sprint capacity.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use desk_core::{paginate, working_days_between, Page, PageRequest, Role};
use desk_state::{transition, LeaveStatus, LeaveType};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{clean, ensure_user};
use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, OrgContext, Validate};
use crate::records::{LeaveRequestRecord, NotificationKind};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLeaveRequest {
    /// Defaults to the caller.
    pub user_id: Option<Uuid>,
    #[schema(value_type = Option<String>)]
    pub leave_type: Option<LeaveType>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: Option<String>,
}

impl Validate for CreateLeaveRequest {
    fn validate(&self) -> Result<(), String> {
        if self.end_date < self.start_date {
            return Err("end_date must not be before start_date".into());
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct DecisionRequest {
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LeaveQuery {
    /// Managers only; other callers always see their own requests.
    pub user_id: Option<Uuid>,
    #[param(value_type = Option<String>)]
    pub status: Option<LeaveStatus>,
    /// Requests overlapping `[from, to]`.
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/leave-requests", get(list_leave).post(create_leave))
        .route("/v1/leave-requests/{id}", get(get_leave))
        .route("/v1/leave-requests/{id}/approve", post(approve_leave))
        .route("/v1/leave-requests/{id}/reject", post(reject_leave))
        .route("/v1/leave-requests/{id}/cancel", post(cancel_leave))
}

/// Whether `caller` may see or withdraw `request`.
fn can_access(caller: &CallerIdentity, request: &LeaveRequestRecord) -> bool {
    caller.has_role(Role::Manager) || caller.user_id == Some(request.user_id)
}

fn require_visible(
    state: &AppState,
    org: Uuid,
    caller: &CallerIdentity,
    id: Uuid,
) -> Result<LeaveRequestRecord, AppError> {
    let request = state.leave_requests.require(org, id)?;
    if !can_access(caller, &request) {
        return Err(crate::state::not_found::<LeaveRequestRecord>(id));
    }
    Ok(request)
}

/// Approve or reject a pending request and tell its owner.
async fn decide(
    state: &AppState,
    org: Uuid,
    caller: &CallerIdentity,
    id: Uuid,
    to: LeaveStatus,
    note: Option<String>,
) -> Result<LeaveRequestRecord, AppError> {
    require_role(caller, Role::Manager)?;
    let now = Utc::now();
    let record = state.leave_requests.mutate(org, id, |r| {
        if caller.user_id == Some(r.user_id) {
            return Err(AppError::Forbidden(
                "managers cannot decide their own leave requests".into(),
            ));
        }
        transition(&mut r.status, to, &mut r.history, caller.user_id, note.clone())?;
        r.decided_by = caller.user_id;
        r.decided_at = Some(now);
        r.decision_note = note;
        r.updated_at = now;
        Ok(r.clone())
    })?;
    let action = match to {
        LeaveStatus::Approved => "approve",
        _ => "reject",
    };
    state.persist(&record, action, caller.user_id).await?;

    let (kind, verb) = match to {
        LeaveStatus::Approved => (NotificationKind::LeaveApproved, "approved"),
        _ => (NotificationKind::LeaveRejected, "rejected"),
    };
    state
        .notify(
            org,
            record.user_id,
            kind,
            format!(
                "Your leave from {} to {} was {verb}",
                record.start_date, record.end_date
            ),
            Some(format!("/v1/leave-requests/{}", record.id)),
        )
        .await;
    tracing::info!(leave_id = %record.id, status = %record.status, "leave decided");
    Ok(record)
}

/// POST /v1/leave-requests: File a leave request.
#[utoipa::path(
    post,
    path = "/v1/leave-requests",
    request_body = CreateLeaveRequest,
    responses(
        (status = 201, description = "Request filed", body = LeaveRequestRecord),
        (status = 403, description = "Filing for another user requires manager", body = crate::error::ErrorBody),
        (status = 409, description = "Overlaps an existing request", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "leave"
)]
pub async fn create_leave(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    body: Result<Json<CreateLeaveRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LeaveRequestRecord>), AppError> {
    let req = extract_validated_json(body)?;
    let user_id = match req.user_id {
        Some(user) if caller.user_id != Some(user) => {
            require_role(&caller, Role::Manager)?;
            user
        }
        Some(user) => user,
        None => caller.require_user()?,
    };
    ensure_user(&state, org, user_id)?;

    let working_days = working_days_between(req.start_date, req.end_date);
    if working_days == 0 {
        return Err(AppError::Validation(
            "the requested range contains no working days".into(),
        ));
    }

    let now = Utc::now();
    let record = LeaveRequestRecord {
        id: Uuid::new_v4(),
        org_id: org,
        user_id,
        leave_type: req.leave_type.unwrap_or_default(),
        start_date: req.start_date,
        end_date: req.end_date,
        working_days,
        reason: clean(req.reason),
        status: LeaveStatus::Pending,
        decided_by: None,
        decided_at: None,
        decision_note: None,
        history: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    let inserted = state.leave_requests.put_unless(record.clone(), |r| {
        r.user_id == user_id && r.status.holds_dates() && r.overlaps(req.start_date, req.end_date)
    });
    if !inserted {
        return Err(AppError::Conflict(format!(
            "leave from {} to {} overlaps an existing request",
            req.start_date, req.end_date
        )));
    }
    state.persist(&record, "create", caller.user_id).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /v1/leave-requests: List leave requests.
#[utoipa::path(
    get,
    path = "/v1/leave-requests",
    params(LeaveQuery),
    responses((status = 200, description = "Page of leave requests", body = serde_json::Value)),
    tag = "leave"
)]
pub async fn list_leave(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    query: Result<Query<LeaveQuery>, QueryRejection>,
) -> Result<Json<Page<LeaveRequestRecord>>, AppError> {
    let q = extract_query(query)?;
    let owner = if caller.has_role(Role::Manager) {
        q.user_id
    } else {
        Some(caller.require_user()?)
    };
    let from = q.from.unwrap_or(NaiveDate::MIN);
    let to = q.to.unwrap_or(NaiveDate::MAX);
    let requests = state.leave_requests.filter_scoped(org, |r| {
        owner.map_or(true, |u| r.user_id == u)
            && q.status.map_or(true, |s| r.status == s)
            && r.overlaps(from, to)
    });
    Ok(Json(paginate(requests, &PageRequest::new(q.limit, q.offset))))
}

/// GET /v1/leave-requests/{id}: Get a leave request.
#[utoipa::path(
    get,
    path = "/v1/leave-requests/{id}",
    params(("id" = Uuid, Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Request found", body = LeaveRequestRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "leave"
)]
pub async fn get_leave(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<LeaveRequestRecord>, AppError> {
    require_visible(&state, org, &caller, id).map(Json)
}

/// POST /v1/leave-requests/{id}/approve: Approve a pending request.
#[utoipa::path(
    post,
    path = "/v1/leave-requests/{id}/approve",
    params(("id" = Uuid, Path, description = "Leave request ID")),
    request_body = DecisionRequest,
    responses(
        (status = 200, description = "Request approved", body = LeaveRequestRecord),
        (status = 403, description = "Not a manager, or own request", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already decided", body = crate::error::ErrorBody),
    ),
    tag = "leave"
)]
pub async fn approve_leave(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Option<Json<DecisionRequest>>,
) -> Result<Json<LeaveRequestRecord>, AppError> {
    let note = body.and_then(|Json(b)| clean(b.note));
    decide(&state, org, &caller, id, LeaveStatus::Approved, note)
        .await
        .map(Json)
}

/// POST /v1/leave-requests/{id}/reject: Reject a pending request.
#[utoipa::path(
    post,
    path = "/v1/leave-requests/{id}/reject",
    params(("id" = Uuid, Path, description = "Leave request ID")),
    request_body = DecisionRequest,
    responses(
        (status = 200, description = "Request rejected", body = LeaveRequestRecord),
        (status = 403, description = "Not a manager, or own request", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already decided", body = crate::error::ErrorBody),
    ),
    tag = "leave"
)]
pub async fn reject_leave(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Option<Json<DecisionRequest>>,
) -> Result<Json<LeaveRequestRecord>, AppError> {
    let note = body.and_then(|Json(b)| clean(b.note));
    decide(&state, org, &caller, id, LeaveStatus::Rejected, note)
        .await
        .map(Json)
}

/// POST /v1/leave-requests/{id}/cancel: Withdraw a pending or approved request.
#[utoipa::path(
    post,
    path = "/v1/leave-requests/{id}/cancel",
    params(("id" = Uuid, Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Request cancelled", body = LeaveRequestRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already rejected or cancelled", body = crate::error::ErrorBody),
    ),
    tag = "leave"
)]
pub async fn cancel_leave(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<LeaveRequestRecord>, AppError> {
    require_visible(&state, org, &caller, id)?;
    let record = state.leave_requests.mutate(org, id, |r| {
        transition(&mut r.status, LeaveStatus::Cancelled, &mut r.history, caller.user_id, None)?;
        r.updated_at = Utc::now();
        Ok(r.clone())
    })?;
    state.persist(&record, "cancel", caller.user_id).await?;
    Ok(Json(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(org: Uuid, user_id: Uuid) -> LeaveRequestRecord {
        let now = Utc::now();
        let start = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        LeaveRequestRecord {
            id: Uuid::new_v4(),
            org_id: org,
            user_id,
            leave_type: LeaveType::Annual,
            start_date: start,
            end_date: start + chrono::Duration::days(4),
            working_days: 5,
            reason: None,
            status: LeaveStatus::Pending,
            decided_by: None,
            decided_at: None,
            decision_note: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn caller(role: Role, user_id: Option<Uuid>) -> CallerIdentity {
        CallerIdentity { role, user_id }
    }

    #[test]
    fn owner_and_managers_see_a_request() {
        let owner = Uuid::new_v4();
        let r = request(Uuid::new_v4(), owner);
        assert!(can_access(&caller(Role::Viewer, Some(owner)), &r));
        assert!(can_access(&caller(Role::Manager, Some(Uuid::new_v4())), &r));
        assert!(!can_access(&caller(Role::Agent, Some(Uuid::new_v4())), &r));
    }

    #[test]
    fn hidden_request_reads_as_missing() {
        let state = AppState::new();
        let org = Uuid::new_v4();
        let r = request(org, Uuid::new_v4());
        state.leave_requests.put(r.clone());
        let stranger = caller(Role::Viewer, Some(Uuid::new_v4()));
        assert!(matches!(
            require_visible(&state, org, &stranger, r.id),
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn manager_cannot_decide_own_request() {
        let state = AppState::new();
        let org = Uuid::new_v4();
        let manager = Uuid::new_v4();
        let r = request(org, manager);
        state.leave_requests.put(r.clone());
        let err = decide(&state, org, &caller(Role::Manager, Some(manager)), r.id, LeaveStatus::Approved, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn approval_records_decider_and_notifies_owner() {
        let state = AppState::new();
        let org = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let manager = Uuid::new_v4();
        let r = request(org, owner);
        state.leave_requests.put(r.clone());

        let decided = decide(
            &state,
            org,
            &caller(Role::Manager, Some(manager)),
            r.id,
            LeaveStatus::Approved,
            Some("enjoy".into()),
        )
        .await
        .unwrap();
        assert_eq!(decided.status, LeaveStatus::Approved);
        assert_eq!(decided.decided_by, Some(manager));
        assert_eq!(decided.decision_note.as_deref(), Some("enjoy"));

        let inbox = state.notifications.filter_scoped(org, |n| n.user_id == owner);
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::LeaveApproved);
    }

    #[tokio::test]
    async fn decided_request_cannot_be_decided_again() {
        let state = AppState::new();
        let org = Uuid::new_v4();
        let mut r = request(org, Uuid::new_v4());
        r.status = LeaveStatus::Rejected;
        state.leave_requests.put(r.clone());
        let err = decide(&state, org, &caller(Role::Admin, None), r.id, LeaveStatus::Approved, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
