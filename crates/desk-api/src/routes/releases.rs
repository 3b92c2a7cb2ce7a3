//! # Releases
//!
//! A release bundles changes shipped together. Versions are unique per
//! organization and a change belongs to at most one release.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use desk_core::{paginate, Page, PageRequest, Role, TicketKind};
use desk_state::{transition, ChangeStatus, Lifecycle, ReleaseStatus};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::clean;
use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query, extract_validated_json, require_non_empty, OrgContext, Validate};
use crate::records::{ChangeRecord, ReleaseRecord};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReleaseRequest {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub planned_date: Option<NaiveDate>,
}

impl Validate for CreateReleaseRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("name", &self.name)?;
        require_non_empty("version", &self.version)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateReleaseRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub planned_date: Option<NaiveDate>,
}

impl Validate for UpdateReleaseRequest {
    fn validate(&self) -> Result<(), String> {
        match &self.name {
            Some(name) => require_non_empty("name", name),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReleaseTransitionRequest {
    #[schema(value_type = String)]
    pub to: ReleaseStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LinkChangeRequest {
    pub change_id: Uuid,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReleaseQuery {
    #[param(value_type = Option<String>)]
    pub status: Option<ReleaseStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/itsm/releases", get(list_releases).post(create_release))
        .route("/v1/itsm/releases/{id}", get(get_release).put(update_release))
        .route("/v1/itsm/releases/{id}/transition", post(transition_release))
        .route("/v1/itsm/releases/{id}/changes", post(link_change))
}

/// Attach `change_id` to `release_id`. Withdrawn changes and changes shipped
/// with another release are refused.
fn claim_change(
    state: &AppState,
    org: Uuid,
    change_id: Uuid,
    release_id: Uuid,
) -> Result<ChangeRecord, AppError> {
    state.changes.mutate(org, change_id, |c| {
        if matches!(c.status, ChangeStatus::Rejected | ChangeStatus::Cancelled) {
            return Err(AppError::Conflict(format!("{} is {}", c.number, c.status)));
        }
        match c.release_id {
            Some(existing) if existing != release_id => Err(AppError::Conflict(format!(
                "{} is already part of release {existing}",
                c.number
            ))),
            _ => {
                c.release_id = Some(release_id);
                c.updated_at = Utc::now();
                Ok(c.clone())
            }
        }
    })
}

/// POST /v1/itsm/releases: Plan a release.
#[utoipa::path(
    post,
    path = "/v1/itsm/releases",
    request_body = CreateReleaseRequest,
    responses(
        (status = 201, description = "Release planned", body = ReleaseRecord),
        (status = 409, description = "Version already exists", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "releases"
)]
pub async fn create_release(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    body: Result<Json<CreateReleaseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ReleaseRecord>), AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_validated_json(body)?;
    let now = Utc::now();
    let version = req.version.trim().to_string();
    let record = ReleaseRecord {
        id: Uuid::new_v4(),
        org_id: org,
        number: state.next_ticket_number(org, TicketKind::Release),
        name: req.name.trim().to_string(),
        version: version.clone(),
        description: clean(req.description),
        status: ReleaseStatus::Planned,
        planned_date: req.planned_date,
        deployed_at: None,
        change_ids: Vec::new(),
        history: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    if !state.releases.put_unless(record.clone(), |r| r.version == version) {
        return Err(AppError::Conflict(format!("release version {version} already exists")));
    }
    state.persist(&record, "create", caller.user_id).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /v1/itsm/releases: List releases.
#[utoipa::path(
    get,
    path = "/v1/itsm/releases",
    params(ReleaseQuery),
    responses((status = 200, description = "Page of releases", body = serde_json::Value)),
    tag = "releases"
)]
pub async fn list_releases(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    query: Result<Query<ReleaseQuery>, QueryRejection>,
) -> Result<Json<Page<ReleaseRecord>>, AppError> {
    let q = extract_query(query)?;
    let releases = state
        .releases
        .filter_scoped(org, |r| q.status.map_or(true, |s| r.status == s));
    Ok(Json(paginate(releases, &PageRequest::new(q.limit, q.offset))))
}

/// GET /v1/itsm/releases/{id}: Get a release.
#[utoipa::path(
    get,
    path = "/v1/itsm/releases/{id}",
    params(("id" = Uuid, Path, description = "Release ID")),
    responses(
        (status = 200, description = "Release found", body = ReleaseRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "releases"
)]
pub async fn get_release(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ReleaseRecord>, AppError> {
    state.releases.require(org, id).map(Json)
}

/// PUT /v1/itsm/releases/{id}: Edit a release.
#[utoipa::path(
    put,
    path = "/v1/itsm/releases/{id}",
    params(("id" = Uuid, Path, description = "Release ID")),
    request_body = UpdateReleaseRequest,
    responses(
        (status = 200, description = "Release updated", body = ReleaseRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Release closed", body = crate::error::ErrorBody),
    ),
    tag = "releases"
)]
pub async fn update_release(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateReleaseRequest>, JsonRejection>,
) -> Result<Json<ReleaseRecord>, AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_validated_json(body)?;
    let record = state.releases.mutate(org, id, |r| {
        if r.status.is_terminal() {
            return Err(AppError::Conflict(format!("{} is {}", r.number, r.status)));
        }
        if let Some(name) = req.name {
            r.name = name.trim().to_string();
        }
        if req.description.is_some() {
            r.description = clean(req.description);
        }
        if req.planned_date.is_some() {
            r.planned_date = req.planned_date;
        }
        r.updated_at = Utc::now();
        Ok(r.clone())
    })?;
    state.persist(&record, "update", caller.user_id).await?;
    Ok(Json(record))
}

/// POST /v1/itsm/releases/{id}/transition: Change status.
#[utoipa::path(
    post,
    path = "/v1/itsm/releases/{id}/transition",
    params(("id" = Uuid, Path, description = "Release ID")),
    request_body = ReleaseTransitionRequest,
    responses(
        (status = 200, description = "Status changed", body = ReleaseRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Transition not allowed", body = crate::error::ErrorBody),
    ),
    tag = "releases"
)]
pub async fn transition_release(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ReleaseTransitionRequest>, JsonRejection>,
) -> Result<Json<ReleaseRecord>, AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_json(body)?;
    let reason = clean(req.reason);
    let record = state.releases.mutate(org, id, |r| {
        transition(&mut r.status, req.to, &mut r.history, caller.user_id, reason)?;
        let now = Utc::now();
        if req.to == ReleaseStatus::Deployed {
            r.deployed_at = Some(now);
        }
        r.updated_at = now;
        Ok(r.clone())
    })?;
    state.persist(&record, "transition", caller.user_id).await?;
    tracing::info!(release = %record.number, status = %record.status, "release moved");
    Ok(Json(record))
}

/// POST /v1/itsm/releases/{id}/changes: Link a change.
#[utoipa::path(
    post,
    path = "/v1/itsm/releases/{id}/changes",
    params(("id" = Uuid, Path, description = "Release ID")),
    request_body = LinkChangeRequest,
    responses(
        (status = 200, description = "Change linked", body = ReleaseRecord),
        (status = 404, description = "Release or change not found", body = crate::error::ErrorBody),
        (status = 409, description = "Release closed or change linked elsewhere", body = crate::error::ErrorBody),
    ),
    tag = "releases"
)]
pub async fn link_change(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<LinkChangeRequest>, JsonRejection>,
) -> Result<Json<ReleaseRecord>, AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_json(body)?;
    let release = state.releases.require(org, id)?;
    if release.status.is_terminal() {
        return Err(AppError::Conflict(format!("{} is {}", release.number, release.status)));
    }
    let change = claim_change(&state, org, req.change_id, id)?;
    state.persist(&change, "link_release", caller.user_id).await?;

    let record = state.releases.mutate(org, id, |r| {
        if !r.change_ids.contains(&req.change_id) {
            r.change_ids.push(req.change_id);
            r.updated_at = Utc::now();
        }
        Ok(r.clone())
    })?;
    state.persist(&record, "link_change", caller.user_id).await?;
    Ok(Json(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use desk_core::TicketNumber;
    use desk_state::{ChangeType, RiskLevel};

    fn change(org: Uuid, status: ChangeStatus, release_id: Option<Uuid>) -> ChangeRecord {
        let now = Utc::now();
        ChangeRecord {
            id: Uuid::new_v4(),
            org_id: org,
            number: TicketNumber::new(TicketKind::Change, 12),
            title: "Upgrade database".into(),
            description: None,
            change_type: ChangeType::Normal,
            risk: RiskLevel::High,
            status,
            requester_id: None,
            assignee_id: None,
            approver_id: None,
            approved_at: None,
            planned_start: None,
            planned_end: None,
            implementation_plan: None,
            rollback_plan: None,
            release_id,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn approved_change_is_claimed() {
        let state = AppState::new();
        let org = Uuid::new_v4();
        let release = Uuid::new_v4();
        let c = change(org, ChangeStatus::Approved, None);
        state.changes.put(c.clone());
        let claimed = claim_change(&state, org, c.id, release).unwrap();
        assert_eq!(claimed.release_id, Some(release));
    }

    #[test]
    fn change_in_another_release_conflicts() {
        let state = AppState::new();
        let org = Uuid::new_v4();
        let c = change(org, ChangeStatus::Approved, Some(Uuid::new_v4()));
        state.changes.put(c.clone());
        assert!(matches!(
            claim_change(&state, org, c.id, Uuid::new_v4()),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn rejected_change_cannot_ship() {
        let state = AppState::new();
        let org = Uuid::new_v4();
        let c = change(org, ChangeStatus::Rejected, None);
        state.changes.put(c.clone());
        assert!(matches!(
            claim_change(&state, org, c.id, Uuid::new_v4()),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn foreign_change_is_not_found() {
        let state = AppState::new();
        let c = change(Uuid::new_v4(), ChangeStatus::Approved, None);
        state.changes.put(c.clone());
        assert!(matches!(
            claim_change(&state, Uuid::new_v4(), c.id, Uuid::new_v4()),
            Err(AppError::NotFound(_))
        ));
    }
}
