//! # Teams
//!
//! Named groups of users. A project's team supplies the members counted in
//! sprint capacity, and a catalog item's fulfillment team receives the
//! service requests opened from it.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::Utc;
use desk_core::{paginate, Page, PageRequest, Role};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{clean, ensure_user};
use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query, extract_validated_json, require_non_empty, OrgContext, Validate};
use crate::records::{TeamRecord, UserRecord};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTeamRequest {
    pub name: String,
    pub description: Option<String>,
    pub lead_id: Option<Uuid>,
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
}

impl Validate for CreateTeamRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("name", &self.name)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTeamRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub lead_id: Option<Uuid>,
}

impl Validate for UpdateTeamRequest {
    fn validate(&self) -> Result<(), String> {
        match &self.name {
            Some(name) => require_non_empty("name", name),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TeamQuery {
    /// Only teams containing this user.
    pub member_id: Option<Uuid>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/teams", get(list_teams).post(create_team))
        .route(
            "/v1/teams/{id}",
            get(get_team).put(update_team).delete(delete_team),
        )
        .route("/v1/teams/{id}/members", get(list_members).post(add_member))
        .route("/v1/teams/{id}/members/{user_id}", delete(remove_member))
}

/// Deduplicate member ids, keeping first-seen order.
fn dedup_members(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut out: Vec<Uuid> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

/// POST /v1/teams: Create a team.
#[utoipa::path(
    post,
    path = "/v1/teams",
    request_body = CreateTeamRequest,
    responses(
        (status = 201, description = "Team created", body = TeamRecord),
        (status = 409, description = "Name already in use", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "teams"
)]
pub async fn create_team(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    body: Result<Json<CreateTeamRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TeamRecord>), AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;
    if let Some(lead) = req.lead_id {
        ensure_user(&state, org, lead)?;
    }
    let member_ids = dedup_members(req.member_ids);
    for member in &member_ids {
        ensure_user(&state, org, *member)?;
    }

    let now = Utc::now();
    let name = req.name.trim().to_string();
    let record = TeamRecord {
        id: Uuid::new_v4(),
        org_id: org,
        name: name.clone(),
        description: clean(req.description),
        lead_id: req.lead_id,
        member_ids,
        created_at: now,
        updated_at: now,
    };
    if !state
        .teams
        .put_unless(record.clone(), |t| t.name.eq_ignore_ascii_case(&name))
    {
        return Err(AppError::Conflict(format!("team '{name}' already exists")));
    }
    state.persist(&record, "create", caller.user_id).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /v1/teams: List teams.
#[utoipa::path(
    get,
    path = "/v1/teams",
    params(TeamQuery),
    responses((status = 200, description = "Page of teams", body = serde_json::Value)),
    tag = "teams"
)]
pub async fn list_teams(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    query: Result<Query<TeamQuery>, QueryRejection>,
) -> Result<Json<Page<TeamRecord>>, AppError> {
    let q = extract_query(query)?;
    let teams = state.teams.filter_scoped(org, |t| {
        q.member_id.map_or(true, |m| t.member_ids.contains(&m))
    });
    Ok(Json(paginate(teams, &PageRequest::new(q.limit, q.offset))))
}

/// GET /v1/teams/{id}: Get a team.
#[utoipa::path(
    get,
    path = "/v1/teams/{id}",
    params(("id" = Uuid, Path, description = "Team ID")),
    responses(
        (status = 200, description = "Team found", body = TeamRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "teams"
)]
pub async fn get_team(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
) -> Result<Json<TeamRecord>, AppError> {
    state.teams.require(org, id).map(Json)
}

/// PUT /v1/teams/{id}: Update a team.
#[utoipa::path(
    put,
    path = "/v1/teams/{id}",
    params(("id" = Uuid, Path, description = "Team ID")),
    request_body = UpdateTeamRequest,
    responses(
        (status = 200, description = "Team updated", body = TeamRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Name already in use", body = crate::error::ErrorBody),
    ),
    tag = "teams"
)]
pub async fn update_team(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateTeamRequest>, JsonRejection>,
) -> Result<Json<TeamRecord>, AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;
    if let Some(lead) = req.lead_id {
        ensure_user(&state, org, lead)?;
    }
    let name = req.name.map(|n| n.trim().to_string());
    if let Some(name) = &name {
        let taken = !state
            .teams
            .filter_scoped(org, |t| t.id != id && t.name.eq_ignore_ascii_case(name))
            .is_empty();
        if taken {
            return Err(AppError::Conflict(format!("team '{name}' already exists")));
        }
    }

    let record = state.teams.mutate(org, id, |t| {
        if let Some(name) = name {
            t.name = name;
        }
        if req.description.is_some() {
            t.description = clean(req.description);
        }
        if req.lead_id.is_some() {
            t.lead_id = req.lead_id;
        }
        t.updated_at = Utc::now();
        Ok(t.clone())
    })?;
    state.persist(&record, "update", caller.user_id).await?;
    Ok(Json(record))
}

/// DELETE /v1/teams/{id}: Delete a team.
///
/// Projects and catalog items that referenced the team keep the stale id;
/// capacity then counts no members and requests go unassigned.
#[utoipa::path(
    delete,
    path = "/v1/teams/{id}",
    params(("id" = Uuid, Path, description = "Team ID")),
    responses(
        (status = 204, description = "Team deleted"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "teams"
)]
pub async fn delete_team(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::Admin)?;
    state.teams.require(org, id)?;
    state.teams.remove(&id);
    state.persist_removal::<TeamRecord>(id, caller.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/teams/{id}/members: Resolve a team's members.
#[utoipa::path(
    get,
    path = "/v1/teams/{id}/members",
    params(("id" = Uuid, Path, description = "Team ID")),
    responses(
        (status = 200, description = "Team members", body = Vec<UserRecord>),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "teams"
)]
pub async fn list_members(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<UserRecord>>, AppError> {
    let team = state.teams.require(org, id)?;
    let members = team
        .member_ids
        .iter()
        .filter_map(|user_id| state.users.get_scoped(org, user_id))
        .collect();
    Ok(Json(members))
}

/// POST /v1/teams/{id}/members: Add a member.
#[utoipa::path(
    post,
    path = "/v1/teams/{id}/members",
    params(("id" = Uuid, Path, description = "Team ID")),
    request_body = AddMemberRequest,
    responses(
        (status = 200, description = "Member added", body = TeamRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already a member", body = crate::error::ErrorBody),
        (status = 422, description = "Unknown or inactive user", body = crate::error::ErrorBody),
    ),
    tag = "teams"
)]
pub async fn add_member(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<AddMemberRequest>, JsonRejection>,
) -> Result<Json<TeamRecord>, AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_json(body)?;
    ensure_user(&state, org, req.user_id)?;

    let record = state.teams.mutate(org, id, |t| {
        if t.member_ids.contains(&req.user_id) {
            return Err(AppError::Conflict(format!(
                "user {} is already a member of {}",
                req.user_id, t.name
            )));
        }
        t.member_ids.push(req.user_id);
        t.updated_at = Utc::now();
        Ok(t.clone())
    })?;
    state.persist(&record, "add_member", caller.user_id).await?;
    Ok(Json(record))
}

/// DELETE /v1/teams/{id}/members/{user_id}: Remove a member.
#[utoipa::path(
    delete,
    path = "/v1/teams/{id}/members/{user_id}",
    params(
        ("id" = Uuid, Path, description = "Team ID"),
        ("user_id" = Uuid, Path, description = "Member user ID"),
    ),
    responses(
        (status = 204, description = "Member removed"),
        (status = 404, description = "Team not found or user not a member", body = crate::error::ErrorBody),
    ),
    tag = "teams"
)]
pub async fn remove_member(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::Admin)?;
    let record = state.teams.mutate(org, id, |t| {
        let before = t.member_ids.len();
        t.member_ids.retain(|m| *m != user_id);
        if t.member_ids.len() == before {
            return Err(AppError::NotFound(format!(
                "user {user_id} is not a member of {}",
                t.name
            )));
        }
        if t.lead_id == Some(user_id) {
            t.lead_id = None;
        }
        t.updated_at = Utc::now();
        Ok(t.clone())
    })?;
    state.persist(&record, "remove_member", caller.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
