//! # Users
//!
//! Directory of people in an organization. Users are never hard-deleted:
//! `DELETE` deactivates, so tickets and tasks keep a resolvable assignee.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use desk_core::{paginate, Page, PageRequest, Role};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, require_non_empty, OrgContext, Validate};
use crate::records::UserRecord;
use crate::state::AppState;

const DEFAULT_HOURS_PER_DAY: f64 = 8.0;

fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(format!("'{email}' is not a valid email address")),
    }
}

fn validate_hours(hours: Option<f64>) -> Result<(), String> {
    match hours {
        Some(h) if !(h > 0.0 && h <= 24.0) => Err("hours_per_day must be in (0, 24]".into()),
        _ => Ok(()),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
    /// Defaults to `agent`.
    #[schema(value_type = Option<String>)]
    pub role: Option<Role>,
    /// Defaults to 8.
    pub hours_per_day: Option<f64>,
}

impl Validate for CreateUserRequest {
    fn validate(&self) -> Result<(), String> {
        validate_email(&self.email)?;
        require_non_empty("name", &self.name)?;
        validate_hours(self.hours_per_day)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    #[schema(value_type = Option<String>)]
    pub role: Option<Role>,
    pub active: Option<bool>,
    pub hours_per_day: Option<f64>,
}

impl Validate for UpdateUserRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        if let Some(name) = &self.name {
            require_non_empty("name", name)?;
        }
        validate_hours(self.hours_per_day)
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserQuery {
    pub active: Option<bool>,
    #[param(value_type = Option<String>)]
    pub role: Option<Role>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/users", get(list_users).post(create_user))
        .route(
            "/v1/users/{id}",
            get(get_user).put(update_user).delete(deactivate_user),
        )
}

fn email_taken(state: &AppState, org: Uuid, email: &str, except: Option<Uuid>) -> bool {
    !state
        .users
        .filter_scoped(org, |u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
        .is_empty()
}

/// POST /v1/users: Add a user to the organization.
#[utoipa::path(
    post,
    path = "/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserRecord),
        (status = 409, description = "Email already in use", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserRecord>), AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;
    let now = Utc::now();
    let email = req.email.trim().to_ascii_lowercase();

    let record = UserRecord {
        id: Uuid::new_v4(),
        org_id: org,
        email: email.clone(),
        name: req.name.trim().to_string(),
        role: req.role.unwrap_or(Role::Agent),
        active: true,
        hours_per_day: req.hours_per_day.unwrap_or(DEFAULT_HOURS_PER_DAY),
        created_at: now,
        updated_at: now,
    };

    if !state
        .users
        .put_unless(record.clone(), |u| u.email.eq_ignore_ascii_case(&email))
    {
        return Err(AppError::Conflict(format!("email {email} is already in use")));
    }
    state.persist(&record, "create", caller.user_id).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /v1/users: List users.
#[utoipa::path(
    get,
    path = "/v1/users",
    params(UserQuery),
    responses((status = 200, description = "Page of users", body = serde_json::Value)),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<Page<UserRecord>>, AppError> {
    let q = extract_query(query)?;
    let users = state.users.filter_scoped(org, |u| {
        q.active.map_or(true, |a| u.active == a) && q.role.map_or(true, |r| u.role == r)
    });
    Ok(Json(paginate(users, &PageRequest::new(q.limit, q.offset))))
}

/// GET /v1/users/{id}: Get a user.
#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User found", body = UserRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
) -> Result<Json<UserRecord>, AppError> {
    state.users.require(org, id).map(Json)
}

/// PUT /v1/users/{id}: Update a user.
#[utoipa::path(
    put,
    path = "/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Email already in use", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
pub async fn update_user(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UserRecord>, AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;
    let email = req.email.map(|e| e.trim().to_ascii_lowercase());
    if let Some(email) = &email {
        if email_taken(&state, org, email, Some(id)) {
            return Err(AppError::Conflict(format!("email {email} is already in use")));
        }
    }

    let record = state.users.mutate(org, id, |u| {
        if let Some(email) = email {
            u.email = email;
        }
        if let Some(name) = req.name {
            u.name = name.trim().to_string();
        }
        if let Some(role) = req.role {
            u.role = role;
        }
        if let Some(active) = req.active {
            u.active = active;
        }
        if let Some(hours) = req.hours_per_day {
            u.hours_per_day = hours;
        }
        u.updated_at = Utc::now();
        Ok(u.clone())
    })?;
    state.persist(&record, "update", caller.user_id).await?;
    Ok(Json(record))
}

/// DELETE /v1/users/{id}: Deactivate a user.
#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deactivated", body = UserRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
pub async fn deactivate_user(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<UserRecord>, AppError> {
    require_role(&caller, Role::Admin)?;
    let record = state.users.mutate(org, id, |u| {
        u.active = false;
        u.updated_at = Utc::now();
        Ok(u.clone())
    })?;
    state.persist(&record, "deactivate", caller.user_id).await?;
    tracing::info!(user_id = %id, "user deactivated");
    Ok(Json(record))
}
