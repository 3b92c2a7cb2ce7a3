//! # SLA Policies
//!
//! Response and resolution budgets per priority. Incidents pick the oldest
//! active policy for their ticket type, falling back to a policy without a
//! type restriction.

use std::collections::HashSet;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use desk_core::{paginate, BusinessHours, Page, PageRequest, Role};
use desk_engine::{SlaTarget, MAX_BUDGET_MINUTES};
use desk_state::TicketType;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::clean;
use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, require_non_empty, OrgContext, Validate};
use crate::records::SlaPolicyRecord;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSlaRequest {
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = Vec<Object>)]
    pub targets: Vec<SlaTarget>,
    #[schema(value_type = Option<Object>)]
    pub business_hours: Option<BusinessHours>,
    #[schema(value_type = Option<String>)]
    pub ticket_type: Option<TicketType>,
    pub active: Option<bool>,
}

impl Validate for CreateSlaRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("name", &self.name)?;
        validate_targets(&self.targets)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSlaRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<Vec<Object>>)]
    pub targets: Option<Vec<SlaTarget>>,
    #[schema(value_type = Option<Object>)]
    pub business_hours: Option<BusinessHours>,
    /// Drop the business-hours window so clocks run around the clock.
    #[serde(default)]
    pub clear_business_hours: bool,
    #[schema(value_type = Option<String>)]
    pub ticket_type: Option<TicketType>,
    pub active: Option<bool>,
}

impl Validate for UpdateSlaRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            require_non_empty("name", name)?;
        }
        match &self.targets {
            Some(targets) => validate_targets(targets),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SlaQuery {
    pub active: Option<bool>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/itsm/slas", get(list_slas).post(create_sla))
        .route(
            "/v1/itsm/slas/{id}",
            get(get_sla).put(update_sla).delete(delete_sla),
        )
}

/// One target per priority, positive budgets, and a response budget no
/// larger than the resolution budget.
fn validate_targets(targets: &[SlaTarget]) -> Result<(), String> {
    if targets.is_empty() {
        return Err("targets must not be empty".into());
    }
    let mut seen = HashSet::new();
    for t in targets {
        if !seen.insert(t.priority) {
            return Err(format!("duplicate target for priority {:?}", t.priority));
        }
        if t.response_minutes <= 0 || t.resolution_minutes <= 0 {
            return Err("target minutes must be positive".into());
        }
        if t.resolution_minutes > MAX_BUDGET_MINUTES {
            return Err(format!(
                "resolution budget for priority {:?} exceeds {MAX_BUDGET_MINUTES} minutes",
                t.priority
            ));
        }
        if t.response_minutes > t.resolution_minutes {
            return Err(format!(
                "response budget exceeds resolution budget for priority {:?}",
                t.priority
            ));
        }
    }
    Ok(())
}

/// Re-check hours that arrived through deserialization.
fn checked_hours(hours: Option<BusinessHours>) -> Result<Option<BusinessHours>, AppError> {
    hours
        .map(|h| BusinessHours::new(h.start_hour, h.end_hour))
        .transpose()
        .map_err(AppError::from)
}

/// POST /v1/itsm/slas: Create an SLA policy.
#[utoipa::path(
    post,
    path = "/v1/itsm/slas",
    request_body = CreateSlaRequest,
    responses(
        (status = 201, description = "Policy created", body = SlaPolicyRecord),
        (status = 409, description = "Name already used", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "slas"
)]
pub async fn create_sla(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    body: Result<Json<CreateSlaRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SlaPolicyRecord>), AppError> {
    require_role(&caller, Role::Manager)?;
    let req = extract_validated_json(body)?;
    let business_hours = checked_hours(req.business_hours)?;
    let now = Utc::now();
    let name = req.name.trim().to_string();
    let record = SlaPolicyRecord {
        id: Uuid::new_v4(),
        org_id: org,
        name: name.clone(),
        description: clean(req.description),
        targets: req.targets,
        business_hours,
        active: req.active.unwrap_or(true),
        ticket_type: req.ticket_type,
        created_at: now,
        updated_at: now,
    };
    if !state
        .sla_policies
        .put_unless(record.clone(), |p| p.name.eq_ignore_ascii_case(&name))
    {
        return Err(AppError::Conflict(format!("SLA policy '{name}' already exists")));
    }
    state.persist(&record, "create", caller.user_id).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /v1/itsm/slas: List SLA policies.
#[utoipa::path(
    get,
    path = "/v1/itsm/slas",
    params(SlaQuery),
    responses((status = 200, description = "Page of policies", body = serde_json::Value)),
    tag = "slas"
)]
pub async fn list_slas(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    query: Result<Query<SlaQuery>, QueryRejection>,
) -> Result<Json<Page<SlaPolicyRecord>>, AppError> {
    let q = extract_query(query)?;
    let policies = state
        .sla_policies
        .filter_scoped(org, |p| q.active.map_or(true, |a| p.active == a));
    Ok(Json(paginate(policies, &PageRequest::new(q.limit, q.offset))))
}

/// GET /v1/itsm/slas/{id}: Get an SLA policy.
#[utoipa::path(
    get,
    path = "/v1/itsm/slas/{id}",
    params(("id" = Uuid, Path, description = "Policy ID")),
    responses(
        (status = 200, description = "Policy found", body = SlaPolicyRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "slas"
)]
pub async fn get_sla(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
) -> Result<Json<SlaPolicyRecord>, AppError> {
    state.sla_policies.require(org, id).map(Json)
}

/// PUT /v1/itsm/slas/{id}: Update an SLA policy.
///
/// Due dates already stamped on incidents are not recomputed.
#[utoipa::path(
    put,
    path = "/v1/itsm/slas/{id}",
    params(("id" = Uuid, Path, description = "Policy ID")),
    request_body = UpdateSlaRequest,
    responses(
        (status = 200, description = "Policy updated", body = SlaPolicyRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Name already used", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "slas"
)]
pub async fn update_sla(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateSlaRequest>, JsonRejection>,
) -> Result<Json<SlaPolicyRecord>, AppError> {
    require_role(&caller, Role::Manager)?;
    let req = extract_validated_json(body)?;
    let business_hours = checked_hours(req.business_hours)?;
    let name = req.name.as_deref().map(str::trim).map(str::to_string);
    if let Some(name) = &name {
        let taken = !state
            .sla_policies
            .filter_scoped(org, |p| p.id != id && p.name.eq_ignore_ascii_case(name))
            .is_empty();
        if taken {
            return Err(AppError::Conflict(format!("SLA policy '{name}' already exists")));
        }
    }

    let record = state.sla_policies.mutate(org, id, |p| {
        if let Some(name) = name {
            p.name = name;
        }
        if req.description.is_some() {
            p.description = clean(req.description);
        }
        if let Some(targets) = req.targets {
            p.targets = targets;
        }
        if req.clear_business_hours {
            p.business_hours = None;
        } else if business_hours.is_some() {
            p.business_hours = business_hours;
        }
        if req.ticket_type.is_some() {
            p.ticket_type = req.ticket_type;
        }
        if let Some(active) = req.active {
            p.active = active;
        }
        p.updated_at = Utc::now();
        Ok(p.clone())
    })?;
    state.persist(&record, "update", caller.user_id).await?;
    Ok(Json(record))
}

/// DELETE /v1/itsm/slas/{id}: Delete an SLA policy.
#[utoipa::path(
    delete,
    path = "/v1/itsm/slas/{id}",
    params(("id" = Uuid, Path, description = "Policy ID")),
    responses(
        (status = 204, description = "Policy deleted"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "slas"
)]
pub async fn delete_sla(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::Manager)?;
    state.sla_policies.require(org, id)?;
    state.sla_policies.remove(&id);
    state.persist_removal::<SlaPolicyRecord>(id, caller.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
