//! # Service Catalog
//!
//! Orderable items. Ordering an active item opens a `SERVICE_REQUEST` ticket
//! routed to the item's fulfillment team, with the requester's answers kept
//! as `request_details`.

use std::collections::HashSet;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use desk_core::{paginate, Impact, Page, PageRequest, Role, Urgency};
use desk_state::TicketType;
use serde::Deserialize;
use serde_json::{Map, Value};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::clean;
use super::incidents::{open_incident, IncidentDraft};
use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query, extract_validated_json, require_non_empty, OrgContext, Validate};
use crate::records::{CatalogField, CatalogItemRecord, IncidentRecord};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCatalogItemRequest {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub fulfillment_team_id: Option<Uuid>,
    #[schema(value_type = Option<String>)]
    pub default_impact: Option<Impact>,
    #[schema(value_type = Option<String>)]
    pub default_urgency: Option<Urgency>,
    #[serde(default)]
    pub fields: Vec<CatalogField>,
    pub active: Option<bool>,
}

impl Validate for CreateCatalogItemRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("name", &self.name)?;
        validate_fields(&self.fields)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCatalogItemRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub fulfillment_team_id: Option<Uuid>,
    #[schema(value_type = Option<String>)]
    pub default_impact: Option<Impact>,
    #[schema(value_type = Option<String>)]
    pub default_urgency: Option<Urgency>,
    pub fields: Option<Vec<CatalogField>>,
    pub active: Option<bool>,
}

impl Validate for UpdateCatalogItemRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            require_non_empty("name", name)?;
        }
        match &self.fields {
            Some(fields) => validate_fields(fields),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ServiceRequestBody {
    /// Defaults to the item name.
    pub title: Option<String>,
    pub description: Option<String>,
    /// Answers keyed by field name.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub details: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CatalogQuery {
    pub category: Option<String>,
    pub active: Option<bool>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/itsm/catalog", get(list_items).post(create_item))
        .route(
            "/v1/itsm/catalog/{id}",
            get(get_item).put(update_item).delete(delete_item),
        )
        .route("/v1/itsm/catalog/{id}/requests", post(request_item))
}

fn validate_fields(fields: &[CatalogField]) -> Result<(), String> {
    let mut seen = HashSet::new();
    for field in fields {
        require_non_empty("field name", &field.name)?;
        if !seen.insert(field.name.trim()) {
            return Err(format!("duplicate field '{}'", field.name.trim()));
        }
    }
    Ok(())
}

fn normalize_fields(fields: Vec<CatalogField>) -> Vec<CatalogField> {
    fields
        .into_iter()
        .map(|f| CatalogField {
            name: f.name.trim().to_string(),
            label: clean(f.label),
            required: f.required,
        })
        .collect()
}

/// Check a requester's answers against the item's fields: every required
/// field answered, nothing the item does not ask for.
fn check_details(fields: &[CatalogField], details: &Map<String, Value>) -> Result<(), AppError> {
    for key in details.keys() {
        if !fields.iter().any(|f| &f.name == key) {
            return Err(AppError::Validation(format!("unknown field '{key}'")));
        }
    }
    let missing: Vec<&str> = fields
        .iter()
        .filter(|f| f.required)
        .filter(|f| match details.get(&f.name) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .map(|f| f.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

fn ensure_team(state: &AppState, org: Uuid, team: Option<Uuid>) -> Result<(), AppError> {
    if let Some(team) = team {
        state
            .teams
            .require(org, team)
            .map_err(|_| AppError::Validation(format!("team {team} does not exist")))?;
    }
    Ok(())
}

/// POST /v1/itsm/catalog: Add a catalog item.
#[utoipa::path(
    post,
    path = "/v1/itsm/catalog",
    request_body = CreateCatalogItemRequest,
    responses(
        (status = 201, description = "Item created", body = CatalogItemRecord),
        (status = 409, description = "Name already used", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub async fn create_item(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    body: Result<Json<CreateCatalogItemRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CatalogItemRecord>), AppError> {
    require_role(&caller, Role::Manager)?;
    let req = extract_validated_json(body)?;
    ensure_team(&state, org, req.fulfillment_team_id)?;
    let now = Utc::now();
    let name = req.name.trim().to_string();
    let record = CatalogItemRecord {
        id: Uuid::new_v4(),
        org_id: org,
        name: name.clone(),
        description: clean(req.description),
        category: clean(req.category),
        fulfillment_team_id: req.fulfillment_team_id,
        default_impact: req.default_impact.unwrap_or(Impact::Medium),
        default_urgency: req.default_urgency.unwrap_or(Urgency::Medium),
        active: req.active.unwrap_or(true),
        fields: normalize_fields(req.fields),
        created_at: now,
        updated_at: now,
    };
    if !state
        .catalog
        .put_unless(record.clone(), |i| i.name.eq_ignore_ascii_case(&name))
    {
        return Err(AppError::Conflict(format!("catalog item '{name}' already exists")));
    }
    state.persist(&record, "create", caller.user_id).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /v1/itsm/catalog: Browse the catalog.
#[utoipa::path(
    get,
    path = "/v1/itsm/catalog",
    params(CatalogQuery),
    responses((status = 200, description = "Page of items", body = serde_json::Value)),
    tag = "catalog"
)]
pub async fn list_items(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    query: Result<Query<CatalogQuery>, QueryRejection>,
) -> Result<Json<Page<CatalogItemRecord>>, AppError> {
    let q = extract_query(query)?;
    let items = state.catalog.filter_scoped(org, |i| {
        q.active.map_or(true, |a| i.active == a)
            && q.category.as_deref().map_or(true, |c| {
                i.category.as_deref().is_some_and(|ic| ic.eq_ignore_ascii_case(c))
            })
    });
    Ok(Json(paginate(items, &PageRequest::new(q.limit, q.offset))))
}

/// GET /v1/itsm/catalog/{id}: Get a catalog item.
#[utoipa::path(
    get,
    path = "/v1/itsm/catalog/{id}",
    params(("id" = Uuid, Path, description = "Catalog item ID")),
    responses(
        (status = 200, description = "Item found", body = CatalogItemRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub async fn get_item(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
) -> Result<Json<CatalogItemRecord>, AppError> {
    state.catalog.require(org, id).map(Json)
}

/// PUT /v1/itsm/catalog/{id}: Update a catalog item.
#[utoipa::path(
    put,
    path = "/v1/itsm/catalog/{id}",
    params(("id" = Uuid, Path, description = "Catalog item ID")),
    request_body = UpdateCatalogItemRequest,
    responses(
        (status = 200, description = "Item updated", body = CatalogItemRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Name already used", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub async fn update_item(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateCatalogItemRequest>, JsonRejection>,
) -> Result<Json<CatalogItemRecord>, AppError> {
    require_role(&caller, Role::Manager)?;
    let req = extract_validated_json(body)?;
    ensure_team(&state, org, req.fulfillment_team_id)?;
    let name = req.name.as_deref().map(str::trim).map(str::to_string);
    if let Some(name) = &name {
        let taken = !state
            .catalog
            .filter_scoped(org, |i| i.id != id && i.name.eq_ignore_ascii_case(name))
            .is_empty();
        if taken {
            return Err(AppError::Conflict(format!("catalog item '{name}' already exists")));
        }
    }

    let record = state.catalog.mutate(org, id, |i| {
        if let Some(name) = name {
            i.name = name;
        }
        if req.description.is_some() {
            i.description = clean(req.description);
        }
        if req.category.is_some() {
            i.category = clean(req.category);
        }
        if req.fulfillment_team_id.is_some() {
            i.fulfillment_team_id = req.fulfillment_team_id;
        }
        if let Some(impact) = req.default_impact {
            i.default_impact = impact;
        }
        if let Some(urgency) = req.default_urgency {
            i.default_urgency = urgency;
        }
        if let Some(fields) = req.fields {
            i.fields = normalize_fields(fields);
        }
        if let Some(active) = req.active {
            i.active = active;
        }
        i.updated_at = Utc::now();
        Ok(i.clone())
    })?;
    state.persist(&record, "update", caller.user_id).await?;
    Ok(Json(record))
}

/// DELETE /v1/itsm/catalog/{id}: Remove a catalog item.
#[utoipa::path(
    delete,
    path = "/v1/itsm/catalog/{id}",
    params(("id" = Uuid, Path, description = "Catalog item ID")),
    responses(
        (status = 204, description = "Item removed"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub async fn delete_item(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::Manager)?;
    state.catalog.require(org, id)?;
    state.catalog.remove(&id);
    state.persist_removal::<CatalogItemRecord>(id, caller.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/itsm/catalog/{id}/requests: Order a catalog item.
#[utoipa::path(
    post,
    path = "/v1/itsm/catalog/{id}/requests",
    params(("id" = Uuid, Path, description = "Catalog item ID")),
    request_body = ServiceRequestBody,
    responses(
        (status = 201, description = "Service request opened", body = IncidentRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Item retired", body = crate::error::ErrorBody),
        (status = 422, description = "Missing or unknown fields", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub async fn request_item(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ServiceRequestBody>, JsonRejection>,
) -> Result<(StatusCode, Json<IncidentRecord>), AppError> {
    let req = extract_json(body)?;
    let item = state.catalog.require(org, id)?;
    if !item.active {
        return Err(AppError::Conflict(format!("catalog item '{}' is retired", item.name)));
    }
    check_details(&item.fields, &req.details)?;

    let title = clean(req.title).unwrap_or_else(|| item.name.clone());
    let draft = IncidentDraft {
        ticket_type: TicketType::ServiceRequest,
        title,
        description: req.description,
        impact: item.default_impact,
        urgency: item.default_urgency,
        assignee_id: None,
        team_id: item.fulfillment_team_id,
        category: item.category.clone(),
        catalog_item_id: Some(item.id),
        request_details: Some(Value::Object(req.details)),
    };
    let record = open_incident(&state, org, &caller, draft).await?;
    Ok((StatusCode::CREATED, Json(record)))
}
