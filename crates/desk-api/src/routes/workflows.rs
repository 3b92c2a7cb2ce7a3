//! # Workflows
//!
//! Administrator-defined state machines and the instances running through
//! them. A definition is validated on every write and frozen while it has
//! running instances.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use desk_core::{paginate, Page, PageRequest, Role};
use desk_state::{WorkflowDefinition, WorkflowInstance, WorkflowTransition};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query, OrgContext, PageParams};
use crate::records::{WorkflowInstanceRecord, WorkflowRecord};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWorkflowRequest {
    #[schema(value_type = Object)]
    pub definition: WorkflowDefinition,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateWorkflowRequest {
    #[schema(value_type = Option<Object>)]
    pub definition: Option<WorkflowDefinition>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StartInstanceRequest {
    pub subject_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdvanceRequest {
    /// Name of the transition to take from the current state.
    pub transition: String,
}

/// An instance together with the moves open to it.
#[derive(Debug, Serialize, ToSchema)]
pub struct InstanceView {
    pub instance: WorkflowInstanceRecord,
    pub workflow_name: String,
    #[schema(value_type = Vec<Object>)]
    pub available_transitions: Vec<WorkflowTransition>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WorkflowQuery {
    pub subject_type: Option<String>,
    pub active: Option<bool>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/workflows", get(list_workflows).post(create_workflow))
        .route(
            "/v1/workflows/{id}",
            get(get_workflow).put(update_workflow).delete(delete_workflow),
        )
        .route(
            "/v1/workflows/{id}/instances",
            get(list_instances).post(start_instance),
        )
        .route("/v1/workflow-instances/{id}", get(get_instance))
        .route("/v1/workflow-instances/{id}/advance", post(advance_instance))
}

fn running_instances(state: &AppState, org: Uuid, workflow_id: Uuid) -> usize {
    state
        .workflow_instances
        .filter_scoped(org, |i| i.workflow_id == workflow_id && !i.instance.completed)
        .len()
}

fn ensure_idle(state: &AppState, org: Uuid, workflow: &WorkflowRecord) -> Result<(), AppError> {
    match running_instances(state, org, workflow.id) {
        0 => Ok(()),
        n => Err(AppError::Conflict(format!(
            "workflow '{}' has {n} running instance(s)",
            workflow.definition.name
        ))),
    }
}

fn view(instance: WorkflowInstanceRecord, definition: &WorkflowDefinition) -> InstanceView {
    let available_transitions = if instance.instance.completed {
        Vec::new()
    } else {
        definition
            .available_transitions(&instance.instance.current_state)
            .into_iter()
            .cloned()
            .collect()
    };
    InstanceView {
        workflow_name: definition.name.clone(),
        available_transitions,
        instance,
    }
}

/// POST /v1/workflows: Define a workflow.
#[utoipa::path(
    post,
    path = "/v1/workflows",
    request_body = CreateWorkflowRequest,
    responses(
        (status = 201, description = "Workflow defined", body = WorkflowRecord),
        (status = 409, description = "Name already used", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid definition", body = crate::error::ErrorBody),
    ),
    tag = "workflows"
)]
pub async fn create_workflow(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    body: Result<Json<CreateWorkflowRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<WorkflowRecord>), AppError> {
    require_role(&caller, Role::Admin)?;
    let mut req = extract_json(body)?;
    req.definition.name = req.definition.name.trim().to_string();
    if req.definition.name.is_empty() {
        return Err(AppError::Validation("name must not be empty".into()));
    }
    req.definition.validate()?;

    let now = Utc::now();
    let name = req.definition.name.clone();
    let record = WorkflowRecord {
        id: Uuid::new_v4(),
        org_id: org,
        definition: req.definition,
        active: req.active.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };
    if !state
        .workflows
        .put_unless(record.clone(), |w| w.definition.name.eq_ignore_ascii_case(&name))
    {
        return Err(AppError::Conflict(format!("workflow '{name}' already exists")));
    }
    state.persist(&record, "create", caller.user_id).await?;
    tracing::info!(workflow_id = %record.id, name = %name, "workflow defined");
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /v1/workflows: List workflows.
#[utoipa::path(
    get,
    path = "/v1/workflows",
    params(WorkflowQuery),
    responses((status = 200, description = "Page of workflows", body = serde_json::Value)),
    tag = "workflows"
)]
pub async fn list_workflows(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    query: Result<Query<WorkflowQuery>, QueryRejection>,
) -> Result<Json<Page<WorkflowRecord>>, AppError> {
    let q = extract_query(query)?;
    let workflows = state.workflows.filter_scoped(org, |w| {
        q.active.map_or(true, |a| w.active == a)
            && q.subject_type
                .as_deref()
                .map_or(true, |s| w.definition.subject_type == s)
    });
    Ok(Json(paginate(workflows, &PageRequest::new(q.limit, q.offset))))
}

/// GET /v1/workflows/{id}: Get a workflow.
#[utoipa::path(
    get,
    path = "/v1/workflows/{id}",
    params(("id" = Uuid, Path, description = "Workflow ID")),
    responses(
        (status = 200, description = "Workflow found", body = WorkflowRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "workflows"
)]
pub async fn get_workflow(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowRecord>, AppError> {
    state.workflows.require(org, id).map(Json)
}

/// PUT /v1/workflows/{id}: Replace a definition or toggle it.
///
/// Deactivating is always allowed; changing the definition is refused while
/// instances are running.
#[utoipa::path(
    put,
    path = "/v1/workflows/{id}",
    params(("id" = Uuid, Path, description = "Workflow ID")),
    request_body = UpdateWorkflowRequest,
    responses(
        (status = 200, description = "Workflow updated", body = WorkflowRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Running instances or name clash", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid definition", body = crate::error::ErrorBody),
    ),
    tag = "workflows"
)]
pub async fn update_workflow(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateWorkflowRequest>, JsonRejection>,
) -> Result<Json<WorkflowRecord>, AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_json(body)?;
    let current = state.workflows.require(org, id)?;

    let definition = match req.definition {
        Some(mut definition) => {
            ensure_idle(&state, org, &current)?;
            definition.name = definition.name.trim().to_string();
            if definition.name.is_empty() {
                return Err(AppError::Validation("name must not be empty".into()));
            }
            definition.validate()?;
            let clash = !state
                .workflows
                .filter_scoped(org, |w| {
                    w.id != id && w.definition.name.eq_ignore_ascii_case(&definition.name)
                })
                .is_empty();
            if clash {
                return Err(AppError::Conflict(format!(
                    "workflow '{}' already exists",
                    definition.name
                )));
            }
            Some(definition)
        }
        None => None,
    };

    let record = state.workflows.mutate(org, id, |w| {
        if let Some(definition) = definition {
            w.definition = definition;
        }
        if let Some(active) = req.active {
            w.active = active;
        }
        w.updated_at = Utc::now();
        Ok(w.clone())
    })?;
    state.persist(&record, "update", caller.user_id).await?;
    Ok(Json(record))
}

/// DELETE /v1/workflows/{id}: Delete a workflow and its finished instances.
#[utoipa::path(
    delete,
    path = "/v1/workflows/{id}",
    params(("id" = Uuid, Path, description = "Workflow ID")),
    responses(
        (status = 204, description = "Workflow deleted"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Running instances", body = crate::error::ErrorBody),
    ),
    tag = "workflows"
)]
pub async fn delete_workflow(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::Admin)?;
    let workflow = state.workflows.require(org, id)?;
    ensure_idle(&state, org, &workflow)?;

    for instance in state.workflow_instances.filter_scoped(org, |i| i.workflow_id == id) {
        state.workflow_instances.remove(&instance.id);
        state
            .persist_removal::<WorkflowInstanceRecord>(instance.id, caller.user_id)
            .await?;
    }
    state.workflows.remove(&id);
    state.persist_removal::<WorkflowRecord>(id, caller.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/workflows/{id}/instances: Start an instance.
#[utoipa::path(
    post,
    path = "/v1/workflows/{id}/instances",
    params(("id" = Uuid, Path, description = "Workflow ID")),
    request_body = StartInstanceRequest,
    responses(
        (status = 201, description = "Instance started", body = InstanceView),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Workflow inactive", body = crate::error::ErrorBody),
    ),
    tag = "workflows"
)]
pub async fn start_instance(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<StartInstanceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<InstanceView>), AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_json(body)?;
    let workflow = state.workflows.require(org, id)?;
    if !workflow.active {
        return Err(AppError::Conflict(format!(
            "workflow '{}' is inactive",
            workflow.definition.name
        )));
    }

    let now = Utc::now();
    let record = WorkflowInstanceRecord {
        id: Uuid::new_v4(),
        org_id: org,
        workflow_id: id,
        subject_id: req.subject_id,
        instance: WorkflowInstance::start(&workflow.definition),
        created_at: now,
        updated_at: now,
    };
    state.workflow_instances.put(record.clone());
    state.persist(&record, "start", caller.user_id).await?;
    Ok((StatusCode::CREATED, Json(view(record, &workflow.definition))))
}

/// GET /v1/workflows/{id}/instances: Instances of a workflow.
#[utoipa::path(
    get,
    path = "/v1/workflows/{id}/instances",
    params(("id" = Uuid, Path, description = "Workflow ID"), PageParams),
    responses(
        (status = 200, description = "Page of instances", body = serde_json::Value),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "workflows"
)]
pub async fn list_instances(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
    query: Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<Page<WorkflowInstanceRecord>>, AppError> {
    let q = extract_query(query)?;
    state.workflows.require(org, id)?;
    let instances = state
        .workflow_instances
        .filter_scoped(org, |i| i.workflow_id == id);
    Ok(Json(paginate(instances, &q.page())))
}

/// GET /v1/workflow-instances/{id}: Get an instance and its open moves.
#[utoipa::path(
    get,
    path = "/v1/workflow-instances/{id}",
    params(("id" = Uuid, Path, description = "Instance ID")),
    responses(
        (status = 200, description = "Instance found", body = InstanceView),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "workflows"
)]
pub async fn get_instance(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
) -> Result<Json<InstanceView>, AppError> {
    let instance = state.workflow_instances.require(org, id)?;
    let workflow = state.workflows.require(org, instance.workflow_id)?;
    Ok(Json(view(instance, &workflow.definition)))
}

/// POST /v1/workflow-instances/{id}/advance: Take a named transition.
#[utoipa::path(
    post,
    path = "/v1/workflow-instances/{id}/advance",
    params(("id" = Uuid, Path, description = "Instance ID")),
    request_body = AdvanceRequest,
    responses(
        (status = 200, description = "Instance advanced", body = InstanceView),
        (status = 403, description = "Role too low for transition", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Completed or no such transition", body = crate::error::ErrorBody),
    ),
    tag = "workflows"
)]
pub async fn advance_instance(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<AdvanceRequest>, JsonRejection>,
) -> Result<Json<InstanceView>, AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_json(body)?;
    let current = state.workflow_instances.require(org, id)?;
    let workflow = state.workflows.require(org, current.workflow_id)?;

    let record = state.workflow_instances.mutate(org, id, |i| {
        i.instance
            .advance(&workflow.definition, req.transition.trim(), caller.user_id, caller.role)?;
        i.updated_at = Utc::now();
        Ok(i.clone())
    })?;
    state.persist(&record, "advance", caller.user_id).await?;
    tracing::debug!(
        instance_id = %record.id,
        state = %record.instance.current_state,
        completed = record.instance.completed,
        "workflow advanced"
    );
    Ok(Json(view(record, &workflow.definition)))
}
