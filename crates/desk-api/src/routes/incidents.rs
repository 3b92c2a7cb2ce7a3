//! # Incidents and Service Requests
//!
//! Tickets numbered `INC-000001` per organization. Priority is derived from
//! impact and urgency and never set directly. On creation the best matching
//! active SLA policy is attached and response and resolution due dates are
//! stamped; time spent `ON_HOLD` extends both.
//!
//! Status side effects applied on transition:
//!
//! | Entering | Effect |
//! |---|---|
//! | `ASSIGNED`, `IN_PROGRESS` | first response recorded once |
//! | `ON_HOLD` | hold starts; leaving it adds the held time to `paused_minutes` |
//! | `RESOLVED` | `resolved_at` stamped; reopening clears it |
//! | `CLOSED` | `closed_at` stamped |

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use desk_core::{paginate, BusinessHours, Impact, Page, PageRequest, Priority, Role, TicketKind, Urgency};
use desk_engine::{due_at, evaluate, target_for, SlaEvaluation};
use desk_state::{transition, IncidentStatus, Lifecycle, TicketType};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{clean, ensure_user};
use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query, extract_validated_json, require_non_empty, OrgContext, Validate};
use crate::records::{hold_minutes, IncidentRecord, NotificationKind, SlaPolicyRecord};
use crate::state::AppState;

// -- Shared helpers -----------------------------------------------------------

/// The active SLA policy for `ticket_type`: a policy restricted to that type
/// wins over a general one, and the oldest wins among equals.
pub(crate) fn policy_for(state: &AppState, org: Uuid, ticket_type: TicketType) -> Option<SlaPolicyRecord> {
    let candidates = state.sla_policies.filter_scoped(org, |p| {
        p.active && p.ticket_type.map_or(true, |t| t == ticket_type)
    });
    candidates
        .iter()
        .find(|p| p.ticket_type == Some(ticket_type))
        .or_else(|| candidates.first())
        .cloned()
}

/// Stamp due dates from `policy` for the incident's current priority,
/// shifted by the time already spent on hold.
fn apply_sla(incident: &mut IncidentRecord, policy: Option<&SlaPolicyRecord>) {
    incident.sla_policy_id = policy.map(|p| p.id);
    let target = policy.and_then(|p| target_for(&p.targets, incident.priority).map(|t| (t, p)));
    match target {
        Some((t, p)) => {
            let hours = p.business_hours.as_ref();
            incident.response_due_at = Some(due_at(incident.created_at, t.response_minutes, hours));
            incident.resolution_due_at = Some(due_at(
                incident.created_at,
                t.resolution_minutes.saturating_add(incident.paused_minutes),
                hours,
            ));
        }
        None => {
            incident.response_due_at = None;
            incident.resolution_due_at = None;
        }
    }
}

/// Apply the timestamps that accompany entering `to` (see module docs).
fn apply_status_effects(
    incident: &mut IncidentRecord,
    from: IncidentStatus,
    to: IncidentStatus,
    now: DateTime<Utc>,
    hours: Option<&BusinessHours>,
) {
    if from.pauses_sla() {
        if let Some(since) = incident.on_hold_since.take() {
            incident.paused_minutes += hold_minutes(since, now, hours);
        }
    }
    match to {
        IncidentStatus::Assigned | IncidentStatus::InProgress => {
            incident.first_response_at.get_or_insert(now);
            if from == IncidentStatus::Resolved {
                incident.resolved_at = None;
            }
        }
        IncidentStatus::OnHold => incident.on_hold_since = Some(now),
        IncidentStatus::Resolved => incident.resolved_at = Some(now),
        IncidentStatus::Closed => incident.closed_at = Some(now),
        IncidentStatus::New | IncidentStatus::Cancelled => {}
    }
}

/// Fields of a ticket about to be opened, from the incident form or a
/// catalog request.
pub(crate) struct IncidentDraft {
    pub ticket_type: TicketType,
    pub title: String,
    pub description: Option<String>,
    pub impact: Impact,
    pub urgency: Urgency,
    pub assignee_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub category: Option<String>,
    pub catalog_item_id: Option<Uuid>,
    pub request_details: Option<serde_json::Value>,
}

/// Number, prioritize, attach an SLA and store a new ticket. An initial
/// assignee moves it straight to `ASSIGNED` and is notified.
pub(crate) async fn open_incident(
    state: &AppState,
    org: Uuid,
    caller: &CallerIdentity,
    draft: IncidentDraft,
) -> Result<IncidentRecord, AppError> {
    if let Some(assignee) = draft.assignee_id {
        ensure_user(state, org, assignee)?;
    }
    if let Some(team) = draft.team_id {
        state
            .teams
            .require(org, team)
            .map_err(|_| AppError::Validation(format!("team {team} does not exist")))?;
    }

    let now = Utc::now();
    let number = state.next_ticket_number(org, TicketKind::Incident);
    let mut record = IncidentRecord {
        id: Uuid::new_v4(),
        org_id: org,
        number,
        ticket_type: draft.ticket_type,
        title: draft.title.trim().to_string(),
        description: clean(draft.description),
        impact: draft.impact,
        urgency: draft.urgency,
        priority: Priority::from_matrix(draft.impact, draft.urgency),
        status: IncidentStatus::New,
        assignee_id: draft.assignee_id,
        team_id: draft.team_id,
        reporter_id: caller.user_id,
        category: clean(draft.category),
        problem_id: None,
        catalog_item_id: draft.catalog_item_id,
        sla_policy_id: None,
        response_due_at: None,
        resolution_due_at: None,
        first_response_at: None,
        resolved_at: None,
        closed_at: None,
        on_hold_since: None,
        paused_minutes: 0,
        resolution_notes: None,
        request_details: draft.request_details,
        history: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    let policy = policy_for(state, org, record.ticket_type);
    apply_sla(&mut record, policy.as_ref());
    if record.assignee_id.is_some() {
        transition(
            &mut record.status,
            IncidentStatus::Assigned,
            &mut record.history,
            caller.user_id,
            Some("assigned on creation".into()),
        )?;
        apply_status_effects(&mut record, IncidentStatus::New, IncidentStatus::Assigned, now, None);
    }

    state.incidents.put(record.clone());
    state.persist(&record, "create", caller.user_id).await?;
    tracing::info!(
        incident_id = %record.id,
        number = %record.number,
        priority = %record.priority,
        "ticket opened"
    );
    if let Some(assignee) = record.assignee_id {
        notify_assigned(state, &record, assignee, caller).await;
    }
    Ok(record)
}

async fn notify_assigned(state: &AppState, incident: &IncidentRecord, assignee: Uuid, caller: &CallerIdentity) {
    if caller.user_id == Some(assignee) {
        return;
    }
    state
        .notify(
            incident.org_id,
            assignee,
            NotificationKind::IncidentAssigned,
            format!("{} assigned to you: {}", incident.number, incident.title),
            Some(format!("/v1/itsm/incidents/{}", incident.id)),
        )
        .await;
}

/// Resolution clock of an incident at `now`, if it has an SLA target.
pub(crate) fn resolution_sla(state: &AppState, incident: &IncidentRecord, now: DateTime<Utc>) -> Option<SlaEvaluation> {
    sla_status(state, incident, now).resolution
}

fn sla_status(state: &AppState, incident: &IncidentRecord, now: DateTime<Utc>) -> IncidentSla {
    let policy = incident
        .sla_policy_id
        .and_then(|id| state.sla_policies.get_scoped(incident.org_id, &id));
    let target = policy
        .as_ref()
        .and_then(|p| target_for(&p.targets, incident.priority).copied());
    let hours = policy.as_ref().and_then(|p| p.business_hours);
    let (response, resolution) = match target {
        Some(t) => {
            let paused = incident.paused_minutes_at(now, hours.as_ref());
            (
                Some(evaluate(
                    incident.created_at,
                    t.response_minutes,
                    0,
                    incident.first_response_at,
                    now,
                    hours.as_ref(),
                )),
                Some(evaluate(
                    incident.created_at,
                    t.resolution_minutes,
                    paused,
                    incident.resolved_at,
                    now,
                    hours.as_ref(),
                )),
            )
        }
        None => (None, None),
    };
    IncidentSla {
        incident_id: incident.id,
        policy_id: policy.as_ref().map(|p| p.id),
        policy_name: policy.map(|p| p.name),
        priority: incident.priority,
        paused: incident.status.pauses_sla(),
        response,
        resolution,
    }
}

// -- Request / response types -------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateIncidentRequest {
    pub title: String,
    pub description: Option<String>,
    /// Defaults to `INCIDENT`.
    #[schema(value_type = Option<String>)]
    pub ticket_type: Option<TicketType>,
    /// Defaults to `MEDIUM`.
    #[schema(value_type = Option<String>)]
    pub impact: Option<Impact>,
    /// Defaults to `MEDIUM`.
    #[schema(value_type = Option<String>)]
    pub urgency: Option<Urgency>,
    pub category: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
}

impl Validate for CreateIncidentRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("title", &self.title)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateIncidentRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<String>)]
    pub impact: Option<Impact>,
    #[schema(value_type = Option<String>)]
    pub urgency: Option<Urgency>,
    pub category: Option<String>,
    pub team_id: Option<Uuid>,
    pub resolution_notes: Option<String>,
}

impl Validate for UpdateIncidentRequest {
    fn validate(&self) -> Result<(), String> {
        match &self.title {
            Some(title) => require_non_empty("title", title),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TransitionRequest {
    /// Target status, e.g. `IN_PROGRESS`.
    #[schema(value_type = String)]
    pub to: IncidentStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignIncidentRequest {
    pub assignee_id: Uuid,
    pub team_id: Option<Uuid>,
}

/// Live SLA clocks of an incident.
#[derive(Debug, Serialize, ToSchema)]
pub struct IncidentSla {
    pub incident_id: Uuid,
    pub policy_id: Option<Uuid>,
    pub policy_name: Option<String>,
    #[schema(value_type = String)]
    pub priority: Priority,
    /// Whether the resolution clock is currently stopped.
    pub paused: bool,
    #[schema(value_type = Option<Object>)]
    pub response: Option<SlaEvaluation>,
    #[schema(value_type = Option<Object>)]
    pub resolution: Option<SlaEvaluation>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct IncidentQuery {
    #[param(value_type = Option<String>)]
    pub status: Option<IncidentStatus>,
    #[param(value_type = Option<String>)]
    pub priority: Option<Priority>,
    #[param(value_type = Option<String>)]
    pub ticket_type: Option<TicketType>,
    pub assignee_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    /// Only tickets that still need work.
    pub open: Option<bool>,
    /// Case-insensitive match on the title.
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/itsm/incidents", get(list_incidents).post(create_incident))
        .route("/v1/itsm/incidents/{id}", get(get_incident).put(update_incident))
        .route("/v1/itsm/incidents/{id}/transition", post(transition_incident))
        .route("/v1/itsm/incidents/{id}/assign", post(assign_incident))
        .route("/v1/itsm/incidents/{id}/sla", get(get_incident_sla))
}

// -- Handlers -----------------------------------------------------------------

/// POST /v1/itsm/incidents: Report an incident or request.
#[utoipa::path(
    post,
    path = "/v1/itsm/incidents",
    request_body = CreateIncidentRequest,
    responses(
        (status = 201, description = "Ticket opened", body = IncidentRecord),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "incidents"
)]
pub async fn create_incident(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    body: Result<Json<CreateIncidentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<IncidentRecord>), AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_validated_json(body)?;
    let record = open_incident(
        &state,
        org,
        &caller,
        IncidentDraft {
            ticket_type: req.ticket_type.unwrap_or_default(),
            title: req.title,
            description: req.description,
            impact: req.impact.unwrap_or(Impact::Medium),
            urgency: req.urgency.unwrap_or(Urgency::Medium),
            assignee_id: req.assignee_id,
            team_id: req.team_id,
            category: req.category,
            catalog_item_id: None,
            request_details: None,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /v1/itsm/incidents: List tickets.
#[utoipa::path(
    get,
    path = "/v1/itsm/incidents",
    params(IncidentQuery),
    responses((status = 200, description = "Page of tickets", body = serde_json::Value)),
    tag = "incidents"
)]
pub async fn list_incidents(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    query: Result<Query<IncidentQuery>, QueryRejection>,
) -> Result<Json<Page<IncidentRecord>>, AppError> {
    let q = extract_query(query)?;
    let search = q.search.as_deref().map(str::to_lowercase);
    let incidents = state.incidents.filter_scoped(org, |i| {
        q.status.map_or(true, |s| i.status == s)
            && q.priority.map_or(true, |p| i.priority == p)
            && q.ticket_type.map_or(true, |t| i.ticket_type == t)
            && q.assignee_id.map_or(true, |a| i.assignee_id == Some(a))
            && q.team_id.map_or(true, |t| i.team_id == Some(t))
            && q.open.map_or(true, |o| i.status.is_open() == o)
            && search
                .as_ref()
                .map_or(true, |s| i.title.to_lowercase().contains(s.as_str()))
    });
    Ok(Json(paginate(incidents, &PageRequest::new(q.limit, q.offset))))
}

/// GET /v1/itsm/incidents/{id}: Get a ticket.
#[utoipa::path(
    get,
    path = "/v1/itsm/incidents/{id}",
    params(("id" = Uuid, Path, description = "Incident ID")),
    responses(
        (status = 200, description = "Ticket found", body = IncidentRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "incidents"
)]
pub async fn get_incident(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
) -> Result<Json<IncidentRecord>, AppError> {
    state.incidents.require(org, id).map(Json)
}

/// PUT /v1/itsm/incidents/{id}: Edit a ticket. Changing impact or urgency
/// re-prioritizes it and recomputes the due dates.
#[utoipa::path(
    put,
    path = "/v1/itsm/incidents/{id}",
    params(("id" = Uuid, Path, description = "Incident ID")),
    request_body = UpdateIncidentRequest,
    responses(
        (status = 200, description = "Ticket updated", body = IncidentRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Ticket closed", body = crate::error::ErrorBody),
    ),
    tag = "incidents"
)]
pub async fn update_incident(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateIncidentRequest>, JsonRejection>,
) -> Result<Json<IncidentRecord>, AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_validated_json(body)?;
    if let Some(team) = req.team_id {
        state
            .teams
            .require(org, team)
            .map_err(|_| AppError::Validation(format!("team {team} does not exist")))?;
    }
    let current = state.incidents.require(org, id)?;
    let policy = current
        .sla_policy_id
        .and_then(|p| state.sla_policies.get_scoped(org, &p));

    let record = state.incidents.mutate(org, id, |i| {
        if i.status.is_terminal() {
            return Err(AppError::Conflict(format!("{} is {}", i.number, i.status)));
        }
        if let Some(title) = req.title {
            i.title = title.trim().to_string();
        }
        if req.description.is_some() {
            i.description = clean(req.description);
        }
        if req.category.is_some() {
            i.category = clean(req.category);
        }
        if req.team_id.is_some() {
            i.team_id = req.team_id;
        }
        if req.resolution_notes.is_some() {
            i.resolution_notes = clean(req.resolution_notes);
        }
        i.impact = req.impact.unwrap_or(i.impact);
        i.urgency = req.urgency.unwrap_or(i.urgency);
        let priority = Priority::from_matrix(i.impact, i.urgency);
        if priority != i.priority {
            i.priority = priority;
            apply_sla(i, policy.as_ref());
        }
        i.updated_at = Utc::now();
        Ok(i.clone())
    })?;
    state.persist(&record, "update", caller.user_id).await?;
    Ok(Json(record))
}

/// POST /v1/itsm/incidents/{id}/transition: Change status.
#[utoipa::path(
    post,
    path = "/v1/itsm/incidents/{id}/transition",
    params(("id" = Uuid, Path, description = "Incident ID")),
    request_body = TransitionRequest,
    responses(
        (status = 200, description = "Status changed", body = IncidentRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Transition not allowed", body = crate::error::ErrorBody),
    ),
    tag = "incidents"
)]
pub async fn transition_incident(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<TransitionRequest>, JsonRejection>,
) -> Result<Json<IncidentRecord>, AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_json(body)?;
    let current = state.incidents.require(org, id)?;
    let policy = current
        .sla_policy_id
        .and_then(|p| state.sla_policies.get_scoped(org, &p));
    let hours = policy.as_ref().and_then(|p| p.business_hours);
    let reason = clean(req.reason);

    let record = state.incidents.mutate(org, id, |i| {
        let from = i.status;
        transition(&mut i.status, req.to, &mut i.history, caller.user_id, reason.clone())?;
        let now = Utc::now();
        apply_status_effects(i, from, req.to, now, hours.as_ref());
        if from.pauses_sla() {
            apply_sla(i, policy.as_ref());
        }
        if req.to == IncidentStatus::Resolved && reason.is_some() && i.resolution_notes.is_none() {
            i.resolution_notes = reason;
        }
        i.updated_at = now;
        Ok(i.clone())
    })?;
    state.persist(&record, "transition", caller.user_id).await?;
    tracing::info!(incident_id = %id, from = %current.status, to = %record.status, "incident transitioned");
    Ok(Json(record))
}

/// POST /v1/itsm/incidents/{id}/assign: Assign to an agent.
#[utoipa::path(
    post,
    path = "/v1/itsm/incidents/{id}/assign",
    params(("id" = Uuid, Path, description = "Incident ID")),
    request_body = AssignIncidentRequest,
    responses(
        (status = 200, description = "Ticket assigned", body = IncidentRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Ticket no longer open", body = crate::error::ErrorBody),
        (status = 422, description = "Unknown assignee", body = crate::error::ErrorBody),
    ),
    tag = "incidents"
)]
pub async fn assign_incident(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<AssignIncidentRequest>, JsonRejection>,
) -> Result<Json<IncidentRecord>, AppError> {
    require_role(&caller, Role::Agent)?;
    let req = extract_json(body)?;
    ensure_user(&state, org, req.assignee_id)?;
    if let Some(team) = req.team_id {
        state
            .teams
            .require(org, team)
            .map_err(|_| AppError::Validation(format!("team {team} does not exist")))?;
    }

    let record = state.incidents.mutate(org, id, |i| {
        if !i.status.is_open() {
            return Err(AppError::Conflict(format!(
                "{} is {} and cannot be reassigned",
                i.number, i.status
            )));
        }
        let now = Utc::now();
        if i.status == IncidentStatus::New {
            transition(&mut i.status, IncidentStatus::Assigned, &mut i.history, caller.user_id, None)?;
            apply_status_effects(i, IncidentStatus::New, IncidentStatus::Assigned, now, None);
        }
        i.assignee_id = Some(req.assignee_id);
        if req.team_id.is_some() {
            i.team_id = req.team_id;
        }
        i.updated_at = now;
        Ok(i.clone())
    })?;
    state.persist(&record, "assign", caller.user_id).await?;
    notify_assigned(&state, &record, req.assignee_id, &caller).await;
    Ok(Json(record))
}

/// GET /v1/itsm/incidents/{id}/sla: Live response and resolution clocks.
#[utoipa::path(
    get,
    path = "/v1/itsm/incidents/{id}/sla",
    params(("id" = Uuid, Path, description = "Incident ID")),
    responses(
        (status = 200, description = "SLA status", body = IncidentSla),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "incidents"
)]
pub async fn get_incident_sla(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    Path(id): Path<Uuid>,
) -> Result<Json<IncidentSla>, AppError> {
    let incident = state.incidents.require(org, id)?;
    Ok(Json(sla_status(&state, &incident, Utc::now())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use desk_core::TicketNumber;
    use desk_engine::SlaTarget;

    fn incident(org: Uuid) -> IncidentRecord {
        let now = Utc::now();
        IncidentRecord {
            id: Uuid::new_v4(),
            org_id: org,
            number: TicketNumber::new(TicketKind::Incident, 1),
            ticket_type: TicketType::Incident,
            title: "Mail down".into(),
            description: None,
            impact: Impact::High,
            urgency: Urgency::High,
            priority: Priority::Critical,
            status: IncidentStatus::InProgress,
            assignee_id: None,
            team_id: None,
            reporter_id: None,
            category: None,
            problem_id: None,
            catalog_item_id: None,
            sla_policy_id: None,
            response_due_at: None,
            resolution_due_at: None,
            first_response_at: None,
            resolved_at: None,
            closed_at: None,
            on_hold_since: None,
            paused_minutes: 0,
            resolution_notes: None,
            request_details: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn policy(org: Uuid, name: &str, ticket_type: Option<TicketType>, active: bool) -> SlaPolicyRecord {
        let now = Utc::now();
        SlaPolicyRecord {
            id: Uuid::new_v4(),
            org_id: org,
            name: name.into(),
            description: None,
            targets: vec![SlaTarget {
                priority: Priority::Critical,
                response_minutes: 15,
                resolution_minutes: 240,
            }],
            business_hours: None,
            active,
            ticket_type,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn type_specific_policy_wins() {
        let state = AppState::new();
        let org = Uuid::new_v4();
        state.sla_policies.put(policy(org, "general", None, true));
        state
            .sla_policies
            .put(policy(org, "requests", Some(TicketType::ServiceRequest), true));
        state
            .sla_policies
            .put(policy(org, "incidents-off", Some(TicketType::Incident), false));

        assert_eq!(policy_for(&state, org, TicketType::ServiceRequest).unwrap().name, "requests");
        assert_eq!(policy_for(&state, org, TicketType::Incident).unwrap().name, "general");
        assert!(policy_for(&state, Uuid::new_v4(), TicketType::Incident).is_none());
    }

    #[test]
    fn due_dates_follow_priority_target() {
        let org = Uuid::new_v4();
        let p = policy(org, "general", None, true);
        let mut i = incident(org);
        apply_sla(&mut i, Some(&p));
        assert_eq!(i.sla_policy_id, Some(p.id));
        assert_eq!(i.response_due_at, Some(i.created_at + Duration::minutes(15)));
        assert_eq!(i.resolution_due_at, Some(i.created_at + Duration::minutes(240)));

        i.priority = Priority::Low;
        apply_sla(&mut i, Some(&p));
        assert!(i.resolution_due_at.is_none());
    }

    #[test]
    fn leaving_hold_accumulates_paused_minutes() {
        let mut i = incident(Uuid::new_v4());
        let start = Utc::now();
        apply_status_effects(&mut i, IncidentStatus::InProgress, IncidentStatus::OnHold, start, None);
        assert_eq!(i.on_hold_since, Some(start));
        apply_status_effects(
            &mut i,
            IncidentStatus::OnHold,
            IncidentStatus::InProgress,
            start + Duration::minutes(30),
            None,
        );
        assert_eq!(i.paused_minutes, 30);
        assert!(i.on_hold_since.is_none());
    }

    #[test]
    fn reopening_clears_resolution() {
        let mut i = incident(Uuid::new_v4());
        let now = Utc::now();
        apply_status_effects(&mut i, IncidentStatus::InProgress, IncidentStatus::Resolved, now, None);
        assert_eq!(i.resolved_at, Some(now));
        apply_status_effects(&mut i, IncidentStatus::Resolved, IncidentStatus::InProgress, now, None);
        assert!(i.resolved_at.is_none());
    }

    #[test]
    fn first_response_is_recorded_once() {
        let mut i = incident(Uuid::new_v4());
        let first = Utc::now();
        apply_status_effects(&mut i, IncidentStatus::New, IncidentStatus::Assigned, first, None);
        apply_status_effects(
            &mut i,
            IncidentStatus::Assigned,
            IncidentStatus::InProgress,
            first + Duration::minutes(5),
            None,
        );
        assert_eq!(i.first_response_at, Some(first));
    }
}
