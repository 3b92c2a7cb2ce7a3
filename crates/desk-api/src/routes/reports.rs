//! # Reports
//!
//! Read-only dashboards computed from the organization's in-memory records
//! on every request.

use std::collections::BTreeMap;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use desk_engine::{status_breakdown, IncidentFacts, IncidentMetrics, SlaState};
use desk_state::LeaveStatus;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::incidents::resolution_sla;
use crate::error::AppError;
use crate::extractors::{extract_query, OrgContext};
use crate::records::IncidentRecord;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct SummaryReport {
    pub generated_at: DateTime<Utc>,
    pub incidents_by_status: BTreeMap<String, usize>,
    pub open_incidents: usize,
    /// Open incidents past their resolution due date.
    pub breached_open_incidents: usize,
    pub problems_by_status: BTreeMap<String, usize>,
    pub changes_by_status: BTreeMap<String, usize>,
    pub releases_by_status: BTreeMap<String, usize>,
    pub tasks_by_status: BTreeMap<String, usize>,
    pub sprints_by_status: BTreeMap<String, usize>,
    pub active_projects: usize,
    pub pending_leave_requests: usize,
    pub unread_notifications: usize,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct IncidentReportQuery {
    /// Only incidents created at or after this instant.
    pub from: Option<DateTime<Utc>>,
    /// Only incidents created before this instant.
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IncidentReport {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[schema(value_type = Object)]
    pub metrics: IncidentMetrics,
    pub by_priority: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/reports/summary", get(summary))
        .route("/v1/reports/incidents", get(incident_report))
}

/// Resolution outcome once it is decided: met, missed or breached while
/// open. Clocks still running count as neither.
fn incident_facts(state: &AppState, incident: &IncidentRecord, now: DateTime<Utc>) -> IncidentFacts {
    let sla_breached = resolution_sla(state, incident, now).and_then(|e| match e.state {
        SlaState::Met => Some(false),
        SlaState::Missed | SlaState::Breached => Some(true),
        SlaState::OnTrack | SlaState::AtRisk => None,
    });
    IncidentFacts {
        created_at: incident.created_at,
        resolved_at: incident.resolved_at,
        open: incident.status.is_open(),
        sla_breached,
    }
}

/// GET /v1/reports/summary: Organization-wide status counts.
#[utoipa::path(
    get,
    path = "/v1/reports/summary",
    responses((status = 200, description = "Summary", body = SummaryReport)),
    tag = "reports"
)]
pub async fn summary(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
) -> Result<Json<SummaryReport>, AppError> {
    let now = Utc::now();
    let incidents = state.incidents.list_scoped(org);
    let open: Vec<&IncidentRecord> = incidents.iter().filter(|i| i.status.is_open()).collect();
    let breached_open_incidents = open
        .iter()
        .filter(|i| {
            resolution_sla(&state, i, now).is_some_and(|e| e.state.is_violation())
        })
        .count();

    Ok(Json(SummaryReport {
        generated_at: now,
        incidents_by_status: status_breakdown(incidents.iter().map(|i| i.status)),
        open_incidents: open.len(),
        breached_open_incidents,
        problems_by_status: status_breakdown(state.problems.list_scoped(org).iter().map(|p| p.status)),
        changes_by_status: status_breakdown(state.changes.list_scoped(org).iter().map(|c| c.status)),
        releases_by_status: status_breakdown(state.releases.list_scoped(org).iter().map(|r| r.status)),
        tasks_by_status: status_breakdown(state.tasks.list_scoped(org).iter().map(|t| t.status)),
        sprints_by_status: status_breakdown(state.sprints.list_scoped(org).iter().map(|s| s.status)),
        active_projects: state.projects.filter_scoped(org, |p| !p.archived).len(),
        pending_leave_requests: state
            .leave_requests
            .filter_scoped(org, |l| l.status == LeaveStatus::Pending)
            .len(),
        unread_notifications: state.notifications.filter_scoped(org, |n| !n.read).len(),
    }))
}

/// GET /v1/reports/incidents: Resolution and SLA metrics for a period.
#[utoipa::path(
    get,
    path = "/v1/reports/incidents",
    params(IncidentReportQuery),
    responses(
        (status = 200, description = "Incident metrics", body = IncidentReport),
        (status = 422, description = "Inverted period", body = crate::error::ErrorBody),
    ),
    tag = "reports"
)]
pub async fn incident_report(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    query: Result<Query<IncidentReportQuery>, QueryRejection>,
) -> Result<Json<IncidentReport>, AppError> {
    let q = extract_query(query)?;
    if let (Some(from), Some(to)) = (q.from, q.to) {
        if from >= to {
            return Err(AppError::Validation("from must be before to".into()));
        }
    }
    let now = Utc::now();
    let incidents = state.incidents.filter_scoped(org, |i| {
        q.from.map_or(true, |f| i.created_at >= f) && q.to.map_or(true, |t| i.created_at < t)
    });
    let facts: Vec<IncidentFacts> = incidents
        .iter()
        .map(|i| incident_facts(&state, i, now))
        .collect();

    Ok(Json(IncidentReport {
        from: q.from,
        to: q.to,
        metrics: IncidentMetrics::from_facts(&facts),
        by_priority: status_breakdown(incidents.iter().map(|i| i.priority)),
        by_status: status_breakdown(incidents.iter().map(|i| i.status)),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use desk_core::{Impact, Priority, TicketKind, TicketNumber, Urgency};
    use desk_engine::SlaTarget;
    use desk_state::{IncidentStatus, TicketType};
    use uuid::Uuid;

    use crate::records::SlaPolicyRecord;

    fn incident(org: Uuid, policy: Option<Uuid>, created: DateTime<Utc>) -> IncidentRecord {
        IncidentRecord {
            id: Uuid::new_v4(),
            org_id: org,
            number: TicketNumber::new(TicketKind::Incident, 1),
            ticket_type: TicketType::Incident,
            title: "VPN down".into(),
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
            sla_policy_id: policy,
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
            created_at: created,
            updated_at: created,
        }
    }

    fn policy(org: Uuid) -> SlaPolicyRecord {
        let now = Utc::now();
        SlaPolicyRecord {
            id: Uuid::new_v4(),
            org_id: org,
            name: "Default".into(),
            description: None,
            targets: vec![SlaTarget {
                priority: Priority::Critical,
                response_minutes: 15,
                resolution_minutes: 60,
            }],
            business_hours: None,
            active: true,
            ticket_type: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn incident_without_policy_is_not_judged() {
        let state = AppState::new();
        let org = Uuid::new_v4();
        let i = incident(org, None, Utc::now());
        assert_eq!(incident_facts(&state, &i, Utc::now()).sla_breached, None);
    }

    #[test]
    fn overdue_open_incident_counts_as_breached() {
        let state = AppState::new();
        let org = Uuid::new_v4();
        let p = policy(org);
        state.sla_policies.put(p.clone());
        let now = Utc::now();
        let i = incident(org, Some(p.id), now - Duration::hours(3));
        let facts = incident_facts(&state, &i, now);
        assert!(facts.open);
        assert_eq!(facts.sla_breached, Some(true));
    }

    #[test]
    fn fresh_open_incident_is_still_running() {
        let state = AppState::new();
        let org = Uuid::new_v4();
        let p = policy(org);
        state.sla_policies.put(p.clone());
        let now = Utc::now();
        let i = incident(org, Some(p.id), now - Duration::minutes(5));
        assert_eq!(incident_facts(&state, &i, now).sla_breached, None);
    }
}
