//! # Stored Records
//!
//! API-layer representations of every resource. Each record belongs to one
//! organization and implements [`Document`] so the generic store and the
//! Postgres document table can handle it without per-type code.
//!
//! Status fields use the enums from `desk-state`; a record's status only
//! changes through those machines, and every change is appended to the
//! record's `history`.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use desk_core::{business_minutes_between, BusinessHours, Impact, Priority, Role, TicketNumber, Urgency};
use desk_engine::SlaTarget;
use desk_state::{
    ChangeStatus, ChangeType, IncidentStatus, LeaveStatus, LeaveType, ProblemStatus,
    ReleaseStatus, RiskLevel, SprintStatus, TaskStatus, TaskType, TicketType, TransitionRecord,
    WorkflowDefinition, WorkflowInstance,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A tenant-owned record stored in a named collection.
pub trait Document: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Collection name used as the persistence key and in audit events.
    const COLLECTION: &'static str;
    /// Singular noun used in error messages.
    const KIND: &'static str;

    fn id(&self) -> Uuid;

    fn org_id(&self) -> Uuid;

    fn created_at(&self) -> DateTime<Utc>;
}

macro_rules! impl_document {
    ($ty:ty, $collection:literal, $kind:literal) => {
        impl Document for $ty {
            const COLLECTION: &'static str = $collection;
            const KIND: &'static str = $kind;

            fn id(&self) -> Uuid {
                self.id
            }

            fn org_id(&self) -> Uuid {
                self.org_id
            }

            fn created_at(&self) -> DateTime<Utc> {
                self.created_at
            }
        }
    };
}

// -- Directory ----------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    pub email: String,
    pub name: String,
    #[schema(value_type = String)]
    pub role: Role,
    pub active: bool,
    /// Contracted hours per working day, used for sprint capacity.
    pub hours_per_day: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TeamRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub lead_id: Option<Uuid>,
    pub member_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Project management -------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProjectRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    /// Upper-case key prefixing task keys, e.g. `OPS` in `OPS-12`.
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub lead_id: Option<Uuid>,
    /// Team whose members make up sprint capacity.
    pub team_id: Option<Uuid>,
    pub archived: bool,
    pub next_task_number: u64,
    #[schema(value_type = Object)]
    pub wip_limits: HashMap<TaskStatus, u32>,
    pub focus_factor: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SprintRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub goal: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[schema(value_type = String)]
    pub status: SprintStatus,
    /// Points in the sprint when it started.
    pub committed_points: f64,
    /// Points done when it completed.
    pub completed_points: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[schema(value_type = Vec<Object>)]
    pub history: Vec<TransitionRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    pub project_id: Uuid,
    pub sprint_id: Option<Uuid>,
    pub key: String,
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = String)]
    pub task_type: TaskType,
    #[schema(value_type = String)]
    pub status: TaskStatus,
    #[schema(value_type = String)]
    pub priority: Priority,
    pub assignee_id: Option<Uuid>,
    pub reporter_id: Option<Uuid>,
    pub story_points: Option<f64>,
    pub estimate_hours: Option<f64>,
    /// Position within the board column.
    pub rank: i64,
    pub labels: Vec<String>,
    pub due_date: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
    #[schema(value_type = Vec<Object>)]
    pub history: Vec<TransitionRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommentRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    pub task_id: Uuid,
    pub author_id: Option<Uuid>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Service management -------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IncidentRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    #[schema(value_type = String, example = "INC-000042")]
    pub number: TicketNumber,
    #[schema(value_type = String)]
    pub ticket_type: TicketType,
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = String)]
    pub impact: Impact,
    #[schema(value_type = String)]
    pub urgency: Urgency,
    #[schema(value_type = String)]
    pub priority: Priority,
    #[schema(value_type = String)]
    pub status: IncidentStatus,
    pub assignee_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub reporter_id: Option<Uuid>,
    pub category: Option<String>,
    pub problem_id: Option<Uuid>,
    pub catalog_item_id: Option<Uuid>,
    pub sla_policy_id: Option<Uuid>,
    pub response_due_at: Option<DateTime<Utc>>,
    pub resolution_due_at: Option<DateTime<Utc>>,
    pub first_response_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Set while the incident is on hold.
    pub on_hold_since: Option<DateTime<Utc>>,
    /// Total minutes spent on hold, excluding any current hold.
    pub paused_minutes: i64,
    pub resolution_notes: Option<String>,
    /// Field values submitted with a catalog request.
    #[schema(value_type = Option<Object>)]
    pub request_details: Option<serde_json::Value>,
    #[schema(value_type = Vec<Object>)]
    pub history: Vec<TransitionRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IncidentRecord {
    /// Paused minutes including a hold that is still running at `now`.
    /// With business hours only working time on hold counts.
    pub fn paused_minutes_at(&self, now: DateTime<Utc>, hours: Option<&BusinessHours>) -> i64 {
        let running = self
            .on_hold_since
            .map(|since| hold_minutes(since, now, hours))
            .unwrap_or(0);
        self.paused_minutes + running
    }
}

/// Clock minutes between `since` and `until`, restricted to business hours
/// when given.
pub fn hold_minutes(since: DateTime<Utc>, until: DateTime<Utc>, hours: Option<&BusinessHours>) -> i64 {
    match hours {
        Some(h) => business_minutes_between(since, until, h),
        None => (until - since).num_minutes().max(0),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProblemRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    #[schema(value_type = String, example = "PRB-000007")]
    pub number: TicketNumber,
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = String)]
    pub status: ProblemStatus,
    #[schema(value_type = String)]
    pub priority: Priority,
    pub assignee_id: Option<Uuid>,
    pub root_cause: Option<String>,
    pub workaround: Option<String>,
    pub incident_ids: Vec<Uuid>,
    #[schema(value_type = Vec<Object>)]
    pub history: Vec<TransitionRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChangeRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    #[schema(value_type = String, example = "CHG-000003")]
    pub number: TicketNumber,
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = String)]
    pub change_type: ChangeType,
    #[schema(value_type = String)]
    pub risk: RiskLevel,
    #[schema(value_type = String)]
    pub status: ChangeStatus,
    pub requester_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    /// Who approved or rejected the change.
    pub approver_id: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_end: Option<DateTime<Utc>>,
    pub implementation_plan: Option<String>,
    pub rollback_plan: Option<String>,
    pub release_id: Option<Uuid>,
    #[schema(value_type = Vec<Object>)]
    pub history: Vec<TransitionRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReleaseRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    #[schema(value_type = String, example = "REL-000001")]
    pub number: TicketNumber,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    #[schema(value_type = String)]
    pub status: ReleaseStatus,
    pub planned_date: Option<NaiveDate>,
    pub deployed_at: Option<DateTime<Utc>>,
    pub change_ids: Vec<Uuid>,
    #[schema(value_type = Vec<Object>)]
    pub history: Vec<TransitionRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SlaPolicyRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// One target per priority.
    #[schema(value_type = Vec<Object>)]
    pub targets: Vec<SlaTarget>,
    /// When set, clocks only run inside these hours on working days.
    #[schema(value_type = Option<Object>)]
    pub business_hours: Option<BusinessHours>,
    pub active: bool,
    /// Restrict the policy to one ticket type; `None` applies to all.
    #[schema(value_type = Option<String>)]
    pub ticket_type: Option<TicketType>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A field a requester fills in when ordering a catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CatalogField {
    pub name: String,
    pub label: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CatalogItemRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub fulfillment_team_id: Option<Uuid>,
    #[schema(value_type = String)]
    pub default_impact: Impact,
    #[schema(value_type = String)]
    pub default_urgency: Urgency,
    pub active: bool,
    pub fields: Vec<CatalogField>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Workflows ----------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkflowRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    #[schema(value_type = Object)]
    pub definition: WorkflowDefinition,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkflowInstanceRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    pub workflow_id: Uuid,
    /// The record the instance governs, if any.
    pub subject_id: Option<Uuid>,
    #[schema(value_type = Object)]
    pub instance: WorkflowInstance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- People -------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LeaveRequestRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    pub user_id: Uuid,
    #[schema(value_type = String)]
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Working days covered by the request.
    pub working_days: u32,
    pub reason: Option<String>,
    #[schema(value_type = String)]
    pub status: LeaveStatus,
    pub decided_by: Option<Uuid>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decision_note: Option<String>,
    #[schema(value_type = Vec<Object>)]
    pub history: Vec<TransitionRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeaveRequestRecord {
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start_date <= end && start <= self.end_date
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    TaskAssigned,
    IncidentAssigned,
    ChangeApproved,
    ChangeRejected,
    LeaveApproved,
    LeaveRejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: Option<String>,
    /// API path of the record the notification is about.
    pub link: Option<String>,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl_document!(UserRecord, "users", "user");
impl_document!(TeamRecord, "teams", "team");
impl_document!(ProjectRecord, "projects", "project");
impl_document!(SprintRecord, "sprints", "sprint");
impl_document!(TaskRecord, "tasks", "task");
impl_document!(CommentRecord, "comments", "comment");
impl_document!(IncidentRecord, "incidents", "incident");
impl_document!(ProblemRecord, "problems", "problem");
impl_document!(ChangeRecord, "changes", "change");
impl_document!(ReleaseRecord, "releases", "release");
impl_document!(SlaPolicyRecord, "sla_policies", "SLA policy");
impl_document!(CatalogItemRecord, "catalog_items", "catalog item");
impl_document!(WorkflowRecord, "workflows", "workflow");
impl_document!(WorkflowInstanceRecord, "workflow_instances", "workflow instance");
impl_document!(LeaveRequestRecord, "leave_requests", "leave request");
impl_document!(NotificationRecord, "notifications", "notification");

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use desk_core::TicketKind;

    fn incident() -> IncidentRecord {
        let now = Utc::now();
        IncidentRecord {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            number: TicketNumber::new(TicketKind::Incident, 1),
            ticket_type: TicketType::Incident,
            title: "VPN down".into(),
            description: None,
            impact: Impact::High,
            urgency: Urgency::High,
            priority: Priority::Critical,
            status: IncidentStatus::OnHold,
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
            on_hold_since: Some(now - Duration::minutes(30)),
            paused_minutes: 15,
            resolution_notes: None,
            request_details: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn paused_minutes_include_running_hold() {
        let record = incident();
        let now = record.on_hold_since.unwrap() + Duration::minutes(30);
        assert_eq!(record.paused_minutes_at(now, None), 45);
    }

    #[test]
    fn incident_serializes_number_and_status_as_strings() {
        let json = serde_json::to_value(incident()).unwrap();
        assert_eq!(json["number"], "INC-000001");
        assert_eq!(json["status"], "ON_HOLD");
        assert_eq!(json["priority"], "CRITICAL");
    }

    #[test]
    fn leave_overlap_is_inclusive() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 6, day).unwrap();
        let now = Utc::now();
        let leave = LeaveRequestRecord {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            leave_type: LeaveType::Annual,
            start_date: d(10),
            end_date: d(14),
            working_days: 5,
            reason: None,
            status: LeaveStatus::Pending,
            decided_by: None,
            decided_at: None,
            decision_note: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        assert!(leave.overlaps(d(14), d(20)));
        assert!(leave.overlaps(d(1), d(10)));
        assert!(!leave.overlaps(d(15), d(20)));
    }

    #[test]
    fn collections_are_distinct() {
        let names = [
            UserRecord::COLLECTION,
            TeamRecord::COLLECTION,
            ProjectRecord::COLLECTION,
            SprintRecord::COLLECTION,
            TaskRecord::COLLECTION,
            CommentRecord::COLLECTION,
            IncidentRecord::COLLECTION,
            ProblemRecord::COLLECTION,
            ChangeRecord::COLLECTION,
            ReleaseRecord::COLLECTION,
            SlaPolicyRecord::COLLECTION,
            CatalogItemRecord::COLLECTION,
            WorkflowRecord::COLLECTION,
            WorkflowInstanceRecord::COLLECTION,
            LeaveRequestRecord::COLLECTION,
            NotificationRecord::COLLECTION,
        ];
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }
}
