//! # desk-state: Lifecycle State Machines
//!
//! Each ticket and planning record in servicedesk moves through a fixed set
//! of statuses. This crate owns those status enums and their transition
//! relations so that the API layer never sets a status directly: it asks the
//! machine, and the machine either records the move or explains the refusal.
//!
//! ## Machines
//!
//! - [`incident`]: break/fix incidents and service requests.
//! - [`problem`]: root-cause investigations.
//! - [`change`]: change enablement; transitions depend on [`ChangeType`].
//! - [`release`]: build, test and deploy.
//! - [`task`]: Kanban columns; any distinct move is valid.
//! - [`sprint`]: planned, active, completed.
//! - [`leave`]: leave request approval.
//! - [`workflow`]: administrator-defined machines validated at load time.

pub mod change;
pub mod incident;
pub mod leave;
pub mod lifecycle;
pub mod problem;
pub mod release;
pub mod sprint;
pub mod task;
pub mod workflow;

pub use change::{change_transition_allowed, transition_change, ChangeStatus, ChangeType, RiskLevel};
pub use incident::{IncidentStatus, TicketType};
pub use leave::{LeaveStatus, LeaveType};
pub use lifecycle::{check, transition, Lifecycle, LifecycleError, TransitionRecord};
pub use problem::ProblemStatus;
pub use release::ReleaseStatus;
pub use sprint::SprintStatus;
pub use task::{TaskStatus, TaskType};
pub use workflow::{
    HistoryEntry, WorkflowDefinition, WorkflowError, WorkflowInstance, WorkflowTransition,
};
