//! # desk-engine: Planning and Service-Level Computations
//!
//! Deterministic functions over plain inputs. Callers (the HTTP service and
//! the `desk` CLI) gather the inputs from their stores or files and present
//! the outputs; no function here performs I/O or reads the clock except
//! through arguments.
//!
//! - [`capacity`]: team hours and point forecast for a sprint.
//! - [`velocity`]: trailing-window velocity and trend.
//! - [`burndown`]: remaining versus ideal points per working day.
//! - [`board`]: Kanban columns, rank-based ordering and WIP limits.
//! - [`sla`]: response and resolution clocks.
//! - [`reports`]: status breakdowns, incident metrics, project progress.

pub mod board;
pub mod burndown;
pub mod capacity;
pub mod error;
pub mod reports;
pub mod sla;
pub mod velocity;

pub use board::{Board, Card, Column, MoveOutcome, RankChange, RANK_GAP};
pub use burndown::{burndown, BurndownPoint, Completion};
pub use capacity::{compute_capacity, CapacityInput, CapacityReport, MemberAvailability, MemberCapacity};
pub use error::{BoardError, PlanningError};
pub use reports::{status_breakdown, IncidentFacts, IncidentMetrics, ProjectProgress};
pub use sla::{due_at, evaluate, target_for, SlaEvaluation, SlaState, SlaTarget, AT_RISK_RATIO, MAX_BUDGET_MINUTES};
pub use velocity::{compute_velocity, SprintOutcome, Trend, VelocityReport, DEFAULT_WINDOW};
