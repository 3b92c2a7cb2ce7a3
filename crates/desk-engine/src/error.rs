//! Errors raised by planning and board computations.

use desk_state::TaskStatus;
use thiserror::Error;
use uuid::Uuid;

/// Invalid input to a capacity, velocity or burndown computation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanningError {
    #[error("date range ends ({end}) before it starts ({start})")]
    InvertedRange { start: String, end: String },

    #[error("focus factor must be in (0, 1], got {0}")]
    FocusFactorOutOfRange(f64),

    #[error("allocation for member {member} must be in (0, 1], got {value}")]
    AllocationOutOfRange { member: Uuid, value: f64 },

    #[error("hours per day for member {member} must be in (0, 24], got {value}")]
    HoursPerDayOutOfRange { member: Uuid, value: f64 },

    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f64 },
}

/// A rejected board operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("task {0} is not on this board")]
    CardNotFound(Uuid),

    #[error("column {status} is at its WIP limit of {limit}")]
    WipLimitExceeded { status: TaskStatus, limit: u32 },
}
