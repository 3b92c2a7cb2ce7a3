//! # Leave Request Lifecycle
//!
//! A request is filed `Pending` and decided once by a manager. An approved
//! request may still be withdrawn; a rejected one may not.

use serde::{Deserialize, Serialize};

use crate::impl_lifecycle_display;
use crate::lifecycle::Lifecycle;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaveStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl LeaveStatus {
    /// Whether the request blocks overlapping requests and reduces capacity.
    pub fn holds_dates(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

impl Lifecycle for LeaveStatus {
    fn name(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled)
    }

    fn can_transition_to(&self, to: Self) -> bool {
        use LeaveStatus::*;
        matches!(
            (self, to),
            (Pending, Approved | Rejected | Cancelled) | (Approved, Cancelled)
        )
    }
}

impl_lifecycle_display!(LeaveStatus);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaveType {
    #[default]
    Annual,
    Sick,
    Unpaid,
    Parental,
    Other,
}
