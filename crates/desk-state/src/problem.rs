//! # Problem Lifecycle
//!
//! A problem is the underlying cause of one or more incidents.
//!
//! ```text
//! New ──▶ UnderInvestigation ──▶ KnownError ──▶ Resolved ──▶ Closed
//!  │              │                                 │
//!  │              └────────────────────────────────▶│
//!  │              ▲                                 │
//!  │              └──────────── (reopen) ───────────┘
//!  └──▶ Closed (duplicate / not a problem)
//! ```

use serde::{Deserialize, Serialize};

use crate::impl_lifecycle_display;
use crate::lifecycle::Lifecycle;

/// Problem status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProblemStatus {
    New,
    UnderInvestigation,
    /// Root cause known, workaround documented, permanent fix pending.
    KnownError,
    Resolved,
    Closed,
}

impl Lifecycle for ProblemStatus {
    fn name(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::UnderInvestigation => "UNDER_INVESTIGATION",
            Self::KnownError => "KNOWN_ERROR",
            Self::Resolved => "RESOLVED",
            Self::Closed => "CLOSED",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    fn can_transition_to(&self, to: Self) -> bool {
        use ProblemStatus::*;
        matches!(
            (self, to),
            (New, UnderInvestigation | Closed)
                | (UnderInvestigation, KnownError | Resolved)
                | (KnownError, Resolved)
                | (Resolved, Closed | UnderInvestigation)
        )
    }
}

impl_lifecycle_display!(ProblemStatus);
