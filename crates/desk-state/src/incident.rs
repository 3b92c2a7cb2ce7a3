//! # Incident Lifecycle
//!
//! ```text
//! New ──▶ Assigned ──▶ InProgress ──▶ Resolved ──▶ Closed
//!  │         │  ▲          │   ▲          │
//!  │         │  └─ OnHold ◀┘   └──────────┘ (reopen)
//!  │         ▼
//!  └────▶ Cancelled
//! ```
//!
//! `New` may also jump straight to `InProgress` when the reporter picks the
//! ticket up themselves. `OnHold` pauses the SLA clock.

use serde::{Deserialize, Serialize};

use crate::impl_lifecycle_display;
use crate::lifecycle::Lifecycle;

/// Incident status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    New,
    Assigned,
    InProgress,
    OnHold,
    Resolved,
    Closed,
    Cancelled,
}

impl IncidentStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [IncidentStatus; 7] = [
        Self::New,
        Self::Assigned,
        Self::InProgress,
        Self::OnHold,
        Self::Resolved,
        Self::Closed,
        Self::Cancelled,
    ];

    /// Whether the incident still needs work.
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Resolved | Self::Closed | Self::Cancelled)
    }

    /// Whether the SLA clock is paused in this state.
    pub fn pauses_sla(&self) -> bool {
        matches!(self, Self::OnHold)
    }
}

impl Lifecycle for IncidentStatus {
    fn name(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Assigned => "ASSIGNED",
            Self::InProgress => "IN_PROGRESS",
            Self::OnHold => "ON_HOLD",
            Self::Resolved => "RESOLVED",
            Self::Closed => "CLOSED",
            Self::Cancelled => "CANCELLED",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Cancelled)
    }

    fn can_transition_to(&self, to: Self) -> bool {
        use IncidentStatus::*;
        matches!(
            (self, to),
            (New, Assigned | InProgress | Cancelled)
                | (Assigned, InProgress | OnHold | Cancelled)
                | (InProgress, OnHold | Resolved)
                | (OnHold, InProgress)
                | (Resolved, Closed | InProgress)
        )
    }
}

impl_lifecycle_display!(IncidentStatus);

/// Whether an incident is a break/fix incident or a catalog service request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketType {
    #[default]
    Incident,
    ServiceRequest,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{transition, LifecycleError};

    #[test]
    fn happy_path_to_closed() {
        let mut status = IncidentStatus::New;
        let mut log = Vec::new();
        for next in [
            IncidentStatus::Assigned,
            IncidentStatus::InProgress,
            IncidentStatus::Resolved,
            IncidentStatus::Closed,
        ] {
            transition(&mut status, next, &mut log, None, None).unwrap();
        }
        assert_eq!(status, IncidentStatus::Closed);
        assert_eq!(log.len(), 4);
        assert_eq!(log[0].from_state, "NEW");
        assert_eq!(log[3].to_state, "CLOSED");
    }

    #[test]
    fn reopen_from_resolved() {
        let mut status = IncidentStatus::Resolved;
        let mut log = Vec::new();
        transition(&mut status, IncidentStatus::InProgress, &mut log, None, Some("still broken".into()))
            .unwrap();
        assert_eq!(status, IncidentStatus::InProgress);
        assert_eq!(log[0].reason.as_deref(), Some("still broken"));
    }

    #[test]
    fn closed_is_terminal() {
        let mut status = IncidentStatus::Closed;
        let err = transition(&mut status, IncidentStatus::InProgress, &mut Vec::new(), None, None)
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Terminal { .. }));
    }

    #[test]
    fn cannot_resolve_from_new() {
        let mut status = IncidentStatus::New;
        let err = transition(&mut status, IncidentStatus::Resolved, &mut Vec::new(), None, None)
            .unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidTransition {
                from: "NEW".into(),
                to: "RESOLVED".into()
            }
        );
        assert_eq!(status, IncidentStatus::New);
    }

    #[test]
    fn same_state_is_noop_error() {
        let mut status = IncidentStatus::OnHold;
        let err = transition(&mut status, IncidentStatus::OnHold, &mut Vec::new(), None, None)
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NoOp { .. }));
    }

    #[test]
    fn on_hold_pauses_sla_only() {
        for s in IncidentStatus::ALL {
            assert_eq!(s.pauses_sla(), s == IncidentStatus::OnHold);
        }
        assert!(IncidentStatus::OnHold.is_open());
        assert!(!IncidentStatus::Resolved.is_open());
    }

    #[test]
    fn serde_names_match_display() {
        for s in IncidentStatus::ALL {
            let json = serde_json::to_string(&s).unwrap();
            assert_eq!(json, format!("\"{s}\""));
        }
    }
}
