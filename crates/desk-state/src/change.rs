//! # Change Lifecycle
//!
//! Changes follow the ITIL change-enablement flow. The permitted transitions
//! depend on the [`ChangeType`]: standard changes are pre-authorized and
//! emergency changes go to the emergency board, so both may skip the
//! `UnderReview` step; normal changes may not.
//!
//! ```text
//! Draft ─▶ Submitted ─▶ UnderReview ─▶ Approved ─▶ Scheduled ─▶ Implementing ─▶ Completed ─▶ Closed
//!   │         │   └────────(std/emerg)─▶┘  │            │              │
//!   │         │                 └▶ Rejected│            │              └────▶ Failed ─▶ Closed
//!   └─────────┴──────────────▶ Cancelled ◀─┴────────────┘
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::impl_lifecycle_display;
use crate::lifecycle::{check, Lifecycle, LifecycleError, TransitionRecord};

/// Change category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    /// Pre-approved, low-risk, repeatable.
    Standard,
    #[default]
    Normal,
    Emergency,
}

impl ChangeType {
    /// Whether a submitted change may be approved without a review step.
    pub fn skips_review(&self) -> bool {
        matches!(self, Self::Standard | Self::Emergency)
    }
}

/// Assessed risk of a change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

/// Change status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeStatus {
    Draft,
    Submitted,
    UnderReview,
    Approved,
    Rejected,
    Scheduled,
    Implementing,
    Completed,
    Failed,
    Closed,
    Cancelled,
}

impl ChangeStatus {
    /// Whether entering this state is an approval decision.
    pub fn is_decision(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl Lifecycle for ChangeStatus {
    fn name(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Submitted => "SUBMITTED",
            Self::UnderReview => "UNDER_REVIEW",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Scheduled => "SCHEDULED",
            Self::Implementing => "IMPLEMENTING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Closed => "CLOSED",
            Self::Cancelled => "CANCELLED",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Closed | Self::Cancelled)
    }

    /// The type-independent relation. `Submitted -> Approved` is excluded
    /// here; see [`change_transition_allowed`].
    fn can_transition_to(&self, to: Self) -> bool {
        use ChangeStatus::*;
        matches!(
            (self, to),
            (Draft, Submitted | Cancelled)
                | (Submitted, UnderReview | Cancelled)
                | (UnderReview, Approved | Rejected)
                | (Approved, Scheduled | Cancelled)
                | (Scheduled, Implementing | Cancelled)
                | (Implementing, Completed | Failed)
                | (Completed | Failed, Closed)
        )
    }
}

impl_lifecycle_display!(ChangeStatus);

/// Whether a change of `change_type` may move `from -> to`.
pub fn change_transition_allowed(change_type: ChangeType, from: ChangeStatus, to: ChangeStatus) -> bool {
    if from.is_terminal() || from == to {
        return false;
    }
    from.can_transition_to(to)
        || (change_type.skips_review()
            && from == ChangeStatus::Submitted
            && to == ChangeStatus::Approved)
}

/// Validate and apply a change transition, taking the change type into account.
pub fn transition_change(
    change_type: ChangeType,
    state: &mut ChangeStatus,
    to: ChangeStatus,
    log: &mut Vec<TransitionRecord>,
    actor: Option<Uuid>,
    reason: Option<String>,
) -> Result<(), LifecycleError> {
    if !change_transition_allowed(change_type, *state, to) {
        // Terminal and no-op errors take precedence.
        check(*state, to)?;
        return Err(LifecycleError::InvalidTransition {
            from: state.name().to_string(),
            to: to.name().to_string(),
        });
    }
    log.push(TransitionRecord {
        from_state: state.name().to_string(),
        to_state: to.name().to_string(),
        actor,
        reason,
        at: chrono::Utc::now(),
    });
    *state = to;
    Ok(())
}
