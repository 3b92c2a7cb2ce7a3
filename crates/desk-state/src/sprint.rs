//! # Sprint Lifecycle
//!
//! `Planned -> Active -> Completed`, with cancellation from either
//! non-terminal state.

use serde::{Deserialize, Serialize};

use crate::impl_lifecycle_display;
use crate::lifecycle::Lifecycle;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SprintStatus {
    #[default]
    Planned,
    Active,
    Completed,
    Cancelled,
}

impl Lifecycle for SprintStatus {
    fn name(&self) -> &'static str {
        match self {
            Self::Planned => "PLANNED",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    fn can_transition_to(&self, to: Self) -> bool {
        use SprintStatus::*;
        matches!(
            (self, to),
            (Planned, Active | Cancelled) | (Active, Completed | Cancelled)
        )
    }
}

impl_lifecycle_display!(SprintStatus);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{check, LifecycleError};

    #[test]
    fn cannot_complete_unstarted_sprint() {
        assert!(matches!(
            check(SprintStatus::Planned, SprintStatus::Completed),
            Err(LifecycleError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn completed_sprint_cannot_restart() {
        assert!(matches!(
            check(SprintStatus::Completed, SprintStatus::Active),
            Err(LifecycleError::Terminal { .. })
        ));
    }

    #[test]
    fn active_sprint_can_be_cancelled() {
        assert!(check(SprintStatus::Active, SprintStatus::Cancelled).is_ok());
    }
}
