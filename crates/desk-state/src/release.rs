//! # Release Lifecycle
//!
//! ```text
//! Planned ─▶ Building ─▶ Testing ─▶ Deploying ─▶ Deployed ─▶ Closed
//!    │          ▲           │            │
//!    │          └───────────┘            ▼
//!    │          ▲                    RolledBack ─▶ Cancelled
//!    │          └────────────────────────┘
//!    └─▶ Cancelled
//! ```

use serde::{Deserialize, Serialize};

use crate::impl_lifecycle_display;
use crate::lifecycle::Lifecycle;

/// Release status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseStatus {
    Planned,
    Building,
    Testing,
    Deploying,
    Deployed,
    RolledBack,
    Closed,
    Cancelled,
}

impl Lifecycle for ReleaseStatus {
    fn name(&self) -> &'static str {
        match self {
            Self::Planned => "PLANNED",
            Self::Building => "BUILDING",
            Self::Testing => "TESTING",
            Self::Deploying => "DEPLOYING",
            Self::Deployed => "DEPLOYED",
            Self::RolledBack => "ROLLED_BACK",
            Self::Closed => "CLOSED",
            Self::Cancelled => "CANCELLED",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Cancelled)
    }

    fn can_transition_to(&self, to: Self) -> bool {
        use ReleaseStatus::*;
        matches!(
            (self, to),
            (Planned, Building | Cancelled)
                | (Building, Testing)
                | (Testing, Building | Deploying)
                | (Deploying, Deployed | RolledBack)
                | (RolledBack, Building | Cancelled)
                | (Deployed, Closed)
        )
    }
}

impl_lifecycle_display!(ReleaseStatus);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{check, LifecycleError};

    #[test]
    fn rollback_returns_to_building() {
        assert!(check(ReleaseStatus::Deploying, ReleaseStatus::RolledBack).is_ok());
        assert!(check(ReleaseStatus::RolledBack, ReleaseStatus::Building).is_ok());
    }

    #[test]
    fn cannot_deploy_untested_build() {
        assert!(matches!(
            check(ReleaseStatus::Building, ReleaseStatus::Deploying),
            Err(LifecycleError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn deployed_release_cannot_be_cancelled() {
        assert!(check(ReleaseStatus::Deployed, ReleaseStatus::Cancelled).is_err());
        assert!(check(ReleaseStatus::Deployed, ReleaseStatus::Closed).is_ok());
    }
}
