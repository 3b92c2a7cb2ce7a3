//! # Lifecycle Trait and Transition Log
//!
//! Every status enum in this crate implements [`Lifecycle`]: a finite set of
//! states, a transition relation, and a set of terminal states. The free
//! function [`transition`] validates a move and appends a
//! [`TransitionRecord`] to the owning record's history, so the check and the
//! audit entry can never drift apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A status enum with a validated transition relation.
pub trait Lifecycle: Copy + Eq + std::fmt::Debug + std::fmt::Display {
    /// Canonical upper-case state name.
    fn name(&self) -> &'static str;

    /// Whether no further transitions are permitted.
    fn is_terminal(&self) -> bool;

    /// Whether the relation permits `self -> to`.
    fn can_transition_to(&self, to: Self) -> bool;
}

/// Errors from a rejected lifecycle transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// The current state admits no transitions.
    #[error("record is in terminal state {state}")]
    Terminal {
        /// The terminal state.
        state: String,
    },

    /// The transition relation does not contain `from -> to`.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state.
        from: String,
        /// Requested state.
        to: String,
    },

    /// The requested state equals the current state.
    #[error("record is already {state}")]
    NoOp {
        /// The unchanged state.
        state: String,
    },
}

/// One entry in a record's state history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from_state: String,
    pub to_state: String,
    /// User who performed the transition, when known.
    pub actor: Option<Uuid>,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// Check a transition without applying it.
pub fn check<S: Lifecycle>(from: S, to: S) -> Result<(), LifecycleError> {
    if from == to {
        return Err(LifecycleError::NoOp {
            state: from.name().to_string(),
        });
    }
    if from.is_terminal() {
        return Err(LifecycleError::Terminal {
            state: from.name().to_string(),
        });
    }
    if !from.can_transition_to(to) {
        return Err(LifecycleError::InvalidTransition {
            from: from.name().to_string(),
            to: to.name().to_string(),
        });
    }
    Ok(())
}

/// Validate and apply `state -> to`, appending to `log`.
pub fn transition<S: Lifecycle>(
    state: &mut S,
    to: S,
    log: &mut Vec<TransitionRecord>,
    actor: Option<Uuid>,
    reason: Option<String>,
) -> Result<(), LifecycleError> {
    check(*state, to)?;
    log.push(TransitionRecord {
        from_state: state.name().to_string(),
        to_state: to.name().to_string(),
        actor,
        reason,
        at: Utc::now(),
    });
    *state = to;
    Ok(())
}

/// Implements `Display` via [`Lifecycle::name`].
#[macro_export]
macro_rules! impl_lifecycle_display {
    ($ty:ty) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str($crate::lifecycle::Lifecycle::name(self))
            }
        }
    };
}
