//! # Configurable Workflows
//!
//! Unlike the fixed machines elsewhere in this crate, a [`WorkflowDefinition`]
//! is data supplied by an administrator: a set of named states, an initial
//! state, final states and named transitions. Definitions are validated as a
//! whole before they are stored; instances are then advanced by transition
//! name.
//!
//! Validation rejects definitions that could strand an instance: unknown
//! state references, transitions out of a final state, and states that no
//! path from the initial state reaches.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use desk_core::Role;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A named edge between two workflow states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTransition {
    pub name: String,
    pub from: String,
    pub to: String,
    /// Minimum caller role; any authenticated caller when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_role: Option<Role>,
}

/// An administrator-defined state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    /// What the workflow governs, e.g. `"incident"` or `"onboarding"`.
    #[serde(default)]
    pub subject_type: String,
    pub states: Vec<String>,
    pub initial_state: String,
    #[serde(default)]
    pub final_states: Vec<String>,
    #[serde(default)]
    pub transitions: Vec<WorkflowTransition>,
}

/// Errors from validating a definition or advancing an instance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("workflow must declare at least one state")]
    NoStates,

    #[error("state {0:?} is declared more than once")]
    DuplicateState(String),

    #[error("initial state {0:?} is not a declared state")]
    UnknownInitialState(String),

    #[error("final state {0:?} is not a declared state")]
    UnknownFinalState(String),

    #[error("transition {transition:?} references unknown state {state:?}")]
    UnknownState { transition: String, state: String },

    #[error("transition {name:?} is defined twice from state {from:?}")]
    DuplicateTransition { from: String, name: String },

    #[error("transition {transition:?} leaves final state {state:?}")]
    ExitFromFinalState { transition: String, state: String },

    #[error("states unreachable from {initial:?}: {states:?}")]
    Unreachable { initial: String, states: Vec<String> },

    #[error("workflow instance is already completed")]
    InstanceCompleted,

    #[error("no transition {name:?} from state {state:?}")]
    NoSuchTransition { state: String, name: String },

    #[error("transition {transition:?} requires role {required}")]
    InsufficientRole { transition: String, required: Role },
}

impl WorkflowDefinition {
    /// Check the definition for structural soundness.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.states.is_empty() {
            return Err(WorkflowError::NoStates);
        }

        let mut known = HashSet::with_capacity(self.states.len());
        for state in &self.states {
            if !known.insert(state.as_str()) {
                return Err(WorkflowError::DuplicateState(state.clone()));
            }
        }
        if !known.contains(self.initial_state.as_str()) {
            return Err(WorkflowError::UnknownInitialState(self.initial_state.clone()));
        }
        for state in &self.final_states {
            if !known.contains(state.as_str()) {
                return Err(WorkflowError::UnknownFinalState(state.clone()));
            }
        }

        let finals: HashSet<&str> = self.final_states.iter().map(String::as_str).collect();
        let mut edges = HashSet::new();
        for t in &self.transitions {
            for state in [&t.from, &t.to] {
                if !known.contains(state.as_str()) {
                    return Err(WorkflowError::UnknownState {
                        transition: t.name.clone(),
                        state: state.clone(),
                    });
                }
            }
            if !edges.insert((t.from.as_str(), t.name.as_str())) {
                return Err(WorkflowError::DuplicateTransition {
                    from: t.from.clone(),
                    name: t.name.clone(),
                });
            }
            if finals.contains(t.from.as_str()) {
                return Err(WorkflowError::ExitFromFinalState {
                    transition: t.name.clone(),
                    state: t.from.clone(),
                });
            }
        }

        let reached = self.reachable();
        let missing: Vec<String> = self
            .states
            .iter()
            .filter(|s| !reached.contains(s.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(WorkflowError::Unreachable {
                initial: self.initial_state.clone(),
                states: missing,
            });
        }
        Ok(())
    }

    /// Breadth-first walk from the initial state.
    fn reachable(&self) -> HashSet<&str> {
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for t in &self.transitions {
            adjacency.entry(t.from.as_str()).or_default().push(t.to.as_str());
        }
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([self.initial_state.as_str()]);
        while let Some(state) = queue.pop_front() {
            if !seen.insert(state) {
                continue;
            }
            if let Some(next) = adjacency.get(state) {
                queue.extend(next.iter().copied().filter(|s| !seen.contains(s)));
            }
        }
        seen
    }

    /// Transitions leaving `state`, in declaration order.
    pub fn available_transitions(&self, state: &str) -> Vec<&WorkflowTransition> {
        self.transitions.iter().filter(|t| t.from == state).collect()
    }

    pub fn is_final(&self, state: &str) -> bool {
        self.final_states.iter().any(|s| s == state)
    }
}

/// One applied workflow transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub transition: String,
    pub from_state: String,
    pub to_state: String,
    pub actor: Option<Uuid>,
    pub at: DateTime<Utc>,
}

/// A running instance of a [`WorkflowDefinition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub current_state: String,
    pub completed: bool,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl WorkflowInstance {
    /// Start at the definition's initial state.
    pub fn start(def: &WorkflowDefinition) -> Self {
        Self {
            current_state: def.initial_state.clone(),
            completed: def.is_final(&def.initial_state),
            history: Vec::new(),
        }
    }

    /// Apply the transition named `transition_name` from the current state.
    pub fn advance(
        &mut self,
        def: &WorkflowDefinition,
        transition_name: &str,
        actor: Option<Uuid>,
        role: Role,
    ) -> Result<&HistoryEntry, WorkflowError> {
        if self.completed {
            return Err(WorkflowError::InstanceCompleted);
        }
        let t = def
            .available_transitions(&self.current_state)
            .into_iter()
            .find(|t| t.name == transition_name)
            .ok_or_else(|| WorkflowError::NoSuchTransition {
                state: self.current_state.clone(),
                name: transition_name.to_string(),
            })?;
        if let Some(required) = t.min_role {
            if role < required {
                return Err(WorkflowError::InsufficientRole {
                    transition: t.name.clone(),
                    required,
                });
            }
        }

        let entry = HistoryEntry {
            transition: t.name.clone(),
            from_state: self.current_state.clone(),
            to_state: t.to.clone(),
            actor,
            at: Utc::now(),
        };
        self.current_state = t.to.clone();
        self.completed = def.is_final(&self.current_state);
        self.history.push(entry);
        Ok(&self.history[self.history.len() - 1])
    }
}
