//! # Workflow Subcommand
//!
//! Checks a workflow definition file with the same rules the API applies
//! before storing one, so definitions can be reviewed in CI.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Subcommand};
use desk_state::WorkflowDefinition;
use serde::Serialize;

use crate::input::{load, print_json};

#[derive(Args, Debug)]
pub struct WorkflowArgs {
    #[command(subcommand)]
    pub command: WorkflowCommand,
}

#[derive(Subcommand, Debug)]
pub enum WorkflowCommand {
    /// Validate a workflow definition (YAML or JSON).
    Validate {
        /// Path to the definition file.
        file: PathBuf,
    },
}

/// Result printed by `desk workflow validate`.
#[derive(Debug, Serialize, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub states: usize,
    pub transitions: usize,
    pub final_states: Vec<String>,
}

pub fn run_workflow(args: &WorkflowArgs) -> Result<u8> {
    match &args.command {
        WorkflowCommand::Validate { file } => {
            let report = validate_file(file)?;
            print_json(&report)?;
            Ok(if report.valid { 0 } else { 1 })
        }
    }
}

/// Load and validate a definition. Parse failures are errors; structural
/// problems are reported with `valid: false`.
pub fn validate_file(path: &Path) -> Result<ValidationReport> {
    let definition: WorkflowDefinition = load(path)?;
    let error = definition.validate().err().map(|e| e.to_string());
    if let Some(e) = &error {
        tracing::warn!(workflow = %definition.name, error = %e, "workflow definition rejected");
    }
    Ok(ValidationReport {
        valid: error.is_none(),
        name: definition.name,
        error,
        states: definition.states.len(),
        transitions: definition.transitions.len(),
        final_states: definition.final_states,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const APPROVAL: &str = r#"
name: Access request
subject_type: request
states: [submitted, approved, rejected]
initial_state: submitted
final_states: [approved, rejected]
transitions:
  - name: approve
    from: submitted
    to: approved
    min_role: manager
  - name: reject
    from: submitted
    to: rejected
"#;

    #[test]
    fn sound_definition_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("approval.yaml");
        std::fs::write(&path, APPROVAL).unwrap();
        let report = validate_file(&path).unwrap();
        assert!(report.valid);
        assert_eq!(report.name, "Access request");
        assert_eq!(report.states, 3);
        assert_eq!(report.transitions, 2);
        assert!(report.error.is_none());
    }

    #[test]
    fn unreachable_state_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(
            &path,
            r#"{
                "name": "Broken",
                "states": ["open", "done", "limbo"],
                "initial_state": "open",
                "final_states": ["done"],
                "transitions": [{"name": "finish", "from": "open", "to": "done"}]
            }"#,
        )
        .unwrap();
        let report = validate_file(&path).unwrap();
        assert!(!report.valid);
        assert!(report.error.unwrap().contains("limbo"));
    }

    #[test]
    fn unparsable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, "{}").unwrap();
        assert!(validate_file(&path).is_err());
    }
}
