//! # Plan Subcommand
//!
//! Runs the sprint planning arithmetic on local files, for planning sessions
//! that happen before the sprint exists in the system.
//!
//! ```bash
//! desk plan capacity sprint-42.yaml
//! desk plan velocity history.json --window 5
//! ```

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Subcommand};
use desk_engine::{
    compute_capacity, compute_velocity, CapacityInput, CapacityReport, SprintOutcome,
    VelocityReport, DEFAULT_WINDOW,
};
use serde::Deserialize;

use crate::input::{load, print_json};

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(subcommand)]
    pub command: PlanCommand,
}

#[derive(Subcommand, Debug)]
pub enum PlanCommand {
    /// Team capacity and point forecast for one sprint.
    Capacity {
        /// Sprint dates, members and commitment (YAML or JSON).
        file: PathBuf,
    },
    /// Velocity over the most recent finished sprints.
    Velocity {
        /// Sprint outcomes, as a list or under a `sprints` key.
        file: PathBuf,
        /// Number of recent sprints to average; 0 uses all of them.
        #[arg(long, default_value_t = DEFAULT_WINDOW)]
        window: usize,
    },
}

/// Accepted shapes of a velocity history file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum History {
    Bare(Vec<SprintOutcome>),
    Keyed { sprints: Vec<SprintOutcome> },
}

impl History {
    fn into_outcomes(self) -> Vec<SprintOutcome> {
        match self {
            History::Bare(s) | History::Keyed { sprints: s } => s,
        }
    }
}

pub fn run_plan(args: &PlanArgs) -> Result<u8> {
    match &args.command {
        PlanCommand::Capacity { file } => print_json(&capacity_from_file(file)?)?,
        PlanCommand::Velocity { file, window } => print_json(&velocity_from_file(file, *window)?)?,
    }
    Ok(0)
}

pub fn capacity_from_file(path: &Path) -> Result<CapacityReport> {
    let input: CapacityInput = load(path)?;
    let report = compute_capacity(&input)?;
    if report.over_committed {
        tracing::warn!(
            committed = report.committed_points,
            forecast = report.forecast_points,
            "sprint is over-committed"
        );
    }
    Ok(report)
}

pub fn velocity_from_file(path: &Path, window: usize) -> Result<VelocityReport> {
    let history: History = load(path)?;
    Ok(compute_velocity(&history.into_outcomes(), window))
}

#[cfg(test)]
mod tests {
    use super::*;
    use desk_engine::Trend;

    #[test]
    fn capacity_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sprint.yaml");
        // 2024-06-03 is a Monday; two working weeks.
        std::fs::write(
            &path,
            r#"
start_date: 2024-06-03
end_date: 2024-06-14
focus_factor: 0.5
committed_points: 30
average_velocity: 20
members:
  - user_id: 8d3f2a4e-1b7c-4c1e-9a53-2f6b7f0e1a11
    name: Ana
    hours_per_day: 8
  - user_id: 0c1e5b2a-7f3d-4e9a-8b61-5d4c3b2a1f00
    hours_per_day: 8
    allocation: 0.5
    leave_dates: [2024-06-10, 2024-06-15]
"#,
        )
        .unwrap();
        let report = capacity_from_file(&path).unwrap();
        assert_eq!(report.working_days, 10);
        assert_eq!(report.members[1].leave_days, 1);
        assert!((report.total_hours - (80.0 + 36.0)).abs() < 1e-9);
        assert!((report.focus_hours - 58.0).abs() < 1e-9);
        assert_eq!(report.forecast_points, Some(20.0));
        assert!(report.over_committed);
    }

    #[test]
    fn invalid_capacity_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sprint.json");
        std::fs::write(
            &path,
            r#"{"start_date": "2024-06-14", "end_date": "2024-06-03", "members": []}"#,
        )
        .unwrap();
        let err = capacity_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("before it starts"));
    }

    #[test]
    fn velocity_accepts_both_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let sprints = r#"[
            {"end_date": "2024-05-03", "committed_points": 20, "completed_points": 10},
            {"end_date": "2024-05-17", "committed_points": 20, "completed_points": 20},
            {"end_date": "2024-05-31", "committed_points": 20, "completed_points": 30}
        ]"#;
        let bare = dir.path().join("bare.json");
        std::fs::write(&bare, sprints).unwrap();
        let keyed = dir.path().join("keyed.json");
        std::fs::write(&keyed, format!(r#"{{"sprints": {sprints}}}"#)).unwrap();

        let a = velocity_from_file(&bare, 0).unwrap();
        let b = velocity_from_file(&keyed, 0).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.sprints_considered, 3);
        assert!((a.average - 20.0).abs() < 1e-9);
        assert_eq!(a.trend, Trend::Rising);
    }

    #[test]
    fn velocity_window_keeps_latest_sprints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.yaml");
        std::fs::write(
            &path,
            r#"
- {end_date: 2024-05-31, committed_points: 10, completed_points: 8}
- {end_date: 2024-05-03, committed_points: 10, completed_points: 2}
- {end_date: 2024-05-17, committed_points: 10, completed_points: 6}
"#,
        )
        .unwrap();
        let report = velocity_from_file(&path, 2).unwrap();
        assert_eq!(report.sprints_considered, 2);
        assert!((report.average - 7.0).abs() < 1e-9);
        assert_eq!(report.min, 6.0);
    }
}
