//! # Velocity
//!
//! Velocity is the number of story points a team completes per sprint,
//! averaged over a trailing window of finished sprints.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default number of trailing sprints.
pub const DEFAULT_WINDOW: usize = 3;

/// Later-half average must differ from the earlier half by more than this
/// fraction to count as a trend.
pub const TREND_BAND: f64 = 0.10;

/// Points committed and completed in one finished sprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprintOutcome {
    #[serde(default)]
    pub sprint_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub end_date: NaiveDate,
    pub committed_points: f64,
    pub completed_points: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityReport {
    pub window: usize,
    pub sprints_considered: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    /// Completed over committed points across the window.
    pub completion_ratio: Option<f64>,
    pub trend: Trend,
    /// The sprints in the window, oldest first.
    pub sprints: Vec<SprintOutcome>,
}

/// Summarize the last `window` sprints by end date. A zero window uses all.
pub fn compute_velocity(outcomes: &[SprintOutcome], window: usize) -> VelocityReport {
    let mut sorted = outcomes.to_vec();
    sorted.sort_by_key(|o| o.end_date);
    let take = if window == 0 { sorted.len() } else { window.min(sorted.len()) };
    let recent = sorted.split_off(sorted.len() - take);

    let completed: Vec<f64> = recent.iter().map(|o| o.completed_points).collect();
    let (average, min, max) = if completed.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        (
            mean(&completed),
            completed.iter().copied().fold(f64::INFINITY, f64::min),
            completed.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        )
    };
    let committed: f64 = recent.iter().map(|o| o.committed_points).sum();
    let completion_ratio = (committed > 0.0).then(|| completed.iter().sum::<f64>() / committed);

    VelocityReport {
        window,
        sprints_considered: recent.len(),
        average,
        min,
        max,
        completion_ratio,
        trend: trend(&completed),
        sprints: recent,
    }
}

/// Compare the later half of the series against the earlier half. With an
/// odd count the middle sprint belongs to neither half.
fn trend(series: &[f64]) -> Trend {
    let half = series.len() / 2;
    if half == 0 {
        return Trend::Stable;
    }
    let earlier = mean(&series[..half]);
    let later = mean(&series[series.len() - half..]);
    if earlier == 0.0 {
        return if later > 0.0 { Trend::Rising } else { Trend::Stable };
    }
    let change = (later - earlier) / earlier;
    if change > TREND_BAND {
        Trend::Rising
    } else if change < -TREND_BAND {
        Trend::Falling
    } else {
        Trend::Stable
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(day: u32, committed: f64, completed: f64) -> SprintOutcome {
        SprintOutcome {
            sprint_id: None,
            name: None,
            end_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            committed_points: committed,
            completed_points: completed,
        }
    }

    #[test]
    fn window_takes_most_recent_by_end_date() {
        let outcomes = vec![
            outcome(28, 30.0, 30.0),
            outcome(1, 10.0, 10.0),
            outcome(14, 20.0, 20.0),
            outcome(21, 25.0, 25.0),
        ];
        let report = compute_velocity(&outcomes, 3);
        assert_eq!(report.sprints_considered, 3);
        assert_eq!(report.sprints[0].end_date.to_string(), "2024-01-14");
        assert_eq!(report.average, 25.0);
        assert_eq!(report.min, 20.0);
        assert_eq!(report.max, 30.0);
        assert_eq!(report.trend, Trend::Rising);
    }

    #[test]
    fn completion_ratio_over_window() {
        let outcomes = vec![outcome(1, 20.0, 15.0), outcome(15, 20.0, 20.0)];
        let report = compute_velocity(&outcomes, DEFAULT_WINDOW);
        assert_eq!(report.completion_ratio, Some(35.0 / 40.0));
    }

    #[test]
    fn small_change_is_stable() {
        let outcomes = vec![outcome(1, 20.0, 20.0), outcome(15, 20.0, 21.0)];
        assert_eq!(compute_velocity(&outcomes, 0).trend, Trend::Stable);
    }

    #[test]
    fn falling_velocity() {
        let outcomes = vec![
            outcome(1, 30.0, 30.0),
            outcome(8, 30.0, 28.0),
            outcome(15, 30.0, 20.0),
            outcome(22, 30.0, 18.0),
        ];
        assert_eq!(compute_velocity(&outcomes, 0).trend, Trend::Falling);
    }

    #[test]
    fn empty_history() {
        let report = compute_velocity(&[], 3);
        assert_eq!(report.sprints_considered, 0);
        assert_eq!(report.average, 0.0);
        assert_eq!(report.completion_ratio, None);
        assert_eq!(report.trend, Trend::Stable);
    }
}
