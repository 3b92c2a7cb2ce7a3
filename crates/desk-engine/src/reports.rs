//! # Report Aggregation
//!
//! Pure folds over record summaries. The API layer extracts the facts from
//! its stores; nothing here knows about persistence or tenancy.

use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::{DateTime, Utc};
use desk_state::TaskStatus;
use serde::{Deserialize, Serialize};

/// Count records per status name.
pub fn status_breakdown<S: Display>(statuses: impl IntoIterator<Item = S>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for s in statuses {
        *counts.entry(s.to_string()).or_insert(0) += 1;
    }
    counts
}

/// What an incident report needs to know about one incident.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IncidentFacts {
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub open: bool,
    /// Resolution SLA outcome; `None` when no policy applied.
    pub sla_breached: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentMetrics {
    pub total: usize,
    pub open: usize,
    pub resolved: usize,
    /// Mean time to resolve, in minutes.
    pub mttr_minutes: Option<f64>,
    pub sla_met: usize,
    pub sla_breached: usize,
    /// Met over met plus breached, as a percentage.
    pub sla_compliance_pct: Option<f64>,
}

impl IncidentMetrics {
    pub fn from_facts(facts: &[IncidentFacts]) -> Self {
        let resolution_minutes: Vec<i64> = facts
            .iter()
            .filter_map(|f| f.resolved_at.map(|r| (r - f.created_at).num_minutes().max(0)))
            .collect();
        let mttr_minutes = (!resolution_minutes.is_empty()).then(|| {
            resolution_minutes.iter().sum::<i64>() as f64 / resolution_minutes.len() as f64
        });
        let sla_breached = facts.iter().filter(|f| f.sla_breached == Some(true)).count();
        let sla_met = facts.iter().filter(|f| f.sla_breached == Some(false)).count();
        let judged = sla_met + sla_breached;
        Self {
            total: facts.len(),
            open: facts.iter().filter(|f| f.open).count(),
            resolved: resolution_minutes.len(),
            mttr_minutes,
            sla_met,
            sla_breached,
            sla_compliance_pct: (judged > 0).then(|| sla_met as f64 * 100.0 / judged as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectProgress {
    pub total_tasks: usize,
    pub done_tasks: usize,
    pub by_status: BTreeMap<String, usize>,
    pub points_total: f64,
    pub points_done: f64,
    /// Share of points done, or of tasks done when nothing is estimated.
    pub percent_complete: f64,
}

impl ProjectProgress {
    /// Fold `(status, story points)` pairs.
    pub fn from_tasks(tasks: impl IntoIterator<Item = (TaskStatus, Option<f64>)>) -> Self {
        let mut by_status = BTreeMap::new();
        let (mut total_tasks, mut done_tasks) = (0, 0);
        let (mut points_total, mut points_done) = (0.0, 0.0);
        for (status, points) in tasks {
            total_tasks += 1;
            *by_status.entry(status.to_string()).or_insert(0) += 1;
            let points = points.unwrap_or(0.0);
            points_total += points;
            if status.is_done() {
                done_tasks += 1;
                points_done += points;
            }
        }
        let percent_complete = if points_total > 0.0 {
            points_done * 100.0 / points_total
        } else if total_tasks > 0 {
            done_tasks as f64 * 100.0 / total_tasks as f64
        } else {
            0.0
        };
        Self {
            total_tasks,
            done_tasks,
            by_status,
            points_total,
            points_done,
            percent_complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use desk_state::IncidentStatus;

    #[test]
    fn breakdown_counts_by_name() {
        let counts = status_breakdown([
            IncidentStatus::New,
            IncidentStatus::New,
            IncidentStatus::Resolved,
        ]);
        assert_eq!(counts.get("NEW"), Some(&2));
        assert_eq!(counts.get("RESOLVED"), Some(&1));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn incident_metrics() {
        let t0 = Utc::now();
        let facts = [
            IncidentFacts {
                created_at: t0,
                resolved_at: Some(t0 + Duration::minutes(60)),
                open: false,
                sla_breached: Some(false),
            },
            IncidentFacts {
                created_at: t0,
                resolved_at: Some(t0 + Duration::minutes(180)),
                open: false,
                sla_breached: Some(true),
            },
            IncidentFacts {
                created_at: t0,
                resolved_at: None,
                open: true,
                sla_breached: None,
            },
        ];
        let m = IncidentMetrics::from_facts(&facts);
        assert_eq!(m.total, 3);
        assert_eq!(m.open, 1);
        assert_eq!(m.resolved, 2);
        assert_eq!(m.mttr_minutes, Some(120.0));
        assert_eq!(m.sla_compliance_pct, Some(50.0));
    }

    #[test]
    fn empty_metrics_have_no_averages() {
        let m = IncidentMetrics::from_facts(&[]);
        assert_eq!(m.mttr_minutes, None);
        assert_eq!(m.sla_compliance_pct, None);
    }

    #[test]
    fn progress_by_points_and_by_count() {
        let p = ProjectProgress::from_tasks([
            (TaskStatus::Done, Some(5.0)),
            (TaskStatus::InProgress, Some(3.0)),
            (TaskStatus::Todo, Some(2.0)),
        ]);
        assert_eq!(p.points_done, 5.0);
        assert_eq!(p.percent_complete, 50.0);
        assert_eq!(p.by_status.get("IN_PROGRESS"), Some(&1));

        let p = ProjectProgress::from_tasks([(TaskStatus::Done, None), (TaskStatus::Todo, None)]);
        assert_eq!(p.percent_complete, 50.0);
    }
}
