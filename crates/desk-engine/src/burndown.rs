//! # Sprint Burndown
//!
//! One point per working day of the sprint. Remaining points drop by the
//! points of tasks completed on or before that day; completions on a weekend
//! show up on the following working day.

use chrono::NaiveDate;
use desk_core::working_dates;
use serde::{Deserialize, Serialize};

use crate::error::PlanningError;

/// Points completed on a date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub date: NaiveDate,
    pub points: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BurndownPoint {
    pub date: NaiveDate,
    pub remaining: f64,
    pub ideal: f64,
}

pub fn burndown(
    start: NaiveDate,
    end: NaiveDate,
    total_points: f64,
    completions: &[Completion],
) -> Result<Vec<BurndownPoint>, PlanningError> {
    if end < start {
        return Err(PlanningError::InvertedRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }
    if total_points < 0.0 {
        return Err(PlanningError::Negative {
            field: "total_points",
            value: total_points,
        });
    }

    let days = working_dates(start, end);
    let steps = days.len().saturating_sub(1);
    let mut sorted = completions.to_vec();
    sorted.sort_by_key(|c| c.date);

    let mut done = 0.0;
    let mut next = 0;
    let points = days
        .into_iter()
        .enumerate()
        .map(|(i, date)| {
            while next < sorted.len() && sorted[next].date <= date {
                done += sorted[next].points;
                next += 1;
            }
            let ideal = if steps == 0 {
                0.0
            } else {
                total_points * (1.0 - i as f64 / steps as f64)
            };
            BurndownPoint {
                date,
                remaining: (total_points - done).max(0.0),
                ideal,
            }
        })
        .collect();
    Ok(points)
}
