//! # Sprint Capacity
//!
//! Capacity is counted in hours, then converted to a story-point forecast
//! using the team's recent velocity. A member contributes
//!
//! ```text
//! (working days in sprint - leave days on working days) x hours_per_day x allocation
//! ```
//!
//! and the team total is discounted by the focus factor (meetings, support
//! rotation, context switching). When the focus hours of the sprints that
//! produced the velocity figure are known, the forecast is scaled by the
//! ratio of this sprint's focus hours to those historical hours.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use desk_core::{is_working_day, working_days_between};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PlanningError;

fn default_allocation() -> f64 {
    1.0
}

fn default_focus_factor() -> f64 {
    0.8
}

/// One team member's availability for the sprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberAvailability {
    pub user_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub hours_per_day: f64,
    /// Share of the member's time given to this team, in (0, 1].
    #[serde(default = "default_allocation")]
    pub allocation: f64,
    /// Days off. Weekends and dates outside the sprint are ignored.
    #[serde(default)]
    pub leave_dates: Vec<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityInput {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_focus_factor")]
    pub focus_factor: f64,
    pub members: Vec<MemberAvailability>,
    #[serde(default)]
    pub committed_points: f64,
    /// Average completed points per sprint over recent sprints.
    #[serde(default)]
    pub average_velocity: Option<f64>,
    /// Average focus hours of the sprints behind `average_velocity`.
    #[serde(default)]
    pub historical_focus_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberCapacity {
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub working_days: u32,
    pub leave_days: u32,
    pub available_days: u32,
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityReport {
    pub working_days: u32,
    pub members: Vec<MemberCapacity>,
    pub total_hours: f64,
    pub focus_hours: f64,
    /// Story points the team can be expected to finish, when a velocity is known.
    pub forecast_points: Option<f64>,
    pub committed_points: f64,
    /// `committed_points / forecast_points`.
    pub load: Option<f64>,
    pub over_committed: bool,
}

/// Compute team capacity and the point forecast for a sprint.
pub fn compute_capacity(input: &CapacityInput) -> Result<CapacityReport, PlanningError> {
    if input.end_date < input.start_date {
        return Err(PlanningError::InvertedRange {
            start: input.start_date.to_string(),
            end: input.end_date.to_string(),
        });
    }
    if !(input.focus_factor > 0.0 && input.focus_factor <= 1.0) {
        return Err(PlanningError::FocusFactorOutOfRange(input.focus_factor));
    }
    non_negative("committed_points", input.committed_points)?;
    if let Some(v) = input.average_velocity {
        non_negative("average_velocity", v)?;
    }
    if let Some(h) = input.historical_focus_hours {
        non_negative("historical_focus_hours", h)?;
    }

    let working_days = working_days_between(input.start_date, input.end_date);
    let mut members = Vec::with_capacity(input.members.len());
    for m in &input.members {
        if !(m.allocation > 0.0 && m.allocation <= 1.0) {
            return Err(PlanningError::AllocationOutOfRange {
                member: m.user_id,
                value: m.allocation,
            });
        }
        if !(m.hours_per_day > 0.0 && m.hours_per_day <= 24.0) {
            return Err(PlanningError::HoursPerDayOutOfRange {
                member: m.user_id,
                value: m.hours_per_day,
            });
        }
        let leave: BTreeSet<NaiveDate> = m
            .leave_dates
            .iter()
            .copied()
            .filter(|d| *d >= input.start_date && *d <= input.end_date && is_working_day(*d))
            .collect();
        let leave_days = leave.len() as u32;
        let available_days = working_days.saturating_sub(leave_days);
        members.push(MemberCapacity {
            user_id: m.user_id,
            name: m.name.clone(),
            working_days,
            leave_days,
            available_days,
            hours: f64::from(available_days) * m.hours_per_day * m.allocation,
        });
    }

    let total_hours: f64 = members.iter().map(|m| m.hours).sum();
    let focus_hours = total_hours * input.focus_factor;
    let forecast_points = input.average_velocity.map(|v| match input.historical_focus_hours {
        Some(h) if h > 0.0 => v * focus_hours / h,
        _ => v,
    });
    let load = forecast_points
        .filter(|f| *f > 0.0)
        .map(|f| input.committed_points / f);
    let over_committed = match forecast_points {
        Some(f) if f > 0.0 => input.committed_points > f,
        Some(_) => input.committed_points > 0.0,
        None => false,
    };

    Ok(CapacityReport {
        working_days,
        members,
        total_hours,
        focus_hours,
        forecast_points,
        committed_points: input.committed_points,
        load,
        over_committed,
    })
}

fn non_negative(field: &'static str, value: f64) -> Result<(), PlanningError> {
    if value < 0.0 || value.is_nan() {
        return Err(PlanningError::Negative { field, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        // June 2024; the 3rd is a Monday.
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn member(hours: f64, allocation: f64, leave: &[u32]) -> MemberAvailability {
        MemberAvailability {
            user_id: Uuid::new_v4(),
            name: None,
            hours_per_day: hours,
            allocation,
            leave_dates: leave.iter().map(|d| date(*d)).collect(),
        }
    }

    fn two_week_sprint(members: Vec<MemberAvailability>) -> CapacityInput {
        CapacityInput {
            start_date: date(3),
            end_date: date(14),
            focus_factor: 0.8,
            members,
            committed_points: 0.0,
            average_velocity: None,
            historical_focus_hours: None,
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn full_time_member_without_leave() {
        let report = compute_capacity(&two_week_sprint(vec![member(8.0, 1.0, &[])])).unwrap();
        assert_eq!(report.working_days, 10);
        assert!(approx(report.total_hours, 80.0));
        assert!(approx(report.focus_hours, 64.0));
        assert_eq!(report.forecast_points, None);
        assert!(!report.over_committed);
    }

    #[test]
    fn leave_on_weekends_and_outside_sprint_is_ignored() {
        // 4th and 5th are working days, 8th is a Saturday, 20th is after the sprint,
        // and the 4th is listed twice.
        let m = member(8.0, 0.5, &[4, 5, 4, 8, 20]);
        let report = compute_capacity(&two_week_sprint(vec![m])).unwrap();
        let mc = &report.members[0];
        assert_eq!(mc.leave_days, 2);
        assert_eq!(mc.available_days, 8);
        assert!(approx(mc.hours, 32.0));
    }

    #[test]
    fn forecast_scales_with_historical_focus_hours() {
        let mut input = two_week_sprint(vec![member(8.0, 1.0, &[]), member(8.0, 1.0, &[])]);
        input.average_velocity = Some(30.0);
        input.historical_focus_hours = Some(256.0);
        input.committed_points = 20.0;
        let report = compute_capacity(&input).unwrap();
        // 160h x 0.8 = 128 focus hours, half the historical figure.
        assert!(approx(report.focus_hours, 128.0));
        assert!(approx(report.forecast_points.unwrap(), 15.0));
        assert!(report.over_committed);
        assert!(approx(report.load.unwrap(), 20.0 / 15.0));
    }

    #[test]
    fn forecast_is_velocity_without_history() {
        let mut input = two_week_sprint(vec![member(6.0, 1.0, &[])]);
        input.average_velocity = Some(12.0);
        input.committed_points = 12.0;
        let report = compute_capacity(&input).unwrap();
        assert_eq!(report.forecast_points, Some(12.0));
        assert!(!report.over_committed);
        assert!(approx(report.load.unwrap(), 1.0));
    }

    #[test]
    fn rejects_inverted_range() {
        let mut input = two_week_sprint(vec![]);
        input.end_date = date(1);
        assert!(matches!(
            compute_capacity(&input),
            Err(PlanningError::InvertedRange { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_factors() {
        let mut input = two_week_sprint(vec![]);
        input.focus_factor = 0.0;
        assert_eq!(
            compute_capacity(&input),
            Err(PlanningError::FocusFactorOutOfRange(0.0))
        );

        let input = two_week_sprint(vec![member(8.0, 1.5, &[])]);
        assert!(matches!(
            compute_capacity(&input),
            Err(PlanningError::AllocationOutOfRange { .. })
        ));
    }

    #[test]
    fn input_parses_with_defaults() {
        let json = serde_json::json!({
            "start_date": "2024-06-03",
            "end_date": "2024-06-07",
            "members": [{"user_id": Uuid::nil(), "hours_per_day": 7.5}]
        });
        let input: CapacityInput = serde_json::from_value(json).unwrap();
        assert!(approx(input.focus_factor, 0.8));
        let report = compute_capacity(&input).unwrap();
        assert!(approx(report.total_hours, 37.5));
    }
}
