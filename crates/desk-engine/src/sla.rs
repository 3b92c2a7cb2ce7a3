//! # SLA Clocks
//!
//! An SLA target gives response and resolution budgets per priority. A clock
//! starts when the ticket is opened and stops when the milestone is reached.
//! Time spent on hold is added to the budget, pushing the due date out.
//!
//! When a policy counts business hours only, both the due date and the
//! elapsed time are measured in [`BusinessHours`]; otherwise wall-clock
//! minutes are used.

use chrono::{DateTime, Duration, Utc};
use desk_core::{add_business_minutes, business_minutes_between, BusinessHours, Priority};
use serde::{Deserialize, Serialize};

/// Share of the budget after which an open clock is reported at risk.
pub const AT_RISK_RATIO: f64 = 0.8;

/// Largest budget a policy may set: one year.
pub const MAX_BUDGET_MINUTES: i64 = 366 * 24 * 60;

/// Budget plus pauses beyond which due dates stop moving: ten years.
const MAX_CLOCK_MINUTES: i64 = 10 * MAX_BUDGET_MINUTES;

/// Response and resolution budgets for one priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaTarget {
    pub priority: Priority,
    pub response_minutes: i64,
    pub resolution_minutes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlaState {
    OnTrack,
    AtRisk,
    Breached,
    /// Milestone reached before the due date.
    Met,
    /// Milestone reached after the due date.
    Missed,
}

impl SlaState {
    pub fn is_violation(&self) -> bool {
        matches!(self, Self::Breached | Self::Missed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlaEvaluation {
    pub state: SlaState,
    pub due_at: DateTime<Utc>,
    /// Elapsed (unpaused) time over the budget.
    pub elapsed_ratio: f64,
    /// Minutes until the due date; negative once past it.
    pub remaining_minutes: i64,
}

/// The first target matching `priority`.
pub fn target_for(targets: &[SlaTarget], priority: Priority) -> Option<&SlaTarget> {
    targets.iter().find(|t| t.priority == priority)
}

/// Instant at which `minutes` of budget run out.
///
/// Budgets are clamped to ten years, so stored policies with absurd values
/// yield a far-future date rather than an overflow.
pub fn due_at(start: DateTime<Utc>, minutes: i64, hours: Option<&BusinessHours>) -> DateTime<Utc> {
    let minutes = minutes.clamp(0, MAX_CLOCK_MINUTES);
    match hours {
        Some(h) => add_business_minutes(start, minutes, h),
        None => Duration::try_minutes(minutes)
            .and_then(|d| start.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
    }
}

fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>, hours: Option<&BusinessHours>) -> i64 {
    match hours {
        Some(h) => business_minutes_between(from, to, h),
        None => (to - from).num_minutes().max(0),
    }
}

/// Evaluate a clock started at `started` with a budget of `target_minutes`.
///
/// `completed_at` stops the clock; otherwise it is read at `now`.
pub fn evaluate(
    started: DateTime<Utc>,
    target_minutes: i64,
    paused_minutes: i64,
    completed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    hours: Option<&BusinessHours>,
) -> SlaEvaluation {
    let paused = paused_minutes.max(0);
    let due = due_at(started, target_minutes.saturating_add(paused), hours);
    let reference = completed_at.unwrap_or(now);

    let elapsed = (minutes_between(started, reference, hours) - paused).max(0);
    let elapsed_ratio = if target_minutes > 0 {
        elapsed as f64 / target_minutes as f64
    } else if elapsed > 0 {
        1.0
    } else {
        0.0
    };
    let remaining_minutes = if reference <= due {
        minutes_between(reference, due, hours)
    } else {
        -minutes_between(due, reference, hours)
    };

    let state = match completed_at {
        Some(at) if at <= due => SlaState::Met,
        Some(_) => SlaState::Missed,
        None if now > due => SlaState::Breached,
        None if elapsed_ratio >= AT_RISK_RATIO => SlaState::AtRisk,
        None => SlaState::OnTrack,
    };

    SlaEvaluation {
        state,
        due_at: due,
        elapsed_ratio,
        remaining_minutes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        // 2024-06-03 is a Monday.
        Utc.with_ymd_and_hms(2024, 6, d, h, m, 0).unwrap()
    }

    #[test]
    fn wall_clock_on_track_then_at_risk_then_breached() {
        let start = at(3, 10, 0);
        let e = evaluate(start, 60, 0, None, at(3, 10, 30), None);
        assert_eq!(e.state, SlaState::OnTrack);
        assert_eq!(e.due_at, at(3, 11, 0));
        assert_eq!(e.remaining_minutes, 30);

        let e = evaluate(start, 60, 0, None, at(3, 10, 48), None);
        assert_eq!(e.state, SlaState::AtRisk);

        let e = evaluate(start, 60, 0, None, at(3, 11, 15), None);
        assert_eq!(e.state, SlaState::Breached);
        assert_eq!(e.remaining_minutes, -15);
    }

    #[test]
    fn completion_freezes_clock() {
        let start = at(3, 10, 0);
        let e = evaluate(start, 60, 0, Some(at(3, 10, 50)), at(5, 0, 0), None);
        assert_eq!(e.state, SlaState::Met);
        let e = evaluate(start, 60, 0, Some(at(3, 11, 5)), at(3, 11, 5), None);
        assert_eq!(e.state, SlaState::Missed);
        assert!(e.state.is_violation());
    }

    #[test]
    fn paused_minutes_extend_due_date() {
        let start = at(3, 10, 0);
        let e = evaluate(start, 60, 30, None, at(3, 11, 15), None);
        assert_eq!(e.due_at, at(3, 11, 30));
        // 75 wall minutes less 30 on hold.
        assert!((e.elapsed_ratio - 0.75).abs() < 1e-9);
        assert_eq!(e.state, SlaState::OnTrack);
        assert_eq!(e.remaining_minutes, 15);
    }

    #[test]
    fn business_hours_skip_the_night() {
        let hours = BusinessHours::default();
        // Friday 16:00 plus 2 business hours is Monday 10:00.
        let due = due_at(at(7, 16, 0), 120, Some(&hours));
        assert_eq!(due, at(10, 10, 0));

        let e = evaluate(at(7, 16, 0), 120, 0, None, at(8, 12, 0), Some(&hours));
        assert_eq!(e.state, SlaState::OnTrack);
        assert_eq!(e.remaining_minutes, 60);
    }

    #[test]
    fn oversized_budgets_do_not_overflow() {
        let start = at(3, 10, 0);
        let due = due_at(start, i64::MAX, None);
        assert!(due > start);
        let e = evaluate(start, i64::MAX, i64::MAX, None, at(3, 11, 0), None);
        assert_eq!(e.state, SlaState::OnTrack);

        let hours = BusinessHours::default();
        let due = due_at(start, 1_000_000_000_000_000_000, Some(&hours));
        assert!(due > start);
    }

    #[test]
    fn target_lookup_by_priority() {
        let targets = [
            SlaTarget {
                priority: Priority::Critical,
                response_minutes: 15,
                resolution_minutes: 240,
            },
            SlaTarget {
                priority: Priority::Low,
                response_minutes: 480,
                resolution_minutes: 4800,
            },
        ];
        assert_eq!(target_for(&targets, Priority::Low).unwrap().response_minutes, 480);
        assert!(target_for(&targets, Priority::High).is_none());
    }
}
