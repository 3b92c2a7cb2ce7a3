//! # Working Calendar
//!
//! Two calendars are in play:
//!
//! - **Working days** (Monday-Friday) drive sprint capacity, burndown axes and
//!   leave-request day counts.
//! - **Business hours** (a daily opening window on working days, UTC) drive
//!   SLA due dates for policies that only count staffed time.
//!
//! Public holidays are not modelled; every Monday-Friday is a working day.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Whether the date falls on Monday through Friday.
pub fn is_working_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// All working dates in the inclusive range `start..=end`.
pub fn working_dates(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    if end < start {
        return Vec::new();
    }
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| is_working_day(*d))
        .collect()
}

/// Count the working days in the inclusive range `start..=end`.
///
/// Returns 0 when `end` precedes `start`.
pub fn working_days_between(start: NaiveDate, end: NaiveDate) -> u32 {
    if end < start {
        return 0;
    }
    let total = (end - start).num_days() + 1;
    let full_weeks = total / 7;
    let mut count = full_weeks * 5;
    // Walk the remainder (< 7 days) explicitly.
    let mut day = start + Duration::days(full_weeks * 7);
    while day <= end {
        if is_working_day(day) {
            count += 1;
        }
        day += Duration::days(1);
    }
    count as u32
}

/// Daily opening window on working days, in whole UTC hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHours {
    /// Opening hour (0-23).
    pub start_hour: u32,
    /// Closing hour (1-24), exclusive.
    pub end_hour: u32,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 17,
        }
    }
}

impl BusinessHours {
    /// Validated constructor.
    pub fn new(start_hour: u32, end_hour: u32) -> Result<Self, ValidationError> {
        if start_hour >= end_hour || end_hour > 24 {
            return Err(ValidationError::InvalidBusinessHours {
                start: start_hour,
                end: end_hour,
            });
        }
        Ok(Self {
            start_hour,
            end_hour,
        })
    }

    /// Minutes of staffed time per working day.
    pub fn minutes_per_day(&self) -> i64 {
        i64::from(self.end_hour - self.start_hour) * 60
    }

    fn opening(&self, date: NaiveDate) -> DateTime<Utc> {
        at_hour(date, self.start_hour)
    }

    fn closing(&self, date: NaiveDate) -> DateTime<Utc> {
        at_hour(date, self.end_hour)
    }

    /// Snap an instant forward to the nearest moment inside business hours.
    ///
    /// Instants already inside the window are returned unchanged.
    fn snap_forward(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let mut date = instant.date_naive();
        if is_working_day(date) {
            if instant < self.opening(date) {
                return self.opening(date);
            }
            if instant < self.closing(date) {
                return instant;
            }
        }
        loop {
            date += Duration::days(1);
            if is_working_day(date) {
                return self.opening(date);
            }
        }
    }
}

fn at_hour(date: NaiveDate, hour: u32) -> DateTime<Utc> {
    if hour >= 24 {
        let next = date.succ_opt().unwrap_or(date);
        return Utc.from_utc_datetime(&next.and_time(NaiveTime::MIN));
    }
    let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&date.and_time(time))
}

/// Advance `start` by `minutes` of business time.
///
/// Starting outside business hours snaps forward to the next opening before
/// counting. Zero or negative `minutes` return `start` unchanged.
pub fn add_business_minutes(
    start: DateTime<Utc>,
    minutes: i64,
    hours: &BusinessHours,
) -> DateTime<Utc> {
    if minutes <= 0 {
        return start;
    }
    let mut cursor = hours.snap_forward(start);
    let mut remaining = minutes;
    loop {
        let close = hours.closing(cursor.date_naive());
        let available = (close - cursor).num_minutes();
        if remaining <= available {
            return cursor + Duration::minutes(remaining);
        }
        remaining -= available;
        cursor = hours.snap_forward(close);
    }
}

/// Business minutes elapsed between `from` and `to`.
///
/// Returns 0 when `to` is not after `from`.
pub fn business_minutes_between(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    hours: &BusinessHours,
) -> i64 {
    if to <= from {
        return 0;
    }
    let mut total = 0;
    let mut cursor = hours.snap_forward(from);
    while cursor < to {
        let close = hours.closing(cursor.date_naive());
        let segment_end = if to < close { to } else { close };
        total += (segment_end - cursor).num_minutes();
        if to <= close {
            break;
        }
        cursor = hours.snap_forward(close);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    // 2024-06-03 is a Monday.

    #[test]
    fn working_days_in_one_week() {
        assert_eq!(working_days_between(date(2024, 6, 3), date(2024, 6, 9)), 5);
        assert_eq!(working_days_between(date(2024, 6, 8), date(2024, 6, 9)), 0);
        assert_eq!(working_days_between(date(2024, 6, 7), date(2024, 6, 10)), 2);
    }

    #[test]
    fn working_days_two_week_sprint() {
        assert_eq!(working_days_between(date(2024, 6, 3), date(2024, 6, 14)), 10);
    }

    #[test]
    fn working_days_inverted_range_is_zero() {
        assert_eq!(working_days_between(date(2024, 6, 10), date(2024, 6, 3)), 0);
        assert!(working_dates(date(2024, 6, 10), date(2024, 6, 3)).is_empty());
    }

    #[test]
    fn working_dates_skip_weekend() {
        let dates = working_dates(date(2024, 6, 7), date(2024, 6, 10));
        assert_eq!(dates, vec![date(2024, 6, 7), date(2024, 6, 10)]);
    }

    #[test]
    fn business_minutes_within_same_day() {
        let hours = BusinessHours::default();
        let due = add_business_minutes(at(2024, 6, 3, 10, 0), 120, &hours);
        assert_eq!(due, at(2024, 6, 3, 12, 0));
    }

    #[test]
    fn business_minutes_roll_to_next_day() {
        let hours = BusinessHours::default();
        // 16:00 + 2h => 1h today, 1h tomorrow from 09:00.
        let due = add_business_minutes(at(2024, 6, 3, 16, 0), 120, &hours);
        assert_eq!(due, at(2024, 6, 4, 10, 0));
    }

    #[test]
    fn business_minutes_skip_weekend() {
        let hours = BusinessHours::default();
        // Friday 16:30 + 1h => Monday 09:30.
        let due = add_business_minutes(at(2024, 6, 7, 16, 30), 60, &hours);
        assert_eq!(due, at(2024, 6, 10, 9, 30));
    }

    #[test]
    fn start_outside_hours_snaps_forward() {
        let hours = BusinessHours::default();
        let due = add_business_minutes(at(2024, 6, 8, 12, 0), 30, &hours);
        assert_eq!(due, at(2024, 6, 10, 9, 30));
        let early = add_business_minutes(at(2024, 6, 4, 6, 0), 30, &hours);
        assert_eq!(early, at(2024, 6, 4, 9, 30));
    }

    #[test]
    fn zero_minutes_is_identity() {
        let hours = BusinessHours::default();
        let t = at(2024, 6, 8, 23, 15);
        assert_eq!(add_business_minutes(t, 0, &hours), t);
    }

    #[test]
    fn minutes_between_spans_night() {
        let hours = BusinessHours::default();
        let elapsed =
            business_minutes_between(at(2024, 6, 3, 16, 0), at(2024, 6, 4, 10, 0), &hours);
        assert_eq!(elapsed, 120);
    }

    #[test]
    fn minutes_between_reversed_is_zero() {
        let hours = BusinessHours::default();
        assert_eq!(
            business_minutes_between(at(2024, 6, 4, 10, 0), at(2024, 6, 3, 10, 0), &hours),
            0
        );
    }

    #[test]
    fn business_hours_validation() {
        assert!(BusinessHours::new(9, 17).is_ok());
        assert!(BusinessHours::new(17, 9).is_err());
        assert!(BusinessHours::new(0, 25).is_err());
        assert_eq!(BusinessHours::new(0, 24).unwrap().minutes_per_day(), 1440);
    }
}
