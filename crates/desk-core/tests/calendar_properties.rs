//! Property tests for the working calendar and the priority matrix.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use desk_core::{
    add_business_minutes, business_minutes_between, working_dates, working_days_between,
    BusinessHours, Impact, Priority, Urgency,
};
use proptest::prelude::*;

fn any_date() -> impl Strategy<Value = NaiveDate> {
    (0i64..3650).prop_map(|offset| {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + Duration::days(offset)
    })
}

fn any_impact() -> impl Strategy<Value = Impact> {
    prop_oneof![Just(Impact::Low), Just(Impact::Medium), Just(Impact::High)]
}

fn any_urgency() -> impl Strategy<Value = Urgency> {
    prop_oneof![Just(Urgency::Low), Just(Urgency::Medium), Just(Urgency::High)]
}

proptest! {
    #[test]
    fn working_days_never_exceed_calendar_days(start in any_date(), span in 0i64..400) {
        let end = start + Duration::days(span);
        let count = working_days_between(start, end);
        prop_assert!(i64::from(count) <= span + 1);
        prop_assert_eq!(count as usize, working_dates(start, end).len());
    }

    #[test]
    fn business_minutes_are_monotonic(
        start_min in 0i64..(60 * 24 * 30),
        a in 0i64..5000,
        b in 0i64..5000,
    ) {
        let hours = BusinessHours::default();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(start_min);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(add_business_minutes(start, lo, &hours) <= add_business_minutes(start, hi, &hours));
    }

    #[test]
    fn business_minutes_roundtrip(start_min in 0i64..(60 * 24 * 30), minutes in 1i64..5000) {
        let hours = BusinessHours::default();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(start_min);
        let due = add_business_minutes(start, minutes, &hours);
        prop_assert_eq!(business_minutes_between(start, due, &hours), minutes);
    }

    #[test]
    fn raising_impact_never_lowers_priority(i in any_impact(), u in any_urgency()) {
        let base = Priority::from_matrix(i, u);
        let raised = Priority::from_matrix(Impact::High, u);
        prop_assert!(raised >= base);
    }
}
