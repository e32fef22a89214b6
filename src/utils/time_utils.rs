//! Date and time helpers shared by the attendance and leave services.
//!
//! Everything here is pure. Hours are decimals rounded to two places where
//! they are produced; minutes are whole numbers, floored.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeDelta, Utc, Weekday};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::config::AttendancePolicy;

const MILLIS_PER_HOUR: i64 = 60 * 60 * 1000;
const MILLIS_PER_MINUTE: i64 = 60 * 1000;

/// Hours between two instants, rounded to 2 decimal places.
/// Missing endpoints yield zero.
pub fn hours_between(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Decimal {
    let (Some(start), Some(end)) = (start, end) else {
        return Decimal::ZERO;
    };

    let millis = (end - start).num_milliseconds();
    (Decimal::from(millis) / Decimal::from(MILLIS_PER_HOUR))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Whole minutes from `start` to `end`, floored. Negative when `end < start`.
pub fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_milliseconds().div_euclid(MILLIS_PER_MINUTE)
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Every calendar date in `[start, end]`. Empty when `end < start`.
pub fn dates_in_range(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}

/// Inclusive count of weekdays in `[start, end]`; zero when `end < start`.
pub fn business_days(start: NaiveDate, end: NaiveDate) -> i64 {
    dates_in_range(start, end).filter(|d| !is_weekend(*d)).count() as i64
}

/// Inclusive count of calendar days in `[start, end]`; zero when `end < start`.
pub fn calendar_days(start: NaiveDate, end: NaiveDate) -> i64 {
    if end < start {
        return 0;
    }
    (end - start).num_days() + 1
}

/// Parses `HH:MM` (24h).
pub fn parse_hh_mm(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| anyhow!("invalid time {raw:?}, expected HH:MM: {e}"))
}

/// The office-local calendar date of `now`.
pub fn local_date(now: DateTime<Utc>, policy: &AttendancePolicy) -> NaiveDate {
    now.with_timezone(&policy.utc_offset).date_naive()
}

/// The instant at which check-in starts on the given office-local date.
pub fn threshold_for(date: NaiveDate, policy: &AttendancePolicy) -> DateTime<Utc> {
    let local = date.and_time(policy.check_in_start_time);
    let offset = TimeDelta::seconds(i64::from(policy.utc_offset.local_minus_utc()));
    (local - offset).and_utc()
}

/// Formats an instant as office-local `HH:MM`, for exports.
pub fn format_local_time(at: Option<DateTime<Utc>>, policy: &AttendancePolicy) -> String {
    at.map(|t| t.with_timezone(&policy.utc_offset).format("%H:%M").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use rust_decimal_macros::dec;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn business_days_counts_weekdays_inclusively() {
        // 2025-03-03 is a Monday
        assert_eq!(business_days(d("2025-03-03"), d("2025-03-03")), 1);
        assert_eq!(business_days(d("2025-03-03"), d("2025-03-07")), 5);
        assert_eq!(business_days(d("2025-03-08"), d("2025-03-08")), 0);
        assert_eq!(business_days(d("2025-03-09"), d("2025-03-09")), 0);
        assert_eq!(business_days(d("2025-03-08"), d("2025-03-09")), 0);
        assert_eq!(business_days(d("2025-03-07"), d("2025-03-10")), 2);
    }

    #[test]
    fn business_days_is_zero_for_reversed_range() {
        assert_eq!(business_days(d("2025-03-07"), d("2025-03-03")), 0);
        assert_eq!(dates_in_range(d("2025-03-07"), d("2025-03-03")).count(), 0);
    }

    #[test]
    fn business_days_skip_weekends_calendar_days_do_not() {
        assert_eq!(business_days(d("2025-03-07"), d("2025-03-10")), 2);
        assert_eq!(calendar_days(d("2025-03-07"), d("2025-03-10")), 4);
        assert_eq!(business_days(d("2025-03-08"), d("2025-03-09")), 0);
        assert_eq!(calendar_days(d("2025-03-07"), d("2025-03-03")), 0);
    }

    #[test]
    fn hours_are_rounded_to_two_places() {
        assert_eq!(
            hours_between(Some(at("2025-03-03T09:00:00Z")), Some(at("2025-03-03T12:30:00Z"))),
            dec!(3.5)
        );
        // 1h 20m = 1.3333..
        assert_eq!(
            hours_between(Some(at("2025-03-03T09:00:00Z")), Some(at("2025-03-03T10:20:00Z"))),
            dec!(1.33)
        );
        // 0.125h rounds half away from zero
        assert_eq!(
            hours_between(Some(at("2025-03-03T09:00:00Z")), Some(at("2025-03-03T09:07:30Z"))),
            dec!(0.13)
        );
    }

    #[test]
    fn hours_are_zero_when_an_endpoint_is_missing() {
        assert_eq!(hours_between(None, Some(at("2025-03-03T12:30:00Z"))), Decimal::ZERO);
        assert_eq!(hours_between(Some(at("2025-03-03T12:30:00Z")), None), Decimal::ZERO);
    }

    #[test]
    fn minutes_are_floored_and_may_be_negative() {
        assert_eq!(minutes_between(at("2025-03-03T09:00:00Z"), at("2025-03-03T09:29:59Z")), 29);
        assert_eq!(minutes_between(at("2025-03-03T09:00:00Z"), at("2025-03-03T09:31:00Z")), 31);
        assert_eq!(minutes_between(at("2025-03-03T09:00:30Z"), at("2025-03-03T09:00:00Z")), -1);
    }

    #[test]
    fn threshold_honours_office_offset() {
        let policy = AttendancePolicy {
            utc_offset: FixedOffset::east_opt(330 * 60).unwrap(),
            ..AttendancePolicy::default()
        };
        // 09:00 IST is 03:30 UTC
        assert_eq!(threshold_for(d("2025-03-03"), &policy), at("2025-03-03T03:30:00Z"));

        // 23:00 UTC on the 2nd is already the 3rd in IST
        let late_evening = Utc.with_ymd_and_hms(2025, 3, 2, 23, 0, 0).unwrap();
        assert_eq!(local_date(late_evening, &policy), d("2025-03-03"));
        assert_eq!(format_local_time(Some(late_evening), &policy), "04:30");
    }

    #[test]
    fn parse_hh_mm_rejects_garbage() {
        assert_eq!(parse_hh_mm("09:15").unwrap(), NaiveTime::from_hms_opt(9, 15, 0).unwrap());
        assert!(parse_hh_mm("9am").is_err());
        assert!(parse_hh_mm("25:00").is_err());
    }
}
