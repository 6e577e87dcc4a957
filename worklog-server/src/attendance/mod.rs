//! Attendance scoring rules.
//!
//! Everything here is pure: callers pass in timestamps, statuses and company
//! work hours, and get back values to persist. The storage layer and the batch
//! jobs are the only places that apply these results.

pub mod badges;
pub mod monthly;
pub mod streak;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use worklog_shared::domain::AttendanceStatus;

/// Minutes after work start that still count as on time.
pub const GRACE_MINUTES: i64 = 15;
/// Upper bound (inclusive) for "slightly-late".
pub const SLIGHTLY_LATE_MINUTES: i64 = 30;
/// Upper bound (inclusive) for "late"; anything beyond is "very-late".
pub const LATE_MINUTES: i64 = 60;

/// Hours worked at which the flat bonus applies.
pub const LONG_DAY_HOURS: f64 = 9.0;
pub const LONG_DAY_BONUS: i32 = 5;

/// Open logs are force-closed this many minutes after the company's work end.
pub const AUTO_LOGOUT_AFTER_END_MINUTES: i64 = 60;
pub const AUTO_LOGOUT_REASON: &str = "Auto-logout: no logout recorded";

/// Points for one day: a base by status tier plus a flat bonus for long days.
pub fn calculate_daily_points(status: AttendanceStatus, total_hours: f64) -> i32 {
    let base = match status {
        AttendanceStatus::Present => 10,
        AttendanceStatus::SlightlyLate => 7,
        AttendanceStatus::Late => 5,
        AttendanceStatus::VeryLate => 3,
        AttendanceStatus::Absent => 0,
    };
    let bonus = if total_hours >= LONG_DAY_HOURS {
        LONG_DAY_BONUS
    } else {
        0
    };
    base + bonus
}

/// Lateness category for a login at local wall-clock time `login`.
pub fn classify_login(login: NaiveTime, work_start: NaiveTime) -> AttendanceStatus {
    let minutes_late = login.signed_duration_since(work_start).num_minutes();
    if minutes_late <= GRACE_MINUTES {
        AttendanceStatus::Present
    } else if minutes_late <= SLIGHTLY_LATE_MINUTES {
        AttendanceStatus::SlightlyLate
    } else if minutes_late <= LATE_MINUTES {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::VeryLate
    }
}

/// Length of the configured shift in hours. A shift ending at or before its
/// start wraps past midnight.
pub fn standard_hours(work_start: NaiveTime, work_end: NaiveTime) -> f64 {
    let mut span = work_end.signed_duration_since(work_start);
    if span <= Duration::zero() {
        span += Duration::days(1);
    }
    span.num_seconds() as f64 / 3600.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftSummary {
    pub total_hours: f64,
    pub is_overtime: bool,
    pub overtime_hours: f64,
    pub points: i32,
}

/// Hours, overtime and points for a closed shift.
pub fn summarize_shift(
    status: AttendanceStatus,
    login_at: NaiveDateTime,
    logout_at: NaiveDateTime,
    work_start: NaiveTime,
    work_end: NaiveTime,
) -> ShiftSummary {
    let worked = logout_at.signed_duration_since(login_at).num_seconds().max(0) as f64 / 3600.0;
    let total_hours = round2(worked);
    let standard = standard_hours(work_start, work_end);
    let overtime_hours = round2((total_hours - standard).max(0.0));
    ShiftSummary {
        total_hours,
        is_overtime: total_hours > standard,
        overtime_hours,
        points: calculate_daily_points(status, total_hours),
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Calendar date in the company's timezone at instant `now`.
pub fn local_date(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// Wall-clock time in the company's timezone at instant `at`.
pub fn local_time(tz: Tz, at: DateTime<Utc>) -> NaiveTime {
    at.with_timezone(&tz).time()
}

/// Converts a local wall-clock moment to UTC. Moments inside a DST gap are
/// read as UTC.
pub fn localize(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Instant after which open logs for `date` are force-closed.
pub fn auto_logout_cutoff(tz: Tz, date: NaiveDate, work_end: NaiveTime) -> DateTime<Utc> {
    localize(
        tz,
        date.and_time(work_end) + Duration::minutes(AUTO_LOGOUT_AFTER_END_MINUTES),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn daily_points_by_tier_with_long_day_bonus() {
        let on_time: AttendanceStatus = "on-time".parse().unwrap();
        assert_eq!(calculate_daily_points(on_time, 9.0), 15);
        assert_eq!(calculate_daily_points(AttendanceStatus::VeryLate, 4.0), 3);
        assert_eq!(calculate_daily_points(AttendanceStatus::Absent, 0.0), 0);
        assert_eq!(calculate_daily_points(AttendanceStatus::SlightlyLate, 8.99), 7);
        assert_eq!(calculate_daily_points(AttendanceStatus::Late, 10.0), 10);
    }

    #[test]
    fn login_lateness_categories() {
        let start = t(9, 0);
        assert_eq!(classify_login(t(8, 40), start), AttendanceStatus::Present);
        assert_eq!(classify_login(t(9, 10), start), AttendanceStatus::Present);
        assert_eq!(classify_login(t(9, 15), start), AttendanceStatus::Present);
        assert_eq!(classify_login(t(9, 20), start), AttendanceStatus::SlightlyLate);
        assert_eq!(classify_login(t(9, 45), start), AttendanceStatus::Late);
        assert_eq!(classify_login(t(10, 0), start), AttendanceStatus::Late);
        assert_eq!(classify_login(t(10, 30), start), AttendanceStatus::VeryLate);
    }

    #[test]
    fn shift_summary_counts_overtime_and_bonus() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        let s = summarize_shift(
            AttendanceStatus::Present,
            day.and_time(t(8, 30)),
            day.and_time(t(18, 0)),
            t(9, 0),
            t(18, 0),
        );
        assert_eq!(s.total_hours, 9.5);
        assert!(s.is_overtime);
        assert_eq!(s.overtime_hours, 0.5);
        assert_eq!(s.points, 15);
    }

    #[test]
    fn short_shift_has_no_overtime() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        let s = summarize_shift(
            AttendanceStatus::Late,
            day.and_time(t(10, 0)),
            day.and_time(t(14, 20)),
            t(9, 0),
            t(18, 0),
        );
        assert_eq!(s.total_hours, 4.33);
        assert!(!s.is_overtime);
        assert_eq!(s.overtime_hours, 0.0);
        assert_eq!(s.points, 5);
    }

    #[test]
    fn overnight_shift_length_wraps() {
        assert_eq!(standard_hours(t(22, 0), t(6, 0)), 8.0);
        assert_eq!(standard_hours(t(9, 0), t(18, 0)), 9.0);
    }

    #[test]
    fn cutoff_is_an_hour_after_local_work_end() {
        let tz: Tz = "Europe/Warsaw".parse().unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let cutoff = auto_logout_cutoff(tz, day, t(17, 0));
        // CET is UTC+1 in January
        assert_eq!(cutoff, Utc.with_ymd_and_hms(2025, 1, 15, 17, 0, 0).unwrap());
    }

    #[test]
    fn local_date_follows_company_timezone() {
        let tz: Tz = "Asia/Tokyo".parse().unwrap();
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 20, 0, 0).unwrap();
        assert_eq!(local_date(tz, now), NaiveDate::from_ymd_opt(2025, 1, 16).unwrap());
        assert_eq!(local_time(tz, now), t(5, 0));
    }
}
