use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Weekday};
use worklog_shared::api::MonthlyReportDto;
use worklog_shared::domain::AttendanceStatus;

/// Points granted together with a perfect-month badge.
pub const PERFECT_MONTH_POINTS: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next()
            .first_day()
            .pred_opt()
            .unwrap_or_else(|| self.first_day())
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let last = self.last_day();
        self.first_day().iter_days().take_while(move |d| *d <= last)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (y, m) = s
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got {s:?}"))?;
        let year = y.parse::<i32>().map_err(|e| format!("bad year {y:?}: {e}"))?;
        let month = m.parse::<u32>().map_err(|e| format!("bad month {m:?}: {e}"))?;
        YearMonth::new(year, month).ok_or_else(|| format!("month out of range: {s}"))
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn is_working_day(date: NaiveDate, holidays: &HashSet<NaiveDate>) -> bool {
    !is_weekend(date) && !holidays.contains(&date)
}

/// Mon-Fri dates of the month that are not company holidays.
pub fn working_days(month: YearMonth, holidays: &HashSet<NaiveDate>) -> u32 {
    month
        .days()
        .filter(|d| is_working_day(*d, holidays))
        .count() as u32
}

/// One day's contribution to the monthly report.
#[derive(Debug, Clone, Copy)]
pub struct DayRecord {
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub total_hours: Option<f64>,
    pub points: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyReport {
    pub user_id: String,
    pub month: YearMonth,
    pub working_days: u32,
    pub attended_days: u32,
    pub late_days: u32,
    pub absent_days: u32,
    pub total_hours: f64,
    pub points: i32,
}

impl MonthlyReport {
    /// Absent records only count on working days; a weekend or holiday
    /// without attendance is not an absence.
    pub fn build(
        user_id: &str,
        month: YearMonth,
        holidays: &HashSet<NaiveDate>,
        days: impl IntoIterator<Item = DayRecord>,
    ) -> Self {
        let mut report = MonthlyReport {
            user_id: user_id.to_string(),
            month,
            working_days: working_days(month, holidays),
            attended_days: 0,
            late_days: 0,
            absent_days: 0,
            total_hours: 0.0,
            points: 0,
        };
        for day in days {
            if day.status.is_attended() {
                report.attended_days += 1;
            } else if is_working_day(day.date, holidays) {
                report.absent_days += 1;
            }
            if day.status.is_late() {
                report.late_days += 1;
            }
            report.total_hours += day.total_hours.unwrap_or(0.0);
            report.points += day.points;
        }
        report.total_hours = (report.total_hours * 100.0).round() / 100.0;
        report
    }

    /// No absences and at least one attended day per working day.
    pub fn is_perfect_month(&self) -> bool {
        self.working_days > 0 && self.absent_days == 0 && self.attended_days >= self.working_days
    }

    /// No late and no absent days, with some attendance on record.
    pub fn is_reliable(&self) -> bool {
        self.attended_days > 0 && self.late_days == 0 && self.absent_days == 0
    }

    pub fn to_dto(&self) -> MonthlyReportDto {
        MonthlyReportDto {
            user_id: self.user_id.clone(),
            month: self.month.to_string(),
            working_days: self.working_days,
            attended_days: self.attended_days,
            late_days: self.late_days,
            absent_days: self.absent_days,
            total_hours: self.total_hours,
            points: self.points,
        }
    }
}
