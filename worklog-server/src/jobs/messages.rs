//! Email bodies sent by the batch jobs.

use chrono::NaiveDate;

use crate::attendance::monthly::MonthlyReport;
use crate::notify::EmailMessage;
use crate::storage::models::{AttendanceLog, Company, User};

use super::WeeklyDigest;

pub fn daily_summary(user: &User, company: &Company, log: &AttendanceLog, to: &str) -> EmailMessage {
    let mut body = format!(
        "Hi {},\n\nYour attendance at {} on {}:\n\n  status: {}\n  hours: {:.2}\n  points: {}\n",
        user.display_name,
        company.name,
        log.date,
        log.status,
        log.total_hours.unwrap_or(0.0),
        log.points_earned,
    );
    if log.is_overtime {
        body.push_str(&format!("  overtime: {:.2}h\n", log.overtime_hours));
    }
    if let Some(reason) = &log.logout_reason {
        body.push_str(&format!("  note: {reason}\n"));
    }
    EmailMessage {
        to: to.to_string(),
        subject: format!("Daily attendance summary for {}", log.date),
        body,
    }
}

pub fn weekly_digest(
    admin: &User,
    company: &Company,
    from: NaiveDate,
    to_date: NaiveDate,
    digest: &WeeklyDigest,
    to: &str,
) -> EmailMessage {
    let mut body = format!(
        "Hi {},\n\nWeek {} to {} at {}:\n\n  members: {}\n  attended days: {}\n  attendance rate: {:.1}%\n",
        admin.display_name,
        from,
        to_date,
        company.name,
        digest.members,
        digest.attended,
        digest.attendance_rate,
    );
    if !digest.top.is_empty() {
        body.push_str("\nTop performers:\n");
        for (rank, (name, points)) in digest.top.iter().enumerate() {
            body.push_str(&format!("  {}. {} ({} pts)\n", rank + 1, name, points));
        }
    }
    EmailMessage {
        to: to.to_string(),
        subject: format!("Weekly attendance summary: {}", company.name),
        body,
    }
}

pub fn monthly_achievement(
    user: &User,
    report: &MonthlyReport,
    monthly_score: i32,
    perfect: bool,
    reliable: bool,
    to: &str,
) -> EmailMessage {
    let mut body = format!(
        "Hi {},\n\nYour month {}:\n\n  working days: {}\n  attended: {}\n  late: {}\n  absent: {}\n  hours: {:.2}\n  monthly score: {}\n",
        user.display_name,
        report.month,
        report.working_days,
        report.attended_days,
        report.late_days,
        report.absent_days,
        report.total_hours,
        monthly_score,
    );
    if perfect {
        body.push_str("\nPerfect month! Badge awarded and 100 bonus points credited.\n");
    }
    if reliable {
        body.push_str("\nNo late or absent days: Reliable Performer badge awarded.\n");
    }
    EmailMessage {
        to: to.to_string(),
        subject: format!("Your attendance for {}", report.month),
        body,
    }
}
