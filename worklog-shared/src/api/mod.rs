use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::domain::{ApprovalStatus, AttendanceStatus, JobStatus, ReportKind};

pub mod endpoints;

pub const API_V1_PREFIX: &str = "/api/v1";

/// Root of every company-scoped route: `/api/v1/companies/{company_id}`.
pub fn tenant_scope(company_id: &str) -> String {
    format!(
        "{}/companies/{}",
        API_V1_PREFIX,
        percent_encoding::utf8_percent_encode(company_id, percent_encoding::NON_ALPHANUMERIC)
    )
}

// Auth
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthReq {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResp {
    pub token: String,
    pub user_id: String,
    pub company_id: String,
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VersionDto {
    pub version: String,
}

// Attendance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceLogDto {
    pub id: i32,
    pub user_id: String,
    pub date: NaiveDate,
    pub login_at: Option<DateTime<Utc>>,
    pub logout_at: Option<DateTime<Utc>>,
    pub status: AttendanceStatus,
    pub total_hours: Option<f64>,
    pub is_overtime: bool,
    pub overtime_hours: f64,
    pub points_earned: i32,
    pub report_submitted: bool,
    pub logout_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TodayDto {
    pub date: NaiveDate,
    pub log: Option<AttendanceLogDto>,
}

// Rewards and badges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeDto {
    pub name: String,
    pub description: String,
    pub icon: String,
    pub criteria: String,
    pub badge_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBadgeDto {
    pub name: String,
    pub icon: String,
    pub times_awarded: i32,
    pub first_awarded_at: DateTime<Utc>,
    pub last_awarded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RewardDto {
    pub user_id: String,
    pub total_points: i32,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_attendance_date: Option<NaiveDate>,
    pub monthly_score: i32,
    pub perfect_months: i32,
    pub badges: Vec<UserBadgeDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyReportDto {
    pub user_id: String,
    /// `YYYY-MM`
    pub month: String,
    pub working_days: u32,
    pub attended_days: u32,
    pub late_days: u32,
    pub absent_days: u32,
    pub total_hours: f64,
    pub points: i32,
}

// Work reports
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkReportReq {
    pub kind: ReportKind,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkReportDto {
    pub id: i32,
    pub user_id: String,
    pub date: NaiveDate,
    pub kind: ReportKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// Leave
#[derive(Debug, Serialize, Deserialize)]
pub struct LeaveReq {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub leave_type: String,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaveDto {
    pub id: i32,
    pub user_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub leave_type: String,
    pub reason: Option<String>,
    pub status: ApprovalStatus,
    pub decided_by: Option<String>,
}

// Holidays
#[derive(Debug, Serialize, Deserialize)]
pub struct HolidayReq {
    pub date: NaiveDate,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HolidayDto {
    pub id: i32,
    pub date: NaiveDate,
    pub name: String,
}

// Attendance corrections
#[derive(Debug, Serialize, Deserialize)]
pub struct CorrectionReq {
    pub date: NaiveDate,
    pub login_at: DateTime<Utc>,
    pub logout_at: Option<DateTime<Utc>>,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CorrectionDto {
    pub id: i32,
    pub log_id: i32,
    pub user_id: String,
    pub requested_login_at: DateTime<Utc>,
    pub requested_logout_at: Option<DateTime<Utc>>,
    pub reason: String,
    pub status: ApprovalStatus,
    pub decided_by: Option<String>,
}

// Users
#[derive(Debug, Serialize, Deserialize)]
pub struct UserDto {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub role: Role,
    pub active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUserReq {
    pub id: Option<String>,
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub password: String,
    pub role: Role,
}

// Admin dashboard
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsDto {
    pub date: NaiveDate,
    pub members: u32,
    pub present_today: u32,
    pub late_today: u32,
    pub absent_today: u32,
    pub on_leave_today: u32,
}

/// One job run as seen by a single company: `status` and `error` are that
/// company's own outcome.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobRunDto {
    pub id: i32,
    pub job: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
}
