use crate::storage::schema::{
    attendance_corrections, attendance_logs, attendance_rewards, badges, companies, holidays,
    job_run_companies, job_runs, leaves, sessions, user_badges, users, work_reports,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use diesel::prelude::*;
use worklog_shared::auth::Role;
use worklog_shared::domain::{ApprovalStatus, AttendanceStatus};

use super::StorageError;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = companies)]
pub struct Company {
    pub id: String,
    pub name: String,
    pub timezone: String,
    pub work_start_time: NaiveTime,
    pub work_end_time: NaiveTime,
    pub active: bool,
}

impl Company {
    /// Falls back to UTC when the stored zone name does not parse.
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }
}

#[derive(Insertable)]
#[diesel(table_name = companies)]
pub struct NewCompany<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub timezone: &'a str,
    pub work_start_time: NaiveTime,
    pub work_end_time: NaiveTime,
    pub active: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = users)]
#[diesel(belongs_to(Company, foreign_key = company_id))]
pub struct User {
    pub id: String,
    pub company_id: String,
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub role: String,
    pub active: bool,
}

impl User {
    pub fn role(&self) -> Role {
        Role::parse(&self.role).unwrap_or(Role::Employee)
    }
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub id: &'a str,
    pub company_id: &'a str,
    pub username: &'a str,
    pub display_name: &'a str,
    pub email: Option<&'a str>,
    pub password_hash: &'a str,
    pub role: &'a str,
    pub active: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = sessions)]
#[diesel(primary_key(jti))]
pub struct Session {
    pub jti: String,
    pub username: String,
    pub issued_at: NaiveDateTime,
    pub last_used_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession<'a> {
    pub jti: &'a str,
    pub username: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = attendance_logs)]
#[diesel(belongs_to(User, foreign_key = user_id))]
pub struct AttendanceLog {
    pub id: i32,
    pub user_id: String,
    pub company_id: String,
    pub date: NaiveDate,
    pub login_at: Option<NaiveDateTime>,
    pub logout_at: Option<NaiveDateTime>,
    pub status: String,
    pub total_hours: Option<f64>,
    pub is_overtime: bool,
    pub overtime_hours: f64,
    pub points_earned: i32,
    pub report_submitted: bool,
    pub logout_reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl AttendanceLog {
    pub fn attendance_status(&self) -> Result<AttendanceStatus, StorageError> {
        self.status
            .parse()
            .map_err(|e: worklog_shared::domain::UnknownVariant| {
                StorageError::InvalidInput(e.to_string())
            })
    }
}

#[derive(Insertable)]
#[diesel(table_name = attendance_logs)]
pub struct NewAttendanceLog<'a> {
    pub user_id: &'a str,
    pub company_id: &'a str,
    pub date: NaiveDate,
    pub login_at: Option<NaiveDateTime>,
    pub status: &'a str,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = attendance_rewards)]
pub struct AttendanceReward {
    pub user_id: String,
    pub company_id: String,
    pub total_points: i32,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_attendance_date: Option<NaiveDate>,
    pub monthly_score: i32,
    pub perfect_months: i32,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = attendance_rewards)]
pub struct NewAttendanceReward<'a> {
    pub user_id: &'a str,
    pub company_id: &'a str,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = badges)]
pub struct Badge {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub criteria: String,
    pub badge_type: String,
}

#[derive(Insertable)]
#[diesel(table_name = badges)]
pub struct NewBadge<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub icon: &'a str,
    pub criteria: &'a str,
    pub badge_type: &'a str,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = user_badges)]
pub struct UserBadge {
    pub user_id: String,
    pub badge_id: i32,
    pub times_awarded: i32,
    pub first_awarded_at: NaiveDateTime,
    pub last_awarded_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = user_badges)]
pub struct NewUserBadge<'a> {
    pub user_id: &'a str,
    pub badge_id: i32,
    pub times_awarded: i32,
    pub first_awarded_at: NaiveDateTime,
    pub last_awarded_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = holidays)]
pub struct Holiday {
    pub id: i32,
    pub company_id: String,
    pub date: NaiveDate,
    pub name: String,
}

#[derive(Insertable)]
#[diesel(table_name = holidays)]
pub struct NewHoliday<'a> {
    pub company_id: &'a str,
    pub date: NaiveDate,
    pub name: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = leaves)]
pub struct Leave {
    pub id: i32,
    pub user_id: String,
    pub company_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub leave_type: String,
    pub reason: Option<String>,
    pub status: String,
    pub decided_by: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Leave {
    pub fn approval_status(&self) -> ApprovalStatus {
        self.status.parse().unwrap_or(ApprovalStatus::Pending)
    }
}

#[derive(Insertable)]
#[diesel(table_name = leaves)]
pub struct NewLeave<'a> {
    pub user_id: &'a str,
    pub company_id: &'a str,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub leave_type: &'a str,
    pub reason: Option<&'a str>,
    pub status: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = attendance_corrections)]
pub struct AttendanceCorrection {
    pub id: i32,
    pub log_id: i32,
    pub user_id: String,
    pub company_id: String,
    pub requested_login_at: NaiveDateTime,
    pub requested_logout_at: Option<NaiveDateTime>,
    pub reason: String,
    pub status: String,
    pub decided_by: Option<String>,
    pub created_at: NaiveDateTime,
    pub decided_at: Option<NaiveDateTime>,
}

impl AttendanceCorrection {
    pub fn approval_status(&self) -> ApprovalStatus {
        self.status.parse().unwrap_or(ApprovalStatus::Pending)
    }
}

#[derive(Insertable)]
#[diesel(table_name = attendance_corrections)]
pub struct NewAttendanceCorrection<'a> {
    pub log_id: i32,
    pub user_id: &'a str,
    pub company_id: &'a str,
    pub requested_login_at: NaiveDateTime,
    pub requested_logout_at: Option<NaiveDateTime>,
    pub reason: &'a str,
    pub status: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = work_reports)]
pub struct WorkReport {
    pub id: i32,
    pub user_id: String,
    pub company_id: String,
    pub date: NaiveDate,
    pub kind: String,
    pub content: String,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = work_reports)]
pub struct NewWorkReport<'a> {
    pub user_id: &'a str,
    pub company_id: &'a str,
    pub date: NaiveDate,
    pub kind: &'a str,
    pub content: &'a str,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = job_runs)]
pub struct JobRun {
    pub id: i32,
    pub job: String,
    pub status: String,
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub companies_processed: i32,
    pub companies_failed: i32,
    pub detail: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = job_runs)]
pub struct NewJobRun<'a> {
    pub job: &'a str,
    pub status: &'a str,
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub companies_processed: i32,
    pub companies_failed: i32,
    pub detail: Option<&'a str>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Associations)]
#[diesel(table_name = job_run_companies, belongs_to(JobRun))]
pub struct JobRunCompany {
    pub id: i32,
    pub job_run_id: i32,
    pub company_id: String,
    pub status: String,
    pub error: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = job_run_companies)]
pub struct NewJobRunCompany<'a> {
    pub job_run_id: i32,
    pub company_id: &'a str,
    pub status: &'a str,
    pub error: Option<&'a str>,
}
