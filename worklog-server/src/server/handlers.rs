use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};
use bcrypt::verify;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use worklog_shared::api;

use super::auth::{self, AuthCtx};
use super::{AppError, AppState};
use crate::attendance::{self, monthly::YearMonth};
use crate::storage::NewUserInput;
use crate::storage::models::{
    AttendanceCorrection, AttendanceLog, Company, Holiday, JobRun, JobRunCompany, Leave, User,
    WorkReport,
};

/// Default lookback for attendance history.
const HISTORY_DAYS: i64 = 30;
const JOB_RUNS_LIMIT: i64 = 50;

pub(super) async fn health() -> &'static str {
    "ok"
}

pub(super) async fn api_version() -> Json<api::VersionDto> {
    Json(api::VersionDto {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub(super) async fn api_auth_login(
    State(state): State<AppState>,
    Json(body): Json<api::AuthReq>,
) -> Result<Json<api::AuthResp>, AppError> {
    let user = state
        .store
        .find_user_by_username(&body.username)
        .await?
        .ok_or_else(|| {
            tracing::warn!(username=%body.username, "login: unknown username");
            AppError::unauthorized()
        })?;
    if !user.active {
        tracing::warn!(username=%body.username, "login: user deactivated");
        return Err(AppError::unauthorized());
    }
    if !verify(&body.password, &user.password_hash).map_err(|e| {
        tracing::error!(username=%body.username, error=%e, "login: bcrypt verify failed");
        AppError::internal(e)
    })? {
        tracing::warn!(username=%body.username, "login: invalid password");
        return Err(AppError::unauthorized());
    }
    let token = auth::issue_jwt_for_user(&state, &user).await?;
    Ok(Json(api::AuthResp {
        token,
        user_id: user.id.clone(),
        company_id: user.company_id.clone(),
        role: user.role(),
    }))
}

// Attendance

pub(super) async fn api_attendance_login(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(company_id): Path<String>,
) -> Result<Json<api::AttendanceLogDto>, AppError> {
    let company = load_company(&state, &company_id).await?;
    let out = state
        .store
        .record_login(&auth.claims.user_id, &company, Utc::now())
        .await?;
    if !out.created {
        tracing::debug!(user_id = %auth.claims.user_id, "login: already logged in today");
    }
    Ok(Json(log_dto(out.log)?))
}

pub(super) async fn api_attendance_logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(company_id): Path<String>,
) -> Result<Json<api::AttendanceLogDto>, AppError> {
    let company = load_company(&state, &company_id).await?;
    let log = state
        .store
        .record_logout(&auth.claims.user_id, &company, Utc::now())
        .await?;
    Ok(Json(log_dto(log)?))
}

pub(super) async fn api_attendance_today(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(company_id): Path<String>,
) -> Result<Json<api::TodayDto>, AppError> {
    let company = load_company(&state, &company_id).await?;
    let today = attendance::local_date(company.tz(), Utc::now());
    let log = state.store.get_log(&auth.claims.user_id, today).await?;
    Ok(Json(api::TodayDto {
        date: today,
        log: log.map(log_dto).transpose()?,
    }))
}

#[derive(Deserialize)]
pub(super) struct RangeOpts {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

pub(super) async fn api_user_attendance(
    State(state): State<AppState>,
    Path((company_id, user_id)): Path<(String, String)>,
    Query(opts): Query<RangeOpts>,
) -> Result<Json<Vec<api::AttendanceLogDto>>, AppError> {
    let company = load_company(&state, &company_id).await?;
    load_member(&state, &company_id, &user_id).await?;
    let to = opts
        .to
        .unwrap_or_else(|| attendance::local_date(company.tz(), Utc::now()));
    let from = opts.from.unwrap_or(to - Duration::days(HISTORY_DAYS));
    if from > to {
        return Err(AppError::bad_request("from must not be after to"));
    }
    let logs = state.store.list_user_logs(&user_id, from, to).await?;
    let items = logs
        .into_iter()
        .map(log_dto)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(items))
}

pub(super) async fn api_user_rewards(
    State(state): State<AppState>,
    Path((company_id, user_id)): Path<(String, String)>,
) -> Result<Json<api::RewardDto>, AppError> {
    load_member(&state, &company_id, &user_id).await?;
    let reward = state.store.get_reward(&user_id, &company_id).await?;
    let badges = state
        .store
        .list_user_badges(&user_id)
        .await?
        .into_iter()
        .map(|(held, badge)| api::UserBadgeDto {
            name: badge.name,
            icon: badge.icon,
            times_awarded: held.times_awarded,
            first_awarded_at: utc(held.first_awarded_at),
            last_awarded_at: utc(held.last_awarded_at),
        })
        .collect();
    Ok(Json(api::RewardDto {
        user_id: reward.user_id,
        total_points: reward.total_points,
        current_streak: reward.current_streak,
        longest_streak: reward.longest_streak,
        last_attendance_date: reward.last_attendance_date,
        monthly_score: reward.monthly_score,
        perfect_months: reward.perfect_months,
        badges,
    }))
}

#[derive(Deserialize)]
pub(super) struct MonthOpts {
    month: Option<String>,
}

pub(super) async fn api_user_monthly_report(
    State(state): State<AppState>,
    Path((company_id, user_id)): Path<(String, String)>,
    Query(opts): Query<MonthOpts>,
) -> Result<Json<api::MonthlyReportDto>, AppError> {
    let company = load_company(&state, &company_id).await?;
    load_member(&state, &company_id, &user_id).await?;
    let month = match opts.month.as_deref() {
        Some(m) => m.parse::<YearMonth>().map_err(AppError::bad_request)?,
        None => YearMonth::of(attendance::local_date(company.tz(), Utc::now())),
    };
    let report = state
        .store
        .monthly_report(&user_id, &company_id, month)
        .await?;
    Ok(Json(report.to_dto()))
}

pub(super) async fn api_submit_report(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(company_id): Path<String>,
    Json(body): Json<api::WorkReportReq>,
) -> Result<Json<api::WorkReportDto>, AppError> {
    let company = load_company(&state, &company_id).await?;
    let now = Utc::now();
    let today = attendance::local_date(company.tz(), now);
    let report = state
        .store
        .submit_report(
            &auth.claims.user_id,
            &company_id,
            today,
            body.kind,
            &body.content,
            now,
        )
        .await?;
    Ok(Json(report_dto(report)?))
}

// Leave

pub(super) async fn api_request_leave(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(company_id): Path<String>,
    Json(body): Json<api::LeaveReq>,
) -> Result<Json<api::LeaveDto>, AppError> {
    let leave = state
        .store
        .request_leave(
            &auth.claims.user_id,
            &company_id,
            body.start_date,
            body.end_date,
            &body.leave_type,
            body.reason.as_deref(),
        )
        .await?;
    Ok(Json(leave_dto(leave)))
}

#[derive(Deserialize)]
pub(super) struct LeaveFilter {
    user_id: Option<String>,
}

pub(super) async fn api_list_leaves(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    Query(filter): Query<LeaveFilter>,
) -> Result<Json<Vec<api::LeaveDto>>, AppError> {
    let rows = state
        .store
        .list_leaves(&company_id, filter.user_id.as_deref())
        .await?;
    Ok(Json(rows.into_iter().map(leave_dto).collect()))
}

pub(super) async fn api_approve_leave(
    state: State<AppState>,
    auth: Extension<AuthCtx>,
    Path((company_id, id)): Path<(String, i32)>,
) -> Result<Json<api::LeaveDto>, AppError> {
    decide_leave(state, auth, company_id, id, true).await
}

pub(super) async fn api_reject_leave(
    state: State<AppState>,
    auth: Extension<AuthCtx>,
    Path((company_id, id)): Path<(String, i32)>,
) -> Result<Json<api::LeaveDto>, AppError> {
    decide_leave(state, auth, company_id, id, false).await
}

async fn decide_leave(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    company_id: String,
    id: i32,
    approve: bool,
) -> Result<Json<api::LeaveDto>, AppError> {
    let leave = state
        .store
        .decide_leave(&company_id, id, &auth.claims.user_id, approve)
        .await?;
    tracing::info!(leave_id = id, status = %leave.status, by = %auth.claims.sub, "leave decided");
    Ok(Json(leave_dto(leave)))
}

// Holidays

pub(super) async fn api_list_holidays(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
) -> Result<Json<Vec<api::HolidayDto>>, AppError> {
    let rows = state.store.list_holidays(&company_id).await?;
    Ok(Json(rows.into_iter().map(holiday_dto).collect()))
}

pub(super) async fn api_add_holiday(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    Json(body): Json<api::HolidayReq>,
) -> Result<Json<api::HolidayDto>, AppError> {
    let h = state
        .store
        .add_holiday(&company_id, body.date, &body.name)
        .await?;
    Ok(Json(holiday_dto(h)))
}

// Corrections

pub(super) async fn api_request_correction(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(company_id): Path<String>,
    Json(body): Json<api::CorrectionReq>,
) -> Result<Json<api::CorrectionDto>, AppError> {
    let c = state
        .store
        .request_correction(
            &auth.claims.user_id,
            &company_id,
            body.date,
            body.login_at,
            body.logout_at,
            &body.reason,
        )
        .await?;
    Ok(Json(correction_dto(c)))
}

#[derive(Deserialize)]
pub(super) struct PendingOpts {
    pending: Option<bool>,
}

pub(super) async fn api_list_corrections(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    Query(opts): Query<PendingOpts>,
) -> Result<Json<Vec<api::CorrectionDto>>, AppError> {
    let rows = state
        .store
        .list_corrections(&company_id, opts.pending.unwrap_or(true))
        .await?;
    Ok(Json(rows.into_iter().map(correction_dto).collect()))
}

pub(super) async fn api_approve_correction(
    state: State<AppState>,
    auth: Extension<AuthCtx>,
    Path((company_id, id)): Path<(String, i32)>,
) -> Result<Json<api::CorrectionDto>, AppError> {
    decide_correction(state, auth, company_id, id, true).await
}

pub(super) async fn api_reject_correction(
    state: State<AppState>,
    auth: Extension<AuthCtx>,
    Path((company_id, id)): Path<(String, i32)>,
) -> Result<Json<api::CorrectionDto>, AppError> {
    decide_correction(state, auth, company_id, id, false).await
}

async fn decide_correction(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    company_id: String,
    id: i32,
    approve: bool,
) -> Result<Json<api::CorrectionDto>, AppError> {
    let company = load_company(&state, &company_id).await?;
    let c = state
        .store
        .decide_correction(&company, id, &auth.claims.user_id, approve, Utc::now())
        .await?;
    tracing::info!(correction_id = id, status = %c.status, by = %auth.claims.sub, "correction decided");
    Ok(Json(correction_dto(c)))
}

// Users

pub(super) async fn api_list_users(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
) -> Result<Json<Vec<api::UserDto>>, AppError> {
    let rows = state.store.list_users(&company_id).await?;
    Ok(Json(rows.into_iter().map(user_dto).collect()))
}

pub(super) async fn api_create_user(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    Json(body): Json<api::CreateUserReq>,
) -> Result<Json<api::UserDto>, AppError> {
    load_company(&state, &company_id).await?;
    if body.password.len() < 8 {
        return Err(AppError::bad_request("password must be at least 8 characters"));
    }
    let password = body.password;
    let password_hash =
        tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
            .await
            .map_err(AppError::internal)?
            .map_err(AppError::internal)?;
    let input = NewUserInput {
        id: body.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        company_id,
        username: body.username,
        display_name: body.display_name,
        email: body.email,
        password_hash,
        role: body.role,
    };
    let user = state.store.create_user(input).await?;
    tracing::info!(user_id = %user.id, role = %user.role, "user created");
    Ok(Json(user_dto(user)))
}

pub(super) async fn api_deactivate_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((company_id, user_id)): Path<(String, String)>,
) -> Result<Json<api::UserDto>, AppError> {
    if user_id == auth.claims.user_id {
        return Err(AppError::bad_request("cannot deactivate yourself"));
    }
    if !state.store.set_user_active(&company_id, &user_id, false).await? {
        return Err(AppError::not_found(format!("user not found: {user_id}")));
    }
    let user = load_member(&state, &company_id, &user_id).await?;
    Ok(Json(user_dto(user)))
}

// Dashboard

pub(super) async fn api_stats(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
) -> Result<Json<api::StatsDto>, AppError> {
    let company = load_company(&state, &company_id).await?;
    let today = attendance::local_date(company.tz(), Utc::now());
    let members = state.store.list_active_members(&company_id).await?;
    let logs = state
        .store
        .list_company_logs(&company_id, today, today)
        .await?;
    let on_leave = state.store.users_on_leave(&company_id, today).await?;

    let mut stats = api::StatsDto {
        date: today,
        members: members.len() as u32,
        present_today: 0,
        late_today: 0,
        absent_today: 0,
        on_leave_today: on_leave.len() as u32,
    };
    for log in &logs {
        let status = log.attendance_status()?;
        if status.is_attended() {
            stats.present_today += 1;
        } else {
            stats.absent_today += 1;
        }
        if status.is_late() {
            stats.late_today += 1;
        }
    }
    Ok(Json(stats))
}

pub(super) async fn api_list_jobs(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
) -> Result<Json<Vec<api::JobRunDto>>, AppError> {
    let rows = state
        .store
        .list_company_job_runs(&company_id, JOB_RUNS_LIMIT)
        .await?;
    let items = rows
        .into_iter()
        .map(job_run_dto)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(items))
}

pub(super) async fn api_list_badges(
    State(state): State<AppState>,
) -> Result<Json<Vec<api::BadgeDto>>, AppError> {
    let rows = state.store.list_badges().await?;
    let items = rows
        .into_iter()
        .map(|b| api::BadgeDto {
            name: b.name,
            description: b.description,
            icon: b.icon,
            criteria: b.criteria,
            badge_type: b.badge_type,
        })
        .collect();
    Ok(Json(items))
}

// Helpers

async fn load_company(state: &AppState, company_id: &str) -> Result<Company, AppError> {
    match state.store.get_company(company_id).await? {
        Some(c) if c.active => Ok(c),
        _ => Err(AppError::not_found(format!("company not found: {company_id}"))),
    }
}

/// The user, provided they belong to `company_id`.
async fn load_member(state: &AppState, company_id: &str, user_id: &str) -> Result<User, AppError> {
    match state.store.get_user(user_id).await? {
        Some(u) if u.company_id == company_id => Ok(u),
        _ => Err(AppError::not_found(format!("user not found: {user_id}"))),
    }
}

fn utc(naive: NaiveDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)
}

fn log_dto(log: AttendanceLog) -> Result<api::AttendanceLogDto, AppError> {
    Ok(api::AttendanceLogDto {
        status: log.attendance_status()?,
        id: log.id,
        user_id: log.user_id,
        date: log.date,
        login_at: log.login_at.map(utc),
        logout_at: log.logout_at.map(utc),
        total_hours: log.total_hours,
        is_overtime: log.is_overtime,
        overtime_hours: log.overtime_hours,
        points_earned: log.points_earned,
        report_submitted: log.report_submitted,
        logout_reason: log.logout_reason,
    })
}

fn report_dto(r: WorkReport) -> Result<api::WorkReportDto, AppError> {
    Ok(api::WorkReportDto {
        kind: r.kind.parse().map_err(AppError::internal)?,
        id: r.id,
        user_id: r.user_id,
        date: r.date,
        content: r.content,
        created_at: utc(r.created_at),
    })
}

fn leave_dto(l: Leave) -> api::LeaveDto {
    api::LeaveDto {
        status: l.approval_status(),
        id: l.id,
        user_id: l.user_id,
        start_date: l.start_date,
        end_date: l.end_date,
        leave_type: l.leave_type,
        reason: l.reason,
        decided_by: l.decided_by,
    }
}

fn holiday_dto(h: Holiday) -> api::HolidayDto {
    api::HolidayDto {
        id: h.id,
        date: h.date,
        name: h.name,
    }
}

fn correction_dto(c: AttendanceCorrection) -> api::CorrectionDto {
    api::CorrectionDto {
        status: c.approval_status(),
        id: c.id,
        log_id: c.log_id,
        user_id: c.user_id,
        requested_login_at: utc(c.requested_login_at),
        requested_logout_at: c.requested_logout_at.map(utc),
        reason: c.reason,
        decided_by: c.decided_by,
    }
}

fn user_dto(u: User) -> api::UserDto {
    api::UserDto {
        role: u.role(),
        id: u.id,
        username: u.username,
        display_name: u.display_name,
        email: u.email,
        active: u.active,
    }
}

fn job_run_dto((run, outcome): (JobRun, JobRunCompany)) -> Result<api::JobRunDto, AppError> {
    Ok(api::JobRunDto {
        status: outcome.status.parse().map_err(AppError::internal)?,
        id: run.id,
        job: run.job,
        started_at: utc(run.started_at),
        finished_at: utc(run.finished_at),
        error: outcome.error,
    })
}
