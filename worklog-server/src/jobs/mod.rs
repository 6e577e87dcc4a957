//! Scheduled batch jobs.
//!
//! Every job walks the active companies and runs one unit of work per company.
//! A company that errors is logged and counted, the remaining companies still
//! run, and a single `job_runs` row records the invocation together with one
//! outcome row per company.

mod messages;
pub mod scheduler;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{Instrument, debug, error, info, info_span, warn};
use worklog_shared::domain::{JobKind, JobStatus};

use crate::attendance::{
    self, badges,
    monthly::{self, YearMonth},
};
use crate::notify::{EmailMessage, Mailer};
use crate::storage::models::{AttendanceLog, Company};
use crate::storage::{CompanyOutcome, JobRunRecord, StorageError, Store};

pub const WEEKLY_WINDOW_DAYS: i64 = 7;
pub const TOP_PERFORMERS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// What a job is asked to do.
///
/// Daily processing carries the calendar date to close out and the weekly
/// summary the date whose preceding seven days are reported. Both dates are
/// applied as-is to every company, whatever its timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRequest {
    AutoLogout,
    DailyProcessing(NaiveDate),
    WeeklySummary(NaiveDate),
    MonthlyRewards(YearMonth),
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            JobRequest::AutoLogout => JobKind::AutoLogout,
            JobRequest::DailyProcessing(_) => JobKind::DailyProcessing,
            JobRequest::WeeklySummary(_) => JobKind::WeeklySummary,
            JobRequest::MonthlyRewards(_) => JobKind::MonthlyRewards,
        }
    }
}

/// Attendance stats for the weekly email.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyDigest {
    pub members: usize,
    pub attended: usize,
    /// Percentage, 0..=100.
    pub attendance_rate: f64,
    /// `(display name, points)`, best first.
    pub top: Vec<(String, i32)>,
}

impl WeeklyDigest {
    /// `members` maps user id to display name. Logs of anyone else are ignored.
    pub fn build(logs: &[AttendanceLog], members: &HashMap<String, String>) -> Self {
        let mut attended = 0;
        let mut points: HashMap<&str, i32> = HashMap::new();
        for log in logs.iter().filter(|l| members.contains_key(&l.user_id)) {
            let is_attended = log
                .status
                .parse::<worklog_shared::domain::AttendanceStatus>()
                .map(|s| s.is_attended())
                .unwrap_or(false);
            if is_attended {
                attended += 1;
            }
            *points.entry(log.user_id.as_str()).or_default() += log.points_earned;
        }
        let attendance_rate = if members.is_empty() {
            0.0
        } else {
            let possible = members.len() as f64 * WEEKLY_WINDOW_DAYS as f64;
            (attended as f64 / possible * 1000.0).round() / 10.0
        };
        let mut top: Vec<(String, i32)> = points
            .into_iter()
            .filter_map(|(u, p)| members.get(u).map(|name| (name.clone(), p)))
            .collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(TOP_PERFORMERS);
        Self {
            members: members.len(),
            attended,
            attendance_rate,
            top,
        }
    }
}

#[derive(Clone)]
pub struct Jobs {
    store: Store,
    mailer: Arc<dyn Mailer>,
}

impl Jobs {
    pub fn new(store: Store, mailer: Arc<dyn Mailer>) -> Self {
        Self { store, mailer }
    }

    pub async fn auto_logout(&self, now: DateTime<Utc>) -> Result<JobRunRecord, JobError> {
        self.run(JobRequest::AutoLogout, now).await
    }

    pub async fn daily_processing(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<JobRunRecord, JobError> {
        self.run(JobRequest::DailyProcessing(date), now).await
    }

    pub async fn weekly_summary(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<JobRunRecord, JobError> {
        self.run(JobRequest::WeeklySummary(date), now).await
    }

    pub async fn monthly_rewards(
        &self,
        month: YearMonth,
        now: DateTime<Utc>,
    ) -> Result<JobRunRecord, JobError> {
        self.run(JobRequest::MonthlyRewards(month), now).await
    }

    /// Runs `req` over every active company and records the outcome. Only a
    /// failure to write the `job_runs` row is returned as an error.
    pub async fn run(&self, req: JobRequest, now: DateTime<Utc>) -> Result<JobRunRecord, JobError> {
        let span = info_span!("job", job = %req.kind());
        async move {
            let clock = Instant::now();
            let mut processed = 0;
            let mut failures: Vec<String> = Vec::new();
            let mut outcomes: Vec<CompanyOutcome> = Vec::new();

            match self.store.list_active_companies().await {
                Ok(companies) => {
                    for company in companies {
                        processed += 1;
                        match self.run_for_company(req, &company, now).await {
                            Ok(items) => {
                                debug!(company_id = %company.id, items, "company done");
                                outcomes.push(CompanyOutcome {
                                    company_id: company.id,
                                    status: JobStatus::Completed,
                                    error: None,
                                });
                            }
                            Err(e) => {
                                error!(company_id = %company.id, error = %e, "company failed");
                                failures.push(format!("{}: {}", company.id, e));
                                outcomes.push(CompanyOutcome {
                                    company_id: company.id,
                                    status: JobStatus::Failed,
                                    error: Some(e.to_string()),
                                });
                            }
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "listing companies failed");
                    failures.push(format!("listing companies: {e}"));
                }
            }

            let failed = failures.len();
            let status = if failed == 0 {
                JobStatus::Completed
            } else {
                JobStatus::Failed
            };
            let elapsed = Duration::from_std(clock.elapsed()).unwrap_or_else(|_| Duration::zero());
            let record = JobRunRecord {
                job: req.kind(),
                status,
                started_at: now,
                finished_at: now + elapsed,
                companies_processed: processed,
                companies_failed: failed as i32,
                detail: (!failures.is_empty()).then(|| failures.join("; ")),
                outcomes,
            };
            self.store.record_job_run(record.clone()).await?;
            info!(
                status = status.as_str(),
                processed,
                failed,
                elapsed_ms = elapsed.num_milliseconds(),
                "job finished"
            );
            Ok(record)
        }
        .instrument(span)
        .await
    }

    async fn run_for_company(
        &self,
        req: JobRequest,
        company: &Company,
        now: DateTime<Utc>,
    ) -> Result<usize, JobError> {
        match req {
            JobRequest::AutoLogout => self.auto_logout_company(company, now).await,
            JobRequest::DailyProcessing(date) => self.daily_company(company, date, now).await,
            JobRequest::WeeklySummary(date) => self.weekly_company(company, date).await,
            JobRequest::MonthlyRewards(month) => self.monthly_company(company, month, now).await,
        }
    }

    /// Closes today's open logs once the cutoff has passed.
    async fn auto_logout_company(
        &self,
        company: &Company,
        now: DateTime<Utc>,
    ) -> Result<usize, JobError> {
        let tz = company.tz();
        let today = attendance::local_date(tz, now);
        let cutoff = attendance::auto_logout_cutoff(tz, today, company.work_end_time);
        if now <= cutoff {
            return Ok(0);
        }
        let open = self.store.list_open_logs(&company.id, today).await?;
        for log in &open {
            self.store
                .force_logout(log.id, company, now, attendance::AUTO_LOGOUT_REASON)
                .await?;
            info!(company_id = %company.id, user_id = %log.user_id, "auto-logout");
        }
        Ok(open.len())
    }

    /// Absence marking, then streaks, then points and daily emails, all for
    /// the calendar day `today`. Weekends and holidays mark no absences.
    async fn daily_company(
        &self,
        company: &Company,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<usize, JobError> {
        let members = self.store.list_active_members(&company.id).await?;

        if monthly::is_weekend(today) {
            debug!(company_id = %company.id, date = %today, "weekend, no absences marked");
        } else if self.store.is_holiday(&company.id, today).await? {
            debug!(company_id = %company.id, date = %today, "holiday, no absences marked");
        } else {
            let on_leave = self.store.users_on_leave(&company.id, today).await?;
            for m in members.iter().filter(|m| !on_leave.contains(&m.id)) {
                if self.store.mark_absent(&m.id, &company.id, today, now).await? {
                    debug!(user_id = %m.id, date = %today, "marked absent");
                }
            }
        }

        for m in &members {
            let status = match self.store.get_log(&m.id, today).await? {
                Some(log) => Some(log.attendance_status()?),
                None => None,
            };
            self.store
                .apply_streak(&m.id, &company.id, today, status, now)
                .await?;
        }

        let by_id: HashMap<&str, _> = members.iter().map(|m| (m.id.as_str(), m)).collect();
        let logs = self
            .store
            .list_company_logs(&company.id, today, today)
            .await?;
        let mut credited = 0;
        for mut log in logs.into_iter().filter(|l| l.logout_at.is_some()) {
            let points =
                attendance::calculate_daily_points(log.attendance_status()?, log.total_hours.unwrap_or(0.0));
            self.store.set_log_points(log.id, points, now).await?;
            self.store
                .credit_points(&log.user_id, &company.id, points, now)
                .await?;
            log.points_earned = points;
            credited += 1;
            if let Some(user) = by_id.get(log.user_id.as_str())
                && let Some(to) = user.email.as_deref()
            {
                self.deliver(messages::daily_summary(user, company, &log, to))
                    .await;
            }
        }
        Ok(credited)
    }

    /// Mails the seven days before `today` to the company admins.
    async fn weekly_company(
        &self,
        company: &Company,
        today: NaiveDate,
    ) -> Result<usize, JobError> {
        let (from, to) = weekly_window(today);
        let members: HashMap<String, String> = self
            .store
            .list_active_members(&company.id)
            .await?
            .into_iter()
            .map(|u| (u.id, u.display_name))
            .collect();
        let logs = self.store.list_company_logs(&company.id, from, to).await?;
        let digest = WeeklyDigest::build(&logs, &members);
        let admins = self.store.list_company_admins(&company.id).await?;
        let mut sent = 0;
        for admin in &admins {
            if let Some(addr) = admin.email.as_deref() {
                self.deliver(messages::weekly_digest(admin, company, from, to, &digest, addr))
                    .await;
                sent += 1;
            }
        }
        debug!(
            company_id = %company.id,
            rate = digest.attendance_rate,
            admins = sent,
            "weekly digest"
        );
        Ok(sent)
    }

    /// Perfect-month and reliable-performer awards, achievement email, then
    /// the monthly score reset.
    async fn monthly_company(
        &self,
        company: &Company,
        month: YearMonth,
        now: DateTime<Utc>,
    ) -> Result<usize, JobError> {
        let members = self.store.list_active_members(&company.id).await?;
        let mut awarded = 0;
        for m in &members {
            let report = self.store.monthly_report(&m.id, &company.id, month).await?;
            let perfect = report.is_perfect_month();
            let reliable = report.is_reliable();
            if perfect {
                self.store.award_perfect_month(&m.id, &company.id, now).await?;
                awarded += 1;
            }
            if reliable {
                self.store
                    .assign_badge(&m.id, badges::RELIABLE_PERFORMER, now)
                    .await?;
                awarded += 1;
            }
            let reward = self.store.get_reward(&m.id, &company.id).await?;
            if let Some(to) = m.email.as_deref() {
                self.deliver(messages::monthly_achievement(
                    m,
                    &report,
                    reward.monthly_score,
                    perfect,
                    reliable,
                    to,
                ))
                .await;
            }
            self.store.reset_monthly_score(&m.id, &company.id, now).await?;
        }
        info!(company_id = %company.id, month = %month, awarded, "monthly rewards");
        Ok(awarded)
    }

    async fn deliver(&self, msg: EmailMessage) {
        let to = msg.to.clone();
        if let Err(e) = self.mailer.send(msg).await {
            warn!(to = %to, error = %e, "email not sent");
        }
    }
}

/// `[today - 7, today)` as inclusive bounds.
pub fn weekly_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (
        today - Duration::days(WEEKLY_WINDOW_DAYS),
        today - Duration::days(1),
    )
}

#[cfg(test)]
mod tests;
