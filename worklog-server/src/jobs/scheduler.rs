//! In-process job scheduler.
//!
//! Wakes on a fixed tick, works out which jobs are due and runs them one after
//! the other. Each job fires at most once per period; the bookkeeping lives in
//! memory only, so a restart inside a period can fire a job again.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{JobRequest, Jobs};
use crate::attendance::monthly::YearMonth;
use crate::server::SchedulerConfig;

/// When each job last fired.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Fired {
    pub auto_logout: Option<DateTime<Utc>>,
    pub daily: Option<NaiveDate>,
    pub weekly: Option<NaiveDate>,
    pub monthly: Option<YearMonth>,
}

#[derive(Debug, Clone)]
pub struct Schedule {
    tz: Tz,
    auto_logout_every: Duration,
    daily_at: NaiveTime,
    weekly_at: NaiveTime,
    monthly_at: NaiveTime,
}

impl Schedule {
    pub fn from_config(cfg: &SchedulerConfig) -> Self {
        Self {
            tz: cfg.timezone.parse().unwrap_or(chrono_tz::UTC),
            auto_logout_every: Duration::minutes(cfg.auto_logout_interval_minutes),
            daily_at: cfg.daily_at,
            weekly_at: cfg.weekly_at,
            monthly_at: cfg.monthly_at,
        }
    }

    /// Jobs due at `now`, in run order. Marks them in `fired`.
    ///
    /// Daily and weekly requests carry the scheduler-local date they fired
    /// on, so every company closes out that same calendar day.
    pub fn due(&self, fired: &mut Fired, now: DateTime<Utc>) -> Vec<JobRequest> {
        let local = now.with_timezone(&self.tz);
        let today = local.date_naive();
        let time = local.time();
        let mut out = Vec::new();

        let auto_due = fired
            .auto_logout
            .is_none_or(|last| now - last >= self.auto_logout_every);
        if auto_due {
            fired.auto_logout = Some(now);
            out.push(JobRequest::AutoLogout);
        }

        if time >= self.daily_at && fired.daily != Some(today) {
            fired.daily = Some(today);
            out.push(JobRequest::DailyProcessing(today));
        }

        if today.weekday() == Weekday::Mon
            && time >= self.weekly_at
            && fired.weekly != Some(today)
        {
            fired.weekly = Some(today);
            out.push(JobRequest::WeeklySummary(today));
        }

        let this_month = YearMonth::of(today);
        if today.day() == 1 && time >= self.monthly_at && fired.monthly != Some(this_month) {
            fired.monthly = Some(this_month);
            out.push(JobRequest::MonthlyRewards(this_month.previous()));
        }

        out
    }
}

pub struct Scheduler {
    jobs: Jobs,
    schedule: Schedule,
    tick: StdDuration,
}

impl Scheduler {
    pub fn new(jobs: Jobs, cfg: &SchedulerConfig) -> Self {
        Self {
            jobs,
            schedule: Schedule::from_config(cfg),
            tick: StdDuration::from_secs(cfg.tick_seconds.max(1)),
        }
    }

    /// Runs until `token` is cancelled.
    pub async fn run(self, token: CancellationToken) {
        info!(tick_secs = self.tick.as_secs(), "scheduler started");
        let mut fired = Fired::default();
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    let now = Utc::now();
                    for req in self.schedule.due(&mut fired, now) {
                        debug!(job = %req.kind(), "job due");
                        if let Err(e) = self.jobs.run(req, now).await {
                            error!(job = %req.kind(), error = %e, "job run not recorded");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn schedule() -> Schedule {
        Schedule::from_config(&SchedulerConfig::default())
    }

    fn at(month: u32, d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, month, d, h, m, 0).unwrap()
    }

    fn daily(month: u32, d: u32) -> JobRequest {
        JobRequest::DailyProcessing(NaiveDate::from_ymd_opt(2025, month, d).unwrap())
    }

    fn weekly(month: u32, d: u32) -> JobRequest {
        JobRequest::WeeklySummary(NaiveDate::from_ymd_opt(2025, month, d).unwrap())
    }

    #[test]
    fn auto_logout_repeats_on_its_interval() {
        let s = schedule();
        let mut fired = Fired::default();
        assert_eq!(s.due(&mut fired, at(6, 3, 12, 0)), vec![JobRequest::AutoLogout]);
        assert!(s.due(&mut fired, at(6, 3, 12, 10)).is_empty());
        assert_eq!(s.due(&mut fired, at(6, 3, 12, 15)), vec![JobRequest::AutoLogout]);
    }

    #[test]
    fn daily_fires_once_after_its_time() {
        let s = schedule();
        let mut fired = Fired::default();
        assert!(!s.due(&mut fired, at(6, 3, 23, 0)).contains(&daily(6, 3)));
        assert!(s.due(&mut fired, at(6, 3, 23, 30)).contains(&daily(6, 3)));
        assert!(
            !s.due(&mut fired, at(6, 3, 23, 59))
                .iter()
                .any(|r| matches!(r, JobRequest::DailyProcessing(_)))
        );
        assert!(s.due(&mut fired, at(6, 4, 23, 31)).contains(&daily(6, 4)));
    }

    #[test]
    fn weekly_only_on_mondays() {
        let s = schedule();
        let mut fired = Fired::default();
        // 2025-06-03 is a Tuesday
        assert!(
            !s.due(&mut fired, at(6, 3, 9, 0))
                .iter()
                .any(|r| matches!(r, JobRequest::WeeklySummary(_)))
        );
        assert!(s.due(&mut fired, at(6, 9, 8, 0)).contains(&weekly(6, 9)));
        assert!(!s.due(&mut fired, at(6, 9, 9, 0)).contains(&weekly(6, 9)));
    }

    #[test]
    fn monthly_evaluates_the_previous_month() {
        let s = schedule();
        let mut fired = Fired::default();
        let due = s.due(&mut fired, at(7, 1, 6, 0));
        let june = YearMonth::new(2025, 6).unwrap();
        assert!(due.contains(&JobRequest::MonthlyRewards(june)));
        assert!(
            !s.due(&mut fired, at(7, 1, 7, 0))
                .iter()
                .any(|r| matches!(r, JobRequest::MonthlyRewards(_)))
        );
    }

    #[test]
    fn wall_clock_follows_scheduler_timezone() {
        let cfg = SchedulerConfig {
            timezone: "Asia/Tokyo".into(),
            ..SchedulerConfig::default()
        };
        let s = Schedule::from_config(&cfg);
        let mut fired = Fired::default();
        // 14:30 UTC is 23:30 in Tokyo
        assert!(s.due(&mut fired, at(6, 3, 14, 30)).contains(&daily(6, 3)));
        // 15:30 UTC is already June 4 in Tokyo, before the daily time
        assert!(!s.due(&mut fired, at(6, 3, 15, 30)).contains(&daily(6, 4)));
    }
}
