use std::sync::Arc;

use chrono::{Datelike, TimeZone, Weekday};
use diesel::prelude::*;
use worklog_shared::auth::Role;

use super::*;
use crate::notify::RecordingMailer;
use crate::storage::models::NewAttendanceLog;
use crate::storage::schema;
use crate::storage::test_support::*;

fn at(month: u32, d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, month, d, h, m, 0).unwrap()
}

fn date(month: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, month, d).unwrap()
}

fn jobs(db: &TestDb, mailer: &Arc<RecordingMailer>) -> Jobs {
    Jobs::new(db.store.clone(), mailer.clone())
}

async fn acme(db: &TestDb) -> Company {
    db.store.get_company("acme").await.unwrap().unwrap()
}

#[tokio::test]
async fn auto_logout_waits_for_cutoff_then_closes_open_logs() {
    let db = seeded().await;
    let mailer = Arc::new(RecordingMailer::new());
    let jobs = jobs(&db, &mailer);
    let company = acme(&db).await;
    let day = at(6, 2, 0, 0).date_naive();
    db.store.record_login("ada", &company, at(6, 2, 9, 0)).await.unwrap();
    db.store.record_login("bob", &company, at(6, 2, 9, 5)).await.unwrap();
    db.store.record_logout("bob", &company, at(6, 2, 17, 0)).await.unwrap();

    // work ends 18:00, cutoff is 19:00
    let early = jobs.auto_logout(at(6, 2, 18, 30)).await.unwrap();
    assert_eq!(early.status, JobStatus::Completed);
    assert!(db.store.get_log("ada", day).await.unwrap().unwrap().logout_at.is_none());

    let late = jobs.auto_logout(at(6, 2, 19, 1)).await.unwrap();
    assert_eq!(late.companies_processed, 1);
    let ada = db.store.get_log("ada", day).await.unwrap().unwrap();
    assert_eq!(ada.logout_reason.as_deref(), Some(attendance::AUTO_LOGOUT_REASON));
    assert_eq!(ada.total_hours, Some(10.02));
    assert_eq!(ada.points_earned, 15);

    let bob = db.store.get_log("bob", day).await.unwrap().unwrap();
    assert!(bob.logout_reason.is_none());
    assert_eq!(bob.total_hours, Some(7.92));

    assert_eq!(db.store.list_job_runs(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn daily_processing_marks_absences_skips_leave_and_credits_points() {
    let db = seeded().await;
    let mailer = Arc::new(RecordingMailer::new());
    let jobs = jobs(&db, &mailer);
    let company = acme(&db).await;
    let day = at(6, 2, 0, 0).date_naive();

    let leave = db
        .store
        .request_leave("boss", "acme", day, day, "vacation", None)
        .await
        .unwrap();
    db.store.decide_leave("acme", leave.id, "boss", true).await.unwrap();
    db.store.record_login("ada", &company, at(6, 2, 9, 0)).await.unwrap();
    db.store.record_logout("ada", &company, at(6, 2, 18, 0)).await.unwrap();

    let run = jobs.daily_processing(date(6, 2), at(6, 2, 23, 30)).await.unwrap();
    assert_eq!(run.status, JobStatus::Completed);

    assert_eq!(db.store.get_log("bob", day).await.unwrap().unwrap().status, "absent");
    assert!(db.store.get_log("boss", day).await.unwrap().is_none());

    let ada = db.store.get_reward("ada", "acme").await.unwrap();
    assert_eq!(ada.total_points, 15);
    assert_eq!(ada.monthly_score, 15);
    assert_eq!(ada.current_streak, 1);
    let bob = db.store.get_reward("bob", "acme").await.unwrap();
    assert_eq!(bob.current_streak, 0);
    assert_eq!(bob.last_attendance_date, Some(day));
    let boss = db.store.get_reward("boss", "acme").await.unwrap();
    assert!(boss.last_attendance_date.is_none());

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ada@example.com");
    assert!(sent[0].body.contains("points: 15"));
}

#[tokio::test]
async fn no_absences_on_a_holiday() {
    let db = seeded().await;
    let mailer = Arc::new(RecordingMailer::new());
    let day = at(6, 2, 0, 0).date_naive();
    db.store.add_holiday("acme", day, "Founders day").await.unwrap();

    jobs(&db, &mailer).daily_processing(date(6, 2), at(6, 2, 23, 30)).await.unwrap();
    let logs = db.store.list_company_logs("acme", day, day).await.unwrap();
    assert!(logs.is_empty());
}

#[tokio::test]
async fn running_daily_twice_double_counts_points() {
    let db = seeded().await;
    let mailer = Arc::new(RecordingMailer::new());
    let jobs = jobs(&db, &mailer);
    let company = acme(&db).await;
    db.store.record_login("ada", &company, at(6, 2, 9, 40)).await.unwrap();
    db.store.record_logout("ada", &company, at(6, 2, 17, 0)).await.unwrap();

    jobs.daily_processing(date(6, 2), at(6, 2, 23, 30)).await.unwrap();
    jobs.daily_processing(date(6, 2), at(6, 2, 23, 45)).await.unwrap();

    let ada = db.store.get_reward("ada", "acme").await.unwrap();
    assert_eq!(ada.total_points, 10);
    // the streak is guarded against same-day replays, points are not
    assert_eq!(ada.current_streak, 1);
}

#[tokio::test]
async fn one_failing_company_does_not_stop_the_others() {
    let db = seeded().await;
    db.store
        .seed_from_config(&[company("beta")], &[user("zed", "beta", Role::Employee)], &[])
        .await
        .unwrap();
    let day = at(6, 2, 0, 0).date_naive();
    let stamp = at(6, 2, 9, 0).naive_utc();
    db.store
        .with_conn(move |conn| {
            diesel::insert_into(schema::attendance_logs::table)
                .values(&NewAttendanceLog {
                    user_id: "zed",
                    company_id: "beta",
                    date: day,
                    login_at: Some(stamp),
                    status: "tardy",
                    created_at: stamp,
                    updated_at: stamp,
                })
                .execute(conn)?;
            Ok(())
        })
        .await
        .unwrap();

    let mailer = Arc::new(RecordingMailer::new());
    let run = jobs(&db, &mailer).daily_processing(date(6, 2), at(6, 2, 23, 30)).await.unwrap();
    assert_eq!(run.status, JobStatus::Failed);
    assert_eq!(run.companies_processed, 2);
    assert_eq!(run.companies_failed, 1);
    assert!(run.detail.as_deref().unwrap_or_default().starts_with("beta:"));

    // acme was still processed
    assert_eq!(db.store.get_log("ada", day).await.unwrap().unwrap().status, "absent");

    let stored = db.store.list_job_runs(1).await.unwrap();
    assert_eq!(stored[0].status, "failed");
    assert_eq!(stored[0].companies_failed, 1);

    // each tenant only sees its own outcome
    let acme_runs = db.store.list_company_job_runs("acme", 10).await.unwrap();
    assert_eq!(acme_runs.len(), 1);
    assert_eq!(acme_runs[0].1.status, "completed");
    assert!(acme_runs[0].1.error.is_none());
    let beta_runs = db.store.list_company_job_runs("beta", 10).await.unwrap();
    assert_eq!(beta_runs[0].1.status, "failed");
    assert!(!beta_runs[0].1.error.as_deref().unwrap_or_default().contains("acme"));
}

#[tokio::test]
async fn mail_failures_do_not_fail_the_job() {
    let db = seeded().await;
    let mailer = Arc::new(RecordingMailer::failing());
    let run = jobs(&db, &mailer).weekly_summary(date(6, 9), at(6, 9, 8, 0)).await.unwrap();
    assert_eq!(run.status, JobStatus::Completed);
    assert_eq!(mailer.sent().len(), 1);
    assert_eq!(mailer.sent()[0].to, "boss@example.com");
}

#[tokio::test]
async fn weekly_summary_reports_rate_and_top_performers() {
    let db = seeded().await;
    let company = acme(&db).await;
    for d in 2..=6 {
        db.store.record_login("ada", &company, at(6, d, 9, 0)).await.unwrap();
        db.store.record_logout("ada", &company, at(6, d, 18, 0)).await.unwrap();
    }
    db.store.record_login("bob", &company, at(6, 3, 10, 30)).await.unwrap();
    db.store.record_logout("bob", &company, at(6, 3, 16, 0)).await.unwrap();

    let mailer = Arc::new(RecordingMailer::new());
    jobs(&db, &mailer).weekly_summary(date(6, 9), at(6, 9, 8, 0)).await.unwrap();
    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    // 6 attended days over 3 members * 7 days
    assert!(sent[0].body.contains("attendance rate: 28.6%"), "{}", sent[0].body);
    assert!(sent[0].body.contains("1. ADA (75 pts)"), "{}", sent[0].body);
    assert!(sent[0].body.contains("2. BOB (3 pts)"));
    assert!(!sent[0].body.contains("1. ada"));
}

#[test]
fn weekly_digest_with_no_members_has_zero_rate() {
    let digest = WeeklyDigest::build(&[], &HashMap::new());
    assert_eq!(digest.attendance_rate, 0.0);
    assert!(digest.top.is_empty());
    let (from, to) = weekly_window(NaiveDate::from_ymd_opt(2025, 6, 9).unwrap());
    assert_eq!(from, NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
    assert_eq!(to, NaiveDate::from_ymd_opt(2025, 6, 8).unwrap());
}

#[tokio::test]
async fn monthly_rewards_award_badges_and_reset_score() {
    let db = seeded().await;
    let company = acme(&db).await;
    let june = YearMonth::new(2025, 6).unwrap();
    for day in june.days() {
        if matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            continue;
        }
        let d = day.day();
        db.store.record_login("ada", &company, at(6, d, 8, 55)).await.unwrap();
        db.store.record_logout("ada", &company, at(6, d, 17, 0)).await.unwrap();
    }
    db.store.record_login("bob", &company, at(6, 4, 9, 50)).await.unwrap();
    db.store.credit_points("ada", "acme", 42, at(6, 30, 23, 0)).await.unwrap();

    let mailer = Arc::new(RecordingMailer::new());
    let jobs = jobs(&db, &mailer);
    let run = jobs.monthly_rewards(june, at(7, 1, 6, 0)).await.unwrap();
    assert_eq!(run.status, JobStatus::Completed);

    let ada = db.store.get_reward("ada", "acme").await.unwrap();
    assert_eq!(ada.perfect_months, 1);
    assert_eq!(ada.total_points, 42 + 100);
    assert_eq!(ada.monthly_score, 0);
    let names: Vec<String> = db
        .store
        .list_user_badges("ada")
        .await
        .unwrap()
        .into_iter()
        .map(|(_, b)| b.name)
        .collect();
    assert!(names.contains(&badges::PERFECT_MONTH.to_string()));
    assert!(names.contains(&badges::RELIABLE_PERFORMER.to_string()));
    assert!(db.store.list_user_badges("bob").await.unwrap().is_empty());

    let ada_mail = mailer
        .sent()
        .into_iter()
        .find(|m| m.to == "ada@example.com")
        .unwrap();
    assert!(ada_mail.body.contains("monthly score: 42"));
    assert!(ada_mail.body.contains("Perfect month"));

    // a second run for the same month awards again
    jobs.monthly_rewards(june, at(7, 1, 7, 0)).await.unwrap();
    let ada = db.store.get_reward("ada", "acme").await.unwrap();
    assert_eq!(ada.perfect_months, 2);
    assert_eq!(ada.total_points, 42 + 200);
    let held = db.store.list_user_badges("ada").await.unwrap();
    let perfect = held.iter().find(|(_, b)| b.name == badges::PERFECT_MONTH).unwrap();
    assert_eq!(perfect.0.times_awarded, 2);
}

#[tokio::test]
async fn scheduled_daily_runs_build_streak_for_a_company_ahead_of_utc() {
    let db = seeded().await;
    let mut waw = company("waw");
    waw.timezone = "Europe/Warsaw".into();
    db.store
        .seed_from_config(&[waw], &[user("wu", "waw", Role::Employee)], &[])
        .await
        .unwrap();
    let waw = db.store.get_company("waw").await.unwrap().unwrap();
    let mailer = Arc::new(RecordingMailer::new());
    let jobs = jobs(&db, &mailer);
    let schedule = scheduler::Schedule::from_config(&crate::server::SchedulerConfig::default());
    let mut fired = scheduler::Fired::default();

    // Mon 2 to Fri 6 June, 09:00 to 18:00 Warsaw time
    for (n, d) in (2..=6).enumerate() {
        db.store.record_login("wu", &waw, at(6, d, 7, 0)).await.unwrap();
        db.store.record_logout("wu", &waw, at(6, d, 16, 0)).await.unwrap();

        // 23:30 UTC is already the next day in Warsaw
        let now = at(6, d, 23, 30);
        let due = schedule.due(&mut fired, now);
        assert!(due.contains(&JobRequest::DailyProcessing(date(6, d))));
        for req in due {
            let run = jobs.run(req, now).await.unwrap();
            assert_eq!(run.status, JobStatus::Completed);
        }

        let reward = db.store.get_reward("wu", "waw").await.unwrap();
        assert_eq!(reward.current_streak, n as i32 + 1);
        assert_eq!(reward.last_attendance_date, Some(date(6, d)));
        assert_eq!(
            db.store.get_log("wu", date(6, d)).await.unwrap().unwrap().status,
            "present"
        );
        assert!(db.store.get_log("wu", date(6, d + 1)).await.unwrap().is_none());
    }

    let reward = db.store.get_reward("wu", "waw").await.unwrap();
    assert_eq!(reward.longest_streak, 5);
    assert_eq!(reward.monthly_score, 5 * 15);
    assert_eq!(reward.total_points, 5 * 15 + attendance::streak::BONUS_POINTS);
}

#[tokio::test]
async fn daily_runs_over_a_month_leave_weekends_alone() {
    let db = seeded().await;
    let company = acme(&db).await;
    let mailer = Arc::new(RecordingMailer::new());
    let jobs = jobs(&db, &mailer);
    let june = YearMonth::new(2025, 6).unwrap();
    for day in june.days() {
        let d = day.day();
        if !monthly::is_weekend(day) {
            db.store.record_login("ada", &company, at(6, d, 8, 55)).await.unwrap();
            db.store.record_logout("ada", &company, at(6, d, 17, 0)).await.unwrap();
        }
        jobs.daily_processing(day, at(6, d, 23, 30)).await.unwrap();
    }

    let bob_logs = db
        .store
        .list_user_logs("bob", june.first_day(), june.last_day())
        .await
        .unwrap();
    assert_eq!(bob_logs.len(), 21);
    assert!(bob_logs.iter().all(|l| !monthly::is_weekend(l.date)));

    let report = db.store.monthly_report("ada", "acme", june).await.unwrap();
    assert_eq!(report.working_days, 21);
    assert_eq!(report.attended_days, 21);
    assert_eq!(report.absent_days, 0);

    jobs.monthly_rewards(june, at(7, 1, 6, 0)).await.unwrap();
    let ada = db.store.get_reward("ada", "acme").await.unwrap();
    assert_eq!(ada.perfect_months, 1);
    let names: Vec<String> = db
        .store
        .list_user_badges("ada")
        .await
        .unwrap()
        .into_iter()
        .map(|(_, b)| b.name)
        .collect();
    assert!(names.contains(&badges::RELIABLE_PERFORMER.to_string()));
    assert_eq!(db.store.get_reward("bob", "acme").await.unwrap().perfect_months, 0);
}
