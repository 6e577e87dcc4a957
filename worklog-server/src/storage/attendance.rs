use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::{debug, trace};
use worklog_shared::domain::{ApprovalStatus, AttendanceStatus, ReportKind};

use super::models::{
    AttendanceCorrection, AttendanceLog, Company, NewAttendanceCorrection, NewAttendanceLog,
    NewWorkReport, WorkReport,
};
use super::{StorageError, Store, schema};
use crate::attendance::{
    self,
    monthly::{DayRecord, MonthlyReport, YearMonth},
};

/// What a login call did to today's log.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub log: AttendanceLog,
    /// `false` when the user had already logged in today.
    pub created: bool,
}

impl Store {
    /// Records the first login of the company-local day. Later logins on the
    /// same day return the existing row untouched; an absence row is turned
    /// into an attended one.
    pub async fn record_login(
        &self,
        user: &str,
        company: &Company,
        now: DateTime<Utc>,
    ) -> Result<LoginOutcome, StorageError> {
        use schema::attendance_logs::dsl as al;
        let tz = company.tz();
        let today = attendance::local_date(tz, now);
        let status =
            attendance::classify_login(attendance::local_time(tz, now), company.work_start_time);
        let uid = user.to_string();
        let cid = company.id.clone();
        let at = now.naive_utc();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| -> Result<LoginOutcome, StorageError> {
                let existing = al::attendance_logs
                    .filter(al::user_id.eq(&uid))
                    .filter(al::date.eq(today))
                    .first::<AttendanceLog>(conn)
                    .optional()?;
                match existing {
                    Some(log) if log.login_at.is_some() => Ok(LoginOutcome {
                        log,
                        created: false,
                    }),
                    Some(log) => {
                        let log = diesel::update(al::attendance_logs.filter(al::id.eq(log.id)))
                            .set((
                                al::login_at.eq(Some(at)),
                                al::status.eq(status.as_str()),
                                al::updated_at.eq(at),
                            ))
                            .returning(AttendanceLog::as_returning())
                            .get_result(conn)?;
                        debug!(user_id = %uid, date = %today, status = %status, "login replaced absence");
                        Ok(LoginOutcome { log, created: true })
                    }
                    None => {
                        let row = NewAttendanceLog {
                            user_id: &uid,
                            company_id: &cid,
                            date: today,
                            login_at: Some(at),
                            status: status.as_str(),
                            created_at: at,
                            updated_at: at,
                        };
                        let log = diesel::insert_into(al::attendance_logs)
                            .values(&row)
                            .returning(AttendanceLog::as_returning())
                            .get_result(conn)?;
                        debug!(user_id = %uid, date = %today, status = %status, "login recorded");
                        Ok(LoginOutcome { log, created: true })
                    }
                }
            })
        })
        .await
    }

    /// Manual logout for today's log.
    pub async fn record_logout(
        &self,
        user: &str,
        company: &Company,
        now: DateTime<Utc>,
    ) -> Result<AttendanceLog, StorageError> {
        use schema::attendance_logs::dsl as al;
        let today = attendance::local_date(company.tz(), now);
        let uid = user.to_string();
        let company = company.clone();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| {
                let log = al::attendance_logs
                    .filter(al::user_id.eq(&uid))
                    .filter(al::date.eq(today))
                    .first::<AttendanceLog>(conn)
                    .optional()?
                    .ok_or_else(|| StorageError::InvalidInput("not logged in today".into()))?;
                apply_logout(conn, &log, &company, now.naive_utc(), None)
            })
        })
        .await
    }

    /// Closes one open log at `at`, going through the same path as a manual
    /// logout. Used by the auto-logout sweep.
    pub async fn force_logout(
        &self,
        log_id: i32,
        company: &Company,
        at: DateTime<Utc>,
        reason: &str,
    ) -> Result<AttendanceLog, StorageError> {
        use schema::attendance_logs::dsl as al;
        let company = company.clone();
        let reason = reason.to_string();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| {
                let log = al::attendance_logs
                    .filter(al::id.eq(log_id))
                    .first::<AttendanceLog>(conn)
                    .optional()?
                    .ok_or_else(|| StorageError::NotFound(format!("attendance log {log_id}")))?;
                apply_logout(conn, &log, &company, at.naive_utc(), Some(&reason))
            })
        })
        .await
    }

    /// Logs for `date` with a login and no logout.
    pub async fn list_open_logs(
        &self,
        company: &str,
        on: NaiveDate,
    ) -> Result<Vec<AttendanceLog>, StorageError> {
        use schema::attendance_logs::dsl as al;
        let cid = company.to_string();
        self.with_conn(move |conn| {
            Ok(al::attendance_logs
                .filter(al::company_id.eq(&cid))
                .filter(al::date.eq(on))
                .filter(al::login_at.is_not_null())
                .filter(al::logout_at.is_null())
                .order(al::id.asc())
                .load::<AttendanceLog>(conn)?)
        })
        .await
    }

    pub async fn get_log(
        &self,
        user: &str,
        on: NaiveDate,
    ) -> Result<Option<AttendanceLog>, StorageError> {
        use schema::attendance_logs::dsl as al;
        let uid = user.to_string();
        self.with_conn(move |conn| {
            Ok(al::attendance_logs
                .filter(al::user_id.eq(&uid))
                .filter(al::date.eq(on))
                .first::<AttendanceLog>(conn)
                .optional()?)
        })
        .await
    }

    /// Logs of one user between `from` and `to`, both inclusive.
    pub async fn list_user_logs(
        &self,
        user: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceLog>, StorageError> {
        use schema::attendance_logs::dsl as al;
        let uid = user.to_string();
        self.with_conn(move |conn| {
            Ok(al::attendance_logs
                .filter(al::user_id.eq(&uid))
                .filter(al::date.ge(from))
                .filter(al::date.le(to))
                .order(al::date.asc())
                .load::<AttendanceLog>(conn)?)
        })
        .await
    }

    /// Logs of a company between `from` and `to`, both inclusive.
    pub async fn list_company_logs(
        &self,
        company: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceLog>, StorageError> {
        use schema::attendance_logs::dsl as al;
        let cid = company.to_string();
        self.with_conn(move |conn| {
            Ok(al::attendance_logs
                .filter(al::company_id.eq(&cid))
                .filter(al::date.ge(from))
                .filter(al::date.le(to))
                .order((al::date.asc(), al::user_id.asc()))
                .load::<AttendanceLog>(conn)?)
        })
        .await
    }

    /// Inserts an absence row. Returns `false` when the user already has a log
    /// for that date.
    pub async fn mark_absent(
        &self,
        user: &str,
        company: &str,
        on: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        use schema::attendance_logs::dsl as al;
        let uid = user.to_string();
        let cid = company.to_string();
        let at = now.naive_utc();
        self.with_conn(move |conn| {
            let row = NewAttendanceLog {
                user_id: &uid,
                company_id: &cid,
                date: on,
                login_at: None,
                status: AttendanceStatus::Absent.as_str(),
                created_at: at,
                updated_at: at,
            };
            let inserted = diesel::insert_into(al::attendance_logs)
                .values(&row)
                .on_conflict((al::user_id, al::date))
                .do_nothing()
                .execute(conn)?;
            trace!(user_id = %uid, date = %on, inserted, "mark_absent");
            Ok(inserted > 0)
        })
        .await
    }

    pub async fn set_log_points(
        &self,
        log_id: i32,
        points: i32,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        use schema::attendance_logs::dsl as al;
        self.with_conn(move |conn| {
            diesel::update(al::attendance_logs.filter(al::id.eq(log_id)))
                .set((al::points_earned.eq(points), al::updated_at.eq(now.naive_utc())))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Stores a morning or evening report. The evening report flags the day's
    /// log as reported.
    pub async fn submit_report(
        &self,
        user: &str,
        company: &str,
        on: NaiveDate,
        kind: ReportKind,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<WorkReport, StorageError> {
        use schema::attendance_logs::dsl as al;
        use schema::work_reports::dsl as wr;
        if content.trim().is_empty() {
            return Err(StorageError::InvalidInput("report content is empty".into()));
        }
        let uid = user.to_string();
        let cid = company.to_string();
        let body = content.to_string();
        let at = now.naive_utc();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| {
                let row = NewWorkReport {
                    user_id: &uid,
                    company_id: &cid,
                    date: on,
                    kind: kind.as_str(),
                    content: &body,
                    created_at: at,
                };
                let report = diesel::insert_into(wr::work_reports)
                    .values(&row)
                    .returning(WorkReport::as_returning())
                    .get_result(conn)
                    .map_err(|e| match e {
                        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                            StorageError::Conflict(format!(
                                "{} report already submitted for {on}",
                                kind.as_str()
                            ))
                        }
                        other => StorageError::Database(other),
                    })?;
                if kind == ReportKind::Evening {
                    diesel::update(
                        al::attendance_logs
                            .filter(al::user_id.eq(&uid))
                            .filter(al::date.eq(on)),
                    )
                    .set((al::report_submitted.eq(true), al::updated_at.eq(at)))
                    .execute(conn)?;
                }
                Ok(report)
            })
        })
        .await
    }

    pub async fn request_correction(
        &self,
        user: &str,
        company: &str,
        on: NaiveDate,
        login_at: DateTime<Utc>,
        logout_at: Option<DateTime<Utc>>,
        reason: &str,
    ) -> Result<AttendanceCorrection, StorageError> {
        use schema::attendance_corrections::dsl as ac;
        use schema::attendance_logs::dsl as al;
        use schema::companies::dsl as c;
        if let Some(out) = logout_at
            && out <= login_at
        {
            return Err(StorageError::InvalidInput(
                "logout must be after login".into(),
            ));
        }
        if reason.trim().is_empty() {
            return Err(StorageError::InvalidInput("reason is required".into()));
        }
        let uid = user.to_string();
        let cid = company.to_string();
        let why = reason.to_string();
        self.with_conn(move |conn| {
            let company = c::companies
                .filter(c::id.eq(&cid))
                .first::<Company>(conn)
                .optional()?
                .ok_or_else(|| StorageError::NotFound(format!("company {cid}")))?;
            let login_day = attendance::local_date(company.tz(), login_at);
            if login_day != on {
                return Err(StorageError::InvalidInput(format!(
                    "login time falls on {login_day}, not {on}"
                )));
            }
            let log = al::attendance_logs
                .filter(al::user_id.eq(&uid))
                .filter(al::date.eq(on))
                .first::<AttendanceLog>(conn)
                .optional()?
                .ok_or_else(|| StorageError::NotFound(format!("no attendance log on {on}")))?;
            let row = NewAttendanceCorrection {
                log_id: log.id,
                user_id: &uid,
                company_id: &cid,
                requested_login_at: login_at.naive_utc(),
                requested_logout_at: logout_at.map(|t| t.naive_utc()),
                reason: &why,
                status: ApprovalStatus::Pending.as_str(),
            };
            Ok(diesel::insert_into(ac::attendance_corrections)
                .values(&row)
                .returning(AttendanceCorrection::as_returning())
                .get_result(conn)?)
        })
        .await
    }

    pub async fn list_corrections(
        &self,
        company: &str,
        only_pending: bool,
    ) -> Result<Vec<AttendanceCorrection>, StorageError> {
        use schema::attendance_corrections::dsl as ac;
        let cid = company.to_string();
        self.with_conn(move |conn| {
            let mut q = ac::attendance_corrections
                .filter(ac::company_id.eq(cid))
                .into_boxed();
            if only_pending {
                q = q.filter(ac::status.eq(ApprovalStatus::Pending.as_str()));
            }
            Ok(q.order(ac::created_at.desc())
                .load::<AttendanceCorrection>(conn)?)
        })
        .await
    }

    /// Approves or rejects a pending correction. Approval rewrites the log's
    /// login, reclassifies it and recomputes hours and points when a logout is
    /// known.
    pub async fn decide_correction(
        &self,
        company: &Company,
        correction_id: i32,
        approver: &str,
        approve: bool,
        now: DateTime<Utc>,
    ) -> Result<AttendanceCorrection, StorageError> {
        use schema::attendance_corrections::dsl as ac;
        use schema::attendance_logs::dsl as al;
        let company = company.clone();
        let approver = approver.to_string();
        let at = now.naive_utc();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| {
                let correction = ac::attendance_corrections
                    .filter(ac::id.eq(correction_id))
                    .filter(ac::company_id.eq(&company.id))
                    .first::<AttendanceCorrection>(conn)
                    .optional()?
                    .ok_or_else(|| {
                        StorageError::NotFound(format!("correction {correction_id}"))
                    })?;
                if correction.approval_status() != ApprovalStatus::Pending {
                    return Err(StorageError::Conflict(format!(
                        "correction {correction_id} already {}",
                        correction.status
                    )));
                }

                if approve {
                    let log = al::attendance_logs
                        .filter(al::id.eq(correction.log_id))
                        .first::<AttendanceLog>(conn)?;
                    let login_at = correction.requested_login_at;
                    let login_utc = DateTime::<Utc>::from_naive_utc_and_offset(login_at, Utc);
                    let status = attendance::classify_login(
                        attendance::local_time(company.tz(), login_utc),
                        company.work_start_time,
                    );
                    diesel::update(al::attendance_logs.filter(al::id.eq(log.id)))
                        .set((
                            al::login_at.eq(Some(login_at)),
                            al::status.eq(status.as_str()),
                            al::updated_at.eq(at),
                        ))
                        .execute(conn)?;
                    if let Some(logout_at) = correction.requested_logout_at.or(log.logout_at) {
                        let summary = attendance::summarize_shift(
                            status,
                            login_at,
                            logout_at,
                            company.work_start_time,
                            company.work_end_time,
                        );
                        let reason = if correction.requested_logout_at.is_some() {
                            None
                        } else {
                            log.logout_reason.clone()
                        };
                        diesel::update(al::attendance_logs.filter(al::id.eq(log.id)))
                            .set((
                                al::logout_at.eq(Some(logout_at)),
                                al::total_hours.eq(Some(summary.total_hours)),
                                al::is_overtime.eq(summary.is_overtime),
                                al::overtime_hours.eq(summary.overtime_hours),
                                al::points_earned.eq(summary.points),
                                al::logout_reason.eq(reason),
                            ))
                            .execute(conn)?;
                    }
                    debug!(correction_id, log_id = log.id, status = %status, "correction applied");
                }

                let decided = if approve {
                    ApprovalStatus::Approved
                } else {
                    ApprovalStatus::Rejected
                };
                Ok(diesel::update(ac::attendance_corrections.filter(ac::id.eq(correction_id)))
                    .set((
                        ac::status.eq(decided.as_str()),
                        ac::decided_by.eq(Some(approver.as_str())),
                        ac::decided_at.eq(Some(at)),
                    ))
                    .returning(AttendanceCorrection::as_returning())
                    .get_result(conn)?)
            })
        })
        .await
    }

    /// Aggregates one user's logs for a calendar month.
    pub async fn monthly_report(
        &self,
        user: &str,
        company: &str,
        month: YearMonth,
    ) -> Result<MonthlyReport, StorageError> {
        let logs = self
            .list_user_logs(user, month.first_day(), month.last_day())
            .await?;
        let holidays = self
            .holiday_dates(company, month.first_day(), month.last_day())
            .await?;
        let mut days = Vec::with_capacity(logs.len());
        for log in &logs {
            days.push(DayRecord {
                date: log.date,
                status: log.attendance_status()?,
                total_hours: log.total_hours,
                points: log.points_earned,
            });
        }
        Ok(MonthlyReport::build(user, month, &holidays, days))
    }
}

fn apply_logout(
    conn: &mut SqliteConnection,
    log: &AttendanceLog,
    company: &Company,
    at: NaiveDateTime,
    reason: Option<&str>,
) -> Result<AttendanceLog, StorageError> {
    use schema::attendance_logs::dsl as al;
    let login_at = log
        .login_at
        .ok_or_else(|| StorageError::InvalidInput("not logged in today".into()))?;
    if log.logout_at.is_some() {
        return Err(StorageError::Conflict("already logged out".into()));
    }
    let status = log.attendance_status()?;
    let summary = attendance::summarize_shift(
        status,
        login_at,
        at,
        company.work_start_time,
        company.work_end_time,
    );
    let updated = diesel::update(al::attendance_logs.filter(al::id.eq(log.id)))
        .set((
            al::logout_at.eq(Some(at)),
            al::total_hours.eq(Some(summary.total_hours)),
            al::is_overtime.eq(summary.is_overtime),
            al::overtime_hours.eq(summary.overtime_hours),
            al::points_earned.eq(summary.points),
            al::logout_reason.eq(reason),
            al::updated_at.eq(at),
        ))
        .returning(AttendanceLog::as_returning())
        .get_result(conn)?;
    debug!(
        log_id = log.id,
        user_id = %log.user_id,
        hours = summary.total_hours,
        points = summary.points,
        forced = reason.is_some(),
        "logout recorded"
    );
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use chrono::TimeZone;
    use worklog_shared::auth::Role;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, d, h, m, 0).unwrap()
    }

    async fn acme(db: &TestDb) -> Company {
        db.store.get_company("acme").await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn login_classifies_and_second_login_is_ignored() {
        let db = seeded().await;
        let company = acme(&db).await;
        let first = db.store.record_login("ada", &company, at(2, 9, 20)).await.unwrap();
        assert!(first.created);
        assert_eq!(first.log.status, "slightly-late");

        let again = db.store.record_login("ada", &company, at(2, 11, 0)).await.unwrap();
        assert!(!again.created);
        assert_eq!(again.log.id, first.log.id);
        assert_eq!(again.log.status, "slightly-late");
    }

    #[tokio::test]
    async fn logout_computes_hours_overtime_and_points() {
        let db = seeded().await;
        let company = acme(&db).await;
        db.store.record_login("ada", &company, at(2, 8, 30)).await.unwrap();
        let log = db.store.record_logout("ada", &company, at(2, 18, 0)).await.unwrap();
        assert_eq!(log.total_hours, Some(9.5));
        assert!(log.is_overtime);
        assert_eq!(log.overtime_hours, 0.5);
        assert_eq!(log.points_earned, 15);
        assert!(log.logout_reason.is_none());

        let twice = db.store.record_logout("ada", &company, at(2, 19, 0)).await;
        assert!(matches!(twice, Err(StorageError::Conflict(_))));
    }

    #[tokio::test]
    async fn logout_without_login_is_rejected() {
        let db = seeded().await;
        let company = acme(&db).await;
        let err = db.store.record_logout("bob", &company, at(2, 18, 0)).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn absence_row_is_unique_and_login_converts_it() {
        let db = seeded().await;
        let company = acme(&db).await;
        let day = at(2, 0, 0).date_naive();
        assert!(db.store.mark_absent("bob", "acme", day, at(2, 23, 0)).await.unwrap());
        assert!(!db.store.mark_absent("bob", "acme", day, at(2, 23, 5)).await.unwrap());

        let out = db.store.record_login("bob", &company, at(2, 9, 0)).await.unwrap();
        assert!(out.created);
        assert_eq!(out.log.status, "present");
        assert_eq!(db.store.list_user_logs("bob", day, day).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn evening_report_flags_the_log() {
        let db = seeded().await;
        let company = acme(&db).await;
        let day = at(2, 0, 0).date_naive();
        db.store.record_login("ada", &company, at(2, 9, 0)).await.unwrap();
        db.store
            .submit_report("ada", "acme", day, ReportKind::Morning, "plan", at(2, 9, 5))
            .await
            .unwrap();
        assert!(!db.store.get_log("ada", day).await.unwrap().unwrap().report_submitted);
        db.store
            .submit_report("ada", "acme", day, ReportKind::Evening, "done", at(2, 17, 55))
            .await
            .unwrap();
        assert!(db.store.get_log("ada", day).await.unwrap().unwrap().report_submitted);

        let dup = db
            .store
            .submit_report("ada", "acme", day, ReportKind::Evening, "again", at(2, 18, 0))
            .await;
        assert!(matches!(dup, Err(StorageError::Conflict(_))));
    }

    #[tokio::test]
    async fn approved_correction_recomputes_status_hours_and_points() {
        let db = seeded().await;
        let company = acme(&db).await;
        let day = at(2, 0, 0).date_naive();
        db.store.record_login("ada", &company, at(2, 10, 30)).await.unwrap();
        db.store.record_logout("ada", &company, at(2, 12, 0)).await.unwrap();

        let c = db
            .store
            .request_correction("ada", "acme", day, at(2, 9, 0), Some(at(2, 18, 0)), "badge reader down")
            .await
            .unwrap();
        assert_eq!(c.status, "pending");
        assert_eq!(db.store.list_corrections("acme", true).await.unwrap().len(), 1);

        let decided = db
            .store
            .decide_correction(&company, c.id, "boss", true, at(3, 8, 0))
            .await
            .unwrap();
        assert_eq!(decided.status, "approved");
        assert_eq!(decided.decided_by.as_deref(), Some("boss"));

        let log = db.store.get_log("ada", day).await.unwrap().unwrap();
        assert_eq!(log.status, "present");
        assert_eq!(log.total_hours, Some(9.0));
        assert_eq!(log.points_earned, 15);

        let again = db
            .store
            .decide_correction(&company, c.id, "boss", false, at(3, 8, 5))
            .await;
        assert!(matches!(again, Err(StorageError::Conflict(_))));
        assert!(db.store.list_corrections("acme", true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn correction_login_must_fall_on_the_corrected_day() {
        let db = seeded().await;
        let mut waw = company("waw");
        waw.timezone = "Europe/Warsaw".into();
        db.store
            .seed_from_config(&[waw], &[user("wu", "waw", Role::Employee)], &[])
            .await
            .unwrap();
        let waw = db.store.get_company("waw").await.unwrap().unwrap();
        db.store.record_login("wu", &waw, at(3, 7, 0)).await.unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();

        // A day later in UTC
        let err = db
            .store
            .request_correction("wu", "waw", day, at(4, 7, 0), None, "typo")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));

        // 22:30 UTC on June 2 is 00:30 on June 3 in Warsaw
        let ok = db
            .store
            .request_correction("wu", "waw", day, at(2, 22, 30), None, "night shift")
            .await
            .unwrap();
        assert_eq!(ok.status, "pending");

        // 22:30 UTC on June 3 is already June 4 in Warsaw
        let late = db
            .store
            .request_correction("wu", "waw", day, at(3, 22, 30), None, "late")
            .await;
        assert!(matches!(late, Err(StorageError::InvalidInput(_))));
        assert_eq!(db.store.list_corrections("waw", true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn correction_needs_an_existing_log() {
        let db = seeded().await;
        let day = at(2, 0, 0).date_naive();
        let err = db
            .store
            .request_correction("bob", "acme", day, at(2, 9, 0), None, "forgot")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
