use std::collections::HashSet;

use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::debug;
use worklog_shared::domain::ApprovalStatus;

use super::models::{Holiday, Leave, NewHoliday, NewLeave};
use super::{StorageError, Store, schema};

impl Store {
    pub async fn add_holiday(
        &self,
        company: &str,
        on: NaiveDate,
        name: &str,
    ) -> Result<Holiday, StorageError> {
        use schema::holidays::dsl as h;
        if name.trim().is_empty() {
            return Err(StorageError::InvalidInput("holiday name is required".into()));
        }
        let cid = company.to_string();
        let label = name.to_string();
        self.with_conn(move |conn| {
            let row = NewHoliday {
                company_id: &cid,
                date: on,
                name: &label,
            };
            diesel::insert_into(h::holidays)
                .values(&row)
                .returning(Holiday::as_returning())
                .get_result(conn)
                .map_err(|e| match e {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        StorageError::Conflict(format!("holiday already set for {on}"))
                    }
                    other => StorageError::Database(other),
                })
        })
        .await
    }

    pub async fn list_holidays(&self, company: &str) -> Result<Vec<Holiday>, StorageError> {
        use schema::holidays::dsl as h;
        let cid = company.to_string();
        self.with_conn(move |conn| {
            Ok(h::holidays
                .filter(h::company_id.eq(&cid))
                .order(h::date.asc())
                .load::<Holiday>(conn)?)
        })
        .await
    }

    pub async fn is_holiday(&self, company: &str, on: NaiveDate) -> Result<bool, StorageError> {
        use schema::holidays::dsl as h;
        let cid = company.to_string();
        self.with_conn(move |conn| {
            let n: i64 = h::holidays
                .filter(h::company_id.eq(&cid))
                .filter(h::date.eq(on))
                .count()
                .get_result(conn)?;
            Ok(n > 0)
        })
        .await
    }

    /// Holiday dates between `from` and `to`, both inclusive.
    pub async fn holiday_dates(
        &self,
        company: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<HashSet<NaiveDate>, StorageError> {
        use schema::holidays::dsl as h;
        let cid = company.to_string();
        self.with_conn(move |conn| {
            let dates = h::holidays
                .filter(h::company_id.eq(&cid))
                .filter(h::date.ge(from))
                .filter(h::date.le(to))
                .select(h::date)
                .load::<NaiveDate>(conn)?;
            Ok(dates.into_iter().collect())
        })
        .await
    }

    pub async fn request_leave(
        &self,
        user: &str,
        company: &str,
        start: NaiveDate,
        end: NaiveDate,
        leave_type: &str,
        reason: Option<&str>,
    ) -> Result<Leave, StorageError> {
        use schema::leaves::dsl as l;
        if end < start {
            return Err(StorageError::InvalidInput(
                "leave ends before it starts".into(),
            ));
        }
        if leave_type.trim().is_empty() {
            return Err(StorageError::InvalidInput("leave type is required".into()));
        }
        let uid = user.to_string();
        let cid = company.to_string();
        let kind = leave_type.to_string();
        let why = reason.map(str::to_string);
        self.with_conn(move |conn| {
            let row = NewLeave {
                user_id: &uid,
                company_id: &cid,
                start_date: start,
                end_date: end,
                leave_type: &kind,
                reason: why.as_deref(),
                status: ApprovalStatus::Pending.as_str(),
            };
            Ok(diesel::insert_into(l::leaves)
                .values(&row)
                .returning(Leave::as_returning())
                .get_result(conn)?)
        })
        .await
    }

    /// Leaves of a company, optionally narrowed to one user.
    pub async fn list_leaves(
        &self,
        company: &str,
        user: Option<&str>,
    ) -> Result<Vec<Leave>, StorageError> {
        use schema::leaves::dsl as l;
        let cid = company.to_string();
        let uid = user.map(str::to_string);
        self.with_conn(move |conn| {
            let mut q = l::leaves.filter(l::company_id.eq(cid)).into_boxed();
            if let Some(uid) = uid {
                q = q.filter(l::user_id.eq(uid));
            }
            Ok(q.order(l::start_date.desc()).load::<Leave>(conn)?)
        })
        .await
    }

    pub async fn decide_leave(
        &self,
        company: &str,
        leave_id: i32,
        approver: &str,
        approve: bool,
    ) -> Result<Leave, StorageError> {
        use schema::leaves::dsl as l;
        let cid = company.to_string();
        let approver = approver.to_string();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| {
                let leave = l::leaves
                    .filter(l::id.eq(leave_id))
                    .filter(l::company_id.eq(&cid))
                    .first::<Leave>(conn)
                    .optional()?
                    .ok_or_else(|| StorageError::NotFound(format!("leave {leave_id}")))?;
                if leave.approval_status() != ApprovalStatus::Pending {
                    return Err(StorageError::Conflict(format!(
                        "leave {leave_id} already {}",
                        leave.status
                    )));
                }
                let decided = if approve {
                    ApprovalStatus::Approved
                } else {
                    ApprovalStatus::Rejected
                };
                debug!(leave_id, status = decided.as_str(), "leave decided");
                Ok(diesel::update(l::leaves.filter(l::id.eq(leave_id)))
                    .set((
                        l::status.eq(decided.as_str()),
                        l::decided_by.eq(Some(approver.as_str())),
                    ))
                    .returning(Leave::as_returning())
                    .get_result(conn)?)
            })
        })
        .await
    }

    /// Users of `company` with an approved leave covering `on`.
    pub async fn users_on_leave(
        &self,
        company: &str,
        on: NaiveDate,
    ) -> Result<HashSet<String>, StorageError> {
        use schema::leaves::dsl as l;
        let cid = company.to_string();
        self.with_conn(move |conn| {
            let ids = l::leaves
                .filter(l::company_id.eq(&cid))
                .filter(l::status.eq(ApprovalStatus::Approved.as_str()))
                .filter(l::start_date.le(on))
                .filter(l::end_date.ge(on))
                .select(l::user_id)
                .distinct()
                .load::<String>(conn)?;
            Ok(ids.into_iter().collect())
        })
        .await
    }
}
