use chrono::{DateTime, Utc};
use diesel::prelude::*;
use worklog_shared::domain::{JobKind, JobStatus};

use super::models::{JobRun, JobRunCompany, NewJobRun, NewJobRunCompany};
use super::{StorageError, Store, schema};

/// How one company fared in a job run.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyOutcome {
    pub company_id: String,
    pub status: JobStatus,
    pub error: Option<String>,
}

/// Outcome of one batch job invocation, ready to be persisted.
#[derive(Debug, Clone)]
pub struct JobRunRecord {
    pub job: JobKind,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub companies_processed: i32,
    pub companies_failed: i32,
    /// Operator-facing summary across all companies. Never shown to tenants.
    pub detail: Option<String>,
    pub outcomes: Vec<CompanyOutcome>,
}

impl Store {
    /// Writes the run and its per-company outcomes in one transaction.
    pub async fn record_job_run(&self, record: JobRunRecord) -> Result<JobRun, StorageError> {
        use schema::job_run_companies::dsl as jrc;
        use schema::job_runs::dsl as jr;
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| {
                let row = NewJobRun {
                    job: record.job.as_str(),
                    status: record.status.as_str(),
                    started_at: record.started_at.naive_utc(),
                    finished_at: record.finished_at.naive_utc(),
                    companies_processed: record.companies_processed,
                    companies_failed: record.companies_failed,
                    detail: record.detail.as_deref(),
                };
                let run = diesel::insert_into(jr::job_runs)
                    .values(&row)
                    .returning(JobRun::as_returning())
                    .get_result(conn)?;
                let children: Vec<NewJobRunCompany> = record
                    .outcomes
                    .iter()
                    .map(|o| NewJobRunCompany {
                        job_run_id: run.id,
                        company_id: &o.company_id,
                        status: o.status.as_str(),
                        error: o.error.as_deref(),
                    })
                    .collect();
                if !children.is_empty() {
                    diesel::insert_into(jrc::job_run_companies)
                        .values(&children)
                        .execute(conn)?;
                }
                Ok(run)
            })
        })
        .await
    }

    /// Most recent runs first, across all companies.
    pub async fn list_job_runs(&self, limit: i64) -> Result<Vec<JobRun>, StorageError> {
        use schema::job_runs::dsl as jr;
        self.with_conn(move |conn| {
            Ok(jr::job_runs
                .order((jr::started_at.desc(), jr::id.desc()))
                .limit(limit)
                .load::<JobRun>(conn)?)
        })
        .await
    }

    /// Runs that touched `company`, paired with that company's own outcome.
    /// Most recent first.
    pub async fn list_company_job_runs(
        &self,
        company: &str,
        limit: i64,
    ) -> Result<Vec<(JobRun, JobRunCompany)>, StorageError> {
        use schema::job_run_companies::dsl as jrc;
        use schema::job_runs::dsl as jr;
        let cid = company.to_string();
        self.with_conn(move |conn| {
            Ok(jr::job_runs
                .inner_join(jrc::job_run_companies)
                .filter(jrc::company_id.eq(&cid))
                .order((jr::started_at.desc(), jr::id.desc()))
                .limit(limit)
                .select((JobRun::as_select(), JobRunCompany::as_select()))
                .load::<(JobRun, JobRunCompany)>(conn)?)
        })
        .await
    }
}
