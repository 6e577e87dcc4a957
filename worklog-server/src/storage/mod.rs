pub mod models;
pub mod schema;

mod attendance;
mod calendar;
mod job_runs;
mod rewards;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use models::{Company, NewCompany, NewHoliday, NewSession, NewUser, User};
use tracing::{debug, info};
use worklog_shared::auth::Role;

use crate::attendance::badges;
use crate::server::{CompanyConfig, HolidayConfig, UserConfig};

pub use attendance::LoginOutcome;
pub use job_runs::{CompanyOutcome, JobRunRecord};

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// The caller supplied invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation clashes with the current state of a row.
    #[error("conflict: {0}")]
    Conflict(String),
}

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

/// Input for creating a user outside of config seeding.
#[derive(Debug, Clone)]
pub struct NewUserInput {
    pub id: String,
    pub company_id: String,
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub role: Role,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let manager = ConnectionManager::<SqliteConnection>::new(path.to_string());
        let pool = Pool::builder().max_size(8).build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool })
    }

    /// Runs `f` on a pooled connection inside `spawn_blocking`.
    pub(crate) async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<T, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            f(&mut conn)
        })
        .await?
    }

    /// Upserts companies, users and holidays from config, and the badge catalog.
    pub async fn seed_from_config(
        &self,
        cfg_companies: &[CompanyConfig],
        cfg_users: &[UserConfig],
        cfg_holidays: &[HolidayConfig],
    ) -> Result<(), StorageError> {
        use schema::{badges as b, companies, holidays, users};

        let companies_owned = cfg_companies.to_owned();
        let users_owned = cfg_users.to_owned();
        let holidays_owned = cfg_holidays.to_owned();
        self.with_conn(move |conn| {
            for c in &companies_owned {
                if c.timezone.parse::<chrono_tz::Tz>().is_err() {
                    return Err(StorageError::InvalidInput(format!(
                        "company {}: unknown timezone {}",
                        c.id, c.timezone
                    )));
                }
                let row = NewCompany {
                    id: &c.id,
                    name: &c.name,
                    timezone: &c.timezone,
                    work_start_time: c.work_start_time,
                    work_end_time: c.work_end_time,
                    active: c.active,
                };
                diesel::insert_into(companies::table)
                    .values(&row)
                    .on_conflict(companies::id)
                    .do_update()
                    .set((
                        companies::name.eq(row.name),
                        companies::timezone.eq(row.timezone),
                        companies::work_start_time.eq(row.work_start_time),
                        companies::work_end_time.eq(row.work_end_time),
                        companies::active.eq(row.active),
                    ))
                    .execute(conn)?;
            }

            for u in &users_owned {
                let row = NewUser {
                    id: &u.id,
                    company_id: &u.company_id,
                    username: &u.username,
                    display_name: &u.display_name,
                    email: u.email.as_deref(),
                    password_hash: &u.password_hash,
                    role: u.role.as_str(),
                    active: true,
                };
                diesel::insert_into(users::table)
                    .values(&row)
                    .on_conflict(users::id)
                    .do_update()
                    .set((
                        users::company_id.eq(row.company_id),
                        users::username.eq(row.username),
                        users::display_name.eq(row.display_name),
                        users::email.eq(row.email),
                        users::password_hash.eq(row.password_hash),
                        users::role.eq(row.role),
                    ))
                    .execute(conn)?;
            }

            for h in &holidays_owned {
                let row = NewHoliday {
                    company_id: &h.company_id,
                    date: h.date,
                    name: &h.name,
                };
                diesel::insert_into(holidays::table)
                    .values(&row)
                    .on_conflict((holidays::company_id, holidays::date))
                    .do_update()
                    .set(holidays::name.eq(row.name))
                    .execute(conn)?;
            }

            for spec in badges::CATALOG {
                let row = models::NewBadge {
                    name: spec.name,
                    description: spec.description,
                    icon: spec.icon,
                    criteria: spec.criteria,
                    badge_type: spec.badge_type,
                };
                diesel::insert_into(b::table)
                    .values(&row)
                    .on_conflict(b::name)
                    .do_update()
                    .set((
                        b::description.eq(row.description),
                        b::icon.eq(row.icon),
                        b::criteria.eq(row.criteria),
                        b::badge_type.eq(row.badge_type),
                    ))
                    .execute(conn)?;
            }
            info!(
                companies = companies_owned.len(),
                users = users_owned.len(),
                holidays = holidays_owned.len(),
                "seeded from config"
            );
            Ok(())
        })
        .await
    }

    pub async fn list_active_companies(&self) -> Result<Vec<Company>, StorageError> {
        use schema::companies::dsl::*;
        self.with_conn(|conn| {
            Ok(companies
                .filter(active.eq(true))
                .order(id.asc())
                .load::<Company>(conn)?)
        })
        .await
    }

    pub async fn get_company(&self, company_id: &str) -> Result<Option<Company>, StorageError> {
        use schema::companies::dsl::*;
        let cid = company_id.to_string();
        self.with_conn(move |conn| {
            Ok(companies
                .filter(id.eq(&cid))
                .first::<Company>(conn)
                .optional()?)
        })
        .await
    }

    pub async fn list_users(&self, company: &str) -> Result<Vec<User>, StorageError> {
        use schema::users::dsl::*;
        let cid = company.to_string();
        self.with_conn(move |conn| {
            Ok(users
                .filter(company_id.eq(&cid))
                .order(display_name.asc())
                .load::<User>(conn)?)
        })
        .await
    }

    pub async fn list_active_members(&self, company: &str) -> Result<Vec<User>, StorageError> {
        use schema::users::dsl::*;
        let cid = company.to_string();
        self.with_conn(move |conn| {
            Ok(users
                .filter(company_id.eq(&cid))
                .filter(active.eq(true))
                .order(id.asc())
                .load::<User>(conn)?)
        })
        .await
    }

    pub async fn list_company_admins(&self, company: &str) -> Result<Vec<User>, StorageError> {
        use schema::users::dsl::*;
        let cid = company.to_string();
        self.with_conn(move |conn| {
            Ok(users
                .filter(company_id.eq(&cid))
                .filter(active.eq(true))
                .filter(role.eq(Role::Admin.as_str()))
                .order(id.asc())
                .load::<User>(conn)?)
        })
        .await
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, StorageError> {
        use schema::users::dsl::*;
        let uid = user_id.to_string();
        self.with_conn(move |conn| Ok(users.filter(id.eq(&uid)).first::<User>(conn).optional()?))
            .await
    }

    pub async fn find_user_by_username(&self, name: &str) -> Result<Option<User>, StorageError> {
        use schema::users::dsl::*;
        let uname = name.to_string();
        self.with_conn(move |conn| {
            Ok(users
                .filter(username.eq(&uname))
                .first::<User>(conn)
                .optional()?)
        })
        .await
    }

    pub async fn create_user(&self, input: NewUserInput) -> Result<User, StorageError> {
        use schema::users::dsl as u;
        if input.username.trim().is_empty() {
            return Err(StorageError::InvalidInput("username is required".into()));
        }
        self.with_conn(move |conn| {
            let taken: i64 = u::users
                .filter(u::username.eq(&input.username).or(u::id.eq(&input.id)))
                .count()
                .get_result(conn)?;
            if taken > 0 {
                return Err(StorageError::Conflict(format!(
                    "user already exists: {}",
                    input.username
                )));
            }
            let row = NewUser {
                id: &input.id,
                company_id: &input.company_id,
                username: &input.username,
                display_name: &input.display_name,
                email: input.email.as_deref(),
                password_hash: &input.password_hash,
                role: input.role.as_str(),
                active: true,
            };
            diesel::insert_into(u::users).values(&row).execute(conn)?;
            debug!(user_id = %input.id, company_id = %input.company_id, "user created");
            Ok(u::users.filter(u::id.eq(&input.id)).first::<User>(conn)?)
        })
        .await
    }

    /// Returns `false` when no such user exists in the company.
    pub async fn set_user_active(
        &self,
        company: &str,
        user: &str,
        is_active: bool,
    ) -> Result<bool, StorageError> {
        use schema::users::dsl::*;
        let cid = company.to_string();
        let uid = user.to_string();
        self.with_conn(move |conn| {
            let updated = diesel::update(users.filter(id.eq(&uid)).filter(company_id.eq(&cid)))
                .set(active.eq(is_active))
                .execute(conn)?;
            Ok(updated > 0)
        })
        .await
    }

    // Session helpers for JWT inactivity windows
    pub async fn create_session(&self, jti_: &str, username_: &str) -> Result<(), StorageError> {
        use schema::sessions;
        let j = jti_.to_string();
        let u = username_.to_string();
        self.with_conn(move |conn| {
            let new = NewSession {
                jti: &j,
                username: &u,
            };
            diesel::insert_into(sessions::table)
                .values(&new)
                .on_conflict_do_nothing()
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Touch session atomically, but only if it hasn't expired.
    /// Returns `true` if the session was found and updated, `false` otherwise.
    pub async fn touch_session_with_cutoff(
        &self,
        jti_: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        use schema::sessions::dsl::*;
        let j = jti_.to_string();
        self.with_conn(move |conn| {
            let now = Utc::now().naive_utc();
            let updated = diesel::update(
                sessions
                    .filter(jti.eq(&j))
                    .filter(last_used_at.ge(cutoff.naive_utc())),
            )
            .set(last_used_at.eq(now))
            .execute(conn)?;
            Ok(updated > 0)
        })
        .await
    }
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // Enable WAL for better read/write concurrency and set a busy timeout
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn seeding_is_idempotent_and_loads_badges() {
        let db = seeded().await;
        db.store
            .seed_from_config(&[company("acme")], &[user("ada", "acme", Role::Employee)], &[])
            .await
            .unwrap();
        assert_eq!(db.store.list_active_members("acme").await.unwrap().len(), 3);
        assert_eq!(db.store.list_badges().await.unwrap().len(), badges::CATALOG.len());
        let admins = db.store.list_company_admins("acme").await.unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].id, "boss");
    }

    #[tokio::test]
    async fn unknown_timezone_is_rejected() {
        let db = seeded().await;
        let mut bad = company("zulu");
        bad.timezone = "Mars/Olympus".into();
        let err = db.store.seed_from_config(&[bad], &[], &[]).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn duplicate_username_conflicts_and_deactivation_hides_member() {
        let db = seeded().await;
        let input = NewUserInput {
            id: "ada2".into(),
            company_id: "acme".into(),
            username: "ada".into(),
            display_name: "Ada Two".into(),
            email: None,
            password_hash: "x".into(),
            role: Role::Employee,
        };
        assert!(matches!(
            db.store.create_user(input).await,
            Err(StorageError::Conflict(_))
        ));

        assert!(db.store.set_user_active("acme", "bob", false).await.unwrap());
        assert!(!db.store.set_user_active("other", "ada", false).await.unwrap());
        let members = db.store.list_active_members("acme").await.unwrap();
        assert!(members.iter().all(|u| u.id != "bob"));
    }
}
