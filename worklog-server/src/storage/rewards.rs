use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use tracing::{debug, info};
use worklog_shared::domain::AttendanceStatus;

use super::models::{AttendanceReward, Badge, NewAttendanceReward, NewUserBadge, UserBadge};
use super::{StorageError, Store, schema};
use crate::attendance::badges;
use crate::attendance::monthly::PERFECT_MONTH_POINTS;
use crate::attendance::streak::{self, StreakOutcome, StreakState};

impl Store {
    /// Reward row for the user, created with zeroed counters on first access.
    pub async fn get_reward(
        &self,
        user: &str,
        company: &str,
    ) -> Result<AttendanceReward, StorageError> {
        let uid = user.to_string();
        let cid = company.to_string();
        self.with_conn(move |conn| load_or_create_reward(conn, &uid, &cid, Utc::now().naive_utc()))
            .await
    }

    /// Advances the streak for `today` and applies its side effects (bonus
    /// points, badges) in one transaction.
    pub async fn apply_streak(
        &self,
        user: &str,
        company: &str,
        today: NaiveDate,
        status: Option<AttendanceStatus>,
        now: DateTime<Utc>,
    ) -> Result<StreakOutcome, StorageError> {
        use schema::attendance_rewards::dsl as r;
        let uid = user.to_string();
        let cid = company.to_string();
        let at = now.naive_utc();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| {
                let reward = load_or_create_reward(conn, &uid, &cid, at)?;
                let before = StreakState {
                    current: reward.current_streak,
                    longest: reward.longest_streak,
                    last_date: reward.last_attendance_date,
                };
                let outcome = streak::advance(before, today, status);
                if !outcome.changed {
                    return Ok(outcome);
                }
                diesel::update(
                    r::attendance_rewards
                        .filter(r::user_id.eq(&uid))
                        .filter(r::company_id.eq(&cid)),
                )
                .set((
                    r::current_streak.eq(outcome.state.current),
                    r::longest_streak.eq(outcome.state.longest),
                    r::last_attendance_date.eq(outcome.state.last_date),
                    r::total_points.eq(r::total_points + outcome.bonus_points),
                    r::updated_at.eq(at),
                ))
                .execute(conn)?;
                for name in &outcome.badges {
                    assign_badge_conn(conn, &uid, name, at)?;
                }
                debug!(
                    user_id = %uid,
                    streak = outcome.state.current,
                    bonus = outcome.bonus_points,
                    badges = ?outcome.badges,
                    "streak applied"
                );
                Ok(outcome)
            })
        })
        .await
    }

    /// Adds daily points to both the lifetime total and the monthly score.
    pub async fn credit_points(
        &self,
        user: &str,
        company: &str,
        points: i32,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        use schema::attendance_rewards::dsl as r;
        let uid = user.to_string();
        let cid = company.to_string();
        let at = now.naive_utc();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| {
                load_or_create_reward(conn, &uid, &cid, at)?;
                diesel::update(
                    r::attendance_rewards
                        .filter(r::user_id.eq(&uid))
                        .filter(r::company_id.eq(&cid)),
                )
                .set((
                    r::total_points.eq(r::total_points + points),
                    r::monthly_score.eq(r::monthly_score + points),
                    r::updated_at.eq(at),
                ))
                .execute(conn)?;
                Ok(())
            })
        })
        .await
    }

    /// Perfect-month badge, its point bonus and the counter, atomically.
    pub async fn award_perfect_month(
        &self,
        user: &str,
        company: &str,
        now: DateTime<Utc>,
    ) -> Result<i32, StorageError> {
        use schema::attendance_rewards::dsl as r;
        let uid = user.to_string();
        let cid = company.to_string();
        let at = now.naive_utc();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| {
                load_or_create_reward(conn, &uid, &cid, at)?;
                let times = assign_badge_conn(conn, &uid, badges::PERFECT_MONTH, at)?;
                diesel::update(
                    r::attendance_rewards
                        .filter(r::user_id.eq(&uid))
                        .filter(r::company_id.eq(&cid)),
                )
                .set((
                    r::total_points.eq(r::total_points + PERFECT_MONTH_POINTS),
                    r::perfect_months.eq(r::perfect_months + 1),
                    r::updated_at.eq(at),
                ))
                .execute(conn)?;
                info!(user_id = %uid, times, "perfect month awarded");
                Ok(times)
            })
        })
        .await
    }

    /// Awards a badge by name. Returns how many times the user now holds it.
    pub async fn assign_badge(
        &self,
        user: &str,
        badge: &str,
        now: DateTime<Utc>,
    ) -> Result<i32, StorageError> {
        let uid = user.to_string();
        let name = badge.to_string();
        let at = now.naive_utc();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| assign_badge_conn(conn, &uid, &name, at))
        })
        .await
    }

    /// Zeroes the monthly score and returns the value it had.
    pub async fn reset_monthly_score(
        &self,
        user: &str,
        company: &str,
        now: DateTime<Utc>,
    ) -> Result<i32, StorageError> {
        use schema::attendance_rewards::dsl as r;
        let uid = user.to_string();
        let cid = company.to_string();
        let at = now.naive_utc();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| {
                let reward = load_or_create_reward(conn, &uid, &cid, at)?;
                diesel::update(
                    r::attendance_rewards
                        .filter(r::user_id.eq(&uid))
                        .filter(r::company_id.eq(&cid)),
                )
                .set((r::monthly_score.eq(0), r::updated_at.eq(at)))
                .execute(conn)?;
                Ok(reward.monthly_score)
            })
        })
        .await
    }

    pub async fn list_user_badges(
        &self,
        user: &str,
    ) -> Result<Vec<(UserBadge, Badge)>, StorageError> {
        use schema::badges::dsl as b;
        use schema::user_badges::dsl as ub;
        let uid = user.to_string();
        self.with_conn(move |conn| {
            Ok(ub::user_badges
                .inner_join(b::badges)
                .filter(ub::user_id.eq(&uid))
                .order(ub::first_awarded_at.asc())
                .select((UserBadge::as_select(), Badge::as_select()))
                .load::<(UserBadge, Badge)>(conn)?)
        })
        .await
    }

    pub async fn list_badges(&self) -> Result<Vec<Badge>, StorageError> {
        use schema::badges::dsl as b;
        self.with_conn(|conn| Ok(b::badges.order(b::id.asc()).load::<Badge>(conn)?))
            .await
    }
}

fn load_or_create_reward(
    conn: &mut SqliteConnection,
    user: &str,
    company: &str,
    at: NaiveDateTime,
) -> Result<AttendanceReward, StorageError> {
    use schema::attendance_rewards::dsl as r;
    let row = NewAttendanceReward {
        user_id: user,
        company_id: company,
        updated_at: at,
    };
    diesel::insert_into(r::attendance_rewards)
        .values(&row)
        .on_conflict((r::user_id, r::company_id))
        .do_nothing()
        .execute(conn)?;
    Ok(r::attendance_rewards
        .filter(r::user_id.eq(user))
        .filter(r::company_id.eq(company))
        .first::<AttendanceReward>(conn)?)
}

/// Inserts the join row or bumps its counter.
fn assign_badge_conn(
    conn: &mut SqliteConnection,
    user: &str,
    badge: &str,
    at: NaiveDateTime,
) -> Result<i32, StorageError> {
    use schema::badges::dsl as b;
    use schema::user_badges::dsl as ub;
    let badge_id = b::badges
        .filter(b::name.eq(badge))
        .select(b::id)
        .first::<i32>(conn)
        .optional()?
        .ok_or_else(|| StorageError::NotFound(format!("badge {badge}")))?;
    let row = NewUserBadge {
        user_id: user,
        badge_id,
        times_awarded: 1,
        first_awarded_at: at,
        last_awarded_at: at,
    };
    let times = diesel::insert_into(ub::user_badges)
        .values(&row)
        .on_conflict((ub::user_id, ub::badge_id))
        .do_update()
        .set((
            ub::times_awarded.eq(ub::times_awarded + 1),
            ub::last_awarded_at.eq(at),
        ))
        .returning(ub::times_awarded)
        .get_result::<i32>(conn)?;
    debug!(user_id = %user, badge, times, "badge assigned");
    Ok(times)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use chrono::TimeZone;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 30, 23, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn reward_row_is_created_lazily() {
        let db = seeded().await;
        let r = db.store.get_reward("ada", "acme").await.unwrap();
        assert_eq!(r.total_points, 0);
        assert_eq!(r.current_streak, 0);
        assert!(r.last_attendance_date.is_none());
    }

    #[tokio::test]
    async fn re_awarding_a_badge_increments_the_counter() {
        let db = seeded().await;
        assert_eq!(db.store.assign_badge("ada", badges::EARLY_BIRD, now()).await.unwrap(), 1);
        assert_eq!(db.store.assign_badge("ada", badges::EARLY_BIRD, now()).await.unwrap(), 2);
        let held = db.store.list_user_badges("ada").await.unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].0.times_awarded, 2);
        assert_eq!(held[0].1.name, badges::EARLY_BIRD);

        let missing = db.store.assign_badge("ada", "Nope", now()).await;
        assert!(matches!(missing, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn fifth_consecutive_day_credits_bonus() {
        let db = seeded().await;
        for day in 1..=5 {
            db.store
                .apply_streak("ada", "acme", d(day), Some(AttendanceStatus::Present), now())
                .await
                .unwrap();
        }
        let r = db.store.get_reward("ada", "acme").await.unwrap();
        assert_eq!(r.current_streak, 5);
        assert_eq!(r.longest_streak, 5);
        assert_eq!(r.total_points, streak::BONUS_POINTS);
        assert_eq!(r.monthly_score, 0);
    }

    #[tokio::test]
    async fn tenth_day_awards_early_bird_and_absence_resets() {
        let db = seeded().await;
        for day in 1..=10 {
            db.store
                .apply_streak("bob", "acme", d(day), Some(AttendanceStatus::Late), now())
                .await
                .unwrap();
        }
        let held = db.store.list_user_badges("bob").await.unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].1.name, badges::EARLY_BIRD);

        let out = db
            .store
            .apply_streak("bob", "acme", d(11), Some(AttendanceStatus::Absent), now())
            .await
            .unwrap();
        assert_eq!(out.state.current, 0);
        let r = db.store.get_reward("bob", "acme").await.unwrap();
        assert_eq!(r.current_streak, 0);
        assert_eq!(r.longest_streak, 10);
        assert_eq!(r.last_attendance_date, Some(d(11)));

        let noop = db.store.apply_streak("bob", "acme", d(12), None, now()).await.unwrap();
        assert!(!noop.changed);
    }

    #[tokio::test]
    async fn perfect_month_and_monthly_reset() {
        let db = seeded().await;
        db.store.credit_points("ada", "acme", 15, now()).await.unwrap();
        db.store.credit_points("ada", "acme", 7, now()).await.unwrap();
        assert_eq!(db.store.award_perfect_month("ada", "acme", now()).await.unwrap(), 1);

        let r = db.store.get_reward("ada", "acme").await.unwrap();
        assert_eq!(r.total_points, 22 + PERFECT_MONTH_POINTS);
        assert_eq!(r.monthly_score, 22);
        assert_eq!(r.perfect_months, 1);

        assert_eq!(db.store.reset_monthly_score("ada", "acme", now()).await.unwrap(), 22);
        let r = db.store.get_reward("ada", "acme").await.unwrap();
        assert_eq!(r.monthly_score, 0);
        assert_eq!(r.total_points, 22 + PERFECT_MONTH_POINTS);
    }
}
