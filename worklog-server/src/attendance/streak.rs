//! Per-user streak state machine.
//!
//! The streak counts consecutive calendar days with an attended status. A gap
//! of more than one day restarts it at 1, an explicit absence zeroes it.

use chrono::NaiveDate;
use worklog_shared::domain::AttendanceStatus;

use super::badges;

/// Points granted when the streak reaches exactly this value.
pub const BONUS_STREAK: i32 = 5;
pub const BONUS_POINTS: i32 = 10;

/// Badges granted when the streak reaches exactly the given value.
pub const STREAK_BADGES: &[(i32, &str)] = &[
    (10, badges::EARLY_BIRD),
    (30, badges::PERFECT_MONTH),
    (90, badges::DEDICATED_STAR),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreakState {
    pub current: i32,
    pub longest: i32,
    pub last_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreakOutcome {
    pub state: StreakState,
    pub changed: bool,
    pub bonus_points: i32,
    pub badges: Vec<&'static str>,
}

impl StreakOutcome {
    fn unchanged(state: StreakState) -> Self {
        Self {
            state,
            changed: false,
            bonus_points: 0,
            badges: Vec::new(),
        }
    }
}

/// Advances `state` by today's status. `None` means there is no log for today
/// and leaves the state untouched.
pub fn advance(
    state: StreakState,
    today: NaiveDate,
    status: Option<AttendanceStatus>,
) -> StreakOutcome {
    let Some(status) = status else {
        return StreakOutcome::unchanged(state);
    };

    if !status.is_attended() {
        return StreakOutcome {
            state: StreakState {
                current: 0,
                longest: state.longest,
                last_date: Some(today),
            },
            changed: true,
            bonus_points: 0,
            badges: Vec::new(),
        };
    }

    let current = match state.last_date {
        None => 1,
        Some(last) => {
            let gap = today.signed_duration_since(last).num_days();
            if gap <= 0 {
                // already counted for this day (or an older day is being replayed)
                return StreakOutcome::unchanged(state);
            } else if gap == 1 {
                state.current + 1
            } else {
                1
            }
        }
    };

    let bonus_points = if current == BONUS_STREAK {
        BONUS_POINTS
    } else {
        0
    };
    let badges = STREAK_BADGES
        .iter()
        .filter(|(at, _)| *at == current)
        .map(|(_, name)| *name)
        .collect();

    StreakOutcome {
        state: StreakState {
            current,
            longest: state.longest.max(current),
            last_date: Some(today),
        },
        changed: true,
        bonus_points,
        badges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, day).unwrap()
    }

    fn state(current: i32, longest: i32, last: Option<NaiveDate>) -> StreakState {
        StreakState {
            current,
            longest,
            last_date: last,
        }
    }

    #[test]
    fn consecutive_day_increments_by_one() {
        let out = advance(state(3, 7, Some(d(9))), d(10), Some(AttendanceStatus::Present));
        assert_eq!(out.state, state(4, 7, Some(d(10))));
        assert!(out.changed);
    }

    #[test]
    fn gap_of_three_days_resets_to_one() {
        let out = advance(state(8, 8, Some(d(7))), d(10), Some(AttendanceStatus::Late));
        assert_eq!(out.state.current, 1);
        assert_eq!(out.state.longest, 8);
    }

    #[test]
    fn first_attendance_starts_at_one() {
        let out = advance(StreakState::default(), d(1), Some(AttendanceStatus::VeryLate));
        assert_eq!(out.state, state(1, 1, Some(d(1))));
    }

    #[test]
    fn absence_zeroes_streak_and_records_date() {
        let out = advance(state(12, 20, Some(d(9))), d(10), Some(AttendanceStatus::Absent));
        assert_eq!(out.state, state(0, 20, Some(d(10))));
        assert!(out.badges.is_empty());
    }

    #[test]
    fn missing_log_is_a_no_op() {
        let before = state(4, 4, Some(d(3)));
        let out = advance(before, d(10), None);
        assert_eq!(out.state, before);
        assert!(!out.changed);
    }

    #[test]
    fn same_day_replay_does_not_double_count() {
        let before = state(4, 4, Some(d(10)));
        let out = advance(before, d(10), Some(AttendanceStatus::Present));
        assert_eq!(out.state, before);
        assert!(!out.changed);
    }

    #[test]
    fn thresholds_fire_at_exact_values() {
        let at5 = advance(state(4, 4, Some(d(9))), d(10), Some(AttendanceStatus::Present));
        assert_eq!(at5.bonus_points, BONUS_POINTS);
        assert!(at5.badges.is_empty());

        let at10 = advance(state(9, 9, Some(d(9))), d(10), Some(AttendanceStatus::Present));
        assert_eq!(at10.badges, vec![badges::EARLY_BIRD]);
        assert_eq!(at10.bonus_points, 0);

        let at30 = advance(state(29, 29, Some(d(9))), d(10), Some(AttendanceStatus::Present));
        assert_eq!(at30.badges, vec![badges::PERFECT_MONTH]);

        let at90 = advance(state(89, 89, Some(d(9))), d(10), Some(AttendanceStatus::Present));
        assert_eq!(at90.badges, vec![badges::DEDICATED_STAR]);

        let at11 = advance(state(10, 10, Some(d(9))), d(10), Some(AttendanceStatus::Present));
        assert!(at11.badges.is_empty());
    }

    #[test]
    fn reaching_ten_again_after_reset_triggers_again() {
        let mut s = StreakState::default();
        let mut early_bird = 0;
        let mut day = d(1);
        for i in 0..22 {
            // day 11 is an absence; the streak rebuilds to 10 by the end
            let status = if i == 10 {
                AttendanceStatus::Absent
            } else {
                AttendanceStatus::Present
            };
            let out = advance(s, day, Some(status));
            early_bird += out
                .badges
                .iter()
                .filter(|b| **b == badges::EARLY_BIRD)
                .count();
            s = out.state;
            day = day.succ_opt().unwrap();
        }
        assert_eq!(s.current, 11);
        assert_eq!(early_bird, 2);
    }
}
