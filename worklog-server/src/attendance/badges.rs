//! Badge catalog. Seeded into the `badges` table at startup and referenced by
//! name from the streak and monthly rules.

pub const EARLY_BIRD: &str = "Early Bird";
pub const PERFECT_MONTH: &str = "Perfect Month";
pub const DEDICATED_STAR: &str = "Dedicated Star";
pub const RELIABLE_PERFORMER: &str = "Reliable Performer";

#[derive(Debug, Clone, Copy)]
pub struct BadgeSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub criteria: &'static str,
    pub badge_type: &'static str,
}

pub const CATALOG: &[BadgeSpec] = &[
    BadgeSpec {
        name: EARLY_BIRD,
        description: "Ten attended days in a row",
        icon: "sunrise",
        criteria: "streak:10",
        badge_type: "streak",
    },
    BadgeSpec {
        name: PERFECT_MONTH,
        description: "Thirty-day streak, or a month with full attendance and no absences",
        icon: "calendar-check",
        criteria: "streak:30|month:full-attendance",
        badge_type: "monthly",
    },
    BadgeSpec {
        name: DEDICATED_STAR,
        description: "Ninety attended days in a row",
        icon: "star",
        criteria: "streak:90",
        badge_type: "streak",
    },
    BadgeSpec {
        name: RELIABLE_PERFORMER,
        description: "A month without late or absent days",
        icon: "shield-check",
        criteria: "month:no-late-no-absent",
        badge_type: "monthly",
    },
];
