//! Tier assignment — the fixed priority hierarchy.
//!
//! Each task has exactly one governing tier at any moment, assigned by
//! the first matching rule. Rules 1–3 are universally-overriding urgency
//! signals; 4–9 encode the user's category preference order.

use chrono::{DateTime, Duration, Utc};

use crate::model::{Task, TaskCategory};

pub const TIER_DEADLINE_PROXIMITY: u8 = 1;
pub const TIER_RISK: u8 = 2;
pub const TIER_IMPACT: u8 = 3;
pub const TIER_CHILD: u8 = 4;
pub const TIER_HEALTH: u8 = 5;
pub const TIER_WORK: u8 = 6;
pub const TIER_PERSONAL: u8 = 7;
pub const TIER_FAMILY: u8 = 8;
pub const TIER_HOME: u8 = 9;

const HIGH_RISK_THRESHOLD: f64 = 0.7;
const HIGH_IMPACT_THRESHOLD: f64 = 0.7;

/// Assign the highest applicable tier (1 = highest priority, 9 = lowest).
///
/// Deterministic: depends only on the task's deadline, risk, impact,
/// category, and the injected `now`.
pub fn assign_tier(task: &Task, now: DateTime<Utc>) -> u8 {
    if has_urgent_deadline(task, now) {
        return TIER_DEADLINE_PROXIMITY;
    }
    if task.risk_score >= HIGH_RISK_THRESHOLD {
        return TIER_RISK;
    }
    if task.impact_score >= HIGH_IMPACT_THRESHOLD {
        return TIER_IMPACT;
    }
    match task.category {
        TaskCategory::Child => TIER_CHILD,
        TaskCategory::Health => TIER_HEALTH,
        TaskCategory::Work => TIER_WORK,
        TaskCategory::Personal | TaskCategory::Ideas => TIER_PERSONAL,
        TaskCategory::Family => TIER_FAMILY,
        // Home, Admin, Unknown, and anything uncategorized.
        _ => TIER_HOME,
    }
}

/// Deadline is urgent when `0 < deadline - now <= 24h`.
fn has_urgent_deadline(task: &Task, now: DateTime<Utc>) -> bool {
    match task.deadline {
        Some(deadline) => {
            let remaining = deadline - now;
            remaining > Duration::zero() && remaining <= Duration::hours(24)
        }
        None => false,
    }
}

/// Human-readable tier name, for logs and responses.
pub fn tier_name(tier: u8) -> &'static str {
    match tier {
        TIER_DEADLINE_PROXIMITY => "Deadline Proximity",
        TIER_RISK => "Risk of Negative Consequence",
        TIER_IMPACT => "Downstream Impact",
        TIER_CHILD => "Child-Related Needs",
        TIER_HEALTH => "Personal Health Needs",
        TIER_WORK => "Work Obligations",
        TIER_PERSONAL => "Personal & Ideas",
        TIER_FAMILY => "Family/Social Commitments",
        TIER_HOME => "Home Care",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn task() -> Task {
        Task::new(Uuid::new_v4(), "api", "t", now())
    }

    #[test]
    fn deadline_within_24h_is_tier_1() {
        let t = task().with_deadline(Some(now() + Duration::hours(23)));
        assert_eq!(assign_tier(&t, now()), TIER_DEADLINE_PROXIMITY);
    }

    #[test]
    fn deadline_exactly_24h_is_tier_1() {
        let t = task().with_deadline(Some(now() + Duration::hours(24)));
        assert_eq!(assign_tier(&t, now()), TIER_DEADLINE_PROXIMITY);
    }

    #[test]
    fn past_deadline_does_not_hit_tier_1() {
        let t = task().with_deadline(Some(now() - Duration::hours(1)));
        assert_eq!(assign_tier(&t, now()), TIER_HOME);
    }

    #[test]
    fn far_deadline_falls_through() {
        let t = task()
            .with_deadline(Some(now() + Duration::hours(25)))
            .with_category(crate::model::TaskCategory::Work);
        assert_eq!(assign_tier(&t, now()), TIER_WORK);
    }

    #[test]
    fn risk_beats_impact_and_category() {
        let mut t = task().with_category(crate::model::TaskCategory::Child);
        t.risk_score = 0.7;
        t.impact_score = 0.9;
        assert_eq!(assign_tier(&t, now()), TIER_RISK);
    }

    #[test]
    fn impact_beats_category() {
        let mut t = task().with_category(crate::model::TaskCategory::Child);
        t.impact_score = 0.7;
        assert_eq!(assign_tier(&t, now()), TIER_IMPACT);
    }

    #[test]
    fn category_tiers() {
        use crate::model::TaskCategory::*;
        for (cat, tier) in [
            (Child, TIER_CHILD),
            (Health, TIER_HEALTH),
            (Work, TIER_WORK),
            (Personal, TIER_PERSONAL),
            (Ideas, TIER_PERSONAL),
            (Family, TIER_FAMILY),
            (Home, TIER_HOME),
            (Admin, TIER_HOME),
            (Unknown, TIER_HOME),
        ] {
            assert_eq!(assign_tier(&task().with_category(cat), now()), tier, "{cat:?}");
        }
    }

    #[test]
    fn tier_is_always_in_range() {
        let t = task();
        let tier = assign_tier(&t, now());
        assert!((1..=9).contains(&tier));
    }
}
