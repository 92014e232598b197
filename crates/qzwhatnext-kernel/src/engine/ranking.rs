//! Stack ranking — tier, then urgency, then stable tie-breakers.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::engine::tiering::assign_tier;
use crate::model::Task;

/// Urgency class within a tier: deadline first, then due_by, then none.
const URGENCY_DEADLINE: u8 = 0;
const URGENCY_DUE_BY: u8 = 1;
const URGENCY_NONE: u8 = 2;

/// Stack-rank tasks by `(tier, urgency, created_at, id)`.
///
/// `time_zone` is the user's calendar timezone (IANA id); unparseable or
/// absent values fall back to UTC. The sort is stable, so equal keys keep
/// their input order, and concurrent calls over the same inputs return
/// identical orderings.
pub fn stack_rank(tasks: &[Task], now: DateTime<Utc>, time_zone: &str) -> Vec<Task> {
    let tz: Tz = time_zone.parse().unwrap_or(chrono_tz::UTC);

    let mut ranked: Vec<Task> = tasks.to_vec();
    ranked.sort_by_key(|task| {
        (
            assign_tier(task, now),
            urgency_key(task, tz),
            task.created_at,
            task.id,
        )
    });
    ranked
}

fn urgency_key(task: &Task, tz: Tz) -> (u8, i64) {
    if let Some(deadline) = task.deadline {
        return (URGENCY_DEADLINE, deadline.timestamp());
    }
    if let Some(due_by) = task.due_by {
        return (URGENCY_DUE_BY, end_of_local_day(due_by, tz).timestamp());
    }
    (URGENCY_NONE, i64::MAX)
}

/// 23:59:59 on `day` in the user's timezone, as a UTC instant.
///
/// On a DST gap/fold the earlier mapping is taken; an unmappable local
/// time degrades to UTC rather than failing the ranking.
fn end_of_local_day(day: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let local_end = day.and_time(NaiveTime::from_hms_opt(23, 59, 59).expect("valid time"));
    match tz.from_local_datetime(&local_end) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
        chrono::LocalResult::None => Utc.from_utc_datetime(&local_end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    fn task(title: &str) -> Task {
        Task::new(Uuid::new_v4(), "api", title, now())
    }

    #[test]
    fn lower_tier_ranks_first() {
        let urgent = task("urgent").with_deadline(Some(now() + Duration::hours(2)));
        let chore = task("chore");
        let ranked = stack_rank(&[chore, urgent], now(), "UTC");
        assert_eq!(ranked[0].title, "urgent");
    }

    #[test]
    fn deadline_outranks_due_by_within_tier() {
        let with_due = task("due").with_due_by(Some(now().date_naive()));
        let with_deadline = task("deadline").with_deadline(Some(now() + Duration::days(3)));
        let ranked = stack_rank(&[with_due.clone(), with_deadline.clone()], now(), "UTC");
        assert_eq!(ranked[0].title, "deadline");

        // Input order must not matter.
        let ranked = stack_rank(&[with_deadline, with_due], now(), "UTC");
        assert_eq!(ranked[0].title, "deadline");
    }

    #[test]
    fn earlier_due_by_ranks_first() {
        let later = task("later").with_due_by(now().date_naive().succ_opt());
        let sooner = task("sooner").with_due_by(Some(now().date_naive()));
        let ranked = stack_rank(&[later, sooner], now(), "UTC");
        assert_eq!(ranked[0].title, "sooner");
    }

    #[test]
    fn due_by_uses_calendar_timezone() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let in_la = end_of_local_day(day, chrono_tz::America::Los_Angeles);
        let in_utc = end_of_local_day(day, chrono_tz::UTC);
        assert!(in_la > in_utc);
    }

    #[test]
    fn ties_preserve_input_order() {
        let shared = now();
        let mut a = task("a");
        let mut b = task("b");
        a.created_at = shared;
        b.created_at = shared;
        // Force identical ids ordering by fixing ids.
        a.id = Uuid::from_u128(1);
        b.id = Uuid::from_u128(2);
        let ranked = stack_rank(&[a.clone(), b.clone()], now(), "UTC");
        assert_eq!(ranked[0].title, "a");
        assert_eq!(ranked[1].title, "b");
    }

    #[test]
    fn ranking_is_deterministic() {
        let tasks: Vec<Task> = (0..20)
            .map(|i| {
                let mut t = task(&format!("t{i}"));
                t.risk_score = if i % 3 == 0 { 0.8 } else { 0.2 };
                t.due_by = (i % 2 == 0).then(|| now().date_naive());
                t
            })
            .collect();
        let first = stack_rank(&tasks, now(), "America/New_York");
        let second = stack_rank(&tasks, now(), "America/New_York");
        let ids1: Vec<_> = first.iter().map(|t| t.id).collect();
        let ids2: Vec<_> = second.iter().map(|t| t.id).collect();
        assert_eq!(ids1, ids2);
    }
}
