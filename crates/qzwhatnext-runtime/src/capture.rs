//! Capture orchestration — one natural-language instruction in, one
//! persisted entity (and possibly a calendar write-through) out.
//!
//! Dispatch per parsed shape:
//! - task series → upsert + materialize the coming week
//! - recurring time block → upsert + recurring calendar event (RRULE
//!   export-only; patch-or-recreate on update)
//! - one-off ("next tue 2:30pm") → single calendar event
//! - deferred ("sometime next week") → plain task with `start_after`

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use qzwhatnext_foundation::calendar::{
    CalendarGateway, EventDraft, EventPatch, PRIVATE_KEY_TIME_BLOCK_ID,
};
use qzwhatnext_foundation::persistence::{SeriesStore, Store, TaskStore, TimeBlockStore};
use qzwhatnext_kernel::model::{
    RecurringTaskSeries, RecurringTimeBlock, Task, Weekday,
};
use qzwhatnext_kernel::recurrence::{
    CaptureAction, next_occurrence, parse_capture_instruction, preset_to_rrule,
};

use crate::error::{RuntimeError, RuntimeResult};
use crate::materializer::materialize_recurring_tasks;

/// Days of materialization a capture triggers.
const CAPTURE_MATERIALIZE_DAYS: i64 = 7;

/// Result surfaced to the API.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOutcome {
    /// `created` or `updated`.
    pub action: &'static str,
    pub entity_kind: &'static str,
    pub entity_id: Uuid,
    pub tasks_created: Option<usize>,
    pub calendar_event_id: Option<String>,
}

/// Handle a single capture instruction for a user.
///
/// `gateway` is optional: without a connected calendar, time blocks and
/// one-off events persist locally and sync on a later pass. `entity_id`
/// selects an existing series/time block to update instead of creating.
pub async fn capture_instruction(
    store: &dyn Store,
    gateway: Option<&dyn CalendarGateway>,
    user_id: Uuid,
    instruction: &str,
    entity_id: Option<Uuid>,
    time_zone: &str,
    now: DateTime<Utc>,
) -> RuntimeResult<CaptureOutcome> {
    let parsed = parse_capture_instruction(instruction, now)?;
    let tz: Tz = time_zone.parse().unwrap_or(chrono_tz::UTC);

    match parsed.action {
        CaptureAction::TaskSeries { preset } => {
            let preset = preset
                .normalize()
                .map_err(|e| RuntimeError::Validation(e.to_string()))?;
            let (mut series, action) = match entity_id {
                Some(id) => {
                    let existing = store
                        .get_series(user_id, id)
                        .await?
                        .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
                    (existing, "updated")
                }
                None => (
                    RecurringTaskSeries::new(user_id, parsed.title.clone(), preset.clone(), now),
                    "created",
                ),
            };
            series.title_template = parsed.title.clone();
            series.recurrence_preset = preset;
            series.ai_excluded = parsed.ai_excluded;
            series.updated_at = now;
            store.upsert_series(&series).await?;

            let created = materialize_recurring_tasks(
                store,
                user_id,
                now,
                now + Duration::days(CAPTURE_MATERIALIZE_DAYS),
                now,
            )
            .await?;
            info!(user_id = %user_id, series_id = %series.id, created, "captured task series");

            Ok(CaptureOutcome {
                action,
                entity_kind: "task_series",
                entity_id: series.id,
                tasks_created: Some(created),
                calendar_event_id: None,
            })
        }

        CaptureAction::TimeBlock { preset } => {
            let preset = preset
                .normalize()
                .map_err(|e| RuntimeError::Validation(e.to_string()))?;
            let (mut block, action) = match entity_id {
                Some(id) => {
                    let existing = store
                        .get_time_block(user_id, id)
                        .await?
                        .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
                    (existing, "updated")
                }
                None => (
                    RecurringTimeBlock::new(user_id, parsed.title.clone(), preset.clone(), now),
                    "created",
                ),
            };
            block.title = parsed.title.clone();
            block.recurrence_preset = preset;
            block.updated_at = now;

            if let Some(gateway) = gateway {
                block.calendar_event_id =
                    write_through_time_block(gateway, &block, tz, now).await?;
            }
            store.upsert_time_block(&block).await?;
            info!(user_id = %user_id, time_block_id = %block.id, "captured time block");

            Ok(CaptureOutcome {
                action,
                entity_kind: "time_block",
                entity_id: block.id,
                tasks_created: None,
                calendar_event_id: block.calendar_event_id.clone(),
            })
        }

        CaptureAction::OneOffEvent { weekday, time } => {
            let start = resolve_one_off(weekday, time, tz, now)?;
            let end = start + Duration::hours(1);
            let event_id = match gateway {
                Some(gateway) => {
                    // A plain (non-managed) event: the planner treats it
                    // as reserved time like any other user event.
                    let event = gateway
                        .insert_event(&EventDraft {
                            summary: parsed.title.clone(),
                            description: None,
                            start,
                            end,
                            time_zone: Some(time_zone.to_string()),
                            recurrence: None,
                            private: HashMap::new(),
                        })
                        .await?;
                    Some(event.id)
                }
                None => None,
            };
            info!(user_id = %user_id, start = %start, "captured one-off event");

            Ok(CaptureOutcome {
                action: "created",
                entity_kind: "one_off_event",
                entity_id: Uuid::new_v4(),
                tasks_created: None,
                calendar_event_id: event_id,
            })
        }

        CaptureAction::DeferredTask { start_after } => {
            let task = Task::new(user_id, "api", parsed.title.clone(), now)
                .with_ai_excluded(parsed.ai_excluded)
                .with_start_after(Some(start_after));
            store.create_task(&task).await?;
            info!(user_id = %user_id, task_id = %task.id, start_after = %start_after, "captured deferred task");

            Ok(CaptureOutcome {
                action: "created",
                entity_kind: "deferred_task",
                entity_id: task.id,
                tasks_created: Some(1),
                calendar_event_id: None,
            })
        }
    }
}

/// Create or repair the recurring calendar event for a time block.
///
/// Update paths patch the existing event; a missing event is recreated.
/// The RRULE is export-only — we never read recurrence back.
async fn write_through_time_block(
    gateway: &dyn CalendarGateway,
    block: &RecurringTimeBlock,
    tz: Tz,
    now: DateTime<Utc>,
) -> RuntimeResult<Option<String>> {
    let preset = &block.recurrence_preset;
    let (Some(time_start), Some(time_end)) = (preset.time_start, preset.time_end) else {
        return Err(RuntimeError::Validation(
            "time block is missing start/end times".into(),
        ));
    };

    // Anchor the recurring event on the first occurrence.
    let today = now.with_timezone(&tz).date_naive();
    let Some(first_day) = next_occurrence(preset, today, today + Duration::days(366)) else {
        return Err(RuntimeError::Validation(
            "recurrence has no upcoming occurrence".into(),
        ));
    };
    let start = to_utc(first_day.and_time(time_start), tz);
    let mut end = to_utc(first_day.and_time(time_end), tz);
    if time_end <= time_start {
        end += Duration::days(1);
    }

    if let Some(event_id) = &block.calendar_event_id {
        if gateway.get_event(event_id).await?.is_some() {
            gateway
                .patch_event(
                    event_id,
                    &EventPatch {
                        summary: Some(block.title.clone()),
                        start: Some(start),
                        end: Some(end),
                    },
                )
                .await?;
            return Ok(Some(event_id.clone()));
        }
        // Fall through: the event vanished, recreate it.
    }

    let mut private = HashMap::new();
    // Deliberately not managed: this is user-reserved time.
    private.insert(PRIVATE_KEY_TIME_BLOCK_ID.to_string(), block.id.to_string());

    let event = gateway
        .insert_event(&EventDraft {
            summary: block.title.clone(),
            description: None,
            start,
            end,
            time_zone: Some(tz.name().to_string()),
            recurrence: Some(preset_to_rrule(preset)),
            private,
        })
        .await?;
    Ok(Some(event.id))
}

/// Next instant on `weekday` at `time` in the user's timezone; `PAST`
/// when today's match has already gone by.
fn resolve_one_off(
    weekday: Weekday,
    time: NaiveTime,
    tz: Tz,
    now: DateTime<Utc>,
) -> RuntimeResult<DateTime<Utc>> {
    let today = now.with_timezone(&tz).date_naive();
    let target = weekday.to_chrono();
    let mut day: NaiveDate = today;
    while day.weekday() != target {
        day = day
            .succ_opt()
            .ok_or_else(|| RuntimeError::Validation("date out of range".into()))?;
    }
    let instant = to_utc(day.and_time(time), tz);
    if instant <= now {
        return Err(RuntimeError::Past);
    }
    Ok(instant)
}

fn to_utc(naive: chrono::NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    use chrono::TimeZone;
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
        chrono::LocalResult::None => Utc.from_utc_datetime(&naive),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};
    use qzwhatnext_foundation::persistence::{MemoryStore, SeriesStore, TaskStore};

    fn now() -> DateTime<Utc> {
        // Monday 2026-03-02, 09:00 UTC.
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn series_capture_upserts_and_materializes() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();

        let outcome = capture_instruction(
            &store,
            None,
            user,
            "take my vitamins every morning",
            None,
            "UTC",
            now(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.action, "created");
        assert_eq!(outcome.entity_kind, "task_series");
        assert_eq!(outcome.tasks_created, Some(1));

        let series = store.list_active_series(user).await.unwrap();
        assert_eq!(series.len(), 1);
        let open = store
            .open_tasks_for_series(user, outcome.entity_id)
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
    }

    #[tokio::test]
    async fn series_capture_twice_does_not_accumulate() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();

        let first = capture_instruction(&store, None, user, "stretch daily", None, "UTC", now())
            .await
            .unwrap();
        assert_eq!(first.tasks_created, Some(1));

        // Capturing a second series materializes only its own occurrence.
        let second =
            capture_instruction(&store, None, user, "journal every evening", None, "UTC", now())
                .await
                .unwrap();
        assert_eq!(second.tasks_created, Some(1));
    }

    #[tokio::test]
    async fn update_with_unknown_entity_id_is_not_found() {
        let store = MemoryStore::new();
        let err = capture_instruction(
            &store,
            None,
            Uuid::new_v4(),
            "stretch daily",
            Some(Uuid::new_v4()),
            "UTC",
            now(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn update_series_rewrites_template() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let created = capture_instruction(&store, None, user, "stretch daily", None, "UTC", now())
            .await
            .unwrap();

        let updated = capture_instruction(
            &store,
            None,
            user,
            "stretch every 2 days",
            Some(created.entity_id),
            "UTC",
            now(),
        )
        .await
        .unwrap();
        assert_eq!(updated.action, "updated");
        assert_eq!(updated.entity_id, created.entity_id);

        let series = store
            .get_series(user, created.entity_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(series.recurrence_preset.interval, 2);
    }

    #[tokio::test]
    async fn deferred_capture_creates_start_after_task() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();

        let outcome = capture_instruction(
            &store,
            None,
            user,
            "clean the garage sometime next week",
            None,
            "UTC",
            now(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.entity_kind, "deferred_task");
        let task = store.get_task(user, outcome.entity_id).await.unwrap().unwrap();
        let start_after = task.start_after.unwrap();
        assert_eq!(start_after.weekday(), chrono::Weekday::Mon);
        assert!(start_after > now().date_naive());
        assert!(task.recurrence_series_id.is_none());
    }

    #[test]
    fn one_off_resolution_rejects_past_instants() {
        // now() is Monday 09:00 UTC; Monday 08:00 is already gone.
        let err = resolve_one_off(
            Weekday::Mo,
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            chrono_tz::UTC,
            now(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "PARSE_PAST");

        // Monday 15:00 is still ahead.
        let instant = resolve_one_off(
            Weekday::Mo,
            NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            chrono_tz::UTC,
            now(),
        )
        .unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap());
    }

    #[test]
    fn one_off_resolution_honors_timezone() {
        // 2:30pm New York == 19:30 UTC (EST, early March).
        let instant = resolve_one_off(
            Weekday::Tu,
            NaiveTime::from_hms_opt(14, 30, 0).unwrap(),
            chrono_tz::America::New_York,
            now(),
        )
        .unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2026, 3, 3, 19, 30, 0).unwrap());
    }
}
