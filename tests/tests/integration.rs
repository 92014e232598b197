//! End-to-end scenarios over the in-memory store and scripted calendar.

use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

use qzwhatnext_foundation::persistence::{
    BlockStore, MemoryStore, SeriesStore, TaskStore, TimeBlockStore,
};
use qzwhatnext_kernel::engine::Horizon;
use qzwhatnext_kernel::model::{
    RecurFrequency, RecurrencePreset, RecurringTaskSeries, Task, TaskStatus, TimeOfDayWindow,
    Weekday,
};
use qzwhatnext_kernel::recurrence::{
    CaptureAction, parse_capture_instruction, preset_to_rrule,
};
use qzwhatnext_runtime::capture::capture_instruction;
use qzwhatnext_runtime::materializer::materialize_recurring_tasks;
use qzwhatnext_runtime::planner::rebuild_plan;
use qzwhatnext_runtime::reconciler::reconcile;

use qzwhatnext_testing::{FakeCalendar, at, fixed_now, seed_task};

fn task_with_created_at(user: Uuid, title: &str, minutes: u32, offset_min: i64) -> Task {
    let mut task = Task::new(user, "api", title, fixed_now() + Duration::minutes(offset_min))
        .with_duration(minutes);
    task.created_at = fixed_now() + Duration::minutes(offset_min);
    task
}

// ── Scenario: overflow ───────────────────────────────────────────────────

#[tokio::test]
async fn overflow_with_90_minute_horizon() {
    let store = MemoryStore::new();
    let calendar = FakeCalendar::new();
    let user = Uuid::new_v4();

    let first = task_with_created_at(user, "first", 60, 0);
    let second = task_with_created_at(user, "second", 60, 1);
    store.create_task(&first).await.unwrap();
    store.create_task(&second).await.unwrap();

    let horizon = Horizon::new(at(10, 0), at(11, 30));
    let plan = rebuild_plan(&store, &calendar, user, horizon, "UTC", fixed_now())
        .await
        .unwrap();

    let first_blocks: Vec<_> = plan
        .blocks
        .iter()
        .filter(|b| b.entity_id == first.id)
        .collect();
    assert_eq!(first_blocks.len(), 2);
    assert_eq!(first_blocks[0].start_time, at(10, 0));
    assert_eq!(first_blocks[0].end_time, at(10, 30));
    assert_eq!(first_blocks[1].start_time, at(10, 30));
    assert_eq!(first_blocks[1].end_time, at(11, 0));

    assert_eq!(plan.overflow.len(), 1);
    assert_eq!(plan.overflow[0].id, second.id);
}

// ── Scenario: reservation gap ────────────────────────────────────────────

#[tokio::test]
async fn reservation_pushes_task_or_overflows() {
    let user = Uuid::new_v4();

    // Horizon [10:00, 12:00): the 60-minute task cannot fit around the
    // user's 10:15-11:15 event.
    let store = MemoryStore::new();
    let calendar = FakeCalendar::new();
    calendar.seed_user_event("errand", at(10, 15), at(11, 15));
    let task = task_with_created_at(user, "deep work", 60, 0);
    store.create_task(&task).await.unwrap();

    let tight = rebuild_plan(
        &store,
        &calendar,
        user,
        Horizon::new(at(10, 0), at(12, 0)),
        "UTC",
        fixed_now(),
    )
    .await
    .unwrap();
    assert!(tight.blocks.is_empty());
    assert_eq!(tight.overflow.len(), 1);

    // Extending the horizon to 12:30 fits it right after the event.
    let roomy = rebuild_plan(
        &store,
        &calendar,
        user,
        Horizon::new(at(10, 0), at(12, 30)),
        "UTC",
        fixed_now(),
    )
    .await
    .unwrap();
    assert_eq!(roomy.blocks.len(), 2);
    assert_eq!(roomy.blocks[0].start_time, at(11, 15));
    assert_eq!(roomy.blocks[0].end_time, at(11, 45));
    assert_eq!(roomy.blocks[1].start_time, at(11, 45));
    assert_eq!(roomy.blocks[1].end_time, at(12, 15));
    assert!(roomy.overflow.is_empty());
}

// ── Scenario: habit non-accumulation ─────────────────────────────────────

#[tokio::test]
async fn habit_materializes_once_then_rolls_missed() {
    let store = MemoryStore::new();
    let user = Uuid::new_v4();

    let preset = RecurrencePreset {
        time_of_day_window: Some(TimeOfDayWindow::WakeUp),
        ..RecurrencePreset::new(RecurFrequency::Daily)
    };
    let series = RecurringTaskSeries::new(user, "meditate", preset, fixed_now());
    store.upsert_series(&series).await.unwrap();

    // Inside Monday's wake-up window (05:00-06:30).
    let monday_early = Utc.with_ymd_and_hms(2026, 3, 2, 5, 30, 0).unwrap();

    let first = materialize_recurring_tasks(
        &store,
        user,
        monday_early,
        monday_early + Duration::days(7),
        monday_early,
    )
    .await
    .unwrap();
    assert_eq!(first, 1);

    let second = materialize_recurring_tasks(
        &store,
        user,
        monday_early,
        monday_early + Duration::days(7),
        monday_early,
    )
    .await
    .unwrap();
    assert_eq!(second, 0);
    assert_eq!(
        store.open_tasks_for_series(user, series.id).await.unwrap().len(),
        1
    );

    // Tuesday morning, after Monday's window elapsed: the stale
    // occurrence rolls to missed and exactly one new open one appears.
    let tuesday = Utc.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap();
    let third = materialize_recurring_tasks(
        &store,
        user,
        tuesday,
        tuesday + Duration::days(7),
        tuesday,
    )
    .await
    .unwrap();
    assert_eq!(third, 1);

    let all = store.list_tasks(user).await.unwrap();
    let missed: Vec<_> = all.iter().filter(|t| t.status == TaskStatus::Missed).collect();
    let open: Vec<_> = all.iter().filter(|t| t.status == TaskStatus::Open).collect();
    assert_eq!(missed.len(), 1);
    assert_eq!(open.len(), 1);
    assert_eq!(
        open[0].recurrence_occurrence_start.unwrap().date_naive(),
        NaiveDate::from_ymd_opt(2026, 3, 3).unwrap()
    );
}

// ── Scenario: calendar edit locks block ──────────────────────────────────

#[tokio::test]
async fn calendar_edit_is_imported_and_locks_block() {
    let store = MemoryStore::new();
    let calendar = FakeCalendar::new();
    let user = Uuid::new_v4();
    seed_task(&store, user, "deep work", 30).await;

    let horizon = Horizon::days_from(at(10, 0), 7);
    reconcile(&store, &calendar, user, horizon, "UTC", fixed_now())
        .await
        .unwrap();

    let block = store.list_blocks(user).await.unwrap().remove(0);
    assert_eq!(block.start_time, at(10, 0));
    let event_id = block.calendar_event_id.clone().unwrap();

    // User drags the event to the afternoon.
    calendar.user_moves_event(&event_id, at(14, 0), at(14, 30));

    let pass = reconcile(&store, &calendar, user, horizon, "UTC", fixed_now())
        .await
        .unwrap();
    assert_eq!(pass.blocks_imported, 1);

    let block = store.get_block(user, block.id).await.unwrap().unwrap();
    assert!(block.locked);
    assert_eq!(block.start_time, at(14, 0));
    assert_eq!(block.end_time, at(14, 30));

    // No further writes on the next pass.
    let writes_before = calendar.writes();
    let quiet = reconcile(&store, &calendar, user, horizon, "UTC", fixed_now())
        .await
        .unwrap();
    assert_eq!(quiet.writes(), 0);
    assert_eq!(calendar.writes(), writes_before);
}

// ── Scenario: calendar deletion recreates ────────────────────────────────

#[tokio::test]
async fn deleted_managed_event_is_recreated() {
    let store = MemoryStore::new();
    let calendar = FakeCalendar::new();
    let user = Uuid::new_v4();
    seed_task(&store, user, "deep work", 30).await;

    let horizon = Horizon::days_from(at(10, 0), 7);
    reconcile(&store, &calendar, user, horizon, "UTC", fixed_now())
        .await
        .unwrap();
    let block = store.list_blocks(user).await.unwrap().remove(0);
    let old_event_id = block.calendar_event_id.clone().unwrap();

    calendar.user_deletes_event(&old_event_id);

    let pass = reconcile(&store, &calendar, user, horizon, "UTC", fixed_now())
        .await
        .unwrap();
    assert_eq!(pass.events_created, 1);

    let block = store.get_block(user, block.id).await.unwrap().unwrap();
    let new_event_id = block.calendar_event_id.unwrap();
    assert_ne!(new_event_id, old_event_id);
    assert!(calendar.event(&new_event_id).is_some());
}

// ── Scenario: parser determinism ─────────────────────────────────────────

#[test]
fn parser_resolves_kids_practice_literally() {
    let parsed =
        parse_capture_instruction("kids practice tues and thurs 2:30pm", fixed_now()).unwrap();
    assert_eq!(parsed.entity_kind(), "time_block");
    let CaptureAction::TimeBlock { preset } = parsed.action else {
        panic!("expected a time block");
    };
    assert_eq!(preset.frequency, RecurFrequency::Weekly);
    assert_eq!(preset.by_weekday, Some(vec![Weekday::Tu, Weekday::Th]));
    assert_eq!(preset.time_start, NaiveTime::from_hms_opt(14, 30, 0));
    assert_eq!(preset.time_end, NaiveTime::from_hms_opt(15, 30, 0));

    // Same input, same output.
    let again =
        parse_capture_instruction("kids practice tues and thurs 2:30pm", fixed_now()).unwrap();
    assert_eq!(parsed.title, again.title);
}

// ── Scenario: reconciler idempotence at scale ────────────────────────────

#[tokio::test]
async fn second_reconcile_pass_performs_zero_writes() {
    let store = MemoryStore::new();
    let calendar = FakeCalendar::new();
    let user = Uuid::new_v4();

    for (i, (title, minutes)) in [("alpha", 60), ("beta", 30), ("gamma", 90)]
        .iter()
        .enumerate()
    {
        store
            .create_task(&task_with_created_at(user, title, *minutes, i as i64))
            .await
            .unwrap();
    }
    calendar.seed_user_event("standup", at(10, 0), at(10, 30));

    let horizon = Horizon::days_from(at(10, 0), 7);
    let first = reconcile(&store, &calendar, user, horizon, "UTC", fixed_now())
        .await
        .unwrap();
    assert_eq!(first.events_created, 6); // 2 + 1 + 3 blocks

    let writes_before = calendar.writes();
    let second = reconcile(&store, &calendar, user, horizon, "UTC", fixed_now())
        .await
        .unwrap();
    assert_eq!(second.writes(), 0);
    assert_eq!(second.events_created, 0);
    assert_eq!(calendar.writes(), writes_before);

    // The user's own event survived untouched.
    assert!(calendar
        .all_events()
        .iter()
        .any(|e| e.summary.as_deref() == Some("standup")));
}

// ── Scenario: capture → time block write-through with RRULE ──────────────

#[tokio::test]
async fn time_block_capture_writes_recurring_event() {
    let store = MemoryStore::new();
    let calendar = FakeCalendar::new();
    let user = Uuid::new_v4();

    let outcome = capture_instruction(
        &store,
        Some(&calendar),
        user,
        "kids practice tues and thurs 2:30pm",
        None,
        "UTC",
        fixed_now(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.entity_kind, "time_block");
    let event_id = outcome.calendar_event_id.expect("event written through");
    let event = calendar.event(&event_id).unwrap();
    // Not managed: the planner must treat it as reserved time.
    assert!(!event.is_managed());

    let block = store
        .get_time_block(user, outcome.entity_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(block.calendar_event_id.as_deref(), Some(event_id.as_str()));

    // RRULE export retains frequency and weekdays.
    let rrule = preset_to_rrule(&block.recurrence_preset);
    assert_eq!(rrule, "FREQ=WEEKLY;BYDAY=TU,TH");

    // Re-capturing the same block patches rather than recreating.
    let inserts_before = calendar.inserts();
    let updated = capture_instruction(
        &store,
        Some(&calendar),
        user,
        "kids practice tues and thurs 3pm",
        Some(outcome.entity_id),
        "UTC",
        fixed_now(),
    )
    .await
    .unwrap();
    assert_eq!(updated.action, "updated");
    assert_eq!(calendar.inserts(), inserts_before);
    assert!(calendar.patches() >= 1);
}

// ── Scenario: recurring time block reserves schedule time ────────────────

#[tokio::test]
async fn captured_time_block_blocks_out_the_planner() {
    let store = MemoryStore::new();
    let calendar = FakeCalendar::new();
    let user = Uuid::new_v4();

    // Daily 10:00-11:00 reservation, captured without a calendar.
    capture_instruction(
        &store,
        None,
        user,
        "focus hour daily 10am to 11am",
        None,
        "UTC",
        fixed_now(),
    )
    .await
    .unwrap();

    let task = task_with_created_at(user, "deep work", 30, 0);
    store.create_task(&task).await.unwrap();

    let plan = rebuild_plan(
        &store,
        &calendar,
        user,
        Horizon::days_from(at(10, 0), 1),
        "UTC",
        fixed_now(),
    )
    .await
    .unwrap();

    // The 10:00-11:00 hour is reserved; the task lands at 11:00.
    assert_eq!(plan.blocks[0].start_time, at(11, 0));
}
