//! Plan rebuild — ranked open tasks laid onto the horizon.
//!
//! Reservations come from three sources: external calendar events not
//! marked managed, locked blocks already placed (their tasks leave the
//! ranked input), and active recurring time blocks expanded locally.
//! The rebuild replaces all unlocked blocks in a single transaction.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

use qzwhatnext_foundation::calendar::{CalendarEvent, CalendarGateway};
use qzwhatnext_foundation::persistence::{BlockStore, Store, TaskStore, TimeBlockStore};
use qzwhatnext_kernel::engine::{Horizon, ScheduleOutcome, schedule_tasks, stack_rank};
use qzwhatnext_kernel::model::{RecurringTimeBlock, ScheduledBlock, Task};
use qzwhatnext_kernel::recurrence::occurs_on_day;

use crate::error::{RuntimeError, RuntimeResult};

/// Result of one rebuild.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub blocks: Vec<ScheduledBlock>,
    pub overflow: Vec<Task>,
    pub start_time: DateTime<Utc>,
    /// The open tasks the plan was built from, by id.
    pub tasks: HashMap<Uuid, Task>,
}

impl PlanOutcome {
    /// Task titles for blocks, for responses and event summaries.
    pub fn task_titles(&self) -> HashMap<Uuid, String> {
        self.tasks
            .iter()
            .map(|(id, task)| (*id, task.title.clone()))
            .collect()
    }
}

/// Rebuild the plan for a user and persist it.
///
/// `time_zone` is the user's calendar timezone id; it affects due-by
/// ranking and recurring time block expansion.
pub async fn rebuild_plan(
    store: &dyn Store,
    gateway: &dyn CalendarGateway,
    user_id: Uuid,
    horizon: Horizon,
    time_zone: &str,
    now: DateTime<Utc>,
) -> RuntimeResult<PlanOutcome> {
    let open_tasks = store.list_open_tasks(user_id).await?;
    if open_tasks.is_empty() {
        return Err(RuntimeError::NoTasks);
    }

    // Calendar events that are not ours act as reserved time.
    let events = gateway
        .list_events_in_range(horizon.start, horizon.end)
        .await?;
    let mut reservations = reservations_from_events(&events);

    // Locked blocks stay exactly where they are; their tasks are already
    // placed and must not be scheduled again. Unlocked blocks are about
    // to be regenerated, but their calendar linkage must survive the
    // rebuild (block ids are deterministic), or every rebuild would
    // orphan its events.
    let existing = store.list_blocks(user_id).await?;
    let mut locked_task_ids: HashSet<Uuid> = HashSet::new();
    let mut locked_blocks: Vec<ScheduledBlock> = Vec::new();
    let mut calendar_meta: HashMap<Uuid, ScheduledBlock> = HashMap::new();
    for block in existing {
        if block.locked {
            reservations.push((block.start_time, block.end_time));
            locked_task_ids.insert(block.entity_id);
            locked_blocks.push(block);
        } else if block.calendar_event_id.is_some() {
            calendar_meta.insert(block.id, block);
        }
    }

    // Recurring time blocks are hard reservations even when their
    // calendar event is missing.
    let time_blocks = store.list_active_time_blocks(user_id).await?;
    let tz: Tz = time_zone.parse().unwrap_or(chrono_tz::UTC);
    for block in &time_blocks {
        reservations.extend(expand_time_block(block, horizon, tz));
    }

    let ranked = stack_rank(&open_tasks, now, time_zone);
    let mut outcome: ScheduleOutcome =
        schedule_tasks(&ranked, horizon, &reservations, &locked_task_ids);

    for block in &mut outcome.blocks {
        if let Some(previous) = calendar_meta.get(&block.id) {
            block.calendar_event_id = previous.calendar_event_id.clone();
            block.calendar_event_etag = previous.calendar_event_etag.clone();
            block.calendar_event_updated_at = previous.calendar_event_updated_at;
        }
    }

    store
        .replace_unlocked_blocks(user_id, &outcome.blocks)
        .await?;

    debug!(
        user_id = %user_id,
        placed = outcome.blocks.len(),
        overflow = outcome.overflow.len(),
        locked = locked_blocks.len(),
        "rebuilt plan"
    );

    let tasks: HashMap<Uuid, Task> = open_tasks.into_iter().map(|t| (t.id, t)).collect();

    let mut blocks = outcome.blocks;
    blocks.extend(locked_blocks);
    blocks.sort_by_key(|b| (b.start_time, b.id));

    Ok(PlanOutcome {
        blocks,
        overflow: outcome.overflow,
        start_time: horizon.start,
        tasks,
    })
}

/// Non-managed events become reservations; cancelled ones do not.
pub fn reservations_from_events(
    events: &[CalendarEvent],
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    events
        .iter()
        .filter(|event| !event.is_managed() && !event.is_cancelled())
        .filter_map(|event| Some((event.start?, event.end?)))
        .collect()
}

/// Expand a recurring time block into concrete intervals over the
/// horizon, interpreting its times in the user's timezone.
fn expand_time_block(
    block: &RecurringTimeBlock,
    horizon: Horizon,
    tz: Tz,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let preset = &block.recurrence_preset;
    let (Some(time_start), Some(time_end)) = (preset.time_start, preset.time_end) else {
        return Vec::new();
    };

    let mut intervals = Vec::new();
    let mut day = horizon.start.date_naive();
    let end_day = horizon.end.date_naive();
    while day <= end_day {
        if occurs_on_day(preset, day) {
            let start = local_instant(day.and_time(time_start), tz);
            let mut end = local_instant(day.and_time(time_end), tz);
            if time_end <= time_start {
                end += Duration::days(1);
            }
            if end > horizon.start && start < horizon.end {
                intervals.push((start, end));
            }
        }
        let Some(next) = day.succ_opt() else { break };
        day = next;
    }
    intervals
}

fn local_instant(naive: chrono::NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    use chrono::TimeZone;
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
        chrono::LocalResult::None => Utc.from_utc_datetime(&naive),
    }
}
