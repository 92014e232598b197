//! Calendar reconciliation — one event per scheduled block, user edits
//! respected.
//!
//! Per pass: rebuild the plan, then walk the blocks in `(start_time,
//! id)` order diffing each against its calendar event. A user edit
//! (ETag/updated drift that includes a time move) is imported and the
//! block locked; anything else we own is patched or recreated. Managed
//! events whose block left the plan are deleted. Running twice with no
//! external change performs zero writes on the second pass.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

use qzwhatnext_foundation::calendar::{
    CalendarGateway, EventDraft, EventPatch, PRIVATE_KEY_BLOCK_ID, PRIVATE_KEY_MANAGED,
    PRIVATE_KEY_TASK_ID,
};
use qzwhatnext_foundation::persistence::{BlockStore, Store};
use qzwhatnext_kernel::engine::Horizon;
use qzwhatnext_kernel::model::{EntityType, ScheduledBlock, Task};

use crate::error::RuntimeResult;
use crate::planner::rebuild_plan;

/// What a reconcile pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncOutcome {
    pub events_created: usize,
    pub events_patched: usize,
    pub events_deleted: usize,
    /// Blocks whose times were imported from a user edit (and locked).
    pub blocks_imported: usize,
    pub event_ids: Vec<String>,
}

impl SyncOutcome {
    /// Total calendar writes this pass performed.
    pub fn writes(&self) -> usize {
        self.events_created + self.events_patched + self.events_deleted
    }
}

/// Run one reconcile pass for a user.
pub async fn reconcile(
    store: &dyn Store,
    gateway: &dyn CalendarGateway,
    user_id: Uuid,
    horizon: Horizon,
    time_zone: &str,
    now: DateTime<Utc>,
) -> RuntimeResult<SyncOutcome> {
    let plan = rebuild_plan(store, gateway, user_id, horizon, time_zone, now).await?;
    let mut outcome = SyncOutcome::default();

    // Blocks come back ordered by (start_time, id); keep that order so
    // event creation is deterministic and logs are tailable.
    for block in &plan.blocks {
        if block.entity_type != EntityType::Task {
            continue;
        }
        let task = plan.tasks.get(&block.entity_id);
        sync_block(store, gateway, user_id, block, task, &mut outcome).await?;
    }

    delete_orphans(gateway, horizon, &plan.blocks, &mut outcome).await?;

    info!(
        user_id = %user_id,
        created = outcome.events_created,
        patched = outcome.events_patched,
        deleted = outcome.events_deleted,
        imported = outcome.blocks_imported,
        "reconcile pass complete"
    );
    Ok(outcome)
}

async fn sync_block(
    store: &dyn Store,
    gateway: &dyn CalendarGateway,
    user_id: Uuid,
    block: &ScheduledBlock,
    task: Option<&Task>,
    outcome: &mut SyncOutcome,
) -> RuntimeResult<()> {
    let summary = task
        .map(|t| t.title.clone())
        .unwrap_or_else(|| format!("Task {}", block.entity_id));
    let description = task.and_then(|t| t.notes.clone());

    let Some(event_id) = block.calendar_event_id.clone() else {
        create_event(store, gateway, user_id, block, &summary, &description, outcome).await?;
        return Ok(());
    };

    let Some(event) = gateway.get_event(&event_id).await? else {
        // Deleted from the calendar; repair by recreating.
        debug!(block_id = %block.id, "event missing upstream; recreating");
        create_event(store, gateway, user_id, block, &summary, &description, outcome).await?;
        return Ok(());
    };
    if event.is_cancelled() {
        create_event(store, gateway, user_id, block, &summary, &description, outcome).await?;
        return Ok(());
    }

    let time_moved =
        event.start != Some(block.start_time) || event.end != Some(block.end_time);
    let summary_differs = event.summary.as_deref() != Some(summary.as_str());
    if !time_moved && !summary_differs {
        return Ok(());
    }

    let etag_drifted = event.etag != block.calendar_event_etag
        || event.updated != block.calendar_event_updated_at;

    if etag_drifted && time_moved {
        // The user moved the event: their times win, and the block
        // freezes so a rebuild cannot move it back.
        let start = event.start.unwrap_or(block.start_time);
        let end = event.end.unwrap_or(block.end_time);
        store
            .update_block_times(user_id, block.id, start, end, true)
            .await?;
        store
            .update_block_calendar_meta(
                user_id,
                block.id,
                None,
                Some(event.etag.clone()),
                Some(event.updated),
            )
            .await?;
        outcome.blocks_imported += 1;
        info!(block_id = %block.id, "imported calendar edit; block locked");
        return Ok(());
    }

    // Our plan wins: patch the event back to the block.
    let patched = gateway
        .patch_event(
            &event_id,
            &EventPatch {
                summary: summary_differs.then_some(summary),
                start: Some(block.start_time),
                end: Some(block.end_time),
            },
        )
        .await?;
    store
        .update_block_calendar_meta(
            user_id,
            block.id,
            None,
            Some(patched.etag.clone()),
            Some(patched.updated),
        )
        .await?;
    outcome.events_patched += 1;
    Ok(())
}

async fn create_event(
    store: &dyn Store,
    gateway: &dyn CalendarGateway,
    user_id: Uuid,
    block: &ScheduledBlock,
    summary: &str,
    description: &Option<String>,
    outcome: &mut SyncOutcome,
) -> RuntimeResult<()> {
    let mut private = HashMap::new();
    private.insert(PRIVATE_KEY_TASK_ID.to_string(), block.entity_id.to_string());
    private.insert(PRIVATE_KEY_BLOCK_ID.to_string(), block.id.to_string());
    private.insert(PRIVATE_KEY_MANAGED.to_string(), "1".to_string());

    let event = gateway
        .insert_event(&EventDraft {
            summary: summary.to_string(),
            description: description.clone(),
            start: block.start_time,
            end: block.end_time,
            time_zone: None,
            recurrence: None,
            private,
        })
        .await?;

    store
        .update_block_calendar_meta(
            user_id,
            block.id,
            Some(Some(event.id.clone())),
            Some(event.etag.clone()),
            Some(event.updated),
        )
        .await?;

    outcome.event_ids.push(event.id);
    outcome.events_created += 1;
    Ok(())
}

/// Delete managed events whose block is no longer part of the plan.
async fn delete_orphans(
    gateway: &dyn CalendarGateway,
    horizon: Horizon,
    blocks: &[ScheduledBlock],
    outcome: &mut SyncOutcome,
) -> RuntimeResult<()> {
    let plan_block_ids: HashSet<String> = blocks.iter().map(|b| b.id.to_string()).collect();

    let events = gateway
        .list_events_in_range(horizon.start, horizon.end)
        .await?;
    for event in events {
        if !event.is_managed() || event.is_cancelled() {
            continue;
        }
        let in_plan = event
            .block_id()
            .is_some_and(|id| plan_block_ids.contains(id));
        if !in_plan {
            gateway.delete_event(&event.id).await?;
            outcome.events_deleted += 1;
            debug!(event_id = %event.id, "deleted orphan managed event");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use qzwhatnext_foundation::calendar::{CalendarEvent, CalendarResult};
    use qzwhatnext_foundation::persistence::{BlockStore, MemoryStore, TaskStore};
    use std::sync::Mutex;

    /// Scripted in-memory calendar with write counters.
    #[derive(Default)]
    struct FakeCalendar {
        events: Mutex<HashMap<String, CalendarEvent>>,
        seq: Mutex<u64>,
        inserts: Mutex<usize>,
        patches: Mutex<usize>,
        deletes: Mutex<usize>,
    }

    impl FakeCalendar {
        fn writes(&self) -> usize {
            *self.inserts.lock().unwrap()
                + *self.patches.lock().unwrap()
                + *self.deletes.lock().unwrap()
        }

        /// Simulate the user moving an event in their calendar UI.
        fn user_moves_event(&self, event_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) {
            let mut events = self.events.lock().unwrap();
            let event = events.get_mut(event_id).expect("event exists");
            event.start = Some(start);
            event.end = Some(end);
            event.etag = Some(format!("\"user-edit-{event_id}\""));
            event.updated = event.updated.map(|u| u + Duration::minutes(5));
        }

        /// Simulate the user deleting an event in their calendar UI.
        fn user_deletes_event(&self, event_id: &str) {
            self.events.lock().unwrap().remove(event_id);
        }

        fn next_etag(&self) -> String {
            let mut seq = self.seq.lock().unwrap();
            *seq += 1;
            format!("\"etag-{}\"", *seq)
        }
    }

    #[async_trait]
    impl CalendarGateway for FakeCalendar {
        async fn get_event(&self, event_id: &str) -> CalendarResult<Option<CalendarEvent>> {
            Ok(self.events.lock().unwrap().get(event_id).cloned())
        }

        async fn insert_event(&self, draft: &EventDraft) -> CalendarResult<CalendarEvent> {
            *self.inserts.lock().unwrap() += 1;
            let id = format!("evt-{}", *self.seq.lock().unwrap() + 1);
            let event = CalendarEvent {
                id: id.clone(),
                etag: Some(self.next_etag()),
                status: Some("confirmed".into()),
                summary: Some(draft.summary.clone()),
                description: draft.description.clone(),
                start: Some(draft.start),
                end: Some(draft.end),
                updated: Some(Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap()),
                private: draft.private.clone(),
            };
            self.events.lock().unwrap().insert(id, event.clone());
            Ok(event)
        }

        async fn patch_event(
            &self,
            event_id: &str,
            patch: &EventPatch,
        ) -> CalendarResult<CalendarEvent> {
            *self.patches.lock().unwrap() += 1;
            let etag = self.next_etag();
            let mut events = self.events.lock().unwrap();
            let event = events.get_mut(event_id).expect("patched event exists");
            if let Some(summary) = &patch.summary {
                event.summary = Some(summary.clone());
            }
            if let Some(start) = patch.start {
                event.start = Some(start);
            }
            if let Some(end) = patch.end {
                event.end = Some(end);
            }
            event.etag = Some(etag);
            event.updated = event.updated.map(|u| u + Duration::seconds(1));
            Ok(event.clone())
        }

        async fn delete_event(&self, event_id: &str) -> CalendarResult<()> {
            *self.deletes.lock().unwrap() += 1;
            self.events.lock().unwrap().remove(event_id);
            Ok(())
        }

        async fn list_events_in_range(
            &self,
            time_min: DateTime<Utc>,
            time_max: DateTime<Utc>,
        ) -> CalendarResult<Vec<CalendarEvent>> {
            let events = self.events.lock().unwrap();
            let mut out: Vec<CalendarEvent> = events
                .values()
                .filter(|e| {
                    matches!((e.start, e.end), (Some(start), Some(end))
                        if start < time_max && end > time_min)
                })
                .cloned()
                .collect();
            out.sort_by_key(|e| (e.start, e.id.clone()));
            Ok(out)
        }

        async fn free_busy(
            &self,
            _time_min: DateTime<Utc>,
            _time_max: DateTime<Utc>,
        ) -> CalendarResult<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
            Ok(Vec::new())
        }

        async fn timezone(&self) -> CalendarResult<String> {
            Ok("UTC".to_string())
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    async fn seed_task(store: &MemoryStore, user: Uuid, title: &str, minutes: u32) -> Task {
        let task = Task::new(user, "api", title, at(8, 0)).with_duration(minutes);
        store.create_task(&task).await.unwrap();
        task
    }

    fn horizon() -> Horizon {
        Horizon::days_from(at(10, 0), 7)
    }

    #[tokio::test]
    async fn first_pass_creates_then_second_pass_is_quiet() {
        let store = MemoryStore::new();
        let calendar = FakeCalendar::default();
        let user = Uuid::new_v4();
        seed_task(&store, user, "write report", 60).await;

        let first = reconcile(&store, &calendar, user, horizon(), "UTC", at(9, 0))
            .await
            .unwrap();
        assert_eq!(first.events_created, 2);
        assert_eq!(first.event_ids.len(), 2);

        let writes_before = calendar.writes();
        let second = reconcile(&store, &calendar, user, horizon(), "UTC", at(9, 0))
            .await
            .unwrap();
        assert_eq!(second.writes(), 0);
        assert_eq!(calendar.writes(), writes_before);
    }

    #[tokio::test]
    async fn user_edit_imports_times_and_locks_block() {
        let store = MemoryStore::new();
        let calendar = FakeCalendar::default();
        let user = Uuid::new_v4();
        seed_task(&store, user, "deep work", 30).await;

        reconcile(&store, &calendar, user, horizon(), "UTC", at(9, 0))
            .await
            .unwrap();
        let block = store.list_blocks(user).await.unwrap().remove(0);
        let event_id = block.calendar_event_id.clone().unwrap();
        assert_eq!(block.start_time, at(10, 0));

        // User drags the event to the afternoon.
        calendar.user_moves_event(&event_id, at(14, 0), at(14, 30));

        let pass = reconcile(&store, &calendar, user, horizon(), "UTC", at(9, 0))
            .await
            .unwrap();
        assert_eq!(pass.blocks_imported, 1);

        let block = store.get_block(user, block.id).await.unwrap().unwrap();
        assert!(block.locked);
        assert_eq!(block.start_time, at(14, 0));
        assert_eq!(block.end_time, at(14, 30));

        // Subsequent pass: nothing to do.
        let quiet = reconcile(&store, &calendar, user, horizon(), "UTC", at(9, 0))
            .await
            .unwrap();
        assert_eq!(quiet.writes(), 0);
        assert_eq!(quiet.blocks_imported, 0);
    }

    #[tokio::test]
    async fn deleted_event_is_recreated() {
        let store = MemoryStore::new();
        let calendar = FakeCalendar::default();
        let user = Uuid::new_v4();
        seed_task(&store, user, "deep work", 30).await;

        reconcile(&store, &calendar, user, horizon(), "UTC", at(9, 0))
            .await
            .unwrap();
        let block = store.list_blocks(user).await.unwrap().remove(0);
        let old_event_id = block.calendar_event_id.clone().unwrap();

        calendar.user_deletes_event(&old_event_id);

        let pass = reconcile(&store, &calendar, user, horizon(), "UTC", at(9, 0))
            .await
            .unwrap();
        assert_eq!(pass.events_created, 1);

        let block = store.get_block(user, block.id).await.unwrap().unwrap();
        let new_event_id = block.calendar_event_id.clone().unwrap();
        assert_ne!(new_event_id, old_event_id);
        assert!(calendar.events.lock().unwrap().contains_key(&new_event_id));
    }

    #[tokio::test]
    async fn orphan_managed_events_are_deleted() {
        let store = MemoryStore::new();
        let calendar = FakeCalendar::default();
        let user = Uuid::new_v4();
        seed_task(&store, user, "deep work", 30).await;

        // A stale managed event pointing at a block that no plan contains.
        let mut private = HashMap::new();
        private.insert(PRIVATE_KEY_BLOCK_ID.to_string(), Uuid::new_v4().to_string());
        private.insert(PRIVATE_KEY_MANAGED.to_string(), "1".to_string());
        calendar
            .insert_event(&EventDraft {
                summary: "stale".into(),
                start: at(16, 0),
                end: at(16, 30),
                private,
                ..Default::default()
            })
            .await
            .unwrap();

        let pass = reconcile(&store, &calendar, user, horizon(), "UTC", at(9, 0))
            .await
            .unwrap();
        assert_eq!(pass.events_deleted, 1);
        let remaining = calendar.events.lock().unwrap();
        assert!(remaining.values().all(|e| e.summary.as_deref() != Some("stale")));
    }

    #[tokio::test]
    async fn user_events_reserve_time_and_are_never_deleted() {
        let store = MemoryStore::new();
        let calendar = FakeCalendar::default();
        let user = Uuid::new_v4();
        seed_task(&store, user, "deep work", 30).await;

        // A plain user event at the front of the horizon.
        calendar
            .insert_event(&EventDraft {
                summary: "standup".into(),
                start: at(10, 0),
                end: at(10, 30),
                ..Default::default()
            })
            .await
            .unwrap();

        let pass = reconcile(&store, &calendar, user, horizon(), "UTC", at(9, 0))
            .await
            .unwrap();
        assert_eq!(pass.events_deleted, 0);

        // Our block landed after the user's event.
        let block = store.list_blocks(user).await.unwrap().remove(0);
        assert_eq!(block.start_time, at(10, 30));
        let events = calendar.events.lock().unwrap();
        assert!(events.values().any(|e| e.summary.as_deref() == Some("standup")));
    }
}
