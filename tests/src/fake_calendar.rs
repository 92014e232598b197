//! Scripted in-memory calendar gateway.
//!
//! Behaves like the real one at the seam level: events keyed by id,
//! etags bumped on every write, 404-as-`None`, cancelled events
//! surfaced. Write counters let scenarios assert idempotence, and the
//! `user_*` helpers simulate edits made in the calendar UI.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use qzwhatnext_foundation::calendar::{
    CalendarEvent, CalendarGateway, CalendarResult, EventDraft, EventPatch,
};

#[derive(Default)]
pub struct FakeCalendar {
    events: Mutex<HashMap<String, CalendarEvent>>,
    seq: Mutex<u64>,
    inserts: Mutex<usize>,
    patches: Mutex<usize>,
    deletes: Mutex<usize>,
    time_zone: Mutex<Option<String>>,
}

impl FakeCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timezone(time_zone: &str) -> Self {
        let calendar = Self::default();
        *calendar.time_zone.lock() = Some(time_zone.to_string());
        calendar
    }

    pub fn inserts(&self) -> usize {
        *self.inserts.lock()
    }

    pub fn patches(&self) -> usize {
        *self.patches.lock()
    }

    pub fn deletes(&self) -> usize {
        *self.deletes.lock()
    }

    /// Total writes performed against the calendar.
    pub fn writes(&self) -> usize {
        self.inserts() + self.patches() + self.deletes()
    }

    pub fn event(&self, event_id: &str) -> Option<CalendarEvent> {
        self.events.lock().get(event_id).cloned()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn all_events(&self) -> Vec<CalendarEvent> {
        self.events.lock().values().cloned().collect()
    }

    /// Simulate the user dragging an event to a new time in their
    /// calendar UI (etag and updated change, as Google would).
    pub fn user_moves_event(&self, event_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) {
        let mut events = self.events.lock();
        let event = events.get_mut(event_id).expect("event exists");
        event.start = Some(start);
        event.end = Some(end);
        event.etag = Some(format!("\"user-{event_id}-{}\"", start.timestamp()));
        event.updated = Some(event.updated.unwrap_or(start) + Duration::minutes(1));
    }

    /// Simulate the user deleting an event.
    pub fn user_deletes_event(&self, event_id: &str) {
        self.events.lock().remove(event_id);
    }

    /// Pre-seed a plain user event (no private properties).
    pub fn seed_user_event(&self, summary: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        let id = self.next_id();
        let event = CalendarEvent {
            id: id.clone(),
            etag: Some(self.next_etag()),
            status: Some("confirmed".into()),
            summary: Some(summary.to_string()),
            description: None,
            start: Some(start),
            end: Some(end),
            updated: Some(start),
            private: HashMap::new(),
        };
        self.events.lock().insert(id.clone(), event);
        id
    }

    fn next_id(&self) -> String {
        let mut seq = self.seq.lock();
        *seq += 1;
        format!("evt-{}", *seq)
    }

    fn next_etag(&self) -> String {
        let mut seq = self.seq.lock();
        *seq += 1;
        format!("\"{}\"", *seq)
    }
}

#[async_trait]
impl CalendarGateway for FakeCalendar {
    async fn get_event(&self, event_id: &str) -> CalendarResult<Option<CalendarEvent>> {
        Ok(self.events.lock().get(event_id).cloned())
    }

    async fn insert_event(&self, draft: &EventDraft) -> CalendarResult<CalendarEvent> {
        *self.inserts.lock() += 1;
        let id = self.next_id();
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
        self.events.lock().insert(id, event.clone());
        Ok(event)
    }

    async fn patch_event(
        &self,
        event_id: &str,
        patch: &EventPatch,
    ) -> CalendarResult<CalendarEvent> {
        *self.patches.lock() += 1;
        let etag = self.next_etag();
        let mut events = self.events.lock();
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
        *self.deletes.lock() += 1;
        // Deleting a missing event is a no-op, like the real gateway.
        self.events.lock().remove(event_id);
        Ok(())
    }

    async fn list_events_in_range(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> CalendarResult<Vec<CalendarEvent>> {
        let events = self.events.lock();
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
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> CalendarResult<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
        Ok(self
            .list_events_in_range(time_min, time_max)
            .await?
            .into_iter()
            .filter_map(|e| Some((e.start?, e.end?)))
            .collect())
    }

    async fn timezone(&self) -> CalendarResult<String> {
        Ok(self
            .time_zone
            .lock()
            .clone()
            .unwrap_or_else(|| "UTC".to_string()))
    }
}
