//! Testing utilities for qzWhatNext.
//!
//! A scripted in-memory calendar double with write counters, plus small
//! fixture helpers the end-to-end scenarios share.

pub mod fake_calendar;

pub use fake_calendar::FakeCalendar;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use qzwhatnext_foundation::persistence::{MemoryStore, TaskStore};
use qzwhatnext_kernel::model::Task;

/// A fixed "now" every scenario anchors on: Monday 2026-03-02, 09:00 UTC.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

/// Same day, at `h:m` UTC.
pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
}

/// Seed one open API task.
pub async fn seed_task(store: &MemoryStore, user: Uuid, title: &str, minutes: u32) -> Task {
    let task = Task::new(user, "api", title, fixed_now()).with_duration(minutes);
    store.create_task(&task).await.expect("seed task");
    task
}
