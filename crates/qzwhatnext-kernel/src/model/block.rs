//! Scheduled blocks — the placements the scheduler emits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a block schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Task,
    Transition,
}

impl EntityType {
    pub fn as_code(&self) -> &'static str {
        match self {
            EntityType::Task => "task",
            EntityType::Transition => "transition",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "task" => Some(EntityType::Task),
            "transition" => Some(EntityType::Transition),
            _ => None,
        }
    }
}

/// Who placed a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduledBy {
    System,
    User,
}

impl ScheduledBy {
    pub fn as_code(&self) -> &'static str {
        match self {
            ScheduledBy::System => "system",
            ScheduledBy::User => "user",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "system" => Some(ScheduledBy::System),
            "user" => Some(ScheduledBy::User),
            _ => None,
        }
    }
}

/// A half-open `[start_time, end_time)` placement on the timeline.
///
/// Blocks for the same task are contiguous and their union covers the
/// scheduled portion of its estimated duration. Locked blocks are never
/// moved or deleted by the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledBlock {
    pub id: Uuid,
    pub user_id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub scheduled_by: ScheduledBy,
    pub locked: bool,
    /// External calendar event backing this block, once synced.
    pub calendar_event_id: Option<String>,
    /// ETag of the event as last written/observed by us.
    pub calendar_event_etag: Option<String>,
    /// `updated` stamp of the event as last written/observed by us.
    pub calendar_event_updated_at: Option<DateTime<Utc>>,
}

impl ScheduledBlock {
    /// Deterministic block id derived from the task and the block's
    /// position within that task, so rebuilds with unchanged inputs emit
    /// byte-identical block sequences.
    pub fn deterministic_id(task_id: Uuid, occurrence_index: u32) -> Uuid {
        Uuid::new_v5(
            &task_id,
            format!("block:{occurrence_index}").as_bytes(),
        )
    }

    pub fn new_system(
        task_id: Uuid,
        user_id: Uuid,
        occurrence_index: u32,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Self::deterministic_id(task_id, occurrence_index),
            user_id,
            entity_type: EntityType::Task,
            entity_id: task_id,
            start_time,
            end_time,
            scheduled_by: ScheduledBy::System,
            locked: false,
            calendar_event_id: None,
            calendar_event_etag: None,
            calendar_event_updated_at: None,
        }
    }

    pub fn duration_min(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && start < self.end_time
    }
}
