//! Abstract calendar gateway.
//!
//! Event identity rides in private extended properties: events we own
//! carry `qzwhatnext_managed = "1"`; recurring time blocks carry only
//! their id key and are deliberately *not* managed, so the planner
//! treats them as reserved time it must never move.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Private extended-property keys on our events.
pub const PRIVATE_KEY_TASK_ID: &str = "qzwhatnext_task_id";
pub const PRIVATE_KEY_BLOCK_ID: &str = "qzwhatnext_block_id";
pub const PRIVATE_KEY_MANAGED: &str = "qzwhatnext_managed";
pub const PRIVATE_KEY_TIME_BLOCK_ID: &str = "qzwhatnext_time_block_id";

/// Calendar gateway errors, mapped onto stable API codes.
#[derive(Debug, Error)]
pub enum CalendarError {
    /// No stored calendar connection for this user.
    #[error("calendar is not connected")]
    NotConnected,

    /// The user revoked our grant (`invalid_grant`); the stored token
    /// row must be cleared.
    #[error("calendar authorization was revoked")]
    AuthRevoked,

    /// Transient upstream failure (5xx, connect errors); retryable.
    #[error("transient calendar error: {0}")]
    Transient(String),

    /// Request exceeded its bounded timeout.
    #[error("calendar request timed out")]
    Timeout,

    /// Non-retryable API failure.
    #[error("calendar API error: {0}")]
    Api(String),
}

impl CalendarError {
    pub fn code(&self) -> &'static str {
        match self {
            CalendarError::NotConnected => "CALENDAR_NOT_CONNECTED",
            CalendarError::AuthRevoked => "CALENDAR_AUTH_REVOKED",
            CalendarError::Transient(_) | CalendarError::Timeout => "CALENDAR_API_TRANSIENT",
            CalendarError::Api(_) => "CALENDAR_API_TRANSIENT",
        }
    }
}

pub type CalendarResult<T> = Result<T, CalendarError>;

/// An event as observed on the external calendar.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CalendarEvent {
    pub id: String,
    pub etag: Option<String>,
    /// `confirmed` / `tentative` / `cancelled`.
    pub status: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    /// Private extended properties.
    pub private: HashMap<String, String>,
}

impl CalendarEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }

    pub fn is_managed(&self) -> bool {
        self.private.get(PRIVATE_KEY_MANAGED).map(String::as_str) == Some("1")
    }

    pub fn block_id(&self) -> Option<&str> {
        self.private.get(PRIVATE_KEY_BLOCK_ID).map(String::as_str)
    }
}

/// A new event to insert.
#[derive(Debug, Clone, Default)]
pub struct EventDraft {
    pub summary: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// IANA timezone id to render start/end in; UTC when absent.
    pub time_zone: Option<String>,
    /// RRULE body (without the `RRULE:` prefix) for recurring events.
    pub recurrence: Option<String>,
    pub private: HashMap<String, String>,
}

/// A partial update to an existing event.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub summary: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Calendar operations the reconciler and orchestrator need.
///
/// Implementations handle deleted-upstream events transparently:
/// `get_event` returns `Ok(None)` on 404/410 and `delete_event` treats
/// them as success.
#[async_trait]
pub trait CalendarGateway: Send + Sync {
    async fn get_event(&self, event_id: &str) -> CalendarResult<Option<CalendarEvent>>;

    async fn insert_event(&self, draft: &EventDraft) -> CalendarResult<CalendarEvent>;

    async fn patch_event(&self, event_id: &str, patch: &EventPatch)
        -> CalendarResult<CalendarEvent>;

    async fn delete_event(&self, event_id: &str) -> CalendarResult<()>;

    /// Expanded (single) events in `[time_min, time_max)`, ordered by
    /// start time.
    async fn list_events_in_range(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> CalendarResult<Vec<CalendarEvent>>;

    /// Busy intervals in `[time_min, time_max)`.
    async fn free_busy(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> CalendarResult<Vec<(DateTime<Utc>, DateTime<Utc>)>>;

    /// The calendar's IANA timezone id (fallback "UTC").
    async fn timezone(&self) -> CalendarResult<String>;
}

pub type SharedCalendarGateway = Arc<dyn CalendarGateway>;
