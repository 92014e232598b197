//! Persistence core traits.
//!
//! Every operation is user-scoped; a store never returns another user's
//! rows. Tasks use soft delete (`deleted_at`), purge is explicit, and
//! scheduled blocks are ephemeral-but-persisted: a rebuild keeps locked
//! blocks and regenerates the rest.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use qzwhatnext_kernel::model::{
    OAuthToken, RecurringTaskSeries, RecurringTimeBlock, ScheduledBlock, Task, User,
};

/// Persistence error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),
    /// Query error
    #[error("Query error: {0}")]
    Query(String),
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),
    /// Unique/foreign-key constraint violation
    #[error("Constraint violation: {0}")]
    Constraint(String),
    /// Other error
    #[error("Persistence error: {0}")]
    Other(String),
}

/// Persistence result type.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Outcome of a bulk task mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkOutcome {
    pub affected_count: usize,
    pub not_found_ids: Vec<Uuid>,
}

/// Task storage.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a task. The unique constraint over
    /// `(user_id, recurrence_series_id, recurrence_occurrence_start)`
    /// surfaces as [`PersistenceError::Constraint`].
    async fn create_task(&self, task: &Task) -> PersistenceResult<()>;

    async fn get_task(&self, user_id: Uuid, task_id: Uuid) -> PersistenceResult<Option<Task>>;

    /// Non-deleted tasks, newest first.
    async fn list_tasks(&self, user_id: Uuid) -> PersistenceResult<Vec<Task>>;

    /// Open, non-deleted tasks.
    async fn list_open_tasks(&self, user_id: Uuid) -> PersistenceResult<Vec<Task>>;

    /// Full-row update keyed by `(user_id, id)`.
    async fn update_task(&self, task: &Task) -> PersistenceResult<Task>;

    /// Soft delete; returns false when the task does not exist.
    async fn soft_delete_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        now: DateTime<Utc>,
    ) -> PersistenceResult<bool>;

    /// Clear `deleted_at`; returns false when the task does not exist.
    async fn restore_task(&self, user_id: Uuid, task_id: Uuid) -> PersistenceResult<bool>;

    /// Permanently remove the row.
    async fn purge_task(&self, user_id: Uuid, task_id: Uuid) -> PersistenceResult<bool>;

    async fn bulk_soft_delete(
        &self,
        user_id: Uuid,
        task_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> PersistenceResult<BulkOutcome>;

    async fn bulk_restore(&self, user_id: Uuid, task_ids: &[Uuid])
        -> PersistenceResult<BulkOutcome>;

    async fn bulk_purge(&self, user_id: Uuid, task_ids: &[Uuid]) -> PersistenceResult<BulkOutcome>;

    /// Open recurrence occurrences whose flexibility window end (or, when
    /// windowless, occurrence day) is strictly before `bound`.
    async fn open_recurrence_tasks_before(
        &self,
        user_id: Uuid,
        bound: DateTime<Utc>,
    ) -> PersistenceResult<Vec<Task>>;

    /// Open occurrences for a series (habit: should be 0 or 1).
    async fn open_tasks_for_series(
        &self,
        user_id: Uuid,
        series_id: Uuid,
    ) -> PersistenceResult<Vec<Task>>;
}

/// Scheduled block storage.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// All blocks for a user ordered by `(start_time, id)`.
    async fn list_blocks(&self, user_id: Uuid) -> PersistenceResult<Vec<ScheduledBlock>>;

    async fn get_block(
        &self,
        user_id: Uuid,
        block_id: Uuid,
    ) -> PersistenceResult<Option<ScheduledBlock>>;

    /// Atomically delete all unlocked blocks for the user and insert the
    /// new set. Locked blocks are untouched.
    async fn replace_unlocked_blocks(
        &self,
        user_id: Uuid,
        blocks: &[ScheduledBlock],
    ) -> PersistenceResult<()>;

    async fn set_block_locked(
        &self,
        user_id: Uuid,
        block_id: Uuid,
        locked: bool,
    ) -> PersistenceResult<Option<ScheduledBlock>>;

    /// Overwrite block times, optionally locking in the same write (used
    /// when importing a user's calendar edit).
    async fn update_block_times(
        &self,
        user_id: Uuid,
        block_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        lock: bool,
    ) -> PersistenceResult<Option<ScheduledBlock>>;

    /// Update calendar sync metadata. `Some(None)` clears a column,
    /// `None` leaves it unchanged.
    async fn update_block_calendar_meta(
        &self,
        user_id: Uuid,
        block_id: Uuid,
        event_id: Option<Option<String>>,
        etag: Option<Option<String>>,
        updated_at: Option<Option<DateTime<Utc>>>,
    ) -> PersistenceResult<Option<ScheduledBlock>>;

    /// Delete task-entity blocks for the given task ids (cascade from
    /// task soft-delete/purge).
    async fn delete_blocks_for_tasks(
        &self,
        user_id: Uuid,
        task_ids: &[Uuid],
    ) -> PersistenceResult<usize>;
}

/// Recurring task series storage.
#[async_trait]
pub trait SeriesStore: Send + Sync {
    async fn upsert_series(&self, series: &RecurringTaskSeries) -> PersistenceResult<()>;

    async fn get_series(
        &self,
        user_id: Uuid,
        series_id: Uuid,
    ) -> PersistenceResult<Option<RecurringTaskSeries>>;

    /// Active (non-deleted) series, `created_at desc`.
    async fn list_active_series(&self, user_id: Uuid)
        -> PersistenceResult<Vec<RecurringTaskSeries>>;

    async fn soft_delete_series(
        &self,
        user_id: Uuid,
        series_id: Uuid,
        now: DateTime<Utc>,
    ) -> PersistenceResult<bool>;
}

/// Recurring time block storage.
#[async_trait]
pub trait TimeBlockStore: Send + Sync {
    async fn upsert_time_block(&self, block: &RecurringTimeBlock) -> PersistenceResult<()>;

    async fn get_time_block(
        &self,
        user_id: Uuid,
        block_id: Uuid,
    ) -> PersistenceResult<Option<RecurringTimeBlock>>;

    /// Active (non-deleted) time blocks, `created_at desc`.
    async fn list_active_time_blocks(
        &self,
        user_id: Uuid,
    ) -> PersistenceResult<Vec<RecurringTimeBlock>>;

    async fn soft_delete_time_block(
        &self,
        user_id: Uuid,
        block_id: Uuid,
        now: DateTime<Utc>,
    ) -> PersistenceResult<bool>;
}

/// User storage.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> PersistenceResult<Option<User>>;

    async fn get_user_by_google_sub(&self, google_sub: &str) -> PersistenceResult<Option<User>>;

    /// Find or create the user for a Google subject.
    async fn get_or_create_user(&self, user: &User) -> PersistenceResult<User>;
}

/// OAuth token storage (ciphertext only; encryption happens above).
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get_token(
        &self,
        user_id: Uuid,
        provider: &str,
        product: &str,
    ) -> PersistenceResult<Option<OAuthToken>>;

    async fn upsert_token(&self, token: &OAuthToken) -> PersistenceResult<()>;

    /// Remove the token row (e.g. after `invalid_grant`). Returns the
    /// number of rows deleted (0 or 1).
    async fn delete_token(
        &self,
        user_id: Uuid,
        provider: &str,
        product: &str,
    ) -> PersistenceResult<usize>;
}

/// Long-lived automation ("shortcut") tokens, stored as peppered hashes.
#[async_trait]
pub trait ApiTokenStore: Send + Sync {
    async fn insert_api_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> PersistenceResult<()>;

    async fn find_user_by_token_hash(&self, token_hash: &str) -> PersistenceResult<Option<Uuid>>;
}

/// The full store a deployment provides.
pub trait Store:
    TaskStore + BlockStore + SeriesStore + TimeBlockStore + UserStore + TokenStore + ApiTokenStore
{
    /// Storage backend name, for logs.
    fn backend_name(&self) -> &str;
}

/// Shared store handle used across components.
pub type SharedStore = Arc<dyn Store>;
