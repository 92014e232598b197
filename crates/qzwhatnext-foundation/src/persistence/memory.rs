//! In-memory storage backend.
//!
//! Thread-safe, entirely in-process. Suitable for unit/integration tests
//! and short-lived development sessions; it enforces the same semantics
//! as the SQLite backend, including the recurrence-occurrence unique
//! constraint and soft-delete behavior.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use qzwhatnext_kernel::model::{
    OAuthToken, RecurringTaskSeries, RecurringTimeBlock, ScheduledBlock, Task, TaskStatus, User,
};

use super::traits::*;

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    tasks: Arc<RwLock<HashMap<Uuid, Task>>>,
    blocks: Arc<RwLock<HashMap<Uuid, ScheduledBlock>>>,
    series: Arc<RwLock<HashMap<Uuid, RecurringTaskSeries>>>,
    time_blocks: Arc<RwLock<HashMap<Uuid, RecurringTimeBlock>>>,
    users: Arc<RwLock<HashMap<Uuid, User>>>,
    // keyed by (user_id, provider, product)
    tokens: Arc<RwLock<HashMap<(Uuid, String, String), OAuthToken>>>,
    // token hash -> user id
    api_tokens: Arc<RwLock<HashMap<String, Uuid>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create_task(&self, task: &Task) -> PersistenceResult<()> {
        let mut tasks = self.tasks.write().await;
        if let (Some(series_id), Some(occ)) =
            (task.recurrence_series_id, task.recurrence_occurrence_start)
        {
            let duplicate = tasks.values().any(|t| {
                t.user_id == task.user_id
                    && t.recurrence_series_id == Some(series_id)
                    && t.recurrence_occurrence_start == Some(occ)
            });
            if duplicate {
                return Err(PersistenceError::Constraint(
                    "uq_task_recurrence_occurrence".to_string(),
                ));
            }
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, user_id: Uuid, task_id: Uuid) -> PersistenceResult<Option<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .get(&task_id)
            .filter(|t| t.user_id == user_id)
            .cloned())
    }

    async fn list_tasks(&self, user_id: Uuid) -> PersistenceResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let mut out: Vec<Task> = tasks
            .values()
            .filter(|t| t.user_id == user_id && t.deleted_at.is_none())
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn list_open_tasks(&self, user_id: Uuid) -> PersistenceResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let mut out: Vec<Task> = tasks
            .values()
            .filter(|t| {
                t.user_id == user_id && t.deleted_at.is_none() && t.status == TaskStatus::Open
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn update_task(&self, task: &Task) -> PersistenceResult<Task> {
        let mut tasks = self.tasks.write().await;
        match tasks.get(&task.id) {
            Some(existing) if existing.user_id == task.user_id => {
                tasks.insert(task.id, task.clone());
                Ok(task.clone())
            }
            _ => Err(PersistenceError::NotFound(task.id.to_string())),
        }
    }

    async fn soft_delete_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        now: DateTime<Utc>,
    ) -> PersistenceResult<bool> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task_id) {
            Some(task) if task.user_id == user_id => {
                task.deleted_at = Some(now);
                task.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn restore_task(&self, user_id: Uuid, task_id: Uuid) -> PersistenceResult<bool> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task_id) {
            Some(task) if task.user_id == user_id => {
                task.deleted_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_task(&self, user_id: Uuid, task_id: Uuid) -> PersistenceResult<bool> {
        let mut tasks = self.tasks.write().await;
        match tasks.get(&task_id) {
            Some(task) if task.user_id == user_id => {
                tasks.remove(&task_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn bulk_soft_delete(
        &self,
        user_id: Uuid,
        task_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> PersistenceResult<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        for &id in task_ids {
            if self.soft_delete_task(user_id, id, now).await? {
                outcome.affected_count += 1;
            } else {
                outcome.not_found_ids.push(id);
            }
        }
        Ok(outcome)
    }

    async fn bulk_restore(
        &self,
        user_id: Uuid,
        task_ids: &[Uuid],
    ) -> PersistenceResult<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        for &id in task_ids {
            if self.restore_task(user_id, id).await? {
                outcome.affected_count += 1;
            } else {
                outcome.not_found_ids.push(id);
            }
        }
        Ok(outcome)
    }

    async fn bulk_purge(&self, user_id: Uuid, task_ids: &[Uuid]) -> PersistenceResult<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        for &id in task_ids {
            if self.purge_task(user_id, id).await? {
                outcome.affected_count += 1;
            } else {
                outcome.not_found_ids.push(id);
            }
        }
        Ok(outcome)
    }

    async fn open_recurrence_tasks_before(
        &self,
        user_id: Uuid,
        bound: DateTime<Utc>,
    ) -> PersistenceResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let mut out: Vec<Task> = tasks
            .values()
            .filter(|t| {
                t.user_id == user_id
                    && t.deleted_at.is_none()
                    && t.status == TaskStatus::Open
                    && t.recurrence_series_id.is_some()
                    && match (t.flexibility_window, t.recurrence_occurrence_start) {
                        (Some(window), _) => window.end < bound,
                        (None, Some(occ)) => occ.date_naive() < bound.date_naive(),
                        (None, None) => false,
                    }
            })
            .cloned()
            .collect();
        out.sort_by_key(|t| (t.created_at, t.id));
        Ok(out)
    }

    async fn open_tasks_for_series(
        &self,
        user_id: Uuid,
        series_id: Uuid,
    ) -> PersistenceResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let mut out: Vec<Task> = tasks
            .values()
            .filter(|t| {
                t.user_id == user_id
                    && t.deleted_at.is_none()
                    && t.status == TaskStatus::Open
                    && t.recurrence_series_id == Some(series_id)
            })
            .cloned()
            .collect();
        out.sort_by_key(|t| (t.created_at, t.id));
        Ok(out)
    }
}

#[async_trait]
impl BlockStore for MemoryStore {
    async fn list_blocks(&self, user_id: Uuid) -> PersistenceResult<Vec<ScheduledBlock>> {
        let blocks = self.blocks.read().await;
        let mut out: Vec<ScheduledBlock> = blocks
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by_key(|b| (b.start_time, b.id));
        Ok(out)
    }

    async fn get_block(
        &self,
        user_id: Uuid,
        block_id: Uuid,
    ) -> PersistenceResult<Option<ScheduledBlock>> {
        let blocks = self.blocks.read().await;
        Ok(blocks
            .get(&block_id)
            .filter(|b| b.user_id == user_id)
            .cloned())
    }

    async fn replace_unlocked_blocks(
        &self,
        user_id: Uuid,
        new_blocks: &[ScheduledBlock],
    ) -> PersistenceResult<()> {
        let mut blocks = self.blocks.write().await;
        blocks.retain(|_, b| b.user_id != user_id || b.locked);
        for block in new_blocks {
            blocks.insert(block.id, block.clone());
        }
        Ok(())
    }

    async fn set_block_locked(
        &self,
        user_id: Uuid,
        block_id: Uuid,
        locked: bool,
    ) -> PersistenceResult<Option<ScheduledBlock>> {
        let mut blocks = self.blocks.write().await;
        match blocks.get_mut(&block_id) {
            Some(block) if block.user_id == user_id => {
                block.locked = locked;
                Ok(Some(block.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn update_block_times(
        &self,
        user_id: Uuid,
        block_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        lock: bool,
    ) -> PersistenceResult<Option<ScheduledBlock>> {
        let mut blocks = self.blocks.write().await;
        match blocks.get_mut(&block_id) {
            Some(block) if block.user_id == user_id => {
                block.start_time = start_time;
                block.end_time = end_time;
                if lock {
                    block.locked = true;
                }
                Ok(Some(block.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn update_block_calendar_meta(
        &self,
        user_id: Uuid,
        block_id: Uuid,
        event_id: Option<Option<String>>,
        etag: Option<Option<String>>,
        updated_at: Option<Option<DateTime<Utc>>>,
    ) -> PersistenceResult<Option<ScheduledBlock>> {
        let mut blocks = self.blocks.write().await;
        match blocks.get_mut(&block_id) {
            Some(block) if block.user_id == user_id => {
                if let Some(value) = event_id {
                    block.calendar_event_id = value;
                }
                if let Some(value) = etag {
                    block.calendar_event_etag = value;
                }
                if let Some(value) = updated_at {
                    block.calendar_event_updated_at = value;
                }
                Ok(Some(block.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_blocks_for_tasks(
        &self,
        user_id: Uuid,
        task_ids: &[Uuid],
    ) -> PersistenceResult<usize> {
        let mut blocks = self.blocks.write().await;
        let before = blocks.len();
        blocks.retain(|_, b| {
            !(b.user_id == user_id
                && b.entity_type == qzwhatnext_kernel::model::EntityType::Task
                && task_ids.contains(&b.entity_id))
        });
        Ok(before - blocks.len())
    }
}

#[async_trait]
impl SeriesStore for MemoryStore {
    async fn upsert_series(&self, series: &RecurringTaskSeries) -> PersistenceResult<()> {
        self.series.write().await.insert(series.id, series.clone());
        Ok(())
    }

    async fn get_series(
        &self,
        user_id: Uuid,
        series_id: Uuid,
    ) -> PersistenceResult<Option<RecurringTaskSeries>> {
        let series = self.series.read().await;
        Ok(series
            .get(&series_id)
            .filter(|s| s.user_id == user_id)
            .cloned())
    }

    async fn list_active_series(
        &self,
        user_id: Uuid,
    ) -> PersistenceResult<Vec<RecurringTaskSeries>> {
        let series = self.series.read().await;
        let mut out: Vec<RecurringTaskSeries> = series
            .values()
            .filter(|s| s.user_id == user_id && s.deleted_at.is_none())
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn soft_delete_series(
        &self,
        user_id: Uuid,
        series_id: Uuid,
        now: DateTime<Utc>,
    ) -> PersistenceResult<bool> {
        let mut series = self.series.write().await;
        match series.get_mut(&series_id) {
            Some(s) if s.user_id == user_id => {
                s.deleted_at = Some(now);
                s.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl TimeBlockStore for MemoryStore {
    async fn upsert_time_block(&self, block: &RecurringTimeBlock) -> PersistenceResult<()> {
        self.time_blocks
            .write()
            .await
            .insert(block.id, block.clone());
        Ok(())
    }

    async fn get_time_block(
        &self,
        user_id: Uuid,
        block_id: Uuid,
    ) -> PersistenceResult<Option<RecurringTimeBlock>> {
        let blocks = self.time_blocks.read().await;
        Ok(blocks
            .get(&block_id)
            .filter(|b| b.user_id == user_id)
            .cloned())
    }

    async fn list_active_time_blocks(
        &self,
        user_id: Uuid,
    ) -> PersistenceResult<Vec<RecurringTimeBlock>> {
        let blocks = self.time_blocks.read().await;
        let mut out: Vec<RecurringTimeBlock> = blocks
            .values()
            .filter(|b| b.user_id == user_id && b.deleted_at.is_none())
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn soft_delete_time_block(
        &self,
        user_id: Uuid,
        block_id: Uuid,
        now: DateTime<Utc>,
    ) -> PersistenceResult<bool> {
        let mut blocks = self.time_blocks.write().await;
        match blocks.get_mut(&block_id) {
            Some(b) if b.user_id == user_id => {
                b.deleted_at = Some(now);
                b.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user(&self, user_id: Uuid) -> PersistenceResult<Option<User>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn get_user_by_google_sub(&self, google_sub: &str) -> PersistenceResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.google_sub == google_sub).cloned())
    }

    async fn get_or_create_user(&self, user: &User) -> PersistenceResult<User> {
        let mut users = self.users.write().await;
        if let Some(existing) = users.values().find(|u| u.google_sub == user.google_sub) {
            return Ok(existing.clone());
        }
        users.insert(user.id, user.clone());
        Ok(user.clone())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn get_token(
        &self,
        user_id: Uuid,
        provider: &str,
        product: &str,
    ) -> PersistenceResult<Option<OAuthToken>> {
        let tokens = self.tokens.read().await;
        Ok(tokens
            .get(&(user_id, provider.to_string(), product.to_string()))
            .cloned())
    }

    async fn upsert_token(&self, token: &OAuthToken) -> PersistenceResult<()> {
        let mut tokens = self.tokens.write().await;
        tokens.insert(
            (
                token.user_id,
                token.provider.clone(),
                token.product.clone(),
            ),
            token.clone(),
        );
        Ok(())
    }

    async fn delete_token(
        &self,
        user_id: Uuid,
        provider: &str,
        product: &str,
    ) -> PersistenceResult<usize> {
        let mut tokens = self.tokens.write().await;
        let removed = tokens
            .remove(&(user_id, provider.to_string(), product.to_string()))
            .is_some();
        Ok(usize::from(removed))
    }
}

#[async_trait]
impl ApiTokenStore for MemoryStore {
    async fn insert_api_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        _now: DateTime<Utc>,
    ) -> PersistenceResult<()> {
        self.api_tokens
            .write()
            .await
            .insert(token_hash.to_string(), user_id);
        Ok(())
    }

    async fn find_user_by_token_hash(&self, token_hash: &str) -> PersistenceResult<Option<Uuid>> {
        Ok(self.api_tokens.read().await.get(token_hash).copied())
    }
}

impl Store for MemoryStore {
    fn backend_name(&self) -> &str {
        "memory"
    }
}
