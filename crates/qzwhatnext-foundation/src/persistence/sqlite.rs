//! SQLite storage backend.
//!
//! Embedded single-file (or in-memory) storage for light deployments.
//! Migrations run at connect time; WAL and foreign keys are switched on.
//! Timestamps are stored as RFC 3339 TEXT in UTC, uuids as TEXT.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use std::sync::Arc;
use uuid::Uuid;

use qzwhatnext_kernel::model::{
    EnergyIntensity, EntityType, FlexibilityWindow, OAuthToken, RecurrencePreset,
    RecurringTaskSeries, RecurringTimeBlock, ScheduledBlock, ScheduledBy, Task, TaskCategory,
    TaskStatus, User,
};

use super::traits::*;

/// Default connection pool size; tune via `DB_POOL_SIZE`.
pub const DEFAULT_POOL_SIZE: u32 = 5;

/// Default pool acquire timeout; tune via `DB_POOL_TIMEOUT_SEC`.
pub const DEFAULT_POOL_TIMEOUT_SEC: u64 = 30;

/// SQLite store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> PersistenceResult<Self> {
        Self::connect_with_options(database_url, DEFAULT_POOL_SIZE, DEFAULT_POOL_TIMEOUT_SEC).await
    }

    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        acquire_timeout_sec: u64,
    ) -> PersistenceResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(acquire_timeout_sec))
            .connect(database_url)
            .await
            .map_err(|e| PersistenceError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.configure_pragmas().await?;
        store.run_migrations().await?;
        Ok(store)
    }

    pub async fn in_memory() -> PersistenceResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    pub async fn shared(database_url: &str) -> PersistenceResult<Arc<Self>> {
        Ok(Arc::new(Self::connect(database_url).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn configure_pragmas(&self) -> PersistenceResult<()> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        Ok(())
    }

    pub async fn run_migrations(&self) -> PersistenceResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                name TEXT,
                google_sub TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                source_type TEXT NOT NULL,
                source_id TEXT,
                title TEXT NOT NULL,
                notes TEXT,
                status TEXT NOT NULL,
                category TEXT NOT NULL,
                energy_intensity TEXT NOT NULL,
                estimated_duration_min INTEGER NOT NULL,
                duration_confidence REAL NOT NULL,
                risk_score REAL NOT NULL,
                impact_score REAL NOT NULL,
                deadline TEXT,
                start_after TEXT,
                due_by TEXT,
                flex_window_start TEXT,
                flex_window_end TEXT,
                dependencies TEXT,
                ai_excluded INTEGER NOT NULL DEFAULT 0,
                manual_priority_locked INTEGER NOT NULL DEFAULT 0,
                user_locked INTEGER NOT NULL DEFAULT 0,
                manually_scheduled INTEGER NOT NULL DEFAULT 0,
                recurrence_series_id TEXT,
                recurrence_occurrence_start TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT,
                UNIQUE(user_id, recurrence_series_id, recurrence_occurrence_start)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS scheduled_blocks (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                scheduled_by TEXT NOT NULL,
                locked INTEGER NOT NULL DEFAULT 0,
                calendar_event_id TEXT,
                calendar_event_etag TEXT,
                calendar_event_updated_at TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS recurring_task_series (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title_template TEXT NOT NULL,
                notes_template TEXT,
                estimated_duration_min_default INTEGER NOT NULL,
                category_default TEXT NOT NULL,
                recurrence_preset TEXT NOT NULL,
                ai_excluded INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS recurring_time_blocks (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                recurrence_preset TEXT NOT NULL,
                calendar_event_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS google_oauth_tokens (
                user_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                product TEXT NOT NULL,
                scopes TEXT NOT NULL,
                refresh_token_encrypted TEXT NOT NULL,
                access_token_encrypted TEXT,
                expiry TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, provider, product)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS api_tokens (
                token_hash TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id, deleted_at)",
            "CREATE INDEX IF NOT EXISTS idx_tasks_series ON tasks(user_id, recurrence_series_id, status)",
            "CREATE INDEX IF NOT EXISTS idx_blocks_user ON scheduled_blocks(user_id, start_time)",
        ];
        for sql in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| PersistenceError::Query(e.to_string()))?;
        }
        Ok(())
    }
}

// ── row helpers ──────────────────────────────────────────────────────────

fn map_query_err(e: sqlx::Error) -> PersistenceError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            PersistenceError::Constraint(db.message().to_string())
        }
        _ => PersistenceError::Query(e.to_string()),
    }
}

fn get_uuid(row: &SqliteRow, column: &str) -> PersistenceResult<Uuid> {
    let raw: String = row
        .try_get(column)
        .map_err(|e| PersistenceError::Query(e.to_string()))?;
    Uuid::parse_str(&raw).map_err(|e| PersistenceError::Serialization(e.to_string()))
}

fn get_opt_uuid(row: &SqliteRow, column: &str) -> PersistenceResult<Option<Uuid>> {
    let raw: Option<String> = row
        .try_get(column)
        .map_err(|e| PersistenceError::Query(e.to_string()))?;
    raw.map(|s| Uuid::parse_str(&s).map_err(|e| PersistenceError::Serialization(e.to_string())))
        .transpose()
}

fn get_datetime(row: &SqliteRow, column: &str) -> PersistenceResult<DateTime<Utc>> {
    let raw: String = row
        .try_get(column)
        .map_err(|e| PersistenceError::Query(e.to_string()))?;
    parse_datetime(&raw)
}

fn get_opt_datetime(row: &SqliteRow, column: &str) -> PersistenceResult<Option<DateTime<Utc>>> {
    let raw: Option<String> = row
        .try_get(column)
        .map_err(|e| PersistenceError::Query(e.to_string()))?;
    raw.map(|s| parse_datetime(&s)).transpose()
}

fn parse_datetime(raw: &str) -> PersistenceResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PersistenceError::Serialization(e.to_string()))
}

fn get_opt_date(row: &SqliteRow, column: &str) -> PersistenceResult<Option<NaiveDate>> {
    let raw: Option<String> = row
        .try_get(column)
        .map_err(|e| PersistenceError::Query(e.to_string()))?;
    raw.map(|s| {
        NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map_err(|e| PersistenceError::Serialization(e.to_string()))
    })
    .transpose()
}

fn fmt_dt(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn fmt_opt_dt(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(fmt_dt)
}

fn parse_task_row(row: &SqliteRow) -> PersistenceResult<Task> {
    let status_raw: String = row
        .try_get("status")
        .map_err(|e| PersistenceError::Query(e.to_string()))?;
    let status = TaskStatus::from_code(&status_raw)
        .ok_or_else(|| PersistenceError::Serialization(format!("bad status: {status_raw}")))?;

    let category_raw: String = row
        .try_get("category")
        .map_err(|e| PersistenceError::Query(e.to_string()))?;
    // Legacy category codes normalize on read.
    let category = TaskCategory::from_code(&category_raw).unwrap_or(TaskCategory::Unknown);

    let energy_raw: String = row
        .try_get("energy_intensity")
        .map_err(|e| PersistenceError::Query(e.to_string()))?;
    let energy_intensity = EnergyIntensity::from_code(&energy_raw).unwrap_or_default();

    let dependencies: Vec<Uuid> = row
        .try_get::<Option<String>, _>("dependencies")
        .ok()
        .flatten()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    let flexibility_window = match (
        get_opt_datetime(row, "flex_window_start")?,
        get_opt_datetime(row, "flex_window_end")?,
    ) {
        (Some(start), Some(end)) => Some(FlexibilityWindow { start, end }),
        _ => None,
    };

    Ok(Task {
        id: get_uuid(row, "id")?,
        user_id: get_uuid(row, "user_id")?,
        source_type: row
            .try_get("source_type")
            .map_err(|e| PersistenceError::Query(e.to_string()))?,
        source_id: row.try_get("source_id").ok().flatten(),
        title: row
            .try_get("title")
            .map_err(|e| PersistenceError::Query(e.to_string()))?,
        notes: row.try_get("notes").ok().flatten(),
        status,
        category,
        energy_intensity,
        estimated_duration_min: row
            .try_get::<i64, _>("estimated_duration_min")
            .unwrap_or(30) as u32,
        duration_confidence: row.try_get("duration_confidence").unwrap_or(0.5),
        risk_score: row.try_get("risk_score").unwrap_or(0.3),
        impact_score: row.try_get("impact_score").unwrap_or(0.3),
        deadline: get_opt_datetime(row, "deadline")?,
        start_after: get_opt_date(row, "start_after")?,
        due_by: get_opt_date(row, "due_by")?,
        flexibility_window,
        dependencies,
        ai_excluded: row.try_get::<i64, _>("ai_excluded").unwrap_or(0) != 0,
        manual_priority_locked: row.try_get::<i64, _>("manual_priority_locked").unwrap_or(0) != 0,
        user_locked: row.try_get::<i64, _>("user_locked").unwrap_or(0) != 0,
        manually_scheduled: row.try_get::<i64, _>("manually_scheduled").unwrap_or(0) != 0,
        recurrence_series_id: get_opt_uuid(row, "recurrence_series_id")?,
        recurrence_occurrence_start: get_opt_datetime(row, "recurrence_occurrence_start")?,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
        deleted_at: get_opt_datetime(row, "deleted_at")?,
    })
}

fn parse_block_row(row: &SqliteRow) -> PersistenceResult<ScheduledBlock> {
    let entity_type_raw: String = row
        .try_get("entity_type")
        .map_err(|e| PersistenceError::Query(e.to_string()))?;
    let entity_type = EntityType::from_code(&entity_type_raw).ok_or_else(|| {
        PersistenceError::Serialization(format!("bad entity_type: {entity_type_raw}"))
    })?;

    let scheduled_by_raw: String = row
        .try_get("scheduled_by")
        .map_err(|e| PersistenceError::Query(e.to_string()))?;
    let scheduled_by = ScheduledBy::from_code(&scheduled_by_raw).ok_or_else(|| {
        PersistenceError::Serialization(format!("bad scheduled_by: {scheduled_by_raw}"))
    })?;

    Ok(ScheduledBlock {
        id: get_uuid(row, "id")?,
        user_id: get_uuid(row, "user_id")?,
        entity_type,
        entity_id: get_uuid(row, "entity_id")?,
        start_time: get_datetime(row, "start_time")?,
        end_time: get_datetime(row, "end_time")?,
        scheduled_by,
        locked: row.try_get::<i64, _>("locked").unwrap_or(0) != 0,
        calendar_event_id: row.try_get("calendar_event_id").ok().flatten(),
        calendar_event_etag: row.try_get("calendar_event_etag").ok().flatten(),
        calendar_event_updated_at: get_opt_datetime(row, "calendar_event_updated_at")?,
    })
}

fn parse_series_row(row: &SqliteRow) -> PersistenceResult<RecurringTaskSeries> {
    let preset_raw: String = row
        .try_get("recurrence_preset")
        .map_err(|e| PersistenceError::Query(e.to_string()))?;
    let recurrence_preset: RecurrencePreset = serde_json::from_str(&preset_raw)
        .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

    let category_raw: String = row
        .try_get("category_default")
        .map_err(|e| PersistenceError::Query(e.to_string()))?;

    Ok(RecurringTaskSeries {
        id: get_uuid(row, "id")?,
        user_id: get_uuid(row, "user_id")?,
        title_template: row
            .try_get("title_template")
            .map_err(|e| PersistenceError::Query(e.to_string()))?,
        notes_template: row.try_get("notes_template").ok().flatten(),
        estimated_duration_min_default: row
            .try_get::<i64, _>("estimated_duration_min_default")
            .unwrap_or(30) as u32,
        category_default: TaskCategory::from_code(&category_raw).unwrap_or(TaskCategory::Unknown),
        recurrence_preset,
        ai_excluded: row.try_get::<i64, _>("ai_excluded").unwrap_or(0) != 0,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
        deleted_at: get_opt_datetime(row, "deleted_at")?,
    })
}

fn parse_time_block_row(row: &SqliteRow) -> PersistenceResult<RecurringTimeBlock> {
    let preset_raw: String = row
        .try_get("recurrence_preset")
        .map_err(|e| PersistenceError::Query(e.to_string()))?;
    let recurrence_preset: RecurrencePreset = serde_json::from_str(&preset_raw)
        .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

    Ok(RecurringTimeBlock {
        id: get_uuid(row, "id")?,
        user_id: get_uuid(row, "user_id")?,
        title: row
            .try_get("title")
            .map_err(|e| PersistenceError::Query(e.to_string()))?,
        recurrence_preset,
        calendar_event_id: row.try_get("calendar_event_id").ok().flatten(),
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
        deleted_at: get_opt_datetime(row, "deleted_at")?,
    })
}

fn parse_user_row(row: &SqliteRow) -> PersistenceResult<User> {
    Ok(User {
        id: get_uuid(row, "id")?,
        email: row
            .try_get("email")
            .map_err(|e| PersistenceError::Query(e.to_string()))?,
        name: row.try_get("name").ok().flatten(),
        google_sub: row
            .try_get("google_sub")
            .map_err(|e| PersistenceError::Query(e.to_string()))?,
        created_at: get_datetime(row, "created_at")?,
    })
}

fn parse_token_row(row: &SqliteRow) -> PersistenceResult<OAuthToken> {
    let scopes: Vec<String> = row
        .try_get::<Option<String>, _>("scopes")
        .ok()
        .flatten()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();
    Ok(OAuthToken {
        user_id: get_uuid(row, "user_id")?,
        provider: row
            .try_get("provider")
            .map_err(|e| PersistenceError::Query(e.to_string()))?,
        product: row
            .try_get("product")
            .map_err(|e| PersistenceError::Query(e.to_string()))?,
        scopes,
        refresh_token_encrypted: row
            .try_get("refresh_token_encrypted")
            .map_err(|e| PersistenceError::Query(e.to_string()))?,
        access_token_encrypted: row.try_get("access_token_encrypted").ok().flatten(),
        expiry: get_opt_datetime(row, "expiry")?,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
    })
}

// ── TaskStore ────────────────────────────────────────────────────────────

#[async_trait]
impl TaskStore for SqliteStore {
    async fn create_task(&self, task: &Task) -> PersistenceResult<()> {
        let dependencies = serde_json::to_string(&task.dependencies)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, user_id, source_type, source_id, title, notes, status,
                category, energy_intensity, estimated_duration_min,
                duration_confidence, risk_score, impact_score, deadline,
                start_after, due_by, flex_window_start, flex_window_end,
                dependencies, ai_excluded, manual_priority_locked,
                user_locked, manually_scheduled, recurrence_series_id,
                recurrence_occurrence_start, created_at, updated_at, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.id.to_string())
        .bind(task.user_id.to_string())
        .bind(&task.source_type)
        .bind(&task.source_id)
        .bind(&task.title)
        .bind(&task.notes)
        .bind(task.status.as_code())
        .bind(task.category.as_code())
        .bind(task.energy_intensity.as_code())
        .bind(i64::from(task.estimated_duration_min))
        .bind(task.duration_confidence)
        .bind(task.risk_score)
        .bind(task.impact_score)
        .bind(fmt_opt_dt(&task.deadline))
        .bind(task.start_after.map(|d| d.to_string()))
        .bind(task.due_by.map(|d| d.to_string()))
        .bind(task.flexibility_window.map(|w| fmt_dt(&w.start)))
        .bind(task.flexibility_window.map(|w| fmt_dt(&w.end)))
        .bind(dependencies)
        .bind(i64::from(task.ai_excluded))
        .bind(i64::from(task.manual_priority_locked))
        .bind(i64::from(task.user_locked))
        .bind(i64::from(task.manually_scheduled))
        .bind(task.recurrence_series_id.map(|id| id.to_string()))
        .bind(fmt_opt_dt(&task.recurrence_occurrence_start))
        .bind(fmt_dt(&task.created_at))
        .bind(fmt_dt(&task.updated_at))
        .bind(fmt_opt_dt(&task.deleted_at))
        .execute(&self.pool)
        .await
        .map_err(map_query_err)?;
        Ok(())
    }

    async fn get_task(&self, user_id: Uuid, task_id: Uuid) -> PersistenceResult<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE user_id = ? AND id = ?")
            .bind(user_id.to_string())
            .bind(task_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_query_err)?;
        row.as_ref().map(parse_task_row).transpose()
    }

    async fn list_tasks(&self, user_id: Uuid) -> PersistenceResult<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT * FROM tasks WHERE user_id = ? AND deleted_at IS NULL
             ORDER BY created_at DESC, id ASC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_query_err)?;
        rows.iter().map(parse_task_row).collect()
    }

    async fn list_open_tasks(&self, user_id: Uuid) -> PersistenceResult<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT * FROM tasks
             WHERE user_id = ? AND deleted_at IS NULL AND status = 'open'
             ORDER BY created_at DESC, id ASC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_query_err)?;
        rows.iter().map(parse_task_row).collect()
    }

    async fn update_task(&self, task: &Task) -> PersistenceResult<Task> {
        let dependencies = serde_json::to_string(&task.dependencies)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        let result = sqlx::query(
            r#"
            UPDATE tasks SET
                source_type = ?, source_id = ?, title = ?, notes = ?,
                status = ?, category = ?, energy_intensity = ?,
                estimated_duration_min = ?, duration_confidence = ?,
                risk_score = ?, impact_score = ?, deadline = ?,
                start_after = ?, due_by = ?, flex_window_start = ?,
                flex_window_end = ?, dependencies = ?, ai_excluded = ?,
                manual_priority_locked = ?, user_locked = ?,
                manually_scheduled = ?, recurrence_series_id = ?,
                recurrence_occurrence_start = ?, updated_at = ?, deleted_at = ?
            WHERE user_id = ? AND id = ?
            "#,
        )
        .bind(&task.source_type)
        .bind(&task.source_id)
        .bind(&task.title)
        .bind(&task.notes)
        .bind(task.status.as_code())
        .bind(task.category.as_code())
        .bind(task.energy_intensity.as_code())
        .bind(i64::from(task.estimated_duration_min))
        .bind(task.duration_confidence)
        .bind(task.risk_score)
        .bind(task.impact_score)
        .bind(fmt_opt_dt(&task.deadline))
        .bind(task.start_after.map(|d| d.to_string()))
        .bind(task.due_by.map(|d| d.to_string()))
        .bind(task.flexibility_window.map(|w| fmt_dt(&w.start)))
        .bind(task.flexibility_window.map(|w| fmt_dt(&w.end)))
        .bind(dependencies)
        .bind(i64::from(task.ai_excluded))
        .bind(i64::from(task.manual_priority_locked))
        .bind(i64::from(task.user_locked))
        .bind(i64::from(task.manually_scheduled))
        .bind(task.recurrence_series_id.map(|id| id.to_string()))
        .bind(fmt_opt_dt(&task.recurrence_occurrence_start))
        .bind(fmt_dt(&task.updated_at))
        .bind(fmt_opt_dt(&task.deleted_at))
        .bind(task.user_id.to_string())
        .bind(task.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_query_err)?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(task.id.to_string()));
        }
        Ok(task.clone())
    }

    async fn soft_delete_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        now: DateTime<Utc>,
    ) -> PersistenceResult<bool> {
        let result =
            sqlx::query("UPDATE tasks SET deleted_at = ?, updated_at = ? WHERE user_id = ? AND id = ?")
                .bind(fmt_dt(&now))
                .bind(fmt_dt(&now))
                .bind(user_id.to_string())
                .bind(task_id.to_string())
                .execute(&self.pool)
                .await
                .map_err(map_query_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn restore_task(&self, user_id: Uuid, task_id: Uuid) -> PersistenceResult<bool> {
        let result = sqlx::query("UPDATE tasks SET deleted_at = NULL WHERE user_id = ? AND id = ?")
            .bind(user_id.to_string())
            .bind(task_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_query_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_task(&self, user_id: Uuid, task_id: Uuid) -> PersistenceResult<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE user_id = ? AND id = ?")
            .bind(user_id.to_string())
            .bind(task_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_query_err)?;
        Ok(result.rows_affected() > 0)
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
        // RFC 3339 strings in a fixed offset compare lexicographically.
        let rows = sqlx::query(
            r#"
            SELECT * FROM tasks
            WHERE user_id = ? AND deleted_at IS NULL AND status = 'open'
              AND recurrence_series_id IS NOT NULL
              AND (
                    (flex_window_end IS NOT NULL AND flex_window_end < ?)
                 OR (flex_window_end IS NULL
                     AND recurrence_occurrence_start IS NOT NULL
                     AND date(recurrence_occurrence_start) < date(?))
              )
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_id.to_string())
        .bind(fmt_dt(&bound))
        .bind(fmt_dt(&bound))
        .fetch_all(&self.pool)
        .await
        .map_err(map_query_err)?;
        rows.iter().map(parse_task_row).collect()
    }

    async fn open_tasks_for_series(
        &self,
        user_id: Uuid,
        series_id: Uuid,
    ) -> PersistenceResult<Vec<Task>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tasks
            WHERE user_id = ? AND deleted_at IS NULL AND status = 'open'
              AND recurrence_series_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_id.to_string())
        .bind(series_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_query_err)?;
        rows.iter().map(parse_task_row).collect()
    }
}

// ── BlockStore ───────────────────────────────────────────────────────────

#[async_trait]
impl BlockStore for SqliteStore {
    async fn list_blocks(&self, user_id: Uuid) -> PersistenceResult<Vec<ScheduledBlock>> {
        let rows = sqlx::query(
            "SELECT * FROM scheduled_blocks WHERE user_id = ? ORDER BY start_time ASC, id ASC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_query_err)?;
        rows.iter().map(parse_block_row).collect()
    }

    async fn get_block(
        &self,
        user_id: Uuid,
        block_id: Uuid,
    ) -> PersistenceResult<Option<ScheduledBlock>> {
        let row = sqlx::query("SELECT * FROM scheduled_blocks WHERE user_id = ? AND id = ?")
            .bind(user_id.to_string())
            .bind(block_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_query_err)?;
        row.as_ref().map(parse_block_row).transpose()
    }

    async fn replace_unlocked_blocks(
        &self,
        user_id: Uuid,
        blocks: &[ScheduledBlock],
    ) -> PersistenceResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PersistenceError::Connection(e.to_string()))?;

        sqlx::query("DELETE FROM scheduled_blocks WHERE user_id = ? AND locked = 0")
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_query_err)?;

        for block in blocks {
            sqlx::query(
                r#"
                INSERT INTO scheduled_blocks (
                    id, user_id, entity_type, entity_id, start_time, end_time,
                    scheduled_by, locked, calendar_event_id,
                    calendar_event_etag, calendar_event_updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(block.id.to_string())
            .bind(block.user_id.to_string())
            .bind(block.entity_type.as_code())
            .bind(block.entity_id.to_string())
            .bind(fmt_dt(&block.start_time))
            .bind(fmt_dt(&block.end_time))
            .bind(block.scheduled_by.as_code())
            .bind(i64::from(block.locked))
            .bind(&block.calendar_event_id)
            .bind(&block.calendar_event_etag)
            .bind(fmt_opt_dt(&block.calendar_event_updated_at))
            .execute(&mut *tx)
            .await
            .map_err(map_query_err)?;
        }

        tx.commit()
            .await
            .map_err(|e| PersistenceError::Connection(e.to_string()))
    }

    async fn set_block_locked(
        &self,
        user_id: Uuid,
        block_id: Uuid,
        locked: bool,
    ) -> PersistenceResult<Option<ScheduledBlock>> {
        let result = sqlx::query("UPDATE scheduled_blocks SET locked = ? WHERE user_id = ? AND id = ?")
            .bind(i64::from(locked))
            .bind(user_id.to_string())
            .bind(block_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_query_err)?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_block(user_id, block_id).await
    }

    async fn update_block_times(
        &self,
        user_id: Uuid,
        block_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        lock: bool,
    ) -> PersistenceResult<Option<ScheduledBlock>> {
        let result = sqlx::query(
            "UPDATE scheduled_blocks
             SET start_time = ?, end_time = ?, locked = CASE WHEN ? THEN 1 ELSE locked END
             WHERE user_id = ? AND id = ?",
        )
        .bind(fmt_dt(&start_time))
        .bind(fmt_dt(&end_time))
        .bind(i64::from(lock))
        .bind(user_id.to_string())
        .bind(block_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_query_err)?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_block(user_id, block_id).await
    }

    async fn update_block_calendar_meta(
        &self,
        user_id: Uuid,
        block_id: Uuid,
        event_id: Option<Option<String>>,
        etag: Option<Option<String>>,
        updated_at: Option<Option<DateTime<Utc>>>,
    ) -> PersistenceResult<Option<ScheduledBlock>> {
        let Some(current) = self.get_block(user_id, block_id).await? else {
            return Ok(None);
        };
        let event_id = event_id.unwrap_or(current.calendar_event_id);
        let etag = etag.unwrap_or(current.calendar_event_etag);
        let updated_at = updated_at.unwrap_or(current.calendar_event_updated_at);

        sqlx::query(
            "UPDATE scheduled_blocks
             SET calendar_event_id = ?, calendar_event_etag = ?, calendar_event_updated_at = ?
             WHERE user_id = ? AND id = ?",
        )
        .bind(&event_id)
        .bind(&etag)
        .bind(fmt_opt_dt(&updated_at))
        .bind(user_id.to_string())
        .bind(block_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_query_err)?;
        self.get_block(user_id, block_id).await
    }

    async fn delete_blocks_for_tasks(
        &self,
        user_id: Uuid,
        task_ids: &[Uuid],
    ) -> PersistenceResult<usize> {
        let mut deleted = 0usize;
        for id in task_ids {
            let result = sqlx::query(
                "DELETE FROM scheduled_blocks
                 WHERE user_id = ? AND entity_type = 'task' AND entity_id = ?",
            )
            .bind(user_id.to_string())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_query_err)?;
            deleted += result.rows_affected() as usize;
        }
        Ok(deleted)
    }
}

// ── SeriesStore / TimeBlockStore ─────────────────────────────────────────

#[async_trait]
impl SeriesStore for SqliteStore {
    async fn upsert_series(&self, series: &RecurringTaskSeries) -> PersistenceResult<()> {
        let preset = serde_json::to_string(&series.recurrence_preset)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO recurring_task_series (
                id, user_id, title_template, notes_template,
                estimated_duration_min_default, category_default,
                recurrence_preset, ai_excluded, created_at, updated_at, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(series.id.to_string())
        .bind(series.user_id.to_string())
        .bind(&series.title_template)
        .bind(&series.notes_template)
        .bind(i64::from(series.estimated_duration_min_default))
        .bind(series.category_default.as_code())
        .bind(preset)
        .bind(i64::from(series.ai_excluded))
        .bind(fmt_dt(&series.created_at))
        .bind(fmt_dt(&series.updated_at))
        .bind(fmt_opt_dt(&series.deleted_at))
        .execute(&self.pool)
        .await
        .map_err(map_query_err)?;
        Ok(())
    }

    async fn get_series(
        &self,
        user_id: Uuid,
        series_id: Uuid,
    ) -> PersistenceResult<Option<RecurringTaskSeries>> {
        let row = sqlx::query("SELECT * FROM recurring_task_series WHERE user_id = ? AND id = ?")
            .bind(user_id.to_string())
            .bind(series_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_query_err)?;
        row.as_ref().map(parse_series_row).transpose()
    }

    async fn list_active_series(
        &self,
        user_id: Uuid,
    ) -> PersistenceResult<Vec<RecurringTaskSeries>> {
        let rows = sqlx::query(
            "SELECT * FROM recurring_task_series
             WHERE user_id = ? AND deleted_at IS NULL
             ORDER BY created_at DESC, id ASC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_query_err)?;
        rows.iter().map(parse_series_row).collect()
    }

    async fn soft_delete_series(
        &self,
        user_id: Uuid,
        series_id: Uuid,
        now: DateTime<Utc>,
    ) -> PersistenceResult<bool> {
        let result = sqlx::query(
            "UPDATE recurring_task_series SET deleted_at = ?, updated_at = ?
             WHERE user_id = ? AND id = ?",
        )
        .bind(fmt_dt(&now))
        .bind(fmt_dt(&now))
        .bind(user_id.to_string())
        .bind(series_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_query_err)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TimeBlockStore for SqliteStore {
    async fn upsert_time_block(&self, block: &RecurringTimeBlock) -> PersistenceResult<()> {
        let preset = serde_json::to_string(&block.recurrence_preset)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO recurring_time_blocks (
                id, user_id, title, recurrence_preset, calendar_event_id,
                created_at, updated_at, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(block.id.to_string())
        .bind(block.user_id.to_string())
        .bind(&block.title)
        .bind(preset)
        .bind(&block.calendar_event_id)
        .bind(fmt_dt(&block.created_at))
        .bind(fmt_dt(&block.updated_at))
        .bind(fmt_opt_dt(&block.deleted_at))
        .execute(&self.pool)
        .await
        .map_err(map_query_err)?;
        Ok(())
    }

    async fn get_time_block(
        &self,
        user_id: Uuid,
        block_id: Uuid,
    ) -> PersistenceResult<Option<RecurringTimeBlock>> {
        let row = sqlx::query("SELECT * FROM recurring_time_blocks WHERE user_id = ? AND id = ?")
            .bind(user_id.to_string())
            .bind(block_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_query_err)?;
        row.as_ref().map(parse_time_block_row).transpose()
    }

    async fn list_active_time_blocks(
        &self,
        user_id: Uuid,
    ) -> PersistenceResult<Vec<RecurringTimeBlock>> {
        let rows = sqlx::query(
            "SELECT * FROM recurring_time_blocks
             WHERE user_id = ? AND deleted_at IS NULL
             ORDER BY created_at DESC, id ASC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_query_err)?;
        rows.iter().map(parse_time_block_row).collect()
    }

    async fn soft_delete_time_block(
        &self,
        user_id: Uuid,
        block_id: Uuid,
        now: DateTime<Utc>,
    ) -> PersistenceResult<bool> {
        let result = sqlx::query(
            "UPDATE recurring_time_blocks SET deleted_at = ?, updated_at = ?
             WHERE user_id = ? AND id = ?",
        )
        .bind(fmt_dt(&now))
        .bind(fmt_dt(&now))
        .bind(user_id.to_string())
        .bind(block_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_query_err)?;
        Ok(result.rows_affected() > 0)
    }
}

// ── UserStore / TokenStore / ApiTokenStore ───────────────────────────────

#[async_trait]
impl UserStore for SqliteStore {
    async fn get_user(&self, user_id: Uuid) -> PersistenceResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_query_err)?;
        row.as_ref().map(parse_user_row).transpose()
    }

    async fn get_user_by_google_sub(&self, google_sub: &str) -> PersistenceResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE google_sub = ?")
            .bind(google_sub)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_query_err)?;
        row.as_ref().map(parse_user_row).transpose()
    }

    async fn get_or_create_user(&self, user: &User) -> PersistenceResult<User> {
        if let Some(existing) = self.get_user_by_google_sub(&user.google_sub).await? {
            return Ok(existing);
        }
        sqlx::query(
            "INSERT INTO users (id, email, name, google_sub, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.google_sub)
        .bind(fmt_dt(&user.created_at))
        .execute(&self.pool)
        .await
        .map_err(map_query_err)?;
        Ok(user.clone())
    }
}

#[async_trait]
impl TokenStore for SqliteStore {
    async fn get_token(
        &self,
        user_id: Uuid,
        provider: &str,
        product: &str,
    ) -> PersistenceResult<Option<OAuthToken>> {
        let row = sqlx::query(
            "SELECT * FROM google_oauth_tokens WHERE user_id = ? AND provider = ? AND product = ?",
        )
        .bind(user_id.to_string())
        .bind(provider)
        .bind(product)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_query_err)?;
        row.as_ref().map(parse_token_row).transpose()
    }

    async fn upsert_token(&self, token: &OAuthToken) -> PersistenceResult<()> {
        let scopes = serde_json::to_string(&token.scopes)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO google_oauth_tokens (
                user_id, provider, product, scopes, refresh_token_encrypted,
                access_token_encrypted, expiry, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(token.user_id.to_string())
        .bind(&token.provider)
        .bind(&token.product)
        .bind(scopes)
        .bind(&token.refresh_token_encrypted)
        .bind(&token.access_token_encrypted)
        .bind(fmt_opt_dt(&token.expiry))
        .bind(fmt_dt(&token.created_at))
        .bind(fmt_dt(&token.updated_at))
        .execute(&self.pool)
        .await
        .map_err(map_query_err)?;
        Ok(())
    }

    async fn delete_token(
        &self,
        user_id: Uuid,
        provider: &str,
        product: &str,
    ) -> PersistenceResult<usize> {
        let result = sqlx::query(
            "DELETE FROM google_oauth_tokens WHERE user_id = ? AND provider = ? AND product = ?",
        )
        .bind(user_id.to_string())
        .bind(provider)
        .bind(product)
        .execute(&self.pool)
        .await
        .map_err(map_query_err)?;
        Ok(result.rows_affected() as usize)
    }
}

#[async_trait]
impl ApiTokenStore for SqliteStore {
    async fn insert_api_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> PersistenceResult<()> {
        sqlx::query("INSERT INTO api_tokens (token_hash, user_id, created_at) VALUES (?, ?, ?)")
            .bind(token_hash)
            .bind(user_id.to_string())
            .bind(fmt_dt(&now))
            .execute(&self.pool)
            .await
            .map_err(map_query_err)?;
        Ok(())
    }

    async fn find_user_by_token_hash(&self, token_hash: &str) -> PersistenceResult<Option<Uuid>> {
        let row = sqlx::query("SELECT user_id FROM api_tokens WHERE token_hash = ?")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_query_err)?;
        row.as_ref().map(|r| get_uuid(r, "user_id")).transpose()
    }
}

impl Store for SqliteStore {
    fn backend_name(&self) -> &str {
        "sqlite"
    }
}
