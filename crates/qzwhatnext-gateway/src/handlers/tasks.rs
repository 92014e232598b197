//! Task CRUD endpoints
//!
//! POST   /tasks                 - create a task
//! GET    /tasks                 - list non-deleted tasks, newest first
//! GET    /tasks/{id}            - fetch one task
//! PUT    /tasks/{id}            - partial update
//! DELETE /tasks/{id}            - soft delete (cascades scheduled blocks)
//! POST   /tasks/{id}/restore    - undo a soft delete
//! DELETE /tasks/{id}/purge      - permanent delete
//! POST   /tasks/bulk_delete / bulk_restore / bulk_purge
//! POST   /tasks/add_smart       - create from free-form notes (AI-gated)

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use qzwhatnext_foundation::inference::{
    CATEGORY_CONFIDENCE_THRESHOLD, DURATION_CONFIDENCE_THRESHOLD,
};
use qzwhatnext_foundation::persistence::{BlockStore, TaskStore};
use qzwhatnext_kernel::engine::is_ai_excluded;
use qzwhatnext_kernel::model::task::{MAX_DURATION_MIN, MIN_DURATION_MIN};
use qzwhatnext_kernel::model::{Task, TaskCategory, TaskStatus};

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

// ─────────────────────────────────────────────────────────────────────────────
// DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TaskCreateRequest {
    pub title: String,
    pub notes: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub start_after: Option<NaiveDate>,
    pub due_by: Option<NaiveDate>,
    #[serde(alias = "duration")]
    pub estimated_duration_min: Option<u32>,
    pub category: Option<TaskCategory>,
}

#[derive(Debug, Deserialize)]
pub struct TaskUpdateRequest {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub status: Option<TaskStatus>,
    pub deadline: Option<DateTime<Utc>>,
    pub start_after: Option<NaiveDate>,
    pub due_by: Option<NaiveDate>,
    pub estimated_duration_min: Option<u32>,
    pub category: Option<TaskCategory>,
    pub ai_excluded: Option<bool>,
    pub manually_scheduled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct BulkTasksRequest {
    pub task_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct BulkTasksResponse {
    pub affected_count: usize,
    pub not_found_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AddSmartRequest {
    pub notes: String,
}

fn validate_duration(minutes: u32) -> ApiResult<()> {
    if !(MIN_DURATION_MIN..=MAX_DURATION_MIN).contains(&minutes) {
        return Err(ApiError::InvalidRequest(format!(
            "estimated_duration_min must be between {MIN_DURATION_MIN} and {MAX_DURATION_MIN}"
        )));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /tasks
pub async fn create_task(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<TaskCreateRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.title.trim().is_empty() {
        return Err(ApiError::InvalidRequest("title must not be empty".into()));
    }
    if let Some(minutes) = req.estimated_duration_min {
        validate_duration(minutes)?;
    }

    let now = state.clock.now();
    let mut task = Task::new(user_id, "api", req.title, now)
        .with_notes(req.notes)
        .with_deadline(req.deadline)
        .with_start_after(req.start_after)
        .with_due_by(req.due_by);
    if let Some(minutes) = req.estimated_duration_min {
        task = task.with_duration(minutes);
    }
    if let Some(category) = req.category {
        task = task.with_category(category);
    }

    state
        .store
        .create_task(&task)
        .await
        .map_err(qzwhatnext_runtime::RuntimeError::from)?;
    tracing::info!(user_id = %user_id, task_id = %task.id, "task created");

    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /tasks
pub async fn list_tasks(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let tasks = state
        .store
        .list_tasks(user_id)
        .await
        .map_err(qzwhatnext_runtime::RuntimeError::from)?;
    let total = tasks.len();
    Ok(Json(json!({ "tasks": tasks, "total": total })))
}

/// GET /tasks/{id}
pub async fn get_task(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(task_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let task = state
        .store
        .get_task(user_id, task_id)
        .await
        .map_err(qzwhatnext_runtime::RuntimeError::from)?
        .ok_or_else(|| ApiError::NotFound(task_id.to_string()))?;
    Ok(Json(task))
}

/// PUT /tasks/{id}
pub async fn update_task(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(task_id): Path<Uuid>,
    Json(req): Json<TaskUpdateRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut task = state
        .store
        .get_task(user_id, task_id)
        .await
        .map_err(qzwhatnext_runtime::RuntimeError::from)?
        .ok_or_else(|| ApiError::NotFound(task_id.to_string()))?;

    if let Some(title) = req.title {
        if title.trim().is_empty() {
            return Err(ApiError::InvalidRequest("title must not be empty".into()));
        }
        task.ai_excluded = task.ai_excluded || title.starts_with('.');
        task.title = title;
    }
    if let Some(minutes) = req.estimated_duration_min {
        validate_duration(minutes)?;
        task.estimated_duration_min = minutes;
    }
    if let Some(notes) = req.notes {
        task.notes = Some(notes);
    }
    if let Some(status) = req.status {
        task.status = status;
    }
    if let Some(deadline) = req.deadline {
        task.deadline = Some(deadline);
    }
    if let Some(start_after) = req.start_after {
        task.start_after = Some(start_after);
    }
    if let Some(due_by) = req.due_by {
        task.due_by = Some(due_by);
    }
    if let Some(category) = req.category {
        task.category = category;
    }
    if let Some(ai_excluded) = req.ai_excluded {
        task.ai_excluded = ai_excluded || task.title.starts_with('.');
    }
    if let Some(manually_scheduled) = req.manually_scheduled {
        task.manually_scheduled = manually_scheduled;
    }
    task.updated_at = state.clock.now();

    let task = state
        .store
        .update_task(&task)
        .await
        .map_err(qzwhatnext_runtime::RuntimeError::from)?;
    Ok(Json(task))
}

/// DELETE /tasks/{id}
///
/// Soft delete; scheduled blocks for the task go with it so the plan
/// never references missing tasks.
pub async fn delete_task(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(task_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let now = state.clock.now();
    let deleted = state
        .store
        .soft_delete_task(user_id, task_id, now)
        .await
        .map_err(qzwhatnext_runtime::RuntimeError::from)?;
    if !deleted {
        return Err(ApiError::NotFound(task_id.to_string()));
    }
    state
        .store
        .delete_blocks_for_tasks(user_id, &[task_id])
        .await
        .map_err(qzwhatnext_runtime::RuntimeError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /tasks/{id}/restore
pub async fn restore_task(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(task_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let restored = state
        .store
        .restore_task(user_id, task_id)
        .await
        .map_err(qzwhatnext_runtime::RuntimeError::from)?;
    if !restored {
        return Err(ApiError::NotFound(task_id.to_string()));
    }
    Ok(Json(json!({ "id": task_id, "status": "restored" })))
}

/// DELETE /tasks/{id}/purge
pub async fn purge_task(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(task_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state
        .store
        .delete_blocks_for_tasks(user_id, &[task_id])
        .await
        .map_err(qzwhatnext_runtime::RuntimeError::from)?;
    let purged = state
        .store
        .purge_task(user_id, task_id)
        .await
        .map_err(qzwhatnext_runtime::RuntimeError::from)?;
    if !purged {
        return Err(ApiError::NotFound(task_id.to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /tasks/bulk_delete
pub async fn bulk_delete(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<BulkTasksRequest>,
) -> ApiResult<impl IntoResponse> {
    let now = state.clock.now();
    let outcome = state
        .store
        .bulk_soft_delete(user_id, &req.task_ids, now)
        .await
        .map_err(qzwhatnext_runtime::RuntimeError::from)?;
    state
        .store
        .delete_blocks_for_tasks(user_id, &req.task_ids)
        .await
        .map_err(qzwhatnext_runtime::RuntimeError::from)?;
    Ok(Json(BulkTasksResponse {
        affected_count: outcome.affected_count,
        not_found_ids: outcome.not_found_ids,
    }))
}

/// POST /tasks/bulk_restore
pub async fn bulk_restore(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<BulkTasksRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state
        .store
        .bulk_restore(user_id, &req.task_ids)
        .await
        .map_err(qzwhatnext_runtime::RuntimeError::from)?;
    Ok(Json(BulkTasksResponse {
        affected_count: outcome.affected_count,
        not_found_ids: outcome.not_found_ids,
    }))
}

/// POST /tasks/bulk_purge
pub async fn bulk_purge(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<BulkTasksRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .store
        .delete_blocks_for_tasks(user_id, &req.task_ids)
        .await
        .map_err(qzwhatnext_runtime::RuntimeError::from)?;
    let outcome = state
        .store
        .bulk_purge(user_id, &req.task_ids)
        .await
        .map_err(qzwhatnext_runtime::RuntimeError::from)?;
    Ok(Json(BulkTasksResponse {
        affected_count: outcome.affected_count,
        not_found_ids: outcome.not_found_ids,
    }))
}

/// POST /tasks/add_smart
///
/// Creates a task from free-form notes. The AI-exclusion gate is
/// enforced here, before the classifier is ever consulted: dotted notes
/// never leave the process.
pub async fn add_smart(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<AddSmartRequest>,
) -> ApiResult<impl IntoResponse> {
    let notes = req.notes.trim().to_string();
    if notes.is_empty() {
        return Err(ApiError::InvalidRequest("notes must not be empty".into()));
    }
    let now = state.clock.now();

    // The gate decides on the deterministic draft, before anything can
    // reach the classifier.
    let draft = Task::new(user_id, "api", notes.clone(), now).with_notes(Some(notes.clone()));
    let task = if is_ai_excluded(&draft) {
        draft
    } else {
        let title = state
            .classifier
            .suggest_title(&notes)
            .await
            .unwrap_or_else(|| truncate_title(&notes));
        let category = state.classifier.suggest_category(&title, Some(&notes)).await;
        let duration = state.classifier.suggest_duration(&title, Some(&notes)).await;

        let mut task = Task {
            title,
            ..draft
        };
        if category.confidence >= CATEGORY_CONFIDENCE_THRESHOLD {
            task = task.with_category(category.category);
        }
        if duration.confidence >= DURATION_CONFIDENCE_THRESHOLD && duration.minutes > 0 {
            task = task.with_duration(duration.minutes);
        }
        task
    };

    state
        .store
        .create_task(&task)
        .await
        .map_err(qzwhatnext_runtime::RuntimeError::from)?;
    tracing::info!(user_id = %user_id, task_id = %task.id, ai_excluded = task.ai_excluded, "smart task created");

    Ok((StatusCode::CREATED, Json(task)))
}

fn truncate_title(notes: &str) -> String {
    let first_line = notes.lines().next().unwrap_or(notes);
    let mut title: String = first_line.chars().take(80).collect();
    if first_line.chars().count() > 80 {
        title.push('…');
    }
    title
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn tasks_router() -> axum::Router<SharedState> {
    use axum::routing::{delete, get, post, put};
    axum::Router::new()
        .route("/tasks", post(create_task).get(list_tasks))
        .route("/tasks/add_smart", post(add_smart))
        .route("/tasks/bulk_delete", post(bulk_delete))
        .route("/tasks/bulk_restore", post(bulk_restore))
        .route("/tasks/bulk_purge", post(bulk_purge))
        .route(
            "/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/tasks/{id}/restore", post(restore_task))
        .route("/tasks/{id}/purge", delete(purge_task))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_title_keeps_short_lines() {
        assert_eq!(truncate_title("buy milk"), "buy milk");
        assert_eq!(truncate_title("line one\nline two"), "line one");
    }

    #[test]
    fn truncate_title_caps_long_lines() {
        let long = "x".repeat(200);
        let title = truncate_title(&long);
        assert_eq!(title.chars().count(), 81);
        assert!(title.ends_with('…'));
    }
}
