//! Scheduling + calendar sync endpoints
//!
//! POST /schedule                     - materialize + rebuild the plan
//! GET  /schedule                     - current plan
//! POST /sync-calendar                - run the reconciler
//! POST /schedule/blocks/{id}/lock    - freeze a block
//! POST /schedule/blocks/{id}/unlock  - unfreeze a block

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

use qzwhatnext_foundation::calendar::CalendarGateway;
use qzwhatnext_foundation::persistence::{BlockStore, TaskStore};
use qzwhatnext_kernel::engine::Horizon;
use qzwhatnext_kernel::model::{EntityType, ScheduledBlock, Task};
use qzwhatnext_runtime::calendar_session::connect_calendar;
use qzwhatnext_runtime::materializer::materialize_recurring_tasks;
use qzwhatnext_runtime::planner::rebuild_plan;
use qzwhatnext_runtime::reconciler::reconcile;

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub scheduled_blocks: Vec<ScheduledBlock>,
    pub overflow_tasks: Vec<Task>,
    pub start_time: Option<DateTime<Utc>>,
    pub task_titles: HashMap<Uuid, String>,
}

/// POST /schedule
pub async fn build_schedule(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let lock = state.locks.for_user(user_id);
    let _guard = lock.lock().await;

    let now = state.clock.now();
    let horizon = Horizon::days_from(now, state.config.horizon_days);

    materialize_recurring_tasks(state.store.as_ref(), user_id, horizon.start, horizon.end, now)
        .await?;

    let gateway = connect_calendar(
        state.store.as_ref(),
        &state.oauth,
        &state.cipher,
        user_id,
        &state.config.google_calendar_id,
        now,
    )
    .await?;
    let time_zone = gateway.timezone().await.unwrap_or_else(|_| "UTC".into());

    let plan = rebuild_plan(
        state.store.as_ref(),
        &gateway,
        user_id,
        horizon,
        &time_zone,
        now,
    )
    .await?;

    Ok(Json(ScheduleResponse {
        task_titles: plan.task_titles(),
        scheduled_blocks: plan.blocks,
        overflow_tasks: plan.overflow,
        start_time: Some(plan.start_time),
    }))
}

/// GET /schedule
pub async fn view_schedule(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let blocks = state
        .store
        .list_blocks(user_id)
        .await
        .map_err(qzwhatnext_runtime::RuntimeError::from)?;
    if blocks.is_empty() {
        return Err(ApiError::NotFound(
            "no schedule available; build one first".into(),
        ));
    }

    let tasks = state
        .store
        .list_tasks(user_id)
        .await
        .map_err(qzwhatnext_runtime::RuntimeError::from)?;
    let task_titles: HashMap<Uuid, String> = blocks
        .iter()
        .filter(|b| b.entity_type == EntityType::Task)
        .filter_map(|b| {
            tasks
                .iter()
                .find(|t| t.id == b.entity_id)
                .map(|t| (t.id, t.title.clone()))
        })
        .collect();

    let start_time = blocks.first().map(|b| b.start_time);
    Ok(Json(ScheduleResponse {
        scheduled_blocks: blocks,
        overflow_tasks: Vec::new(),
        start_time,
        task_titles,
    }))
}

/// POST /sync-calendar
pub async fn sync_calendar(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let lock = state.locks.for_user(user_id);
    let _guard = lock.lock().await;

    let now = state.clock.now();
    let horizon = Horizon::days_from(now, state.config.horizon_days);

    materialize_recurring_tasks(state.store.as_ref(), user_id, horizon.start, horizon.end, now)
        .await?;

    let gateway = connect_calendar(
        state.store.as_ref(),
        &state.oauth,
        &state.cipher,
        user_id,
        &state.config.google_calendar_id,
        now,
    )
    .await?;
    let time_zone = gateway.timezone().await.unwrap_or_else(|_| "UTC".into());

    let outcome = reconcile(
        state.store.as_ref(),
        &gateway,
        user_id,
        horizon,
        &time_zone,
        now,
    )
    .await?;

    Ok(Json(json!({
        "events_created": outcome.events_created,
        "events_patched": outcome.events_patched,
        "events_deleted": outcome.events_deleted,
        "blocks_imported": outcome.blocks_imported,
        "event_ids": outcome.event_ids,
    })))
}

/// POST /schedule/blocks/{id}/lock
pub async fn lock_block(
    state: State<SharedState>,
    user: CurrentUser,
    path: Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    set_locked(state, user, path, true).await
}

/// POST /schedule/blocks/{id}/unlock
pub async fn unlock_block(
    state: State<SharedState>,
    user: CurrentUser,
    path: Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    set_locked(state, user, path, false).await
}

async fn set_locked(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Path(block_id): Path<Uuid>,
    locked: bool,
) -> ApiResult<Json<ScheduledBlock>> {
    let block = state
        .store
        .set_block_locked(user_id, block_id, locked)
        .await
        .map_err(qzwhatnext_runtime::RuntimeError::from)?
        .ok_or_else(|| ApiError::NotFound(block_id.to_string()))?;
    tracing::info!(user_id = %user_id, block_id = %block_id, locked, "block lock toggled");
    Ok(Json(block))
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn schedule_router() -> axum::Router<SharedState> {
    use axum::routing::{get, post};
    axum::Router::new()
        .route("/schedule", post(build_schedule).get(view_schedule))
        .route("/sync-calendar", post(sync_calendar))
        .route("/schedule/blocks/{id}/lock", post(lock_block))
        .route("/schedule/blocks/{id}/unlock", post(unlock_block))
}
