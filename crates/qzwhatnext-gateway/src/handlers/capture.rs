//! Capture endpoint
//!
//! POST /capture - dispatch one natural-language instruction

use axum::{Json, extract::State, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use qzwhatnext_foundation::calendar::{CalendarGateway, GoogleCalendarClient};
use qzwhatnext_runtime::RuntimeError;
use qzwhatnext_runtime::calendar_session::connect_calendar;
use qzwhatnext_runtime::capture::capture_instruction;

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct CaptureRequest {
    pub instruction: String,
    pub entity_id: Option<Uuid>,
}

/// POST /capture
///
/// Works without a connected calendar: time blocks then persist locally
/// and their events appear on a later sync.
pub async fn capture(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<CaptureRequest>,
) -> ApiResult<impl IntoResponse> {
    let now = state.clock.now();

    let gateway: Option<GoogleCalendarClient> = match connect_calendar(
        state.store.as_ref(),
        &state.oauth,
        &state.cipher,
        user_id,
        &state.config.google_calendar_id,
        now,
    )
    .await
    {
        Ok(gateway) => Some(gateway),
        Err(RuntimeError::Calendar(
            qzwhatnext_foundation::calendar::CalendarError::NotConnected,
        )) => None,
        Err(e) => return Err(e.into()),
    };

    let time_zone = match &gateway {
        Some(gateway) => gateway.timezone().await.unwrap_or_else(|_| "UTC".into()),
        None => "UTC".to_string(),
    };

    let outcome = capture_instruction(
        state.store.as_ref(),
        gateway.as_ref().map(|g| g as &dyn CalendarGateway),
        user_id,
        &req.instruction,
        req.entity_id,
        &time_zone,
        now,
    )
    .await?;

    Ok(Json(json!({
        "action": outcome.action,
        "entity_kind": outcome.entity_kind,
        "entity_id": outcome.entity_id,
        "tasks_created": outcome.tasks_created,
        "calendar_event_id": outcome.calendar_event_id,
    })))
}

pub fn capture_router() -> axum::Router<SharedState> {
    use axum::routing::post;
    axum::Router::new().route("/capture", post(capture))
}
