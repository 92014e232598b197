//! Router wiring and the serve loop.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness check — always `200 OK`. |
//! | `*`    | `/tasks...` | Task CRUD, bulk ops, add_smart. |
//! | `POST` | `/capture` | Natural-language capture. |
//! | `POST/GET` | `/schedule` | Plan rebuild / current plan. |
//! | `POST` | `/sync-calendar` | Calendar reconciliation. |
//! | `*`    | `/auth/...` | Google OAuth + shortcut tokens. |

use axum::{Json, Router, routing::get};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::handlers::{auth, capture, schedule, tasks};
use crate::state::{AppState, SharedState};

/// Build the full application router.
pub fn build_app(state: AppState) -> Router {
    let state: SharedState = Arc::new(state);
    Router::new()
        .route("/health", get(health))
        .merge(tasks::tasks_router())
        .merge(capture::capture_router())
        .merge(schedule::schedule_router())
        .merge(auth::auth_router())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Bind and serve until shutdown.
pub async fn serve(state: AppState, port: u16) -> std::io::Result<()> {
    let app = build_app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "qzWhatNext gateway listening");
    axum::serve(listener, app).await
}
