//! qzWhatNext gateway — the axum-based HTTP surface.
//!
//! Handlers are thin: authentication resolves the principal, the
//! runtime crates do the work, and [`error::ApiError`] maps failures to
//! stable `{"error": {"code", "message"}}` bodies.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod state;

pub use config::AppConfig;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
