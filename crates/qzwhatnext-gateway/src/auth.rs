//! Request authentication.
//!
//! Two credential kinds resolve to a user id:
//! - `Authorization: Bearer <jwt>` — session tokens from the OAuth flow
//! - `X-Shortcut-Token: <opaque>` — long-lived automation tokens,
//!   matched against stored peppered hashes

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use qzwhatnext_foundation::persistence::ApiTokenStore;
use qzwhatnext_foundation::security::{decode_access_token, hash_shortcut_token};

use crate::error::ApiError;
use crate::state::SharedState;

pub const SHORTCUT_TOKEN_HEADER: &str = "x-shortcut-token";

/// The authenticated principal. Every user-scoped handler extracts this.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Uuid);

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(value) = parts.headers.get(axum::http::header::AUTHORIZATION) {
            let raw = value.to_str().map_err(|_| ApiError::Unauthorized)?;
            let token = raw
                .strip_prefix("Bearer ")
                .or_else(|| raw.strip_prefix("bearer "))
                .ok_or(ApiError::Unauthorized)?;
            let user_id =
                decode_access_token(&state.jwt, token).ok_or(ApiError::Unauthorized)?;
            return Ok(CurrentUser(user_id));
        }

        if let Some(value) = parts.headers.get(SHORTCUT_TOKEN_HEADER) {
            let raw = value.to_str().map_err(|_| ApiError::Unauthorized)?;
            let hash = hash_shortcut_token(raw, &state.config.shortcut_token_pepper);
            let user_id = state
                .store
                .find_user_by_token_hash(&hash)
                .await
                .map_err(|e| ApiError::Internal(e.to_string()))?
                .ok_or(ApiError::Unauthorized)?;
            return Ok(CurrentUser(user_id));
        }

        Err(ApiError::Unauthorized)
    }
}
