//! Google OAuth endpoints + shortcut-token issuance
//!
//! GET  /auth/google/auth-url           - consent URL for sign-in
//! GET  /auth/google/calendar/auth-url  - same scopes, calendar entry point
//! GET  /auth/google/callback           - code exchange via redirect
//! POST /auth/google/code-exchange      - code exchange via JSON body
//! POST /auth/shortcut-token            - mint a long-lived automation token

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use base64::Engine;
use rand::RngCore;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use qzwhatnext_foundation::persistence::{ApiTokenStore, TokenStore, UserStore};
use qzwhatnext_foundation::security::{
    create_access_token, generate_shortcut_token, hash_shortcut_token,
};
use qzwhatnext_kernel::model::{OAuthToken, PRODUCT_CALENDAR, PROVIDER_GOOGLE, User};
use qzwhatnext_runtime::RuntimeError;

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct AuthUrlQuery {
    pub redirect_uri: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CodeExchangeRequest {
    pub code: String,
    pub redirect_uri: String,
}

/// GET /auth/google/auth-url and /auth/google/calendar/auth-url
pub async fn auth_url(
    State(state): State<SharedState>,
    Query(query): Query<AuthUrlQuery>,
) -> ApiResult<impl IntoResponse> {
    let csrf_state = random_state();
    let url = state.oauth.auth_url(&query.redirect_uri, &csrf_state);
    Ok(Json(json!({ "auth_url": url, "state": csrf_state })))
}

/// GET /auth/google/callback
pub async fn callback(
    State(state): State<SharedState>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<impl IntoResponse> {
    exchange(&state, &query.code, query.redirect_uri.as_deref().unwrap_or_default()).await
}

/// POST /auth/google/code-exchange
pub async fn code_exchange(
    State(state): State<SharedState>,
    Json(req): Json<CodeExchangeRequest>,
) -> ApiResult<impl IntoResponse> {
    exchange(&state, &req.code, &req.redirect_uri).await
}

/// Common path: code → tokens → identity → session JWT.
async fn exchange(
    state: &SharedState,
    code: &str,
    redirect_uri: &str,
) -> ApiResult<Json<serde_json::Value>> {
    let now = state.clock.now();
    let tokens = state
        .oauth
        .exchange_code(code, redirect_uri)
        .await
        .map_err(RuntimeError::from)?;
    let identity = state
        .oauth
        .fetch_userinfo(&tokens.access_token)
        .await
        .map_err(RuntimeError::from)?;

    let user = state
        .store
        .get_or_create_user(&User {
            id: Uuid::new_v4(),
            email: identity.email.clone().unwrap_or_default(),
            name: identity.name.clone(),
            google_sub: identity.sub.clone(),
            created_at: now,
        })
        .await
        .map_err(RuntimeError::from)?;

    // Persist the calendar grant when Google returned a refresh token.
    let calendar_connected = if let Some(refresh_token) = &tokens.refresh_token {
        let row = OAuthToken {
            user_id: user.id,
            provider: PROVIDER_GOOGLE.to_string(),
            product: PRODUCT_CALENDAR.to_string(),
            scopes: tokens
                .scope
                .as_deref()
                .unwrap_or_default()
                .split_whitespace()
                .map(String::from)
                .collect(),
            refresh_token_encrypted: state
                .cipher
                .seal(refresh_token)
                .map_err(RuntimeError::from)?,
            access_token_encrypted: Some(
                state
                    .cipher
                    .seal(&tokens.access_token)
                    .map_err(RuntimeError::from)?,
            ),
            expiry: tokens
                .expires_in
                .map(|seconds| now + chrono::Duration::seconds(seconds)),
            created_at: now,
            updated_at: now,
        };
        state.store.upsert_token(&row).await.map_err(RuntimeError::from)?;
        true
    } else {
        state
            .store
            .get_token(user.id, PROVIDER_GOOGLE, PRODUCT_CALENDAR)
            .await
            .map_err(RuntimeError::from)?
            .is_some()
    };

    let jwt = create_access_token(&state.jwt, user.id, now)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    tracing::info!(user_id = %user.id, calendar_connected, "user signed in");

    Ok(Json(json!({
        "access_token": jwt,
        "token_type": "bearer",
        "calendar_connected": calendar_connected,
        "user": {
            "id": user.id,
            "email": user.email,
            "name": user.name,
        },
    })))
}

/// POST /auth/shortcut-token
///
/// Returns the raw token exactly once; only its peppered hash is stored.
pub async fn create_shortcut_token(
    State(state): State<SharedState>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let token = generate_shortcut_token();
    let hash = hash_shortcut_token(&token, &state.config.shortcut_token_pepper);
    state
        .store
        .insert_api_token(user_id, &hash, state.clock.now())
        .await
        .map_err(RuntimeError::from)?;
    Ok(Json(json!({ "token": token, "token_type": "shortcut" })))
}

fn random_state() -> String {
    let mut raw = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut raw);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw)
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn auth_router() -> axum::Router<SharedState> {
    use axum::routing::{get, post};
    axum::Router::new()
        .route("/auth/google/auth-url", get(auth_url))
        .route("/auth/google/calendar/auth-url", get(auth_url))
        .route("/auth/google/callback", get(callback))
        .route("/auth/google/code-exchange", post(code_exchange))
        .route("/auth/shortcut-token", post(create_shortcut_token))
}
