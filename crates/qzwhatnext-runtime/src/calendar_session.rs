//! Stored token → authenticated Google Calendar client.
//!
//! The reconciler's precondition: load the user's refresh token, unseal
//! it, refresh the access token, and persist the rotated access token.
//! `invalid_grant` clears the token row so the user is asked to
//! reconnect instead of failing forever.

use chrono::{DateTime, Duration, Utc};
use tracing::info;
use uuid::Uuid;

use qzwhatnext_foundation::calendar::{CalendarError, GoogleCalendarClient, GoogleOAuth};
use qzwhatnext_foundation::persistence::{Store, TokenStore};
use qzwhatnext_foundation::security::TokenCipher;
use qzwhatnext_kernel::model::{OAuthToken, PRODUCT_CALENDAR, PROVIDER_GOOGLE};

use crate::error::RuntimeResult;

/// Build an authenticated calendar client for a user.
pub async fn connect_calendar(
    store: &dyn Store,
    oauth: &GoogleOAuth,
    cipher: &TokenCipher,
    user_id: Uuid,
    calendar_id: &str,
    now: DateTime<Utc>,
) -> RuntimeResult<GoogleCalendarClient> {
    let Some(row) = store
        .get_token(user_id, PROVIDER_GOOGLE, PRODUCT_CALENDAR)
        .await?
    else {
        return Err(CalendarError::NotConnected.into());
    };

    let refresh_token = cipher.open(&row.refresh_token_encrypted)?;

    let tokens = match oauth.refresh_access_token(&refresh_token).await {
        Ok(tokens) => tokens,
        Err(CalendarError::AuthRevoked) => {
            // The grant is gone; keeping the row would fail every pass.
            store
                .delete_token(user_id, PROVIDER_GOOGLE, PRODUCT_CALENDAR)
                .await?;
            info!(user_id = %user_id, "calendar grant revoked; cleared stored token");
            return Err(CalendarError::AuthRevoked.into());
        }
        Err(e) => return Err(e.into()),
    };

    // Persist the rotated access token for observability; the refresh
    // token is the durable credential.
    let updated = OAuthToken {
        access_token_encrypted: Some(cipher.seal(&tokens.access_token)?),
        expiry: tokens
            .expires_in
            .map(|seconds| now + Duration::seconds(seconds)),
        updated_at: now,
        ..row
    };
    store.upsert_token(&updated).await?;

    Ok(GoogleCalendarClient::new(tokens.access_token, calendar_id))
}
