//! User and per-user OAuth token metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PROVIDER_GOOGLE: &str = "google";
pub const PRODUCT_CALENDAR: &str = "calendar";

/// An authenticated principal. All other entities are scoped to a user
/// and cascade on user removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    /// Google account subject (`sub` claim) this user signed in with.
    pub google_sub: String,
    pub created_at: DateTime<Utc>,
}

/// Stored OAuth token row, keyed by `(user_id, provider, product)`.
///
/// Both token columns hold AEAD ciphertext; raw secrets never appear in
/// this struct's `Debug` output or in logs.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub user_id: Uuid,
    pub provider: String,
    pub product: String,
    pub scopes: Vec<String>,
    pub refresh_token_encrypted: String,
    pub access_token_encrypted: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthToken")
            .field("user_id", &self.user_id)
            .field("provider", &self.provider)
            .field("product", &self.product)
            .field("scopes", &self.scopes)
            .field("refresh_token_encrypted", &"<redacted>")
            .field("access_token_encrypted", &"<redacted>")
            .field("expiry", &self.expiry)
            .finish()
    }
}
