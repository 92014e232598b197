//! Google OAuth2 client: auth-url construction, code exchange, and
//! refresh-token → access-token refresh.
//!
//! `invalid_grant` from the token endpoint means the user revoked our
//! access; it surfaces as [`CalendarError::AuthRevoked`] so callers can
//! clear the stored token row.

use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;

use super::gateway::{CalendarError, CalendarResult};

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// OAuth scopes we request: calendar plus basic identity.
pub const SCOPES: &str =
    "https://www.googleapis.com/auth/calendar openid email profile";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of a code exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    /// Present on first consent (or when `prompt=consent` forces re-issue).
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Basic identity from the OpenID userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Clone)]
pub struct GoogleOAuth {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token_endpoint: String,
}

impl GoogleOAuth {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self {
            http,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_endpoint: TOKEN_ENDPOINT.to_string(),
        }
    }

    /// Override the token endpoint (tests).
    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = endpoint.into();
        self
    }

    /// Consent URL the browser is sent to. `access_type=offline` +
    /// `prompt=consent` so we always receive a refresh token.
    pub fn auth_url(&self, redirect_uri: &str, state: &str) -> String {
        Url::parse_with_params(
            AUTH_ENDPOINT,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state),
            ],
        )
        .expect("static endpoint parses")
        .to_string()
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> CalendarResult<OAuthTokens> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| CalendarError::Transient(e.to_string()))?;
        Self::read_token_response(response).await
    }

    /// Mint a fresh access token from the stored refresh token.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> CalendarResult<OAuthTokens> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| CalendarError::Transient(e.to_string()))?;
        Self::read_token_response(response).await
    }

    /// Resolve the authenticated user's identity.
    pub async fn fetch_userinfo(&self, access_token: &str) -> CalendarResult<UserInfo> {
        let response = self
            .http
            .get(USERINFO_ENDPOINT)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| CalendarError::Transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CalendarError::Api(format!(
                "userinfo returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| CalendarError::Api(e.to_string()))
    }

    async fn read_token_response(response: reqwest::Response) -> CalendarResult<OAuthTokens> {
        let status = response.status();
        if status.is_server_error() {
            return Err(CalendarError::Transient(format!("token endpoint {status}")));
        }
        let body = response
            .text()
            .await
            .map_err(|e| CalendarError::Transient(e.to_string()))?;
        if !status.is_success() {
            if body.contains("invalid_grant") {
                return Err(CalendarError::AuthRevoked);
            }
            return Err(CalendarError::Api(format!("{status}: {body}")));
        }
        serde_json::from_str(&body).map_err(|e| CalendarError::Api(e.to_string()))
    }
}
