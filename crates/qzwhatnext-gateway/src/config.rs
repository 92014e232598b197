//! Environment configuration.
//!
//! Every knob the service reads, in one place:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `DATABASE_URL` | `sqlite://qzwhatnext.db` | Persistence DSN. |
//! | `PORT` | `8000` | TCP port to listen on. |
//! | `JWT_SECRET_KEY` | *(required)* | HS256 signing secret. |
//! | `JWT_ALGORITHM` | `HS256` | JWT algorithm. |
//! | `JWT_EXPIRATION_HOURS` | `24` | Session token lifetime. |
//! | `TOKEN_ENCRYPTION_KEY` | *(required)* | AEAD key, base64url 32 bytes. |
//! | `SHORTCUT_TOKEN_PEPPER` | falls back to `JWT_SECRET_KEY` | HMAC pepper for shortcut-token hashes. |
//! | `GOOGLE_OAUTH_CLIENT_ID` / `GOOGLE_OAUTH_CLIENT_SECRET` | *(required for OAuth)* | OAuth client. |
//! | `GOOGLE_CALENDAR_ID` | `primary` | Calendar to sync against. |
//! | `DB_POOL_SIZE` | `5` | Connection pool size. |
//! | `DB_POOL_TIMEOUT_SEC` | `30` | Pool acquire timeout. |
//! | `SCHEDULE_HORIZON_DAYS` | `7` | Scheduling horizon length. |

use jsonwebtoken::Algorithm;

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_algorithm: Algorithm,
    pub jwt_expiration_hours: i64,
    pub token_encryption_key: String,
    pub shortcut_token_pepper: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub google_calendar_id: String,
    pub db_pool_size: u32,
    pub db_pool_timeout_sec: u64,
    pub horizon_days: i64,
}

impl AppConfig {
    /// Read configuration from the environment.
    pub fn from_env() -> Self {
        let jwt_secret =
            std::env::var("JWT_SECRET_KEY").unwrap_or_else(|_| "change-me-in-production".into());
        let shortcut_token_pepper =
            std::env::var("SHORTCUT_TOKEN_PEPPER").unwrap_or_else(|_| jwt_secret.clone());

        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://qzwhatnext.db".into()),
            port: env_parse("PORT", 8000),
            jwt_algorithm: match std::env::var("JWT_ALGORITHM").as_deref() {
                Ok("HS384") => Algorithm::HS384,
                Ok("HS512") => Algorithm::HS512,
                _ => Algorithm::HS256,
            },
            jwt_expiration_hours: env_parse("JWT_EXPIRATION_HOURS", 24),
            token_encryption_key: std::env::var("TOKEN_ENCRYPTION_KEY").unwrap_or_default(),
            google_client_id: std::env::var("GOOGLE_OAUTH_CLIENT_ID").unwrap_or_default(),
            google_client_secret: std::env::var("GOOGLE_OAUTH_CLIENT_SECRET").unwrap_or_default(),
            google_calendar_id: std::env::var("GOOGLE_CALENDAR_ID")
                .unwrap_or_else(|_| "primary".into()),
            db_pool_size: env_parse("DB_POOL_SIZE", 5),
            db_pool_timeout_sec: env_parse("DB_POOL_TIMEOUT_SEC", 30),
            horizon_days: env_parse("SCHEDULE_HORIZON_DAYS", 7),
            jwt_secret,
            shortcut_token_pepper,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        // Not asserting against real env vars; just the parser helper.
        assert_eq!(env_parse("QZ_DOES_NOT_EXIST", 42u16), 42);
    }
}
