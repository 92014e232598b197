//! Session JWTs (HS256 by default).

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT signing configuration, read from the environment at startup.
#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: Algorithm,
    pub expiration_hours: i64,
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>, algorithm: Algorithm, expiration_hours: i64) -> Self {
        Self {
            secret: secret.into(),
            algorithm,
            expiration_hours,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    iat: i64,
}

/// Create an access token for a user.
pub fn create_access_token(
    config: &JwtConfig,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now + Duration::hours(config.expiration_hours)).timestamp(),
        iat: now.timestamp(),
    };
    encode(
        &Header::new(config.algorithm),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

/// Decode and validate a token; `None` for anything expired or invalid.
pub fn decode_access_token(config: &JwtConfig, token: &str) -> Option<Uuid> {
    let validation = Validation::new(config.algorithm);
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .ok()?;
    Uuid::parse_str(&data.claims.sub).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JwtConfig {
        JwtConfig::new("test-secret", Algorithm::HS256, 24)
    }

    #[test]
    fn token_round_trips() {
        let user = Uuid::new_v4();
        let token = create_access_token(&config(), user, Utc::now()).unwrap();
        assert_eq!(decode_access_token(&config(), &token), Some(user));
    }

    #[test]
    fn expired_token_is_rejected() {
        let user = Uuid::new_v4();
        let issued = Utc::now() - Duration::hours(48);
        let token = create_access_token(&config(), user, issued).unwrap();
        assert_eq!(decode_access_token(&config(), &token), None);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let user = Uuid::new_v4();
        let token = create_access_token(&config(), user, Utc::now()).unwrap();
        let other = JwtConfig::new("other-secret", Algorithm::HS256, 24);
        assert_eq!(decode_access_token(&other, &token), None);
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(decode_access_token(&config(), "not-a-jwt"), None);
    }
}
