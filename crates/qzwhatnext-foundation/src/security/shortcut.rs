//! Shortcut tokens — long-lived opaque tokens for automation clients
//! (iOS Shortcuts and similar) that cannot run the OAuth dance.
//!
//! The raw token is handed to the user exactly once; only a peppered
//! HMAC-SHA256 hash is stored and looked up.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hash a shortcut token for storage/lookup.
pub fn hash_shortcut_token(token: &str, pepper: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(pepper.as_bytes()).expect("hmac accepts any key length");
    mac.update(token.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Generate a new random token to hand to the user once. URL-safe and
/// copy/paste friendly.
pub fn generate_shortcut_token() -> String {
    let mut raw = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut raw);
    URL_SAFE_NO_PAD.encode(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_per_pepper() {
        let token = "abc123";
        assert_eq!(
            hash_shortcut_token(token, "pepper"),
            hash_shortcut_token(token, "pepper")
        );
        assert_ne!(
            hash_shortcut_token(token, "pepper"),
            hash_shortcut_token(token, "other-pepper")
        );
    }

    #[test]
    fn generated_tokens_are_unique_and_urlsafe() {
        let a = generate_shortcut_token();
        let b = generate_shortcut_token();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
