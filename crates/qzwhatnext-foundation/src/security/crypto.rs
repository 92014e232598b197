//! AEAD sealing for OAuth secrets at rest.
//!
//! AES-256-GCM keyed from process configuration (`TOKEN_ENCRYPTION_KEY`,
//! base64url, 32 bytes). Ciphertext format: base64url(nonce || cipher).
//! Key rotation replaces only the key, not the column format. Decryption
//! failures surface as [`CryptoError::Decrypt`] and are never retried
//! silently.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// `TOKEN_ENCRYPTION_KEY` missing or not base64url of 32 bytes.
    #[error("token encryption key is invalid: {0}")]
    Key(String),

    /// Stored token could not be decrypted; the key may be wrong.
    #[error("stored token could not be decrypted")]
    Decrypt,
}

impl CryptoError {
    pub fn code(&self) -> &'static str {
        "TOKEN_ENCRYPTION_FAILURE"
    }
}

/// Symmetric cipher for token columns.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// Build from a base64url-encoded 32-byte key.
    pub fn from_base64_key(encoded: &str) -> Result<Self, CryptoError> {
        let trimmed = encoded.trim().trim_end_matches('=');
        if trimmed.is_empty() {
            return Err(CryptoError::Key(
                "TOKEN_ENCRYPTION_KEY is not set; set it to a base64url 32-byte key".into(),
            ));
        }
        let raw = URL_SAFE_NO_PAD
            .decode(trimmed)
            .map_err(|e| CryptoError::Key(e.to_string()))?;
        if raw.len() != 32 {
            return Err(CryptoError::Key(format!(
                "expected 32 key bytes, got {}",
                raw.len()
            )));
        }
        let key = Key::<Aes256Gcm>::from_slice(&raw);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypt a secret for storage.
    pub fn seal(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Decrypt)?;
        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(combined))
    }

    /// Decrypt a stored secret.
    pub fn open(&self, sealed: &str) -> Result<String, CryptoError> {
        let combined = URL_SAFE_NO_PAD
            .decode(sealed.trim())
            .map_err(|_| CryptoError::Decrypt)?;
        if combined.len() <= NONCE_LEN {
            return Err(CryptoError::Decrypt);
        }
        let (nonce, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)
    }
}
