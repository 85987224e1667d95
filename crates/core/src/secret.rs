//! Envelope encryption for verification tokens at rest.
//!
//! The verification token is a shared secret with the provider, so the
//! database row stores only an AES-256-GCM envelope: a random 96-bit nonce
//! followed by the ciphertext. The key is supplied by process configuration
//! (base64, 32 bytes) and never leaves memory.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::CoreError;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Encrypts and decrypts verification tokens for storage.
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// Build a cipher from a base64-encoded 32-byte key.
    pub fn from_base64_key(encoded: &str) -> Result<Self, CoreError> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| CoreError::Validation(format!("token key is not valid base64: {e}")))?;
        if bytes.len() != 32 {
            return Err(CoreError::Validation(format!(
                "token key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let key = Key::<Aes256Gcm>::from_slice(&bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypt a token. Output layout: `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, CoreError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CoreError::Internal("token encryption failed".into()))?;

        let mut envelope = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&ciphertext);
        Ok(envelope)
    }

    /// Decrypt an envelope produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, envelope: &[u8]) -> Result<String, CoreError> {
        if envelope.len() <= NONCE_LEN {
            return Err(CoreError::Internal("token envelope too short".into()));
        }
        let (nonce, ciphertext) = envelope.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CoreError::Internal("token decryption failed".into()))?;
        String::from_utf8(plaintext)
            .map_err(|_| CoreError::Internal("decrypted token is not UTF-8".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> TokenCipher {
        // 32 zero bytes, base64-encoded.
        TokenCipher::from_base64_key("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=").unwrap()
    }

    #[test]
    fn roundtrip() {
        let cipher = test_cipher();
        let envelope = cipher.encrypt("super-secret-token").unwrap();
        assert_eq!(cipher.decrypt(&envelope).unwrap(), "super-secret-token");
    }

    #[test]
    fn envelopes_differ_for_same_plaintext() {
        let cipher = test_cipher();
        let a = cipher.encrypt("token").unwrap();
        let b = cipher.encrypt("token").unwrap();
        assert_ne!(a, b, "random nonces must produce distinct envelopes");
    }

    #[test]
    fn tampered_envelope_fails() {
        let cipher = test_cipher();
        let mut envelope = cipher.encrypt("token").unwrap();
        let last = envelope.len() - 1;
        envelope[last] ^= 0x01;
        assert!(cipher.decrypt(&envelope).is_err());
    }

    #[test]
    fn invalid_key_rejected() {
        assert!(TokenCipher::from_base64_key("not base64!!").is_err());
        assert!(TokenCipher::from_base64_key("c2hvcnQ=").is_err());
    }
}
