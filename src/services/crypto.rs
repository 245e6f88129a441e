// SPDX-License-Identifier: MIT

//! Symmetric encryption for OAuth tokens at rest.
//!
//! AES-256-GCM with a random 96-bit nonce prepended to the ciphertext.
//! Plaintext tokens exist only inside the token vault; everything stored
//! or returned from here is base64 ciphertext.

use crate::error::AppError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;

/// Token encryption service.
#[derive(Clone)]
pub struct TokenCipher {
    key: Arc<LessSafeKey>,
    rng: SystemRandom,
}

impl TokenCipher {
    /// Create a cipher from a 32-byte key.
    pub fn new(key_bytes: &[u8; 32]) -> Result<Self, AppError> {
        let unbound = UnboundKey::new(&AES_256_GCM, key_bytes)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid AEAD key")))?;
        Ok(Self {
            key: Arc::new(LessSafeKey::new(unbound)),
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt a token. Returns base64(nonce || ciphertext || tag).
    pub fn encrypt(&self, plaintext: &str) -> Result<String, AppError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Nonce generation failed")))?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Token encryption failed")))?;

        let mut out = Vec::with_capacity(NONCE_LEN + in_out.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&in_out);
        Ok(BASE64.encode(out))
    }

    /// Decrypt base64 ciphertext produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, ciphertext_b64: &str) -> Result<String, AppError> {
        let data = BASE64
            .decode(ciphertext_b64)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Ciphertext decode failed: {}", e)))?;

        if data.len() <= NONCE_LEN {
            return Err(AppError::Internal(anyhow::anyhow!("Ciphertext too short")));
        }
        let (nonce_bytes, sealed) = data.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid nonce")))?;

        let mut in_out = sealed.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Token decryption failed")))?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("UTF-8 decode failed: {}", e)))
    }
}

/// Helper to encrypt OAuth tokens before storing.
pub fn encrypt_tokens(
    cipher: &TokenCipher,
    access_token: &str,
    refresh_token: &str,
) -> Result<(String, String), AppError> {
    let encrypted_access = cipher.encrypt(access_token)?;
    let encrypted_refresh = cipher.encrypt(refresh_token)?;
    Ok((encrypted_access, encrypted_refresh))
}

/// Helper to decrypt OAuth tokens after retrieval.
pub fn decrypt_tokens(
    cipher: &TokenCipher,
    encrypted_access: &str,
    encrypted_refresh: &str,
) -> Result<(String, String), AppError> {
    let access_token = cipher.decrypt(encrypted_access)?;
    let refresh_token = cipher.decrypt(encrypted_refresh)?;
    Ok((access_token, refresh_token))
}

/// Generate an opaque URL-safe random token (OAuth state values).
pub fn random_state_token() -> Result<String, AppError> {
    let mut bytes = [0u8; 32];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Random token generation failed")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> TokenCipher {
        TokenCipher::new(&[9u8; 32]).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = cipher();
        for token in ["", "short", "a-realistic-looking-access-token-1234567890"] {
            let sealed = cipher.encrypt(token).unwrap();
            assert_ne!(sealed, token);
            assert_eq!(cipher.decrypt(&sealed).unwrap(), token);
        }
    }

    #[test]
    fn test_encrypt_is_randomized() {
        let cipher = cipher();
        let a = cipher.encrypt("same-token").unwrap();
        let b = cipher.encrypt("same-token").unwrap();
        assert_ne!(a, b); // fresh nonce every call
    }

    #[test]
    fn test_decrypt_rejects_wrong_key() {
        let sealed = cipher().encrypt("secret").unwrap();
        let other = TokenCipher::new(&[1u8; 32]).unwrap();
        assert!(other.decrypt(&sealed).is_err());
    }

    #[test]
    fn test_decrypt_rejects_garbage() {
        let cipher = cipher();
        assert!(cipher.decrypt("not base64 at all!!!").is_err());
        assert!(cipher.decrypt(&BASE64.encode([0u8; 4])).is_err());
    }

    #[test]
    fn test_state_tokens_are_unique() {
        let a = random_state_token().unwrap();
        let b = random_state_token().unwrap();
        assert_ne!(a, b);
        assert!(a.len() >= 43); // 32 bytes base64url
    }
}
