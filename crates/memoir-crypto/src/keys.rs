use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;
use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::cipher::KEY_LEN;

/// Environment variable holding the base64-encoded 256-bit content key.
pub const KEY_ENV_VAR: &str = "MEMOIR_ENCRYPTION_KEY";

/// Generate a random 256-bit content key.
pub fn generate_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

/// Encode a key to base64 for provisioning.
pub fn key_to_base64(key: &[u8; KEY_LEN]) -> String {
    BASE64.encode(key)
}

/// Decode a base64 key.
pub fn key_from_base64(encoded: &str) -> Result<[u8; KEY_LEN]> {
    let bytes = BASE64.decode(encoded.trim()).context("key is not valid base64")?;
    let key: [u8; KEY_LEN] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("key must be exactly {KEY_LEN} bytes"))?;
    Ok(key)
}

/// Load the content key from `MEMOIR_ENCRYPTION_KEY`.
pub fn key_from_env() -> Result<[u8; KEY_LEN]> {
    let encoded =
        std::env::var(KEY_ENV_VAR).with_context(|| format!("{KEY_ENV_VAR} is not set"))?;
    key_from_base64(&encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_roundtrip() {
        let key = generate_key();
        let encoded = key_to_base64(&key);
        assert_eq!(key_from_base64(&encoded).unwrap(), key);
    }

    #[test]
    fn env_roundtrip_feeds_the_cipher() {
        let key = generate_key();
        // No other test touches this variable, so the process-global write is
        // race-free even under the parallel test runner.
        unsafe { std::env::set_var(KEY_ENV_VAR, key_to_base64(&key)) };

        assert_eq!(key_from_env().unwrap(), key);

        let cipher = crate::ContentCipher::from_env().unwrap();
        let (ciphertext, iv) = cipher.encrypt("provisioned from the environment").unwrap();
        assert_eq!(
            cipher.decrypt(&ciphertext, &iv).unwrap(),
            "provisioned from the environment"
        );
    }

    #[test]
    fn rejects_short_keys() {
        let encoded = BASE64.encode([0u8; 16]);
        assert!(key_from_base64(&encoded).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(key_from_base64("not base64 at all!!!").is_err());
    }
}
