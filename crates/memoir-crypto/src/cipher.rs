use aes_gcm::{
    AesGcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, consts::U16, rand_core::RngCore},
    aes::Aes256,
};
use anyhow::anyhow;
use memoir_types::{DiaryError, Result};

pub const KEY_LEN: usize = 32;

/// Fixed IV length for every stored entry. 128 bits of random IV keeps the
/// collision probability across encryptions under one key negligible.
pub const IV_LEN: usize = 16;

/// AES-256-GCM with a 16-byte nonce. The stored IV is exactly the nonce;
/// the GCM tag rides at the end of the ciphertext, so any corruption of
/// ciphertext, IV or key surfaces as `DecryptionFailure` instead of garbage.
type DiaryAead = AesGcm<Aes256, U16>;

pub struct ContentCipher {
    cipher: DiaryAead,
}

impl ContentCipher {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: DiaryAead::new(Key::<DiaryAead>::from_slice(key)),
        }
    }

    /// Build a cipher from the base64 key in `MEMOIR_ENCRYPTION_KEY`.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::new(&crate::keys::key_from_env()?))
    }

    /// Encrypt entry text. Returns `(ciphertext, iv)` with a fresh random IV;
    /// no two calls ever share an IV.
    pub fn encrypt(&self, plaintext: &str) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);
        let nonce = Nonce::<U16>::from_slice(&iv);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| DiaryError::Storage(anyhow!("encryption failed: {e}")))?;

        Ok((ciphertext, iv.to_vec()))
    }

    /// Decrypt entry text. Fails with `DecryptionFailure` on tag mismatch,
    /// wrong IV length, or non-UTF-8 plaintext.
    pub fn decrypt(&self, ciphertext: &[u8], iv: &[u8]) -> Result<String> {
        if iv.len() != IV_LEN {
            return Err(DiaryError::DecryptionFailure);
        }
        let nonce = Nonce::<U16>::from_slice(iv);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| DiaryError::DecryptionFailure)?;

        String::from_utf8(plaintext).map_err(|_| DiaryError::DecryptionFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_key;
    use std::collections::HashSet;

    fn cipher() -> ContentCipher {
        ContentCipher::new(&generate_key())
    }

    #[test]
    fn roundtrip() {
        let c = cipher();
        let (ciphertext, iv) = c.encrypt("Dear diary, nothing happened.").unwrap();
        assert_eq!(iv.len(), IV_LEN);
        assert_eq!(c.decrypt(&ciphertext, &iv).unwrap(), "Dear diary, nothing happened.");
    }

    #[test]
    fn roundtrip_empty_and_unicode() {
        let c = cipher();
        for text in ["", "щоденник 日記 📓", "a\u{0301} combining"] {
            let (ciphertext, iv) = c.encrypt(text).unwrap();
            assert_eq!(c.decrypt(&ciphertext, &iv).unwrap(), text);
        }
    }

    #[test]
    fn iv_and_ciphertext_never_repeat() {
        let c = cipher();
        let mut ivs = HashSet::new();
        let mut ciphertexts = HashSet::new();
        for _ in 0..1000 {
            let (ciphertext, iv) = c.encrypt("same plaintext").unwrap();
            assert!(ivs.insert(iv));
            assert!(ciphertexts.insert(ciphertext));
        }
    }

    #[test]
    fn wrong_key_fails() {
        let (ciphertext, iv) = cipher().encrypt("secret").unwrap();
        let other = cipher();
        assert!(matches!(
            other.decrypt(&ciphertext, &iv),
            Err(DiaryError::DecryptionFailure)
        ));
    }

    #[test]
    fn corrupted_ciphertext_fails() {
        let c = cipher();
        let (mut ciphertext, iv) = c.encrypt("secret").unwrap();
        ciphertext[0] ^= 0xff;
        assert!(matches!(
            c.decrypt(&ciphertext, &iv),
            Err(DiaryError::DecryptionFailure)
        ));
    }

    #[test]
    fn bad_iv_length_fails() {
        let c = cipher();
        let (ciphertext, _) = c.encrypt("secret").unwrap();
        assert!(matches!(
            c.decrypt(&ciphertext, &[0u8; 12]),
            Err(DiaryError::DecryptionFailure)
        ));
    }
}
