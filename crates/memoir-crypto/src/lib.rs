//! Content cipher for diary entries.
//!
//! Entry text is encrypted field-by-field with AES-256-GCM under one
//! process-wide key provisioned externally (base64, usually via the
//! `MEMOIR_ENCRYPTION_KEY` environment variable). Every encryption draws a
//! fresh random 16-byte IV; plaintext never reaches the persistence layer.

pub mod cipher;
pub mod keys;

pub use cipher::{ContentCipher, IV_LEN, KEY_LEN};
pub use keys::{generate_key, key_from_base64, key_from_env, key_to_base64, KEY_ENV_VAR};
