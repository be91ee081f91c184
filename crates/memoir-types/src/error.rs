//! Typed failures for all diary core operations.
//!
//! Business-rule failures are returned as values, never panics; infrastructure
//! failures (the store being unavailable) travel through `Storage` and are the
//! caller's 5xx-equivalent.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for diary core operations.
pub type Result<T> = std::result::Result<T, DiaryError>;

#[derive(Debug, Error)]
pub enum DiaryError {
    /// No caller identity present.
    #[error("no authenticated user for this operation")]
    Unauthorized,

    /// Caller identity present but does not own the targeted entry/image.
    #[error("entry is owned by another user")]
    Forbidden,

    /// Referenced entry or image does not exist.
    #[error("diary entry not found")]
    NotFound,

    /// Delete attempted past the 2-day grace period.
    #[error("entry {0} is past its deletion window")]
    DeletionWindowExpired(Uuid),

    /// Ciphertext/IV/key mismatch or corrupted content. Garbage plaintext is
    /// never returned in its place.
    #[error("stored content could not be decrypted")]
    DecryptionFailure,

    /// Uploaded bytes could not be decoded as an image.
    #[error("unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    /// The entry row was persisted but the image step failed afterwards.
    /// Distinct from a full failure so callers can retry only the image step.
    #[error("entry {entry_id} was saved but its image could not be attached: {reason}")]
    PartialWriteFailure { entry_id: Uuid, reason: String },

    /// Malformed input at the core boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation observed its cancellation token between sub-steps.
    /// Already-committed sub-steps are not rolled back.
    #[error("operation cancelled")]
    Cancelled,

    /// Infrastructure failure in the persistence layer.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}
