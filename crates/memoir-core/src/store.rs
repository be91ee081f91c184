//! Entry store: create/update/delete/read of diary entries and their single
//! optional attached image.
//!
//! Every operation takes the acting user explicitly (identity comes from the
//! caller's auth collaborator, never from payloads or ambient state) plus a
//! cancellation token checked between sub-steps. Cancellation is best-effort:
//! sub-steps that already committed stay committed.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use memoir_crypto::ContentCipher;
use memoir_db::Database;
use memoir_types::{DiaryEntry, DiaryError, EntryImage, EntryWithImageId, Result, UserId};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{self, DiaryCaches};
use crate::{ensure_caller, ensure_live};

/// Hard business invariant: entries may only be deleted within this many
/// days of their `entry_date`.
pub const DELETION_WINDOW_DAYS: i64 = 2;

const IMAGE_TTL: StdDuration = StdDuration::from_secs(300);

pub struct EntryStore {
    db: Arc<Database>,
    cipher: Arc<ContentCipher>,
    caches: Arc<DiaryCaches>,
}

impl EntryStore {
    pub fn new(db: Arc<Database>, cipher: Arc<ContentCipher>, caches: Arc<DiaryCaches>) -> Self {
        Self { db, cipher, caches }
    }

    /// Encrypt and persist a new entry, then optimize and persist its image
    /// if one was supplied.
    ///
    /// The entry write commits first: an image failure afterwards returns
    /// `PartialWriteFailure` naming the surviving entry so the caller can
    /// retry just the image step.
    pub fn create(
        &self,
        user_id: UserId,
        content: &str,
        image: Option<&[u8]>,
        ct: &CancellationToken,
    ) -> Result<DiaryEntry> {
        ensure_caller(user_id)?;
        ensure_live(ct)?;

        let (ciphertext, iv) = self.cipher.encrypt(content)?;
        let entry = DiaryEntry::new(user_id, ciphertext, iv, Utc::now(), image.is_some());
        self.db.insert_entry(&entry)?;

        let image_step = match image {
            Some(bytes) => self.attach_image(entry.id, bytes, ct).map(|_| ()),
            None => Ok(()),
        };

        // Rotate once, after the image row lands. A list read between the
        // entry insert and the image insert would otherwise capture the fresh
        // version and cache the entry without its image id.
        self.caches.invalidate_entry_writes(user_id, entry.id, None);

        if let Err(e) = image_step {
            warn!(entry_id = %entry.id, "image step failed after entry write: {e}");
            return Err(DiaryError::PartialWriteFailure {
                entry_id: entry.id,
                reason: e.to_string(),
            });
        }
        info!(entry_id = %entry.id, has_image = entry.has_image, "diary entry created");

        Ok(entry)
    }

    /// Re-encrypt the content with a fresh IV and apply the image change:
    /// a new image replaces any existing one (delete-then-add), otherwise
    /// `delete_current_image` drops it, otherwise it is left untouched.
    /// `has_image` is recomputed from the resulting presence, never taken
    /// from caller input.
    pub fn update(
        &self,
        user_id: UserId,
        id: Uuid,
        content: &str,
        new_image: Option<&[u8]>,
        delete_current_image: bool,
        ct: &CancellationToken,
    ) -> Result<DiaryEntry> {
        ensure_caller(user_id)?;
        ensure_live(ct)?;

        let mut entry = self.db.get_entry(id)?.ok_or(DiaryError::NotFound)?;
        if entry.user_id != user_id {
            return Err(DiaryError::Forbidden);
        }

        let (ciphertext, iv) = self.cipher.encrypt(content)?;

        let mut removed_image = None;
        let mut has_image = entry.has_image;
        if let Some(bytes) = new_image {
            // Decode before touching the old image so a bad upload leaves
            // the existing attachment in place.
            let optimized = memoir_image::optimize(bytes)?;
            removed_image = self.remove_existing_image(entry.id)?;
            let image = EntryImage::new(entry.id, optimized.data, optimized.mime_type);
            self.db.insert_image(&image)?;
            has_image = true;
        } else if delete_current_image {
            removed_image = self.remove_existing_image(entry.id)?;
            has_image = false;
        }

        entry.update_content(ciphertext, iv);
        entry.has_image = has_image;
        self.db.update_entry(&entry)?;
        self.caches.invalidate_entry_writes(user_id, entry.id, removed_image);
        info!(entry_id = %entry.id, has_image, "diary entry updated");

        Ok(entry)
    }

    /// Delete an entry (image first, then the entry row). Refused with
    /// `DeletionWindowExpired` once the grace period has passed.
    pub fn delete(&self, user_id: UserId, id: Uuid, ct: &CancellationToken) -> Result<DiaryEntry> {
        ensure_caller(user_id)?;
        ensure_live(ct)?;

        let entry = self.db.get_entry(id)?.ok_or(DiaryError::NotFound)?;
        if entry.user_id != user_id {
            return Err(DiaryError::Forbidden);
        }
        if Utc::now() - entry.entry_date > Duration::days(DELETION_WINDOW_DAYS) {
            return Err(DiaryError::DeletionWindowExpired(id));
        }

        let removed_image = self.remove_existing_image(id)?;
        self.db.delete_entry(id)?;
        self.caches.invalidate_entry_writes(user_id, id, removed_image);
        info!(entry_id = %id, "diary entry deleted");

        Ok(entry)
    }

    /// The raw entry plus its attached image id, if any. Content stays
    /// encrypted; decryption is the query engine's concern.
    pub fn get_by_id(&self, id: Uuid, ct: &CancellationToken) -> Result<Option<EntryWithImageId>> {
        ensure_live(ct)?;

        let Some(entry) = self.db.get_entry(id)? else {
            return Ok(None);
        };
        let image_id = if entry.has_image {
            self.db.image_by_entry(entry.id)?.map(|i| i.id)
        } else {
            None
        };
        Ok(Some(EntryWithImageId { entry, image_id }))
    }

    /// Fetch an attached image. Ownership is resolved through the owning
    /// entry; results are point-cached per user.
    pub fn get_image(
        &self,
        user_id: UserId,
        image_id: Uuid,
        ct: &CancellationToken,
    ) -> Result<EntryImage> {
        ensure_caller(user_id)?;
        ensure_live(ct)?;

        let key = cache::image_key(image_id, user_id);
        if let Some(hit) = self.caches.images.get(&key) {
            return Ok(hit);
        }

        let image = self.db.get_image(image_id)?.ok_or(DiaryError::NotFound)?;
        let entry = self.db.get_entry(image.entry_id)?.ok_or(DiaryError::NotFound)?;
        if entry.user_id != user_id {
            return Err(DiaryError::Forbidden);
        }

        self.caches.images.set(&key, image.clone(), IMAGE_TTL);
        Ok(image)
    }

    fn attach_image(&self, entry_id: Uuid, bytes: &[u8], ct: &CancellationToken) -> Result<EntryImage> {
        ensure_live(ct)?;
        let optimized = memoir_image::optimize(bytes)?;
        let image = EntryImage::new(entry_id, optimized.data, optimized.mime_type);
        self.db.insert_image(&image)?;
        Ok(image)
    }

    fn remove_existing_image(&self, entry_id: Uuid) -> Result<Option<Uuid>> {
        let existing = self.db.image_by_entry(entry_id)?;
        if existing.is_some() {
            self.db.delete_images_for_entry(entry_id)?;
        }
        Ok(existing.map(|i| i.id))
    }
}
