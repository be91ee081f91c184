//! Query engine: filter, search, sort and paginate a user's entries.
//!
//! Search runs over decrypted content, so its cost is one decrypt per
//! date-filtered entry. That is the accepted price of encryption at rest:
//! ciphertext cannot be indexed for substring search.

use std::sync::Arc;
use std::time::Duration;

use memoir_crypto::ContentCipher;
use memoir_db::Database;
use memoir_types::{
    DiaryEntry, DiaryError, EntryView, PaginatedEntries, QueryParams, Result, SortBy, UserId,
};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::cache::{self, DiaryCaches};
use crate::{ensure_caller, ensure_live};

pub const MAX_PAGE_SIZE: u32 = 100;
pub const MAX_SEARCH_TERM_LEN: usize = 255;

/// TTLs are a safety net; group rotation on writes is what keeps these
/// caches correct.
const LIST_TTL: Duration = Duration::from_secs(60);
const DETAIL_TTL: Duration = Duration::from_secs(300);

pub struct QueryEngine {
    db: Arc<Database>,
    cipher: Arc<ContentCipher>,
    caches: Arc<DiaryCaches>,
}

impl QueryEngine {
    pub fn new(db: Arc<Database>, cipher: Arc<ContentCipher>, caches: Arc<DiaryCaches>) -> Self {
        Self { db, cipher, caches }
    }

    /// One page of a user's entries, filtered and decrypted.
    ///
    /// Pipeline order is fixed: fetch all of the user's entries (newest
    /// first), date-range filter, decrypt-and-search, count, slice the
    /// 1-based page, then resolve image ids for the page items. Out-of-range
    /// pages yield an empty slice, not an error.
    pub fn list_by_user(
        &self,
        user_id: UserId,
        params: &QueryParams,
        ct: &CancellationToken,
    ) -> Result<PaginatedEntries> {
        ensure_caller(user_id)?;
        ensure_live(ct)?;
        validate_params(params)?;

        let group = cache::user_group(user_id);
        let key = list_key(user_id, params);
        if let Some(hit) = self.caches.lists.get(&key) {
            debug!(key, "list cache hit");
            return Ok(hit);
        }
        // Capture the group version before reading: a write landing between
        // this read and the publish below makes the cached page stale on
        // arrival instead of resurrecting pre-write data.
        let version = self.caches.lists.group_version(&group);

        let mut entries = self.db.entries_by_user(user_id)?;
        if params.sort == SortBy::EntryDateAsc {
            entries.reverse();
        }

        if let Some(start) = params.start_date {
            entries.retain(|e| e.entry_date >= start);
        }
        if let Some(end) = params.end_date {
            entries.retain(|e| e.entry_date <= end);
        }

        let term = params
            .search_term
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);
        let mut filtered: Vec<(DiaryEntry, Option<String>)> = Vec::with_capacity(entries.len());
        for entry in entries {
            ensure_live(ct)?;
            match &term {
                Some(t) => {
                    let content = self.cipher.decrypt(&entry.ciphertext, &entry.iv)?;
                    if content.to_lowercase().contains(t.as_str()) {
                        filtered.push((entry, Some(content)));
                    }
                }
                None => filtered.push((entry, None)),
            }
        }

        let total_count = filtered.len();
        let page_size = params.page_size as usize;
        let total_pages = total_count.div_ceil(page_size) as u32;
        let offset = (params.page_number as usize - 1) * page_size;

        let mut items = Vec::new();
        for (entry, decrypted) in filtered.into_iter().skip(offset).take(page_size) {
            let content = match decrypted {
                Some(content) => content,
                None => self.cipher.decrypt(&entry.ciphertext, &entry.iv)?,
            };
            items.push(self.enrich(entry, content)?);
        }

        let page = PaginatedEntries {
            items,
            total_count,
            page_number: params.page_number,
            page_size: params.page_size,
            total_pages,
        };
        self.caches
            .lists
            .set_grouped(&key, page.clone(), LIST_TTL, &group, version);
        Ok(page)
    }

    /// A single decrypted entry, point-cached per user.
    pub fn get_detail(&self, user_id: UserId, id: Uuid, ct: &CancellationToken) -> Result<EntryView> {
        ensure_caller(user_id)?;
        ensure_live(ct)?;

        let key = cache::detail_key(id, user_id);
        if let Some(hit) = self.caches.details.get(&key) {
            debug!(key, "detail cache hit");
            return Ok(hit);
        }

        let entry = self.db.get_entry(id)?.ok_or(DiaryError::NotFound)?;
        if entry.user_id != user_id {
            return Err(DiaryError::Forbidden);
        }

        let content = self.cipher.decrypt(&entry.ciphertext, &entry.iv)?;
        let view = self.enrich(entry, content)?;
        self.caches.details.set(&key, view.clone(), DETAIL_TTL);
        Ok(view)
    }

    fn enrich(&self, entry: DiaryEntry, content: String) -> Result<EntryView> {
        let image_id = if entry.has_image {
            self.db.image_by_entry(entry.id)?.map(|i| i.id)
        } else {
            None
        };
        Ok(EntryView {
            id: entry.id,
            user_id: entry.user_id,
            content,
            entry_date: entry.entry_date,
            has_image: entry.has_image,
            image_id,
        })
    }
}

fn validate_params(params: &QueryParams) -> Result<()> {
    if params.page_number < 1 {
        return Err(DiaryError::InvalidArgument(
            "page_number must be at least 1".into(),
        ));
    }
    if params.page_size < 1 || params.page_size > MAX_PAGE_SIZE {
        return Err(DiaryError::InvalidArgument(format!(
            "page_size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    if let Some(term) = &params.search_term {
        if term.chars().count() > MAX_SEARCH_TERM_LEN {
            return Err(DiaryError::InvalidArgument(format!(
                "search_term must be at most {MAX_SEARCH_TERM_LEN} characters"
            )));
        }
    }
    Ok(())
}

fn has_filters(params: &QueryParams) -> bool {
    params
        .search_term
        .as_deref()
        .is_some_and(|t| !t.trim().is_empty())
        || params.start_date.is_some()
        || params.end_date.is_some()
        || params.sort != SortBy::default()
}

/// `entries_user_<uid>_page_<n>_size_<m>[_<filterhash>]`. The hash keeps
/// arbitrary filter combinations out of the key text while still keying
/// distinct filters to distinct entries.
fn list_key(user_id: UserId, params: &QueryParams) -> String {
    let mut key = format!(
        "entries_user_{user_id}_page_{}_size_{}",
        params.page_number, params.page_size
    );
    if has_filters(params) {
        key.push('_');
        key.push_str(&filter_hash(params));
    }
    key
}

fn filter_hash(params: &QueryParams) -> String {
    let mut hasher = Sha256::new();
    hasher.update(
        params
            .search_term
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_lowercase(),
    );
    hasher.update([0]);
    if let Some(d) = params.start_date {
        hasher.update(d.to_rfc3339());
    }
    hasher.update([0]);
    if let Some(d) = params.end_date {
        hasher.update(d.to_rfc3339());
    }
    hasher.update([0]);
    hasher.update(match params.sort {
        SortBy::EntryDateDesc => "date_desc",
        SortBy::EntryDateAsc => "date_asc",
    });
    hex::encode(&hasher.finalize()[..8])
}
