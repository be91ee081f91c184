use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The acting user. Resolved by an external auth collaborator and threaded
/// through every store/query call explicitly, never read from ambient state.
pub type UserId = Uuid;

/// Entries are always encrypted at rest. The store only ever sees ciphertext
/// plus the random IV drawn for that encryption; `entry_date` is immutable
/// after creation and `has_image` mirrors the presence of an attached image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
    pub entry_date: DateTime<Utc>,
    pub has_image: bool,
}

impl DiaryEntry {
    pub fn new(
        user_id: UserId,
        ciphertext: Vec<u8>,
        iv: Vec<u8>,
        entry_date: DateTime<Utc>,
        has_image: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            ciphertext,
            iv,
            entry_date,
            has_image,
        }
    }

    /// Replace the encrypted content. Every update draws a fresh IV upstream;
    /// the previous IV is never reused.
    pub fn update_content(&mut self, ciphertext: Vec<u8>, iv: Vec<u8>) {
        self.ciphertext = ciphertext;
        self.iv = iv;
    }
}

/// The single optional image attached to an entry, already optimized.
/// 0-or-1 per entry, enforced by the entry store rather than the schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryImage {
    pub id: Uuid,
    pub entry_id: Uuid,
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl EntryImage {
    pub fn new(entry_id: Uuid, data: Vec<u8>, mime_type: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            entry_id,
            data,
            mime_type,
        }
    }
}

/// An entry plus the id of its attached image, if any. Content is still
/// encrypted; decryption is the query engine's job.
#[derive(Debug, Clone)]
pub struct EntryWithImageId {
    pub entry: DiaryEntry,
    pub image_id: Option<Uuid>,
}

/// A decrypted entry as handed back to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryView {
    pub id: Uuid,
    pub user_id: UserId,
    pub content: String,
    pub entry_date: DateTime<Utc>,
    pub has_image: bool,
    pub image_id: Option<Uuid>,
}

/// One page of query results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedEntries {
    pub items: Vec<EntryView>,
    pub total_count: usize,
    pub page_number: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

/// Allowed sort orders. A closed set: arbitrary sort strings are not
/// representable. Entry date descending is the default everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortBy {
    #[default]
    EntryDateDesc,
    EntryDateAsc,
}

/// Filter, sort and pagination parameters for a list query.
/// `page_number` and `page_size` are both 1-based/positive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryParams {
    pub page_number: u32,
    pub page_size: u32,
    pub search_term: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub sort: SortBy,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            page_number: 1,
            page_size: 5,
            search_term: None,
            start_date: None,
            end_date: None,
            sort: SortBy::default(),
        }
    }
}

/// An outbound email job. Immutable once enqueued, consumed at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub is_html: bool,
}

impl NotificationJob {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        is_html: bool,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            is_html,
        }
    }
}
