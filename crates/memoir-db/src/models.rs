//! Database row types mapping directly to SQLite rows.
//! Conversion into the shared domain types is fallible because ids and
//! timestamps are stored as text.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use memoir_types::{DiaryEntry, EntryImage};
use uuid::Uuid;

pub struct EntryRow {
    pub id: String,
    pub user_id: String,
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
    pub entry_date: String,
    pub has_image: bool,
}

impl EntryRow {
    pub fn into_entry(self) -> Result<DiaryEntry> {
        Ok(DiaryEntry {
            id: parse_uuid(&self.id)?,
            user_id: parse_uuid(&self.user_id)?,
            ciphertext: self.ciphertext,
            iv: self.iv,
            entry_date: parse_date(&self.entry_date)?,
            has_image: self.has_image,
        })
    }
}

pub struct ImageRow {
    pub id: String,
    pub entry_id: String,
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl ImageRow {
    pub fn into_image(self) -> Result<EntryImage> {
        Ok(EntryImage {
            id: parse_uuid(&self.id)?,
            entry_id: parse_uuid(&self.entry_id)?,
            data: self.data,
            mime_type: self.mime_type,
        })
    }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("invalid uuid in row: {s}"))
}

fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid timestamp in row: {s}"))?
        .with_timezone(&Utc))
}
