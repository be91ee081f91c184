use crate::Database;
use crate::models::{EntryRow, ImageRow};
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use memoir_types::{DiaryEntry, EntryImage};
use rusqlite::Connection;
use uuid::Uuid;

/// Timestamps are stored as RFC 3339 text with fixed precision so that
/// lexicographic ORDER BY matches chronological order.
fn fmt_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    // -- Entries --

    pub fn insert_entry(&self, entry: &DiaryEntry) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO entries (id, user_id, ciphertext, iv, entry_date, has_image)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    entry.id.to_string(),
                    entry.user_id.to_string(),
                    entry.ciphertext,
                    entry.iv,
                    fmt_date(&entry.entry_date),
                    entry.has_image,
                ],
            )?;
            Ok(())
        })
    }

    /// Rewrites the mutable fields only; `entry_date` is immutable and the
    /// row's owner never changes.
    pub fn update_entry(&self, entry: &DiaryEntry) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE entries SET ciphertext = ?2, iv = ?3, has_image = ?4 WHERE id = ?1",
                rusqlite::params![
                    entry.id.to_string(),
                    entry.ciphertext,
                    entry.iv,
                    entry.has_image,
                ],
            )?;
            Ok(())
        })
    }

    pub fn delete_entry(&self, id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM entries WHERE id = ?1", [id.to_string()])?;
            Ok(())
        })
    }

    pub fn get_entry(&self, id: Uuid) -> Result<Option<DiaryEntry>> {
        let row = self.with_conn(|conn| query_entry(conn, id))?;
        row.map(EntryRow::into_entry).transpose()
    }

    /// All of a user's entries, newest first. The query engine filters,
    /// searches and paginates on top of this primitive.
    pub fn entries_by_user(&self, user_id: Uuid) -> Result<Vec<DiaryEntry>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, ciphertext, iv, entry_date, has_image
                 FROM entries
                 WHERE user_id = ?1
                 ORDER BY entry_date DESC",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], entry_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(EntryRow::into_entry).collect()
    }

    // -- Images --

    pub fn insert_image(&self, image: &EntryImage) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO entry_images (id, entry_id, data, mime_type)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    image.id.to_string(),
                    image.entry_id.to_string(),
                    image.data,
                    image.mime_type,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_image(&self, id: Uuid) -> Result<Option<EntryImage>> {
        let row = self.with_conn(|conn| {
            query_image(
                conn,
                "SELECT id, entry_id, data, mime_type FROM entry_images WHERE id = ?1",
                id,
            )
        })?;
        row.map(ImageRow::into_image).transpose()
    }

    pub fn image_by_entry(&self, entry_id: Uuid) -> Result<Option<EntryImage>> {
        let row = self.with_conn(|conn| {
            query_image(
                conn,
                "SELECT id, entry_id, data, mime_type FROM entry_images WHERE entry_id = ?1",
                entry_id,
            )
        })?;
        row.map(ImageRow::into_image).transpose()
    }

    /// Removes whatever image the entry currently has. Returns how many rows
    /// went away (0 or 1 under the store's cardinality rule).
    pub fn delete_images_for_entry(&self, entry_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM entry_images WHERE entry_id = ?1",
                [entry_id.to_string()],
            )?;
            Ok(n)
        })
    }
}

fn entry_row(row: &rusqlite::Row<'_>) -> std::result::Result<EntryRow, rusqlite::Error> {
    Ok(EntryRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        ciphertext: row.get(2)?,
        iv: row.get(3)?,
        entry_date: row.get(4)?,
        has_image: row.get(5)?,
    })
}

fn query_entry(conn: &Connection, id: Uuid) -> Result<Option<EntryRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, ciphertext, iv, entry_date, has_image
         FROM entries WHERE id = ?1",
    )?;
    stmt.query_row([id.to_string()], entry_row).optional()
}

fn query_image(conn: &Connection, sql: &str, key: Uuid) -> Result<Option<ImageRow>> {
    let mut stmt = conn.prepare(sql)?;
    stmt.query_row([key.to_string()], |row| {
        Ok(ImageRow {
            id: row.get(0)?,
            entry_id: row.get(1)?,
            data: row.get(2)?,
            mime_type: row.get(3)?,
        })
    })
    .optional()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(user_id: Uuid, offset_minutes: i64) -> DiaryEntry {
        DiaryEntry::new(
            user_id,
            vec![1, 2, 3],
            vec![0u8; 16],
            Utc::now() - Duration::minutes(offset_minutes),
            false,
        )
    }

    #[test]
    fn entry_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let e = entry(Uuid::new_v4(), 0);
        db.insert_entry(&e).unwrap();

        let fetched = db.get_entry(e.id).unwrap().unwrap();
        assert_eq!(fetched.id, e.id);
        assert_eq!(fetched.user_id, e.user_id);
        assert_eq!(fetched.ciphertext, e.ciphertext);
        assert_eq!(fetched.iv, e.iv);
        assert!(!fetched.has_image);
        // microsecond precision survives the text roundtrip
        assert_eq!(
            fetched.entry_date.timestamp_micros(),
            e.entry_date.timestamp_micros()
        );
    }

    #[test]
    fn entries_by_user_come_back_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        let old = entry(user, 60);
        let newer = entry(user, 10);
        let newest = entry(user, 0);
        for e in [&old, &newest, &newer] {
            db.insert_entry(e).unwrap();
        }
        // another user's entry must not leak in
        db.insert_entry(&entry(Uuid::new_v4(), 5)).unwrap();

        let ids: Vec<_> = db
            .entries_by_user(user)
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![newest.id, newer.id, old.id]);
    }

    #[test]
    fn update_rewrites_content_but_not_date() {
        let db = Database::open_in_memory().unwrap();
        let mut e = entry(Uuid::new_v4(), 0);
        db.insert_entry(&e).unwrap();

        e.update_content(vec![9, 9, 9], vec![1u8; 16]);
        e.has_image = true;
        db.update_entry(&e).unwrap();

        let fetched = db.get_entry(e.id).unwrap().unwrap();
        assert_eq!(fetched.ciphertext, vec![9, 9, 9]);
        assert_eq!(fetched.iv, vec![1u8; 16]);
        assert!(fetched.has_image);
    }

    #[test]
    fn image_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let e = entry(Uuid::new_v4(), 0);
        db.insert_entry(&e).unwrap();

        let img = EntryImage::new(e.id, vec![0xff, 0xd8], "image/jpeg".into());
        db.insert_image(&img).unwrap();

        assert_eq!(db.get_image(img.id).unwrap().unwrap().data, vec![0xff, 0xd8]);
        assert_eq!(db.image_by_entry(e.id).unwrap().unwrap().id, img.id);

        assert_eq!(db.delete_images_for_entry(e.id).unwrap(), 1);
        assert!(db.image_by_entry(e.id).unwrap().is_none());
        assert_eq!(db.delete_images_for_entry(e.id).unwrap(), 0);
    }

    #[test]
    fn missing_rows_are_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_entry(Uuid::new_v4()).unwrap().is_none());
        assert!(db.get_image(Uuid::new_v4()).unwrap().is_none());
    }
}
