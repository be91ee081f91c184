use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS entries (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            ciphertext  BLOB NOT NULL,
            iv          BLOB NOT NULL,
            entry_date  TEXT NOT NULL,
            has_image   INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_entries_user_date
            ON entries(user_id, entry_date);

        -- 0-or-1 image per entry is an entry-store rule, not a schema
        -- constraint, so entry_id is indexed but not UNIQUE.
        CREATE TABLE IF NOT EXISTS entry_images (
            id          TEXT PRIMARY KEY,
            entry_id    TEXT NOT NULL REFERENCES entries(id),
            data        BLOB NOT NULL,
            mime_type   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_entry_images_entry
            ON entry_images(entry_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
