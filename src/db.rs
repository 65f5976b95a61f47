use directories::ProjectDirs;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;

pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("dev", "ct", "ct") {
        let data = dirs.data_dir();
        std::fs::create_dir_all(data).ok();
        data.join("ct.db")
    } else {
        PathBuf::from("ct.db")
    }
}

pub fn open(path: &Path) -> Result<Connection> {
    debug!(path = %path.display(), "opening database");
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    migrate(&conn)?;
    debug!("db ready (WAL, FK on)");
    Ok(conn)
}

/// In-memory database with the full schema, for tests and throwaway use.
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    migrate(&conn)?;
    Ok(conn)
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS courses (
            id                  INTEGER PRIMARY KEY,
            path                TEXT NOT NULL UNIQUE,
            name                TEXT NOT NULL,
            created_at          INTEGER NOT NULL,
            last_opened_item_id INTEGER,
            last_opened_at      INTEGER
        );

        CREATE TABLE IF NOT EXISTS items (
            id          INTEGER PRIMARY KEY,
            course_id   INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
            rel_path    TEXT NOT NULL,
            abs_path    TEXT NOT NULL,
            section     TEXT NOT NULL,
            name        TEXT NOT NULL,
            ext         TEXT NOT NULL,
            size_bytes  INTEGER NOT NULL,
            mtime       INTEGER NOT NULL,
            ignored     INTEGER NOT NULL DEFAULT 0,
            UNIQUE(course_id, rel_path)
        );

        CREATE TABLE IF NOT EXISTS progress (
            item_id        INTEGER PRIMARY KEY REFERENCES items(id) ON DELETE CASCADE,
            completed      INTEGER NOT NULL DEFAULT 0,
            completed_at   INTEGER,
            last_opened_at INTEGER,
            open_count     INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS section_state (
            course_id   INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
            section     TEXT NOT NULL,
            collapsed   INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (course_id, section)
        );

        CREATE INDEX IF NOT EXISTS idx_items_course ON items(course_id);
        CREATE INDEX IF NOT EXISTS idx_items_course_ignored ON items(course_id, ignored);
        CREATE INDEX IF NOT EXISTS idx_progress_last_opened ON progress(last_opened_at);
        ",
    )?;
    Ok(())
}
