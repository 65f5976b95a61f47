use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::error::Result;
use crate::natsort::natural_key;
use crate::scanner::ScannedFile;

// ---------------------------------------------------------------------------
// Db — thin wrapper around Arc<Mutex<Connection>>
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Db(Arc<Mutex<Connection>>);

impl Db {
    pub fn new(conn: Connection) -> Self {
        Self(Arc::new(Mutex::new(conn)))
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.0.lock().unwrap()
    }
}

pub fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Clone)]
pub struct CourseRow {
    pub id: i64,
    pub path: String,
    pub name: String,
    pub created_at: i64,
    pub last_opened_item_id: Option<i64>,
    pub last_opened_at: Option<i64>,
}

/// An item joined with its progress row.
#[derive(Debug, Serialize, Clone)]
pub struct ItemRow {
    pub id: i64,
    pub course_id: i64,
    pub rel_path: String,
    pub abs_path: String,
    pub section: String,
    pub name: String,
    pub ext: String,
    pub size_bytes: i64,
    pub mtime: i64,
    pub ignored: bool,
    pub completed: bool,
    pub completed_at: Option<i64>,
    pub last_opened_at: Option<i64>,
    pub open_count: i64,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct CourseProgress {
    pub completed_count: i64,
    pub total_count: i64,
    pub completed_bytes: i64,
    pub total_bytes: i64,
}

/// The single most recently opened item across every course.
#[derive(Debug, Serialize, Clone)]
pub struct LastOpened {
    pub course_id: i64,
    pub course_path: String,
    pub course_name: String,
    pub item_id: i64,
    pub abs_path: String,
    pub rel_path: String,
    pub last_opened_at: i64,
}

#[derive(Debug, Serialize)]
pub struct StatusInfo {
    pub courses: i64,
    pub items: i64,
    pub completed: i64,
    pub completed_bytes: i64,
    pub total_bytes: i64,
}

fn row_to_course(row: &rusqlite::Row) -> rusqlite::Result<CourseRow> {
    Ok(CourseRow {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
        last_opened_item_id: row.get(4)?,
        last_opened_at: row.get(5)?,
    })
}

fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        id: row.get(0)?,
        course_id: row.get(1)?,
        rel_path: row.get(2)?,
        abs_path: row.get(3)?,
        section: row.get(4)?,
        name: row.get(5)?,
        ext: row.get(6)?,
        size_bytes: row.get(7)?,
        mtime: row.get(8)?,
        ignored: row.get::<_, i64>(9)? != 0,
        completed: row.get::<_, i64>(10)? != 0,
        completed_at: row.get(11)?,
        last_opened_at: row.get(12)?,
        open_count: row.get(13)?,
    })
}

const ITEM_COLUMNS: &str = "i.id, i.course_id, i.rel_path, i.abs_path, i.section, i.name, i.ext,
     i.size_bytes, i.mtime, i.ignored, COALESCE(p.completed, 0), p.completed_at,
     p.last_opened_at, COALESCE(p.open_count, 0)";

// ---------------------------------------------------------------------------
// Courses
// ---------------------------------------------------------------------------

impl Db {
    /// Courses ordered most-recently-used first (falling back to creation
    /// time), name breaking ties.
    pub fn list_courses(&self) -> Result<Vec<CourseRow>> {
        let db = self.conn();
        let mut stmt = db.prepare(
            "SELECT id, path, name, created_at, last_opened_item_id, last_opened_at
             FROM courses
             ORDER BY COALESCE(last_opened_at, created_at) DESC, name ASC",
        )?;
        let rows = stmt
            .query_map([], row_to_course)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn course_by_id(&self, course_id: i64) -> Result<Option<CourseRow>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id, path, name, created_at, last_opened_item_id, last_opened_at
                 FROM courses WHERE id = ?1",
                [course_id],
                row_to_course,
            )
            .optional()?)
    }

    pub fn course_id_by_path(&self, path: &str) -> Result<Option<i64>> {
        Ok(self
            .conn()
            .query_row("SELECT id FROM courses WHERE path = ?1", [path], |r| {
                r.get(0)
            })
            .optional()?)
    }

    /// Remove a course and, through the cascades, its items, progress and
    /// section state.
    pub fn delete_course(&self, course_id: i64) -> Result<()> {
        self.conn()
            .execute("DELETE FROM courses WHERE id = ?1", [course_id])?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scan application
// ---------------------------------------------------------------------------

fn course_display_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

impl Db {
    /// Apply one completed scan in a single transaction: upsert the course
    /// keyed by its absolute path (name recomputed from the final path
    /// segment), upsert every collected file, seed default progress for new
    /// items, and delete items whose relative path was not seen. Either the
    /// whole scan lands or none of it; untouched items keep their progress
    /// rows as-is.
    pub fn apply_scan(&self, course_path: &str, files: &[ScannedFile]) -> Result<i64> {
        let name = course_display_name(course_path);
        let ts = now_ts();
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO courses (path, name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(path) DO UPDATE SET name = excluded.name",
            params![course_path, name, ts],
        )?;
        let course_id: i64 =
            tx.query_row("SELECT id FROM courses WHERE path = ?1", [course_path], |r| {
                r.get(0)
            })?;

        {
            // `ignored` is user-managed; a rescan must not reset it.
            let mut upsert = tx.prepare(
                "INSERT INTO items (course_id, rel_path, abs_path, section, name, ext,
                                    size_bytes, mtime, ignored)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)
                 ON CONFLICT(course_id, rel_path) DO UPDATE SET
                     abs_path = excluded.abs_path,
                     section = excluded.section,
                     name = excluded.name,
                     ext = excluded.ext,
                     size_bytes = excluded.size_bytes,
                     mtime = excluded.mtime",
            )?;
            let mut item_id =
                tx.prepare("SELECT id FROM items WHERE course_id = ?1 AND rel_path = ?2")?;
            let mut seed =
                tx.prepare("INSERT INTO progress (item_id) VALUES (?1) ON CONFLICT(item_id) DO NOTHING")?;

            for f in files {
                upsert.execute(params![
                    course_id,
                    f.rel_path,
                    f.abs_path,
                    f.section,
                    f.name,
                    f.ext,
                    f.size_bytes,
                    f.mtime
                ])?;
                let id: i64 =
                    item_id.query_row(params![course_id, f.rel_path], |r| r.get(0))?;
                seed.execute([id])?;
            }

            let seen: HashSet<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
            let mut existing = tx.prepare("SELECT id, rel_path FROM items WHERE course_id = ?1")?;
            let stale: Vec<i64> = existing
                .query_map([course_id], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?
                .into_iter()
                .filter(|(_, rel)| !seen.contains(rel.as_str()))
                .map(|(id, _)| id)
                .collect();
            let mut delete = tx.prepare("DELETE FROM items WHERE id = ?1")?;
            for id in &stale {
                delete.execute([*id])?;
            }
            if !stale.is_empty() {
                debug!(course = course_id, pruned = stale.len(), "removed vanished items");
            }
        }

        tx.commit()?;
        Ok(course_id)
    }
}

// ---------------------------------------------------------------------------
// Items / progress
// ---------------------------------------------------------------------------

impl Db {
    /// Items of a course joined with progress, in natural (section, rel
    /// path) order. This is the canonical display and navigation order.
    pub fn course_items(&self, course_id: i64, include_ignored: bool) -> Result<Vec<ItemRow>> {
        let sql = if include_ignored {
            format!(
                "SELECT {ITEM_COLUMNS} FROM items i
                 LEFT JOIN progress p ON p.item_id = i.id
                 WHERE i.course_id = ?1"
            )
        } else {
            format!(
                "SELECT {ITEM_COLUMNS} FROM items i
                 LEFT JOIN progress p ON p.item_id = i.id
                 WHERE i.course_id = ?1 AND i.ignored = 0"
            )
        };
        let mut rows = {
            let db = self.conn();
            let mut stmt = db.prepare(&sql)?;
            let rows = stmt
                .query_map([course_id], row_to_item)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        rows.sort_by(|a, b| {
            natural_key(&a.section)
                .cmp(&natural_key(&b.section))
                .then_with(|| natural_key(&a.rel_path).cmp(&natural_key(&b.rel_path)))
        });
        Ok(rows)
    }

    pub fn item_by_id(&self, item_id: i64) -> Result<Option<ItemRow>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items i
             LEFT JOIN progress p ON p.item_id = i.id
             WHERE i.id = ?1"
        );
        Ok(self
            .conn()
            .query_row(&sql, [item_id], row_to_item)
            .optional()?)
    }

    /// Set the completion flag. `completed_at` is stamped only on the
    /// not-completed → completed transition and cleared on the way back.
    /// Unknown item ids are a no-op.
    pub fn set_completed(&self, item_id: i64, completed: bool) -> Result<()> {
        self.conn().execute(
            "UPDATE progress
             SET completed_at = CASE
                     WHEN ?1 = 1 AND completed = 0 THEN ?2
                     WHEN ?1 = 0 THEN NULL
                     ELSE completed_at
                 END,
                 completed = ?1
             WHERE item_id = ?3",
            params![completed as i64, now_ts(), item_id],
        )?;
        Ok(())
    }

    /// Record one open event: bump the item's open count and last-opened
    /// stamp, and point the owning course at it. Both writes happen in one
    /// transaction so the per-course and global "last opened" views cannot
    /// disagree.
    pub fn record_open(&self, course_id: i64, item_id: i64) -> Result<()> {
        let ts = now_ts();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE progress
             SET last_opened_at = ?1, open_count = open_count + 1
             WHERE item_id = ?2",
            params![ts, item_id],
        )?;
        tx.execute(
            "UPDATE courses
             SET last_opened_item_id = ?1, last_opened_at = ?2
             WHERE id = ?3",
            params![item_id, ts, course_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn global_last_opened(&self) -> Result<Option<LastOpened>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT c.id, c.path, c.name, i.id, i.abs_path, i.rel_path, p.last_opened_at
                 FROM progress p
                 JOIN items i ON i.id = p.item_id
                 JOIN courses c ON c.id = i.course_id
                 WHERE p.last_opened_at IS NOT NULL AND i.ignored = 0
                 ORDER BY p.last_opened_at DESC
                 LIMIT 1",
                [],
                |row| {
                    Ok(LastOpened {
                        course_id: row.get(0)?,
                        course_path: row.get(1)?,
                        course_name: row.get(2)?,
                        item_id: row.get(3)?,
                        abs_path: row.get(4)?,
                        rel_path: row.get(5)?,
                        last_opened_at: row.get(6)?,
                    })
                },
            )
            .optional()?)
    }

    /// Completed/total counts and bytes over the course's non-ignored items.
    /// Missing progress rows count as not completed.
    pub fn course_progress(&self, course_id: i64) -> Result<CourseProgress> {
        Ok(self.conn().query_row(
            "SELECT COALESCE(SUM(CASE WHEN p.completed = 1 THEN 1 ELSE 0 END), 0),
                    COUNT(*),
                    COALESCE(SUM(CASE WHEN p.completed = 1 THEN i.size_bytes ELSE 0 END), 0),
                    COALESCE(SUM(i.size_bytes), 0)
             FROM items i
             LEFT JOIN progress p ON p.item_id = i.id
             WHERE i.course_id = ?1 AND i.ignored = 0",
            [course_id],
            |row| {
                Ok(CourseProgress {
                    completed_count: row.get(0)?,
                    total_count: row.get(1)?,
                    completed_bytes: row.get(2)?,
                    total_bytes: row.get(3)?,
                })
            },
        )?)
    }
}

// ---------------------------------------------------------------------------
// Section collapse state
// ---------------------------------------------------------------------------

impl Db {
    /// Persisted collapse flags for a course. Sections without a row are
    /// expanded by default and absent from the map.
    pub fn section_collapsed_map(&self, course_id: i64) -> Result<HashMap<String, bool>> {
        let db = self.conn();
        let mut stmt =
            db.prepare("SELECT section, collapsed FROM section_state WHERE course_id = ?1")?;
        let rows = stmt
            .query_map([course_id], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? != 0))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(rows)
    }

    pub fn set_section_collapsed(
        &self,
        course_id: i64,
        section: &str,
        collapsed: bool,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO section_state (course_id, section, collapsed) VALUES (?1, ?2, ?3)
             ON CONFLICT(course_id, section) DO UPDATE SET collapsed = excluded.collapsed",
            params![course_id, section, collapsed as i64],
        )?;
        Ok(())
    }

    /// Forget every remembered section flag for this course.
    pub fn clear_section_state(&self, course_id: i64) -> Result<()> {
        self.conn()
            .execute("DELETE FROM section_state WHERE course_id = ?1", [course_id])?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

impl Db {
    pub fn status(&self) -> Result<StatusInfo> {
        let db = self.conn();
        let count = |sql: &str| -> rusqlite::Result<i64> { db.query_row(sql, [], |r| r.get(0)) };
        Ok(StatusInfo {
            courses: count("SELECT COUNT(*) FROM courses")?,
            items: count("SELECT COUNT(*) FROM items WHERE ignored = 0")?,
            completed: count(
                "SELECT COUNT(*) FROM progress p JOIN items i ON i.id = p.item_id
                 WHERE p.completed = 1 AND i.ignored = 0",
            )?,
            completed_bytes: count(
                "SELECT COALESCE(SUM(i.size_bytes), 0) FROM items i
                 JOIN progress p ON p.item_id = i.id
                 WHERE p.completed = 1 AND i.ignored = 0",
            )?,
            total_bytes: count("SELECT COALESCE(SUM(size_bytes), 0) FROM items WHERE ignored = 0")?,
        })
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Db {
        Db::new(crate::db::open_memory().unwrap())
    }

    fn scanned(rel: &str, section: &str, size: i64) -> ScannedFile {
        let name = rel.rsplit('/').next().unwrap().to_string();
        let ext = name
            .rfind('.')
            .map(|i| name[i..].to_lowercase())
            .unwrap_or_default();
        ScannedFile {
            rel_path: rel.to_string(),
            abs_path: format!("/courses/demo/{rel}"),
            section: section.to_string(),
            name,
            ext,
            size_bytes: size,
            mtime: 1_700_000_000,
        }
    }

    fn demo_files() -> Vec<ScannedFile> {
        vec![
            scanned("01 Intro/welcome.mp4", "01 Intro", 100),
            scanned("01 Intro/slides.pdf", "01 Intro", 200),
            scanned("02 Advanced/deep/topic.mp4", "02 Advanced", 300),
            scanned("02 Advanced/recap.mp4", "02 Advanced", 400),
        ]
    }

    // -- Courses -------------------------------------------------------------

    #[test]
    fn apply_scan_creates_course_with_derived_name() {
        let db = test_db();
        let id = db.apply_scan("/courses/Rust Masterclass", &demo_files()).unwrap();
        let c = db.course_by_id(id).unwrap().unwrap();
        assert_eq!(c.name, "Rust Masterclass");
        assert_eq!(c.path, "/courses/Rust Masterclass");
        assert!(c.last_opened_item_id.is_none());
        assert!(c.last_opened_at.is_none());
    }

    #[test]
    fn apply_scan_same_path_keeps_course_id() {
        let db = test_db();
        let id1 = db.apply_scan("/courses/demo", &demo_files()).unwrap();
        let id2 = db.apply_scan("/courses/demo", &demo_files()).unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn course_by_id_missing_returns_none() {
        let db = test_db();
        assert!(db.course_by_id(999).unwrap().is_none());
    }

    #[test]
    fn course_id_by_path() {
        let db = test_db();
        let id = db.apply_scan("/courses/demo", &[]).unwrap();
        assert_eq!(db.course_id_by_path("/courses/demo").unwrap(), Some(id));
        assert_eq!(db.course_id_by_path("/nope").unwrap(), None);
    }

    #[test]
    fn list_courses_recent_first_then_name() {
        let db = test_db();
        let beta = db.apply_scan("/c/beta", &[scanned("S/a.mp4", "S", 1)]).unwrap();
        let alpha = db.apply_scan("/c/alpha", &[scanned("S/a.mp4", "S", 1)]).unwrap();
        // Same creation stamp: name breaks the tie.
        {
            let conn = db.conn();
            conn.execute("UPDATE courses SET created_at = 1000", []).unwrap();
        }
        let names: Vec<String> = db.list_courses().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["alpha", "beta"]);

        // An open bumps a course to the front.
        let item = db.course_items(beta, false).unwrap()[0].id;
        db.record_open(beta, item).unwrap();
        let first = &db.list_courses().unwrap()[0];
        assert_eq!(first.id, beta);
        let _ = alpha;
    }

    #[test]
    fn delete_course_cascades() {
        let db = test_db();
        let id = db.apply_scan("/courses/demo", &demo_files()).unwrap();
        let item = db.course_items(id, false).unwrap()[0].id;
        db.set_section_collapsed(id, "01 Intro", true).unwrap();
        db.delete_course(id).unwrap();

        assert!(db.course_by_id(id).unwrap().is_none());
        assert!(db.item_by_id(item).unwrap().is_none());
        assert!(db.section_collapsed_map(id).unwrap().is_empty());
        let conn = db.conn();
        let progress: i64 = conn
            .query_row("SELECT COUNT(*) FROM progress", [], |r| r.get(0))
            .unwrap();
        assert_eq!(progress, 0);
    }

    // -- Scan application ----------------------------------------------------

    #[test]
    fn apply_scan_seeds_default_progress() {
        let db = test_db();
        let id = db.apply_scan("/courses/demo", &demo_files()).unwrap();
        let items = db.course_items(id, false).unwrap();
        assert_eq!(items.len(), 4);
        for it in &items {
            assert!(!it.completed);
            assert!(it.completed_at.is_none());
            assert!(it.last_opened_at.is_none());
            assert_eq!(it.open_count, 0);
        }
    }

    #[test]
    fn apply_scan_idempotent_same_identities() {
        let db = test_db();
        let id = db.apply_scan("/courses/demo", &demo_files()).unwrap();
        let before: Vec<(i64, String)> = db
            .course_items(id, false)
            .unwrap()
            .into_iter()
            .map(|i| (i.id, i.rel_path))
            .collect();
        db.apply_scan("/courses/demo", &demo_files()).unwrap();
        let after: Vec<(i64, String)> = db
            .course_items(id, false)
            .unwrap()
            .into_iter()
            .map(|i| (i.id, i.rel_path))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn apply_scan_updates_in_place_and_keeps_progress() {
        let db = test_db();
        let id = db.apply_scan("/courses/demo", &demo_files()).unwrap();
        let item = db.course_items(id, false).unwrap()[0].clone();
        db.set_completed(item.id, true).unwrap();
        db.record_open(id, item.id).unwrap();

        // Same rel path, bigger file.
        let mut files = demo_files();
        files
            .iter_mut()
            .find(|f| f.rel_path == item.rel_path)
            .unwrap()
            .size_bytes = 9999;
        db.apply_scan("/courses/demo", &files).unwrap();

        let again = db.item_by_id(item.id).unwrap().unwrap();
        assert_eq!(again.rel_path, item.rel_path);
        assert_eq!(again.size_bytes, 9999);
        assert!(again.completed, "progress must survive the rescan");
        assert_eq!(again.open_count, 1);
    }

    #[test]
    fn apply_scan_deletes_vanished_items_and_their_progress() {
        let db = test_db();
        let id = db.apply_scan("/courses/demo", &demo_files()).unwrap();
        let items = db.course_items(id, false).unwrap();
        let gone = items[0].clone();
        let kept = items[1].clone();
        db.set_completed(kept.id, true).unwrap();
        db.record_open(id, kept.id).unwrap();

        let remaining: Vec<ScannedFile> = demo_files().into_iter().skip(1).collect();
        db.apply_scan("/courses/demo", &remaining).unwrap();

        assert!(db.item_by_id(gone.id).unwrap().is_none());
        let conn = db.conn();
        let orphan: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM progress WHERE item_id = ?1",
                [gone.id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(orphan, 0, "progress row must cascade");
        drop(conn);

        let survivor = db.item_by_id(kept.id).unwrap().unwrap();
        assert!(survivor.completed);
        assert_eq!(survivor.open_count, 1);
    }

    #[test]
    fn apply_scan_preserves_manual_ignore_flag() {
        let db = test_db();
        let id = db.apply_scan("/courses/demo", &demo_files()).unwrap();
        let item = db.course_items(id, false).unwrap()[0].id;
        {
            let conn = db.conn();
            conn.execute("UPDATE items SET ignored = 1 WHERE id = ?1", [item])
                .unwrap();
        }
        db.apply_scan("/courses/demo", &demo_files()).unwrap();
        let row = db.item_by_id(item).unwrap().unwrap();
        assert!(row.ignored, "rescan must not reset a manual exclusion");
    }

    // -- Item queries --------------------------------------------------------

    #[test]
    fn course_items_natural_order() {
        let db = test_db();
        let files = vec![
            scanned("Lecture 10/b.mp4", "Lecture 10", 1),
            scanned("Lecture 2/a 10.mp4", "Lecture 2", 1),
            scanned("Lecture 2/a 2.mp4", "Lecture 2", 1),
            scanned("Lecture 1/x.mp4", "Lecture 1", 1),
        ];
        let id = db.apply_scan("/courses/demo", &files).unwrap();
        let rels: Vec<String> = db
            .course_items(id, false)
            .unwrap()
            .into_iter()
            .map(|i| i.rel_path)
            .collect();
        assert_eq!(
            rels,
            vec![
                "Lecture 1/x.mp4",
                "Lecture 2/a 2.mp4",
                "Lecture 2/a 10.mp4",
                "Lecture 10/b.mp4",
            ]
        );
    }

    #[test]
    fn course_items_skips_ignored_unless_asked() {
        let db = test_db();
        let id = db.apply_scan("/courses/demo", &demo_files()).unwrap();
        let item = db.course_items(id, false).unwrap()[0].id;
        {
            let conn = db.conn();
            conn.execute("UPDATE items SET ignored = 1 WHERE id = ?1", [item])
                .unwrap();
        }
        assert_eq!(db.course_items(id, false).unwrap().len(), 3);
        assert_eq!(db.course_items(id, true).unwrap().len(), 4);
    }

    #[test]
    fn item_by_id_missing_returns_none() {
        let db = test_db();
        assert!(db.item_by_id(42).unwrap().is_none());
    }

    // -- Completion ----------------------------------------------------------

    #[test]
    fn set_completed_stamps_and_clears() {
        let db = test_db();
        let id = db.apply_scan("/courses/demo", &demo_files()).unwrap();
        let item = db.course_items(id, false).unwrap()[0].id;

        db.set_completed(item, true).unwrap();
        let row = db.item_by_id(item).unwrap().unwrap();
        assert!(row.completed);
        assert!(row.completed_at.is_some());

        db.set_completed(item, false).unwrap();
        let row = db.item_by_id(item).unwrap().unwrap();
        assert!(!row.completed);
        assert!(row.completed_at.is_none());
    }

    #[test]
    fn set_completed_repeat_keeps_original_stamp() {
        let db = test_db();
        let id = db.apply_scan("/courses/demo", &demo_files()).unwrap();
        let item = db.course_items(id, false).unwrap()[0].id;
        db.set_completed(item, true).unwrap();
        {
            let conn = db.conn();
            conn.execute(
                "UPDATE progress SET completed_at = 123 WHERE item_id = ?1",
                [item],
            )
            .unwrap();
        }
        db.set_completed(item, true).unwrap();
        let row = db.item_by_id(item).unwrap().unwrap();
        assert_eq!(row.completed_at, Some(123));
    }

    #[test]
    fn set_completed_unknown_item_is_noop() {
        let db = test_db();
        db.set_completed(999, true).unwrap();
    }

    // -- Opens ---------------------------------------------------------------

    #[test]
    fn record_open_updates_item_and_course_together() {
        let db = test_db();
        let id = db.apply_scan("/courses/demo", &demo_files()).unwrap();
        let item = db.course_items(id, false).unwrap()[0].id;

        db.record_open(id, item).unwrap();
        db.record_open(id, item).unwrap();

        let row = db.item_by_id(item).unwrap().unwrap();
        assert_eq!(row.open_count, 2);
        assert!(row.last_opened_at.is_some());

        let course = db.course_by_id(id).unwrap().unwrap();
        assert_eq!(course.last_opened_item_id, Some(item));
        assert_eq!(course.last_opened_at, row.last_opened_at);
    }

    #[test]
    fn global_last_opened_none_without_history() {
        let db = test_db();
        db.apply_scan("/courses/demo", &demo_files()).unwrap();
        assert!(db.global_last_opened().unwrap().is_none());
    }

    #[test]
    fn global_last_opened_follows_latest_across_courses() {
        let db = test_db();
        let a = db.apply_scan("/c/a", &[scanned("S/x.mp4", "S", 1)]).unwrap();
        let b = db.apply_scan("/c/b", &[scanned("S/z.mp4", "S", 1)]).unwrap();
        let x = db.course_items(a, false).unwrap()[0].id;
        let z = db.course_items(b, false).unwrap()[0].id;

        db.record_open(a, x).unwrap();
        db.record_open(b, z).unwrap();
        {
            // Pin distinct stamps; record_open may land in the same second.
            let conn = db.conn();
            conn.execute("UPDATE progress SET last_opened_at = 100 WHERE item_id = ?1", [x])
                .unwrap();
            conn.execute("UPDATE progress SET last_opened_at = 200 WHERE item_id = ?1", [z])
                .unwrap();
        }

        let last = db.global_last_opened().unwrap().unwrap();
        assert_eq!(last.item_id, z);
        assert_eq!(last.course_id, b);
        assert_eq!(last.rel_path, "S/z.mp4");
        assert_eq!(last.last_opened_at, 200);
    }

    #[test]
    fn global_last_opened_skips_ignored_items() {
        let db = test_db();
        let a = db.apply_scan("/c/a", &[scanned("S/x.mp4", "S", 1)]).unwrap();
        let x = db.course_items(a, false).unwrap()[0].id;
        db.record_open(a, x).unwrap();
        {
            let conn = db.conn();
            conn.execute("UPDATE items SET ignored = 1 WHERE id = ?1", [x])
                .unwrap();
        }
        assert!(db.global_last_opened().unwrap().is_none());
    }

    // -- Aggregation ---------------------------------------------------------

    #[test]
    fn course_progress_counts_and_bytes() {
        let db = test_db();
        let files = vec![
            scanned("S/1.mp4", "S", 100),
            scanned("S/2.mp4", "S", 200),
            scanned("S/3.mp4", "S", 300),
            scanned("S/4.mp4", "S", 400),
        ];
        let id = db.apply_scan("/courses/demo", &files).unwrap();
        let items = db.course_items(id, false).unwrap();
        db.set_completed(items[0].id, true).unwrap();
        db.set_completed(items[2].id, true).unwrap();

        let p = db.course_progress(id).unwrap();
        assert_eq!(
            p,
            CourseProgress {
                completed_count: 2,
                total_count: 4,
                completed_bytes: 400,
                total_bytes: 1000,
            }
        );
    }

    #[test]
    fn course_progress_empty_course_is_zero() {
        let db = test_db();
        let id = db.apply_scan("/courses/demo", &[]).unwrap();
        let p = db.course_progress(id).unwrap();
        assert_eq!(
            p,
            CourseProgress {
                completed_count: 0,
                total_count: 0,
                completed_bytes: 0,
                total_bytes: 0,
            }
        );
    }

    #[test]
    fn course_progress_excludes_ignored_items() {
        let db = test_db();
        let id = db.apply_scan("/courses/demo", &demo_files()).unwrap();
        let item = db.course_items(id, false).unwrap()[0].clone();
        {
            let conn = db.conn();
            conn.execute("UPDATE items SET ignored = 1 WHERE id = ?1", [item.id])
                .unwrap();
        }
        let p = db.course_progress(id).unwrap();
        assert_eq!(p.total_count, 3);
        assert_eq!(p.total_bytes, 1000 - item.size_bytes);
    }

    // -- Section state -------------------------------------------------------

    #[test]
    fn section_state_roundtrip() {
        let db = test_db();
        let id = db.apply_scan("/courses/demo", &demo_files()).unwrap();
        assert!(db.section_collapsed_map(id).unwrap().is_empty());

        db.set_section_collapsed(id, "01 Intro", true).unwrap();
        db.set_section_collapsed(id, "02 Advanced", false).unwrap();
        let map = db.section_collapsed_map(id).unwrap();
        assert_eq!(map.get("01 Intro"), Some(&true));
        assert_eq!(map.get("02 Advanced"), Some(&false));

        db.set_section_collapsed(id, "01 Intro", false).unwrap();
        assert_eq!(db.section_collapsed_map(id).unwrap().get("01 Intro"), Some(&false));

        db.clear_section_state(id).unwrap();
        assert!(db.section_collapsed_map(id).unwrap().is_empty());
    }

    #[test]
    fn section_state_scoped_per_course() {
        let db = test_db();
        let a = db.apply_scan("/c/a", &[]).unwrap();
        let b = db.apply_scan("/c/b", &[]).unwrap();
        db.set_section_collapsed(a, "S", true).unwrap();
        db.set_section_collapsed(b, "S", true).unwrap();
        db.clear_section_state(a).unwrap();
        assert!(db.section_collapsed_map(a).unwrap().is_empty());
        assert_eq!(db.section_collapsed_map(b).unwrap().len(), 1);
    }

    // -- Status --------------------------------------------------------------

    #[test]
    fn status_counts() {
        let db = test_db();
        let s = db.status().unwrap();
        assert_eq!(s.courses, 0);
        assert_eq!(s.items, 0);

        let id = db.apply_scan("/courses/demo", &demo_files()).unwrap();
        let items = db.course_items(id, false).unwrap();
        db.set_completed(items[0].id, true).unwrap();

        let s = db.status().unwrap();
        assert_eq!(s.courses, 1);
        assert_eq!(s.items, 4);
        assert_eq!(s.completed, 1);
        assert_eq!(s.total_bytes, 1000);
        assert_eq!(s.completed_bytes, items[0].size_bytes);
    }
}
