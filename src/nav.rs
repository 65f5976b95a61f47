//! Sequential navigation: launch items, keep the open/completion books,
//! resume where the user left off.

use std::io;
use std::path::Path;
use std::process::Command;
use tracing::warn;

use crate::data::{Db, ItemRow, LastOpened};
use crate::error::{Error, Result};

/// External launch/reveal capability. Failures are reported to the caller
/// and never abort catalog bookkeeping.
pub trait Opener {
    fn open(&self, path: &Path) -> io::Result<()>;
    fn reveal(&self, path: &Path) -> io::Result<()>;
}

/// Opens paths with the host's default handler.
pub struct SystemOpener;

impl Opener for SystemOpener {
    fn open(&self, path: &Path) -> io::Result<()> {
        #[cfg(target_os = "windows")]
        let status = Command::new("cmd")
            .args(["/C", "start", ""])
            .arg(path)
            .status()?;
        #[cfg(target_os = "macos")]
        let status = Command::new("open").arg(path).status()?;
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let status = Command::new("xdg-open").arg(path).status()?;

        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("opener exited with {status}"),
            ))
        }
    }

    fn reveal(&self, path: &Path) -> io::Result<()> {
        // Reveal a file's containing directory; a directory reveals itself.
        let target = if path.is_file() {
            path.parent().unwrap_or(path)
        } else {
            path
        };

        #[cfg(target_os = "windows")]
        let status = if path.is_file() {
            Command::new("explorer").arg("/select,").arg(path).status()?
        } else {
            Command::new("explorer").arg(target).status()?
        };
        #[cfg(target_os = "macos")]
        let status = Command::new("open").arg(target).status()?;
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let status = Command::new("xdg-open").arg(target).status()?;

        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("file manager exited with {status}"),
            ))
        }
    }
}

/// Whether a failed launch still counts as an "open" for bookkeeping.
/// `AlwaysRecord` keeps navigation state moving even when the host opener
/// misbehaves; `RecordOnSuccess` is the stricter reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OpenPolicy {
    #[default]
    AlwaysRecord,
    RecordOnSuccess,
}

/// What one open attempt did.
#[derive(Debug)]
pub struct OpenOutcome {
    pub item: ItemRow,
    pub launch_error: Option<String>,
    pub recorded: bool,
}

pub struct Navigator<'a, O: Opener> {
    db: &'a Db,
    opener: &'a O,
    policy: OpenPolicy,
}

impl<'a, O: Opener> Navigator<'a, O> {
    pub fn new(db: &'a Db, opener: &'a O, policy: OpenPolicy) -> Self {
        Self { db, opener, policy }
    }

    /// Launch an item and record the open. Returns `None` for stale ids.
    /// A launch failure is carried in the outcome, not raised.
    pub fn open_item(&self, item_id: i64) -> Result<Option<OpenOutcome>> {
        let Some(item) = self.db.item_by_id(item_id)? else {
            return Ok(None);
        };

        let launch_error = match self.opener.open(Path::new(&item.abs_path)) {
            Ok(()) => None,
            Err(e) => {
                warn!(item = item_id, path = %item.abs_path, error = %e, "launch failed");
                Some(e.to_string())
            }
        };

        let recorded = launch_error.is_none() || self.policy == OpenPolicy::AlwaysRecord;
        if recorded {
            self.db.record_open(item.course_id, item_id)?;
        }

        Ok(Some(OpenOutcome {
            item,
            launch_error,
            recorded,
        }))
    }

    /// Mark `from_item_id` completed, then open the element following it in
    /// `ordered` (the caller's filtered, ordered id sequence). An id absent
    /// from the sequence or sitting at its end completes without a
    /// follow-up open.
    pub fn open_next(&self, ordered: &[i64], from_item_id: i64) -> Result<Option<OpenOutcome>> {
        self.db.set_completed(from_item_id, true)?;
        let Some(idx) = ordered.iter().position(|&id| id == from_item_id) else {
            return Ok(None);
        };
        match ordered.get(idx + 1) {
            Some(&next_id) => self.open_item(next_id),
            None => Ok(None),
        }
    }

    /// The most recently opened item across every course, or `None` when
    /// nothing has ever been opened.
    pub fn resume_global(&self) -> Result<Option<LastOpened>> {
        self.db.global_last_opened()
    }

    /// Re-open the course's last opened item, if it has one.
    pub fn continue_course(&self, course_id: i64) -> Result<Option<OpenOutcome>> {
        let Some(course) = self.db.course_by_id(course_id)? else {
            return Err(Error::CourseNotFound(course_id));
        };
        match course.last_opened_item_id {
            Some(item_id) => self.open_item(item_id),
            None => Ok(None),
        }
    }

    /// Show an item in the file manager. No bookkeeping attaches to reveals.
    pub fn reveal_path(&self, path: &Path) -> Option<String> {
        match self.opener.reveal(path) {
            Ok(()) => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "reveal failed");
                Some(e.to_string())
            }
        }
    }
}
