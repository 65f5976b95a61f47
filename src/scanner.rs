//! Course directory scanner: discover and classify files, then reconcile
//! the result into the catalog.

use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::data::Db;
use crate::error::{Error, Result};
use crate::natsort::{natural_cmp, norm};

/// Subtitle/caption/metadata extensions that never become items. Entries
/// carry the leading dot and are lowercase.
const IGNORED_EXTENSIONS: &[&str] = &[
    ".vtt", ".srt", ".ass", ".ssa", ".sub", ".idx",
    ".nfo", ".sfv", ".url", ".ds_store", ".tmp",
];

/// Folder names excluded when they match exactly (after normalization).
const IGNORED_FOLDER_EXACT: &[&str] = &[
    "websites you may like",
    "sample files",
    "samples",
    "__macosx",
];

/// Folder names excluded when they contain any of these fragments.
const IGNORED_FOLDER_CONTAINS: &[&str] = &["website", "websites", "subtitle", "subtitles"];

pub fn folder_is_ignored(name: &str) -> bool {
    let n = norm(name);
    IGNORED_FOLDER_EXACT.contains(&n.as_str())
        || IGNORED_FOLDER_CONTAINS.iter().any(|frag| n.contains(frag))
}

/// `ext` is the lowercase extension including the leading dot, or "" for
/// files without one.
pub fn ext_is_ignored(ext: &str) -> bool {
    IGNORED_EXTENSIONS.contains(&ext)
}

/// One file discovered by a scan. `rel_path` is the stable identity key
/// within its course; `section` is the top-level folder the file rolls up
/// to, however deeply it is nested.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub rel_path: String,
    pub abs_path: String,
    pub section: String,
    pub name: String,
    pub ext: String,
    pub size_bytes: i64,
    pub mtime: i64,
}

/// Strip Windows extended-length path prefix (`\\?\`) if present.
fn clean_path(s: &str) -> String {
    s.strip_prefix(r"\\?\").unwrap_or(s).to_string()
}

/// Scan a course directory into the catalog and return its course id.
///
/// Two phases: the walk collects every file first, then the result is
/// applied in a single transaction. A walk that fails partway leaves the
/// course's existing catalog rows untouched, and the delete-missing
/// reconciliation never runs against a partial listing.
pub fn scan(db: &Db, course_path: &Path) -> Result<i64> {
    let root = course_path
        .canonicalize()
        .map_err(|_| Error::NotADirectory(course_path.to_path_buf()))?;
    if !root.is_dir() {
        return Err(Error::NotADirectory(root));
    }

    let files = collect_files(&root)?;
    let course_path_str = clean_path(&root.to_string_lossy());
    let course_id = db.apply_scan(&course_path_str, &files)?;
    info!(course = %course_path_str, files = files.len(), "scan complete");
    Ok(course_id)
}

/// Walk phase. Immediate subdirectories of the root are the section
/// candidates; files sitting directly in the root belong to no section and
/// are not cataloged.
fn collect_files(root: &Path) -> Result<Vec<ScannedFile>> {
    let listing = std::fs::read_dir(root).map_err(|e| Error::DirectoryRead {
        path: root.to_path_buf(),
        source: e,
    })?;

    let mut sections: Vec<(String, PathBuf)> = Vec::new();
    for entry in listing {
        let entry = entry.map_err(|e| Error::DirectoryRead {
            path: root.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_dir() {
            sections.push((entry.file_name().to_string_lossy().into_owned(), path));
        }
    }
    sections.sort_by(|a, b| natural_cmp(&a.0, &b.0));

    let mut files = Vec::new();
    for (section, section_path) in &sections {
        if folder_is_ignored(section) {
            debug!(section, "section ignored");
            continue;
        }
        walk_section(root, section, section_path, &mut files)?;
    }
    Ok(files)
}

fn is_ignored_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && folder_is_ignored(&entry.file_name().to_string_lossy())
}

fn walk_section(
    root: &Path,
    section: &str,
    section_path: &Path,
    out: &mut Vec<ScannedFile>,
) -> Result<()> {
    let walker = WalkDir::new(section_path)
        .sort_by(|a, b| {
            natural_cmp(
                &a.file_name().to_string_lossy(),
                &b.file_name().to_string_lossy(),
            )
        })
        .into_iter()
        // Prune ignored directories before descending into them.
        .filter_entry(|e| e.depth() == 0 || !is_ignored_dir(e));

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let path = e.path().unwrap_or(section_path).to_path_buf();
                return Err(Error::DirectoryRead {
                    path,
                    source: e.into(),
                });
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        if ext_is_ignored(&ext) {
            continue;
        }

        let rel = path.strip_prefix(root).unwrap_or(path);
        // Unreadable size/mtime degrade to 0; the file is still cataloged.
        let (size_bytes, mtime) = match entry.metadata() {
            Ok(m) => {
                let mtime = m
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0);
                (m.len() as i64, mtime)
            }
            Err(_) => (0, 0),
        };

        out.push(ScannedFile {
            rel_path: rel.to_string_lossy().into_owned(),
            abs_path: clean_path(&path.to_string_lossy()),
            section: section.to_string(),
            name: entry.file_name().to_string_lossy().into_owned(),
            ext,
            size_bytes,
            mtime,
        });
    }
    Ok(())
}
