use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The scan target does not resolve to an existing directory. The scan
    /// aborts before any catalog write.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// A directory listing failed during the walk. The scan aborts and the
    /// course's existing catalog rows are left as they were.
    #[error("cannot read directory {path}: {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("course {0} not found")]
    CourseNotFound(i64),

    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}
