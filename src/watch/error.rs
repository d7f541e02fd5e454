use std::path::PathBuf;

use crate::inotify;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("watch root `{0}` is not a directory")]
    RootNotDirectory(PathBuf),

    #[error("failed to set up inotify: {0}")]
    Inotify(#[from] inotify::Error),

    #[error("failed to register inotify descriptor with the reactor: {0}")]
    Reactor(#[source] std::io::Error),

    #[error("path vanished before it could be watched: `{path}`")]
    Vanished { path: PathBuf },

    #[error("failed to watch `{path}`: {source}")]
    Register {
        path: PathBuf,
        #[source]
        source: inotify::Error,
    },

    #[error("failed to list directory `{path}`: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("gave up watching `{path}` after {attempts} descriptor collisions")]
    Exhausted { path: PathBuf, attempts: usize },
}

impl WatchError {
    /// Returns `true` if the error only means the path is gone, which callers
    /// treat like a removal.
    pub fn is_vanished(&self) -> bool {
        matches!(self, WatchError::Vanished { .. })
    }
}

pub type Result<T> = std::result::Result<T, WatchError>;
