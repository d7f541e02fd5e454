use std::path::PathBuf;

use super::WatchHandle;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to initialize inotify: {0}")]
    Init(#[source] std::io::Error),
    #[error("failed to add watch for path `{path}`: {source}")]
    AddWatch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to remove watch {handle}: {source}")]
    RemoveWatch {
        handle: WatchHandle,
        #[source]
        source: std::io::Error,
    },
    #[error("path `{0}` contains an interior NUL byte")]
    InvalidPath(PathBuf),
}

impl Error {
    /// Returns `true` if the watched path did not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::AddWatch { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Errors produced while decoding a raw inotify read buffer.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated event header at offset {offset}: {remaining} bytes remaining")]
    TruncatedHeader { offset: usize, remaining: usize },
    #[error(
        "event at offset {offset} declares a {declared} byte name, but only {available} bytes remain"
    )]
    TruncatedName {
        offset: usize,
        declared: usize,
        available: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
