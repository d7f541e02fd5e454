use std::io;
use std::path::{Path, PathBuf};

/// Error that occurs when reading the metadata of a file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to stat file `{path}`: {source}")]
pub struct StatError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl StatError {
    /// Returns `true` if the file disappeared before it could be inspected.
    pub fn is_not_found(&self) -> bool {
        self.source.kind() == io::ErrorKind::NotFound
    }
}

/// Result of sampling a path's size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSize {
    /// The path is a directory; directories are never accounted.
    Directory,
    /// Size in bytes of a regular file (or a symlink's target).
    Bytes(u64),
}

/// Samples the current size of the file at `path`, following symlinks.
///
/// # Errors
///
/// Returns a [`StatError`] if the metadata cannot be read. Use
/// [`StatError::is_not_found`] to tell a deleted file from a real failure.
///
/// # Example
/// ```no_run
/// # use log_file_metric_exporter::fsutil;
/// let size = fsutil::file_size("/var/log/pods/ns_pod_uid/app/0.log")?;
/// # Ok::<(), fsutil::StatError>(())
/// ```
pub fn file_size(path: impl AsRef<Path>) -> Result<FileSize, StatError> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path).map_err(|source| StatError {
        path: path.to_path_buf(),
        source,
    })?;
    if metadata.is_dir() {
        Ok(FileSize::Directory)
    } else {
        Ok(FileSize::Bytes(metadata.len()))
    }
}

/// Returns `true` if `path` itself (not its target) is a symbolic link.
pub fn is_symlink(path: impl AsRef<Path>) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// Returns `true` if `path`, following symlinks, is a directory.
pub fn is_dir(path: impl AsRef<Path>) -> bool {
    std::fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}
