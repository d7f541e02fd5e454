use std::collections::{HashMap, HashSet};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::error::{Result, WatchError};
use super::event::HandleResolver;
use crate::fsutil;
use crate::identity;
use crate::inotify::{EventMask, Inotify, Registrar, WatchHandle};

/// Upper bound on registration attempts for one path when the kernel keeps
/// handing back a colliding descriptor.
pub const MAX_WATCH_ATTEMPTS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchKind {
    Directory,
    LogFile,
}

impl WatchKind {
    /// Directory watches are persistent, file watches fire once and must be
    /// re-armed.
    pub fn mask(self) -> EventMask {
        match self {
            WatchKind::Directory => {
                EventMask::CREATE
                    | EventMask::DELETE
                    | EventMask::MOVED_FROM
                    | EventMask::MOVED_TO
                    | EventMask::ATTRIB
            }
            WatchKind::LogFile => {
                EventMask::MODIFY | EventMask::CLOSE_WRITE | EventMask::ATTRIB | EventMask::ONESHOT
            }
        }
    }
}

/// One watched path.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct WatchedPath {
    pub path: PathBuf,
    #[serde(serialize_with = "serialize_handle")]
    pub handle: WatchHandle,
    pub kind: WatchKind,
    /// `false` between a single-shot watch firing and its re-arm.
    pub armed: bool,
}

fn serialize_handle<S: serde::Serializer>(
    handle: &WatchHandle,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_i32(handle.as_raw())
}

#[derive(Debug, Default)]
struct WatchTable {
    by_path: HashMap<PathBuf, WatchedPath>,
    by_handle: HashMap<WatchHandle, PathBuf>,
}

impl WatchTable {
    fn insert(&mut self, entry: WatchedPath) {
        if let Some(previous) = self.by_path.get(&entry.path) {
            if previous.handle != entry.handle {
                self.unmap_handle(previous.handle, &entry.path);
            }
        }
        if let Some(other) = self.by_handle.insert(entry.handle, entry.path.clone()) {
            if other != entry.path {
                let stale = self.by_path.get(&other).is_some_and(|w| !w.armed);
                if stale {
                    log::debug!(
                        "evicting stale watch: path={}, handle={}",
                        other.display(),
                        entry.handle
                    );
                    self.by_path.remove(&other);
                } else {
                    // Same inode reached through another name.
                    log::debug!(
                        "watch handle shared by paths: handle={}, kept={}, new={}",
                        entry.handle,
                        other.display(),
                        entry.path.display()
                    );
                }
            }
        }
        self.by_path.insert(entry.path.clone(), entry);
    }

    fn remove(&mut self, path: &Path) -> Option<WatchedPath> {
        let entry = self.by_path.remove(path)?;
        self.unmap_handle(entry.handle, path);
        Some(entry)
    }

    fn unmap_handle(&mut self, handle: WatchHandle, path: &Path) {
        if self.by_handle.get(&handle).is_some_and(|p| p == path) {
            self.by_handle.remove(&handle);
        }
    }
}

/// Owns the mapping between watched paths and inotify watch handles.
///
/// All registrations for the tree go through this type so the table always
/// reflects what the kernel reports events for. Mutation happens on the
/// dispatcher; diagnostics read concurrently through the same lock.
#[derive(Debug)]
pub struct WatchTree<R: Registrar = Inotify> {
    registrar: R,
    self_dir: Option<OsString>,
    table: RwLock<WatchTable>,
}

impl<R: Registrar> WatchTree<R> {
    /// Creates an empty tree. Directories named `self_dir` are never watched
    /// or descended into.
    pub fn new(registrar: R, self_dir: Option<OsString>) -> Self {
        Self {
            registrar,
            self_dir,
            table: RwLock::new(WatchTable::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, WatchTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, WatchTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `path` and records it, retrying on descriptor collisions.
    ///
    /// A collision is a registration that returns the handle this path held
    /// before its single-shot watch fired: late events of the old watch
    /// would be indistinguishable from events of the new one.
    fn acquire(&self, path: &Path, kind: WatchKind) -> Result<WatchHandle> {
        let mut table = self.write();
        let previous = table.by_path.get(path).map(|w| (w.handle, w.armed));

        for attempt in 1..=MAX_WATCH_ATTEMPTS {
            let handle = match self.registrar.add_watch(path, kind.mask()) {
                Ok(handle) => handle,
                Err(err) if err.is_not_found() => {
                    return Err(WatchError::Vanished {
                        path: path.to_path_buf(),
                    });
                }
                Err(source) => {
                    return Err(WatchError::Register {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            };

            if previous == Some((handle, false)) {
                log::debug!(
                    "watch descriptor collision: path={}, handle={}, attempt={}",
                    path.display(),
                    handle,
                    attempt
                );
                if let Err(err) = self.registrar.remove_watch(handle) {
                    log::debug!("failed releasing colliding watch: error={}", err);
                }
                continue;
            }

            table.insert(WatchedPath {
                path: path.to_path_buf(),
                handle,
                kind,
                armed: true,
            });
            log::trace!(
                "watching: path={}, handle={}, kind={:?}",
                path.display(),
                handle,
                kind
            );
            return Ok(handle);
        }

        Err(WatchError::Exhausted {
            path: path.to_path_buf(),
            attempts: MAX_WATCH_ATTEMPTS,
        })
    }

    fn is_self_dir(&self, dir: &Path) -> bool {
        match (&self.self_dir, dir.file_name()) {
            (Some(self_dir), Some(name)) => name == self_dir.as_os_str(),
            _ => false,
        }
    }

    /// Watches the root of the tree and everything below it. Unlike
    /// [`WatchTree::add_directory`] the root is never skipped as the
    /// self-directory.
    ///
    /// Returns every log file found.
    pub fn watch_root(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut visited = HashSet::new();
        let mut found = Vec::new();
        self.walk(root, &mut visited, &mut found)?;
        Ok(found)
    }

    /// Watches `dir`, recursing into subdirectories (and symlinks to
    /// directories) and watching every file with a log suffix.
    ///
    /// Returns the log files found, for the caller to sample. Entries that
    /// vanish during the walk are skipped.
    ///
    /// # Errors
    ///
    /// [`WatchError::Vanished`] if `dir` itself is gone; registration
    /// failures and exhausted retries for any entry.
    pub fn add_directory(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if self.is_self_dir(dir) {
            log::debug!("skipping own log directory: path={}", dir.display());
            return Ok(Vec::new());
        }
        self.watch_root(dir)
    }

    fn walk(
        &self,
        dir: &Path,
        visited: &mut HashSet<PathBuf>,
        found: &mut Vec<PathBuf>,
    ) -> Result<()> {
        let canonical = std::fs::canonicalize(dir).map_err(|_| WatchError::Vanished {
            path: dir.to_path_buf(),
        })?;
        if !visited.insert(canonical) {
            log::debug!("directory already visited: path={}", dir.display());
            return Ok(());
        }

        self.acquire(dir, WatchKind::Directory)?;
        let entries = std::fs::read_dir(dir).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                WatchError::Vanished {
                    path: dir.to_path_buf(),
                }
            } else {
                WatchError::ReadDir {
                    path: dir.to_path_buf(),
                    source,
                }
            }
        })?;

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::debug!(
                        "failed reading directory entry: dir={}, error={}",
                        dir.display(),
                        err
                    );
                    continue;
                }
            };
            let path = entry.path();
            let result = if fsutil::is_dir(&path) {
                if self.is_self_dir(&path) {
                    log::debug!("skipping own log directory: path={}", path.display());
                    continue;
                }
                self.walk(&path, visited, found)
            } else if identity::has_log_suffix(&path) {
                self.acquire(&path, WatchKind::LogFile)
                    .map(|_| found.push(path.clone()))
            } else {
                continue;
            };
            match result {
                Ok(()) => {}
                Err(err) if err.is_vanished() => {
                    log::debug!("entry vanished during walk: path={}", path.display());
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Registers (or re-arms) the single-shot watch of a log file.
    pub fn add_log_file(&self, path: &Path) -> Result<()> {
        self.acquire(path, WatchKind::LogFile).map(|_| ())
    }

    /// Re-arms a single-shot file watch after its event was handled.
    pub fn rearm(&self, path: &Path) -> Result<()> {
        self.add_log_file(path)
    }

    /// Records that the single-shot watch of `path` fired.
    pub fn disarm(&self, path: &Path) {
        if let Some(entry) = self.write().by_path.get_mut(path) {
            if entry.kind == WatchKind::LogFile {
                entry.armed = false;
            }
        }
    }

    /// Drops the current watch of `path` and registers a fresh one, so a
    /// retargeted symlink is observed at its new destination.
    pub fn rewatch(&self, path: &Path, kind: WatchKind) -> Result<()> {
        if let Some(entry) = self.write().remove(path) {
            self.release(&entry);
        }
        self.acquire(path, kind).map(|_| ())
    }

    fn release(&self, entry: &WatchedPath) {
        if !entry.armed {
            return;
        }
        if let Err(err) = self.registrar.remove_watch(entry.handle) {
            log::debug!(
                "failed removing watch: path={}, error={}",
                entry.path.display(),
                err
            );
        }
    }

    /// Forgets the entry of `path`. Idempotent. The kernel watch is not
    /// touched; for deleted paths the kernel has already dropped it.
    pub fn remove_for_path(&self, path: &Path) -> Option<WatchedPath> {
        self.write().remove(path)
    }

    fn detach(&self, dir: &Path) -> Vec<WatchedPath> {
        let mut table = self.write();
        let doomed: Vec<PathBuf> = table
            .by_path
            .keys()
            .filter(|p| p.starts_with(dir))
            .cloned()
            .collect();
        doomed.iter().filter_map(|p| table.remove(p)).collect()
    }

    /// Forgets `dir` and every entry beneath it, returning the removed log
    /// file paths.
    pub fn remove_tree(&self, dir: &Path) -> Vec<PathBuf> {
        log_files(self.detach(dir))
    }

    /// Like [`WatchTree::remove_tree`], but also releases the kernel watches.
    /// Used for paths that were moved away and still exist elsewhere.
    pub fn release_tree(&self, dir: &Path) -> Vec<PathBuf> {
        let detached = self.detach(dir);
        for entry in &detached {
            self.release(entry);
        }
        log_files(detached)
    }

    pub fn kind_of(&self, path: &Path) -> Option<WatchKind> {
        self.read().by_path.get(path).map(|w| w.kind)
    }

    /// Snapshot of all entries, sorted by path.
    pub fn watch_list(&self) -> Vec<WatchedPath> {
        let mut list: Vec<WatchedPath> = self.read().by_path.values().cloned().collect();
        list.sort_by(|a, b| a.path.cmp(&b.path));
        list
    }

    pub fn len(&self) -> usize {
        self.read().by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().by_path.is_empty()
    }
}

fn log_files(entries: Vec<WatchedPath>) -> Vec<PathBuf> {
    entries
        .into_iter()
        .filter(|w| w.kind == WatchKind::LogFile)
        .map(|w| w.path)
        .collect()
}

impl<R: Registrar> HandleResolver for WatchTree<R> {
    fn resolve(&self, handle: WatchHandle, name: Option<&OsStr>) -> Option<PathBuf> {
        let table = self.read();
        let base = table.by_handle.get(&handle)?;
        Some(match name {
            Some(name) => base.join(name),
            None => base.clone(),
        })
    }
}
