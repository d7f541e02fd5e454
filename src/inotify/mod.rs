//! Thin, safe wrapper around the Linux inotify API.
//!
//! This module owns every `unsafe` call into libc the crate makes. Higher
//! layers (see [`crate::watch`]) only deal with [`Inotify`], [`WatchHandle`]
//! and decoded [`RawEvent`]s.
//!
//! # Platform Requirements
//!
//! - Linux. Watches are limited by `/proc/sys/fs/inotify/max_user_watches`.
mod error;
mod mask;
mod reader;

pub use error::{DecodeError, Error, Result};
pub use mask::EventMask;
pub use reader::{EVENT_HEADER_LEN, EventReader, RawEvent};

use std::ffi::CString;
use std::fmt;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::Arc;

/// Watch descriptor returned by `inotify_add_watch(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchHandle(i32);

impl WatchHandle {
    pub const fn new(wd: i32) -> Self {
        Self(wd)
    }

    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Registers and removes watches on an inotify instance.
pub trait Registrar {
    /// Adds (or updates) the watch for `path` with the given mask.
    fn add_watch(&self, path: &Path, mask: EventMask) -> Result<WatchHandle>;

    /// Removes the watch identified by `handle`.
    fn remove_watch(&self, handle: WatchHandle) -> Result<()>;
}

/// An inotify instance. Cloning shares the same descriptor.
///
/// The descriptor is non-blocking and close-on-exec. It is closed, and all
/// of its watches released, when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct Inotify {
    fd: Arc<OwnedFd>,
}

impl Inotify {
    /// Creates a new inotify instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Init`] if the kernel refuses a new instance, e.g.
    /// because `max_user_instances` is reached.
    pub fn init() -> Result<Self> {
        // SAFETY: inotify_init1 takes no pointers.
        let fd = unsafe { libc::inotify_init1(libc::IN_CLOEXEC | libc::IN_NONBLOCK) };
        if fd == -1 {
            return Err(Error::Init(std::io::Error::last_os_error()));
        }
        // SAFETY: `fd` was just returned by the kernel and is not owned elsewhere.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { fd: Arc::new(fd) })
    }

    /// Reads pending events into `buf`.
    ///
    /// Returns an error of kind [`std::io::ErrorKind::WouldBlock`] when no
    /// event is queued.
    pub fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        // SAFETY: `buf` is valid for writes of `buf.len()` bytes for the
        // duration of the call.
        let n = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len(),
            )
        };
        if n < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(n as usize)
    }
}

impl AsRawFd for Inotify {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Registrar for Inotify {
    fn add_watch(&self, path: &Path, mask: EventMask) -> Result<WatchHandle> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| Error::InvalidPath(path.to_path_buf()))?;
        // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
        let wd =
            unsafe { libc::inotify_add_watch(self.fd.as_raw_fd(), c_path.as_ptr(), mask.bits()) };
        if wd == -1 {
            return Err(Error::AddWatch {
                path: path.to_path_buf(),
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(WatchHandle::new(wd))
    }

    fn remove_watch(&self, handle: WatchHandle) -> Result<()> {
        // SAFETY: inotify_rm_watch takes no pointers.
        let ret = unsafe { libc::inotify_rm_watch(self.fd.as_raw_fd(), handle.as_raw()) };
        if ret == -1 {
            return Err(Error::RemoveWatch {
                handle,
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_events(inotify: &Inotify) -> Vec<RawEvent> {
        let mut buf = [0u8; 4096];
        let n = inotify.read(&mut buf).expect("events should be queued");
        EventReader::new(&buf[..n]).map(|e| e.unwrap()).collect()
    }

    #[test]
    fn test_read_without_events_would_block() {
        let inotify = Inotify::init().unwrap();
        let mut buf = [0u8; 256];
        let err = inotify.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_directory_watch_reports_create() {
        let dir = tempfile::tempdir().unwrap();
        let inotify = Inotify::init().unwrap();
        let handle = inotify
            .add_watch(dir.path(), EventMask::CREATE | EventMask::DELETE)
            .unwrap();

        std::fs::write(dir.path().join("0.log"), b"hello\n").unwrap();

        let events = read_events(&inotify);
        let create = events
            .iter()
            .find(|e| e.mask.contains(EventMask::CREATE))
            .expect("create event");
        assert_eq!(create.handle, handle);
        assert_eq!(create.name.as_deref(), Some(std::ffi::OsStr::new("0.log")));
    }

    #[test]
    fn test_oneshot_file_watch_fires_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.log");
        std::fs::write(&path, b"").unwrap();

        let inotify = Inotify::init().unwrap();
        let handle = inotify
            .add_watch(&path, EventMask::MODIFY | EventMask::ONESHOT)
            .unwrap();

        std::fs::write(&path, b"first\n").unwrap();
        std::fs::write(&path, b"second\n").unwrap();

        let events = read_events(&inotify);
        let modifies = events
            .iter()
            .filter(|e| e.mask.contains(EventMask::MODIFY))
            .count();
        assert_eq!(modifies, 1);
        assert!(
            events
                .iter()
                .any(|e| e.handle == handle && e.mask.contains(EventMask::IGNORED))
        );
    }

    #[test]
    fn test_add_watch_missing_path() {
        let inotify = Inotify::init().unwrap();
        let err = inotify
            .add_watch(Path::new("/definitely/does/not/exist"), EventMask::MODIFY)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_remove_watch_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let inotify = Inotify::init().unwrap();
        let handle = inotify.add_watch(dir.path(), EventMask::CREATE).unwrap();

        inotify.remove_watch(handle).unwrap();
        assert!(matches!(
            inotify.remove_watch(handle),
            Err(Error::RemoveWatch { .. })
        ));
    }
}
