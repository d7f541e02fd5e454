use std::ffi::OsStr;
use std::fmt;
use std::path::PathBuf;

use crate::fsutil;
use crate::inotify::{EventMask, RawEvent, WatchHandle};

/// Maps a watch handle (plus the optional entry name carried by directory
/// events) back to a filesystem path.
pub trait HandleResolver {
    fn resolve(&self, handle: WatchHandle, name: Option<&OsStr>) -> Option<PathBuf>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Write,
    CloseWrite,
    Remove,
    Rename,
    Attrib,
    /// The kernel queue overflowed; events were lost.
    Overflow,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Create => "create",
            EventKind::Write => "write",
            EventKind::CloseWrite => "close_write",
            EventKind::Remove => "remove",
            EventKind::Rename => "rename",
            EventKind::Attrib => "attrib",
            EventKind::Overflow => "overflow",
        };
        f.write_str(name)
    }
}

/// A normalized filesystem event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub path: PathBuf,
    pub kind: EventKind,
    /// For a symlink this reflects the link target.
    pub is_dir: bool,
    pub is_symlink: bool,
    /// Reported by the parent directory's watch (the record named an entry)
    /// rather than by a watch on the path itself.
    pub via_directory: bool,
}

impl Event {
    pub fn new(path: impl Into<PathBuf>, kind: EventKind) -> Self {
        Self {
            path: path.into(),
            kind,
            is_dir: false,
            is_symlink: false,
            via_directory: false,
        }
    }

    pub fn overflow() -> Self {
        Self::new(PathBuf::new(), EventKind::Overflow)
    }

    pub fn dir(mut self, is_dir: bool) -> Self {
        self.is_dir = is_dir;
        self
    }

    pub fn symlink(mut self, is_symlink: bool) -> Self {
        self.is_symlink = is_symlink;
        self
    }

    pub fn via_directory(mut self, via_directory: bool) -> Self {
        self.via_directory = via_directory;
        self
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (dir={}, symlink={})",
            self.kind,
            self.path.display(),
            self.is_dir,
            self.is_symlink
        )
    }
}

fn kind_of(mask: EventMask) -> Option<EventKind> {
    if mask.intersects(EventMask::CREATE | EventMask::MOVED_TO) {
        Some(EventKind::Create)
    } else if mask.contains(EventMask::DELETE) {
        Some(EventKind::Remove)
    } else if mask.contains(EventMask::MOVED_FROM) {
        Some(EventKind::Rename)
    } else if mask.contains(EventMask::MODIFY) {
        Some(EventKind::Write)
    } else if mask.contains(EventMask::CLOSE_WRITE) {
        Some(EventKind::CloseWrite)
    } else if mask.contains(EventMask::ATTRIB) {
        Some(EventKind::Attrib)
    } else {
        None
    }
}

/// Turns a decoded inotify record into an [`Event`].
///
/// Returns `None` for records that carry nothing for the dispatcher:
/// `IN_IGNORED` notifications, unknown masks and handles that no longer
/// resolve (late events for a watch that was already dropped).
pub fn normalize<R: HandleResolver + ?Sized>(raw: RawEvent, resolver: &R) -> Option<Event> {
    if raw.mask.contains(EventMask::Q_OVERFLOW) {
        return Some(Event::overflow());
    }
    if raw.mask.contains(EventMask::IGNORED) {
        log::trace!("watch released: handle={}", raw.handle);
        return None;
    }
    let Some(kind) = kind_of(raw.mask) else {
        log::trace!("unhandled inotify mask: handle={}, mask={:#x}", raw.handle, raw.mask);
        return None;
    };
    let Some(path) = resolver.resolve(raw.handle, raw.name.as_deref()) else {
        log::debug!(
            "event for unknown watch: handle={}, name={:?}, kind={}",
            raw.handle,
            raw.name,
            kind
        );
        return None;
    };

    let mut event = Event::new(path, kind)
        .dir(raw.mask.contains(EventMask::ISDIR))
        .via_directory(raw.name.is_some());
    if matches!(kind, EventKind::Create | EventKind::Rename | EventKind::Attrib)
        && fsutil::is_symlink(&event.path)
    {
        event.is_symlink = true;
        event.is_dir = fsutil::is_dir(&event.path);
    }
    Some(event)
}
