//! Recursive inotify watch engine.
//!
//! # Architecture
//!
//! - [`EventSource`] — owns the inotify descriptor and a reader task that
//!   publishes decoded records onto a bounded queue.
//! - [`WatchTree`] — the path/handle table. Directories get persistent
//!   watches, log files get single-shot watches that are re-armed after
//!   every event.
//! - [`normalize`] — maps raw records to [`Event`]s, resolving handles
//!   through the tree and detecting symlinks.
mod error;
mod event;
mod source;
mod tree;

pub use error::{Result, WatchError};
pub use event::{Event, EventKind, HandleResolver, normalize};
pub use source::{EVENT_QUEUE_CAPACITY, EventSource, EventStats};
pub use tree::{MAX_WATCH_ATTEMPTS, WatchKind, WatchTree, WatchedPath};
