//! The single event-processing loop.
//!
//! Each [`Event`] drives the watch table and the byte accounting:
//!
//! | event | action |
//! |---|---|
//! | `Create` dir / symlink to dir | watch subtree, sample every log found |
//! | `Create` log file / symlink to one | watch, sample |
//! | `Write`, `CloseWrite`, `Attrib` on the file | disarm, sample, re-arm |
//! | `Attrib` reported by the parent directory | sample |
//! | `Attrib`, `Rename` on a symlink | re-watch the new target, sample |
//! | `Rename` of a log file | release the watch, keep the baseline |
//! | `Rename` of a directory | release watches, forget everything beneath |
//! | `Remove` | forget the path and everything beneath it |
//! | `Overflow` | fatal, the process restarts and resyncs |
mod error;

pub use error::{DispatchError, Result};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::accounting::{ByteCounterRegistry, Observation};
use crate::error::ResultOkLogExt;
use crate::fsutil;
use crate::identity;
use crate::inotify::{Inotify, Registrar};
use crate::watch::{
    Event, EventKind, EventSource, EventStats, WatchError, WatchKind, WatchTree, WatchedPath,
};

/// Interval of the periodic diagnostics report.
pub const DIAGNOSTICS_INTERVAL: Duration = Duration::from_secs(60);

/// Applies events to a [`WatchTree`] and a [`ByteCounterRegistry`].
#[derive(Debug)]
pub struct EventHandler<R: Registrar = Inotify> {
    tree: Arc<WatchTree<R>>,
    counters: Arc<ByteCounterRegistry>,
}

impl<R: Registrar> EventHandler<R> {
    pub fn new(tree: Arc<WatchTree<R>>, counters: Arc<ByteCounterRegistry>) -> Self {
        Self { tree, counters }
    }

    pub fn tree(&self) -> Arc<WatchTree<R>> {
        Arc::clone(&self.tree)
    }

    pub fn counters(&self) -> Arc<ByteCounterRegistry> {
        Arc::clone(&self.counters)
    }

    /// Handles one event.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Overflow`] on queue overflow and any watch error other
    /// than a vanished path. Both are fatal.
    pub fn handle(&self, event: &Event) -> Result<()> {
        log::debug!("handling event: {}", event);
        match event.kind {
            EventKind::Overflow => Err(DispatchError::Overflow),
            EventKind::Create => self.on_create(event),
            EventKind::Write | EventKind::CloseWrite => self.on_write(&event.path),
            EventKind::Attrib | EventKind::Rename if event.is_symlink => {
                self.on_retarget(event)
            }
            EventKind::Attrib => match self.tree.kind_of(&event.path) {
                // The file's own single-shot watch is still armed.
                Some(WatchKind::LogFile) if event.via_directory => {
                    self.sample(&event.path);
                    Ok(())
                }
                Some(WatchKind::LogFile) => self.on_write(&event.path),
                _ => Ok(()),
            },
            EventKind::Rename => {
                self.on_rename(&event.path);
                Ok(())
            }
            EventKind::Remove => {
                self.on_remove(&event.path);
                Ok(())
            }
        }
    }

    fn on_create(&self, event: &Event) -> Result<()> {
        let path = &event.path;
        if event.is_dir {
            let found = self.absorb_vanished(path, self.tree.add_directory(path))?;
            for log in found.unwrap_or_default() {
                self.sample(&log);
            }
            return Ok(());
        }
        if !identity::has_log_suffix(path) {
            log::trace!("ignoring non-log file: path={}", path.display());
            return Ok(());
        }
        if self
            .absorb_vanished(path, self.tree.add_log_file(path))?
            .is_some()
        {
            self.sample(path);
        }
        Ok(())
    }

    fn on_write(&self, path: &Path) -> Result<()> {
        self.tree.disarm(path);
        if !self.sample(path) {
            return Ok(());
        }
        self.absorb_vanished(path, self.tree.rearm(path))?;
        Ok(())
    }

    fn on_retarget(&self, event: &Event) -> Result<()> {
        let path = &event.path;
        if event.is_dir {
            for log in self.tree.release_tree(path) {
                self.counters.forget_path(&log);
            }
            let found = self.absorb_vanished(path, self.tree.add_directory(path))?;
            for log in found.unwrap_or_default() {
                self.sample(&log);
            }
            return Ok(());
        }
        if !identity::has_log_suffix(path) {
            return Ok(());
        }
        if self
            .absorb_vanished(path, self.tree.rewatch(path, WatchKind::LogFile))?
            .is_some()
        {
            self.sample(path);
        }
        Ok(())
    }

    /// A renamed log file keeps its baseline: kubelet recreates the live
    /// name right away and the new generation is counted by the shrink
    /// rule. A renamed directory takes its logs out of the tree.
    fn on_rename(&self, path: &Path) {
        let was_dir = self.tree.kind_of(path) == Some(WatchKind::Directory);
        let released = self.tree.release_tree(path);
        if was_dir {
            for log in released {
                self.counters.forget_path(&log);
            }
            self.counters.forget_under(path);
        }
        if std::fs::symlink_metadata(path).is_ok()
            && identity::has_log_suffix(path)
            && !fsutil::is_dir(path)
        {
            // Something already took the old name; its own create event
            // re-registers it.
            self.sample(path);
        }
    }

    fn on_remove(&self, path: &Path) {
        for log in self.tree.remove_tree(path) {
            self.counters.forget_path(&log);
        }
        self.counters.forget_path(path);
        self.counters.forget_under(path);
    }

    /// Samples the log files of an initial walk. Files that vanished since
    /// the walk are dropped from the tree. Returns the number still present.
    pub fn resync(&self, paths: &[PathBuf]) -> usize {
        paths.iter().filter(|path| self.sample(path)).count()
    }

    /// Samples `path` into the counters. Returns `false` if the file is gone,
    /// in which case its watch entry is dropped too.
    fn sample(&self, path: &Path) -> bool {
        match self.counters.observe_path(path).ok_log() {
            Some(Observation::Gone) => {
                self.on_remove(path);
                false
            }
            Some(Observation::Counted { delta, size, .. }) => {
                log::trace!(
                    "sampled: path={}, size={}, added_bytes={}",
                    path.display(),
                    size,
                    delta
                );
                true
            }
            Some(Observation::Unclassified | Observation::Ignored) | None => true,
        }
    }

    /// Turns a vanished path into a removal; other errors stay fatal.
    fn absorb_vanished<T>(
        &self,
        path: &Path,
        result: std::result::Result<T, WatchError>,
    ) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_vanished() => {
                log::debug!("path vanished before watch: path={}", path.display());
                self.on_remove(path);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct Report<'a> {
    watches: usize,
    sent_events: u64,
    handled_events: u64,
    sizes: &'a std::collections::BTreeMap<String, u64>,
    watched: &'a [WatchedPath],
}

/// Runs the [`EventHandler`] over an [`EventSource`] until the source closes
/// or a fatal error occurs.
#[derive(Debug)]
pub struct Dispatcher {
    source: EventSource,
    handler: EventHandler,
    stats: Arc<EventStats>,
    diagnostics_interval: Duration,
}

impl Dispatcher {
    pub fn new(source: EventSource, handler: EventHandler, stats: Arc<EventStats>) -> Self {
        Self {
            source,
            handler,
            stats,
            diagnostics_interval: DIAGNOSTICS_INTERVAL,
        }
    }

    pub fn with_diagnostics_interval(mut self, interval: Duration) -> Self {
        self.diagnostics_interval = interval;
        self
    }

    /// Processes events strictly in arrival order.
    ///
    /// Returns `Ok(())` when the source is closed.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`DispatchError`].
    pub async fn run(mut self) -> Result<()> {
        let mut tick = tokio::time::interval(self.diagnostics_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tick.tick().await;

        loop {
            tokio::select! {
                event = self.source.next_event(self.handler.tree.as_ref()) => {
                    let Some(event) = event else {
                        log::info!("event source closed, stopping dispatcher");
                        return Ok(());
                    };
                    self.handler.handle(&event)?;
                    self.stats.record_handled();
                }
                _ = tick.tick() => report(&self.handler, &self.stats),
            }
        }
    }
}

fn report(handler: &EventHandler, stats: &EventStats) {
    log::info!(
        "watch status: watches={}, sent_events={}, handled_events={}",
        handler.tree.len(),
        stats.sent(),
        stats.handled()
    );
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let sizes = handler.counters.sizes_snapshot();
    let watched = handler.tree.watch_list();
    let report = Report {
        watches: watched.len(),
        sent_events: stats.sent(),
        handled_events: stats.handled(),
        sizes: &sizes,
        watched: &watched,
    };
    match serde_json::to_string(&report) {
        Ok(json) => log::debug!("watch report: {}", json),
        Err(err) => log::debug!("failed serializing watch report: error={}", err),
    }
}
