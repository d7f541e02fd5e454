use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::unix::AsyncFd;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::error::{Result, WatchError};
use super::event::{self, Event, HandleResolver};
use crate::fsutil;
use crate::inotify::{EventReader, Inotify, RawEvent};

/// Capacity of the queue between the reader task and the consumer.
pub const EVENT_QUEUE_CAPACITY: usize = 4096;

const READ_BUFFER_LEN: usize = 16 * 4096;

/// Event throughput counters, reported by the diagnostics tick.
#[derive(Debug, Default)]
pub struct EventStats {
    sent: AtomicU64,
    handled: AtomicU64,
}

impl EventStats {
    /// Events published by the reader task.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Events fully processed by the consumer.
    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }
}

/// Stream of normalized filesystem events for one inotify instance.
///
/// A background task drains the descriptor and queues decoded records;
/// [`EventSource::next_event`] turns them into [`Event`]s using the current
/// watch table.
#[derive(Debug)]
pub struct EventSource {
    inotify: Inotify,
    events: mpsc::Receiver<RawEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    reader: JoinHandle<()>,
}

impl EventSource {
    /// Opens an inotify instance for the tree at `root` and starts the
    /// reader task. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`WatchError::RootNotDirectory`] if `root` is not a directory, or an
    /// error creating the descriptor.
    pub fn open(root: &Path, stats: Arc<EventStats>) -> Result<Self> {
        if !fsutil::is_dir(root) {
            return Err(WatchError::RootNotDirectory(root.to_path_buf()));
        }
        let inotify = Inotify::init()?;
        let fd = AsyncFd::new(inotify.clone()).map_err(WatchError::Reactor)?;
        let (tx, events) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (shutdown, shutdown_rx) = oneshot::channel();
        let reader = tokio::spawn(read_events(fd, tx, shutdown_rx, stats));

        Ok(Self {
            inotify,
            events,
            shutdown: Some(shutdown),
            reader,
        })
    }

    /// Handle for registering watches on this source's descriptor.
    pub fn registrar(&self) -> Inotify {
        self.inotify.clone()
    }

    /// Waits for the next event. Returns `None` once the source is closed.
    ///
    /// Cancel safe: no event is lost if the future is dropped before it
    /// completes.
    pub async fn next_event<R: HandleResolver + ?Sized>(&mut self, resolver: &R) -> Option<Event> {
        loop {
            let raw = self.events.recv().await?;
            if let Some(event) = event::normalize(raw, resolver) {
                return Some(event);
            }
        }
    }

    /// Stops the reader task. Events already queued are still delivered.
    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_finished()
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        self.close();
    }
}

async fn read_events(
    fd: AsyncFd<Inotify>,
    events: mpsc::Sender<RawEvent>,
    mut shutdown: oneshot::Receiver<()>,
    stats: Arc<EventStats>,
) {
    let mut buf = vec![0u8; READ_BUFFER_LEN];
    loop {
        let mut guard = tokio::select! {
            _ = &mut shutdown => {
                log::debug!("event reader stopped");
                return;
            }
            ready = fd.readable() => match ready {
                Ok(guard) => guard,
                Err(err) => {
                    log::error!("failed polling inotify descriptor: error={}", err);
                    return;
                }
            },
        };
        let read = guard.try_io(|inner| inner.get_ref().read(&mut buf));
        drop(guard);
        let n = match read {
            Ok(Ok(n)) => n,
            Ok(Err(err)) => {
                log::error!("failed reading inotify descriptor: error={}", err);
                return;
            }
            Err(_would_block) => continue,
        };

        let mut reader = EventReader::new(&buf[..n]);
        while let Some(decoded) = reader.next() {
            match decoded {
                Ok(raw) => {
                    if events.send(raw).await.is_err() {
                        log::debug!("event consumer gone, stopping reader");
                        return;
                    }
                    stats.record_sent();
                }
                Err(err) => {
                    log::warn!(
                        "dropping undecodable inotify data: consumed={}, read={}, error={}",
                        reader.consumed(),
                        n,
                        err
                    );
                    break;
                }
            }
        }
    }
}
