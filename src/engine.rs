use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

use crate::accounting::ByteCounterRegistry;
use crate::dispatch::{Dispatcher, EventHandler};
use crate::error::Result;
use crate::watch::{EventSource, EventStats, WatchTree};

/// The watch engine: event source, watch table and counters for one log
/// root.
#[derive(Debug)]
pub struct Engine {
    source: EventSource,
    handler: EventHandler,
    stats: Arc<EventStats>,
}

impl Engine {
    /// Watches `root` recursively and samples every log already present, so
    /// a restart resumes from the current file sizes.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if `root` is not a directory, inotify cannot be set up, or the
    /// initial walk cannot register a watch.
    pub fn start(root: &Path, self_dir: Option<OsString>) -> Result<Self> {
        let stats = Arc::new(EventStats::default());
        let source = EventSource::open(root, Arc::clone(&stats))?;
        let tree = Arc::new(WatchTree::new(source.registrar(), self_dir));
        let counters = Arc::new(ByteCounterRegistry::new()?);

        let found = tree.watch_root(root)?;
        let handler = EventHandler::new(Arc::clone(&tree), Arc::clone(&counters));
        let sampled = handler.resync(&found);
        log::info!(
            "watching log root: path={}, watches={}, log_files={}",
            root.display(),
            tree.len(),
            sampled
        );

        Ok(Self {
            source,
            handler,
            stats,
        })
    }

    pub fn counters(&self) -> Arc<ByteCounterRegistry> {
        self.handler.counters()
    }

    pub fn tree(&self) -> Arc<WatchTree> {
        self.handler.tree()
    }

    /// Hands the engine to the event loop.
    pub fn into_dispatcher(self) -> Dispatcher {
        Dispatcher::new(self.source, self.handler, self.stats)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::identity::WorkloadIdentity;
    use crate::watch::WatchKind;

    const UID: &str = "0123456789abcdef0123456789abcdef";

    async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while !condition() {
            assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_start_samples_existing_logs() {
        let root = tempfile::tempdir().unwrap();
        let container = root.path().join(format!("ns_pod_{UID}")).join("app");
        std::fs::create_dir_all(&container).unwrap();
        std::fs::write(container.join("3.log"), b"existing").unwrap();

        let engine = Engine::start(root.path(), None).unwrap();
        let id = WorkloadIdentity::new("ns", "pod", UID, "app", 3);
        assert_eq!(engine.counters().counter_value(&id), Some(8));
    }

    #[tokio::test]
    async fn test_start_rejects_missing_root() {
        let root = tempfile::tempdir().unwrap();
        assert!(Engine::start(&root.path().join("missing"), None).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_file_lifecycle() {
        let root = tempfile::tempdir().unwrap();
        let engine = Engine::start(root.path(), None).unwrap();
        let counters = engine.counters();
        let tree = engine.tree();
        let dispatcher = tokio::spawn(engine.into_dispatcher().run());

        let container = root.path().join(format!("ns_pod_{UID}")).join("app");
        std::fs::create_dir_all(&container).unwrap();
        wait_for("container directory watch", || {
            tree.kind_of(&container) == Some(WatchKind::Directory)
        })
        .await;

        let log = container.join("0.log");
        let id = WorkloadIdentity::new("ns", "pod", UID, "app", 0);
        std::fs::write(&log, b"hello\n").unwrap();
        wait_for("first write", || counters.counter_value(&id) == Some(6)).await;

        {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new().append(true).open(&log).unwrap();
            file.write_all(b"0123456789").unwrap();
        }
        wait_for("append", || counters.counter_value(&id) == Some(16)).await;

        std::fs::remove_file(&log).unwrap();
        wait_for("removal", || {
            counters.counter_value(&id).is_none() && tree.kind_of(&log).is_none()
        })
        .await;

        assert!(!dispatcher.is_finished());
        dispatcher.abort();
    }
}
