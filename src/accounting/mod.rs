//! Rotation-aware byte accounting.
//!
//! Every live log file contributes to the `log_logged_bytes_total` counter of
//! its container. The counter only ever grows: a file that got bigger adds
//! the growth, a file that got smaller was truncated or rotated in place and
//! adds its whole new size (the bytes of the new generation seen so far).
//!
//! # Key Components
//!
//! - [`next_delta`] — the pure delta rule.
//! - [`ByteCounterRegistry`] — baselines per [`WorkloadIdentity`] plus the
//!   exported counter vector.
mod error;

pub use error::{Error, Result};

use std::collections::BTreeMap;
use std::path::Path;

use dashmap::DashMap;
use prometheus::{IntCounterVec, Opts, Registry};

use crate::fsutil::{self, FileSize};
use crate::identity::{self, LABEL_NAMES, WorkloadIdentity};

/// Name of the exported counter.
pub const METRIC_NAME: &str = "log_logged_bytes_total";

const METRIC_HELP: &str =
    "Total number of bytes written to a single log file path, accounting for rotations";

/// Computes the counter increment for a file whose last observed size was
/// `last` and whose current size is `current`.
///
/// ```
/// # use log_file_metric_exporter::accounting::next_delta;
/// assert_eq!(next_delta(0, 6), 6);    // first observation
/// assert_eq!(next_delta(6, 16), 10);  // append
/// assert_eq!(next_delta(16, 16), 0);  // duplicate notification
/// assert_eq!(next_delta(16, 4), 4);   // truncated, new generation
/// ```
pub const fn next_delta(last: u64, current: u64) -> u64 {
    if current > last {
        current - last
    } else if current < last {
        current
    } else {
        0
    }
}

/// Outcome of [`ByteCounterRegistry::observe_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The path is not a pod log path.
    Unclassified,
    /// The path is a directory, or a rotated/archived generation whose bytes
    /// were already counted while it was live.
    Ignored,
    /// The file no longer exists; its baseline and series were dropped.
    Gone,
    /// The file was sampled and `delta` bytes were added to its series.
    Counted {
        identity: WorkloadIdentity,
        size: u64,
        delta: u64,
    },
}

/// Per-identity baselines and the exported cumulative counter.
///
/// Baselines are kept per full identity, so `0.log` and `1.log` of a
/// restarted container do not clobber each other. The counter is keyed by
/// the four exported labels, which all generations of a container share.
pub struct ByteCounterRegistry {
    registry: Registry,
    logged_bytes: IntCounterVec,
    sizes: DashMap<WorkloadIdentity, u64>,
}

impl ByteCounterRegistry {
    /// Creates the counter vector and registers it in a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Metric`] if the metric cannot be created or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let logged_bytes = IntCounterVec::new(Opts::new(METRIC_NAME, METRIC_HELP), &LABEL_NAMES)?;
        registry.register(Box::new(logged_bytes.clone()))?;
        Ok(Self {
            registry,
            logged_bytes,
            sizes: DashMap::new(),
        })
    }

    /// Registry holding the exported counter, for the scrape handler.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Records a new size sample for `identity` and returns the number of
    /// bytes added to its series.
    pub fn update(&self, identity: &WorkloadIdentity, current: u64) -> u64 {
        let counter = self.logged_bytes.with_label_values(&identity.label_values());
        let mut last = self.sizes.entry(identity.clone()).or_insert(0);
        let delta = next_delta(*last, current);
        log::debug!(
            "updated metric: identity={}, last_size={}, current_size={}, added_bytes={}",
            identity,
            *last,
            current,
            delta
        );
        *last = current;
        counter.inc_by(delta);
        delta
    }

    /// Drops the baseline of `identity`. The exported label set is removed
    /// as well unless another baseline still feeds it.
    pub fn forget(&self, identity: &WorkloadIdentity) {
        if self.sizes.remove(identity).is_none() {
            return;
        }
        let labels = identity.label_values();
        let shared = self
            .sizes
            .iter()
            .any(|entry| entry.key().label_values() == labels);
        if shared {
            log::debug!("forgot baseline, series still in use: identity={}", identity);
            return;
        }
        if let Err(err) = self.logged_bytes.remove_label_values(&labels) {
            log::debug!("no series to remove: identity={}, error={}", identity, err);
        }
        log::debug!("forgot series: identity={}", identity);
    }

    /// Classifies `path` and forgets its identity.
    pub fn forget_path(&self, path: impl AsRef<Path>) {
        if let Some(identity) = identity::classify(path) {
            self.forget(&identity);
        }
    }

    /// Forgets every baseline whose log file lies below `dir`, including
    /// generations that were renamed away and never recreated.
    pub fn forget_under(&self, dir: impl AsRef<Path>) {
        let dir = dir.as_ref();
        let doomed: Vec<WorkloadIdentity> = self
            .sizes
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|identity| lies_under(identity, dir))
            .collect();
        for identity in &doomed {
            self.forget(identity);
        }
    }

    /// Samples the size of `path` and accounts it.
    ///
    /// A file that vanished before it could be sampled is forgotten and
    /// reported as [`Observation::Gone`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stat`] for stat failures other than a missing file.
    pub fn observe_path(&self, path: impl AsRef<Path>) -> Result<Observation> {
        let path = path.as_ref();
        let Some(identity) = identity::classify(path) else {
            return Ok(Observation::Unclassified);
        };
        if !identity.is_live() {
            log::trace!("skipping rotated log: path={}", path.display());
            return Ok(Observation::Ignored);
        }
        match fsutil::file_size(path) {
            Ok(FileSize::Directory) => {
                log::trace!("ignoring directory: path={}", path.display());
                Ok(Observation::Ignored)
            }
            Ok(FileSize::Bytes(size)) => {
                let delta = self.update(&identity, size);
                Ok(Observation::Counted {
                    identity,
                    size,
                    delta,
                })
            }
            Err(err) if err.is_not_found() => {
                log::debug!("file vanished before stat: path={}", path.display());
                self.forget(&identity);
                Ok(Observation::Gone)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Current value of the series of `identity`, if it is exported.
    pub fn counter_value(&self, identity: &WorkloadIdentity) -> Option<u64> {
        let labels = identity.label_values();
        self.registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == METRIC_NAME)
            .flat_map(|family| family.get_metric())
            .find(|metric| {
                metric.get_label().iter().all(|pair| {
                    LABEL_NAMES
                        .iter()
                        .position(|name| *name == pair.get_name())
                        .is_some_and(|i| labels[i] == pair.get_value())
                })
            })
            .map(|metric| metric.get_counter().get_value() as u64)
    }

    /// Last observed sizes keyed by relative log path, for diagnostics.
    pub fn sizes_snapshot(&self) -> BTreeMap<String, u64> {
        self.sizes
            .iter()
            .map(|entry| (entry.key().to_string(), *entry.value()))
            .collect()
    }

    /// Number of identities with a baseline.
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}

/// `dir` names the pod or container directory of `identity` when its
/// trailing components match the leading components of the log path.
fn lies_under(identity: &WorkloadIdentity, dir: &Path) -> bool {
    identity
        .relative_path()
        .ancestors()
        .skip(1)
        .filter(|prefix| !prefix.as_os_str().is_empty())
        .any(|prefix| dir.ends_with(prefix))
}

impl std::fmt::Debug for ByteCounterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteCounterRegistry")
            .field("baselines", &self.sizes.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    const UID: &str = "9a5888d1-e009-4cc3-bc19-c5543b4b84f7";

    fn identity(restart: u32) -> WorkloadIdentity {
        WorkloadIdentity::new("openshift-monitoring", "prometheus-k8s-0", UID, "thanos", restart)
    }

    /// Sum of all positive size increases, counting a shrink as the start of
    /// a new generation.
    fn expected_total(sizes: &[u64]) -> u64 {
        let mut total = 0;
        let mut last = 0;
        for &size in sizes {
            if size > last {
                total += size - last;
            } else if size < last {
                total += size;
            }
            last = size;
        }
        total
    }

    #[test]
    fn test_next_delta() {
        assert_eq!(next_delta(0, 0), 0);
        assert_eq!(next_delta(0, 6), 6);
        assert_eq!(next_delta(6, 16), 10);
        assert_eq!(next_delta(16, 16), 0);
        assert_eq!(next_delta(16, 0), 0);
        assert_eq!(next_delta(16, 3), 3);
    }

    #[test]
    fn test_append_then_duplicate_notification() {
        let counters = ByteCounterRegistry::new().unwrap();
        let id = identity(0);

        assert_eq!(counters.update(&id, 6), 6);
        assert_eq!(counters.update(&id, 16), 10);
        assert_eq!(counters.update(&id, 16), 0);
        assert_eq!(counters.counter_value(&id), Some(16));
    }

    #[test]
    fn test_shrink_to_zero_then_grow() {
        let counters = ByteCounterRegistry::new().unwrap();
        let id = identity(0);

        counters.update(&id, 100);
        assert_eq!(counters.update(&id, 0), 0);
        assert_eq!(counters.update(&id, 25), 25);
        assert_eq!(counters.counter_value(&id), Some(125));
    }

    #[test]
    fn test_total_is_independent_of_notification_granularity() {
        let fine = [5, 10, 10, 20, 7, 7, 30, 0, 4, 9];
        // Coarse delivery only sees some of the samples, but every rotation
        // (shrink) is still observed.
        let coarse = [10, 20, 7, 30, 0, 9];

        let counters = ByteCounterRegistry::new().unwrap();
        let a = identity(0);
        let b = identity(1);
        for size in fine {
            counters.update(&a, size);
        }
        for size in coarse {
            counters.update(&b, size);
        }
        // Both identities feed one series.
        assert_eq!(
            counters.counter_value(&a),
            Some(expected_total(&fine) + expected_total(&coarse))
        );
        assert_eq!(expected_total(&fine), expected_total(&coarse));
    }

    #[test]
    fn test_forget_removes_series() {
        let counters = ByteCounterRegistry::new().unwrap();
        let id = identity(0);
        counters.update(&id, 42);

        counters.forget(&id);
        assert_eq!(counters.counter_value(&id), None);
        assert!(counters.is_empty());

        // Recreated from scratch after a forget.
        counters.update(&id, 7);
        assert_eq!(counters.counter_value(&id), Some(7));
    }

    #[test]
    fn test_forget_keeps_series_shared_with_other_generation() {
        let counters = ByteCounterRegistry::new().unwrap();
        counters.update(&identity(0), 10);
        counters.update(&identity(1), 5);

        counters.forget(&identity(0));
        assert_eq!(counters.counter_value(&identity(1)), Some(15));

        counters.forget(&identity(1));
        assert_eq!(counters.counter_value(&identity(1)), None);
    }

    #[test]
    fn test_forget_unknown_identity_is_noop() {
        let counters = ByteCounterRegistry::new().unwrap();
        counters.forget(&identity(3));
        assert!(counters.is_empty());
    }

    #[test]
    fn test_forget_under_pod_and_container_directories() {
        let counters = ByteCounterRegistry::new().unwrap();
        let other = WorkloadIdentity::new("ns", "other", UID, "app", 0);
        let sidecar = WorkloadIdentity::new(
            "openshift-monitoring",
            "prometheus-k8s-0",
            UID,
            "sidecar",
            0,
        );
        counters.update(&identity(0), 10);
        counters.update(&identity(1), 5);
        counters.update(&sidecar, 3);
        counters.update(&other, 7);

        let pod_dir = std::path::PathBuf::from("/var/log/pods")
            .join(format!("openshift-monitoring_prometheus-k8s-0_{UID}"));
        counters.forget_under(pod_dir.join("thanos"));
        assert_eq!(counters.counter_value(&identity(0)), None);
        assert_eq!(counters.counter_value(&sidecar), Some(3));

        // A file path is not a directory of any identity.
        counters.forget_under(pod_dir.join("sidecar").join("1.log"));
        assert_eq!(counters.counter_value(&sidecar), Some(3));

        counters.forget_under(&pod_dir);
        assert_eq!(counters.counter_value(&sidecar), None);
        assert_eq!(counters.counter_value(&other), Some(7));
        assert_eq!(counters.len(), 1);
    }

    #[test]
    fn test_observe_path() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join(format!("ns_pod_{UID}")).join("app");
        std::fs::create_dir_all(&dir).unwrap();
        let log = dir.join("0.log");
        std::fs::write(&log, b"hello\n").unwrap();

        let counters = ByteCounterRegistry::new().unwrap();
        let expected_id = WorkloadIdentity::new("ns", "pod", UID, "app", 0);
        assert_eq!(
            counters.observe_path(&log).unwrap(),
            Observation::Counted {
                identity: expected_id.clone(),
                size: 6,
                delta: 6
            }
        );

        std::fs::remove_file(&log).unwrap();
        assert_eq!(counters.observe_path(&log).unwrap(), Observation::Gone);
        assert_eq!(counters.counter_value(&expected_id), None);
    }

    #[test]
    fn test_observe_path_skips_unaccounted_paths() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join(format!("ns_pod_{UID}")).join("app");
        std::fs::create_dir_all(dir.join("0.log")).unwrap();
        let rotated = dir.join("1.log.20230102-180708");
        std::fs::write(&rotated, b"old generation").unwrap();

        let counters = ByteCounterRegistry::new().unwrap();
        assert_eq!(
            counters.observe_path(dir.join("0.log")).unwrap(),
            Observation::Ignored
        );
        assert_eq!(counters.observe_path(&rotated).unwrap(), Observation::Ignored);
        assert_eq!(
            counters.observe_path(root.path().join("notes.txt")).unwrap(),
            Observation::Unclassified
        );
        assert!(counters.is_empty());
    }

    #[test]
    fn test_concurrent_scrapes_never_see_a_decrease() {
        let counters = Arc::new(ByteCounterRegistry::new().unwrap());
        let id = identity(0);
        counters.update(&id, 1);

        let reader = {
            let counters = Arc::clone(&counters);
            let id = id.clone();
            std::thread::spawn(move || {
                let mut last = 0;
                for _ in 0..2_000 {
                    let mut buf = Vec::new();
                    let families = counters.registry().gather();
                    prometheus::Encoder::encode(&prometheus::TextEncoder::new(), &families, &mut buf)
                        .unwrap();
                    if let Some(value) = counters.counter_value(&id) {
                        assert!(value >= last, "counter went from {last} to {value}");
                        last = value;
                    }
                }
            })
        };

        for size in 2..5_000u64 {
            // Alternate growth and in-place truncation.
            let size = if size % 7 == 0 { size / 2 } else { size };
            counters.update(&id, size);
        }
        reader.join().unwrap();
    }
}
