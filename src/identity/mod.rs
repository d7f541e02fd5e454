//! Mapping from log file paths to the workload that produced them.
//!
//! Kubelet writes container logs below `/var/log/pods` as
//! `<namespace>_<pod>_<uid>/<container>/<restart>.log`, rotating them to
//! `<restart>.log.<timestamp>` and later compressing them to `*.gz`.
//! [`classify`] recognizes exactly this layout; every other path yields
//! `None` and is excluded from accounting.
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod parser;

pub use parser::{LogPath, LogPathField, ParseError, parse_log_path};

/// File name suffix of a live (not rotated) container log.
pub const LOG_SUFFIX: &str = ".log";

/// Names of the exported metric labels, in the order returned by
/// [`WorkloadIdentity::label_values`].
pub const LABEL_NAMES: [&str; 4] = ["namespace", "podname", "poduuid", "containername"];

/// Identity of one container log file.
///
/// Structurally equal identities compare and hash equal, so the type can
/// key maps directly.
///
/// # Examples
///
/// ```
/// # use log_file_metric_exporter::identity;
/// let id = identity::classify("/var/log/pods/ns_pod_0123456789abcdef0123456789abcdef/app/0.log")
///     .unwrap();
/// assert_eq!(id.namespace(), "ns");
/// assert_eq!(id.container_name(), "app");
/// assert!(id.is_live());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkloadIdentity {
    namespace: Arc<str>,
    pod_name: Arc<str>,
    pod_uid: Arc<str>,
    container_name: Arc<str>,
    restart_count: u32,
    rotation_timestamp: Option<Arc<str>>,
    archived: bool,
}

impl WorkloadIdentity {
    /// Builds an identity from already validated parts.
    pub fn new(
        namespace: impl Into<Arc<str>>,
        pod_name: impl Into<Arc<str>>,
        pod_uid: impl Into<Arc<str>>,
        container_name: impl Into<Arc<str>>,
        restart_count: u32,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pod_name: pod_name.into(),
            pod_uid: pod_uid.into(),
            container_name: container_name.into(),
            restart_count,
            rotation_timestamp: None,
            archived: false,
        }
    }

    /// Marks the identity as a rotated generation.
    pub fn with_rotation(mut self, timestamp: impl Into<Arc<str>>, archived: bool) -> Self {
        self.rotation_timestamp = Some(timestamp.into());
        self.archived = archived;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn pod_name(&self) -> &str {
        &self.pod_name
    }

    pub fn pod_uid(&self) -> &str {
        &self.pod_uid
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count
    }

    pub fn rotation_timestamp(&self) -> Option<&str> {
        self.rotation_timestamp.as_deref()
    }

    pub fn is_archived(&self) -> bool {
        self.archived
    }

    /// Returns `true` for the file kubelet is currently writing to, i.e.
    /// neither rotated nor compressed.
    pub fn is_live(&self) -> bool {
        self.rotation_timestamp.is_none() && !self.archived
    }

    /// Label values of the exported series, ordered as [`LABEL_NAMES`].
    pub fn label_values(&self) -> [&str; 4] {
        [
            &*self.namespace,
            &*self.pod_name,
            &*self.pod_uid,
            &*self.container_name,
        ]
    }

    /// Renders the identity back into the path layout it was parsed from,
    /// relative to the log root.
    pub fn relative_path(&self) -> PathBuf {
        let mut file_name = format!("{}{}", self.restart_count, LOG_SUFFIX);
        if let Some(ts) = &self.rotation_timestamp {
            file_name.push('.');
            file_name.push_str(ts);
        }
        if self.archived {
            file_name.push_str(".gz");
        }
        PathBuf::from(format!(
            "{}_{}_{}",
            self.namespace, self.pod_name, self.pod_uid
        ))
        .join(&*self.container_name)
        .join(file_name)
    }
}

impl From<LogPath<'_>> for WorkloadIdentity {
    fn from(parsed: LogPath<'_>) -> Self {
        Self {
            namespace: parsed.namespace.into(),
            pod_name: parsed.pod_name.into(),
            pod_uid: parsed.pod_uid.into(),
            container_name: parsed.container_name.into(),
            restart_count: parsed.restart_count,
            rotation_timestamp: parsed.rotation_timestamp.map(Arc::from),
            archived: parsed.archived,
        }
    }
}

impl fmt::Display for WorkloadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relative_path().display())
    }
}

/// Classifies a log file path.
///
/// Returns `None`, not an error, for any path outside the pod log layout.
pub fn classify(path: impl AsRef<Path>) -> Option<WorkloadIdentity> {
    let path = path.as_ref();
    match parse_log_path(path) {
        Ok(parsed) => Some(parsed.into()),
        Err(err) => {
            log::trace!("unclassified path: path={}, reason={}", path.display(), err);
            None
        }
    }
}

/// Returns `true` if the file name ends with [`LOG_SUFFIX`].
pub fn has_log_suffix(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(LOG_SUFFIX))
}
