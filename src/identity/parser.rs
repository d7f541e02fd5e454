//! Parser for kubelet pod log paths.
//!
//! Only the trailing three components of a path are inspected:
//!
//! ```text
//! <namespace>_<podName>_<podUID>/<containerName>/<restartCount>.log[.<YYYYMMDD-HHMMSS>][.gz]
//! ```

use std::path::Path;

/// Named parts of a pod log path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogPathField {
    PodDirectory,
    Namespace,
    PodName,
    PodUid,
    ContainerName,
    FileName,
    RestartCount,
    RotationTimestamp,
}

impl std::fmt::Display for LogPathField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogPathField::PodDirectory => "pod_directory",
            LogPathField::Namespace => "namespace",
            LogPathField::PodName => "pod_name",
            LogPathField::PodUid => "pod_uid",
            LogPathField::ContainerName => "container_name",
            LogPathField::FileName => "file_name",
            LogPathField::RestartCount => "restart_count",
            LogPathField::RotationTimestamp => "rotation_timestamp",
        };
        write!(f, "{name}")
    }
}

/// Reasons a path does not match the pod log grammar.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing `{0}` component")]
    MissingComponent(LogPathField),

    #[error("invalid `{field}`: `{value}`")]
    InvalidField { field: LogPathField, value: String },

    #[error("file name `{0}` has no `.log` suffix")]
    NotALogFile(String),
}

/// Borrowed components of a parsed log path.
#[derive(Debug, PartialEq, Eq)]
pub struct LogPath<'a> {
    pub namespace: &'a str,
    pub pod_name: &'a str,
    pub pod_uid: &'a str,
    pub container_name: &'a str,
    pub restart_count: u32,
    pub rotation_timestamp: Option<&'a str>,
    pub archived: bool,
}

/// Parses the trailing components of `path` as a pod log path.
///
/// # Errors
///
/// Returns a [`ParseError`] describing the first component that does not
/// follow the grammar.
pub fn parse_log_path(path: &Path) -> Result<LogPath<'_>, ParseError> {
    let mut components = path.components().rev().map(|c| c.as_os_str().to_str());

    let file_name = next_component(&mut components, LogPathField::FileName)?;
    let container_name = next_component(&mut components, LogPathField::ContainerName)?;
    let pod_directory = next_component(&mut components, LogPathField::PodDirectory)?;

    let mut pod_fields = pod_directory.split('_');
    let namespace = pod_fields
        .next()
        .ok_or(ParseError::MissingComponent(LogPathField::Namespace))?;
    let pod_name = pod_fields
        .next()
        .ok_or(ParseError::MissingComponent(LogPathField::PodName))?;
    let pod_uid = pod_fields
        .next()
        .ok_or(ParseError::MissingComponent(LogPathField::PodUid))?;
    if pod_fields.next().is_some() {
        return Err(invalid(LogPathField::PodDirectory, pod_directory));
    }

    validate_name(LogPathField::Namespace, namespace, false)?;
    validate_name(LogPathField::PodName, pod_name, true)?;
    if !is_pod_uid(pod_uid) {
        return Err(invalid(LogPathField::PodUid, pod_uid));
    }
    validate_name(LogPathField::ContainerName, container_name, false)?;

    let (restart, suffix) = file_name
        .split_once(".log")
        .ok_or_else(|| ParseError::NotALogFile(file_name.to_owned()))?;
    if restart.is_empty() || !restart.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(LogPathField::RestartCount, restart));
    }
    let restart_count = restart
        .parse::<u32>()
        .map_err(|_| invalid(LogPathField::RestartCount, restart))?;

    let (suffix, archived) = match suffix.strip_suffix(".gz") {
        Some(rest) => (rest, true),
        None => (suffix, false),
    };
    let rotation_timestamp = match suffix {
        "" => None,
        _ => {
            let ts = suffix
                .strip_prefix('.')
                .ok_or_else(|| ParseError::NotALogFile(file_name.to_owned()))?;
            if !is_rotation_timestamp(ts) {
                return Err(invalid(LogPathField::RotationTimestamp, ts));
            }
            Some(ts)
        }
    };

    Ok(LogPath {
        namespace,
        pod_name,
        pod_uid,
        container_name,
        restart_count,
        rotation_timestamp,
        archived,
    })
}

fn next_component<'a>(
    components: &mut impl Iterator<Item = Option<&'a str>>,
    field: LogPathField,
) -> Result<&'a str, ParseError> {
    match components.next() {
        Some(Some(value)) if !value.is_empty() && value != "/" => Ok(value),
        Some(Some(value)) => Err(invalid(field, value)),
        Some(None) => Err(ParseError::InvalidField {
            field,
            value: String::from("<non-utf8>"),
        }),
        None => Err(ParseError::MissingComponent(field)),
    }
}

fn invalid(field: LogPathField, value: &str) -> ParseError {
    ParseError::InvalidField {
        field,
        value: value.to_owned(),
    }
}

/// Lowercase alphanumerics and `-`; dots too when `allow_dots` is set.
fn validate_name(field: LogPathField, value: &str, allow_dots: bool) -> Result<(), ParseError> {
    let valid = !value.is_empty()
        && value.bytes().all(|b| {
            b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || (allow_dots && b == b'.')
        });
    if valid {
        Ok(())
    } else {
        Err(invalid(field, value))
    }
}

/// 32 lowercase hex digits, or the hyphenated `8-4-4-4-12` form.
fn is_pod_uid(value: &str) -> bool {
    let is_hex = |s: &str| s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    match value.len() {
        32 => is_hex(value),
        36 => {
            let groups: Vec<&str> = value.split('-').collect();
            groups.len() == 5
                && groups
                    .iter()
                    .zip([8, 4, 4, 4, 12])
                    .all(|(g, len)| g.len() == len && is_hex(g))
        }
        _ => false,
    }
}

/// `YYYYMMDD-HHMMSS`.
fn is_rotation_timestamp(value: &str) -> bool {
    match value.split_once('-') {
        Some((date, time)) => {
            date.len() == 8
                && time.len() == 6
                && date.bytes().all(|b| b.is_ascii_digit())
                && time.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}
