//! Process configuration, read once from the environment at startup.
//!
//! | variable | default |
//! |---|---|
//! | `LOG_DIR` | `/var/log/pods` |
//! | `METRICS_ADDR` | `0.0.0.0:2112` |
//! | `TLS_CERT_FILE`, `TLS_KEY_FILE` | unset, plain HTTP |
//! | `TLS_MIN_VERSION` | unset, rustls default |
//! | `TLS_CIPHER_SUITES` | unset, all supported suites |
//! | `SELF_DIR_NAME` | `logwatcher` |
mod error;

pub use error::{Error, Result};

use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::fsutil;
use crate::transport::TlsVersion;

pub const DEFAULT_LOG_DIR: &str = "/var/log/pods";
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:2112";
/// Directory of this exporter's own pod logs; never watched.
pub const DEFAULT_SELF_DIR_NAME: &str = "logwatcher";

const LOG_DIR: &str = "LOG_DIR";
const METRICS_ADDR: &str = "METRICS_ADDR";
const TLS_CERT_FILE: &str = "TLS_CERT_FILE";
const TLS_KEY_FILE: &str = "TLS_KEY_FILE";
const TLS_MIN_VERSION: &str = "TLS_MIN_VERSION";
const TLS_CIPHER_SUITES: &str = "TLS_CIPHER_SUITES";
const SELF_DIR_NAME: &str = "SELF_DIR_NAME";

/// TLS settings for the metrics endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    pub min_version: Option<TlsVersion>,
    /// Allowed TLS 1.2 suites, as OpenSSL names. Empty means all.
    pub cipher_suites: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Absolute root of the pod log tree.
    pub log_dir: PathBuf,
    pub listen_addr: SocketAddr,
    pub self_dir_name: Option<OsString>,
    pub tls: Option<TlsSettings>,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`Config::from_lookup`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    /// Builds the configuration from `lookup`, which maps a variable name to
    /// its value.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the log directory is missing, the address does
    /// not parse, only one of the TLS files is given, or the minimum TLS
    /// version is unknown.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Result<Self> {
        let string = |key: &'static str| -> Result<Option<String>> {
            match lookup(key) {
                None => Ok(None),
                Some(value) => value
                    .into_string()
                    .map(|v| Some(v.trim().to_owned()).filter(|v| !v.is_empty()))
                    .map_err(|_| Error::NotUnicode(key)),
            }
        };

        let log_dir = lookup(LOG_DIR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));
        let log_dir = std::path::absolute(&log_dir).map_err(|source| Error::LogDir {
            path: log_dir.clone(),
            source,
        })?;
        if !fsutil::is_dir(&log_dir) {
            return Err(Error::LogDirNotDirectory(log_dir));
        }

        let listen_addr = parse_addr(
            string(METRICS_ADDR)?
                .as_deref()
                .unwrap_or(DEFAULT_METRICS_ADDR),
        )?;

        let self_dir_name = match lookup(SELF_DIR_NAME) {
            Some(name) if name.is_empty() => None,
            Some(name) => Some(name),
            None => Some(OsString::from(DEFAULT_SELF_DIR_NAME)),
        };

        let tls = match (lookup(TLS_CERT_FILE), lookup(TLS_KEY_FILE)) {
            (None, None) => None,
            (Some(_), None) => {
                return Err(Error::IncompleteTls {
                    set: TLS_CERT_FILE,
                    missing: TLS_KEY_FILE,
                });
            }
            (None, Some(_)) => {
                return Err(Error::IncompleteTls {
                    set: TLS_KEY_FILE,
                    missing: TLS_CERT_FILE,
                });
            }
            (Some(cert), Some(key)) => {
                let min_version = string(TLS_MIN_VERSION)?
                    .map(|v| v.parse::<TlsVersion>().map_err(|_| Error::InvalidTlsVersion(v)))
                    .transpose()?;
                let cipher_suites = string(TLS_CIPHER_SUITES)?
                    .map(|v| {
                        v.split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(str::to_owned)
                            .collect()
                    })
                    .unwrap_or_default();
                Some(TlsSettings {
                    cert_file: PathBuf::from(cert),
                    key_file: PathBuf::from(key),
                    min_version,
                    cipher_suites,
                })
            }
        };

        Ok(Self {
            log_dir,
            listen_addr,
            self_dir_name,
            tls,
        })
    }
}

/// Parses a socket address, accepting the `:port` shorthand for all
/// interfaces.
fn parse_addr(value: &str) -> Result<SocketAddr> {
    let full;
    let candidate = if value.starts_with(':') {
        full = format!("0.0.0.0{value}");
        full.as_str()
    } else {
        value
    };
    candidate.parse().map_err(|source| Error::InvalidAddress {
        value: value.to_owned(),
        source,
    })
}
