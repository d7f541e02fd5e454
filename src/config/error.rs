use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("environment variable `{0}` is not valid unicode")]
    NotUnicode(&'static str),

    #[error("invalid listen address `{value}`: {source}")]
    InvalidAddress {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("failed to resolve log directory `{path}`: {source}")]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("log directory `{0}` does not exist or is not a directory")]
    LogDirNotDirectory(PathBuf),

    #[error("`{set}` is set but `{missing}` is not; TLS needs both")]
    IncompleteTls {
        set: &'static str,
        missing: &'static str,
    },

    #[error("invalid minimum TLS version `{0}`")]
    InvalidTlsVersion(String),
}

pub type Result<T> = std::result::Result<T, Error>;
