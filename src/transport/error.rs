use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown TLS version `{0}`, expected one of VersionTLS10, VersionTLS11, VersionTLS12, VersionTLS13")]
    UnknownVersion(String),

    #[error("failed to read certificate file `{path}`: {source}")]
    ReadCertificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificate found in `{0}`")]
    NoCertificate(PathBuf),

    #[error("failed to read private key file `{path}`: {source}")]
    ReadKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no private key found in `{0}`")]
    NoPrivateKey(PathBuf),

    #[error("failed to build TLS server configuration: {0}")]
    Rustls(#[from] rustls::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
