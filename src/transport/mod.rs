//! TLS setup for the metrics endpoint.
//!
//! Builds a rustls [`ServerConfig`] from [`TlsSettings`]: PEM certificate
//! chain and key, an optional minimum protocol version and an OpenSSL-style
//! cipher allow-list. Only `http/1.1` is offered via ALPN.
mod ciphers;
mod error;
mod version;

pub use ciphers::{openssl_to_iana, select_cipher_suites};
pub use error::{Error, Result};
pub use version::TlsVersion;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::ServerConfig;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::config::TlsSettings;

/// Builds the server configuration for `settings`.
///
/// # Errors
///
/// Returns an [`Error`] if the certificate or key cannot be read or rustls
/// rejects the combination.
pub fn server_config(settings: &TlsSettings) -> Result<Arc<ServerConfig>> {
    let base = rustls::crypto::ring::default_provider();
    let cipher_suites = select_cipher_suites(&base.cipher_suites, &settings.cipher_suites);
    let provider = CryptoProvider {
        cipher_suites,
        ..base
    };

    let versions = match settings.min_version {
        Some(version) => {
            if version.is_below_supported() {
                log::warn!(
                    "minimum TLS version below 1.2 is not supported, using TLS 1.2: tls_min_version={}",
                    version
                );
            }
            version.enabled_versions()
        }
        None => rustls::DEFAULT_VERSIONS,
    };

    let certs = load_certs(&settings.cert_file)?;
    let key = load_key(&settings.key_file)?;
    let mut config = ServerConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(versions)?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    // No HTTP/2.
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    log::info!(
        "configured TLS: cert_file={}, cipher_suites={}",
        settings.cert_file.display(),
        config.crypto_provider().cipher_suites.len()
    );
    Ok(Arc::new(config))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|source| Error::ReadCertificate {
        path: path.to_path_buf(),
        source,
    })?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|source| Error::ReadCertificate {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(Error::NoCertificate(path.to_path_buf()));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|source| Error::ReadKey {
        path: path.to_path_buf(),
        source,
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|source| Error::ReadKey {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| Error::NoPrivateKey(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pem {
        _dir: tempfile::TempDir,
        settings: TlsSettings,
    }

    fn self_signed() -> Pem {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_owned()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cert_file = dir.path().join("tls.crt");
        let key_file = dir.path().join("tls.key");
        std::fs::write(&cert_file, cert.pem()).unwrap();
        std::fs::write(&key_file, key_pair.serialize_pem()).unwrap();
        Pem {
            _dir: dir,
            settings: TlsSettings {
                cert_file,
                key_file,
                min_version: None,
                cipher_suites: Vec::new(),
            },
        }
    }

    #[test]
    fn test_server_config_defaults() {
        let pem = self_signed();
        let config = server_config(&pem.settings).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"http/1.1".to_vec()]);
    }

    #[test]
    fn test_server_config_restricts_suites() {
        let mut pem = self_signed();
        pem.settings.min_version = Some(TlsVersion::Tls10);
        pem.settings.cipher_suites = vec!["ECDHE-ECDSA-AES128-GCM-SHA256".to_owned()];
        let config = server_config(&pem.settings).unwrap();

        let tls12 = config
            .crypto_provider()
            .cipher_suites
            .iter()
            .filter(|s| matches!(s, rustls::SupportedCipherSuite::Tls12(_)))
            .count();
        assert_eq!(tls12, 1);
    }

    #[test]
    fn test_server_config_tls13_only() {
        let mut pem = self_signed();
        pem.settings.min_version = Some(TlsVersion::Tls13);
        assert!(server_config(&pem.settings).is_ok());
    }

    #[test]
    fn test_missing_files() {
        let mut pem = self_signed();
        pem.settings.key_file = pem.settings.key_file.with_file_name("missing.key");
        assert!(matches!(
            server_config(&pem.settings),
            Err(Error::ReadKey { .. })
        ));

        let empty = tempfile::NamedTempFile::new().unwrap();
        pem.settings.cert_file = empty.path().to_path_buf();
        assert!(matches!(
            server_config(&pem.settings),
            Err(Error::NoCertificate(_))
        ));
    }
}
