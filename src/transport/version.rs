use std::fmt;
use std::str::FromStr;

use rustls::SupportedProtocolVersion;

use super::error::Error;

static TLS12_AND_LATER: &[&SupportedProtocolVersion] =
    &[&rustls::version::TLS13, &rustls::version::TLS12];
static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];

/// Minimum TLS version accepted by the metrics endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

impl TlsVersion {
    /// Protocol versions enabled for this minimum.
    ///
    /// rustls does not implement TLS 1.0 and 1.1, so both behave like TLS 1.2.
    pub fn enabled_versions(self) -> &'static [&'static SupportedProtocolVersion] {
        match self {
            TlsVersion::Tls10 | TlsVersion::Tls11 | TlsVersion::Tls12 => TLS12_AND_LATER,
            TlsVersion::Tls13 => TLS13_ONLY,
        }
    }

    pub fn is_below_supported(self) -> bool {
        self < TlsVersion::Tls12
    }
}

impl FromStr for TlsVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "VersionTLS10" => Ok(TlsVersion::Tls10),
            "VersionTLS11" => Ok(TlsVersion::Tls11),
            "VersionTLS12" => Ok(TlsVersion::Tls12),
            "VersionTLS13" => Ok(TlsVersion::Tls13),
            other => Err(Error::UnknownVersion(other.to_owned())),
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TlsVersion::Tls10 => "VersionTLS10",
            TlsVersion::Tls11 => "VersionTLS11",
            TlsVersion::Tls12 => "VersionTLS12",
            TlsVersion::Tls13 => "VersionTLS13",
        };
        f.write_str(name)
    }
}
