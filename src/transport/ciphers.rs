use rustls::SupportedCipherSuite;

/// OpenSSL cipher suite names and their IANA counterparts.
///
/// TLS 1.3 suites are not listed: they are always enabled and cannot be
/// configured.
/// See <https://www.iana.org/assignments/tls-parameters/tls-parameters.xml>.
const OPENSSL_TO_IANA: &[(&str, &str)] = &[
    // TLS 1.2
    ("ECDHE-ECDSA-AES128-GCM-SHA256", "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256"),
    ("ECDHE-RSA-AES128-GCM-SHA256", "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256"),
    ("ECDHE-ECDSA-AES256-GCM-SHA384", "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384"),
    ("ECDHE-RSA-AES256-GCM-SHA384", "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384"),
    ("ECDHE-ECDSA-CHACHA20-POLY1305", "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256"),
    ("ECDHE-RSA-CHACHA20-POLY1305", "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256"),
    ("ECDHE-ECDSA-AES128-SHA256", "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256"),
    ("ECDHE-RSA-AES128-SHA256", "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256"),
    ("AES128-GCM-SHA256", "TLS_RSA_WITH_AES_128_GCM_SHA256"),
    ("AES256-GCM-SHA384", "TLS_RSA_WITH_AES_256_GCM_SHA384"),
    ("AES128-SHA256", "TLS_RSA_WITH_AES_128_CBC_SHA256"),
    // TLS 1.0
    ("ECDHE-ECDSA-AES128-SHA", "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA"),
    ("ECDHE-RSA-AES128-SHA", "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA"),
    ("ECDHE-ECDSA-AES256-SHA", "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA"),
    ("ECDHE-RSA-AES256-SHA", "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA"),
    // SSL 3
    ("AES128-SHA", "TLS_RSA_WITH_AES_128_CBC_SHA"),
    ("AES256-SHA", "TLS_RSA_WITH_AES_256_CBC_SHA"),
    ("DES-CBC3-SHA", "TLS_RSA_WITH_3DES_EDE_CBC_SHA"),
];

/// Translates one OpenSSL cipher suite name to its IANA name.
pub fn openssl_to_iana(name: &str) -> Option<&'static str> {
    OPENSSL_TO_IANA
        .iter()
        .find(|(openssl, _)| *openssl == name)
        .map(|(_, iana)| *iana)
}

/// IANA name of a rustls suite, e.g. `TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256`.
fn iana_name(suite: &SupportedCipherSuite) -> String {
    format!("{:?}", suite.suite())
}

/// Restricts `available` to the TLS 1.2 suites named in `allowed` (OpenSSL
/// names) plus every TLS 1.3 suite. Unknown names and names this build
/// cannot negotiate are logged and dropped.
///
/// An empty allow-list keeps everything.
pub fn select_cipher_suites(
    available: &[SupportedCipherSuite],
    allowed: &[String],
) -> Vec<SupportedCipherSuite> {
    if allowed.is_empty() {
        return available.to_vec();
    }

    let mut wanted = Vec::with_capacity(allowed.len());
    for name in allowed {
        match openssl_to_iana(name) {
            Some(iana) => wanted.push(iana),
            None => log::warn!("dropping unknown cipher suite: cipher_suite={}", name),
        }
    }
    for iana in &wanted {
        if !available.iter().any(|s| iana_name(s) == *iana) {
            log::warn!("dropping unsupported cipher suite: cipher_suite={}", iana);
        }
    }

    available
        .iter()
        .filter(|suite| {
            matches!(suite, SupportedCipherSuite::Tls13(_))
                || wanted.contains(&iana_name(suite).as_str())
        })
        .copied()
        .collect()
}
