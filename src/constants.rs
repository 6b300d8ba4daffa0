//! Constants shared by the discovery service, the secret builder and the server.

use std::time::Duration;

/// Type URL carried by every secret resource and discovery response.
pub const SECRET_TYPE_URL: &str = "type.googleapis.com/envoy.api.v2.auth.Secret";

/// Default interval between two refresh pushes on an open stream.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(20);

/// Default listen endpoint of the discovery server.
pub const DEFAULT_ENDPOINT: &str = "unix:/tmp/envoysds.sock";

/// Default directory holding the certificate cache read by the directory delegate.
pub const DEFAULT_CERTS_DIR: &str = "autocerts";

/// Environment variable overriding the listen endpoint.
pub const ENDPOINT_ENV: &str = "ENVOY_SDS_ENDPOINT";

/// Environment variable overriding the certificate cache directory.
pub const CERTS_DIR_ENV: &str = "ENVOY_SDS_CERTS_DIR";

/// Environment variable overriding the refresh interval.
pub const REFRESH_ENV: &str = "ENVOY_SDS_REFRESH";

/// ALPN protocol identifier of the ACME TLS-ALPN-01 challenge (RFC 8737).
pub const ACME_TLS_ALPN_PROTOCOL: &str = "acme-tls/1";

/// Application protocols advertised to the certificate delegate, in preference order.
///
/// HTTP/2 and HTTP/1.1 for regular traffic, plus the ACME TLS-ALPN challenge
/// protocol so the delegate may answer challenges on the same certificate.
pub const SUPPORTED_PROTOCOLS: [&str; 3] = ["h2", "http/1.1", ACME_TLS_ALPN_PROTOCOL];

/// IANA identifier of `TLS_AES_128_GCM_SHA256` (TLS 1.3).
pub const TLS_AES_128_GCM_SHA256: u16 = 0x1301;

/// IANA identifier of `TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256` (TLS 1.2).
pub const TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256: u16 = 0xc02b;

/// Cipher suites advertised to the certificate delegate, in preference order.
pub const CIPHER_SUITES: [u16; 2] = [
    TLS_AES_128_GCM_SHA256,
    TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
];
