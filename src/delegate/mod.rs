//! Certificate delegates.
//!
//! A [`CertificateDelegate`] supplies the TLS certificate to serve for a host
//! name, given the properties of a synthetic TLS client hello. The discovery
//! service never inspects how the certificate is obtained; ACME issuance,
//! a directory cache or a test fixture all plug in here.

pub mod dir_cache;

pub use dir_cache::DirCacheDelegate;

use crate::cert::{Certificate, CertificateError};
use crate::constants::{CIPHER_SUITES, SUPPORTED_PROTOCOLS};
use std::path::PathBuf;
use std::sync::Arc;

/// TLS 1.3 cipher suites. None of them constrain the certificate key type.
const TLS13_SUITES: std::ops::RangeInclusive<u16> = 0x1301..=0x1305;

/// TLS 1.2 ECDHE_ECDSA cipher suites.
const ECDHE_ECDSA_SUITES: [u16; 7] = [
    0xc009, // TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA
    0xc00a, // TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA
    0xc023, // TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256
    0xc024, // TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA384
    0xc02b, // TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256
    0xc02c, // TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384
    0xcca9, // TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256
];

/// The client hello presented to a [`CertificateDelegate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    /// Requested host name (SNI).
    pub server_name: String,
    /// ALPN protocols offered by the client, in preference order.
    pub supported_protocols: Vec<String>,
    /// IANA cipher suite identifiers offered by the client.
    pub cipher_suites: Vec<u16>,
}

impl ClientHello {
    /// Builds the hello the discovery service sends for a resource name: the
    /// name as SNI, plus the fixed protocol and cipher-suite lists.
    pub fn for_server_name(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            supported_protocols: SUPPORTED_PROTOCOLS.iter().map(|p| (*p).to_owned()).collect(),
            cipher_suites: CIPHER_SUITES.to_vec(),
        }
    }

    /// Returns `true` if the client can negotiate a handshake signed with an ECDSA key.
    pub fn supports_ecdsa(&self) -> bool {
        self.cipher_suites
            .iter()
            .any(|suite| TLS13_SUITES.contains(suite) || ECDHE_ECDSA_SUITES.contains(suite))
    }
}

/// Supplies TLS certificates by host name.
///
/// Implementations must be safe to call concurrently from many streams.
#[tonic::async_trait]
pub trait CertificateDelegate: Send + Sync + 'static {
    /// Returns the certificate to serve for `hello.server_name`.
    ///
    /// # Errors
    ///
    /// Returns a [`DelegateError`] if no usable certificate can be produced.
    async fn get_certificate(&self, hello: &ClientHello) -> Result<Certificate, DelegateError>;
}

#[tonic::async_trait]
impl<D: CertificateDelegate + ?Sized> CertificateDelegate for Arc<D> {
    async fn get_certificate(&self, hello: &ClientHello) -> Result<Certificate, DelegateError> {
        (**self).get_certificate(hello).await
    }
}

/// An error returned by a [`CertificateDelegate`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DelegateError {
    /// The host name cannot be used to look up a certificate.
    #[error("invalid server name: {0:?}")]
    InvalidServerName(String),

    /// No certificate is available for the host name.
    #[error("no certificate found for {server_name}")]
    NotFound {
        /// Requested host name.
        server_name: String,
    },

    /// The certificate found is expired or not yet valid.
    #[error("certificate for {server_name} is not currently valid")]
    Expired {
        /// Requested host name.
        server_name: String,
    },

    /// The certificate found does not cover the host name.
    #[error("certificate does not match server name {server_name}")]
    NameMismatch {
        /// Requested host name.
        server_name: String,
    },

    /// Reading certificate material failed.
    #[error("failed reading {}", path.display())]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Certificate material could not be decoded.
    #[error(transparent)]
    Certificate(#[from] CertificateError),

    /// Error raised by a third-party delegate.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{ACME_TLS_ALPN_PROTOCOL, TLS_AES_128_GCM_SHA256};

    fn hello_with_suites(suites: &[u16]) -> ClientHello {
        ClientHello {
            cipher_suites: suites.to_vec(),
            ..ClientHello::for_server_name("a.example.com")
        }
    }

    #[test]
    fn hello_offers_fixed_protocols_and_suites() {
        let hello = ClientHello::for_server_name("a.example.com");

        assert_eq!(hello.server_name, "a.example.com");
        assert_eq!(hello.supported_protocols, vec!["h2", "http/1.1", ACME_TLS_ALPN_PROTOCOL]);
        assert_eq!(hello.cipher_suites, vec![TLS_AES_128_GCM_SHA256, 0xc02b]);
        assert!(hello.supports_ecdsa());
    }

    #[test]
    fn ecdsa_support_follows_cipher_suites() {
        assert!(hello_with_suites(&[0x1303]).supports_ecdsa());
        assert!(hello_with_suites(&[0xcca9]).supports_ecdsa());
        // TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256
        assert!(!hello_with_suites(&[0xc02f]).supports_ecdsa());
        assert!(!hello_with_suites(&[]).supports_ecdsa());
    }

    #[test]
    fn other_errors_are_transparent() {
        let source: Box<dyn std::error::Error + Send + Sync> = "acme order failed".into();
        let err = DelegateError::from(source);
        assert_eq!(err.to_string(), "acme order failed");
    }
}
