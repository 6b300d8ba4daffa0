//! A delegate serving certificates from an ACME autocert-style cache directory.
//!
//! Each cache entry is a file named after the host, holding a PEM private key
//! followed by the PEM certificate chain. ECDSA material lives under `<host>`
//! and RSA material under `<host>+rsa`. Any ACME client writing this layout
//! (for instance in a sidecar) can feed the discovery service.

use super::{CertificateDelegate, ClientHello, DelegateError};
use crate::cert::Certificate;
use crate::prelude::debug;
use std::io;
use std::path::{Path, PathBuf};
use x509_parser::extensions::GeneralName;
use zeroize::Zeroizing;

const RSA_SUFFIX: &str = "+rsa";

/// Reads certificates from a cache directory on every request.
#[derive(Debug, Clone)]
pub struct DirCacheDelegate {
    dir: PathBuf,
}

impl DirCacheDelegate {
    /// Creates a delegate reading from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn load(&self, key: &str, server_name: &str) -> Result<Option<Certificate>, DelegateError> {
        let path = self.dir.join(key);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => Zeroizing::new(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(DelegateError::Io { path, source }),
        };

        let cert = Certificate::from_pem(&data)?;
        verify_leaf(&cert, server_name)?;
        Ok(Some(cert))
    }
}

#[tonic::async_trait]
impl CertificateDelegate for DirCacheDelegate {
    async fn get_certificate(&self, hello: &ClientHello) -> Result<Certificate, DelegateError> {
        let server_name = normalize_server_name(&hello.server_name)?;

        let mut last_err = None;
        for key in cache_keys(&server_name, hello.supports_ecdsa()) {
            match self.load(&key, &server_name).await {
                Ok(Some(cert)) => {
                    debug!("Loaded certificate from cache: key={key}");
                    return Ok(cert);
                }
                Ok(None) => debug!("Cache miss: key={key}"),
                Err(e) => {
                    debug!("Unusable cache entry: key={key}, error={e}");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or(DelegateError::NotFound { server_name }))
    }
}

fn cache_keys(server_name: &str, ecdsa: bool) -> Vec<String> {
    let rsa = format!("{server_name}{RSA_SUFFIX}");
    if ecdsa {
        vec![server_name.to_owned(), rsa]
    } else {
        vec![rsa]
    }
}

fn normalize_server_name(name: &str) -> Result<String, DelegateError> {
    let normalized = name.trim_end_matches('.').to_ascii_lowercase();
    if normalized.is_empty()
        || normalized.contains(['/', '\\'])
        || normalized.contains("..")
    {
        return Err(DelegateError::InvalidServerName(name.to_owned()));
    }
    Ok(normalized)
}

fn verify_leaf(cert: &Certificate, server_name: &str) -> Result<(), DelegateError> {
    let leaf = cert.parse_leaf()?;

    if !leaf.validity().is_valid() {
        return Err(DelegateError::Expired {
            server_name: server_name.to_owned(),
        });
    }

    let matches = leaf
        .subject_alternative_name()
        .map_err(crate::cert::CertificateError::from)?
        .is_some_and(|san| {
            san.value.general_names.iter().any(|name| match name {
                GeneralName::DNSName(dns) => dns_name_matches(dns, server_name),
                _ => false,
            })
        });

    if !matches {
        return Err(DelegateError::NameMismatch {
            server_name: server_name.to_owned(),
        });
    }
    Ok(())
}

/// Matches a SAN DNS entry against a host name: exact, or a wildcard covering one label.
fn dns_name_matches(pattern: &str, server_name: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    if let Some(suffix) = pattern.strip_prefix("*.") {
        return server_name
            .split_once('.')
            .is_some_and(|(label, rest)| !label.is_empty() && rest == suffix);
    }
    pattern == server_name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::PrivateKey;
    use crate::test_support::{pem_der, EC_CERT_PEM, EC_KEY_PEM, RSA_CERT_PEM, RSA_KEY_PEM};
    use rcgen::{date_time_ymd, CertificateParams, KeyPair};
    use tempfile::TempDir;

    fn write_entry(dir: &Path, key: &str, sans: &[&str]) {
        let ck = rcgen::generate_simple_self_signed(
            sans.iter().map(|s| (*s).to_owned()).collect::<Vec<_>>(),
        )
        .unwrap();
        let bundle = format!("{}{}", ck.key_pair.serialize_pem(), ck.cert.pem());
        std::fs::write(dir.join(key), bundle).unwrap();
    }

    fn write_expired_entry(dir: &Path, key: &str, san: &str) {
        let key_pair = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec![san.to_owned()]).unwrap();
        params.not_before = date_time_ymd(1990, 1, 1);
        params.not_after = date_time_ymd(2000, 1, 1);
        let cert = params.self_signed(&key_pair).unwrap();
        let bundle = format!("{}{}", key_pair.serialize_pem(), cert.pem());
        std::fs::write(dir.join(key), bundle).unwrap();
    }

    fn rsa_only_hello(name: &str) -> ClientHello {
        ClientHello {
            // TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256
            cipher_suites: vec![0xc02f],
            ..ClientHello::for_server_name(name)
        }
    }

    #[tokio::test]
    async fn loads_ecdsa_entry() {
        let dir = TempDir::new().unwrap();
        write_entry(dir.path(), "a.example.com", &["a.example.com"]);
        let delegate = DirCacheDelegate::new(dir.path());

        let cert = delegate
            .get_certificate(&ClientHello::for_server_name("a.example.com"))
            .await
            .unwrap();

        assert_eq!(cert.private_key().algorithm(), "ECDSA");
    }

    #[tokio::test]
    async fn loads_sec1_ec_entry() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("ec.example.com"), format!("{EC_KEY_PEM}{EC_CERT_PEM}")).unwrap();
        let delegate = DirCacheDelegate::new(dir.path());

        let cert = delegate
            .get_certificate(&ClientHello::for_server_name("ec.example.com"))
            .await
            .unwrap();

        assert_eq!(cert.private_key(), &PrivateKey::ecdsa_sec1(pem_der(EC_KEY_PEM)));
        assert_eq!(cert.leaf().as_ref(), pem_der(EC_CERT_PEM).as_slice());
    }

    #[tokio::test]
    async fn loads_pkcs1_rsa_entry_for_rsa_only_client() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("rsa.example.com+rsa"),
            format!("{RSA_KEY_PEM}{RSA_CERT_PEM}"),
        )
        .unwrap();
        let delegate = DirCacheDelegate::new(dir.path());

        for hello in [
            rsa_only_hello("rsa.example.com"),
            ClientHello::for_server_name("rsa.example.com"),
        ] {
            let cert = delegate.get_certificate(&hello).await.unwrap();
            assert_eq!(cert.private_key(), &PrivateKey::rsa_pkcs1(pem_der(RSA_KEY_PEM)));
        }
    }

    #[tokio::test]
    async fn normalizes_server_name() {
        let dir = TempDir::new().unwrap();
        write_entry(dir.path(), "a.example.com", &["a.example.com"]);
        let delegate = DirCacheDelegate::new(dir.path());

        let result = delegate
            .get_certificate(&ClientHello::for_server_name("A.Example.COM."))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn falls_back_to_rsa_entry() {
        let dir = TempDir::new().unwrap();
        // rcgen only generates EC keys; the entry name decides the lookup order.
        write_entry(dir.path(), "a.example.com+rsa", &["a.example.com"]);
        let delegate = DirCacheDelegate::new(dir.path());

        let result = delegate
            .get_certificate(&ClientHello::for_server_name("a.example.com"))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn rsa_only_client_skips_ecdsa_entry() {
        let dir = TempDir::new().unwrap();
        write_entry(dir.path(), "a.example.com", &["a.example.com"]);
        let delegate = DirCacheDelegate::new(dir.path());

        let err = delegate
            .get_certificate(&rsa_only_hello("a.example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, DelegateError::NotFound { server_name } if server_name == "a.example.com"));
    }

    #[tokio::test]
    async fn missing_entry_is_not_found() {
        let dir = TempDir::new().unwrap();
        let delegate = DirCacheDelegate::new(dir.path());

        let err = delegate
            .get_certificate(&ClientHello::for_server_name("a.example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, DelegateError::NotFound { .. }));
    }

    #[tokio::test]
    async fn rejects_path_like_names() {
        let delegate = DirCacheDelegate::new("/nonexistent");

        for name in ["", ".", "../etc/passwd", "a/b", "a\\b", "a..b"] {
            let err = delegate
                .get_certificate(&ClientHello::for_server_name(name))
                .await
                .unwrap_err();
            assert!(matches!(err, DelegateError::InvalidServerName(_)), "{name}");
        }
    }

    #[tokio::test]
    async fn rejects_expired_certificate() {
        let dir = TempDir::new().unwrap();
        write_expired_entry(dir.path(), "a.example.com", "a.example.com");
        let delegate = DirCacheDelegate::new(dir.path());

        let err = delegate
            .get_certificate(&ClientHello::for_server_name("a.example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, DelegateError::Expired { .. }));
    }

    #[tokio::test]
    async fn rejects_certificate_for_other_name() {
        let dir = TempDir::new().unwrap();
        write_entry(dir.path(), "a.example.com", &["b.example.com"]);
        let delegate = DirCacheDelegate::new(dir.path());

        let err = delegate
            .get_certificate(&ClientHello::for_server_name("a.example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, DelegateError::NameMismatch { .. }));
    }

    #[tokio::test]
    async fn accepts_wildcard_certificate() {
        let dir = TempDir::new().unwrap();
        write_entry(dir.path(), "a.example.com", &["*.example.com"]);
        let delegate = DirCacheDelegate::new(dir.path());

        let cert = delegate
            .get_certificate(&ClientHello::for_server_name("a.example.com"))
            .await
            .unwrap();

        assert!(matches!(cert.private_key(), PrivateKey::Ecdsa(_)));
    }

    #[tokio::test]
    async fn garbage_entry_is_a_certificate_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.example.com"), b"not pem").unwrap();
        let delegate = DirCacheDelegate::new(dir.path());

        let err = delegate
            .get_certificate(&ClientHello::for_server_name("a.example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, DelegateError::Certificate(_)));
    }

    #[test]
    fn wildcard_covers_exactly_one_label() {
        assert!(dns_name_matches("*.example.com", "a.example.com"));
        assert!(!dns_name_matches("*.example.com", "example.com"));
        assert!(!dns_name_matches("*.example.com", "a.b.example.com"));
        assert!(dns_name_matches("A.Example.com", "a.example.com"));
        assert!(!dns_name_matches("a.example.com", "b.example.com"));
    }
}
