//! Fixtures shared by unit tests.

use crate::cert::{Certificate, PrivateKey};
use crate::delegate::{CertificateDelegate, ClientHello, DelegateError};
use crate::proto::envoy::api::v2::auth::Secret;
use crate::sds::metrics::{MetricsErrorKind, MetricsRecorder, PushTrigger};
use prost::Message as _;
use rustls_pki_types::CertificateDer;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Autocert cache entry material generated with OpenSSL: a PKCS#1 RSA key and
/// a SEC1 P-256 key, each with a self-signed leaf valid from 2000 to 2125.
pub(crate) const RSA_KEY_PEM: &str = include_str!("../tests/testdata/autocert/rsa-key.pem");
pub(crate) const RSA_CERT_PEM: &str = include_str!("../tests/testdata/autocert/rsa-cert.pem");
pub(crate) const EC_KEY_PEM: &str = include_str!("../tests/testdata/autocert/ec-key.pem");
pub(crate) const EC_CERT_PEM: &str = include_str!("../tests/testdata/autocert/ec-cert.pem");

/// Returns the DER body of a single PEM block.
pub(crate) fn pem_der(pem: &str) -> Vec<u8> {
    pem_rfc7468::decode_vec(pem.as_bytes()).unwrap().1
}

/// Delegate returning synthetic certificates, recording every request.
///
/// Certificates are not valid X.509; the PEM codec does not parse them.
#[derive(Debug, Default)]
pub(crate) struct FakeDelegate {
    requested: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    keys: Mutex<HashMap<String, PrivateKey>>,
}

impl FakeDelegate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_owned());
    }

    pub(crate) fn heal(&self, name: &str) {
        self.failing.lock().unwrap().remove(name);
    }

    pub(crate) fn set_key(&self, name: &str, key: PrivateKey) {
        self.keys.lock().unwrap().insert(name.to_owned(), key);
    }

    pub(crate) fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[tonic::async_trait]
impl CertificateDelegate for FakeDelegate {
    async fn get_certificate(&self, hello: &ClientHello) -> Result<Certificate, DelegateError> {
        let name = hello.server_name.clone();
        self.requested.lock().unwrap().push(name.clone());

        if self.failing.lock().unwrap().contains(&name) {
            return Err(DelegateError::NotFound { server_name: name });
        }

        let key = self
            .keys
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .unwrap_or_else(|| PrivateKey::rsa_pkcs1(name.as_bytes().to_vec()));
        let chain = vec![CertificateDer::from(format!("leaf:{name}").into_bytes())];
        Ok(Certificate::new(chain, key).unwrap())
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingMetrics {
    pushes: Mutex<Vec<PushTrigger>>,
    acks: AtomicUsize,
    errors: Mutex<Vec<MetricsErrorKind>>,
}

impl RecordingMetrics {
    pub(crate) fn pushes(&self) -> Vec<PushTrigger> {
        self.pushes.lock().unwrap().clone()
    }

    pub(crate) fn acks(&self) -> usize {
        self.acks.load(Ordering::SeqCst)
    }

    pub(crate) fn errors(&self) -> Vec<MetricsErrorKind> {
        self.errors.lock().unwrap().clone()
    }
}

impl MetricsRecorder for RecordingMetrics {
    fn record_push(&self, trigger: PushTrigger) {
        self.pushes.lock().unwrap().push(trigger);
    }

    fn record_ack(&self) {
        self.acks.fetch_add(1, Ordering::SeqCst);
    }

    fn record_error(&self, kind: MetricsErrorKind) {
        self.errors.lock().unwrap().push(kind);
    }
}

pub(crate) fn decode_secret(any: &prost_types::Any) -> Secret {
    Secret::decode(any.value.as_slice()).unwrap()
}
