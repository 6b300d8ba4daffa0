//! `Certificate` and `PrivateKey` types.
//!
//! A [`Certificate`] is what a certificate delegate hands back for a host name:
//! a chain of DER-encoded X.509 certificates (leaf first) and the private key
//! of the leaf. The key is a closed union over the algorithms that can be
//! served; everything else is carried as [`PrivateKey::Unsupported`] so the
//! failure surfaces when the key is encoded, not when it is fetched.

pub mod error;
pub mod pem;

pub use error::CertificateError;

use pkcs8::der::{Decode as _, Encode as _};
use pkcs8::{ObjectIdentifier, PrivateKeyInfo};
use rustls_pki_types::pem::PemObject as _;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use sec1::{EcParameters, EcPrivateKey};
use std::fmt;
use x509_parser::certificate::X509Certificate;
use x509_parser::error::X509Error;
use x509_parser::nom::Err;
use zeroize::Zeroizing;

/// `rsaEncryption` (RFC 8017).
const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
/// `id-ecPublicKey` (RFC 5480).
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
/// `id-Ed25519` (RFC 8410).
const ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");
/// `id-Ed448` (RFC 8410).
const ED448: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.113");

/// Private key of a [`Certificate`], tagged by algorithm.
///
/// Key bytes are zeroized on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub enum PrivateKey {
    /// RSA key as a DER-encoded PKCS#1 `RSAPrivateKey`.
    Rsa(Zeroizing<Vec<u8>>),

    /// ECDSA key as a DER-encoded SEC1 `ECPrivateKey`.
    Ecdsa(Zeroizing<Vec<u8>>),

    /// A key of an algorithm that cannot be served.
    Unsupported {
        /// Human readable algorithm name, or its OID when unknown.
        algorithm: String,
    },
}

impl PrivateKey {
    /// Wraps a DER-encoded PKCS#1 RSA private key.
    pub fn rsa_pkcs1(der: impl Into<Vec<u8>>) -> Self {
        Self::Rsa(Zeroizing::new(der.into()))
    }

    /// Wraps a DER-encoded SEC1 EC private key.
    pub fn ecdsa_sec1(der: impl Into<Vec<u8>>) -> Self {
        Self::Ecdsa(Zeroizing::new(der.into()))
    }

    /// Marks a key of the given algorithm as unsupported.
    pub fn unsupported(algorithm: impl Into<String>) -> Self {
        Self::Unsupported {
            algorithm: algorithm.into(),
        }
    }

    /// Returns the name of the key algorithm.
    pub fn algorithm(&self) -> &str {
        match self {
            Self::Rsa(_) => "RSA",
            Self::Ecdsa(_) => "ECDSA",
            Self::Unsupported { algorithm } => algorithm,
        }
    }

    /// Classifies a DER-encoded PKCS#8 `PrivateKeyInfo`.
    ///
    /// RSA keys are unwrapped to PKCS#1. EC keys are re-encoded as SEC1 with the
    /// named curve copied from the PKCS#8 algorithm identifier, since the inner
    /// key usually omits it. Any other algorithm yields [`PrivateKey::Unsupported`].
    ///
    /// # Errors
    ///
    /// Returns a [`CertificateError`] if the bytes are not valid PKCS#8, or if an
    /// EC key cannot be re-encoded.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, CertificateError> {
        let info = PrivateKeyInfo::try_from(der).map_err(CertificateError::DecodePkcs8)?;

        match info.algorithm.oid {
            oid if oid == RSA_ENCRYPTION => Ok(Self::rsa_pkcs1(info.private_key)),
            oid if oid == EC_PUBLIC_KEY => {
                let curve = info
                    .algorithm
                    .parameters_oid()
                    .map_err(|_| CertificateError::MissingCurve)?;
                Ok(Self::Ecdsa(sec1_with_curve(info.private_key, curve)?))
            }
            oid if oid == ED25519 => Ok(Self::unsupported("Ed25519")),
            oid if oid == ED448 => Ok(Self::unsupported("Ed448")),
            other => Ok(Self::unsupported(other.to_string())),
        }
    }
}

fn sec1_with_curve(
    der: &[u8],
    curve: ObjectIdentifier,
) -> Result<Zeroizing<Vec<u8>>, CertificateError> {
    let mut key = EcPrivateKey::from_der(der).map_err(CertificateError::Sec1)?;
    if key.parameters.is_none() {
        key.parameters = Some(EcParameters::NamedCurve(curve));
    }
    key.to_der()
        .map(Zeroizing::new)
        .map_err(CertificateError::Sec1)
}

impl TryFrom<PrivateKeyDer<'_>> for PrivateKey {
    type Error = CertificateError;

    fn try_from(key: PrivateKeyDer<'_>) -> Result<Self, Self::Error> {
        match key {
            PrivateKeyDer::Pkcs1(der) => Ok(Self::rsa_pkcs1(der.secret_pkcs1_der())),
            PrivateKeyDer::Sec1(der) => Ok(Self::ecdsa_sec1(der.secret_sec1_der())),
            PrivateKeyDer::Pkcs8(der) => Self::from_pkcs8_der(der.secret_pkcs8_der()),
            _ => Ok(Self::unsupported("unknown")),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa(der) | Self::Ecdsa(der) => f
                .debug_struct("PrivateKey")
                .field("algorithm", &self.algorithm())
                .field("len", &der.len())
                .finish(),
            Self::Unsupported { algorithm } => f
                .debug_struct("PrivateKey")
                .field("algorithm", algorithm)
                .field("supported", &false)
                .finish(),
        }
    }
}

/// TLS certificate material for one host name: a certificate chain and its private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    chain: Vec<CertificateDer<'static>>,
    private_key: PrivateKey,
}

impl Certificate {
    /// Creates a `Certificate` from a DER certificate chain (leaf first) and a private key.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::EmptyChain`] if `chain` is empty.
    pub fn new(
        chain: Vec<CertificateDer<'static>>,
        private_key: PrivateKey,
    ) -> Result<Self, CertificateError> {
        if chain.is_empty() {
            return Err(CertificateError::EmptyChain);
        }
        Ok(Self { chain, private_key })
    }

    /// Parses a PEM bundle holding a private key and a certificate chain.
    ///
    /// The key may be labelled `RSA PRIVATE KEY`, `EC PRIVATE KEY` or `PRIVATE KEY`;
    /// `CERTIFICATE` blocks form the chain in file order. Other blocks are ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`CertificateError`] if the PEM data is malformed, holds no key,
    /// or holds no certificate.
    pub fn from_pem(pem: &[u8]) -> Result<Self, CertificateError> {
        let key = PrivateKeyDer::from_pem_slice(pem).map_err(|e| match e {
            rustls_pki_types::pem::Error::NoItemsFound => CertificateError::MissingPrivateKey,
            other => CertificateError::Pem(other.to_string()),
        })?;

        let chain = CertificateDer::pem_slice_iter(pem)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CertificateError::Pem(e.to_string()))?;

        Self::new(chain, PrivateKey::try_from(key)?)
    }

    /// Returns the certificate chain, leaf first.
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    /// Returns the leaf certificate.
    pub fn leaf(&self) -> &CertificateDer<'static> {
        // `new` rejects empty chains.
        &self.chain[0]
    }

    /// Returns the private key of the leaf certificate.
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// Parses the leaf certificate.
    pub(crate) fn parse_leaf(&self) -> Result<X509Certificate<'_>, CertificateError> {
        match x509_parser::parse_x509_certificate(self.leaf().as_ref()) {
            Ok((_, cert)) => Ok(cert),
            Err(Err::Incomplete(_)) => Err(CertificateError::ParseX509Certificate(
                X509Error::InvalidCertificate,
            )),
            Err(Err::Error(e) | Err::Failure(e)) => Err(CertificateError::ParseX509Certificate(e)),
        }
    }
}
