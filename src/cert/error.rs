//! Error types for certificate and private key decoding.

use x509_parser::error::X509Error;

/// An error that may arise building a [`Certificate`](super::Certificate) from DER or PEM data.
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum CertificateError {
    /// The chain of certificates is empty.
    #[error("no certificates found in chain")]
    EmptyChain,

    /// The PEM data does not contain a private key.
    #[error("no private key found in PEM data")]
    MissingPrivateKey,

    /// The PEM data could not be decoded.
    #[error("failed decoding PEM data: {0}")]
    Pem(String),

    /// Error returned by the PKCS#8 private key decoding library.
    #[error("failed decoding PKCS#8 private key")]
    DecodePkcs8(#[source] pkcs8::Error),

    /// A PKCS#8 EC private key does not name its curve.
    #[error("PKCS#8 EC private key is missing the named curve parameter")]
    MissingCurve,

    /// A SEC1 EC private key could not be decoded or re-encoded.
    #[error("failed processing SEC1 EC private key")]
    Sec1(#[source] pkcs8::der::Error),

    /// Error returned by the X.509 parsing library.
    #[error("failed parsing X.509 certificate")]
    ParseX509Certificate(#[from] X509Error),
}
