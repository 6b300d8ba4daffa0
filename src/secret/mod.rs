//! Assembly of SDS secrets and discovery responses.
//!
//! [`SecretBuilder`] turns resource names into a [`DiscoveryResponse`]: one
//! certificate fetch per name, each encoded as an inline-PEM TLS secret and
//! packed as `google.protobuf.Any`. The build is all-or-nothing.

use crate::cert::pem::{self, EncodeError};
use crate::cert::Certificate;
use crate::constants::SECRET_TYPE_URL;
use crate::delegate::{CertificateDelegate, ClientHello, DelegateError};
use crate::prelude::debug;
use crate::proto::envoy::api::v2::auth::{secret, Secret, TlsCertificate};
use crate::proto::envoy::api::v2::core::{data_source, DataSource};
use crate::proto::envoy::api::v2::DiscoveryResponse;
use prost::Message as _;
use std::fmt;
use std::sync::Arc;
use tonic::Status;
use zeroize::Zeroizing;

/// A TLS certificate secret, ready for the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct TlsSecret {
    name: String,
    certificate_chain: Vec<u8>,
    private_key: Zeroizing<Vec<u8>>,
}

impl TlsSecret {
    /// Encodes `cert` as a secret named `name`.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if the private key type is unsupported.
    pub fn from_certificate(name: impl Into<String>, cert: &Certificate) -> Result<Self, EncodeError> {
        Ok(Self {
            name: name.into(),
            certificate_chain: pem::encode_public(cert)?,
            private_key: pem::encode_private(cert)?,
        })
    }

    /// Returns the secret name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the PEM certificate chain, leaf first.
    pub fn certificate_chain(&self) -> &[u8] {
        &self.certificate_chain
    }

    /// Returns the PEM private key.
    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }

    /// Packs the secret as a `google.protobuf.Any` resource.
    pub fn to_any(&self) -> prost_types::Any {
        prost_types::Any {
            type_url: SECRET_TYPE_URL.to_owned(),
            value: Secret::from(self).encode_to_vec(),
        }
    }
}

impl fmt::Debug for TlsSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSecret")
            .field("name", &self.name)
            .field("certificate_chain_len", &self.certificate_chain.len())
            .finish_non_exhaustive()
    }
}

impl From<&TlsSecret> for Secret {
    fn from(secret: &TlsSecret) -> Self {
        let inline = |bytes: &[u8]| DataSource {
            specifier: Some(data_source::Specifier::InlineBytes(bytes.to_vec())),
        };

        Secret {
            name: secret.name.clone(),
            r#type: Some(secret::Type::TlsCertificate(TlsCertificate {
                certificate_chain: Some(inline(&secret.certificate_chain)),
                private_key: Some(inline(&secret.private_key)),
                password: None,
            })),
        }
    }
}

/// An error building the secrets of a discovery response.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BuildError {
    /// The delegate failed to supply a certificate.
    #[error("{name}: {source}")]
    Delegate {
        /// Resource name being fetched.
        name: String,
        /// Delegate error.
        #[source]
        source: DelegateError,
    },

    /// The certificate could not be encoded.
    #[error("{name}: {source}")]
    Encode {
        /// Resource name being encoded.
        name: String,
        /// Encoder error.
        #[source]
        source: EncodeError,
    },
}

impl BuildError {
    /// Returns the resource name that failed.
    pub fn name(&self) -> &str {
        match self {
            Self::Delegate { name, .. } | Self::Encode { name, .. } => name,
        }
    }
}

impl From<BuildError> for Status {
    fn from(err: BuildError) -> Self {
        Status::internal(format!("failed to read TLS certificate ({err})"))
    }
}

/// Builds discovery responses from certificates supplied by a delegate.
#[derive(Clone)]
pub struct SecretBuilder {
    delegate: Arc<dyn CertificateDelegate>,
}

impl fmt::Debug for SecretBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBuilder").finish_non_exhaustive()
    }
}

impl SecretBuilder {
    /// Creates a builder backed by `delegate`.
    pub fn new(delegate: Arc<dyn CertificateDelegate>) -> Self {
        Self { delegate }
    }

    /// Fetches and encodes the secret for a single resource name.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] naming the resource if the delegate or the
    /// encoder fails.
    pub async fn fetch_secret(&self, name: &str) -> Result<TlsSecret, BuildError> {
        let hello = ClientHello::for_server_name(name);
        let cert = self
            .delegate
            .get_certificate(&hello)
            .await
            .map_err(|source| BuildError::Delegate {
                name: name.to_owned(),
                source,
            })?;

        TlsSecret::from_certificate(name, &cert).map_err(|source| BuildError::Encode {
            name: name.to_owned(),
            source,
        })
    }

    /// Builds a response carrying one secret per name, in the order given.
    ///
    /// Names are fetched one at a time. The first failure aborts the build and
    /// no partial response is produced. An empty name list yields a response
    /// with no resources.
    ///
    /// # Errors
    ///
    /// Returns the first [`BuildError`] encountered.
    pub async fn build(&self, names: &[String], version: &str) -> Result<DiscoveryResponse, BuildError> {
        let mut resources = Vec::with_capacity(names.len());
        for name in names {
            debug!("Fetching certificate: name={name}");
            resources.push(self.fetch_secret(name).await?.to_any());
        }

        Ok(DiscoveryResponse {
            version_info: version.to_owned(),
            resources,
            type_url: SECRET_TYPE_URL.to_owned(),
            ..Default::default()
        })
    }
}
