#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

//! An [Envoy Secret Discovery Service](https://www.envoyproxy.io/docs/envoy/latest/configuration/security/secret)
//! (SDS) server that hands TLS certificates to Envoy over gRPC.
//!
//! Envoy asks for secrets by host name; the server obtains each certificate
//! from a [`CertificateDelegate`] (an ACME client, a certificate cache, ...),
//! encodes it as inline PEM and streams it back. Open streams are refreshed
//! periodically so renewed certificates reach Envoy without a restart.
//!
//! ```no_run
//! use envoy_sds::{DirCacheDelegate, SdsServer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Serve certificates from an autocert cache directory on a Unix socket.
//! let server = SdsServer::builder()
//!     .endpoint("unix:/tmp/envoysds.sock")
//!     .delegate(DirCacheDelegate::new("autocerts"))
//!     .build()?;
//!
//! // Runs until SIGTERM or SIGINT.
//! server.serve().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **`logging`** (default): log through the `log` crate
//! - **`tracing`**: emit `tracing` events instead
//! - **`cli`**: build the `envoy-sds` binary

mod observability;
mod prelude;

pub mod cert;
pub mod config;
pub mod constants;
pub mod delegate;
pub mod endpoint;
pub mod proto;
pub mod sds;
pub mod secret;
pub mod server;
pub mod version;

#[cfg(test)]
mod test_support;

pub use cert::pem::EncodeError;
pub use cert::{Certificate, CertificateError, PrivateKey};
pub use config::SdsConfig;
pub use delegate::{CertificateDelegate, ClientHello, DelegateError, DirCacheDelegate};
pub use endpoint::{Endpoint, EndpointError};
pub use sds::{MetricsErrorKind, MetricsRecorder, PushTrigger, SdsService, SessionError};
pub use secret::{BuildError, SecretBuilder, TlsSecret};
pub use server::{SdsServer, SdsServerBuilder, ServerError};
