//! Server lifecycle: bind the listen endpoint, serve the discovery service,
//! shut down on signal, and clean up the socket file.

use crate::config::SdsConfig;
use crate::constants::DEFAULT_ENDPOINT;
use crate::delegate::CertificateDelegate;
use crate::endpoint::{Endpoint, EndpointError};
use crate::prelude::{info, warn};
use crate::sds::{MetricsRecorder, SdsService};
use std::fmt::Debug;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tonic::transport::Server;

/// Errors returned while building or running an [`SdsServer`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServerError {
    /// No certificate delegate was configured.
    #[error("no certificate delegate configured")]
    MissingDelegate,

    /// The listen endpoint is invalid.
    #[error("invalid listen endpoint: {0}")]
    Endpoint(#[from] EndpointError),

    /// The endpoint transport is unsupported on the current platform.
    #[error("unsupported endpoint transport: {scheme}")]
    UnsupportedEndpointTransport {
        /// The unsupported transport scheme.
        scheme: &'static str,
    },

    /// Binding the listen endpoint failed.
    #[error("failed binding {endpoint}")]
    Bind {
        /// Endpoint being bound.
        endpoint: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The gRPC server failed.
    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),
}

/// Builder for [`SdsServer`].
///
/// # Example
///
/// ```no_run
/// use envoy_sds::{DirCacheDelegate, SdsServer};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let server = SdsServer::builder()
///     .endpoint("unix:/tmp/envoysds.sock")
///     .refresh_interval(Duration::from_secs(20))
///     .delegate(DirCacheDelegate::new("autocerts"))
///     .build()?;
/// server.serve().await?;
/// # Ok(())
/// # }
/// ```
pub struct SdsServerBuilder {
    endpoint: String,
    config: SdsConfig,
    delegate: Option<Arc<dyn CertificateDelegate>>,
    metrics: Option<Arc<dyn MetricsRecorder>>,
}

impl Debug for SdsServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdsServerBuilder")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .field(
                "delegate",
                &self.delegate.as_ref().map(|_| "<CertificateDelegate>"),
            )
            .field(
                "metrics",
                &self.metrics.as_ref().map(|_| "<MetricsRecorder>"),
            )
            .finish()
    }
}

impl Default for SdsServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SdsServerBuilder {
    /// Creates a builder listening on the default endpoint with the default refresh interval.
    pub fn new() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            config: SdsConfig::default(),
            delegate: None,
            metrics: None,
        }
    }

    /// Sets the listen endpoint.
    ///
    /// Accepts a socket path (`/tmp/envoysds.sock`), a `unix:` URI or a `tcp:` URI.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl AsRef<str>) -> Self {
        self.endpoint = endpoint.as_ref().to_owned();
        self
    }

    /// Sets the interval between refresh pushes on each stream.
    #[must_use]
    pub const fn refresh_interval(mut self, interval: Duration) -> Self {
        self.config.refresh_interval = interval;
        self
    }

    /// Sets the certificate delegate.
    #[must_use]
    pub fn delegate<D>(mut self, delegate: D) -> Self
    where
        D: CertificateDelegate,
    {
        self.delegate = Some(Arc::new(delegate));
        self
    }

    /// Sets an already shared certificate delegate.
    #[must_use]
    pub fn shared_delegate(mut self, delegate: Arc<dyn CertificateDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Sets an optional metrics recorder.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validates the configuration and builds the server.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::MissingDelegate`] if no delegate was set, or
    /// [`ServerError::Endpoint`] if the endpoint does not parse.
    pub fn build(self) -> Result<SdsServer, ServerError> {
        let delegate = self.delegate.ok_or(ServerError::MissingDelegate)?;
        let endpoint = Endpoint::parse(&self.endpoint)?;

        let mut service = SdsService::new(delegate, self.config);
        if let Some(metrics) = self.metrics {
            service = service.with_metrics(metrics);
        }

        Ok(SdsServer { endpoint, service })
    }
}

/// Secret discovery server bound to one listen endpoint.
#[derive(Debug)]
pub struct SdsServer {
    endpoint: Endpoint,
    service: SdsService,
}

impl SdsServer {
    /// Returns a builder for `SdsServer`.
    pub fn builder() -> SdsServerBuilder {
        SdsServerBuilder::new()
    }

    /// Returns the listen endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns the discovery service.
    pub fn service(&self) -> &SdsService {
        &self.service
    }

    /// Serves until SIGTERM or SIGINT is received.
    ///
    /// # Errors
    ///
    /// Returns a [`ServerError`] if binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        self.serve_with_shutdown(shutdown_signal()).await
    }

    /// Serves until `signal` completes, then ends every open stream and
    /// waits for connections to drain.
    ///
    /// A stale Unix socket file is removed before binding, and the socket
    /// file is removed once the server stops.
    ///
    /// # Errors
    ///
    /// Returns a [`ServerError`] if binding or serving fails.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send,
    {
        let streams = self.service.shutdown_token();
        let shutdown = async move {
            signal.await;
            info!("Shutdown requested; closing open streams");
            streams.cancel();
        };
        let router = Server::builder().add_service(self.service.into_server());

        if let Some(addr) = self.endpoint.socket_addr() {
            let listener =
                tokio::net::TcpListener::bind(addr)
                    .await
                    .map_err(|source| ServerError::Bind {
                        endpoint: format!("tcp:{addr}"),
                        source,
                    })?;
            info!("Serving secret discovery on {addr}");
            router
                .serve_with_incoming_shutdown(
                    tokio_stream::wrappers::TcpListenerStream::new(listener),
                    shutdown,
                )
                .await?;
        } else if let Endpoint::Unix(path) = self.endpoint {
            #[cfg(unix)]
            {
                use tokio_stream::wrappers::UnixListenerStream;

                let listener = bind_unix(&path)?;
                let _cleanup = SocketCleanup(path.clone());
                info!("Serving secret discovery on {}", path.display());
                router
                    .serve_with_incoming_shutdown(UnixListenerStream::new(listener), shutdown)
                    .await?;
            }

            #[cfg(not(unix))]
            {
                let _ = (path, router, shutdown);
                return Err(ServerError::UnsupportedEndpointTransport { scheme: "unix" });
            }
        }

        info!("Server stopped");
        Ok(())
    }
}

#[cfg(unix)]
fn bind_unix(path: &Path) -> Result<tokio::net::UnixListener, ServerError> {
    match std::fs::remove_file(path) {
        Ok(()) => info!("Removed stale socket file {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed removing stale socket file {}: {e}", path.display()),
    }

    tokio::net::UnixListener::bind(path).map_err(|source| ServerError::Bind {
        endpoint: format!("unix:{}", path.display()),
        source,
    })
}

/// Removes the socket file when dropped.
struct SocketCleanup(PathBuf);

impl Drop for SocketCleanup {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => info!("Removed socket file {}", self.0.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed removing socket file {}: {e}", self.0.display()),
        }
    }
}

/// Completes on SIGTERM or SIGINT.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = term.recv() => info!("Received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                }
                return;
            }
            Err(e) => warn!("Failed installing SIGTERM handler: {e}"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed waiting for SIGINT: {e}");
        std::future::pending::<()>().await;
    }
    info!("Received SIGINT");
}
