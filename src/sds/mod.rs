//! The Envoy v2 `SecretDiscoveryService`.
//!
//! [`SdsService`] implements the three RPCs:
//!
//! - `FetchSecrets` builds the requested secrets once and returns them;
//! - `StreamSecrets` opens a [`StreamSession`] that answers requests, suppresses
//!   ACKs and periodically re-pushes the current secrets;
//! - `DeltaSecrets` is rejected with `UNIMPLEMENTED`.

pub mod metrics;
pub mod session;

pub use metrics::{MetricsErrorKind, MetricsRecorder, PushTrigger};
pub use session::{SessionError, StreamSession};

use crate::config::SdsConfig;
use crate::delegate::CertificateDelegate;
use crate::prelude::{info, warn};
use crate::proto::envoy::api::v2::{
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};
use crate::proto::envoy::service::discovery::v2::secret_discovery_service_server::{
    SecretDiscoveryService, SecretDiscoveryServiceServer,
};
use crate::secret::SecretBuilder;
use crate::version::new_version;
use futures::stream::BoxStream;
use futures::Stream;
use self::metrics::Metrics;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};

/// Responses buffered per stream before senders wait on the client.
const RESPONSE_BUFFER: usize = 4;

/// Secret discovery service backed by a [`CertificateDelegate`].
///
/// Cloning is cheap; clones share the delegate and the shutdown token.
#[derive(Debug, Clone)]
pub struct SdsService {
    builder: SecretBuilder,
    config: SdsConfig,
    metrics: Metrics,
    shutdown: CancellationToken,
}

impl SdsService {
    /// Creates a service fetching certificates from `delegate`.
    pub fn new(delegate: Arc<dyn CertificateDelegate>, config: SdsConfig) -> Self {
        Self {
            builder: SecretBuilder::new(delegate),
            config: config.normalize(),
            metrics: Metrics::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Records service events to `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = Metrics::new(Some(metrics));
        self
    }

    /// Returns the service configuration.
    pub fn config(&self) -> &SdsConfig {
        &self.config
    }

    /// Returns the token that ends every open stream when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Wraps the service for registration with a tonic server.
    pub fn into_server(self) -> SecretDiscoveryServiceServer<Self> {
        SecretDiscoveryServiceServer::new(self)
    }

    /// Starts a stream session reading `inbound` and returns its response stream.
    ///
    /// The session runs on its own task until the client closes the stream, a
    /// transport error occurs, or the service shuts down.
    pub fn open_stream<S>(&self, inbound: S) -> ReceiverStream<Result<DiscoveryResponse, Status>>
    where
        S: Stream<Item = Result<DiscoveryRequest, Status>> + Send + 'static,
    {
        let inbound = Box::pin(inbound);
        let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);
        let session = StreamSession::new(self.builder.clone(), self.config)
            .with_shared_metrics(self.metrics.clone());
        let cancel = self.shutdown.child_token();

        tokio::spawn(async move {
            info!("Stream opened");
            match session.run(inbound, tx, cancel).await {
                Ok(()) => info!("Stream closed"),
                Err(e) => warn!("Stream terminated: {e}"),
            }
        });

        ReceiverStream::new(rx)
    }

    /// Builds the secrets for one `FetchSecrets` request.
    ///
    /// # Errors
    ///
    /// Returns `INTERNAL` if any certificate cannot be fetched or encoded.
    pub async fn fetch(&self, request: &DiscoveryRequest) -> Result<DiscoveryResponse, Status> {
        info!("Fetch for resources: {:?}", request.resource_names);
        self.builder
            .build(&request.resource_names, &new_version())
            .await
            .map_err(|e| {
                warn!("Failed building secrets for fetch: {e}");
                self.metrics.error(MetricsErrorKind::FetchFailed);
                Status::from(e)
            })
    }
}

#[tonic::async_trait]
impl SecretDiscoveryService for SdsService {
    type DeltaSecretsStream = BoxStream<'static, Result<DeltaDiscoveryResponse, Status>>;

    async fn delta_secrets(
        &self,
        _request: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaSecretsStream>, Status> {
        info!("DeltaSecrets not implemented");
        Err(Status::unimplemented("DeltaSecrets not implemented"))
    }

    type StreamSecretsStream = ReceiverStream<Result<DiscoveryResponse, Status>>;

    async fn stream_secrets(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamSecretsStream>, Status> {
        Ok(Response::new(self.open_stream(request.into_inner())))
    }

    async fn fetch_secrets(
        &self,
        request: Request<DiscoveryRequest>,
    ) -> Result<Response<DiscoveryResponse>, Status> {
        let response = self.fetch(request.get_ref()).await?;
        Ok(Response::new(response))
    }
}
