//! State machine of one `StreamSecrets` stream.
//!
//! A session runs three cooperating tasks:
//!
//! - the receive loop (this task) reads requests, tracks the current name set
//!   and version, and answers every request that is not an ACK;
//! - a ticker fires every refresh interval and hands the latest name set to
//!   the refresh worker;
//! - the refresh worker rebuilds the secrets and pushes them, so rotated
//!   certificates reach the client without it asking.
//!
//! Both senders share one [`Responder`], which serializes responses and
//! records the version of the last one delivered. A request echoing that
//! version is an ACK; any other version is answered. A
//! [`CancellationToken`] tears the background tasks down when the receive
//! loop exits for any reason, when the client goes away, or when the server
//! shuts down.

use super::metrics::{Metrics, MetricsErrorKind, MetricsRecorder, PushTrigger};
use crate::config::SdsConfig;
use crate::prelude::{debug, error, info, warn};
use crate::proto::envoy::api::v2::{DiscoveryRequest, DiscoveryResponse};
use crate::secret::SecretBuilder;
use crate::version::new_version;
use futures::{Stream, StreamExt as _};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Sending half of a stream's response channel.
pub type ResponseSender = mpsc::Sender<Result<DiscoveryResponse, Status>>;

/// An error ending a stream session.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SessionError {
    /// Reading the next request failed.
    #[error("failed receiving discovery request: {0}")]
    Receive(#[source] Status),

    /// The response stream is closed.
    #[error("discovery response stream closed")]
    Send,
}

/// Response channel of one stream, remembering the last version delivered.
#[derive(Debug, Clone)]
struct Responder {
    outbound: ResponseSender,
    last_sent: Arc<Mutex<String>>,
}

impl Responder {
    fn new(outbound: ResponseSender) -> Self {
        Self {
            outbound,
            last_sent: Arc::new(Mutex::new(String::new())),
        }
    }

    /// Sends `response` and records its version. The lock is held across the
    /// send, so the recorded version is always that of the last response queued.
    async fn send(&self, response: DiscoveryResponse) -> Result<(), SessionError> {
        let mut last_sent = self.last_sent.lock().await;
        let version = response.version_info.clone();
        self.outbound
            .send(Ok(response))
            .await
            .map_err(|_| SessionError::Send)?;
        *last_sent = version;
        Ok(())
    }

    async fn is_ack(&self, version: &str) -> bool {
        !version.is_empty() && *self.last_sent.lock().await == version
    }
}

/// One `StreamSecrets` stream.
#[derive(Debug)]
pub struct StreamSession {
    builder: SecretBuilder,
    refresh_interval: Duration,
    metrics: Metrics,
    names: Vec<String>,
    node: Option<String>,
}

impl StreamSession {
    /// Creates a session building secrets with `builder`.
    pub fn new(builder: SecretBuilder, config: SdsConfig) -> Self {
        Self {
            builder,
            refresh_interval: config.normalize().refresh_interval,
            metrics: Metrics::default(),
            names: Vec::new(),
            node: None,
        }
    }

    /// Records session events to `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = Metrics::new(Some(metrics));
        self
    }

    pub(crate) fn with_shared_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Drives the stream until the client closes it, a transport error
    /// occurs, the response channel closes, or `cancel` fires.
    ///
    /// `cancel` is cancelled on return, stopping the refresh tasks.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Receive`] if reading a request fails (the status
    /// is also forwarded to the client), or [`SessionError::Send`] if a response
    /// cannot be delivered.
    pub async fn run<S>(
        mut self,
        mut inbound: S,
        outbound: ResponseSender,
        cancel: CancellationToken,
    ) -> Result<(), SessionError>
    where
        S: Stream<Item = Result<DiscoveryRequest, Status>> + Unpin + Send,
    {
        let _guard = cancel.clone().drop_guard();

        let (names_tx, names_rx) = watch::channel(Vec::new());
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let responder = Responder::new(outbound.clone());

        tokio::spawn(run_ticker(
            self.refresh_interval,
            names_rx,
            refresh_tx,
            cancel.clone(),
        ));
        tokio::spawn(run_refresh_worker(
            self.builder.clone(),
            self.metrics.clone(),
            refresh_rx,
            responder.clone(),
            cancel.clone(),
        ));

        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Stream cancelled");
                    return Ok(());
                }
                () = outbound.closed() => {
                    debug!("Response stream closed by client");
                    return Ok(());
                }
                next = inbound.next() => next,
            };

            let request = match next {
                Some(Ok(request)) => request,
                Some(Err(status)) => {
                    warn!("Failed receiving discovery request: {status}");
                    self.metrics.error(MetricsErrorKind::Receive);
                    // Best effort: the client may already be gone.
                    let _ = outbound.try_send(Err(status.clone()));
                    return Err(SessionError::Receive(status));
                }
                None => {
                    debug!("Request stream closed by client");
                    return Ok(());
                }
            };

            self.handle_request(request, &names_tx, &responder)
                .await?;
        }
    }

    async fn handle_request(
        &mut self,
        request: DiscoveryRequest,
        names_tx: &watch::Sender<Vec<String>>,
        responder: &Responder,
    ) -> Result<(), SessionError> {
        if self.node.is_none() {
            if let Some(node) = &request.node {
                info!(
                    "Stream opened by node: id={}, cluster={}",
                    node.id, node.cluster
                );
                self.node = Some(node.id.clone());
            }
        }

        if let Some(detail) = &request.error_detail {
            warn!(
                "Client rejected version {:?}: code={}, message={}",
                request.version_info, detail.code, detail.message
            );
            self.metrics.error(MetricsErrorKind::ClientRejected);
            return Ok(());
        }

        self.names = request.resource_names;
        names_tx.send_replace(self.names.clone());

        let version = request.version_info;
        if responder.is_ack(&version).await {
            debug!("ACK for version {version}");
            self.metrics.ack();
            return Ok(());
        }

        info!("Request for resources: {:?}", self.names);
        let version = new_version();
        let response = match self.builder.build(&self.names, &version).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed building secrets; not responding: {e}");
                self.metrics.error(MetricsErrorKind::BuildFailed);
                return Ok(());
            }
        };

        responder.send(response).await?;
        self.metrics.push(PushTrigger::Request);
        debug!("Sent version {version}");
        Ok(())
    }
}

async fn run_ticker(
    period: Duration,
    names: watch::Receiver<Vec<String>>,
    refresh: mpsc::Sender<Vec<String>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let snapshot = names.borrow().clone();
        tokio::select! {
            () = cancel.cancelled() => return,
            sent = refresh.send(snapshot) => {
                if sent.is_err() {
                    debug!("Refresh worker stopped; stopping ticker");
                    return;
                }
            }
        }
    }
}

async fn run_refresh_worker(
    builder: SecretBuilder,
    metrics: Metrics,
    mut refresh: mpsc::Receiver<Vec<String>>,
    responder: Responder,
    cancel: CancellationToken,
) {
    loop {
        let names = tokio::select! {
            () = cancel.cancelled() => return,
            names = refresh.recv() => match names {
                Some(names) => names,
                None => return,
            },
        };

        let version = new_version();
        let built = tokio::select! {
            () = cancel.cancelled() => return,
            built = builder.build(&names, &version) => built,
        };
        let response = match built {
            Ok(response) => response,
            Err(e) => {
                error!("Failed refreshing secrets; stopping refresh for this stream: {e}");
                metrics.error(MetricsErrorKind::RefreshFailed);
                return;
            }
        };

        if responder.send(response).await.is_err() {
            debug!("Response stream closed; stopping refresh");
            return;
        }
        metrics.push(PushTrigger::Refresh);
        debug!("Refreshed resources: {names:?}");
    }
}
