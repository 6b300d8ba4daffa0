//! Metrics hook for the discovery service.

use std::fmt;
use std::sync::Arc;

/// Why a discovery response was pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PushTrigger {
    /// In answer to a client request.
    Request,
    /// By the periodic refresh of an open stream.
    Refresh,
}

impl PushTrigger {
    /// Returns a string representation of the trigger.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Refresh => "refresh",
        }
    }
}

impl fmt::Display for PushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categories of errors recorded by the discovery service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum MetricsErrorKind {
    /// Building secrets for a client request failed; no response was sent.
    BuildFailed,
    /// Building secrets for a refresh push failed; the stream's refresh stopped.
    RefreshFailed,
    /// The client reported that it rejected a pushed version.
    ClientRejected,
    /// Reading from the request stream failed.
    Receive,
    /// Unary fetch failed.
    FetchFailed,
}

impl MetricsErrorKind {
    /// Returns a string representation of the error kind.
    ///
    /// This is useful for metrics systems that require string labels.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BuildFailed => "build_failed",
            Self::RefreshFailed => "refresh_failed",
            Self::ClientRejected => "client_rejected",
            Self::Receive => "receive",
            Self::FetchFailed => "fetch_failed",
        }
    }
}

impl fmt::Display for MetricsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for recording metrics from the discovery service.
///
/// Implement this trait to integrate with your metrics system (e.g., Prometheus, `StatsD`).
///
/// # Example
///
/// ```no_run
/// use envoy_sds::{MetricsErrorKind, MetricsRecorder, PushTrigger};
///
/// struct MyMetrics;
///
/// impl MetricsRecorder for MyMetrics {
///     fn record_push(&self, trigger: PushTrigger) {
///         println!("push: {trigger}");
///     }
///
///     fn record_ack(&self) {}
///
///     fn record_error(&self, kind: MetricsErrorKind) {
///         println!("error: {}", kind.as_str());
///     }
/// }
/// ```
pub trait MetricsRecorder: Send + Sync {
    /// Records that a discovery response was sent on a stream.
    fn record_push(&self, trigger: PushTrigger);

    /// Records that a client acknowledged the version it was last sent.
    fn record_ack(&self);

    /// Records an error with a structured error kind.
    fn record_error(&self, kind: MetricsErrorKind);
}

/// Optional recorder shared by the service and its sessions.
#[derive(Clone, Default)]
pub(crate) struct Metrics(Option<Arc<dyn MetricsRecorder>>);

impl Metrics {
    pub(crate) fn new(recorder: Option<Arc<dyn MetricsRecorder>>) -> Self {
        Self(recorder)
    }

    pub(crate) fn push(&self, trigger: PushTrigger) {
        if let Some(m) = &self.0 {
            m.record_push(trigger);
        }
    }

    pub(crate) fn ack(&self) {
        if let Some(m) = &self.0 {
            m.record_ack();
        }
    }

    pub(crate) fn error(&self, kind: MetricsErrorKind) {
        if let Some(m) = &self.0 {
            m.record_error(kind);
        }
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Metrics").field(&self.0.is_some()).finish()
    }
}
