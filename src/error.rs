//! Error taxonomy for the routing engine.
//!
//! Routing failures are recovered at the dispatcher boundary and turned into
//! HTTP responses. Telemetry failures never leave the telemetry pipeline.
//! Only startup errors are fatal.

use axum::http::StatusCode;
use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::load_balancer::backend::InvalidBackend;

/// Why a forward to an upstream did not complete.
#[derive(Debug, Error)]
pub enum UpstreamFailure {
    /// The request deadline expired before response headers arrived.
    #[error("deadline exceeded")]
    Timeout,
    /// The backend partition had no free connection slot before the deadline.
    #[error("connection limit reached")]
    Saturated,
    /// TCP connect was refused or reset.
    #[error("connect failed: {0}")]
    Connect(String),
    /// The exchange failed after the connection was established.
    #[error("request failed: {0}")]
    Request(String),
}

/// Failure of a single dispatch.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The registry is empty.
    #[error("no backend available")]
    NoBackendAvailable,

    /// The selected backend could not be reached or did not answer in time.
    #[error("upstream {backend} unavailable: {reason}")]
    UpstreamUnavailable {
        backend: String,
        #[source]
        reason: UpstreamFailure,
    },

    /// The request was still in flight when the shutdown grace period ended.
    #[error("request cancelled by shutdown")]
    Cancelled,
}

impl RouteError {
    /// HTTP status reported to the caller. Every routing failure is a 503.
    pub fn status(&self) -> StatusCode {
        StatusCode::SERVICE_UNAVAILABLE
    }

    /// Body text reported to the caller.
    pub fn body(&self) -> &'static str {
        match self {
            RouteError::NoBackendAvailable => "No backend available",
            RouteError::UpstreamUnavailable { .. } | RouteError::Cancelled => "Service unavailable",
        }
    }

    pub(crate) fn upstream(backend: &str, reason: UpstreamFailure) -> Self {
        RouteError::UpstreamUnavailable {
            backend: backend.to_string(),
            reason,
        }
    }
}

/// Telemetry sink rejected a batch or a flush.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
    /// Injected by instrumented sinks.
    #[error("sink rejected batch: {0}")]
    Rejected(String),
}

/// Fatal errors raised while the router is starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Backend(#[from] InvalidBackend),
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open telemetry sink: {0}")]
    Sink(#[from] SinkError),
    #[error("failed to start metrics exporter: {0}")]
    Metrics(String),
}
