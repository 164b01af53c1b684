//! Startup and shutdown orchestration.
//!
//! # Responsibilities
//! - Validate configuration and build the router context
//! - Start the telemetry pipeline and, when enabled, the metrics exporter
//! - Bind the listener last, so traffic only arrives once everything is ready
//! - On shutdown: stop accepting, drain within the grace period, cancel the
//!   rest, drain telemetry, close the pool
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and returned to the caller
//! - Request-level failures never reach this layer
//! - Forced cancellation is counted, not treated as an error

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::timeout;

use crate::config::{validate_config, ConfigError, ProxyConfig};
use crate::error::StartupError;
use crate::http::{HttpServer, RouterContext};
use crate::lifecycle::state::{LifecycleState, StateCell};
use crate::lifecycle::Shutdown;
use crate::net::ServerLimits;
use crate::observability::metrics;
use crate::telemetry::{build_sink, TelemetryPipeline, TelemetrySink, TelemetryStatsSnapshot};

/// How long cancelled requests and the server task get to wind down.
const CANCEL_SETTLE: Duration = Duration::from_secs(1);

/// Outcome of a completed shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Requests still in flight when the grace period ended.
    pub cancelled_requests: u64,
    /// Final telemetry counters; `buffered` is zero after a clean drain.
    pub telemetry: TelemetryStatsSnapshot,
}

/// Owns every long-lived component of a running router.
pub struct LifecycleController {
    context: Arc<RouterContext>,
    telemetry: Option<TelemetryPipeline>,
    listener: TcpListener,
    limits: ServerLimits,
    local_addr: SocketAddr,
    state: Arc<StateCell>,
    shutdown: Shutdown,
    grace: Duration,
}

impl LifecycleController {
    /// Build all components and bind the listener.
    ///
    /// `sink` overrides the sink described by `config.telemetry.sink`; it is
    /// ignored when telemetry is disabled.
    pub async fn start(
        config: ProxyConfig,
        sink: Option<Box<dyn TelemetrySink>>,
    ) -> Result<Self, StartupError> {
        let state = Arc::new(StateCell::new());
        validate_config(&config).map_err(ConfigError::Validation)?;

        let telemetry = if config.telemetry.enabled {
            let sink = match sink {
                Some(sink) => sink,
                None => build_sink(&config.telemetry.sink)?,
            };
            Some(TelemetryPipeline::spawn(&config.telemetry, sink))
        } else {
            tracing::info!("Telemetry disabled");
            None
        };

        let context = RouterContext::new(&config, telemetry.as_ref().map(|p| p.queue()))?;

        if config.observability.metrics_enabled {
            let addr = config
                .observability
                .metrics_address
                .parse()
                .map_err(|e| StartupError::Metrics(format!("{}: {}", config.observability.metrics_address, e)))?;
            metrics::init_metrics(addr).map_err(StartupError::Metrics)?;
        }

        let listener = TcpListener::bind(&config.listener.bind_address)
            .await
            .map_err(|source| StartupError::Bind {
                address: config.listener.bind_address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| StartupError::Bind {
            address: config.listener.bind_address.clone(),
            source,
        })?;

        tracing::info!(
            address = %local_addr,
            algorithm = %config.algorithm,
            request_timeout_ms = config.timeouts.request_ms,
            shutdown_grace_ms = config.timeouts.shutdown_grace_ms,
            "Listening for connections"
        );

        Ok(Self {
            context: Arc::new(context),
            telemetry,
            listener,
            limits: ServerLimits::from_config(&config.listener),
            local_addr,
            state,
            shutdown: Shutdown::new(),
            grace: config.timeouts.shutdown_grace(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    /// Shared view of the state, readable after `run` has taken ownership.
    pub fn state_cell(&self) -> Arc<StateCell> {
        self.state.clone()
    }

    /// Trigger that starts the shutdown sequence.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn context(&self) -> &Arc<RouterContext> {
        &self.context
    }

    /// Serve until shutdown is triggered, then drain and stop.
    ///
    /// Returns an error only if the server itself failed; the shutdown
    /// sequence still runs to completion first.
    pub async fn run(self) -> Result<ShutdownReport, std::io::Error> {
        let Self {
            context,
            telemetry,
            listener,
            limits,
            state,
            shutdown,
            grace,
            ..
        } = self;

        let server = HttpServer::new(context.clone(), limits);
        let trigger = shutdown.clone();
        let mut server_task = tokio::spawn(server.serve(listener, async move { trigger.wait().await }));
        state.advance(LifecycleState::Running);

        let early_exit = tokio::select! {
            _ = shutdown.wait() => None,
            joined = &mut server_task => Some(joined),
        };
        state.advance(LifecycleState::Draining);

        let inflight = &context.inflight;
        tracing::info!(
            in_flight = inflight.active(),
            grace_ms = grace.as_millis() as u64,
            "Draining in-flight requests"
        );

        let mut cancelled_requests = 0;
        if timeout(grace, inflight.wait_idle()).await.is_err() {
            cancelled_requests = inflight.cancel_all();
            metrics::record_shutdown_cancelled(cancelled_requests);
            tracing::warn!(
                cancelled = cancelled_requests,
                "Grace period elapsed, cancelling in-flight requests"
            );
            if timeout(CANCEL_SETTLE, inflight.wait_idle()).await.is_err() {
                tracing::warn!(remaining = inflight.active(), "Requests still streaming after cancellation");
            }
        }

        let served = match early_exit {
            Some(joined) => joined,
            None => match timeout(CANCEL_SETTLE, &mut server_task).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!("HTTP server did not stop in time, aborting");
                    server_task.abort();
                    Ok(Ok(()))
                }
            },
        };

        let telemetry = match &telemetry {
            Some(pipeline) => pipeline.shutdown().await,
            None => TelemetryStatsSnapshot::default(),
        };
        context.pool.close();
        state.advance(LifecycleState::Stopped);

        served.map_err(std::io::Error::other)??;

        let report = ShutdownReport {
            cancelled_requests,
            telemetry,
        };
        tracing::info!(
            cancelled = report.cancelled_requests,
            telemetry_flushed = report.telemetry.flushed,
            telemetry_dropped = report.telemetry.dropped,
            "Shutdown complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use crate::telemetry::MemorySink;

    fn local_config() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "127.0.0.1:0".to_string();
        config.backends = Vec::new();
        config
    }

    #[tokio::test]
    async fn start_and_stop_without_traffic() {
        let controller = LifecycleController::start(local_config(), Some(Box::new(MemorySink::new())))
            .await
            .unwrap();
        assert_eq!(controller.state(), LifecycleState::Starting);
        assert_ne!(controller.local_addr().port(), 0);

        let state = controller.state_cell();
        let shutdown = controller.shutdown_handle();
        let run = tokio::spawn(controller.run());
        shutdown.trigger();

        let report = run.await.unwrap().unwrap();
        assert_eq!(report, ShutdownReport::default());
        assert_eq!(state.get(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = local_config();
        config.backends = vec![BackendConfig::new("ftp://backend1:21", 1)];
        let err = LifecycleController::start(config, None).await.err().unwrap();
        assert!(matches!(err, StartupError::Config(ConfigError::Validation(_))), "{}", err);
    }

    #[tokio::test]
    async fn bind_failure_is_fatal() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = local_config();
        config.listener.bind_address = taken.local_addr().unwrap().to_string();
        config.telemetry.enabled = false;

        let err = LifecycleController::start(config, None).await.err().unwrap();
        assert!(matches!(err, StartupError::Bind { .. }), "{}", err);
    }
}
