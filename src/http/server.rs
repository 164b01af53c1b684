//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the router context once at startup
//! - Create the Axum router (every method and path goes to the dispatcher)
//! - Wire up middleware (request ID, tracing, in-flight limit)
//! - Serve a bound listener until the shutdown future resolves

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::any, Router};
use tokio::net::TcpListener;
use tower::{limit::GlobalConcurrencyLimitLayer, ServiceBuilder};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::dispatcher::dispatch;
use crate::http::request::UuidRequestId;
use crate::load_balancer::{self, BackendRegistry, InvalidBackend, LoadBalancer};
use crate::net::{serve_connections, ConnectionPool, InFlightTracker, ServerLimits};
use crate::telemetry::TelemetryQueue;

/// Everything a request needs, built once and shared by all handlers.
#[derive(Debug)]
pub struct RouterContext {
    pub registry: BackendRegistry,
    pub strategy: Box<dyn LoadBalancer>,
    pub pool: ConnectionPool,
    /// `None` when telemetry is disabled.
    pub telemetry: Option<TelemetryQueue>,
    pub inflight: InFlightTracker,
    pub request_timeout: Duration,
    pub max_in_flight: usize,
}

impl RouterContext {
    pub fn new(config: &ProxyConfig, telemetry: Option<TelemetryQueue>) -> Result<Self, InvalidBackend> {
        let registry = BackendRegistry::from_config(&config.backends)?;
        let strategy = load_balancer::from_algorithm(config.algorithm);
        let pool = ConnectionPool::new(&config.pool, config.timeouts.response_header(), registry.len());

        tracing::info!(
            algorithm = strategy.name(),
            backends = registry.len(),
            total_weight = registry.total_weight(),
            "Router context ready"
        );

        Ok(Self {
            registry,
            strategy,
            pool,
            telemetry,
            inflight: InFlightTracker::new(),
            request_timeout: config.timeouts.request(),
            max_in_flight: config.listener.max_in_flight,
        })
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(ctx: Arc<RouterContext>) -> Router {
    let max_in_flight = ctx.max_in_flight;
    Router::new()
        .route("/", any(dispatch))
        .route("/{*path}", any(dispatch))
        .with_state(ctx)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(GlobalConcurrencyLimitLayer::new(max_in_flight)),
        )
}

/// HTTP front end of the router.
pub struct HttpServer {
    router: Router,
    context: Arc<RouterContext>,
    limits: ServerLimits,
}

impl HttpServer {
    pub fn new(context: Arc<RouterContext>, limits: ServerLimits) -> Self {
        let router = build_router(context.clone());
        Self {
            router,
            context,
            limits,
        }
    }

    pub fn context(&self) -> &Arc<RouterContext> {
        &self.context
    }

    /// Serve until `shutdown` resolves, then finish open connections.
    ///
    /// Once `shutdown` fires the listener stops accepting; the returned future
    /// completes when every accepted connection has closed.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            header_read_timeout_ms = self.limits.header_read_timeout.as_millis() as u64,
            max_header_bytes = self.limits.max_header_bytes,
            "HTTP server starting"
        );

        serve_connections(listener, self.router, self.limits, shutdown).await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
