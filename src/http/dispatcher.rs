//! Request dispatch.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → strategy.select()            (503 "No backend available" on empty registry)
//!     → backend.acquire()            (connection count +1, RAII)
//!     → pool.forward(deadline)       (races forced cancellation)
//!     → response or 503 "Service unavailable"
//!     → telemetry.enqueue()          (never waits)
//! ```
//!
//! The in-flight and connection guards ride on the response body, so both are
//! released once the body has been delivered or the client goes away.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
};
use tokio::time::Instant;

use crate::error::RouteError;
use crate::http::request::request_id;
use crate::http::server::RouterContext;
use crate::load_balancer::Backend;
use crate::net::hold_until_complete;
use crate::observability::metrics;
use crate::telemetry::TelemetryRecord;

/// Proxy one request to a backend chosen by the configured strategy.
pub async fn dispatch(State(ctx): State<Arc<RouterContext>>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let inflight = ctx.inflight.track();
    let request_id = request_id(&request).to_string();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let backend = match ctx.strategy.select(&ctx.registry) {
        Ok(backend) => backend,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Dispatch rejected");
            return error_response(&e);
        }
    };

    let connection = backend.acquire();
    metrics::set_active_connections(backend.authority(), backend.active_connections());

    let deadline = start + ctx.request_timeout;
    let outcome = tokio::select! {
        result = ctx.pool.forward(&backend, request, peer, deadline) => result,
        _ = ctx.inflight.cancelled() => Err(RouteError::Cancelled),
    };
    let latency = start.elapsed();

    let response = match outcome {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, hold_until_complete(body, (connection, inflight)))
        }
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                backend = %backend,
                error = %e,
                "Upstream request failed"
            );
            drop(connection);
            metrics::set_active_connections(backend.authority(), backend.active_connections());
            error_response(&e)
        }
    };

    let status = response.status().as_u16();
    record(&ctx, &backend, status, latency);

    tracing::debug!(
        request_id = %request_id,
        backend = %backend,
        status = status,
        latency_ms = latency.as_secs_f64() * 1000.0,
        "Request dispatched"
    );
    response
}

fn record(ctx: &RouterContext, backend: &Backend, status: u16, latency: std::time::Duration) {
    metrics::record_request(backend.authority(), status, latency);
    if let Some(queue) = &ctx.telemetry {
        queue.enqueue(TelemetryRecord::new(backend.authority().clone(), latency, status));
    }
}

fn error_response(err: &RouteError) -> Response {
    (err.status(), err.body()).into_response()
}
