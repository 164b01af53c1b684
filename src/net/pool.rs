//! Outbound connection pool and forwarder.
//!
//! # Responsibilities
//! - Reuse keep-alive connections to backends (one shared client)
//! - Bound concurrent connections per backend (one semaphore per backend)
//! - Rewrite the inbound request for the chosen backend
//! - Enforce the per-request deadline and the response header timeout
//!
//! The per-backend partitions are internal; callers only see [`ConnectionPool::forward`].

use std::net::SocketAddr;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{Request, Response, Uri, Version};
use hyper::body::{Bytes, Frame, Incoming, SizeHint};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioTimer},
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{timeout_at, Instant};

use crate::config::PoolConfig;
use crate::error::{RouteError, UpstreamFailure};
use crate::load_balancer::Backend;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Headers that describe a single hop and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 9] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Shared pool of outbound connections, partitioned per backend.
#[derive(Debug)]
pub struct ConnectionPool {
    client: Client<HttpConnector, Body>,
    partitions: Vec<Arc<Semaphore>>,
    response_header_timeout: Duration,
}

impl ConnectionPool {
    /// Build the pool for `backends` partitions.
    ///
    /// The total idle budget is spread evenly over the partitions and capped
    /// by the per-backend idle limit.
    pub fn new(config: &PoolConfig, response_header_timeout: Duration, backends: usize) -> Self {
        let idle_per_backend = match backends {
            0 => config.max_idle_per_backend,
            n => config.max_idle_per_backend.min(config.max_idle_total / n),
        };

        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.set_connect_timeout(Some(response_header_timeout));

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(config.idle_timeout())
            .pool_max_idle_per_host(idle_per_backend)
            .build(connector);

        let partitions = (0..backends)
            .map(|_| Arc::new(Semaphore::new(config.max_per_backend)))
            .collect();

        tracing::info!(
            backends = backends,
            max_idle_per_backend = idle_per_backend,
            max_per_backend = config.max_per_backend,
            idle_timeout_secs = config.idle_timeout_secs,
            "Connection pool configured"
        );

        Self {
            client,
            partitions,
            response_header_timeout,
        }
    }

    /// Free connection slots for a backend.
    pub fn available(&self, backend: &Backend) -> usize {
        self.partitions
            .get(backend.id())
            .map(|p| p.available_permits())
            .unwrap_or(0)
    }

    /// Forward `request` to `backend` and wait for the response head.
    ///
    /// Fails with `UpstreamUnavailable` if no slot frees up, the backend is
    /// unreachable, or `deadline` passes first. The response body streams
    /// afterwards while still holding the backend slot.
    pub async fn forward(
        &self,
        backend: &Backend,
        request: Request<Body>,
        peer: Option<SocketAddr>,
        deadline: Instant,
    ) -> Result<Response<Body>, RouteError> {
        let name = backend.authority();
        let partition = self
            .partitions
            .get(backend.id())
            .ok_or_else(|| RouteError::upstream(name, UpstreamFailure::Request("unknown backend".into())))?;

        let permit = match timeout_at(deadline, partition.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(RouteError::upstream(
                    name,
                    UpstreamFailure::Request("connection pool closed".into()),
                ))
            }
            Err(_) => return Err(RouteError::upstream(name, UpstreamFailure::Saturated)),
        };

        let request = rewrite_request(backend, request, peer)
            .map_err(|e| RouteError::upstream(name, UpstreamFailure::Request(e)))?;

        let header_deadline = deadline.min(Instant::now() + self.response_header_timeout);
        let response = match timeout_at(header_deadline, self.client.request(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_connect() => {
                return Err(RouteError::upstream(name, UpstreamFailure::Connect(e.to_string())))
            }
            Ok(Err(e)) => {
                return Err(RouteError::upstream(name, UpstreamFailure::Request(e.to_string())))
            }
            Err(_) => return Err(RouteError::upstream(name, UpstreamFailure::Timeout)),
        };

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(
            parts,
            Body::new(HeldBody::<Incoming, OwnedSemaphorePermit> {
                inner: body,
                _held: permit,
            }),
        ))
    }

    /// Refuse further forwards. Idle connections go away with the client.
    pub fn close(&self) {
        for partition in &self.partitions {
            partition.close();
        }
        tracing::debug!("Connection pool closed");
    }
}

/// Point the request at the backend and clean up per-hop headers.
fn rewrite_request(
    backend: &Backend,
    request: Request<Body>,
    peer: Option<SocketAddr>,
) -> Result<Request<Body>, String> {
    let (mut parts, body) = request.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(PathAndQuery::as_str)
        .unwrap_or("/");
    let base = backend.url().path().trim_end_matches('/');
    let joined = format!("{}{}", base, path_and_query);

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(Authority::from_str(backend.authority()).map_err(|e| e.to_string())?);
    uri_parts.path_and_query = Some(PathAndQuery::from_str(&joined).map_err(|e| e.to_string())?);
    parts.uri = Uri::from_parts(uri_parts).map_err(|e| e.to_string())?;
    parts.version = Version::HTTP_11;

    strip_hop_by_hop(&mut parts.headers);

    if let Some(peer) = peer {
        let client_ip = peer.ip().to_string();
        let forwarded = match parts.headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(prior) => format!("{}, {}", prior, client_ip),
            None => client_ip,
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded) {
            parts.headers.insert(X_FORWARDED_FOR, value);
        }
    }

    Ok(Request::from_parts(parts, body))
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named in `Connection` are hop-by-hop too.
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_str(name.trim()).ok())
        .collect();

    for name in HOP_BY_HOP.iter().chain(listed.iter()) {
        headers.remove(name);
    }
}

/// Keep `held` alive until `body` has been fully streamed or dropped.
pub fn hold_until_complete<G>(body: Body, held: G) -> Body
where
    G: Send + Unpin + 'static,
{
    Body::new(HeldBody { inner: body, _held: held })
}

/// Response body that owns something (a pool slot, request guards) for its lifetime.
struct HeldBody<B, G> {
    inner: B,
    _held: G,
}

impl<B, G> hyper::body::Body for HeldBody<B, G>
where
    B: hyper::body::Body<Data = Bytes> + Unpin,
    G: Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
