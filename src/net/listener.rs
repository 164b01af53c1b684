//! Inbound connection loop.
//!
//! # Responsibilities
//! - Accept TCP connections and serve each one on its own task
//! - Bound how long a client may take to send a request head, and its size
//! - Attach the peer address to every request
//! - On shutdown: stop accepting, let open connections finish their
//!   current exchange, then return

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ConnectInfo;
use axum::Router;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tower::ServiceExt;

use crate::config::ListenerConfig;

/// Pause after a failed accept, so fd exhaustion does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Per-connection limits applied before a request reaches the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerLimits {
    pub header_read_timeout: Duration,
    pub max_header_bytes: usize,
}

impl ServerLimits {
    pub fn from_config(config: &ListenerConfig) -> Self {
        Self {
            header_read_timeout: config.header_read_timeout(),
            max_header_bytes: config.max_header_bytes,
        }
    }
}

/// Serve `router` on `listener` until `shutdown` resolves.
///
/// Returns once every accepted connection has closed.
pub async fn serve_connections<F>(
    listener: TcpListener,
    router: Router,
    limits: ServerLimits,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (stop_tx, stop_rx) = watch::channel(false);
    // Each connection task holds a receiver; `closed` resolves when all are gone.
    let (open_tx, open_rx) = watch::channel(());
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
            _ = &mut shutdown => break,
        };

        tracing::trace!(peer_addr = %peer, "Connection accepted");
        let stop = stop_rx.clone();
        let open = open_rx.clone();
        let router = router.clone();
        tokio::spawn(async move {
            serve_connection(stream, peer, router, limits, stop).await;
            drop(open);
        });
    }

    drop(listener);
    stop_tx.send_replace(true);
    drop(open_rx);
    tracing::debug!(open = open_tx.receiver_count(), "Waiting for connections to close");
    open_tx.closed().await;
    Ok(())
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Router,
    limits: ServerLimits,
    mut stop: watch::Receiver<bool>,
) {
    let service = router.map_request(move |mut req: Request<Incoming>| {
        req.extensions_mut().insert(ConnectInfo(peer));
        req
    });
    let service = TowerToHyperService::new(service);

    let mut builder = Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(limits.header_read_timeout)
        .max_buf_size(limits.max_header_bytes);
    builder.http2().timer(TokioTimer::new());

    let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(peer_addr = %peer, error = %e, "Connection closed with error");
                }
                break;
            }
            _ = stop.wait_for(|stopped| *stopped), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}
