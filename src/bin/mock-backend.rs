//! Stand-in backend for local runs and load tests.
//!
//! Answers every request with `Hello from <id> | req=<n> | latency=<d>`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{extract::State, routing::any, Router};
use clap::Parser;
use tokio::net::TcpListener;

#[derive(Debug, Parser)]
#[command(name = "mock-backend", about = "Minimal HTTP backend that reports its identity")]
struct Args {
    /// Identity echoed in every response.
    #[arg(long, env = "SERVER_ID", default_value = "backend")]
    id: String,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Artificial processing delay per request.
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,
}

struct Backend {
    id: String,
    delay: Duration,
    requests: AtomicU64,
}

async fn hello(State(backend): State<Arc<Backend>>) -> String {
    let start = Instant::now();
    if !backend.delay.is_zero() {
        tokio::time::sleep(backend.delay).await;
    }
    let count = backend.requests.fetch_add(1, Ordering::Relaxed) + 1;
    let elapsed = start.elapsed();

    tracing::debug!(req = count, elapsed = ?elapsed, "Request served");
    format!("Hello from {} | req={} | latency={:?}\n", backend.id, count, elapsed)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mock_backend=info".into()),
        )
        .init();

    let args = Args::parse();
    let state = Arc::new(Backend {
        id: args.id,
        delay: Duration::from_millis(args.delay_ms),
        requests: AtomicU64::new(0),
    });

    let app = Router::new()
        .route("/", any(hello))
        .route("/{*path}", any(hello))
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(id = %state.id, address = %addr, "Mock backend listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
