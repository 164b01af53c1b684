//! HTTP load-balancing router.
//!
//! Accepts inbound HTTP requests, picks a backend with a configurable
//! strategy (round robin, weighted round robin, least connections), forwards
//! over pooled keep-alive connections and records per-request latency through
//! a non-blocking, batched telemetry pipeline.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────────┐
//!                          │                    LB ROUTER                     │
//!                          │                                                  │
//!   Client Request         │  ┌─────────┐   ┌────────────┐   ┌─────────────┐  │
//!   ───────────────────────┼─▶│  http   │──▶│ dispatcher │──▶│load_balancer│  │
//!                          │  │ server  │   │            │   │  strategy   │  │
//!                          │  └─────────┘   └─────┬──────┘   └─────────────┘  │
//!                          │                      │                           │
//!                          │                      ▼                           │
//!   Client Response        │               ┌────────────┐                     │
//!   ◀──────────────────────┼───────────────│  net pool  │◀────────────────────┼──── Backend
//!                          │               └────────────┘                     │
//!                          │                      │ enqueue (never waits)     │
//!                          │                      ▼                           │
//!                          │  ┌──────────────────────────────────────────┐    │
//!                          │  │ telemetry: queue → batcher → sink         │    │
//!                          │  └──────────────────────────────────────────┘    │
//!                          │                                                  │
//!                          │  config · observability · lifecycle              │
//!                          └──────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod net;

// Traffic management
pub mod load_balancer;
pub mod telemetry;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use error::{RouteError, StartupError};
pub use http::HttpServer;
pub use lifecycle::{LifecycleController, Shutdown, ShutdownReport};
