//! HTTP layer subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection (net::listener)
//!     → server.rs (router, middleware stack)
//!     → request.rs (x-request-id assigned or kept)
//!     → dispatcher.rs (select, forward, telemetry)
//!     → Response to client
//! ```
//!
//! # Design Decisions
//! - No path routing: every method and path is proxied as-is
//! - Routing failures become 503 responses here and never escape the handler
//! - Handlers share one `RouterContext` through Axum state, no globals

pub mod dispatcher;
pub mod request;
pub mod server;

pub use dispatcher::dispatch;
pub use request::{request_id, UuidRequestId, X_REQUEST_ID};
pub use server::{build_router, HttpServer, RouterContext};
