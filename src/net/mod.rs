//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! listener.rs (accept, header limits, ConnectInfo)
//!     → Router and dispatcher
//! Dispatcher picks a backend
//!     → connection.rs (in-flight accounting, forced cancellation)
//!     → pool.rs (per-backend slot, URI rewrite, deadline)
//!     → shared hyper client (keep-alive connections)
//!     → Backend server
//! ```
//!
//! # Design Decisions
//! - One client for all backends; partitions are per-backend semaphores
//! - Every forward has a deadline; expiry is an upstream failure, not a hang
//! - Each request is tracked for graceful shutdown

pub mod connection;
pub mod listener;
pub mod pool;

pub use connection::{InFlightGuard, InFlightTracker};
pub use listener::{serve_connections, ServerLimits};
pub use pool::{hold_until_complete, ConnectionPool};
