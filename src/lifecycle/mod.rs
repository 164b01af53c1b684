//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (controller.rs):
//!     Validate config → Telemetry → Router context → Metrics → Bind listener
//!
//! Shutdown (controller.rs, shutdown.rs):
//!     Trigger → Stop accepting → Drain (grace period) → Cancel the rest
//!             → Drain telemetry → Close pool → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listener
//! - Ordered shutdown: stop accept, drain, cancel, flush, close
//! - Shutdown has a deadline: forced cancellation after the grace period

pub mod controller;
pub mod shutdown;
pub mod signals;
pub mod state;

pub use controller::{LifecycleController, ShutdownReport};
pub use shutdown::Shutdown;
pub use state::{LifecycleState, StateCell};
