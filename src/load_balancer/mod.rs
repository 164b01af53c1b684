//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request arrives at dispatcher
//!     → registry.rs (fixed, ordered backend set)
//!     → Apply load balancing algorithm:
//!         - round_robin.rs (rotate through backends)
//!         - weighted.rs (credit-based smooth weighted rotation)
//!         - least_conn.rs (pick backend with fewest connections)
//!     → backend.rs (connection guard held for the request)
//! ```
//!
//! # Design Decisions
//! - One strategy instance per router, shared by every request task
//! - Strategies never lock; all shared state is atomic
//! - Selection does not reserve a slot; the dispatcher increments afterwards

use std::fmt::Debug;
use std::sync::Arc;

use crate::config::Algorithm;
use crate::error::RouteError;

pub mod backend;
pub mod least_conn;
pub mod registry;
pub mod round_robin;
pub mod weighted;

pub use backend::{Backend, BackendConnectionGuard, BackendSnapshot, InvalidBackend};
pub use least_conn::LeastConnections;
pub use registry::{BackendRegistry, RegistryBuilder};
pub use round_robin::RoundRobin;
pub use weighted::WeightedRoundRobin;

/// A backend selection strategy.
pub trait LoadBalancer: Send + Sync + Debug {
    /// Algorithm name for logs.
    fn name(&self) -> &'static str;

    /// Pick a backend. Fails only when the registry is empty.
    fn select(&self, registry: &BackendRegistry) -> Result<Arc<Backend>, RouteError>;
}

/// Build the strategy for the configured algorithm.
pub fn from_algorithm(algorithm: Algorithm) -> Box<dyn LoadBalancer> {
    match algorithm {
        Algorithm::RoundRobin => Box::new(RoundRobin::new()),
        Algorithm::WeightedRoundRobin => Box::new(WeightedRoundRobin::new()),
        Algorithm::LeastConnections => Box::new(LeastConnections::new()),
    }
}
