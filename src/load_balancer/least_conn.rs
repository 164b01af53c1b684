//! Least Connections load balancing strategy.

use std::sync::Arc;

use crate::error::RouteError;
use crate::load_balancer::{Backend, BackendRegistry, LoadBalancer};

/// Least connections selector.
/// Selects the backend with the minimum number of active connections.
/// Nothing is reserved: two concurrent selections may land on the same
/// backend before either increments its count.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastConnections {
    fn name(&self) -> &'static str {
        "LeastConnections"
    }

    fn select(&self, registry: &BackendRegistry) -> Result<Arc<Backend>, RouteError> {
        // min_by_key keeps the first minimum, so ties go to registration order.
        registry
            .iter()
            .min_by_key(|b| b.active_connections())
            .cloned()
            .ok_or(RouteError::NoBackendAvailable)
    }
}
