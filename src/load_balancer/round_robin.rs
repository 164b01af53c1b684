//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::RouteError;
use crate::load_balancer::{Backend, BackendRegistry, LoadBalancer};

/// Round-robin selector.
/// Every call takes a unique slot from a shared counter; the slot modulo the
/// registry size is the chosen index.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn name(&self) -> &'static str {
        "RoundRobin"
    }

    fn select(&self, registry: &BackendRegistry) -> Result<Arc<Backend>, RouteError> {
        let len = registry.len();
        if len == 0 {
            return Err(RouteError::NoBackendAvailable);
        }

        // fetch_add wraps on overflow, which only breaks the cycle once per 2^64 calls.
        let slot = self.counter.fetch_add(1, Ordering::Relaxed);
        registry
            .get(slot % len)
            .cloned()
            .ok_or(RouteError::NoBackendAvailable)
    }
}
