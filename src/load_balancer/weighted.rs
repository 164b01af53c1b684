//! Weighted round-robin load balancing strategy.
//!
//! Credit-based smooth weighted rotation. On every call each backend's credit
//! grows by its weight; the backend with the highest credit wins and is
//! charged the total weight. Over any `T = sum(weights)` consecutive calls a
//! backend of weight `w` is picked exactly `w` times, with picks spread across
//! the window instead of clustered.
//!
//! Each credit update is an independent atomic operation, so concurrent calls
//! behave like some serialization of their adds and debits.

use std::sync::Arc;

use crate::error::RouteError;
use crate::load_balancer::{Backend, BackendRegistry, LoadBalancer};

/// Weighted round-robin selector. Stateless; credits live on the backends.
#[derive(Debug, Default)]
pub struct WeightedRoundRobin;

impl WeightedRoundRobin {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for WeightedRoundRobin {
    fn name(&self) -> &'static str {
        "WeightedRoundRobin"
    }

    fn select(&self, registry: &BackendRegistry) -> Result<Arc<Backend>, RouteError> {
        let mut best: Option<(&Arc<Backend>, i64)> = None;
        let mut total = 0;

        // Every backend accrues, not only the current leader.
        for backend in registry.iter() {
            let credit = backend.accrue_credit();
            total += backend.weight();
            match best {
                Some((_, best_credit)) if credit <= best_credit => {}
                _ => best = Some((backend, credit)),
            }
        }

        let (winner, _) = best.ok_or(RouteError::NoBackendAvailable)?;
        winner.debit_credit(total);
        Ok(Arc::clone(winner))
    }
}
