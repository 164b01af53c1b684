//! Backend registry.
//!
//! Fixed, ordered set of backends. Membership is decided by
//! [`RegistryBuilder`] at startup and frozen afterwards; only per-backend
//! counters change while the router runs.

use std::sync::Arc;

use crate::config::BackendConfig;
use crate::load_balancer::backend::{Backend, BackendConnectionGuard, BackendSnapshot, InvalidBackend};

/// Collects backends in registration order.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    backends: Vec<Arc<Backend>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend. Order of registration is the round robin order.
    pub fn register(mut self, address: &str, weight: u32) -> Result<Self, InvalidBackend> {
        let id = self.backends.len();
        self.backends.push(Arc::new(Backend::new(id, address, weight)?));
        Ok(self)
    }

    pub fn build(self) -> BackendRegistry {
        BackendRegistry {
            backends: self.backends,
        }
    }
}

/// Immutable membership, mutable per-backend state.
#[derive(Debug)]
pub struct BackendRegistry {
    backends: Vec<Arc<Backend>>,
}

impl BackendRegistry {
    /// Build a registry from configuration entries.
    pub fn from_config(configs: &[BackendConfig]) -> Result<Self, InvalidBackend> {
        let builder = configs
            .iter()
            .try_fold(RegistryBuilder::new(), |builder, config| {
                builder.register(&config.address, config.weight)
            })?;
        let registry = builder.build();

        for backend in registry.iter() {
            tracing::info!(
                backend = %backend,
                weight = backend.weight(),
                "Backend registered"
            );
        }
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&Arc<Backend>> {
        self.backends.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Backend>> {
        self.backends.iter()
    }

    /// Sum of all static weights.
    pub fn total_weight(&self) -> i64 {
        self.backends.iter().map(|b| b.weight()).sum()
    }

    pub fn increment_connections(&self, backend: &Backend) {
        backend.inc_connections();
    }

    pub fn decrement_connections(&self, backend: &Backend) {
        backend.dec_connections();
    }

    /// Scoped increment: the returned guard decrements on drop.
    pub fn acquire(&self, backend: &Arc<Backend>) -> BackendConnectionGuard {
        backend.acquire()
    }

    pub fn snapshot(&self) -> Vec<BackendSnapshot> {
        self.backends.iter().map(|b| b.snapshot()).collect()
    }
}
