//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream server
//! - Track active connections (for Least Connections LB)
//! - Hold the weight credit used by Weighted Round Robin
//!
//! Both counters are mutated with atomic read-modify-write only; no lock
//! guards a backend.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use url::Url;

/// A backend address that could not be turned into an upstream URL.
#[derive(Debug, Error)]
#[error("invalid backend address '{address}': {reason}")]
pub struct InvalidBackend {
    pub address: String,
    pub reason: String,
}

/// Parse `http://host:port` or a bare `host:port` into an upstream URL.
pub fn parse_backend_url(address: &str) -> Result<Url, String> {
    let candidate = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    let url = Url::parse(&candidate).map_err(|e| e.to_string())?;
    if url.scheme() != "http" {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(url)
}

/// A single backend server.
#[derive(Debug)]
pub struct Backend {
    /// Position in the registry (registration order).
    id: usize,
    /// Upstream base URL.
    url: Url,
    /// `host:port`, used as the backend identity in logs and telemetry.
    authority: Arc<str>,
    /// Static weight for Weighted Round Robin.
    weight: i64,
    /// Number of currently active connections.
    active_connections: AtomicUsize,
    /// Accumulated Weighted Round Robin entitlement.
    weight_credit: AtomicI64,
}

impl Backend {
    /// Create a new backend. Weight is clamped to at least 1.
    pub fn new(id: usize, address: &str, weight: u32) -> Result<Self, InvalidBackend> {
        let url = parse_backend_url(address).map_err(|reason| InvalidBackend {
            address: address.to_string(),
            reason,
        })?;
        let host = url.host_str().unwrap_or_default();
        let authority: Arc<str> = match url.port_or_known_default() {
            Some(port) => format!("{}:{}", host, port).into(),
            None => host.into(),
        };

        Ok(Self {
            id,
            url,
            authority,
            weight: i64::from(weight.max(1)),
            active_connections: AtomicUsize::new(0),
            weight_credit: AtomicI64::new(0),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Stable identity of this backend (`host:port`).
    pub fn authority(&self) -> &Arc<str> {
        &self.authority
    }

    pub fn weight(&self) -> i64 {
        self.weight
    }

    /// Get the current number of active connections.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Acquire)
    }

    /// Increment active connection count.
    pub fn inc_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrement active connection count, never going below zero.
    pub fn dec_connections(&self) {
        let result = self
            .active_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if result.is_err() {
            tracing::error!(backend = %self.authority, "Connection count underflow ignored");
        }
    }

    /// Increment the connection count and return a guard that undoes it on drop.
    pub fn acquire(self: &Arc<Self>) -> BackendConnectionGuard {
        self.inc_connections();
        BackendConnectionGuard {
            backend: Arc::clone(self),
        }
    }

    pub fn weight_credit(&self) -> i64 {
        self.weight_credit.load(Ordering::Acquire)
    }

    /// Add this backend's weight to its credit, returning the new credit.
    pub(crate) fn accrue_credit(&self) -> i64 {
        self.weight_credit.fetch_add(self.weight, Ordering::AcqRel) + self.weight
    }

    /// Charge a selection against this backend's credit.
    pub(crate) fn debit_credit(&self, amount: i64) {
        self.weight_credit.fetch_sub(amount, Ordering::AcqRel);
    }

    pub fn snapshot(&self) -> BackendSnapshot {
        BackendSnapshot {
            address: self.authority.to_string(),
            weight: self.weight,
            active_connections: self.active_connections(),
            weight_credit: self.weight_credit(),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority)
    }
}

/// Point-in-time view of a backend's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSnapshot {
    pub address: String,
    pub weight: i64,
    pub active_connections: usize,
    pub weight_credit: i64,
}

/// A RAII guard that manages the active connection count.
///
/// The decrement runs on every exit path, including unwinding.
#[derive(Debug)]
pub struct BackendConnectionGuard {
    backend: Arc<Backend>,
}

impl BackendConnectionGuard {
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }
}

impl Deref for BackendConnectionGuard {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for BackendConnectionGuard {
    fn drop(&mut self) {
        self.backend.dec_connections();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_url_and_bare_addresses() {
        let b = Backend::new(0, "http://backend1:8080", 5).unwrap();
        assert_eq!(&**b.authority(), "backend1:8080");
        assert_eq!(b.weight(), 5);

        let b = Backend::new(1, "127.0.0.1:9000", 1).unwrap();
        assert_eq!(b.url().as_str(), "http://127.0.0.1:9000/");

        let b = Backend::new(2, "http://backend", 1).unwrap();
        assert_eq!(&**b.authority(), "backend:80");
    }

    #[test]
    fn rejects_unsupported_addresses() {
        assert!(Backend::new(0, "https://secure:443", 1).is_err());
        assert!(Backend::new(0, "http://", 1).is_err());
    }

    #[test]
    fn guard_balances_connection_count() {
        let b = Arc::new(Backend::new(0, "127.0.0.1:8080", 1).unwrap());
        {
            let _g1 = b.acquire();
            let _g2 = b.acquire();
            assert_eq!(b.active_connections(), 2);
        }
        assert_eq!(b.active_connections(), 0);
    }

    #[test]
    fn guard_decrements_on_panic() {
        let b = Arc::new(Backend::new(0, "127.0.0.1:8080", 1).unwrap());
        let b2 = b.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = b2.acquire();
            panic!("handler blew up");
        });
        assert!(result.is_err());
        assert_eq!(b.active_connections(), 0);
    }

    #[test]
    fn decrement_never_goes_negative() {
        let b = Backend::new(0, "127.0.0.1:8080", 1).unwrap();
        b.dec_connections();
        assert_eq!(b.active_connections(), 0);
    }
}
