//! Configuration validation.
//!
//! Serde handles syntax; this module checks values. All errors are collected
//! rather than stopping at the first one.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;
use crate::load_balancer::backend::parse_backend_url;

/// Smallest read buffer the HTTP/1 server accepts.
const MIN_HEADER_BYTES: usize = 8192;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
///
/// An empty backend list is accepted: the router starts and answers every
/// request with 503.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.listener.max_in_flight == 0 {
        errors.push(ValidationError::new(
            "listener.max_in_flight",
            "must be greater than zero",
        ));
    }

    if config.listener.header_read_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "listener.header_read_timeout_ms",
            "must be greater than zero",
        ));
    }

    if config.listener.max_header_bytes < MIN_HEADER_BYTES {
        errors.push(ValidationError::new(
            "listener.max_header_bytes",
            format!("must be at least {}", MIN_HEADER_BYTES),
        ));
    }

    for (i, backend) in config.backends.iter().enumerate() {
        if backend.weight == 0 {
            errors.push(ValidationError::new(
                format!("backends[{}].weight", i),
                "weight must be positive",
            ));
        }
        if let Err(reason) = parse_backend_url(&backend.address) {
            errors.push(ValidationError::new(format!("backends[{}].address", i), reason));
        }
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("timeouts.request_ms", timeouts.request_ms),
        ("timeouts.response_header_ms", timeouts.response_header_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    let pool = &config.pool;
    if pool.max_per_backend == 0 {
        errors.push(ValidationError::new("pool.max_per_backend", "must be greater than zero"));
    }
    if pool.max_idle_per_backend > pool.max_per_backend {
        errors.push(ValidationError::new(
            "pool.max_idle_per_backend",
            "cannot exceed pool.max_per_backend",
        ));
    }

    let telemetry = &config.telemetry;
    if telemetry.enabled {
        for (field, value) in [
            ("telemetry.queue_capacity", telemetry.queue_capacity as u64),
            ("telemetry.batch_size", telemetry.batch_size as u64),
            ("telemetry.batch_interval_ms", telemetry.batch_interval_ms),
            ("telemetry.flush_interval_ms", telemetry.flush_interval_ms),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(field, "must be greater than zero"));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BackendConfig;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn empty_backend_list_is_valid() {
        let mut config = ProxyConfig::default();
        config.backends.clear();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.backends = vec![BackendConfig::new("ftp://", 0)];
        config.telemetry.batch_size = 0;
        config.pool.max_idle_per_backend = config.pool.max_per_backend + 1;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "backends[0].weight",
                "backends[0].address",
                "pool.max_idle_per_backend",
                "telemetry.batch_size",
            ]
        );
    }

    #[test]
    fn rejects_unusable_inbound_limits() {
        let mut config = ProxyConfig::default();
        config.listener.header_read_timeout_ms = 0;
        config.listener.max_header_bytes = 4096;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["listener.header_read_timeout_ms", "listener.max_header_bytes"]
        );
    }
}
