//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files. Every
//! section carries defaults so an empty file yields the stock deployment:
//! four backends weighted `{5, 10, 3, 2}` behind a round-robin router on `:8000`.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the router.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration.
    pub listener: ListenerConfig,

    /// Backend selection algorithm.
    pub algorithm: Algorithm,

    /// Backend servers in selection order.
    pub backends: Vec<BackendConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Outbound connection pool limits.
    pub pool: PoolConfig,

    /// Latency telemetry pipeline.
    pub telemetry: TelemetryConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            algorithm: Algorithm::default(),
            backends: default_backends(),
            timeouts: TimeoutConfig::default(),
            pool: PoolConfig::default(),
            telemetry: TelemetryConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Maximum requests handled at once; further requests wait for a slot.
    pub max_in_flight: usize,

    /// Time a client gets to send a complete request head.
    pub header_read_timeout_ms: u64,

    /// Largest accepted request head in bytes.
    pub max_header_bytes: usize,
}

impl ListenerConfig {
    pub fn header_read_timeout(&self) -> Duration {
        Duration::from_millis(self.header_read_timeout_ms)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            max_in_flight: 10_000,
            header_read_timeout_ms: 10_000,
            max_header_bytes: 1 << 20,
        }
    }
}

/// Load balancing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    RoundRobin,
    WeightedRoundRobin,
    LeastConnections,
}

impl Algorithm {
    /// Parse an algorithm name, falling back to round robin for anything
    /// unrecognized.
    pub fn parse_lenient(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "round_robin" => Algorithm::RoundRobin,
            "weighted_round_robin" => Algorithm::WeightedRoundRobin,
            "least_connections" => Algorithm::LeastConnections,
            other => {
                if !other.is_empty() {
                    tracing::warn!(algorithm = %other, "Unknown algorithm, using round_robin");
                }
                Algorithm::RoundRobin
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::RoundRobin => "round_robin",
            Algorithm::WeightedRoundRobin => "weighted_round_robin",
            Algorithm::LeastConnections => "least_connections",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Backend address, either a URL (`http://backend1:8080`) or `host:port`.
    pub address: String,

    /// Weight for weighted round robin (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl BackendConfig {
    pub fn new(address: impl Into<String>, weight: u32) -> Self {
        Self {
            address: address.into(),
            weight,
        }
    }
}

fn default_weight() -> u32 {
    1
}

fn default_backends() -> Vec<BackendConfig> {
    vec![
        BackendConfig::new("http://backend1:8080", 5),
        BackendConfig::new("http://backend2:8080", 10),
        BackendConfig::new("http://backend3:8080", 3),
        BackendConfig::new("http://backend4:8080", 2),
    ]
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Ceiling for a single forwarded request in milliseconds.
    pub request_ms: u64,

    /// Maximum wait for upstream response headers in milliseconds.
    pub response_header_ms: u64,

    /// Grace period for in-flight requests during shutdown in milliseconds.
    pub shutdown_grace_ms: u64,
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    pub fn response_header(&self) -> Duration {
        Duration::from_millis(self.response_header_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_ms: 5_000,
            response_header_ms: 10_000,
            shutdown_grace_ms: 5_000,
        }
    }
}

/// Outbound connection pool limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Idle connections kept across all backends.
    pub max_idle_total: usize,

    /// Idle connections kept per backend.
    pub max_idle_per_backend: usize,

    /// Concurrent connections per backend (idle + in use).
    pub max_per_backend: usize,

    /// Seconds before an idle connection is closed.
    pub idle_timeout_secs: u64,
}

impl PoolConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_total: 1000,
            max_idle_per_backend: 250,
            max_per_backend: 500,
            idle_timeout_secs: 90,
        }
    }
}

/// Telemetry pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Record latency telemetry at all.
    pub enabled: bool,

    /// Bounded queue capacity; records beyond it are dropped.
    pub queue_capacity: usize,

    /// Records per batch before an immediate write.
    pub batch_size: usize,

    /// Partial batch write interval in milliseconds.
    pub batch_interval_ms: u64,

    /// Safety flush interval in milliseconds.
    pub flush_interval_ms: u64,

    /// Destination for batches.
    pub sink: SinkConfig,
}

impl TelemetryConfig {
    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 5000,
            batch_size: 100,
            batch_interval_ms: 10,
            flush_interval_ms: 50,
            sink: SinkConfig::default(),
        }
    }
}

/// Where telemetry batches go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    #[default]
    File,
    /// Structured log stream through `tracing`.
    Stdout,
    None,
}

/// Line format of the file sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SinkFormat {
    #[default]
    Text,
    Csv,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SinkConfig {
    pub kind: SinkKind,
    pub path: String,
    pub format: SinkFormat,
    /// Write buffer size in bytes.
    pub buffer_bytes: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::File,
            path: "logs/load_balancer.log".to_string(),
            format: SinkFormat::Text,
            buffer_bytes: 128 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
