//! Per-request latency record.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One completed (or attempted) request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    /// Backend identity (`host:port`).
    pub backend: Arc<str>,
    /// Wall-clock time from selection to forward completion.
    #[serde(serialize_with = "serialize_latency_ms", rename = "latency_ms")]
    pub latency: Duration,
    /// When the request completed.
    pub timestamp: DateTime<Utc>,
    /// Status returned to the caller.
    pub status: u16,
}

impl TelemetryRecord {
    pub fn new(backend: Arc<str>, latency: Duration, status: u16) -> Self {
        Self {
            backend,
            latency,
            timestamp: Utc::now(),
            status,
        }
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }
}

fn serialize_latency_ms<S: serde::Serializer>(latency: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(latency.as_secs_f64() * 1000.0)
}
