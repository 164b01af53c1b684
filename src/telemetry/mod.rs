//! Latency telemetry pipeline.
//!
//! # Data Flow
//! ```text
//! dispatcher (many tasks)
//!     → queue.rs (bounded, try_send, drop when full)
//!     → batcher.rs (one background task: size / short timer / long timer)
//!     → sink.rs (file, tracing stream, memory, none)
//! ```
//!
//! # Design Decisions
//! - Producers never wait: under overload telemetry degrades, latency does not
//! - The queue is the only synchronization point between producers and consumer
//! - Sink failures are counted and logged, never propagated
//! - `shutdown()` is the only blocking operation and is idempotent

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::TelemetryConfig;

pub mod batcher;
pub mod queue;
pub mod record;
pub mod sink;

pub use batcher::{BatchConsumer, BatchSettings};
pub use queue::{Enqueue, TelemetryQueue, TelemetryStats, TelemetryStatsSnapshot};
pub use record::TelemetryRecord;
pub use sink::{build_sink, FileSink, MemorySink, NullSink, TelemetrySink, TracingSink};

/// Queue, consumer task and shutdown control.
pub struct TelemetryPipeline {
    queue: TelemetryQueue,
    stats: Arc<TelemetryStats>,
    shutdown_tx: watch::Sender<bool>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl TelemetryPipeline {
    /// Spawn the consumer task with settings from configuration.
    pub fn spawn(config: &TelemetryConfig, sink: Box<dyn TelemetrySink>) -> Self {
        let settings = BatchSettings {
            batch_size: config.batch_size,
            batch_interval: config.batch_interval(),
            flush_interval: config.flush_interval(),
        };
        Self::spawn_with(config.queue_capacity, settings, sink)
    }

    /// Spawn the consumer task. Must be called inside a Tokio runtime.
    pub fn spawn_with(capacity: usize, settings: BatchSettings, sink: Box<dyn TelemetrySink>) -> Self {
        let stats = Arc::new(TelemetryStats::new());
        let (queue, rx) = TelemetryQueue::bounded(capacity, stats.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tracing::info!(
            sink = sink.name(),
            capacity = queue.capacity(),
            batch_size = settings.batch_size,
            batch_interval_ms = settings.batch_interval.as_millis() as u64,
            flush_interval_ms = settings.flush_interval.as_millis() as u64,
            "Telemetry pipeline starting"
        );

        let consumer = BatchConsumer::new(rx, sink, settings, stats.clone(), shutdown_rx);
        let handle = tokio::spawn(consumer.run());

        Self {
            queue,
            stats,
            shutdown_tx,
            consumer: Mutex::new(Some(handle)),
        }
    }

    /// Producer handle for dispatch tasks.
    pub fn queue(&self) -> TelemetryQueue {
        self.queue.clone()
    }

    pub fn stats(&self) -> TelemetryStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop accepting records, drain everything buffered, flush the sink.
    ///
    /// Returns once the consumer has exited. Later and concurrent calls wait
    /// for the same drain and return the final counters.
    pub async fn shutdown(&self) -> TelemetryStatsSnapshot {
        let mut consumer = self.consumer.lock().await;
        if let Some(handle) = consumer.take() {
            let _ = self.shutdown_tx.send(true);
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Telemetry consumer task failed");
            }
            let stats = self.stats.snapshot();
            tracing::info!(
                accepted = stats.accepted,
                dropped = stats.dropped,
                flushed = stats.flushed,
                sink_errors = stats.sink_errors,
                "Telemetry pipeline drained"
            );
        }
        self.stats.snapshot()
    }
}
