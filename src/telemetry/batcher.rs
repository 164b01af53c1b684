//! Background batch consumer.
//!
//! A single task drains the telemetry queue into a buffer and hands the
//! buffer to the sink when any of these fire with records waiting:
//! - the buffer reaches `batch_size`
//! - the short batch timer ticks
//! - the long flush timer ticks (also flushes the sink itself)
//!
//! On shutdown the queue is closed, everything still queued is drained, and
//! the sink is flushed one last time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::error::SinkError;
use crate::observability::metrics;
use crate::telemetry::queue::TelemetryStats;
use crate::telemetry::record::TelemetryRecord;
use crate::telemetry::sink::TelemetrySink;

/// Minimum spacing between sink error log lines.
const ERROR_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Batch thresholds.
#[derive(Debug, Clone, Copy)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub batch_interval: Duration,
    pub flush_interval: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            batch_interval: Duration::from_millis(10),
            flush_interval: Duration::from_millis(50),
        }
    }
}

/// Logs sink failures at most once per interval, with a suppressed count.
#[derive(Debug, Default)]
struct ErrorLog {
    last: Option<Instant>,
    suppressed: u64,
}

impl ErrorLog {
    fn report(&mut self, sink: &str, error: &SinkError, records: usize) {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < ERROR_LOG_INTERVAL => {
                self.suppressed += 1;
            }
            _ => {
                tracing::warn!(
                    sink = sink,
                    error = %error,
                    records = records,
                    suppressed = self.suppressed,
                    "Telemetry sink write failed"
                );
                self.last = Some(now);
                self.suppressed = 0;
            }
        }
    }
}

/// Owns the receiving end of the queue and the sink.
pub struct BatchConsumer {
    rx: mpsc::Receiver<TelemetryRecord>,
    sink: Box<dyn TelemetrySink>,
    buffer: Vec<TelemetryRecord>,
    settings: BatchSettings,
    stats: Arc<TelemetryStats>,
    shutdown: watch::Receiver<bool>,
    errors: ErrorLog,
}

impl BatchConsumer {
    pub fn new(
        rx: mpsc::Receiver<TelemetryRecord>,
        sink: Box<dyn TelemetrySink>,
        settings: BatchSettings,
        stats: Arc<TelemetryStats>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let batch_size = settings.batch_size.max(1);
        Self {
            rx,
            sink,
            buffer: Vec::with_capacity(batch_size),
            settings: BatchSettings {
                batch_size,
                ..settings
            },
            stats,
            shutdown,
            errors: ErrorLog::default(),
        }
    }

    /// Run until shutdown is signalled or every producer is gone, then drain.
    pub async fn run(mut self) {
        let start = Instant::now();
        let mut batch_tick = time::interval_at(
            start + self.settings.batch_interval,
            self.settings.batch_interval,
        );
        batch_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut flush_tick = time::interval_at(
            start + self.settings.flush_interval,
            self.settings.flush_interval,
        );
        flush_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(
            sink = self.sink.name(),
            batch_size = self.settings.batch_size,
            "Telemetry consumer started"
        );

        // Shutdown and timers are polled before records, so a busy queue
        // cannot hold back periodic writes. Nothing is lost: `drain` empties
        // the channel after the loop.
        loop {
            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                _ = flush_tick.tick() => {
                    self.write_buffer();
                    self.flush_sink();
                }
                _ = batch_tick.tick() => {
                    self.write_buffer();
                }
                received = self.rx.recv() => match received {
                    Some(record) => {
                        self.buffer.push(record);
                        if self.buffer.len() >= self.settings.batch_size {
                            self.write_buffer();
                        }
                    }
                    None => break,
                },
            }
        }

        self.drain().await;
    }

    /// Stop accepting records and write out everything still queued.
    async fn drain(&mut self) {
        self.rx.close();
        while let Some(record) = self.rx.recv().await {
            self.buffer.push(record);
            if self.buffer.len() >= self.settings.batch_size {
                self.write_buffer();
            }
        }
        self.write_buffer();
        self.flush_sink();
        tracing::debug!(sink = self.sink.name(), "Telemetry consumer drained");
    }

    /// Hand the buffer to the sink and clear it. No-op when empty.
    fn write_buffer(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let count = self.buffer.len();
        if let Err(e) = self.sink.write_batch(&self.buffer) {
            self.stats.record_sink_error();
            metrics::record_sink_error();
            self.errors.report(self.sink.name(), &e, count);
        }
        self.stats.record_batch(count as u64);
        metrics::record_telemetry_flushed(count as u64);
        self.buffer.clear();
    }

    fn flush_sink(&mut self) {
        if let Err(e) = self.sink.flush() {
            self.stats.record_sink_error();
            metrics::record_sink_error();
            self.errors.report(self.sink.name(), &e, 0);
        }
    }
}
