//! Producer side of the telemetry pipeline.
//!
//! Backpressure policy: a full queue drops the new record. Request handling
//! never waits on telemetry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::observability::metrics;
use crate::telemetry::record::TelemetryRecord;

/// Outcome of [`TelemetryQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Accepted,
    /// Queue full or closed; the record was discarded.
    Dropped,
}

/// Counters shared by producers and the consumer.
#[derive(Debug, Default)]
pub struct TelemetryStats {
    /// Records accepted into the queue.
    pub accepted: AtomicU64,
    /// Records discarded at enqueue time.
    pub dropped: AtomicU64,
    /// Records handed to the sink (successfully or not).
    pub flushed: AtomicU64,
    /// Batches handed to the sink.
    pub batches: AtomicU64,
    /// Failed sink writes and flushes.
    pub sink_errors: AtomicU64,
}

impl TelemetryStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_batch(&self, records: u64) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.flushed.fetch_add(records, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_sink_error(&self) {
        self.sink_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetryStatsSnapshot {
        let accepted = self.accepted.load(Ordering::Acquire);
        let flushed = self.flushed.load(Ordering::Acquire);
        TelemetryStatsSnapshot {
            accepted,
            dropped: self.dropped.load(Ordering::Relaxed),
            flushed,
            batches: self.batches.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
            buffered: accepted.saturating_sub(flushed),
        }
    }
}

/// Point-in-time copy of [`TelemetryStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetryStatsSnapshot {
    pub accepted: u64,
    pub dropped: u64,
    pub flushed: u64,
    pub batches: u64,
    pub sink_errors: u64,
    /// Accepted records not yet handed to the sink.
    pub buffered: u64,
}

/// Cloneable, non-blocking handle used by every dispatch task.
#[derive(Debug, Clone)]
pub struct TelemetryQueue {
    tx: mpsc::Sender<TelemetryRecord>,
    stats: Arc<TelemetryStats>,
}

impl TelemetryQueue {
    /// Create a queue of `capacity` records and the receiver the consumer drains.
    pub fn bounded(
        capacity: usize,
        stats: Arc<TelemetryStats>,
    ) -> (Self, mpsc::Receiver<TelemetryRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, stats }, rx)
    }

    /// Offer a record. Never blocks and never fails the caller.
    pub fn enqueue(&self, record: TelemetryRecord) -> Enqueue {
        match self.tx.try_send(record) {
            Ok(()) => {
                self.stats.accepted.fetch_add(1, Ordering::Release);
                Enqueue::Accepted
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_telemetry_dropped();
                Enqueue::Dropped
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Records currently waiting in the queue.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> &Arc<TelemetryStats> {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn record(i: u64) -> TelemetryRecord {
        TelemetryRecord::new("backend1:8080".into(), Duration::from_micros(i), 200)
    }

    #[test]
    fn overflow_drops_without_blocking() {
        let stats = Arc::new(TelemetryStats::new());
        let (queue, _rx) = TelemetryQueue::bounded(5000, stats.clone());

        let start = Instant::now();
        let outcomes: Vec<Enqueue> = (0..6000).map(|i| queue.enqueue(record(i))).collect();
        let elapsed = start.elapsed();

        assert_eq!(outcomes.iter().filter(|o| **o == Enqueue::Accepted).count(), 5000);
        assert!(outcomes[5000..].iter().all(|o| *o == Enqueue::Dropped));
        assert_eq!(queue.len(), 5000);

        let snap = stats.snapshot();
        assert_eq!(snap.accepted, 5000);
        assert_eq!(snap.dropped, 1000);
        assert_eq!(snap.buffered, 5000);
        assert!(elapsed < Duration::from_secs(1), "enqueue took {:?}", elapsed);
    }

    #[test]
    fn closed_queue_drops() {
        let stats = Arc::new(TelemetryStats::new());
        let (queue, rx) = TelemetryQueue::bounded(4, stats.clone());
        drop(rx);

        assert_eq!(queue.enqueue(record(1)), Enqueue::Dropped);
        assert_eq!(stats.snapshot().dropped, 1);
    }
}
