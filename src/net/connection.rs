//! In-flight request tracking for graceful shutdown.
//!
//! # Responsibilities
//! - Count requests currently inside the dispatcher
//! - Let the lifecycle controller wait for the count to reach zero
//! - Broadcast forced cancellation once the grace period is over

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Notify};

#[derive(Debug)]
struct TrackerInner {
    active: AtomicU64,
    idle: Notify,
    cancel: watch::Sender<bool>,
}

/// Tracks in-flight requests. Clones share the same counters.
#[derive(Debug, Clone)]
pub struct InFlightTracker {
    inner: Arc<TrackerInner>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            inner: Arc::new(TrackerInner {
                active: AtomicU64::new(0),
                idle: Notify::new(),
                cancel,
            }),
        }
    }

    /// Record a new in-flight request. The guard decrements on drop.
    pub fn track(&self) -> InFlightGuard {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Current in-flight count.
    pub fn active(&self) -> u64 {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Resolve once no request is in flight.
    pub async fn wait_idle(&self) {
        loop {
            // Registered before the check so a wakeup in between is not lost.
            let notified = self.inner.idle.notified();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Ask every in-flight request to abort. Returns how many were in flight.
    pub fn cancel_all(&self) -> u64 {
        self.inner.cancel.send_replace(true);
        self.active()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancel.borrow()
    }

    /// Resolve when [`cancel_all`](Self::cancel_all) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.cancel.subscribe();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for InFlightTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Held by the dispatcher for the duration of one request.
#[derive(Debug)]
pub struct InFlightGuard {
    inner: Arc<TrackerInner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.inner.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn tracker_counts() {
        let tracker = InFlightTracker::new();
        assert_eq!(tracker.active(), 0);

        let guard1 = tracker.track();
        let guard2 = tracker.track();
        assert_eq!(tracker.active(), 2);

        drop(guard1);
        assert_eq!(tracker.active(), 1);
        drop(guard2);
        assert_eq!(tracker.active(), 0);
    }

    #[tokio::test]
    async fn wait_idle_resolves_when_last_guard_drops() {
        let tracker = InFlightTracker::new();
        let guard = tracker.track();

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_idle().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait_idle did not resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn cancel_all_wakes_waiters() {
        let tracker = InFlightTracker::new();
        let _guard = tracker.track();
        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.cancelled().await })
        };

        assert_eq!(tracker.cancel_all(), 1);
        assert!(tracker.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancelled did not resolve")
            .unwrap();

        // Late subscribers see the cancellation immediately.
        tokio::time::timeout(Duration::from_millis(100), tracker.cancelled())
            .await
            .unwrap();
    }
}
