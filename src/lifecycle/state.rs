//! Router lifecycle state machine.
//!
//! # States
//! - Starting: context built, listener not yet serving
//! - Running: serving requests
//! - Draining: listener closed, in-flight requests finishing
//! - Stopped: telemetry drained, pool closed
//!
//! # State Transitions
//! ```text
//! Starting → Running → Draining → Stopped
//! ```
//!
//! Transitions only move forward; a request to go back is ignored.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LifecycleState {
    Starting = 0,
    Running = 1,
    Draining = 2,
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Starting,
            1 => LifecycleState::Running,
            2 => LifecycleState::Draining,
            _ => LifecycleState::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, lock-free holder of the current state.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(LifecycleState::Starting as u8))
    }

    pub fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `next` if it is ahead of the current state.
    ///
    /// Returns `true` when the state changed.
    pub fn advance(&self, next: LifecycleState) -> bool {
        let previous = self.0.fetch_max(next as u8, Ordering::AcqRel);
        let changed = previous < next as u8;
        if changed {
            tracing::info!(
                from = %LifecycleState::from_u8(previous),
                to = %next,
                "Lifecycle state changed"
            );
        }
        changed
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
