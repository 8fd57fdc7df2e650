//! Metrics collector: per-window acquisition counters.
//!
//! Counters are plain atomics so the acquire path never blocks on them.
//! Taking a snapshot swaps every counter back to zero under the window
//! lock, so each increment lands in exactly one window.
//!
//! The window also remembers the capacity target it opened with. A
//! snapshot reports that value as its `target`, not the capacity at the
//! moment the window closes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use crate::snapshot::{MetricSnapshot, PoolGauges};

/// Counter values for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowCounts {
    pub timeout_count: u64,
    pub error_count: u64,
    pub overload_count: u64,
    pub acquisition_count: u64,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    /// Capacity target when the window opened. `None` until known.
    target: Option<usize>,
}

/// Collects the rolling counters of a single pool.
#[derive(Debug)]
pub struct MetricsCollector {
    timeouts: AtomicU64,
    errors: AtomicU64,
    overloads: AtomicU64,
    acquisitions: AtomicU64,
    /// Current window; the lock also serializes resets.
    window: Mutex<Window>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create a collector with an empty window starting now. The first
    /// window takes its target from the gauges it is closed with.
    pub fn new() -> Self {
        Self::open(None)
    }

    /// Create a collector whose first window opens at `target`.
    pub fn with_target(target: usize) -> Self {
        Self::open(Some(target))
    }

    fn open(target: Option<usize>) -> Self {
        Self {
            timeouts: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            overloads: AtomicU64::new(0),
            acquisitions: AtomicU64::new(0),
            window: Mutex::new(Window {
                started: Instant::now(),
                target,
            }),
        }
    }

    pub fn record_acquisition(&self) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overload(&self) {
        self.overloads.fetch_add(1, Ordering::Relaxed);
    }

    /// Current window counts, without resetting.
    pub fn counts(&self) -> WindowCounts {
        WindowCounts {
            timeout_count: self.timeouts.load(Ordering::Relaxed),
            error_count: self.errors.load(Ordering::Relaxed),
            overload_count: self.overloads.load(Ordering::Relaxed),
            acquisition_count: self.acquisitions.load(Ordering::Relaxed),
        }
    }

    /// Time elapsed in the current window.
    pub fn window_elapsed(&self) -> Duration {
        self.window.lock().started.elapsed()
    }

    /// Capacity target the current window opened with, if known.
    pub fn window_target(&self) -> Option<usize> {
        self.window.lock().target
    }

    /// Re-anchor the current window's target after a capacity change
    /// applied at the window boundary.
    pub fn rebase_target(&self, target: usize) {
        self.window.lock().target = Some(target);
    }

    /// Snapshot of the running window. Counters keep accumulating.
    pub fn peek(&self, mut gauges: PoolGauges) -> MetricSnapshot {
        let window = self.window.lock();
        gauges.target = window.target.unwrap_or(gauges.target);
        let interval = window.started.elapsed();
        drop(window);
        MetricSnapshot::from_parts(gauges, self.counts(), interval)
    }

    /// Close the current window: freeze counters with `gauges` and start
    /// a fresh window at the current target.
    pub fn snapshot(&self, mut gauges: PoolGauges) -> MetricSnapshot {
        let mut window = self.window.lock();
        let interval = window.started.elapsed();
        let counts = WindowCounts {
            timeout_count: self.timeouts.swap(0, Ordering::Relaxed),
            error_count: self.errors.swap(0, Ordering::Relaxed),
            overload_count: self.overloads.swap(0, Ordering::Relaxed),
            acquisition_count: self.acquisitions.swap(0, Ordering::Relaxed),
        };
        let closing_target = gauges.target;
        gauges.target = window.target.unwrap_or(closing_target);
        window.started = Instant::now();
        window.target = Some(closing_target);
        drop(window);

        trace!(
            acquisitions = counts.acquisition_count,
            timeouts = counts.timeout_count,
            errors = counts.error_count,
            overloads = counts.overload_count,
            interval_ms = interval.as_millis() as u64,
            target = gauges.target,
            next_target = closing_target,
            "metrics window closed"
        );
        MetricSnapshot::from_parts(gauges, counts, interval)
    }
}
