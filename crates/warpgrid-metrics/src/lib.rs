//! warpgrid-metrics: sampling-window metrics for WarpGrid resource pools.
//!
//! Tracks per-window acquisition counters with atomics and freezes them,
//! together with the pool's gauges, into an immutable [`MetricSnapshot`]
//! at every sampling boundary. The autoscaler consumes one snapshot per
//! window; timeout events carry a non-resetting peek.
//!
//! # Architecture
//!
//! ```text
//! MetricsCollector
//!   ├── record_*()  ← called by acquire/release, factory, health check
//!   ├── peek()      → MetricSnapshot (window keeps running)
//!   └── snapshot()  → MetricSnapshot (window counters reset)
//! ```

pub mod collector;
pub mod snapshot;

pub use collector::{MetricsCollector, WindowCounts};
pub use snapshot::{MetricSnapshot, PoolGauges, SnapshotError};
