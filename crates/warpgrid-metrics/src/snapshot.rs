//! Immutable metric snapshots taken at sampling boundaries.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collector::WindowCounts;

/// Point-in-time gauges read from the pool's capacity store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolGauges {
    /// Capacity target at the moment of sampling.
    pub target: usize,
    /// Slots currently checked out.
    pub running: usize,
    /// Slots currently free.
    pub available: usize,
    /// Lower scaling bound.
    pub minimum: usize,
    /// Upper scaling bound.
    pub maximum: usize,
}

/// Frozen view of one sampling window.
///
/// Created once per window by [`MetricsCollector::snapshot`], consumed by
/// the autoscaler and then dropped.
///
/// [`MetricsCollector::snapshot`]: crate::MetricsCollector::snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Capacity target at window start.
    pub target: usize,
    /// Acquires that timed out or were cancelled.
    pub timeout_count: u64,
    /// Factory exhaustions and error-classified health failures.
    pub error_count: u64,
    /// Acquires that had to wait plus overload-classified health failures.
    pub overload_count: u64,
    /// Every acquire call, successful or not.
    pub acquisition_count: u64,
    pub running: usize,
    pub minimum: usize,
    pub maximum: usize,
    pub available: usize,
    /// Measured length of the window.
    pub calculation_interval: Duration,
}

/// A snapshot whose numbers cannot describe a real pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("minimum {minimum} exceeds maximum {maximum}")]
    InvertedBounds { minimum: usize, maximum: usize },

    #[error("running {running} + available {available} exceeds maximum {maximum}")]
    OverMaximum {
        running: usize,
        available: usize,
        maximum: usize,
    },
}

impl MetricSnapshot {
    /// Combine gauges and window counters into a snapshot.
    pub fn from_parts(gauges: PoolGauges, counts: WindowCounts, interval: Duration) -> Self {
        Self {
            target: gauges.target,
            timeout_count: counts.timeout_count,
            error_count: counts.error_count,
            overload_count: counts.overload_count,
            acquisition_count: counts.acquisition_count,
            running: gauges.running,
            minimum: gauges.minimum,
            maximum: gauges.maximum,
            available: gauges.available,
            calculation_interval: interval,
        }
    }

    /// Slots alive in the pool: `running + available`.
    pub fn capacity(&self) -> usize {
        self.running + self.available
    }

    /// Acquisitions that did not produce a resource in this window.
    pub fn failed_acquisitions(&self) -> u64 {
        self.timeout_count + self.error_count
    }

    /// Reject snapshots that no consistent pool state could produce.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.minimum > self.maximum {
            return Err(SnapshotError::InvertedBounds {
                minimum: self.minimum,
                maximum: self.maximum,
            });
        }
        if self.capacity() > self.maximum {
            return Err(SnapshotError::OverMaximum {
                running: self.running,
                available: self.available,
                maximum: self.maximum,
            });
        }
        Ok(())
    }
}
