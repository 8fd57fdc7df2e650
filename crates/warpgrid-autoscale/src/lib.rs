//! warpgrid-autoscale: snapshot-driven pool capacity decisions.
//!
//! Reads one `MetricSnapshot` per sampling window and decides whether the
//! pool should jump to its minimum or maximum capacity, or roll back to
//! the capacity it had before the last jump. The engine is pure: the
//! timer, sampling and the actual capacity change are driven by the pool.
//!
//! # Scaling Algorithm
//!
//! ```text
//! steady:
//!     grow   = target < max && (available <= scale_to_max || faults > acquisition_faults)
//!     shrink = target > min && available >= scale_to_min
//!     both   → tie_break decides (grow by default)
//!     grow   → ScaleTo(max), remember target
//!     shrink → ScaleTo(min), remember target
//!
//! shrunk to min:
//!     available <= rollback_from_min && demand in the window → ScaleTo(remembered)
//!
//! grown to max:
//!     available >= rollback_from_max → ScaleTo(remembered)
//! ```
//!
//! The gap between each trigger and its rollback threshold is the
//! hysteresis band. A proposal must repeat for `sample_count` consecutive
//! windows before it is returned.

pub mod policy;
pub mod scaler;

pub use policy::{ScaleThresholds, TieBreak};
pub use scaler::{AutoscalePhase, Autoscaler, ScaleDecision, ScaleMode, ScaleReason};
