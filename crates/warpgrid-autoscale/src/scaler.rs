//! Autoscaler: hysteresis-based capacity decisions.
//!
//! Evaluates one `MetricSnapshot` per window and returns a scaling
//! decision. The engine remembers the capacity it jumped away from so the
//! matching rollback can restore it once the trigger condition subsides.

use std::fmt;

use tracing::debug;

use warpgrid_metrics::MetricSnapshot;

use crate::policy::{ScaleThresholds, TieBreak};

/// A scaling decision for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    /// Move the pool to the specified capacity.
    ScaleTo { capacity: usize, reason: ScaleReason },
    /// No change needed.
    NoChange,
}

/// Why a capacity change was proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleReason {
    /// The pool was idle enough to drop to its minimum.
    ShrinkToMin,
    /// Demand returned after a shrink.
    RollbackFromMin,
    /// Free slots ran low.
    GrowToMax,
    /// Too many acquisitions failed in the window.
    AcquisitionFaults,
    /// Pressure subsided after a grow.
    RollbackFromMax,
}

impl fmt::Display for ScaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleReason::ShrinkToMin => write!(f, "shrink-to-min"),
            ScaleReason::RollbackFromMin => write!(f, "rollback-from-min"),
            ScaleReason::GrowToMax => write!(f, "grow-to-max"),
            ScaleReason::AcquisitionFaults => write!(f, "acquisition-faults"),
            ScaleReason::RollbackFromMax => write!(f, "rollback-from-max"),
        }
    }
}

/// Where the engine stands relative to its last jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleMode {
    /// Operating at a capacity the engine did not jump to.
    Steady,
    /// Shrunk to the minimum; `restore_to` is the pre-shrink capacity.
    ShrunkToMin { restore_to: usize },
    /// Grown to the maximum; `restore_to` is the pre-grow capacity.
    GrownToMax { restore_to: usize },
}

/// Control-loop phase, advanced by the task that drives the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoscalePhase {
    #[default]
    Idle,
    Sampling,
    Deciding,
    Scaling,
}

/// The autoscaler evaluates snapshots and decides whether to move the
/// pool's capacity.
#[derive(Debug)]
pub struct Autoscaler {
    thresholds: ScaleThresholds,
    /// Consecutive windows a proposal must survive.
    sample_count: u32,
    mode: ScaleMode,
    phase: AutoscalePhase,
    /// Capacity the engine expects to see in the next snapshot.
    expected_target: Option<usize>,
    /// Pending proposal and how many windows it has repeated.
    streak: Option<(ScaleDecision, u32)>,
}

impl Autoscaler {
    /// Create a new autoscaler.
    pub fn new(thresholds: ScaleThresholds, sample_count: u32) -> Self {
        Self {
            thresholds,
            sample_count: sample_count.max(1),
            mode: ScaleMode::Steady,
            phase: AutoscalePhase::Idle,
            expected_target: None,
            streak: None,
        }
    }

    pub fn mode(&self) -> ScaleMode {
        self.mode
    }

    pub fn phase(&self) -> AutoscalePhase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: AutoscalePhase) {
        self.phase = phase;
    }

    /// Forget the last jump and any pending proposal.
    pub fn reset(&mut self) {
        self.mode = ScaleMode::Steady;
        self.expected_target = None;
        self.streak = None;
    }

    pub fn thresholds(&self) -> &ScaleThresholds {
        &self.thresholds
    }

    /// Evaluate one window and return a scaling decision.
    ///
    /// A returned `ScaleTo` is assumed to be applied; the next snapshot
    /// is expected to report that capacity as its target. A different
    /// target means someone else changed capacity, and the engine drops
    /// back to `Steady`.
    pub fn evaluate(&mut self, snapshot: &MetricSnapshot) -> ScaleDecision {
        if let Some(expected) = self.expected_target
            && expected != snapshot.target
        {
            debug!(
                expected,
                observed = snapshot.target,
                "capacity changed outside the autoscaler, resetting"
            );
            self.mode = ScaleMode::Steady;
            self.streak = None;
        }
        self.expected_target = Some(snapshot.target);

        let proposal = self.propose(snapshot);
        let decision = self.debounce(proposal);

        if let ScaleDecision::ScaleTo { capacity, reason } = decision {
            self.mode = match reason {
                ScaleReason::ShrinkToMin => ScaleMode::ShrunkToMin {
                    restore_to: snapshot.target,
                },
                ScaleReason::GrowToMax | ScaleReason::AcquisitionFaults => {
                    ScaleMode::GrownToMax {
                        restore_to: snapshot.target,
                    }
                }
                ScaleReason::RollbackFromMin | ScaleReason::RollbackFromMax => ScaleMode::Steady,
            };
            self.expected_target = Some(capacity);
            debug!(
                from = snapshot.target,
                to = capacity,
                %reason,
                available = snapshot.available,
                running = snapshot.running,
                "scaling decision"
            );
        }

        decision
    }

    fn propose(&self, s: &MetricSnapshot) -> ScaleDecision {
        let t = &self.thresholds;
        match self.mode {
            ScaleMode::Steady => {
                let low_free = s.available <= t.scale_to_max(s.target);
                let faulted = t.faults_exceeded(s.failed_acquisitions());
                let grow = s.target < s.maximum && (low_free || faulted);
                let shrink = s.target > s.minimum && s.available >= t.scale_to_min(s.target);

                let grow_to = ScaleDecision::ScaleTo {
                    capacity: s.maximum,
                    reason: if low_free {
                        ScaleReason::GrowToMax
                    } else {
                        ScaleReason::AcquisitionFaults
                    },
                };
                let shrink_to = ScaleDecision::ScaleTo {
                    capacity: s.minimum,
                    reason: ScaleReason::ShrinkToMin,
                };

                match (grow, shrink) {
                    (true, true) => match t.tie_break {
                        TieBreak::Grow => grow_to,
                        TieBreak::Shrink => shrink_to,
                    },
                    (true, false) => grow_to,
                    (false, true) => shrink_to,
                    (false, false) => ScaleDecision::NoChange,
                }
            }
            ScaleMode::ShrunkToMin { restore_to } => {
                let restore_to = restore_to.min(s.maximum);
                // With min 1 an idle pool sits at the threshold by itself.
                let demand = s.running > 0 || s.acquisition_count > 0;
                if restore_to > s.target
                    && demand
                    && s.available <= t.rollback_from_min(s.minimum)
                {
                    ScaleDecision::ScaleTo {
                        capacity: restore_to,
                        reason: ScaleReason::RollbackFromMin,
                    }
                } else {
                    ScaleDecision::NoChange
                }
            }
            ScaleMode::GrownToMax { restore_to } => {
                let restore_to = restore_to.max(s.minimum);
                if restore_to < s.target
                    && s.available >= t.rollback_from_max(s.maximum, restore_to)
                {
                    ScaleDecision::ScaleTo {
                        capacity: restore_to,
                        reason: ScaleReason::RollbackFromMax,
                    }
                } else {
                    ScaleDecision::NoChange
                }
            }
        }
    }

    /// Hold a proposal back until it has repeated `sample_count` times.
    fn debounce(&mut self, proposal: ScaleDecision) -> ScaleDecision {
        if proposal == ScaleDecision::NoChange {
            self.streak = None;
            return proposal;
        }

        let seen = match self.streak {
            Some((pending, count)) if pending == proposal => count + 1,
            _ => 1,
        };

        if seen >= self.sample_count {
            self.streak = None;
            proposal
        } else {
            self.streak = Some((proposal, seen));
            ScaleDecision::NoChange
        }
    }
}
