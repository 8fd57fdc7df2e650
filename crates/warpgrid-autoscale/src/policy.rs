//! Trigger and rollback thresholds.
//!
//! Every threshold is optional in configuration. Unset values fall back to
//! a default derived from the snapshot, and every value is clamped to its
//! valid range before use, so no configuration can make the engine act on
//! an impossible comparison.

use serde::Deserialize;

/// Which proposal wins when shrink and grow fire in the same window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieBreak {
    /// Protect against exhaustion.
    #[default]
    Grow,
    Shrink,
}

/// Configurable thresholds for the autoscaler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScaleThresholds {
    /// Shrink to min when `available >= value`. Range `[1, target]`,
    /// default `target` (fully idle).
    pub scale_to_min: Option<usize>,
    /// Restore after a shrink when `available <= value`. Range
    /// `[1, minimum]`, default 1.
    pub rollback_from_min: Option<usize>,
    /// Grow to max when `available <= value`. Range `[1, target]`,
    /// default 1.
    pub scale_to_max: Option<usize>,
    /// Restore after a grow when `available >= value`. Range
    /// `[maximum - restore_to, maximum]`, default the lower bound.
    pub rollback_from_max: Option<usize>,
    /// Alternative grow trigger: failed acquisitions in the window
    /// exceeding this count.
    pub acquisition_faults: Option<u64>,
    pub tie_break: TieBreak,
}

impl ScaleThresholds {
    pub fn scale_to_min(&self, target: usize) -> usize {
        let hi = target.max(1);
        self.scale_to_min.unwrap_or(hi).clamp(1, hi)
    }

    pub fn rollback_from_min(&self, minimum: usize) -> usize {
        let hi = minimum.max(1);
        self.rollback_from_min.unwrap_or(1).clamp(1, hi)
    }

    pub fn scale_to_max(&self, target: usize) -> usize {
        let hi = target.max(1);
        self.scale_to_max.unwrap_or(1).clamp(1, hi)
    }

    pub fn rollback_from_max(&self, maximum: usize, restore_to: usize) -> usize {
        let lo = maximum.saturating_sub(restore_to).max(1);
        let hi = maximum.max(lo);
        self.rollback_from_max.unwrap_or(lo).clamp(lo, hi)
    }

    /// Whether the fault trigger fires for `failed` acquisitions.
    pub fn faults_exceeded(&self, failed: u64) -> bool {
        self.acquisition_faults.is_some_and(|limit| failed > limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_snapshot() {
        let t = ScaleThresholds::default();
        assert_eq!(t.scale_to_min(8), 8);
        assert_eq!(t.rollback_from_min(2), 1);
        assert_eq!(t.scale_to_max(8), 1);
        assert_eq!(t.rollback_from_max(12, 8), 4);
    }

    #[test]
    fn configured_values_are_clamped() {
        let t = ScaleThresholds {
            scale_to_min: Some(50),
            rollback_from_min: Some(9),
            scale_to_max: Some(0),
            rollback_from_max: Some(1),
            ..Default::default()
        };
        assert_eq!(t.scale_to_min(8), 8);
        assert_eq!(t.rollback_from_min(2), 2);
        assert_eq!(t.scale_to_max(8), 1);
        // Lower bound is max - restore_to.
        assert_eq!(t.rollback_from_max(12, 8), 4);
    }

    #[test]
    fn rollback_from_max_never_drops_to_zero() {
        let t = ScaleThresholds::default();
        assert_eq!(t.rollback_from_max(10, 10), 1);
    }

    #[test]
    fn fault_trigger_requires_configuration() {
        let off = ScaleThresholds::default();
        assert!(!off.faults_exceeded(1_000));

        let on = ScaleThresholds {
            acquisition_faults: Some(3),
            ..Default::default()
        };
        assert!(!on.faults_exceeded(3));
        assert!(on.faults_exceeded(4));
    }

    #[test]
    fn parses_from_toml() {
        let t: ScaleThresholds = toml::from_str(
            r#"
scale_to_min = 6
acquisition_faults = 2
tie_break = "shrink"
"#,
        )
        .unwrap();
        assert_eq!(t.scale_to_min, Some(6));
        assert_eq!(t.acquisition_faults, Some(2));
        assert_eq!(t.tie_break, TieBreak::Shrink);
        assert_eq!(t.scale_to_max, None);
    }

    #[test]
    fn rejects_unknown_keys() {
        let parsed: Result<ScaleThresholds, _> = toml::from_str("scale_to_middle = 3");
        assert!(parsed.is_err());
    }
}
