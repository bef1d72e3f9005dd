//! Two-threshold culling controller.

use crystal_config::{CullingConfig, OptimizerConfig};
use serde::Serialize;

/// Result of one auto-optimization cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningOutcome {
    /// A focus guard was active; nothing was touched.
    Skipped,
    /// No frame timing has been recorded yet.
    NoData,
    /// FPS below the tighten threshold: culling tightened.
    Tightened,
    /// FPS above the relax threshold: culling relaxed.
    Relaxed,
    /// FPS between the thresholds.
    Held,
}

/// Shrink draw distance and check budget, never below the tuning floor and
/// never upward.
pub(crate) fn tightened(culling: &CullingConfig, tuning: &OptimizerConfig) -> CullingConfig {
    let distance = (culling.max_distance * tuning.tighten_distance_factor)
        .max(tuning.min_cull_distance)
        .min(culling.max_distance);
    let checks = scale_checks(culling.max_checks_per_frame, tuning.tighten_checks_factor)
        .max(tuning.min_checks_per_frame)
        .min(culling.max_checks_per_frame);
    CullingConfig {
        max_distance: distance,
        max_checks_per_frame: checks,
        ..culling.clone()
    }
}

/// Grow draw distance and check budget, never above the tuning ceiling and
/// never downward.
pub(crate) fn relaxed(culling: &CullingConfig, tuning: &OptimizerConfig) -> CullingConfig {
    let distance = (culling.max_distance * tuning.relax_distance_factor)
        .min(tuning.max_cull_distance)
        .max(culling.max_distance);
    let checks = scale_checks(culling.max_checks_per_frame, tuning.relax_checks_factor)
        .min(tuning.max_checks_per_frame)
        .max(culling.max_checks_per_frame);
    CullingConfig {
        max_distance: distance,
        max_checks_per_frame: checks,
        ..culling.clone()
    }
}

fn scale_checks(checks: usize, factor: f32) -> usize {
    (checks as f32 * factor).round() as usize
}

/// Which way the controller should move for a measured FPS.
pub(crate) fn decide(fps: f32, tuning: &OptimizerConfig) -> TuningOutcome {
    if fps < tuning.target_fps * tuning.tighten_fps_ratio {
        TuningOutcome::Tightened
    } else if fps > tuning.target_fps * tuning.relax_fps_ratio {
        TuningOutcome::Relaxed
    } else {
        TuningOutcome::Held
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decide_thresholds() {
        let t = OptimizerConfig::default();
        assert_eq!(decide(25.0, &t), TuningOutcome::Tightened);
        assert_eq!(decide(47.9, &t), TuningOutcome::Tightened);
        assert_eq!(decide(55.0, &t), TuningOutcome::Held);
        assert_eq!(decide(66.0, &t), TuningOutcome::Held);
        assert_eq!(decide(70.0, &t), TuningOutcome::Relaxed);
    }

    #[test]
    fn test_tighten_then_relax() {
        let t = OptimizerConfig::default();
        let start = CullingConfig::default();
        let tight = tightened(&start, &t);
        assert_eq!(tight.max_distance, 2000.0);
        assert_eq!(tight.max_checks_per_frame, 375);
        let loose = relaxed(&tight, &t);
        assert_eq!(loose.max_distance, 2400.0);
        assert_eq!(loose.max_checks_per_frame, 469);
        assert_eq!(loose.update_interval_ms, start.update_interval_ms);
    }

    #[test]
    fn test_bounds_hold() {
        let t = OptimizerConfig::default();
        let mut c = CullingConfig::default();
        for _ in 0..50 {
            c = tightened(&c, &t);
        }
        assert_eq!(c.max_distance, t.min_cull_distance);
        assert_eq!(c.max_checks_per_frame, t.min_checks_per_frame);
        for _ in 0..50 {
            c = relaxed(&c, &t);
        }
        assert_eq!(c.max_distance, t.max_cull_distance);
        assert_eq!(c.max_checks_per_frame, t.max_checks_per_frame);
    }

    #[test]
    fn test_out_of_band_values_not_reversed() {
        let t = OptimizerConfig::default();
        let c = CullingConfig {
            max_distance: 100.0,
            max_checks_per_frame: 10,
            ..CullingConfig::default()
        };
        let tight = tightened(&c, &t);
        assert_eq!(tight.max_distance, 100.0);
        assert_eq!(tight.max_checks_per_frame, 10);
        let c = CullingConfig {
            max_distance: 9000.0,
            ..CullingConfig::default()
        };
        assert_eq!(relaxed(&c, &t).max_distance, 9000.0);
    }
}
