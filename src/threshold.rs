//! Density-scaled danger thresholds.
//!
//! Both cutoffs are bounding-box areas in square pixels. They are expressed as a
//! fraction of the frame area and shrink as object density grows, so a crowded
//! scene makes each individual object count for more.

use serde::Serialize;

/// Fraction of the frame area a box must exceed to be critical.
pub const BASE_CRITICAL_FRACTION: f64 = 0.2;

/// Fraction of the frame area a box must exceed to raise a warning.
pub const BASE_WARNING_FRACTION: f64 = 0.1;

/// How strongly density shrinks both thresholds.
const DENSITY_WEIGHT: f64 = 0.5;

/// Per-frame pair of bounding-box-area cutoffs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Thresholds {
    pub critical: f64,
    pub warning: f64,
}

impl Thresholds {
    /// Compute both cutoffs for a frame.
    ///
    /// `frame_area` is positive and `density` non-negative by construction of
    /// every caller in this crate; no validation happens here.
    pub fn compute(frame_area: f64, density: f64) -> Self {
        let scaling_factor = 1.0 + density * DENSITY_WEIGHT;
        Self {
            critical: BASE_CRITICAL_FRACTION * frame_area / scaling_factor,
            warning: BASE_WARNING_FRACTION * frame_area / scaling_factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_density_uses_base_fractions() {
        let t = Thresholds::compute(640.0 * 480.0, 0.0);
        assert_eq!(t.critical, 0.2 * 307_200.0);
        assert_eq!(t.warning, 0.1 * 307_200.0);
    }

    #[test]
    fn matches_closed_form() {
        for &(area, density) in &[(100.0, 0.0), (307_200.0, 0.25), (1.0, 3.0), (2e6, 1e-4)] {
            let t = Thresholds::compute(area, density);
            let scale = 1.0 + density * 0.5;
            assert_eq!(t.critical, 0.2 * area / scale);
            assert_eq!(t.warning, 0.1 * area / scale);
        }
    }

    #[test]
    fn thresholds_strictly_decrease_with_density() {
        let area = 1280.0 * 720.0;
        let mut previous = Thresholds::compute(area, 0.0);
        for step in 1..50 {
            let current = Thresholds::compute(area, step as f64 * 0.1);
            assert!(current.critical < previous.critical);
            assert!(current.warning < previous.warning);
            previous = current;
        }
    }

    #[test]
    fn warning_is_half_of_critical() {
        let t = Thresholds::compute(10_000.0, 0.7);
        assert!((t.critical - 2.0 * t.warning).abs() < 1e-9);
    }
}
