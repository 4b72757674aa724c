//! config/intensity.rs
//! Mapping of the 0..=10 intensity knob onto per-tool parameter sweeps.
//!
//! Intensity 5 is the default sweep, 0 the narrowest and 10 the widest.

use crate::constants::{DEFAULT_INTENSITY, MAX_INTENSITY};

/// Descending quality levels from `max` down to an intensity-dependent floor.
///
/// - intensity 5 stops at `default`;
/// - below 5 the floor rises linearly towards `max`;
/// - above 5 it falls linearly towards `min`.
pub fn quality_range(min: u32, max: u32, default: u32, intensity: u8) -> Vec<u32> {
    let (min, max) = (min.min(max), min.max(max));
    let default = default.clamp(min, max);
    let i = f64::from(intensity.min(MAX_INTENSITY));
    let mid = f64::from(DEFAULT_INTENSITY);

    let lo = if i < mid {
        let raw = f64::from(max) - (i / mid) * f64::from(max - default);
        (raw.round() as u32).max(default)
    } else if i > mid {
        let raw = f64::from(min) + (1.0 - (i - mid) / mid) * f64::from(default - min);
        (raw.round() as u32).min(default)
    } else {
        default
    };

    (lo.clamp(min, max)..=max).rev().collect()
}

/// Piecewise-linear value: `at_min` at intensity 0, `at_default` at 5,
/// `at_max` at 10.
pub fn interpolate(at_min: u32, at_default: u32, at_max: u32, intensity: u8) -> u32 {
    let i = f64::from(intensity.min(MAX_INTENSITY));
    let mid = f64::from(DEFAULT_INTENSITY);
    let value = if i <= mid {
        f64::from(at_min) + (f64::from(at_default) - f64::from(at_min)) * (i / mid)
    } else {
        f64::from(at_default) + (f64::from(at_max) - f64::from(at_default)) * ((i - mid) / mid)
    };
    value.round().max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_intensity_stops_at_default() {
        assert_eq!(quality_range(1, 9, 6, 5), vec![9, 8, 7, 6]);
        assert_eq!(quality_range(7, 9, 8, 5), vec![9, 8]);
        assert_eq!(quality_range(9, 12, 12, 5), vec![12]);
    }

    #[test]
    fn extremes_reach_the_bounds() {
        assert_eq!(quality_range(1, 9, 6, 0), vec![9]);
        assert_eq!(quality_range(1, 9, 6, 10), (1..=9).rev().collect::<Vec<_>>());
        assert_eq!(quality_range(9, 12, 12, 10), vec![12, 11, 10, 9]);
    }

    #[test]
    fn interpolation_hits_the_anchor_points() {
        assert_eq!(interpolate(15, 500, 2000, 0), 15);
        assert_eq!(interpolate(15, 500, 2000, 5), 500);
        assert_eq!(interpolate(15, 500, 2000, 10), 2000);
        assert_eq!(interpolate(15, 500, 2000, 7), 1100);
    }
}
