//! Zoom contract
//!
//! Scale always stays within [`MIN_SCALE`, `MAX_SCALE`]. A pinch scales the
//! scale it started from by the ratio of finger distances. Double tap
//! toggles between a close-up and the default.

pub const MIN_SCALE: f64 = 0.9;
pub const MAX_SCALE: f64 = 2.5;
pub const DEFAULT_SCALE: f64 = 1.0;
pub const ZOOM_STEP: f64 = 0.1;

const DOUBLE_TAP_THRESHOLD: f64 = 1.4;
const DOUBLE_TAP_SCALE: f64 = 1.8;

pub fn clamp_scale(scale: f64) -> f64 {
    if scale.is_nan() {
        return DEFAULT_SCALE;
    }
    scale.clamp(MIN_SCALE, MAX_SCALE)
}

/// Scale to jump to on double tap.
pub fn double_tap_target(current: f64) -> f64 {
    if current > DOUBLE_TAP_THRESHOLD {
        DEFAULT_SCALE
    } else {
        DOUBLE_TAP_SCALE
    }
}

/// Distance between two touch points
pub fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    (b.0 - a.0).hypot(b.1 - a.1)
}

/// An in-progress two-finger pinch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pinch {
    base_distance: f64,
    base_scale: f64,
}

impl Pinch {
    /// Start a pinch. Touch points on top of each other can't be a pinch.
    pub fn start(distance: f64, scale: f64) -> Option<Self> {
        (distance > 0.0).then_some(Self {
            base_distance: distance,
            base_scale: scale,
        })
    }

    pub fn scale_at(&self, distance: f64) -> f64 {
        clamp_scale(self.base_scale * distance / self.base_distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp() {
        assert_eq!(clamp_scale(0.2), MIN_SCALE);
        assert_eq!(clamp_scale(9.0), MAX_SCALE);
        assert_eq!(clamp_scale(1.3), 1.3);
        assert_eq!(clamp_scale(f64::NAN), DEFAULT_SCALE);
    }

    #[test]
    fn test_double_tap_toggles() {
        assert_eq!(double_tap_target(1.0), 1.8);
        assert_eq!(double_tap_target(1.4), 1.8);
        assert_eq!(double_tap_target(1.8), 1.0);
    }

    #[test]
    fn test_pinch_scales_from_start() {
        let pinch = Pinch::start(distance((0.0, 0.0), (3.0, 4.0)), 1.2).unwrap();

        assert!((pinch.scale_at(10.0) - 2.4).abs() < 1e-9);
        assert_eq!(pinch.scale_at(50.0), MAX_SCALE);
        assert_eq!(pinch.scale_at(1.0), MIN_SCALE);
    }

    #[test]
    fn test_zero_distance_is_not_a_pinch() {
        assert!(Pinch::start(0.0, 1.0).is_none());
    }
}
