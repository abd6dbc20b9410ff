//! Easing curves for burst progress.

use serde::{Deserialize, Serialize};

/// Easing function mapping linear progress in [0, 1] to eased progress in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EasingFunction {
    Linear,
    /// Quadratic ease-in (slow start).
    QuadraticIn,
    /// Quadratic ease-out (slow end).
    QuadraticOut,
    /// Quadratic ease-in-out (slow start and end).
    #[default]
    QuadraticInOut,
    CubicInOut,
    /// Smooth step (Hermite interpolation).
    SmoothStep,
}

impl EasingFunction {
    /// Apply the curve. Input is clamped to [0, 1].
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            EasingFunction::Linear => t,
            EasingFunction::QuadraticIn => t * t,
            EasingFunction::QuadraticOut => t * (2.0 - t),
            EasingFunction::QuadraticInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            EasingFunction::CubicInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            EasingFunction::SmoothStep => t * t * (3.0 - 2.0 * t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [EasingFunction; 6] = [
        EasingFunction::Linear,
        EasingFunction::QuadraticIn,
        EasingFunction::QuadraticOut,
        EasingFunction::QuadraticInOut,
        EasingFunction::CubicInOut,
        EasingFunction::SmoothStep,
    ];

    #[test]
    fn test_endpoints() {
        for easing in ALL {
            assert_eq!(easing.apply(0.0), 0.0, "{:?}", easing);
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-6, "{:?}", easing);
        }
    }

    #[test]
    fn test_quadratic_in_out_values() {
        let ease = EasingFunction::QuadraticInOut;
        assert!((ease.apply(0.25) - 0.125).abs() < 1e-6);
        assert!((ease.apply(0.5) - 0.5).abs() < 1e-6);
        assert!((ease.apply(0.75) - 0.875).abs() < 1e-6);
    }

    #[test]
    fn test_monotonic() {
        for easing in ALL {
            let mut prev = 0.0;
            for i in 0..=100 {
                let v = easing.apply(i as f32 / 100.0);
                assert!(v >= prev - 1e-6, "{:?} not monotonic at {}", easing, i);
                prev = v;
            }
        }
    }

    #[test]
    fn test_input_is_clamped() {
        assert_eq!(EasingFunction::QuadraticInOut.apply(-1.0), 0.0);
        assert_eq!(EasingFunction::QuadraticInOut.apply(2.0), 1.0);
    }
}
