//! Angle normalization helpers
//!
//! Heading states and yaw measurements live on a circle; every update
//! normalizes back into (-pi, pi] so innovations never wrap.

use num_traits::{Float, FloatConst};

/// Normalizes an angle into (-pi, pi].
#[inline]
pub fn normalize_radian<T: Float + FloatConst>(angle: T) -> T {
    let two_pi = T::PI() + T::PI();
    let mut a = angle % two_pi;
    if a > T::PI() {
        a = a - two_pi;
    } else if a <= -T::PI() {
        a = a + two_pi;
    }
    a
}

/// Signed shortest rotation from `b` to `a`, in (-pi, pi].
#[inline]
pub fn angle_difference<T: Float + FloatConst>(a: T, b: T) -> T {
    normalize_radian(a - b)
}

/// Shifts `angle` by whole half turns until it lies within a quarter turn of
/// `reference`.
///
/// Used for yaw measurements with front/back ambiguity, where headings that
/// differ by pi are the same observation.
#[inline]
pub fn align_to_half_turn<T: Float + FloatConst>(angle: T, reference: T) -> T {
    let half = T::from(0.5).unwrap();
    let turns = ((angle - reference) / T::PI() + half).floor();
    angle - turns * T::PI()
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f64::consts::PI;

    #[test]
    fn test_normalize_within_range_is_identity() {
        assert_eq!(normalize_radian(0.5), 0.5);
        assert_eq!(normalize_radian(-3.0), -3.0);
        assert_eq!(normalize_radian(PI), PI);
    }

    #[test]
    fn test_normalize_wraps() {
        assert!((normalize_radian(3.0 * PI) - PI).abs() < 1e-12);
        assert!((normalize_radian(-1.5 * PI) - 0.5 * PI).abs() < 1e-12);
        assert!((normalize_radian(2.0 * PI)).abs() < 1e-12);
    }

    #[test]
    fn test_negative_pi_maps_to_positive_pi() {
        assert!((normalize_radian(-PI) - PI).abs() < 1e-12);
    }

    #[test]
    fn test_angle_difference_shortest_path() {
        let d = angle_difference(-0.9 * PI, 0.9 * PI);
        assert!((d - 0.2 * PI).abs() < 1e-12);
    }

    #[test]
    fn test_align_to_half_turn_flips_reversed_heading() {
        let aligned = align_to_half_turn(PI - 0.1, 0.0);
        assert!((aligned + 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_align_to_half_turn_keeps_close_heading() {
        assert!((align_to_half_turn(0.4, 0.1) - 0.4).abs() < 1e-12);
        let far = align_to_half_turn(0.4 + 3.0 * PI, 0.1);
        assert!((far - 0.4).abs() < 1e-12);
    }
}
