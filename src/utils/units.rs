//! Unit conversions used by the parameter tables

use core::f64::consts::PI;

/// Degrees to radians.
#[inline]
pub const fn deg2rad(deg: f64) -> f64 {
    deg * PI / 180.0
}

/// Kilometers per hour to meters per second.
#[inline]
pub const fn kmph2mps(kmph: f64) -> f64 {
    kmph * 1000.0 / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deg2rad() {
        assert!((deg2rad(180.0) - PI).abs() < 1e-12);
        assert!((deg2rad(90.0) - PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_kmph2mps() {
        assert!((kmph2mps(36.0) - 10.0).abs() < 1e-12);
        assert!((kmph2mps(60.0) - 16.666_666_666_666_668).abs() < 1e-9);
    }
}
