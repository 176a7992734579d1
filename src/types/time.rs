//! Timestamps for detection batches and track bookkeeping
//!
//! Tracking works on a monotonic clock with nanosecond resolution. `Stamp`
//! is a thin value type; all dt computations come out as `f64` seconds
//! because that is what the motion models consume.

use core::ops::Sub;

const NANOS_PER_SEC: f64 = 1e9;

/// A monotonic timestamp with nanosecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Stamp(i64);

impl Stamp {
    /// Creates a timestamp from nanoseconds since an arbitrary epoch.
    #[inline]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Creates a timestamp from whole seconds.
    #[inline]
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs * 1_000_000_000)
    }

    /// Creates a timestamp from fractional seconds.
    ///
    /// Sub-nanosecond parts are truncated.
    #[inline]
    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * NANOS_PER_SEC) as i64)
    }

    /// Raw nanosecond count.
    #[inline]
    pub const fn nanos(&self) -> i64 {
        self.0
    }

    /// Signed elapsed seconds since `earlier`.
    ///
    /// Negative when `earlier` is actually later; callers decide whether to
    /// clamp or reject.
    #[inline]
    pub fn seconds_since(&self, earlier: Stamp) -> f64 {
        (self.0 - earlier.0) as f64 / NANOS_PER_SEC
    }

    /// Returns this timestamp shifted forward by `secs` seconds.
    #[inline]
    pub fn advanced_by(&self, secs: f64) -> Self {
        Self(self.0 + (secs * NANOS_PER_SEC) as i64)
    }
}

impl Sub for Stamp {
    type Output = f64;

    /// Difference in seconds.
    #[inline]
    fn sub(self, rhs: Stamp) -> f64 {
        self.seconds_since(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_since() {
        let t0 = Stamp::from_nanos(1_000_000_000);
        let t1 = Stamp::from_nanos(2_500_000_000);
        assert!((t1.seconds_since(t0) - 1.5).abs() < 1e-12);
        assert!((t0.seconds_since(t1) + 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_advanced_by_round_trips() {
        let t0 = Stamp::from_secs(10);
        let t1 = t0.advanced_by(0.1);
        assert!((t1.seconds_since(t0) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_sub_operator_matches_seconds_since() {
        let t0 = Stamp::from_secs_f64(3.25);
        let t1 = Stamp::from_secs_f64(4.0);
        assert!(((t1 - t0) - 0.75).abs() < 1e-9);
    }
}
