//! Kinematic motion models
//!
//! Each model is a discrete-time dynamic system over a small fixed state
//! vector with its covariance, built on [`crate::filter::KalmanState`]. All
//! models share the same contract:
//!
//! - `predict_by(dt)` advances state and covariance; `dt == 0.0` is an exact
//!   no-op and negative `dt` is rejected with
//!   [`crate::TrackError::NegativeTimeDelta`] (callers clamp when they want
//!   clamp semantics).
//! - `predicted_by(dt)` is the pure variant used for read-only extrapolation.
//! - `correct_*` applies a Kalman correction, then normalizes angles into
//!   (-pi, pi] and clamps velocities into the model's limits.
//! - `reset_covariance` restores the inflated initial covariance after a
//!   numerical failure.
//!
//! The nonlinear models split long predictions into sub-steps of at most
//! [`MAX_PREDICT_STEP`] seconds to bound linearization error.

pub mod bicycle;
pub mod constant_turn_rate;
pub mod constant_velocity;

pub use bicycle::{BicycleModelParams, BicycleMotionModel};
pub use constant_turn_rate::{CtrvModelParams, CtrvMotionModel};
pub use constant_velocity::{CvModelParams, CvMotionModel};

/// Longest single linearized prediction step, in seconds.
pub const MAX_PREDICT_STEP: f64 = 0.11;

/// Number of equal sub-steps needed to cover `dt` without exceeding
/// [`MAX_PREDICT_STEP`].
#[inline]
pub(crate) fn substep_count(dt: f64) -> u32 {
    (dt / MAX_PREDICT_STEP).ceil().max(1.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substep_count() {
        assert_eq!(substep_count(0.05), 1);
        assert_eq!(substep_count(0.11), 1);
        assert_eq!(substep_count(0.12), 2);
        assert_eq!(substep_count(1.0), 10);
    }
}
