//! Constant turn rate and velocity (CTRV) motion model
//!
//! Nonlinear model over `[x, y, yaw, vel, wz]` where `vel` is longitudinal
//! speed along the heading and `wz` the turn rate. Suited to objects that
//! change heading freely at low speed, such as pedestrians.

use nalgebra::{Matrix2, Matrix3, SMatrix, SVector, Vector2, Vector3};

use crate::filter::KalmanState;
use crate::motion::substep_count;
use crate::utils::{angle_difference, deg2rad, kmph2mps, normalize_radian};
use crate::{Result, TrackError};

// ============================================================================
// State indices
// ============================================================================

const X: usize = 0;
const Y: usize = 1;
const YAW: usize = 2;
const VEL: usize = 3;
const WZ: usize = 4;

/// State dimension of the CTRV model.
pub const CTRV_DIM: usize = 5;

// ============================================================================
// Parameters
// ============================================================================

/// Tuning constants for [`CtrvMotionModel`].
#[derive(Debug, Clone, Copy)]
pub struct CtrvModelParams {
    /// Longitudinal acceleration noise [m/s^2].
    pub q_stddev_acc_long: f64,
    /// Lateral acceleration noise [m/s^2].
    pub q_stddev_acc_lat: f64,
    /// Lower bound of the turn rate noise [rad/s].
    pub q_stddev_yaw_rate_min: f64,
    /// Upper bound of the turn rate noise [rad/s].
    pub q_stddev_yaw_rate_max: f64,
    /// Longitudinal speed limit [m/s].
    pub max_speed: f64,
    /// Turn rate limit [rad/s].
    pub max_turn_rate: f64,
    /// Initial longitudinal position variance [m^2].
    pub p0_cov_pos_x: f64,
    /// Initial lateral position variance [m^2].
    pub p0_cov_pos_y: f64,
    /// Initial yaw variance [rad^2].
    pub p0_cov_yaw: f64,
    /// Initial speed variance [(m/s)^2].
    pub p0_cov_vel: f64,
    /// Initial turn rate variance [(rad/s)^2].
    pub p0_cov_wz: f64,
}

impl Default for CtrvModelParams {
    fn default() -> Self {
        Self {
            q_stddev_acc_long: 9.81 * 0.35,
            q_stddev_acc_lat: 9.81 * 0.15,
            q_stddev_yaw_rate_min: deg2rad(1.5),
            q_stddev_yaw_rate_max: deg2rad(15.0),
            max_speed: kmph2mps(100.0),
            max_turn_rate: deg2rad(30.0),
            p0_cov_pos_x: 1.0,
            p0_cov_pos_y: 0.3 * 0.3,
            p0_cov_yaw: deg2rad(25.0) * deg2rad(25.0),
            p0_cov_vel: kmph2mps(1000.0) * kmph2mps(1000.0),
            p0_cov_wz: deg2rad(30.0) * deg2rad(30.0),
        }
    }
}

// ============================================================================
// Model
// ============================================================================

/// Extended Kalman filter over `[x, y, yaw, vel, wz]`.
///
/// Long predictions are split into sub-steps so the linearization stays close
/// to the nonlinear dynamics.
#[derive(Debug, Clone)]
pub struct CtrvMotionModel {
    params: CtrvModelParams,
    state: KalmanState<CTRV_DIM>,
}

impl CtrvMotionModel {
    /// Creates a model at the given pose and speed.
    ///
    /// The initial position covariance is expressed in the object frame
    /// (longitudinal and lateral) and rotated into the world by `yaw`.
    pub fn new(x: f64, y: f64, yaw: f64, vel: f64, params: CtrvModelParams) -> Self {
        let mean = SVector::<f64, CTRV_DIM>::from([x, y, normalize_radian(yaw), vel, 0.0]);
        let covariance = initial_covariance(&params, yaw);
        Self {
            params,
            state: KalmanState::new(mean, covariance),
        }
    }

    // ------------------------------------------------------------------------
    // Prediction
    // ------------------------------------------------------------------------

    /// Advances the state by `dt` seconds in place.
    ///
    /// # Errors
    ///
    /// Returns [`TrackError::NegativeTimeDelta`] when `dt` is negative; the
    /// state is left untouched.
    pub fn predict_by(&mut self, dt: f64) -> Result<()> {
        if dt < 0.0 {
            return Err(TrackError::NegativeTimeDelta { dt });
        }
        if dt == 0.0 {
            return Ok(());
        }

        let steps = substep_count(dt);
        let step_dt = dt / f64::from(steps);
        for _ in 0..steps {
            self.predict_step(step_dt);
        }
        Ok(())
    }

    /// Returns a copy of the model advanced by `dt` seconds.
    pub fn predicted_by(&self, dt: f64) -> Result<Self> {
        let mut copy = self.clone();
        copy.predict_by(dt)?;
        Ok(copy)
    }

    /// Single linearized prediction step.
    fn predict_step(&mut self, dt: f64) {
        let mean = self.state.mean;
        let yaw = mean[YAW];
        let vel = mean[VEL];
        let wz = mean[WZ];
        let (sin_yaw, cos_yaw) = yaw.sin_cos();

        let predicted = SVector::<f64, CTRV_DIM>::from([
            mean[X] + vel * cos_yaw * dt,
            mean[Y] + vel * sin_yaw * dt,
            normalize_radian(yaw + wz * dt),
            vel,
            wz,
        ]);

        let mut jacobian = SMatrix::<f64, CTRV_DIM, CTRV_DIM>::identity();
        jacobian[(X, YAW)] = -vel * sin_yaw * dt;
        jacobian[(X, VEL)] = cos_yaw * dt;
        jacobian[(Y, YAW)] = vel * cos_yaw * dt;
        jacobian[(Y, VEL)] = sin_yaw * dt;
        jacobian[(YAW, WZ)] = dt;

        self.state
            .predict_with(predicted, &jacobian, &self.process_noise(dt, yaw, vel));
    }

    /// Process noise for one step, with the position part rotated from the
    /// object frame into the world frame.
    fn process_noise(&self, dt: f64, yaw: f64, vel: f64) -> SMatrix<f64, CTRV_DIM, CTRV_DIM> {
        let p = &self.params;
        // Turn rate noise shrinks with speed so the implied lateral
        // acceleration stays bounded.
        let yaw_rate_stddev = (2.0 * p.q_stddev_acc_lat / vel.abs().max(0.1))
            .clamp(p.q_stddev_yaw_rate_min, p.q_stddev_yaw_rate_max);

        let dt2 = dt * dt;
        let q_cov_x = (p.q_stddev_acc_long * dt2).powi(2);
        let q_cov_y = (p.q_stddev_acc_lat * dt2).powi(2);
        let q_cov_yaw = (yaw_rate_stddev * dt).powi(2);
        let q_cov_vel = (p.q_stddev_acc_long * dt).powi(2);
        let q_cov_wz = (yaw_rate_stddev * dt).powi(2);

        let (sin_yaw, cos_yaw) = yaw.sin_cos();
        let sin_2yaw = (2.0 * yaw).sin();

        let mut q = SMatrix::<f64, CTRV_DIM, CTRV_DIM>::zeros();
        q[(X, X)] = q_cov_x * cos_yaw * cos_yaw + q_cov_y * sin_yaw * sin_yaw;
        q[(X, Y)] = 0.5 * (q_cov_x - q_cov_y) * sin_2yaw;
        q[(Y, X)] = q[(X, Y)];
        q[(Y, Y)] = q_cov_x * sin_yaw * sin_yaw + q_cov_y * cos_yaw * cos_yaw;
        q[(YAW, YAW)] = q_cov_yaw;
        q[(VEL, VEL)] = q_cov_vel;
        q[(WZ, WZ)] = q_cov_wz;
        q
    }

    // ------------------------------------------------------------------------
    // Correction
    // ------------------------------------------------------------------------

    /// Corrects with a position measurement `[x, y]`.
    pub fn correct_pose(&mut self, x: f64, y: f64, noise: Matrix2<f64>) -> Result<()> {
        let mut observation = SMatrix::<f64, 2, CTRV_DIM>::zeros();
        observation[(0, X)] = 1.0;
        observation[(1, Y)] = 1.0;
        self.state
            .correct(&Vector2::new(x, y), &observation, &noise)?;
        self.limit_states();
        Ok(())
    }

    /// Corrects with a pose measurement `[x, y, yaw]`.
    ///
    /// The measured yaw is re-wrapped onto the branch nearest the current
    /// estimate before the update so the innovation never spans a full turn.
    pub fn correct_pose_yaw(
        &mut self,
        x: f64,
        y: f64,
        yaw: f64,
        noise: Matrix3<f64>,
    ) -> Result<()> {
        let state_yaw = self.state.mean[YAW];
        let wrapped_yaw = state_yaw + angle_difference(yaw, state_yaw);

        let mut observation = SMatrix::<f64, 3, CTRV_DIM>::zeros();
        observation[(0, X)] = 1.0;
        observation[(1, Y)] = 1.0;
        observation[(2, YAW)] = 1.0;
        self.state
            .correct(&Vector3::new(x, y, wrapped_yaw), &observation, &noise)?;
        self.limit_states();
        Ok(())
    }

    /// Squared Mahalanobis distance of a position measurement.
    pub fn mahalanobis_squared(&self, x: f64, y: f64, noise: Matrix2<f64>) -> Option<f64> {
        let mut observation = SMatrix::<f64, 2, CTRV_DIM>::zeros();
        observation[(0, X)] = 1.0;
        observation[(1, Y)] = 1.0;
        self.state
            .mahalanobis_squared(&Vector2::new(x, y), &observation, &noise)
    }

    fn limit_states(&mut self) {
        let max_speed = self.params.max_speed;
        let max_turn_rate = self.params.max_turn_rate;
        let mean = &mut self.state.mean;
        mean[YAW] = normalize_radian(mean[YAW]);
        mean[VEL] = mean[VEL].clamp(-max_speed, max_speed);
        mean[WZ] = mean[WZ].clamp(-max_turn_rate, max_turn_rate);
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// World-frame position `[x, y]`.
    #[inline]
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.state.mean[X], self.state.mean[Y])
    }

    /// Heading angle in (-pi, pi].
    #[inline]
    pub fn yaw(&self) -> f64 {
        self.state.mean[YAW]
    }

    /// Longitudinal speed [m/s].
    #[inline]
    pub fn velocity(&self) -> f64 {
        self.state.mean[VEL]
    }

    /// Turn rate [rad/s].
    #[inline]
    pub fn turn_rate(&self) -> f64 {
        self.state.mean[WZ]
    }

    /// Position covariance block.
    #[inline]
    pub fn position_covariance(&self) -> Matrix2<f64> {
        self.state
            .covariance
            .fixed_view::<2, 2>(X, X)
            .into_owned()
    }

    /// Yaw variance.
    #[inline]
    pub fn yaw_variance(&self) -> f64 {
        self.state.covariance[(YAW, YAW)]
    }

    /// Speed variance.
    #[inline]
    pub fn velocity_variance(&self) -> f64 {
        self.state.covariance[(VEL, VEL)]
    }

    /// Turn rate variance.
    #[inline]
    pub fn turn_rate_variance(&self) -> f64 {
        self.state.covariance[(WZ, WZ)]
    }

    /// Covariance between speed and turn rate.
    #[inline]
    pub fn velocity_turn_rate_covariance(&self) -> f64 {
        self.state.covariance[(VEL, WZ)]
    }

    /// True when mean and covariance are finite and usable.
    #[inline]
    pub fn is_healthy(&self) -> bool {
        self.state.is_healthy()
    }

    /// Restores the initial covariance around the current heading, keeping
    /// the mean.
    pub fn reset_covariance(&mut self) {
        let yaw = self.state.mean[YAW];
        self.state.covariance = initial_covariance(&self.params, yaw);
    }
}

/// Initial covariance with the position block rotated by `yaw`.
fn initial_covariance(params: &CtrvModelParams, yaw: f64) -> SMatrix<f64, CTRV_DIM, CTRV_DIM> {
    let (sin_yaw, cos_yaw) = yaw.sin_cos();
    let sin_2yaw = (2.0 * yaw).sin();
    let p0x = params.p0_cov_pos_x;
    let p0y = params.p0_cov_pos_y;

    let mut covariance = SMatrix::<f64, CTRV_DIM, CTRV_DIM>::zeros();
    covariance[(X, X)] = p0x * cos_yaw * cos_yaw + p0y * sin_yaw * sin_yaw;
    covariance[(X, Y)] = 0.5 * (p0x - p0y) * sin_2yaw;
    covariance[(Y, X)] = covariance[(X, Y)];
    covariance[(Y, Y)] = p0x * sin_yaw * sin_yaw + p0y * cos_yaw * cos_yaw;
    covariance[(YAW, YAW)] = params.p0_cov_yaw;
    covariance[(VEL, VEL)] = params.p0_cov_vel;
    covariance[(WZ, WZ)] = params.p0_cov_wz;
    covariance
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn model(x: f64, y: f64, yaw: f64, vel: f64) -> CtrvMotionModel {
        CtrvMotionModel::new(x, y, yaw, vel, CtrvModelParams::default())
    }

    #[test]
    fn test_straight_motion_along_heading() {
        let mut m = model(0.0, 0.0, FRAC_PI_2, 1.5);
        m.predict_by(2.0).unwrap();
        assert_relative_eq!(m.position().x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(m.position().y, 3.0, epsilon = 1e-9);
        assert_relative_eq!(m.yaw(), FRAC_PI_2, epsilon = 1e-9);
    }

    #[test]
    fn test_turn_rate_bends_trajectory() {
        let mut m = model(0.0, 0.0, 0.0, 1.0);
        // Seed a turn rate through corrections with rotated poses.
        let noise = Matrix3::from_diagonal(&Vector3::new(0.01, 0.01, 0.01));
        let mut yaw = 0.0;
        for _ in 0..10 {
            m.predict_by(0.1).unwrap();
            yaw += 0.05;
            let pos = m.position();
            m.correct_pose_yaw(pos.x, pos.y, yaw, noise).unwrap();
        }
        assert!(m.turn_rate() > 0.05);
    }

    #[test]
    fn test_zero_dt_is_exact_noop() {
        let mut m = model(1.0, -2.0, 0.3, 4.0);
        let before = m.state.clone();
        m.predict_by(0.0).unwrap();
        assert_eq!(m.state, before);
    }

    #[test]
    fn test_negative_dt_rejected() {
        let mut m = model(0.0, 0.0, 0.0, 1.0);
        assert!(matches!(
            m.predict_by(-1e-3),
            Err(TrackError::NegativeTimeDelta { .. })
        ));
    }

    #[test]
    fn test_yaw_measurement_wraps_to_nearest_branch() {
        let mut m = model(0.0, 0.0, 3.1, 1.0);
        let noise = Matrix3::from_diagonal(&Vector3::new(0.04, 0.04, 0.01));
        // Measurement just across the pi boundary should pull yaw forward,
        // not spin it backwards through zero.
        m.correct_pose_yaw(0.0, 0.0, -3.1, noise).unwrap();
        assert!(m.yaw() > 3.1 || m.yaw() < -3.1);
    }

    #[test]
    fn test_long_prediction_uses_substeps() {
        let one = model(0.0, 0.0, 0.2, 5.0).predicted_by(1.0).unwrap();
        let mut many = model(0.0, 0.0, 0.2, 5.0);
        for _ in 0..10 {
            many.predict_by(0.1).unwrap();
        }
        // Sub-stepped single call should land near the manually stepped run.
        assert_relative_eq!(one.position().x, many.position().x, epsilon = 1e-6);
        assert_relative_eq!(one.position().y, many.position().y, epsilon = 1e-6);
    }

    #[test]
    fn test_initial_covariance_rotated_by_yaw() {
        let m = model(0.0, 0.0, FRAC_PI_2, 0.0);
        let p = m.position_covariance();
        // Longitudinal variance now lies along the world y axis.
        assert_relative_eq!(p[(0, 0)], 0.09, epsilon = 1e-9);
        assert_relative_eq!(p[(1, 1)], 1.0, epsilon = 1e-9);
    }
}
