//! Kinematic bicycle motion model
//!
//! Nonlinear model over `[x, y, yaw, vel, slip]` where `vel` is speed along
//! the body axis and `slip` the angle between body axis and velocity vector.
//! Heading changes are driven by the rear-axle geometry, so the wheelbase is
//! part of the model state and follows the tracked shape.
//!
//! Dynamics per step (`w = vel * sin(slip) / lr`):
//!
//! ```text
//! x'    = x + vel*cos(yaw+slip)*dt - 0.5*vel*sin(slip)*w*dt^2
//! y'    = y + vel*sin(yaw+slip)*dt + 0.5*vel*cos(slip)*w*dt^2
//! yaw'  = yaw + vel/lr*sin(slip)*dt
//! vel'  = vel
//! slip' = slip
//! ```

use nalgebra::{Matrix2, Matrix3, Matrix4, SMatrix, SVector, Vector2, Vector3, Vector4};

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
const SLIP: usize = 4;

/// State dimension of the bicycle model.
pub const BICYCLE_DIM: usize = 5;

// ============================================================================
// Parameters
// ============================================================================

/// Tuning constants for [`BicycleMotionModel`].
#[derive(Debug, Clone, Copy)]
pub struct BicycleModelParams {
    /// Longitudinal acceleration noise [m/s^2].
    pub q_stddev_acc_long: f64,
    /// Lateral acceleration noise [m/s^2].
    pub q_stddev_acc_lat: f64,
    /// Lower bound of the yaw rate noise [rad/s].
    pub q_stddev_yaw_rate_min: f64,
    /// Upper bound of the yaw rate noise [rad/s].
    pub q_stddev_yaw_rate_max: f64,
    /// Lower bound of the slip rate noise [rad/s].
    pub q_stddev_slip_rate_min: f64,
    /// Upper bound of the slip rate noise [rad/s].
    pub q_stddev_slip_rate_max: f64,
    /// Slip angle assumed when bounding yaw rate noise [rad].
    pub q_max_slip_angle: f64,
    /// Front overhang of the wheel position, as a ratio of length.
    pub lf_ratio: f64,
    /// Minimum distance from center to front wheel [m].
    pub lf_min: f64,
    /// Rear counterpart of `lf_ratio`.
    pub lr_ratio: f64,
    /// Minimum distance from center to rear wheel [m].
    pub lr_min: f64,
    /// Longitudinal speed limit [m/s].
    pub max_speed: f64,
    /// Slip angle limit [rad].
    pub max_slip: f64,
    /// Initial longitudinal position variance [m^2].
    pub p0_cov_pos_x: f64,
    /// Initial lateral position variance [m^2].
    pub p0_cov_pos_y: f64,
    /// Initial yaw variance [rad^2].
    pub p0_cov_yaw: f64,
    /// Initial speed variance [(m/s)^2].
    pub p0_cov_vel: f64,
    /// Initial slip variance [rad^2].
    pub p0_cov_slip: f64,
}

impl Default for BicycleModelParams {
    fn default() -> Self {
        Self {
            q_stddev_acc_long: 9.81 * 0.35,
            q_stddev_acc_lat: 9.81 * 0.15,
            q_stddev_yaw_rate_min: deg2rad(1.5),
            q_stddev_yaw_rate_max: deg2rad(15.0),
            q_stddev_slip_rate_min: deg2rad(0.3),
            q_stddev_slip_rate_max: deg2rad(10.0),
            q_max_slip_angle: deg2rad(30.0),
            lf_ratio: 0.3,
            lf_min: 1.0,
            lr_ratio: 0.25,
            lr_min: 1.0,
            max_speed: kmph2mps(100.0),
            max_slip: deg2rad(30.0),
            p0_cov_pos_x: 1.0,
            p0_cov_pos_y: 0.3 * 0.3,
            p0_cov_yaw: deg2rad(25.0) * deg2rad(25.0),
            p0_cov_vel: kmph2mps(1000.0) * kmph2mps(1000.0),
            p0_cov_slip: deg2rad(10.0) * deg2rad(10.0),
        }
    }
}

// ============================================================================
// Model
// ============================================================================

/// Extended Kalman filter over `[x, y, yaw, vel, slip]`.
///
/// Long predictions are split into sub-steps so the linearization stays close
/// to the nonlinear dynamics.
#[derive(Debug, Clone)]
pub struct BicycleMotionModel {
    params: BicycleModelParams,
    state: KalmanState<BICYCLE_DIM>,
    lf: f64,
    lr: f64,
}

impl BicycleMotionModel {
    /// Creates a model at the given pose and speed, with the wheelbase
    /// derived from the object length.
    ///
    /// The initial position covariance is expressed in the object frame
    /// (longitudinal and lateral) and rotated into the world by `yaw`.
    pub fn new(x: f64, y: f64, yaw: f64, vel: f64, length: f64, params: BicycleModelParams) -> Self {
        let mean = SVector::<f64, BICYCLE_DIM>::from([x, y, normalize_radian(yaw), vel, 0.0]);
        let covariance = initial_covariance(&params, yaw);
        let mut model = Self {
            params,
            state: KalmanState::new(mean, covariance),
            lf: params.lf_min,
            lr: params.lr_min,
        };
        model.update_wheelbase(length);
        model
    }

    /// Re-derives the wheel positions from an updated object length.
    pub fn update_wheelbase(&mut self, length: f64) {
        self.lf = (length * self.params.lf_ratio).max(self.params.lf_min);
        self.lr = (length * self.params.lr_ratio).max(self.params.lr_min);
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
        let slip = mean[SLIP];

        let (sin_heading, cos_heading) = (yaw + slip).sin_cos();
        let (sin_slip, cos_slip) = slip.sin_cos();
        let w = vel * sin_slip / self.lr;
        let w_dtdt = w * dt * dt;
        let vv_dtdt_lr = vel * vel * dt * dt / self.lr;

        let predicted = SVector::<f64, BICYCLE_DIM>::from([
            mean[X] + vel * cos_heading * dt - 0.5 * vel * sin_slip * w_dtdt,
            mean[Y] + vel * sin_heading * dt + 0.5 * vel * cos_slip * w_dtdt,
            normalize_radian(yaw + vel / self.lr * sin_slip * dt),
            vel,
            slip,
        ]);

        let mut jacobian = SMatrix::<f64, BICYCLE_DIM, BICYCLE_DIM>::identity();
        jacobian[(X, YAW)] = -vel * sin_heading * dt - 0.5 * vel * cos_heading * w_dtdt;
        jacobian[(X, VEL)] = cos_heading * dt - sin_heading * w_dtdt;
        jacobian[(X, SLIP)] = -vel * sin_heading * dt
            - 0.5 * (cos_slip * sin_heading + sin_slip * cos_heading) * vv_dtdt_lr;
        jacobian[(Y, YAW)] = vel * cos_heading * dt - 0.5 * vel * sin_heading * w_dtdt;
        jacobian[(Y, VEL)] = sin_heading * dt + cos_heading * w_dtdt;
        jacobian[(Y, SLIP)] = vel * cos_heading * dt
            + 0.5 * (cos_slip * cos_heading - sin_slip * sin_heading) * vv_dtdt_lr;
        jacobian[(YAW, VEL)] = sin_slip * dt / self.lr;
        jacobian[(YAW, SLIP)] = vel * cos_slip * dt / self.lr;

        self.state
            .predict_with(predicted, &jacobian, &self.process_noise(dt, yaw, vel));
    }

    /// Process noise for one step, with the position part rotated from the
    /// object frame into the world frame.
    fn process_noise(&self, dt: f64, yaw: f64, vel: f64) -> SMatrix<f64, BICYCLE_DIM, BICYCLE_DIM> {
        let p = &self.params;
        let speed = vel.abs().max(0.1);
        // Yaw rate noise is bounded by the lateral acceleration the object
        // can sustain and by the largest credible slip angle.
        let yaw_rate_stddev = (2.0 * p.q_stddev_acc_lat / speed)
            .min(speed / self.lr * p.q_max_slip_angle.sin())
            .clamp(p.q_stddev_yaw_rate_min, p.q_stddev_yaw_rate_max);
        let slip_rate_stddev = (p.q_stddev_acc_lat / speed)
            .clamp(p.q_stddev_slip_rate_min, p.q_stddev_slip_rate_max);

        let dt2 = dt * dt;
        let q_cov_x = (p.q_stddev_acc_long * dt2).powi(2);
        let q_cov_y = (p.q_stddev_acc_lat * dt2).powi(2);
        let q_cov_yaw = (yaw_rate_stddev * dt).powi(2);
        let q_cov_vel = (p.q_stddev_acc_long * dt).powi(2);
        let q_cov_slip = (slip_rate_stddev * dt).powi(2);

        let (sin_yaw, cos_yaw) = yaw.sin_cos();
        let sin_2yaw = (2.0 * yaw).sin();

        let mut q = SMatrix::<f64, BICYCLE_DIM, BICYCLE_DIM>::zeros();
        q[(X, X)] = q_cov_x * cos_yaw * cos_yaw + q_cov_y * sin_yaw * sin_yaw;
        q[(X, Y)] = 0.5 * (q_cov_x - q_cov_y) * sin_2yaw;
        q[(Y, X)] = q[(X, Y)];
        q[(Y, Y)] = q_cov_x * sin_yaw * sin_yaw + q_cov_y * cos_yaw * cos_yaw;
        q[(YAW, YAW)] = q_cov_yaw;
        q[(VEL, VEL)] = q_cov_vel;
        q[(SLIP, SLIP)] = q_cov_slip;
        q
    }

    // ------------------------------------------------------------------------
    // Correction
    // ------------------------------------------------------------------------

    /// Corrects with a position measurement `[x, y]`.
    pub fn correct_pose(&mut self, x: f64, y: f64, noise: Matrix2<f64>) -> Result<()> {
        let mut observation = SMatrix::<f64, 2, BICYCLE_DIM>::zeros();
        observation[(0, X)] = 1.0;
        observation[(1, Y)] = 1.0;
        self.state.correct(&Vector2::new(x, y), &observation, &noise)?;
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

        let mut observation = SMatrix::<f64, 3, BICYCLE_DIM>::zeros();
        observation[(0, X)] = 1.0;
        observation[(1, Y)] = 1.0;
        observation[(2, YAW)] = 1.0;
        self.state
            .correct(&Vector3::new(x, y, wrapped_yaw), &observation, &noise)?;
        self.limit_states();
        Ok(())
    }

    /// Corrects with a pose and longitudinal speed measurement
    /// `[x, y, yaw, vel]`.
    pub fn correct_pose_yaw_velocity(
        &mut self,
        x: f64,
        y: f64,
        yaw: f64,
        vel: f64,
        noise: Matrix4<f64>,
    ) -> Result<()> {
        let state_yaw = self.state.mean[YAW];
        let wrapped_yaw = state_yaw + angle_difference(yaw, state_yaw);

        let mut observation = SMatrix::<f64, 4, BICYCLE_DIM>::zeros();
        observation[(0, X)] = 1.0;
        observation[(1, Y)] = 1.0;
        observation[(2, YAW)] = 1.0;
        observation[(3, VEL)] = 1.0;
        self.state
            .correct(&Vector4::new(x, y, wrapped_yaw, vel), &observation, &noise)?;
        self.limit_states();
        Ok(())
    }

    /// Squared Mahalanobis distance of a position measurement.
    pub fn mahalanobis_squared(&self, x: f64, y: f64, noise: Matrix2<f64>) -> Option<f64> {
        let mut observation = SMatrix::<f64, 2, BICYCLE_DIM>::zeros();
        observation[(0, X)] = 1.0;
        observation[(1, Y)] = 1.0;
        self.state
            .mahalanobis_squared(&Vector2::new(x, y), &observation, &noise)
    }

    fn limit_states(&mut self) {
        let max_speed = self.params.max_speed;
        let max_slip = self.params.max_slip;
        let mean = &mut self.state.mean;
        mean[YAW] = normalize_radian(mean[YAW]);
        mean[VEL] = mean[VEL].clamp(-max_speed, max_speed);
        mean[SLIP] = mean[SLIP].clamp(-max_slip, max_slip);
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

    /// Speed along the body axis [m/s].
    #[inline]
    pub fn velocity(&self) -> f64 {
        self.state.mean[VEL]
    }

    /// Slip angle [rad].
    #[inline]
    pub fn slip(&self) -> f64 {
        self.state.mean[SLIP]
    }

    /// Body-frame velocity `[vel*cos(slip), vel*sin(slip)]`.
    #[inline]
    pub fn body_velocity(&self) -> Vector2<f64> {
        let vel = self.velocity();
        let (sin_slip, cos_slip) = self.slip().sin_cos();
        Vector2::new(vel * cos_slip, vel * sin_slip)
    }

    /// Yaw rate implied by the current speed and slip [rad/s].
    #[inline]
    pub fn turn_rate(&self) -> f64 {
        self.velocity() / self.lr * self.slip().sin()
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

    /// Slip variance.
    #[inline]
    pub fn slip_variance(&self) -> f64 {
        self.state.covariance[(SLIP, SLIP)]
    }

    /// Covariance between speed and slip.
    #[inline]
    pub fn velocity_slip_covariance(&self) -> f64 {
        self.state.covariance[(VEL, SLIP)]
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
fn initial_covariance(
    params: &BicycleModelParams,
    yaw: f64,
) -> SMatrix<f64, BICYCLE_DIM, BICYCLE_DIM> {
    let (sin_yaw, cos_yaw) = yaw.sin_cos();
    let sin_2yaw = (2.0 * yaw).sin();
    let p0x = params.p0_cov_pos_x;
    let p0y = params.p0_cov_pos_y;

    let mut covariance = SMatrix::<f64, BICYCLE_DIM, BICYCLE_DIM>::zeros();
    covariance[(X, X)] = p0x * cos_yaw * cos_yaw + p0y * sin_yaw * sin_yaw;
    covariance[(X, Y)] = 0.5 * (p0x - p0y) * sin_2yaw;
    covariance[(Y, X)] = covariance[(X, Y)];
    covariance[(Y, Y)] = p0x * sin_yaw * sin_yaw + p0y * cos_yaw * cos_yaw;
    covariance[(YAW, YAW)] = params.p0_cov_yaw;
    covariance[(VEL, VEL)] = params.p0_cov_vel;
    covariance[(SLIP, SLIP)] = params.p0_cov_slip;
    covariance
}

// ============================================================================
// Tests
// ============================================================================
