//! Constant-velocity (CV) motion model
//!
//! Linear model over `[x, y, vx, vy]` in the world frame. Used for objects
//! whose heading is unreliable or meaningless, so velocity is carried as a
//! free world-frame vector rather than a longitudinal speed.

use nalgebra::{Matrix2, Matrix4, SMatrix, Vector2, Vector4};

use crate::filter::KalmanState;
use crate::utils::kmph2mps;
use crate::{Result, TrackError};

// ============================================================================
// State indices
// ============================================================================

const X: usize = 0;
const Y: usize = 1;
const VX: usize = 2;
const VY: usize = 3;

/// State dimension of the CV model.
pub const CV_DIM: usize = 4;

// ============================================================================
// Parameters
// ============================================================================

/// Tuning constants for [`CvMotionModel`].
///
/// Process noise is expressed as standard deviations of the uncertain rate:
/// position noise in m/s and velocity noise in m/s^2. Per prediction step the
/// model maps them to variances as `(stddev * dt)^2`.
#[derive(Debug, Clone, Copy)]
pub struct CvModelParams {
    /// Process noise on x/y position [m/s].
    pub q_stddev_pos: f64,
    /// Process noise on vx/vy [m/s^2].
    pub q_stddev_vel: f64,
    /// Per-component velocity limit [m/s].
    pub max_speed: f64,
    /// Initial position variance [m^2].
    pub p0_cov_pos: f64,
    /// Initial velocity variance [(m/s)^2].
    pub p0_cov_vel: f64,
}

impl Default for CvModelParams {
    fn default() -> Self {
        Self {
            q_stddev_pos: 0.5,
            q_stddev_vel: 9.8 * 0.3,
            max_speed: kmph2mps(60.0),
            p0_cov_pos: 1.0,
            p0_cov_vel: kmph2mps(1000.0) * kmph2mps(1000.0),
        }
    }
}

// ============================================================================
// Model
// ============================================================================

/// Constant-velocity filter over `[x, y, vx, vy]`.
#[derive(Debug, Clone)]
pub struct CvMotionModel {
    params: CvModelParams,
    state: KalmanState<CV_DIM>,
}

impl CvMotionModel {
    /// Creates a model at the given world position and velocity.
    ///
    /// The initial covariance is isotropic since this model is used when the
    /// detected orientation carries no information.
    pub fn new(x: f64, y: f64, vx: f64, vy: f64, params: CvModelParams) -> Self {
        let mean = Vector4::new(x, y, vx, vy);
        let mut covariance = SMatrix::<f64, CV_DIM, CV_DIM>::zeros();
        covariance[(X, X)] = params.p0_cov_pos;
        covariance[(Y, Y)] = params.p0_cov_pos;
        covariance[(VX, VX)] = params.p0_cov_vel;
        covariance[(VY, VY)] = params.p0_cov_vel;
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

        let mean = self.state.mean;
        let predicted = Vector4::new(
            mean[X] + mean[VX] * dt,
            mean[Y] + mean[VY] * dt,
            mean[VX],
            mean[VY],
        );

        let mut jacobian = Matrix4::identity();
        jacobian[(X, VX)] = dt;
        jacobian[(Y, VY)] = dt;

        let q_pos = (self.params.q_stddev_pos * dt).powi(2);
        let q_vel = (self.params.q_stddev_vel * dt).powi(2);
        let process_noise =
            Matrix4::from_diagonal(&Vector4::new(q_pos, q_pos, q_vel, q_vel));

        self.state.predict_with(predicted, &jacobian, &process_noise);
        Ok(())
    }

    /// Returns a copy of the model advanced by `dt` seconds.
    pub fn predicted_by(&self, dt: f64) -> Result<Self> {
        let mut copy = self.clone();
        copy.predict_by(dt)?;
        Ok(copy)
    }

    // ------------------------------------------------------------------------
    // Correction
    // ------------------------------------------------------------------------

    /// Corrects with a position measurement `[x, y]`.
    pub fn correct_pose(
        &mut self,
        x: f64,
        y: f64,
        noise: Matrix2<f64>,
    ) -> Result<()> {
        let mut observation = SMatrix::<f64, 2, CV_DIM>::zeros();
        observation[(0, X)] = 1.0;
        observation[(1, Y)] = 1.0;
        self.state
            .correct(&Vector2::new(x, y), &observation, &noise)?;
        self.limit_states();
        Ok(())
    }

    /// Corrects with a position and world-frame velocity measurement
    /// `[x, y, vx, vy]`.
    pub fn correct_pose_velocity(
        &mut self,
        measurement: Vector4<f64>,
        noise: Matrix4<f64>,
    ) -> Result<()> {
        let observation = SMatrix::<f64, 4, CV_DIM>::identity();
        self.state.correct(&measurement, &observation, &noise)?;
        self.limit_states();
        Ok(())
    }

    /// Squared Mahalanobis distance of a position measurement.
    pub fn mahalanobis_squared(&self, x: f64, y: f64, noise: Matrix2<f64>) -> Option<f64> {
        let mut observation = SMatrix::<f64, 2, CV_DIM>::zeros();
        observation[(0, X)] = 1.0;
        observation[(1, Y)] = 1.0;
        self.state
            .mahalanobis_squared(&Vector2::new(x, y), &observation, &noise)
    }

    fn limit_states(&mut self) {
        let max = self.params.max_speed;
        let mean = &mut self.state.mean;
        mean[VX] = mean[VX].clamp(-max, max);
        mean[VY] = mean[VY].clamp(-max, max);
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// World-frame position `[x, y]`.
    #[inline]
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.state.mean[X], self.state.mean[Y])
    }

    /// World-frame velocity `[vx, vy]`.
    #[inline]
    pub fn velocity(&self) -> Vector2<f64> {
        Vector2::new(self.state.mean[VX], self.state.mean[VY])
    }

    /// Position covariance block.
    #[inline]
    pub fn position_covariance(&self) -> Matrix2<f64> {
        self.state
            .covariance
            .fixed_view::<2, 2>(X, X)
            .into_owned()
    }

    /// Velocity covariance block.
    #[inline]
    pub fn velocity_covariance(&self) -> Matrix2<f64> {
        self.state
            .covariance
            .fixed_view::<2, 2>(VX, VX)
            .into_owned()
    }

    /// True when mean and covariance are finite and usable.
    #[inline]
    pub fn is_healthy(&self) -> bool {
        self.state.is_healthy()
    }

    /// Restores the initial covariance, keeping the mean.
    pub fn reset_covariance(&mut self) {
        let mut covariance = SMatrix::<f64, CV_DIM, CV_DIM>::zeros();
        covariance[(X, X)] = self.params.p0_cov_pos;
        covariance[(Y, Y)] = self.params.p0_cov_pos;
        covariance[(VX, VX)] = self.params.p0_cov_vel;
        covariance[(VY, VY)] = self.params.p0_cov_vel;
        self.state.covariance = covariance;
    }
}

// ============================================================================
// Tests
// ============================================================================
