//! Unclassified object tracker
//!
//! Objects without a usable class run a free constant-velocity filter in the
//! world frame. Heading and shape are not estimated at all; both are taken
//! verbatim from the latest matched detection, and the reported twist is the
//! filtered world velocity rotated into that reported heading.

use nalgebra::{Matrix2, Matrix6, Point3, Rotation2, UnitQuaternion, Vector2, Vector3};

use crate::motion::{CvModelParams, CvMotionModel};
use crate::tracker::object_model::{self, UnknownObjectModel};
use crate::tracker::{Kinematics, EXTRAPOLATION_MIN_DT, SHAPE_KEEP_GAIN, UNMODELED_COV};
use crate::types::object::{cov, DetectedObject, Pose, Twist};
use crate::types::shape::Shape;
use crate::Result;

/// Constant-velocity tracker for unclassified objects.
#[derive(Debug, Clone)]
pub struct UnknownTracker {
    model: UnknownObjectModel,
    motion: CvMotionModel,
    orientation: UnitQuaternion<f64>,
    shape: Shape,
    z: f64,
}

impl UnknownTracker {
    /// Creates a tracker from an unmatched detection.
    ///
    /// A measured speed, when present, seeds the world velocity along the
    /// detected heading; otherwise the filter starts at rest with the wide
    /// initial velocity covariance doing the work.
    pub fn new(detection: &DetectedObject) -> Self {
        let model = object_model::UNKNOWN;
        let params = CvModelParams {
            q_stddev_pos: model.q_stddev_pos,
            q_stddev_vel: model.q_stddev_vel,
            max_speed: model.vel_max,
            p0_cov_pos: model.p0_cov_pos,
            p0_cov_vel: model.p0_cov_vel,
        };

        let position = detection.pose.position;
        let yaw = detection.pose.yaw();
        let speed = detection.longitudinal_velocity.unwrap_or(0.0);
        let motion = CvMotionModel::new(
            position.x,
            position.y,
            speed * yaw.cos(),
            speed * yaw.sin(),
            params,
        );

        Self {
            model,
            motion,
            orientation: detection.pose.orientation,
            shape: detection.shape,
            z: position.z,
        }
    }

    /// Advances the motion state by `dt` seconds.
    pub fn predict_by(&mut self, dt: f64) -> Result<()> {
        self.motion.predict_by(dt)
    }

    /// Applies one matched detection.
    ///
    /// Kinematics get a position correction; orientation and shape are
    /// replaced by the measurement.
    pub fn update(&mut self, detection: &DetectedObject) -> Result<()> {
        let position = detection.pose.position;
        let noise = Matrix2::from_diagonal_element(self.model.r_cov_pos);
        let result = self.motion.correct_pose(position.x, position.y, noise);

        self.orientation = detection.pose.orientation;
        self.shape = detection.shape;
        let mix = 1.0 - SHAPE_KEEP_GAIN;
        self.z = SHAPE_KEEP_GAIN * self.z + mix * position.z;
        result
    }

    /// Kinematic snapshot, extrapolated by `dt` seconds when beyond the
    /// readout tolerance.
    pub(crate) fn kinematics(&self, dt: f64) -> Result<Kinematics> {
        let dt = dt.max(0.0);
        let extrapolated;
        let motion = if dt > EXTRAPOLATION_MIN_DT {
            extrapolated = self.motion.predicted_by(dt)?;
            &extrapolated
        } else {
            &self.motion
        };

        let position = motion.position();
        let pose = Pose {
            position: Point3::new(position.x, position.y, self.z),
            orientation: self.orientation,
        };

        let p = motion.position_covariance();
        let mut pose_covariance = Matrix6::zeros();
        pose_covariance[(cov::X, cov::X)] = p[(0, 0)];
        pose_covariance[(cov::X, cov::Y)] = p[(0, 1)];
        pose_covariance[(cov::Y, cov::X)] = p[(1, 0)];
        pose_covariance[(cov::Y, cov::Y)] = p[(1, 1)];
        pose_covariance[(cov::Z, cov::Z)] = UNMODELED_COV;
        pose_covariance[(cov::ROLL, cov::ROLL)] = UNMODELED_COV;
        pose_covariance[(cov::PITCH, cov::PITCH)] = UNMODELED_COV;
        // Heading is never estimated for unclassified objects.
        pose_covariance[(cov::YAW, cov::YAW)] = UNMODELED_COV;

        let yaw = pose.yaw();
        let to_body = Rotation2::new(-yaw);
        let body_velocity = to_body * motion.velocity();
        let twist = Twist {
            linear: Vector3::new(body_velocity.x, body_velocity.y, 0.0),
            angular: Vector3::zeros(),
        };

        let rotated = to_body.matrix() * motion.velocity_covariance() * to_body.matrix().transpose();
        let mut twist_covariance = Matrix6::zeros();
        twist_covariance[(cov::X, cov::X)] = rotated[(0, 0)];
        twist_covariance[(cov::X, cov::Y)] = rotated[(0, 1)];
        twist_covariance[(cov::Y, cov::X)] = rotated[(1, 0)];
        twist_covariance[(cov::Y, cov::Y)] = rotated[(1, 1)];
        twist_covariance[(cov::Z, cov::Z)] = UNMODELED_COV;
        twist_covariance[(cov::ROLL, cov::ROLL)] = UNMODELED_COV;
        twist_covariance[(cov::PITCH, cov::PITCH)] = UNMODELED_COV;
        twist_covariance[(cov::YAW, cov::YAW)] = UNMODELED_COV;

        Ok(Kinematics {
            pose,
            pose_covariance,
            twist,
            twist_covariance,
        })
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Current position estimate.
    #[inline]
    pub fn position(&self) -> Vector2<f64> {
        self.motion.position()
    }

    /// Heading of the latest matched detection.
    #[inline]
    pub fn yaw(&self) -> f64 {
        self.orientation.euler_angles().2
    }

    /// Shape of the latest matched detection.
    #[inline]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// True while the filter state is numerically usable.
    #[inline]
    pub fn is_healthy(&self) -> bool {
        self.motion.is_healthy()
    }

    /// Restores the inflated initial covariance after a numerical failure.
    pub fn reset_covariance(&mut self) {
        self.motion.reset_covariance();
    }
}

// ============================================================================
// Tests
// ============================================================================
