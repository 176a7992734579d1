//! Pedestrian tracker
//!
//! Pedestrians turn on the spot, so they run the constant-turn-rate model
//! instead of the bicycle model. Shape may arrive as a bounding box or a
//! cylinder; dimensions are blended while the representation stays the same
//! and adopted outright when it changes.

use nalgebra::{Matrix3, Matrix6, Point3, UnitQuaternion, Vector2, Vector3};

use crate::motion::CtrvMotionModel;
use crate::tracker::object_model::{self, ObjectModel};
use crate::tracker::{
    rotated_position_noise, Kinematics, EXTRAPOLATION_MIN_DT, SHAPE_KEEP_GAIN, UNMODELED_COV,
};
use crate::types::object::{cov, DetectedObject, OrientationAvailability, Pose, Twist};
use crate::types::shape::Shape;
use crate::utils::align_to_half_turn;
use crate::Result;

/// Turn-rate-model tracker for pedestrians.
#[derive(Debug, Clone)]
pub struct PedestrianTracker {
    model: ObjectModel,
    motion: CtrvMotionModel,
    shape: Shape,
    z: f64,
    roll: f64,
    pitch: f64,
}

impl PedestrianTracker {
    /// Creates a tracker from an unmatched detection.
    pub fn new(detection: &DetectedObject) -> Self {
        let model = object_model::PEDESTRIAN;

        let position = detection.pose.position;
        let yaw = detection.pose.yaw();
        let vel = detection.longitudinal_velocity.unwrap_or(0.0);
        let motion = CtrvMotionModel::new(position.x, position.y, yaw, vel, model.ctrv_params());
        let (roll, pitch, _) = detection.pose.orientation.euler_angles();

        Self {
            model,
            motion,
            shape: clamp_shape(detection.shape, &model),
            z: position.z,
            roll,
            pitch,
        }
    }

    /// Advances the motion state by `dt` seconds.
    pub fn predict_by(&mut self, dt: f64) -> Result<()> {
        self.motion.predict_by(dt)
    }

    /// Applies one matched detection.
    pub fn update(&mut self, detection: &DetectedObject) -> Result<()> {
        let motion_result = self.update_motion(detection);
        self.update_shape(detection);
        motion_result
    }

    fn update_motion(&mut self, detection: &DetectedObject) -> Result<()> {
        let position = detection.pose.position;
        let measured_yaw = detection.pose.yaw();

        let mc = self.model.measurement_covariance;
        let position_noise = rotated_position_noise(mc.pos_x, mc.pos_y, measured_yaw);

        let result = match detection.orientation {
            OrientationAvailability::Unavailable => {
                self.motion
                    .correct_pose(position.x, position.y, position_noise)
            }
            availability => {
                let yaw = if availability == OrientationAvailability::SignUnknown {
                    align_to_half_turn(measured_yaw, self.motion.yaw())
                } else {
                    measured_yaw
                };
                let mut noise = Matrix3::zeros();
                noise
                    .fixed_view_mut::<2, 2>(0, 0)
                    .copy_from(&position_noise);
                noise[(2, 2)] = mc.yaw;
                self.motion
                    .correct_pose_yaw(position.x, position.y, yaw, noise)
            }
        };

        let mix = 1.0 - SHAPE_KEEP_GAIN;
        self.z = SHAPE_KEEP_GAIN * self.z + mix * position.z;
        let (roll, pitch, _) = detection.pose.orientation.euler_angles();
        self.roll = roll;
        self.pitch = pitch;
        result
    }

    fn update_shape(&mut self, detection: &DetectedObject) {
        // Blend while the representation matches; a representation switch
        // restarts from the measurement.
        let blended = self
            .shape
            .blended_toward(&detection.shape, SHAPE_KEEP_GAIN)
            .unwrap_or(detection.shape);
        self.shape = clamp_shape(blended, &self.model);
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
            orientation: UnitQuaternion::from_euler_angles(self.roll, self.pitch, motion.yaw()),
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
        pose_covariance[(cov::YAW, cov::YAW)] = motion.yaw_variance();

        // Body-frame speed is purely longitudinal in this model.
        let twist = Twist {
            linear: Vector3::new(motion.velocity(), 0.0, 0.0),
            angular: Vector3::new(0.0, 0.0, motion.turn_rate()),
        };

        let mut twist_covariance = Matrix6::zeros();
        twist_covariance[(cov::X, cov::X)] = motion.velocity_variance();
        twist_covariance[(cov::X, cov::YAW)] = motion.velocity_turn_rate_covariance();
        twist_covariance[(cov::YAW, cov::X)] = motion.velocity_turn_rate_covariance();
        twist_covariance[(cov::YAW, cov::YAW)] = motion.turn_rate_variance();
        twist_covariance[(cov::Y, cov::Y)] = UNMODELED_COV;
        twist_covariance[(cov::Z, cov::Z)] = UNMODELED_COV;
        twist_covariance[(cov::ROLL, cov::ROLL)] = UNMODELED_COV;
        twist_covariance[(cov::PITCH, cov::PITCH)] = UNMODELED_COV;

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

    /// Current heading estimate.
    #[inline]
    pub fn yaw(&self) -> f64 {
        self.motion.yaw()
    }

    /// Current smoothed shape.
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

/// Clamps either shape representation into the class size limits. Cylinder
/// diameters clamp against the width bounds.
fn clamp_shape(shape: Shape, model: &ObjectModel) -> Shape {
    let limit = model.size_limit;
    match shape {
        Shape::BoundingBox {
            length,
            width,
            height,
        } => Shape::BoundingBox {
            length: length.clamp(limit.length_min, limit.length_max),
            width: width.clamp(limit.width_min, limit.width_max),
            height: height.clamp(limit.height_min, limit.height_max),
        },
        Shape::Cylinder { radius, height } => Shape::Cylinder {
            radius: radius.clamp(0.5 * limit.width_min, 0.5 * limit.width_max),
            height: height.clamp(limit.height_min, limit.height_max),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================
