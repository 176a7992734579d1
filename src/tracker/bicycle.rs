//! Bicycle and motorcycle tracker
//!
//! Same kinematic bicycle model as the vehicle tracker, but with the
//! two-wheeler parameter row and no velocity measurement: detected speed
//! only seeds the initial state, after that speed is inferred from position
//! updates alone.

use nalgebra::{Matrix3, Vector2};

use crate::motion::BicycleMotionModel;
use crate::tracker::object_model::{self, ObjectModel};
use crate::tracker::{bicycle_kinematics, rotated_position_noise, Kinematics, SHAPE_KEEP_GAIN};
use crate::types::object::{DetectedObject, OrientationAvailability};
use crate::types::shape::Shape;
use crate::utils::align_to_half_turn;
use crate::Result;

/// Bicycle-model tracker for two-wheelers.
#[derive(Debug, Clone)]
pub struct BicycleTracker {
    model: ObjectModel,
    motion: BicycleMotionModel,
    length: f64,
    width: f64,
    height: f64,
    z: f64,
    roll: f64,
    pitch: f64,
}

impl BicycleTracker {
    /// Creates a tracker from an unmatched detection.
    pub fn new(detection: &DetectedObject) -> Self {
        let model = object_model::BICYCLE;

        let limit = model.size_limit;
        // A non-box detection carries no usable dimensions; start from the
        // class size prior instead.
        let (l, w, h) = match detection.shape {
            Shape::BoundingBox {
                length,
                width,
                height,
            } => (length, width, height),
            _ => {
                let s = model.init_size;
                (s.length, s.width, s.height)
            }
        };
        let length = l.clamp(limit.length_min, limit.length_max);
        let width = w.clamp(limit.width_min, limit.width_max);
        let height = h.clamp(limit.height_min, limit.height_max);

        let position = detection.pose.position;
        let yaw = detection.pose.yaw();
        let vel = detection.longitudinal_velocity.unwrap_or(0.0);
        let motion = BicycleMotionModel::new(
            position.x,
            position.y,
            yaw,
            vel,
            length,
            model.bicycle_params(),
        );
        let (roll, pitch, _) = detection.pose.orientation.euler_angles();

        Self {
            model,
            motion,
            length,
            width,
            height,
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
        // Only box measurements carry dimensions worth blending in.
        let (l, w, h) = match detection.shape {
            Shape::BoundingBox {
                length,
                width,
                height,
            } => (length, width, height),
            _ => return,
        };
        let mix = 1.0 - SHAPE_KEEP_GAIN;
        let limit = self.model.size_limit;
        self.length =
            (SHAPE_KEEP_GAIN * self.length + mix * l).clamp(limit.length_min, limit.length_max);
        self.width =
            (SHAPE_KEEP_GAIN * self.width + mix * w).clamp(limit.width_min, limit.width_max);
        self.height =
            (SHAPE_KEEP_GAIN * self.height + mix * h).clamp(limit.height_min, limit.height_max);
        self.motion.update_wheelbase(self.length);
    }

    /// Kinematic snapshot, extrapolated by `dt` seconds when beyond the
    /// readout tolerance.
    pub(crate) fn kinematics(&self, dt: f64) -> Result<Kinematics> {
        bicycle_kinematics(&self.motion, self.z, self.roll, self.pitch, dt)
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
        Shape::BoundingBox {
            length: self.length,
            width: self.width,
            height: self.height,
        }
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
