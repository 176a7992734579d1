//! Vehicle tracker
//!
//! Tracks car, truck, bus and trailer detections with the kinematic bicycle
//! model. The two vehicle families share the tracker; they differ only in
//! the parameter table row and in the measurement noise applied when a
//! detection's label disagrees with the tracked family.

use nalgebra::{Matrix3, Matrix4, Vector2};

use crate::motion::BicycleMotionModel;
use crate::tracker::object_model::{self, ObjectModel};
use crate::tracker::{bicycle_kinematics, rotated_position_noise, Kinematics, SHAPE_KEEP_GAIN};
use crate::types::object::{DetectedObject, OrientationAvailability};
use crate::types::shape::Shape;
use crate::utils::{align_to_half_turn, kmph2mps};
use crate::Result;

/// Position noise used when the detected label names the other vehicle
/// family, which usually means the box estimate is off.
const CROSS_FAMILY_R_STDDEV: f64 = 2.0;

/// Largest gap between measured and predicted speed that still corrects the
/// velocity state.
const VELOCITY_DEVIATION_MAX: f64 = kmph2mps(10.0);

/// Bicycle-model tracker for the vehicle classes.
#[derive(Debug, Clone)]
pub struct VehicleTracker {
    model: ObjectModel,
    is_big: bool,
    motion: BicycleMotionModel,
    length: f64,
    width: f64,
    height: f64,
    z: f64,
    roll: f64,
    pitch: f64,
}

impl VehicleTracker {
    /// Creates a car-family tracker from an unmatched detection.
    pub fn normal(detection: &DetectedObject) -> Self {
        Self::with_family(false, detection)
    }

    /// Creates a truck/bus/trailer-family tracker from an unmatched
    /// detection.
    pub fn big(detection: &DetectedObject) -> Self {
        Self::with_family(true, detection)
    }

    fn with_family(is_big: bool, detection: &DetectedObject) -> Self {
        let model = if is_big {
            object_model::BIG_VEHICLE
        } else {
            object_model::NORMAL_VEHICLE
        };

        let limit = model.size_limit;
        // A non-box detection carries no usable vehicle dimensions; start
        // from the class size prior instead.
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
            is_big,
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
    ///
    /// Shape and elevation are smoothed even when the motion correction
    /// fails, so a numerical hiccup never freezes the size estimate.
    pub fn update(&mut self, detection: &DetectedObject) -> Result<()> {
        let motion_result = self.update_motion(detection);
        self.update_shape(detection);
        motion_result
    }

    fn update_motion(&mut self, detection: &DetectedObject) -> Result<()> {
        let position = detection.pose.position;
        let measured_yaw = detection.pose.yaw();

        let mc = self.model.measurement_covariance;
        let label = detection.label();
        let cross_family = label.is_vehicle() && label.is_large_vehicle() != self.is_big;
        let (r_cov_x, r_cov_y) = if cross_family {
            let enlarged = CROSS_FAMILY_R_STDDEV * CROSS_FAMILY_R_STDDEV;
            (enlarged, enlarged)
        } else {
            (mc.pos_x, mc.pos_y)
        };
        let position_noise = rotated_position_noise(r_cov_x, r_cov_y, measured_yaw);

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

                let velocity = detection
                    .longitudinal_velocity
                    .filter(|v| (v - self.motion.velocity()).abs() < VELOCITY_DEVIATION_MAX);
                match velocity {
                    Some(vel) => {
                        let mut noise = Matrix4::zeros();
                        noise
                            .fixed_view_mut::<2, 2>(0, 0)
                            .copy_from(&position_noise);
                        noise[(2, 2)] = mc.yaw;
                        noise[(3, 3)] = mc.vel_long;
                        self.motion
                            .correct_pose_yaw_velocity(position.x, position.y, yaw, vel, noise)
                    }
                    None => {
                        let mut noise = Matrix3::zeros();
                        noise
                            .fixed_view_mut::<2, 2>(0, 0)
                            .copy_from(&position_noise);
                        noise[(2, 2)] = mc.yaw;
                        self.motion
                            .correct_pose_yaw(position.x, position.y, yaw, noise)
                    }
                }
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

    /// Current longitudinal speed estimate [m/s].
    #[inline]
    pub fn velocity(&self) -> f64 {
        self.motion.velocity()
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
