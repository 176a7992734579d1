//! Detection inputs and tracked-object outputs
//!
//! These are the two public representations the core converts between. A
//! [`DetectedObject`] is consumed once per batch; a [`TrackedObject`] is the
//! published snapshot of one live track at the batch timestamp.

use nalgebra::{Isometry3, Matrix6, Point3, UnitQuaternion, Vector3};

use crate::types::classification::{Classification, ObjectLabel};
use crate::types::ident::TrackId;
use crate::types::shape::Shape;
use crate::types::time::Stamp;

/// Rigid transform from the sensor frame into the tracking (world) frame.
pub type Transform = Isometry3<f64>;

/// Row/column indices into the 6x6 pose and twist covariance matrices.
///
/// Order is x, y, z, roll, pitch, yaw (twist: linear x/y/z, angular x/y/z).
pub mod cov {
    pub const X: usize = 0;
    pub const Y: usize = 1;
    pub const Z: usize = 2;
    pub const ROLL: usize = 3;
    pub const PITCH: usize = 4;
    pub const YAW: usize = 5;
}

// ============================================================================
// Pose and twist
// ============================================================================

/// Position and orientation in the tracking frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Point3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl Pose {
    /// Planar pose at height zero with the given heading.
    pub fn from_xy_yaw(x: f64, y: f64, yaw: f64) -> Self {
        Self {
            position: Point3::new(x, y, 0.0),
            orientation: UnitQuaternion::from_euler_angles(0.0, 0.0, yaw),
        }
    }

    /// Heading angle in the ground plane.
    #[inline]
    pub fn yaw(&self) -> f64 {
        self.orientation.euler_angles().2
    }

    /// True when position and orientation contain only finite values.
    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|v| v.is_finite())
            && self.orientation.coords.iter().all(|v| v.is_finite())
    }

    /// This pose expressed in the target frame of `transform`.
    pub fn transformed(&self, transform: &Transform) -> Self {
        Self {
            position: transform * self.position,
            orientation: transform.rotation * self.orientation,
        }
    }
}

/// Linear and angular velocity, expressed in the object body frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Twist {
    pub linear: Vector3<f64>,
    pub angular: Vector3<f64>,
}

impl Twist {
    pub fn zero() -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: Vector3::zeros(),
        }
    }
}

// ============================================================================
// Detection
// ============================================================================

/// How much of the detected orientation can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrientationAvailability {
    /// No usable heading; only position is corrected.
    Unavailable,
    /// Heading known up to a 180 degree ambiguity (common for box fitting).
    #[default]
    SignUnknown,
    /// Full heading available.
    Available,
}

/// One observation of an object at the batch timestamp.
#[derive(Debug, Clone)]
pub struct DetectedObject {
    pub pose: Pose,
    pub shape: Shape,
    pub classification: Classification,
    pub orientation: OrientationAvailability,
    /// Measured speed along the body axis [m/s], when the sensor provides
    /// one (radar does, most lidar pipelines do not).
    pub longitudinal_velocity: Option<f64>,
}

impl DetectedObject {
    /// True when pose, shape and velocity carry only finite, positive values.
    ///
    /// The classification invariant is enforced by [`Classification`]'s
    /// constructor, so it needs no extra check here.
    pub fn is_valid(&self) -> bool {
        self.pose.is_finite()
            && self.shape.is_valid()
            && self.longitudinal_velocity.map_or(true, f64::is_finite)
    }

    /// Highest-probability label of this detection.
    #[inline]
    pub fn label(&self) -> ObjectLabel {
        self.classification.highest_probability_label()
    }

    /// The detection expressed in the tracking frame.
    ///
    /// Returns `None` when the transformed pose is not finite, so a bad
    /// transform drops this detection alone and never poisons the batch.
    pub fn transformed(&self, transform: &Transform) -> Option<DetectedObject> {
        let pose = self.pose.transformed(transform);
        if !pose.is_finite() {
            return None;
        }
        Some(DetectedObject {
            pose,
            shape: self.shape,
            classification: self.classification.clone(),
            orientation: self.orientation,
            // Speed along the body axis is invariant under a rigid transform.
            longitudinal_velocity: self.longitudinal_velocity,
        })
    }
}

// ============================================================================
// Tracked object
// ============================================================================

/// Published snapshot of one track at a given timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedObject {
    /// Persistent identity; stable for the track's lifetime, never reused.
    pub id: TrackId,
    /// Timestamp the kinematic state refers to.
    pub time: Stamp,
    /// Highest-probability label of the fused distribution.
    pub label: ObjectLabel,
    /// Full fused classification distribution.
    pub classification: Classification,
    pub pose: Pose,
    /// 6x6 pose covariance, ordered per [`cov`].
    pub pose_covariance: Matrix6<f64>,
    /// Velocity in the object body frame.
    pub twist: Twist,
    /// 6x6 twist covariance, ordered per [`cov`].
    pub twist_covariance: Matrix6<f64>,
    pub shape: Shape,
}
