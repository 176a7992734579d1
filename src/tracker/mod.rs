//! Per-class trackers and the track lifecycle
//!
//! A [`Track`] binds a persistent identity and fused classification to one
//! concrete tracker. Concrete trackers pair a motion model with the class
//! parameter table row and the class-specific measurement handling; the
//! [`TrackerKind`] enum dispatches over them.
//!
//! Lifecycle: a track spawns from an unmatched detection with the first
//! measurement already applied, stays in [`TrackPhase::Tracking`] while
//! matched, moves to [`TrackPhase::Coasting`] on missed updates and is
//! marked [`TrackPhase::Expired`] by the manager when it falls behind for
//! too long. `Expired` is terminal.

use nalgebra::{Matrix2, Matrix6, Point3, UnitQuaternion, Vector2, Vector3};
use tracing::warn;

use crate::motion::BicycleMotionModel;
use crate::types::classification::{Classification, FusionConfig, ObjectLabel};
use crate::types::ident::TrackId;
use crate::types::object::{cov, DetectedObject, Pose, TrackedObject, Twist};
use crate::types::shape::Shape;
use crate::types::time::Stamp;
use crate::{Result, TrackError};

pub mod bicycle;
pub mod object_model;
pub mod pedestrian;
pub mod unknown;
pub mod vehicle;

pub use bicycle::BicycleTracker;
pub use pedestrian::PedestrianTracker;
pub use unknown::UnknownTracker;
pub use vehicle::VehicleTracker;

// ============================================================================
// Shared constants and helpers
// ============================================================================

/// Fraction of the previous shape and elevation kept per update.
pub(crate) const SHAPE_KEEP_GAIN: f64 = 0.9;

/// Variance reported for state the planar filters do not model (z, roll,
/// pitch and friends).
pub(crate) const UNMODELED_COV: f64 = 0.1 * 0.1;

/// Readouts closer to the filter time than this are served without
/// extrapolating.
pub(crate) const EXTRAPOLATION_MIN_DT: f64 = 1e-3;

/// Rotates object-frame position noise into the world frame by the measured
/// heading.
pub(crate) fn rotated_position_noise(r_cov_x: f64, r_cov_y: f64, yaw: f64) -> Matrix2<f64> {
    let cos = yaw.cos();
    let sin = yaw.sin();
    let cross = 0.5 * (r_cov_x - r_cov_y) * (2.0 * yaw).sin();
    Matrix2::new(
        r_cov_x * cos * cos + r_cov_y * sin * sin,
        cross,
        cross,
        r_cov_x * sin * sin + r_cov_y * cos * cos,
    )
}

/// Pose and twist of one track with their 6x6 covariances, ordered per
/// [`cov`].
#[derive(Debug, Clone)]
pub struct Kinematics {
    pub pose: Pose,
    pub pose_covariance: Matrix6<f64>,
    pub twist: Twist,
    pub twist_covariance: Matrix6<f64>,
}

/// Builds the kinematic snapshot shared by the bicycle-model trackers.
///
/// Extrapolates a copy of the motion state when `dt` exceeds the readout
/// tolerance; negative `dt` clamps to zero.
pub(crate) fn bicycle_kinematics(
    motion: &BicycleMotionModel,
    z: f64,
    roll: f64,
    pitch: f64,
    dt: f64,
) -> Result<Kinematics> {
    let dt = dt.max(0.0);
    let extrapolated;
    let motion = if dt > EXTRAPOLATION_MIN_DT {
        extrapolated = motion.predicted_by(dt)?;
        &extrapolated
    } else {
        motion
    };

    let position = motion.position();
    let pose = Pose {
        position: Point3::new(position.x, position.y, z),
        orientation: UnitQuaternion::from_euler_angles(roll, pitch, motion.yaw()),
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

    // Slip carries the velocity into a lateral body component; yaw rate
    // follows from speed, slip and the rear wheelbase.
    let body = motion.body_velocity();
    let twist = Twist {
        linear: Vector3::new(body.x, body.y, 0.0),
        angular: Vector3::new(0.0, 0.0, motion.turn_rate()),
    };

    let mut twist_covariance = Matrix6::zeros();
    twist_covariance[(cov::X, cov::X)] = motion.velocity_variance();
    twist_covariance[(cov::X, cov::YAW)] = motion.velocity_slip_covariance();
    twist_covariance[(cov::YAW, cov::X)] = motion.velocity_slip_covariance();
    twist_covariance[(cov::YAW, cov::YAW)] = motion.slip_variance();
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

// ============================================================================
// Tracker selection and dispatch
// ============================================================================

/// Which concrete tracker a label spawns. The manager maps labels to
/// choices; unmapped labels fall back to [`TrackerChoice::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerChoice {
    NormalVehicle,
    BigVehicle,
    Bicycle,
    Pedestrian,
    Unknown,
}

/// Concrete tracker variants.
#[derive(Debug, Clone)]
pub enum TrackerKind {
    Vehicle(VehicleTracker),
    Bicycle(BicycleTracker),
    Pedestrian(PedestrianTracker),
    Unknown(UnknownTracker),
}

impl TrackerKind {
    fn predict_by(&mut self, dt: f64) -> Result<()> {
        match self {
            TrackerKind::Vehicle(t) => t.predict_by(dt),
            TrackerKind::Bicycle(t) => t.predict_by(dt),
            TrackerKind::Pedestrian(t) => t.predict_by(dt),
            TrackerKind::Unknown(t) => t.predict_by(dt),
        }
    }

    fn update(&mut self, detection: &DetectedObject) -> Result<()> {
        match self {
            TrackerKind::Vehicle(t) => t.update(detection),
            TrackerKind::Bicycle(t) => t.update(detection),
            TrackerKind::Pedestrian(t) => t.update(detection),
            TrackerKind::Unknown(t) => t.update(detection),
        }
    }

    fn kinematics(&self, dt: f64) -> Result<Kinematics> {
        match self {
            TrackerKind::Vehicle(t) => t.kinematics(dt),
            TrackerKind::Bicycle(t) => t.kinematics(dt),
            TrackerKind::Pedestrian(t) => t.kinematics(dt),
            TrackerKind::Unknown(t) => t.kinematics(dt),
        }
    }

    fn reset_covariance(&mut self) {
        match self {
            TrackerKind::Vehicle(t) => t.reset_covariance(),
            TrackerKind::Bicycle(t) => t.reset_covariance(),
            TrackerKind::Pedestrian(t) => t.reset_covariance(),
            TrackerKind::Unknown(t) => t.reset_covariance(),
        }
    }

    /// Current position estimate.
    pub fn position(&self) -> Vector2<f64> {
        match self {
            TrackerKind::Vehicle(t) => t.position(),
            TrackerKind::Bicycle(t) => t.position(),
            TrackerKind::Pedestrian(t) => t.position(),
            TrackerKind::Unknown(t) => t.position(),
        }
    }

    /// Current heading estimate, or the last reported heading for trackers
    /// that do not estimate one.
    pub fn yaw(&self) -> f64 {
        match self {
            TrackerKind::Vehicle(t) => t.yaw(),
            TrackerKind::Bicycle(t) => t.yaw(),
            TrackerKind::Pedestrian(t) => t.yaw(),
            TrackerKind::Unknown(t) => t.yaw(),
        }
    }

    /// Current shape estimate.
    pub fn shape(&self) -> Shape {
        match self {
            TrackerKind::Vehicle(t) => t.shape(),
            TrackerKind::Bicycle(t) => t.shape(),
            TrackerKind::Pedestrian(t) => t.shape(),
            TrackerKind::Unknown(t) => t.shape(),
        }
    }

    /// True while the filter state is numerically usable.
    pub fn is_healthy(&self) -> bool {
        match self {
            TrackerKind::Vehicle(t) => t.is_healthy(),
            TrackerKind::Bicycle(t) => t.is_healthy(),
            TrackerKind::Pedestrian(t) => t.is_healthy(),
            TrackerKind::Unknown(t) => t.is_healthy(),
        }
    }
}

// ============================================================================
// Track lifecycle
// ============================================================================

/// Lifecycle phase of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackPhase {
    /// Matched in the latest processed batch.
    Tracking,
    /// Missed at least the latest batch, surviving on prediction.
    Coasting,
    /// Scheduled for removal. Terminal.
    Expired,
}

/// One tracked object: identity, fused classification, lifecycle counters
/// and the concrete tracker holding the kinematic state.
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    classification: Classification,
    kind: TrackerKind,
    phase: TrackPhase,
    spawned_at: Stamp,
    /// Time the kinematic state refers to; advanced by prediction.
    state_time: Stamp,
    /// Time of the last matched detection.
    last_measured: Stamp,
    total_measurements: u32,
    total_misses: u32,
    consecutive_misses: u32,
}

impl Track {
    /// Spawns a track from an unmatched detection, applying it as the first
    /// measurement.
    pub fn spawn(
        id: TrackId,
        detection: &DetectedObject,
        time: Stamp,
        choice: TrackerChoice,
    ) -> Self {
        let kind = match choice {
            TrackerChoice::NormalVehicle => TrackerKind::Vehicle(VehicleTracker::normal(detection)),
            TrackerChoice::BigVehicle => TrackerKind::Vehicle(VehicleTracker::big(detection)),
            TrackerChoice::Bicycle => TrackerKind::Bicycle(BicycleTracker::new(detection)),
            TrackerChoice::Pedestrian => TrackerKind::Pedestrian(PedestrianTracker::new(detection)),
            TrackerChoice::Unknown => TrackerKind::Unknown(UnknownTracker::new(detection)),
        };
        Self {
            id,
            classification: detection.classification.clone(),
            kind,
            phase: TrackPhase::Tracking,
            spawned_at: time,
            state_time: time,
            last_measured: time,
            total_measurements: 1,
            total_misses: 0,
            consecutive_misses: 0,
        }
    }

    /// Advances the kinematic state to `time`.
    ///
    /// A target before the current state time is logged and skipped; the
    /// state never runs backwards.
    pub fn predict_to(&mut self, time: Stamp) -> Result<()> {
        let dt = time.seconds_since(self.state_time);
        if dt < 0.0 {
            warn!(track = %self.id, dt, "prediction target precedes track state, skipping");
            return Ok(());
        }
        self.kind.predict_by(dt)?;
        self.state_time = time;
        Ok(())
    }

    /// Applies a matched detection stamped `time`.
    ///
    /// Fuses classification, corrects the kinematic state and resets the
    /// missed-update counter. A numerically failed correction (singular
    /// innovation, non-finite result) is recovered locally by restoring the
    /// initial covariance; the measurement still counts.
    pub fn update_with_measurement(
        &mut self,
        detection: &DetectedObject,
        time: Stamp,
        fusion: &FusionConfig,
    ) -> Result<()> {
        self.consecutive_misses = 0;
        self.total_measurements += 1;
        self.last_measured = time;
        self.phase = TrackPhase::Tracking;
        self.classification.fuse(&detection.classification, fusion);

        match self.kind.update(detection) {
            Err(err @ (TrackError::SingularInnovation | TrackError::NumericalInstability)) => {
                warn!(track = %self.id, %err, "correction failed, resetting covariance");
                self.kind.reset_covariance();
                Ok(())
            }
            other => other,
        }
    }

    /// Records a batch in which this track went unmatched.
    pub fn update_without_measurement(&mut self) {
        self.consecutive_misses += 1;
        self.total_misses += 1;
        if self.phase == TrackPhase::Tracking {
            self.phase = TrackPhase::Coasting;
        }
    }

    /// Marks the track for removal. Terminal.
    pub fn mark_expired(&mut self) {
        self.phase = TrackPhase::Expired;
    }

    /// Projects the track into its published representation at `time`.
    ///
    /// Pure read: repeated calls with the same `time` produce identical
    /// output. The state is extrapolated on a copy when `time` runs ahead
    /// of the filter; times behind the filter clamp to the filter time.
    pub fn tracked_object(&self, time: Stamp) -> Result<TrackedObject> {
        let dt = time.seconds_since(self.state_time);
        let kinematics = self.kind.kinematics(dt)?;
        Ok(TrackedObject {
            id: self.id,
            time,
            label: self.classification.highest_probability_label(),
            classification: self.classification.clone(),
            pose: kinematics.pose,
            pose_covariance: kinematics.pose_covariance,
            twist: kinematics.twist,
            twist_covariance: kinematics.twist_covariance,
            shape: self.kind.shape(),
        })
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    #[inline]
    pub fn id(&self) -> TrackId {
        self.id
    }

    #[inline]
    pub fn phase(&self) -> TrackPhase {
        self.phase
    }

    /// Highest-probability label of the fused distribution.
    #[inline]
    pub fn label(&self) -> ObjectLabel {
        self.classification.highest_probability_label()
    }

    #[inline]
    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    #[inline]
    pub fn position(&self) -> Vector2<f64> {
        self.kind.position()
    }

    #[inline]
    pub fn yaw(&self) -> f64 {
        self.kind.yaw()
    }

    #[inline]
    pub fn shape(&self) -> Shape {
        self.kind.shape()
    }

    /// Planar pose used for footprint overlap checks.
    pub fn footprint_pose(&self) -> Pose {
        let position = self.kind.position();
        Pose::from_xy_yaw(position.x, position.y, self.kind.yaw())
    }

    #[inline]
    pub fn spawned_at(&self) -> Stamp {
        self.spawned_at
    }

    #[inline]
    pub fn state_time(&self) -> Stamp {
        self.state_time
    }

    #[inline]
    pub fn last_measured(&self) -> Stamp {
        self.last_measured
    }

    /// Seconds from the last matched detection to `now`.
    #[inline]
    pub fn seconds_since_measured(&self, now: Stamp) -> f64 {
        now.seconds_since(self.last_measured)
    }

    #[inline]
    pub fn total_measurements(&self) -> u32 {
        self.total_measurements
    }

    #[inline]
    pub fn total_misses(&self) -> u32 {
        self.total_misses
    }

    #[inline]
    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses
    }

    /// True while the underlying filter state is numerically usable.
    #[inline]
    pub fn is_healthy(&self) -> bool {
        self.kind.is_healthy()
    }

    /// Shared access to the concrete tracker.
    #[inline]
    pub fn tracker(&self) -> &TrackerKind {
        &self.kind
    }
}

// ============================================================================
// Tests
// ============================================================================
