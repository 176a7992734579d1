//! Kinetrack: multi-object tracking core
//!
//! Per-object state estimation for perception pipelines: class-specific
//! Kalman/EKF motion models, decaying classification fusion, gated
//! minimum-cost data association and a manager that runs the full
//! predict-associate-update-spawn-prune cycle per detection batch.
//!
//! # Architecture
//!
//! - [`types`]: detections, tracked objects, shapes, classification, time
//! - [`filter`]: the shared Kalman state and update equations
//! - [`motion`]: constant-velocity, constant-turn-rate and bicycle models
//! - [`tracker`]: per-class trackers binding a motion model to an identity
//! - [`association`]: gated cost matrix and minimum-cost matching
//! - [`manager`]: track arena and the per-batch processing cycle

pub mod association;
pub mod filter;
pub mod manager;
pub mod motion;
pub mod tracker;
pub mod types;
pub mod utils;

pub mod prelude {
    pub use crate::association::{AssociationConfig, AssociationResult, Associator};
    pub use crate::manager::{TrackHandle, TrackerManager, TrackerManagerConfig};
    pub use crate::tracker::{Track, TrackPhase, TrackerChoice, TrackerKind};
    pub use crate::types::classification::{Classification, FusionConfig, ObjectLabel};
    pub use crate::types::ident::{IdProvider, RandomIdProvider, SequentialIdProvider, TrackId};
    pub use crate::types::object::{
        DetectedObject, OrientationAvailability, Pose, TrackedObject, Twist,
    };
    pub use crate::types::shape::Shape;
    pub use crate::types::time::Stamp;
}

use thiserror::Error;

/// Error types for the library
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackError {
    /// Configuration rejected at construction; nothing was processed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A prediction was requested backwards in time.
    #[error("negative time delta: {dt} s")]
    NegativeTimeDelta { dt: f64 },

    /// Innovation covariance could not be inverted during a correction.
    #[error("innovation covariance is singular")]
    SingularInnovation,

    /// State or covariance stopped being finite.
    #[error("numerical instability detected")]
    NumericalInstability,

    /// A detection failed validation and was rejected.
    #[error("invalid detection: {0}")]
    InvalidDetection(String),
}

pub type Result<T> = ::core::result::Result<T, TrackError>;
