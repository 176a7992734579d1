//! Track manager running the per-batch processing cycle
//!
//! One [`TrackerManager::process`] call runs the full cycle for a detection
//! batch: validate and transform the detections, predict every live track to
//! the batch time, associate, apply matched measurements, record misses,
//! spawn trackers for unclaimed detections, prune stale and overlapping
//! tracks and emit the confident ones. The manager takes `&mut self` for the
//! whole cycle, so exclusive access is a compile-time property; a caller
//! driving it from several threads wraps it in a mutex held per cycle.
//!
//! Tracks live in a generational [`TrackArena`]; the manager additionally
//! keeps its handles in spawn order so association, pruning tie-breaks and
//! emission are deterministic for identical inputs.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::association::{AssociationConfig, Associator};
use crate::tracker::{Track, TrackerChoice};
use crate::types::classification::{FusionConfig, ObjectLabel};
use crate::types::ident::{IdProvider, RandomIdProvider};
use crate::types::object::{DetectedObject, TrackedObject, Transform};
use crate::types::time::Stamp;
use crate::utils::geometry::footprint_iou;
use crate::{Result, TrackError};

pub mod arena;

pub use arena::{TrackArena, TrackHandle};

// ============================================================================
// Configuration
// ============================================================================

/// Lifetime, overlap and confidence thresholds plus the nested association
/// and fusion configurations.
#[derive(Debug, Clone)]
pub struct TrackerManagerConfig {
    /// Which tracker a new detection spawns, by its highest-probability
    /// label. Labels missing from the map fall back to the unknown tracker.
    pub tracker_map: HashMap<ObjectLabel, TrackerChoice>,
    /// Consecutive misses at which a track is removed.
    pub max_consecutive_misses: u32,
    /// Seconds without a measurement at which a track is removed.
    pub max_elapsed_since_measurement: f64,
    /// Center distance in meters below which a track pair is checked for
    /// overlap.
    pub overlap_distance: f64,
    /// Footprint IoU above which the weaker of two known-label tracks is
    /// removed.
    pub overlap_min_iou: f64,
    /// Footprint IoU above which an unknown track overlapping another track
    /// is removed. Unknown shapes are unstable, so the cut is much looser.
    pub overlap_min_iou_unknown: f64,
    /// Total measurements at which a track becomes confident and is
    /// published.
    pub confident_count: u32,
    pub fusion: FusionConfig,
    pub association: AssociationConfig,
}

impl Default for TrackerManagerConfig {
    fn default() -> Self {
        use ObjectLabel::*;
        let tracker_map = HashMap::from([
            (Car, TrackerChoice::NormalVehicle),
            (Truck, TrackerChoice::BigVehicle),
            (Bus, TrackerChoice::BigVehicle),
            (Trailer, TrackerChoice::BigVehicle),
            (Motorcycle, TrackerChoice::Bicycle),
            (Bicycle, TrackerChoice::Bicycle),
            (Pedestrian, TrackerChoice::Pedestrian),
            (Unknown, TrackerChoice::Unknown),
        ]);
        Self {
            tracker_map,
            max_consecutive_misses: 10,
            max_elapsed_since_measurement: 1.0,
            overlap_distance: 5.0,
            overlap_min_iou: 0.1,
            overlap_min_iou_unknown: 0.001,
            confident_count: 3,
            fusion: FusionConfig::default(),
            association: AssociationConfig::default(),
        }
    }
}

impl TrackerManagerConfig {
    /// Checks every threshold for sane ranges, including the nested fusion
    /// and association tables.
    ///
    /// # Errors
    ///
    /// Returns [`TrackError::InvalidConfig`] describing the first offending
    /// field.
    pub fn validate(&self) -> Result<()> {
        if self.max_consecutive_misses == 0 {
            return Err(TrackError::InvalidConfig(
                "max_consecutive_misses must be at least 1".to_string(),
            ));
        }
        if !self.max_elapsed_since_measurement.is_finite()
            || self.max_elapsed_since_measurement <= 0.0
        {
            return Err(TrackError::InvalidConfig(
                "max_elapsed_since_measurement must be finite and positive".to_string(),
            ));
        }
        if !self.overlap_distance.is_finite() || self.overlap_distance <= 0.0 {
            return Err(TrackError::InvalidConfig(
                "overlap_distance must be finite and positive".to_string(),
            ));
        }
        for (name, iou) in [
            ("overlap_min_iou", self.overlap_min_iou),
            ("overlap_min_iou_unknown", self.overlap_min_iou_unknown),
        ] {
            if !(0.0..=1.0).contains(&iou) {
                return Err(TrackError::InvalidConfig(format!(
                    "{name} must be within [0, 1]"
                )));
            }
        }
        if self.confident_count == 0 {
            return Err(TrackError::InvalidConfig(
                "confident_count must be at least 1".to_string(),
            ));
        }
        self.fusion.validate()?;
        self.association.validate()?;
        Ok(())
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Owns the live tracks and runs the per-batch cycle.
pub struct TrackerManager {
    config: TrackerManagerConfig,
    associator: Associator,
    arena: TrackArena,
    /// Handles in spawn order; drives iteration everywhere order matters.
    order: Vec<TrackHandle>,
    ids: Box<dyn IdProvider>,
}

impl TrackerManager {
    /// Builds a manager with random track ids.
    ///
    /// # Errors
    ///
    /// Returns [`TrackError::InvalidConfig`] when the configuration fails
    /// validation; nothing is processed in that case.
    pub fn new(config: TrackerManagerConfig) -> Result<Self> {
        Self::with_id_provider(config, Box::new(RandomIdProvider))
    }

    /// Builds a manager with an injected id provider, letting tests use
    /// deterministic ids.
    ///
    /// # Errors
    ///
    /// Returns [`TrackError::InvalidConfig`] when the configuration fails
    /// validation.
    pub fn with_id_provider(
        config: TrackerManagerConfig,
        ids: Box<dyn IdProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let associator = Associator::new(config.association.clone())?;
        Ok(Self {
            config,
            associator,
            arena: TrackArena::new(),
            order: Vec::new(),
            ids,
        })
    }

    pub fn config(&self) -> &TrackerManagerConfig {
        &self.config
    }

    /// Number of live tracks, tentative ones included.
    pub fn track_count(&self) -> usize {
        self.arena.len()
    }

    /// Handles of the live tracks in spawn order.
    pub fn handles(&self) -> &[TrackHandle] {
        &self.order
    }

    /// Resolves a handle, `None` once the track was pruned.
    pub fn track(&self, handle: TrackHandle) -> Option<&Track> {
        self.arena.get(handle)
    }

    /// Live tracks in spawn order.
    pub fn tracks(&self) -> impl Iterator<Item = (TrackHandle, &Track)> {
        self.order
            .iter()
            .filter_map(|&handle| self.arena.get(handle).map(|track| (handle, track)))
    }

    /// Runs the full cycle for one detection batch and returns the confident
    /// tracks extrapolated to the batch time.
    ///
    /// Malformed detections are dropped with a diagnostic before association
    /// and never touch tracker state; a transform failure drops only the
    /// affected detection.
    pub fn process(
        &mut self,
        detections: &[DetectedObject],
        sensor_transform: &Transform,
        time: Stamp,
    ) -> Vec<TrackedObject> {
        let detections = self.sanitize(detections, sensor_transform);

        self.predict_all(time);

        let tracks: Vec<&Track> = self
            .order
            .iter()
            .filter_map(|&handle| self.arena.get(handle))
            .collect();
        let association = self.associator.associate(&tracks, &detections);

        for &(track_index, detection_index) in &association.matches {
            let handle = self.order[track_index];
            if let Some(track) = self.arena.get_mut(handle) {
                if let Err(error) = track.update_with_measurement(
                    &detections[detection_index],
                    time,
                    &self.config.fusion,
                ) {
                    warn!(track = %track.id(), %error, "measurement update failed");
                }
            }
        }
        for &track_index in &association.unmatched_tracks {
            let handle = self.order[track_index];
            if let Some(track) = self.arena.get_mut(handle) {
                track.update_without_measurement();
            }
        }
        for &detection_index in &association.unmatched_detections {
            self.spawn(&detections[detection_index], time);
        }

        self.prune(time);

        self.tracked_objects(time)
    }

    /// Confident tracks extrapolated to `time`, in spawn order.
    pub fn tracked_objects(&self, time: Stamp) -> Vec<TrackedObject> {
        self.tracks()
            .filter(|(_, track)| track.total_measurements() >= self.config.confident_count)
            .filter_map(|(_, track)| track.tracked_object(time).ok())
            .collect()
    }

    /// Tracks not yet confident, extrapolated to `time`, for downstream
    /// debugging.
    pub fn tentative_objects(&self, time: Stamp) -> Vec<TrackedObject> {
        self.tracks()
            .filter(|(_, track)| track.total_measurements() < self.config.confident_count)
            .filter_map(|(_, track)| track.tracked_object(time).ok())
            .collect()
    }

    // ------------------------------------------------------------------
    // Cycle steps
    // ------------------------------------------------------------------

    fn sanitize(&self, detections: &[DetectedObject], transform: &Transform) -> Vec<DetectedObject> {
        let mut valid = Vec::with_capacity(detections.len());
        for (index, detection) in detections.iter().enumerate() {
            if !detection.is_valid() {
                warn!(index, "dropping detection with non-finite pose or shape");
                continue;
            }
            if detection.classification.entries().is_empty() {
                warn!(index, "dropping detection without classification");
                continue;
            }
            match detection.transformed(transform) {
                Some(transformed) => valid.push(transformed),
                None => {
                    warn!(index, "dropping detection, transform left pose non-finite");
                }
            }
        }
        valid
    }

    fn predict_all(&mut self, time: Stamp) {
        for &handle in &self.order {
            if let Some(track) = self.arena.get_mut(handle) {
                if let Err(error) = track.predict_to(time) {
                    warn!(track = %track.id(), %error, "prediction failed");
                }
            }
        }
    }

    fn spawn(&mut self, detection: &DetectedObject, time: Stamp) {
        let label = detection.label();
        let choice = self
            .config
            .tracker_map
            .get(&label)
            .copied()
            .unwrap_or(TrackerChoice::Unknown);
        let id = self.ids.next_id();
        let track = Track::spawn(id, detection, time, choice);
        let handle = self.arena.insert(track);
        self.order.push(handle);
        debug!(track = %id, ?label, ?choice, "spawned track");
    }

    fn prune(&mut self, time: Stamp) {
        self.remove_stale_tracks(time);
        self.remove_overlapped_tracks();
    }

    /// Age rule: a track is removed once it misses too many batches in a row
    /// or goes too long without a measurement.
    fn remove_stale_tracks(&mut self, time: Stamp) {
        let mut stale = Vec::new();
        for &handle in &self.order {
            let Some(track) = self.arena.get(handle) else {
                continue;
            };
            if track.consecutive_misses() >= self.config.max_consecutive_misses
                || track.seconds_since_measured(time) > self.config.max_elapsed_since_measurement
            {
                stale.push(handle);
            }
        }
        for handle in stale {
            if let Some(track) = self.arena.get_mut(handle) {
                track.mark_expired();
            }
            self.remove(handle, "stale");
        }
    }

    /// Overlap rule: of two tracks whose footprints overlap, the less
    /// trusted one is removed. An unknown track always loses to a known
    /// one; otherwise the track with fewer total measurements loses, with
    /// ties removing the later-spawned track.
    fn remove_overlapped_tracks(&mut self) {
        let handles = self.order.clone();
        let count = handles.len();
        let mut alive = vec![true; count];

        for i in 0..count {
            if !alive[i] {
                continue;
            }
            let mut remove_first = false;
            for j in (i + 1)..count {
                if !alive[j] {
                    continue;
                }
                let (Some(first), Some(second)) =
                    (self.arena.get(handles[i]), self.arena.get(handles[j]))
                else {
                    continue;
                };

                if (first.position() - second.position()).norm() > self.config.overlap_distance {
                    continue;
                }
                let first_shape = first.shape();
                let second_shape = second.shape();
                let iou = footprint_iou(
                    &first.footprint_pose(),
                    &first_shape,
                    &second.footprint_pose(),
                    &second_shape,
                );

                let first_unknown = first.label() == ObjectLabel::Unknown;
                let second_unknown = second.label() == ObjectLabel::Unknown;
                let (remove_i, remove_j) = if first_unknown || second_unknown {
                    if iou <= self.config.overlap_min_iou_unknown {
                        (false, false)
                    } else if first_unknown && second_unknown {
                        weaker_of(first, second)
                    } else {
                        (first_unknown, second_unknown)
                    }
                } else if iou > self.config.overlap_min_iou {
                    weaker_of(first, second)
                } else {
                    (false, false)
                };

                if remove_i {
                    remove_first = true;
                    break;
                }
                if remove_j {
                    alive[j] = false;
                }
            }
            if remove_first {
                alive[i] = false;
            }
        }

        for (k, &handle) in handles.iter().enumerate() {
            if !alive[k] {
                self.remove(handle, "overlapped");
            }
        }
    }

    fn remove(&mut self, handle: TrackHandle, reason: &'static str) {
        if let Some(track) = self.arena.remove(handle) {
            debug!(track = %track.id(), reason, "removed track");
        }
        self.order.retain(|&kept| kept != handle);
    }
}

/// Which of two overlapping tracks to drop: the one with fewer total
/// measurements, ties dropping the later-spawned (second) track.
fn weaker_of(first: &Track, second: &Track) -> (bool, bool) {
    if first.total_measurements() < second.total_measurements() {
        (true, false)
    } else {
        (false, true)
    }
}

impl std::fmt::Debug for TrackerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerManager")
            .field("config", &self.config)
            .field("tracks", &self.arena.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
