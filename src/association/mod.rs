//! Gated data association between tracks and detections
//!
//! Builds a track-by-detection cost matrix of center distances, marks every
//! pair that fails a gate as infeasible and hands the matrix to the
//! minimum-cost solver. Gates run cheapest first: label compatibility,
//! center distance, detection footprint area, heading gap and finally 2D
//! footprint IoU. A pair that fails any gate can never be matched, no matter
//! how the global optimum works out.
//!
//! All thresholds are per-label tables indexed by [`ObjectLabel::index`].
//! Distance, heading and IoU limits key off the track label; area bounds key
//! off the detection label, since they judge the detection footprint itself.

use core::f64::consts::{FRAC_PI_2, PI};

use nalgebra::Vector2;

use crate::tracker::Track;
use crate::types::classification::ObjectLabel;
use crate::types::object::DetectedObject;
use crate::utils::angle::angle_difference;
use crate::utils::geometry::footprint_iou;
use crate::{Result, TrackError};

pub mod solver;

pub use solver::{min_cost_assignment, Assignment, CostMatrix, INFEASIBLE};

/// Number of object labels, sizing the per-label threshold tables.
pub const LABEL_COUNT: usize = ObjectLabel::ALL.len();

// ============================================================================
// Configuration
// ============================================================================

/// Per-label gating thresholds.
///
/// The defaults pair labels within three families (unknown, the four vehicle
/// classes, and motorcycle/bicycle/pedestrian) and gate on distance, area and
/// IoU; the heading gate ships disabled. Tables are public so deployments can
/// tune individual entries before building the [`Associator`].
#[derive(Debug, Clone)]
pub struct AssociationConfig {
    /// `can_assign[track][detection]`: label pairs allowed to match at all.
    pub can_assign: [[bool; LABEL_COUNT]; LABEL_COUNT],
    /// Maximum center distance in meters, by track label.
    pub max_distance: [f64; LABEL_COUNT],
    /// Minimum detection footprint area in square meters, by detection label.
    pub min_area: [f64; LABEL_COUNT],
    /// Maximum detection footprint area in square meters, by detection label.
    pub max_area: [f64; LABEL_COUNT],
    /// Maximum heading gap in radians, by track label. The gap treats
    /// headings a half turn apart as equal, so it never exceeds a quarter
    /// turn; any threshold of a quarter turn or more disables the gate.
    pub max_yaw_difference: [f64; LABEL_COUNT],
    /// Minimum 2D footprint IoU, by track label. Zero disables the gate.
    pub min_iou: [f64; LABEL_COUNT],
}

impl Default for AssociationConfig {
    fn default() -> Self {
        use ObjectLabel::*;

        let mut can_assign = [[false; LABEL_COUNT]; LABEL_COUNT];
        let families: [&[ObjectLabel]; 3] = [
            &[Unknown],
            &[Car, Truck, Bus, Trailer],
            &[Motorcycle, Bicycle, Pedestrian],
        ];
        for family in families {
            for a in family {
                for b in family {
                    can_assign[a.index()][b.index()] = true;
                }
            }
        }

        let mut max_distance = [0.0; LABEL_COUNT];
        let mut min_area = [0.0; LABEL_COUNT];
        let mut max_area = [0.0; LABEL_COUNT];
        let mut min_iou = [0.1; LABEL_COUNT];
        for label in ObjectLabel::ALL {
            let i = label.index();
            max_distance[i] = match label {
                Unknown => 4.0,
                Car | Truck | Bus | Trailer => 4.5,
                Motorcycle | Bicycle => 3.0,
                Pedestrian => 2.0,
            };
            min_area[i] = match label {
                Unknown => 0.0,
                Car => 1.2,
                Truck => 6.0,
                Bus | Trailer => 10.0,
                Motorcycle | Bicycle | Pedestrian => 0.1,
            };
            max_area[i] = match label {
                Unknown => 10000.0,
                Car => 12.1,
                Truck => 36.0,
                Bus | Trailer => 60.0,
                Motorcycle | Bicycle => 2.5,
                Pedestrian => 2.0,
            };
        }
        // Unknown shapes are too unstable for a real IoU cut, but a trace of
        // overlap is still required so stationary clutter does not adopt
        // passing tracks.
        min_iou[Unknown.index()] = 0.0001;

        Self {
            can_assign,
            max_distance,
            min_area,
            max_area,
            max_yaw_difference: [PI; LABEL_COUNT],
            min_iou,
        }
    }
}

impl AssociationConfig {
    /// Checks every table entry for sane ranges.
    ///
    /// # Errors
    ///
    /// Returns [`TrackError::InvalidConfig`] naming the first offending
    /// label.
    pub fn validate(&self) -> Result<()> {
        for label in ObjectLabel::ALL {
            let i = label.index();
            if !self.max_distance[i].is_finite() || self.max_distance[i] <= 0.0 {
                return Err(TrackError::InvalidConfig(format!(
                    "max_distance for {label:?} must be finite and positive"
                )));
            }
            if !self.min_area[i].is_finite() || self.min_area[i] < 0.0 {
                return Err(TrackError::InvalidConfig(format!(
                    "min_area for {label:?} must be finite and non-negative"
                )));
            }
            if !self.max_area[i].is_finite() || self.max_area[i] < self.min_area[i] {
                return Err(TrackError::InvalidConfig(format!(
                    "max_area for {label:?} must be finite and at least min_area"
                )));
            }
            if !self.max_yaw_difference[i].is_finite() || self.max_yaw_difference[i] < 0.0 {
                return Err(TrackError::InvalidConfig(format!(
                    "max_yaw_difference for {label:?} must be finite and non-negative"
                )));
            }
            if !(0.0..=1.0).contains(&self.min_iou[i]) {
                return Err(TrackError::InvalidConfig(format!(
                    "min_iou for {label:?} must be within [0, 1]"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Associator
// ============================================================================

/// Outcome of one association round, all indices into the input slices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssociationResult {
    /// Matched `(track_index, detection_index)` pairs.
    pub matches: Vec<(usize, usize)>,
    /// Tracks left without a detection this round.
    pub unmatched_tracks: Vec<usize>,
    /// Detections no track claimed.
    pub unmatched_detections: Vec<usize>,
}

/// Matches tracks to detections under the configured gates.
#[derive(Debug, Clone)]
pub struct Associator {
    config: AssociationConfig,
}

impl Associator {
    /// Builds an associator after validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TrackError::InvalidConfig`] when a threshold table entry is
    /// out of range.
    pub fn new(config: AssociationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AssociationConfig {
        &self.config
    }

    /// Matches tracks to detections, minimizing total center distance over
    /// the pairs that pass every gate.
    ///
    /// Output indices refer to the input slices. Ties between equal-cost
    /// optima resolve toward lower indices, so the result does not depend on
    /// anything but the inputs.
    pub fn associate(&self, tracks: &[&Track], detections: &[DetectedObject]) -> AssociationResult {
        let cost = self.cost_matrix(tracks, detections);
        let assignment = min_cost_assignment(&cost);

        let mut result = AssociationResult::default();
        let mut detection_taken = vec![false; detections.len()];
        for (track_index, matched) in assignment.mapping.iter().enumerate() {
            match *matched {
                Some(detection_index) => {
                    result.matches.push((track_index, detection_index));
                    detection_taken[detection_index] = true;
                }
                None => result.unmatched_tracks.push(track_index),
            }
        }
        result.unmatched_detections = detection_taken
            .iter()
            .enumerate()
            .filter(|(_, taken)| !**taken)
            .map(|(index, _)| index)
            .collect();
        result
    }

    /// Builds the gated cost matrix: center distance for admissible pairs,
    /// [`INFEASIBLE`] for gated ones.
    pub fn cost_matrix(&self, tracks: &[&Track], detections: &[DetectedObject]) -> CostMatrix {
        let mut cost = CostMatrix::filled(tracks.len(), detections.len(), INFEASIBLE);
        for (i, track) in tracks.iter().enumerate() {
            for (j, detection) in detections.iter().enumerate() {
                cost.set(i, j, self.pair_cost(track, detection));
            }
        }
        cost
    }

    fn pair_cost(&self, track: &Track, detection: &DetectedObject) -> f64 {
        let ti = track.label().index();
        let di = detection.label().index();

        if !self.config.can_assign[ti][di] {
            return INFEASIBLE;
        }

        let detection_position =
            Vector2::new(detection.pose.position.x, detection.pose.position.y);
        let distance = (detection_position - track.position()).norm();
        if distance > self.config.max_distance[ti] {
            return INFEASIBLE;
        }

        let area = detection.shape.footprint_area();
        if area < self.config.min_area[di] || area > self.config.max_area[di] {
            return INFEASIBLE;
        }

        // The gap never exceeds a quarter turn, so larger thresholds cannot
        // fire and the computation is skipped.
        let max_yaw = self.config.max_yaw_difference[ti];
        if max_yaw < FRAC_PI_2 && heading_gap(track.yaw(), detection.pose.yaw()) > max_yaw {
            return INFEASIBLE;
        }

        let min_iou = self.config.min_iou[ti];
        if min_iou > 0.0 {
            let track_shape = track.shape();
            let iou = footprint_iou(
                &track.footprint_pose(),
                &track_shape,
                &detection.pose,
                &detection.shape,
            );
            if iou < min_iou {
                return INFEASIBLE;
            }
        }

        distance
    }
}

/// Heading gap that treats headings a half turn apart as equal, for
/// detections whose front/back orientation is not trustworthy. Always within
/// `[0, pi/2]`.
fn heading_gap(a: f64, b: f64) -> f64 {
    let diff = angle_difference(a, b).abs();
    if diff > FRAC_PI_2 {
        PI - diff
    } else {
        diff
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::TrackerChoice;
    use crate::types::classification::Classification;
    use crate::types::ident::{IdProvider, SequentialIdProvider};
    use crate::types::object::{OrientationAvailability, Pose};
    use crate::types::shape::Shape;
    use crate::types::time::Stamp;

    fn detection(label: ObjectLabel, x: f64, y: f64, yaw: f64) -> DetectedObject {
        let shape = match label {
            ObjectLabel::Pedestrian => Shape::Cylinder {
                radius: 0.4,
                height: 1.7,
            },
            ObjectLabel::Unknown => Shape::BoundingBox {
                length: 2.0,
                width: 2.0,
                height: 1.5,
            },
            _ => Shape::BoundingBox {
                length: 4.5,
                width: 1.8,
                height: 1.5,
            },
        };
        DetectedObject {
            pose: Pose::from_xy_yaw(x, y, yaw),
            shape,
            classification: Classification::certain(label),
            orientation: OrientationAvailability::Available,
            longitudinal_velocity: None,
        }
    }

    fn choice_for(label: ObjectLabel) -> TrackerChoice {
        match label {
            ObjectLabel::Unknown => TrackerChoice::Unknown,
            ObjectLabel::Pedestrian => TrackerChoice::Pedestrian,
            ObjectLabel::Motorcycle | ObjectLabel::Bicycle => TrackerChoice::Bicycle,
            _ => TrackerChoice::NormalVehicle,
        }
    }

    fn track_at(ids: &mut SequentialIdProvider, label: ObjectLabel, x: f64, y: f64) -> Track {
        let det = detection(label, x, y, 0.0);
        Track::spawn(ids.next_id(), &det, Stamp::from_secs(0), choice_for(label))
    }

    fn associator() -> Associator {
        Associator::new(AssociationConfig::default()).unwrap()
    }

    #[test]
    fn test_close_pair_matches() {
        let mut ids = SequentialIdProvider::new();
        let track = track_at(&mut ids, ObjectLabel::Car, 0.0, 0.0);
        let detections = vec![detection(ObjectLabel::Car, 0.5, 0.0, 0.0)];
        let result = associator().associate(&[&track], &detections);
        assert_eq!(result.matches, vec![(0, 0)]);
        assert!(result.unmatched_tracks.is_empty());
        assert!(result.unmatched_detections.is_empty());
    }

    #[test]
    fn test_distance_gate_blocks_far_pairs() {
        let mut ids = SequentialIdProvider::new();
        let track = track_at(&mut ids, ObjectLabel::Car, 0.0, 0.0);
        let detections = vec![detection(ObjectLabel::Car, 10.0, 0.0, 0.0)];
        let result = associator().associate(&[&track], &detections);
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_tracks, vec![0]);
        assert_eq!(result.unmatched_detections, vec![0]);
    }

    #[test]
    fn test_label_family_gate() {
        let mut ids = SequentialIdProvider::new();
        let track = track_at(&mut ids, ObjectLabel::Car, 0.0, 0.0);
        let detections = vec![detection(ObjectLabel::Pedestrian, 0.5, 0.0, 0.0)];
        let result = associator().associate(&[&track], &detections);
        assert!(result.matches.is_empty());
    }

    #[test]
    fn test_area_gate_rejects_undersized_footprint() {
        let mut ids = SequentialIdProvider::new();
        let track = track_at(&mut ids, ObjectLabel::Car, 0.0, 0.0);
        let mut small = detection(ObjectLabel::Car, 0.5, 0.0, 0.0);
        small.shape = Shape::BoundingBox {
            length: 0.5,
            width: 0.5,
            height: 1.0,
        };
        let result = associator().associate(&[&track], &[small]);
        assert!(result.matches.is_empty());
    }

    #[test]
    fn test_global_optimum_beats_greedy() {
        let mut config = AssociationConfig::default();
        config.min_iou = [0.0; LABEL_COUNT];
        let associator = Associator::new(config).unwrap();

        let mut ids = SequentialIdProvider::new();
        let tracks = vec![
            track_at(&mut ids, ObjectLabel::Car, 0.0, 0.0),
            track_at(&mut ids, ObjectLabel::Car, 0.0, 1.0),
        ];
        let refs: Vec<&Track> = tracks.iter().collect();
        let detections = vec![
            detection(ObjectLabel::Car, 1.0, 0.0, 0.0),
            detection(ObjectLabel::Car, 0.0, -2.0, 0.0),
        ];

        // Taking the nearest detection for track 0 first would cost
        // 1.0 + 3.0; the optimum crosses over for 2.0 + sqrt(2).
        let mut result = associator.associate(&refs, &detections);
        result.matches.sort_unstable();
        assert_eq!(result.matches, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn test_unknown_requires_overlap() {
        let mut ids = SequentialIdProvider::new();
        let track = track_at(&mut ids, ObjectLabel::Unknown, 0.0, 0.0);

        // Within distance but footprints do not touch.
        let apart = vec![detection(ObjectLabel::Unknown, 3.0, 0.0, 0.0)];
        let result = associator().associate(&[&track], &apart);
        assert!(result.matches.is_empty());

        let touching = vec![detection(ObjectLabel::Unknown, 1.0, 0.0, 0.0)];
        let result = associator().associate(&[&track], &touching);
        assert_eq!(result.matches, vec![(0, 0)]);
    }

    #[test]
    fn test_yaw_gate_folds_half_turn() {
        let mut config = AssociationConfig::default();
        config.max_yaw_difference = [0.2; LABEL_COUNT];
        config.min_iou = [0.0; LABEL_COUNT];
        let associator = Associator::new(config).unwrap();

        let mut ids = SequentialIdProvider::new();
        let track = track_at(&mut ids, ObjectLabel::Car, 0.0, 0.0);

        let skewed = vec![detection(ObjectLabel::Car, 0.5, 0.0, 1.0)];
        assert!(associator.associate(&[&track], &skewed).matches.is_empty());

        // A half-turn heading is the same observation, so it passes.
        let reversed = vec![detection(ObjectLabel::Car, 0.5, 0.0, core::f64::consts::PI)];
        assert_eq!(
            associator.associate(&[&track], &reversed).matches,
            vec![(0, 0)]
        );
    }

    #[test]
    fn test_identical_pairs_resolve_by_index() {
        let mut ids = SequentialIdProvider::new();
        let tracks = vec![
            track_at(&mut ids, ObjectLabel::Car, 0.0, 0.0),
            track_at(&mut ids, ObjectLabel::Car, 0.0, 0.0),
        ];
        let refs: Vec<&Track> = tracks.iter().collect();
        let detections = vec![
            detection(ObjectLabel::Car, 0.2, 0.0, 0.0),
            detection(ObjectLabel::Car, 0.2, 0.0, 0.0),
        ];
        let mut result = associator().associate(&refs, &detections);
        result.matches.sort_unstable();
        assert_eq!(result.matches, vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn test_empty_inputs() {
        let mut ids = SequentialIdProvider::new();
        let track = track_at(&mut ids, ObjectLabel::Car, 0.0, 0.0);

        let result = associator().associate(&[], &[detection(ObjectLabel::Car, 0.0, 0.0, 0.0)]);
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_detections, vec![0]);

        let result = associator().associate(&[&track], &[]);
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_tracks, vec![0]);
    }

    #[test]
    fn test_validate_rejects_bad_tables() {
        let mut config = AssociationConfig::default();
        config.max_distance[0] = -1.0;
        assert!(Associator::new(config).is_err());

        let mut config = AssociationConfig::default();
        config.min_iou[2] = 1.5;
        assert!(config.validate().is_err());

        let mut config = AssociationConfig::default();
        config.max_area[1] = config.min_area[1] - 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_heading_gap_folds() {
        assert!((heading_gap(0.3, 0.1) - 0.2).abs() < 1e-12);
        assert!((heading_gap(0.1, PI - 0.05) - 0.15).abs() < 1e-9);
        assert!(heading_gap(0.0, PI).abs() < 1e-12);
    }
}
