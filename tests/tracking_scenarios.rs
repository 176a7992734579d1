//! End-to-end tracking scenarios over the public API

mod common;

use core::f64::consts::PI;

use approx::assert_relative_eq;
use common::{car_detection, car_with_speed, deterministic_manager, identity_transform};
use kinetrack::prelude::*;

fn stamp(step: usize) -> Stamp {
    Stamp::from_secs_f64(step as f64 * 0.1)
}

#[test]
fn test_constant_velocity_car_predicts_forward() {
    let mut ids = SequentialIdProvider::new();
    let detection = car_with_speed(0.0, 0.0, 0.0, 2.0);
    let mut track = Track::spawn(
        ids.next_id(),
        &detection,
        Stamp::from_secs(0),
        TrackerChoice::NormalVehicle,
    );

    track.predict_to(Stamp::from_secs(1)).unwrap();

    assert_relative_eq!(track.position().x, 2.0, epsilon = 1e-9);
    assert_relative_eq!(track.position().y, 0.0, epsilon = 1e-9);
}

#[test]
fn test_mixed_classification_spawns_pedestrian() {
    let mut manager = deterministic_manager(TrackerManagerConfig::default());
    let tf = identity_transform();

    let detection = DetectedObject {
        pose: Pose::from_xy_yaw(5.0, 5.0, 0.0),
        shape: Shape::Cylinder {
            radius: 0.4,
            height: 1.7,
        },
        classification: Classification::new(&[
            (ObjectLabel::Pedestrian, 0.9),
            (ObjectLabel::Unknown, 0.1),
        ])
        .unwrap(),
        orientation: OrientationAvailability::Unavailable,
        longitudinal_velocity: None,
    };
    manager.process(&[detection], &tf, stamp(0));

    assert_eq!(manager.track_count(), 1);
    let (_, track) = manager.tracks().next().unwrap();
    assert_eq!(track.label(), ObjectLabel::Pedestrian);
    assert!(track.classification().probability_of(ObjectLabel::Pedestrian) > 0.8);
    assert!(matches!(track.tracker(), TrackerKind::Pedestrian(_)));
}

#[test]
fn test_matching_is_independent_of_detection_order() {
    let run = |second_batch: Vec<DetectedObject>| {
        let mut manager = deterministic_manager(TrackerManagerConfig::default());
        let tf = identity_transform();
        manager.process(
            &[car_detection(0.0, 0.0, 0.0), car_detection(30.0, 0.0, 0.0)],
            &tf,
            stamp(0),
        );
        manager.process(&second_batch, &tf, stamp(1));

        let mut positions: Vec<(TrackId, f64)> = manager
            .tracks()
            .map(|(_, track)| (track.id(), track.position().x))
            .collect();
        positions.sort_by_key(|(id, _)| *id);
        positions
    };

    let forward = run(vec![car_detection(0.5, 0.0, 0.0), car_detection(30.5, 0.0, 0.0)]);
    let reversed = run(vec![car_detection(30.5, 0.0, 0.0), car_detection(0.5, 0.0, 0.0)]);

    assert_eq!(forward.len(), 2);
    for (&(id_a, x_a), &(id_b, x_b)) in forward.iter().zip(reversed.iter()) {
        assert_eq!(id_a, id_b);
        assert_relative_eq!(x_a, x_b, epsilon = 1e-12);
    }
    // Each track was pulled toward its own lane's measurement.
    assert!(forward[0].1 > 0.0 && forward[0].1 < 1.0);
    assert!(forward[1].1 > 30.0 && forward[1].1 < 31.0);
}

#[test]
fn test_crossing_cars_keep_identities() {
    let mut manager = deterministic_manager(TrackerManagerConfig::default());
    let tf = identity_transform();

    // Eastbound in the lower lane, westbound in the upper lane; the lanes
    // are four meters apart so the footprints never overlap.
    manager.process(
        &[
            car_with_speed(0.0, -2.0, 0.0, 10.0),
            car_with_speed(10.0, 2.0, PI, 10.0),
        ],
        &tf,
        stamp(0),
    );
    let east = manager.handles()[0];
    let west = manager.handles()[1];

    for step in 1..=10 {
        let t = step as f64 * 0.1;
        manager.process(
            &[
                car_with_speed(10.0 * t, -2.0, 0.0, 10.0),
                car_with_speed(10.0 - 10.0 * t, 2.0, PI, 10.0),
            ],
            &tf,
            stamp(step),
        );
    }

    assert_eq!(manager.track_count(), 2);
    let east_track = manager.track(east).unwrap();
    let west_track = manager.track(west).unwrap();
    assert!(east_track.position().y < 0.0, "eastbound stays in its lane");
    assert!(west_track.position().y > 0.0, "westbound stays in its lane");
    assert!(east_track.position().x > 8.0);
    assert!(west_track.position().x < 2.0);
    assert_eq!(east_track.total_measurements(), 11);
    assert_eq!(west_track.total_measurements(), 11);
}

#[test]
fn test_fused_classification_stays_normalized() {
    let mut manager = deterministic_manager(TrackerManagerConfig::default());
    let tf = identity_transform();

    let mut detection = car_detection(0.0, 0.0, 0.0);
    detection.classification =
        Classification::new(&[(ObjectLabel::Car, 0.7), (ObjectLabel::Truck, 0.3)]).unwrap();

    for step in 0..5 {
        manager.process(&[detection.clone()], &tf, stamp(step));
        let (_, track) = manager.tracks().next().unwrap();
        assert_relative_eq!(track.classification().total(), 1.0, epsilon = 1e-9);
        assert_eq!(track.label(), ObjectLabel::Car);
    }
}

#[test]
fn test_emission_is_pure() {
    let mut manager = deterministic_manager(TrackerManagerConfig::default());
    let tf = identity_transform();
    for step in 0..3 {
        manager.process(&[car_with_speed(0.0, 0.0, 0.0, 1.0)], &tf, stamp(step));
    }

    let later = Stamp::from_secs_f64(0.35);
    let first = manager.tracked_objects(later);
    let second = manager.tracked_objects(later);
    assert_eq!(first.len(), 1);
    assert_eq!(first, second);
}

#[test]
fn test_sign_unknown_heading_never_flips_track() {
    let mut manager = deterministic_manager(TrackerManagerConfig::default());
    let tf = identity_transform();
    for step in 0..3 {
        manager.process(&[car_detection(0.0, 0.0, 0.0)], &tf, stamp(step));
    }

    // A rear-view detection reports the heading roughly reversed; the
    // half-turn alignment must keep the track pointing forward.
    let mut reversed = car_detection(0.0, 0.0, PI - 0.05);
    reversed.orientation = OrientationAvailability::SignUnknown;
    manager.process(&[reversed], &tf, stamp(3));

    let (_, track) = manager.tracks().next().unwrap();
    assert!(
        track.yaw().abs() < 0.3,
        "track heading flipped to {}",
        track.yaw()
    );
}

#[test]
fn test_coasting_track_reacquires() {
    let mut manager = deterministic_manager(TrackerManagerConfig::default());
    let tf = identity_transform();

    // 5 m/s eastbound, detected, occluded for one batch, then reacquired.
    for step in 0..3 {
        let t = step as f64 * 0.1;
        manager.process(&[car_with_speed(5.0 * t, 0.0, 0.0, 5.0)], &tf, stamp(step));
    }
    let published = manager.process(&[], &tf, stamp(3));
    assert_eq!(published.len(), 1, "confident track publishes while coasting");

    let published = manager.process(&[car_with_speed(2.0, 0.0, 0.0, 5.0)], &tf, stamp(4));
    assert_eq!(manager.track_count(), 1, "reacquired, not duplicated");
    assert_eq!(published.len(), 1);

    let (_, track) = manager.tracks().next().unwrap();
    assert_eq!(track.consecutive_misses(), 0);
    assert!((track.position().x - 2.0).abs() < 0.5);
}

#[test]
fn test_empty_batches_spawn_nothing() {
    let mut manager = deterministic_manager(TrackerManagerConfig::default());
    let tf = identity_transform();
    for step in 0..5 {
        let published = manager.process(&[], &tf, stamp(step));
        assert!(published.is_empty());
    }
    assert_eq!(manager.track_count(), 0);
}
