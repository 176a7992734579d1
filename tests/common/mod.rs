//! Common test helpers for tracker integration tests

#![allow(dead_code)]

use kinetrack::prelude::*;
use nalgebra::Isometry3;

/// Sensor frame equals tracking frame.
pub fn identity_transform() -> Isometry3<f64> {
    Isometry3::identity()
}

/// Manager with sequential track ids so scenarios are reproducible.
pub fn deterministic_manager(config: TrackerManagerConfig) -> TrackerManager {
    TrackerManager::with_id_provider(config, Box::new(SequentialIdProvider::new()))
        .expect("test configuration must validate")
}

pub fn car_detection(x: f64, y: f64, yaw: f64) -> DetectedObject {
    DetectedObject {
        pose: Pose::from_xy_yaw(x, y, yaw),
        shape: Shape::BoundingBox {
            length: 4.4,
            width: 1.8,
            height: 1.5,
        },
        classification: Classification::certain(ObjectLabel::Car),
        orientation: OrientationAvailability::Available,
        longitudinal_velocity: None,
    }
}

pub fn car_with_speed(x: f64, y: f64, yaw: f64, speed: f64) -> DetectedObject {
    let mut detection = car_detection(x, y, yaw);
    detection.longitudinal_velocity = Some(speed);
    detection
}

pub fn truck_detection(x: f64, y: f64, yaw: f64) -> DetectedObject {
    DetectedObject {
        pose: Pose::from_xy_yaw(x, y, yaw),
        shape: Shape::BoundingBox {
            length: 8.0,
            width: 2.5,
            height: 3.2,
        },
        classification: Classification::certain(ObjectLabel::Truck),
        orientation: OrientationAvailability::Available,
        longitudinal_velocity: None,
    }
}

pub fn pedestrian_detection(x: f64, y: f64) -> DetectedObject {
    DetectedObject {
        pose: Pose::from_xy_yaw(x, y, 0.0),
        shape: Shape::Cylinder {
            radius: 0.4,
            height: 1.7,
        },
        classification: Classification::certain(ObjectLabel::Pedestrian),
        orientation: OrientationAvailability::Unavailable,
        longitudinal_velocity: None,
    }
}

pub fn unknown_detection(x: f64, y: f64) -> DetectedObject {
    DetectedObject {
        pose: Pose::from_xy_yaw(x, y, 0.0),
        shape: Shape::BoundingBox {
            length: 2.0,
            width: 2.0,
            height: 1.2,
        },
        classification: Classification::certain(ObjectLabel::Unknown),
        orientation: OrientationAvailability::Unavailable,
        longitudinal_velocity: None,
    }
}
