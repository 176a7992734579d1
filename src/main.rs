//! Example usage of the kinetrack library
//!
//! Runs a small simulated street scene through the tracker manager: a car
//! driving along the road, a pedestrian crossing it (occluded for one
//! batch) and a one-off clutter detection, at a 10 Hz detection rate.

use kinetrack::prelude::*;
use nalgebra::Isometry3;

fn car_detection(x: f64, y: f64, speed: f64) -> DetectedObject {
    DetectedObject {
        pose: Pose::from_xy_yaw(x, y, 0.0),
        shape: Shape::BoundingBox {
            length: 4.4,
            width: 1.8,
            height: 1.5,
        },
        classification: Classification::certain(ObjectLabel::Car),
        orientation: OrientationAvailability::Available,
        longitudinal_velocity: Some(speed),
    }
}

fn pedestrian_detection(x: f64, y: f64) -> kinetrack::Result<DetectedObject> {
    Ok(DetectedObject {
        pose: Pose::from_xy_yaw(x, y, 0.0),
        shape: Shape::Cylinder {
            radius: 0.4,
            height: 1.7,
        },
        classification: Classification::new(&[
            (ObjectLabel::Pedestrian, 0.9),
            (ObjectLabel::Unknown, 0.1),
        ])?,
        orientation: OrientationAvailability::Unavailable,
        longitudinal_velocity: None,
    })
}

fn clutter_detection(x: f64, y: f64) -> DetectedObject {
    DetectedObject {
        pose: Pose::from_xy_yaw(x, y, 0.0),
        shape: Shape::BoundingBox {
            length: 1.0,
            width: 1.0,
            height: 0.5,
        },
        classification: Classification::certain(ObjectLabel::Unknown),
        orientation: OrientationAvailability::Unavailable,
        longitudinal_velocity: None,
    }
}

fn main() -> kinetrack::Result<()> {
    println!("kinetrack: multi-object tracking core");
    println!("=====================================\n");

    let mut manager = TrackerManager::new(TrackerManagerConfig::default())?;
    let sensor_transform = Isometry3::identity();

    for step in 0..10 {
        let t = step as f64 * 0.1;
        let time = Stamp::from_secs_f64(t);

        // Car heading east at 8 m/s, pedestrian crossing north at 1.2 m/s.
        let mut detections = vec![car_detection(10.0 + 8.0 * t, -2.0, 8.0)];
        if step != 6 {
            // The pedestrian is occluded for one batch and must coast.
            detections.push(pedestrian_detection(15.0, -6.0 + 1.2 * t)?);
        }
        if step == 4 {
            detections.push(clutter_detection(30.0, 5.0));
        }

        let tracked = manager.process(&detections, &sensor_transform, time);

        println!(
            "t = {:.1}s: {} detections, {} live tracks, {} published",
            t,
            detections.len(),
            manager.track_count(),
            tracked.len()
        );
        for object in &tracked {
            let position = object.pose.position;
            let speed = object.twist.linear.x;
            println!(
                "  {:<10} {} at ({:6.2}, {:6.2}), {:5.2} m/s",
                format!("{:?}", object.label),
                object.id,
                position.x,
                position.y,
                speed
            );
        }
        println!();
    }

    println!("Tracking complete");
    Ok(())
}
