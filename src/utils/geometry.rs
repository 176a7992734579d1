//! Planar footprint geometry for overlap checks
//!
//! Association gating and overlap pruning both score track/detection pairs
//! by 2D intersection-over-union of their ground footprints. Footprints are
//! convex (rectangle for boxes, octagon for cylinders), so intersection is a
//! Sutherland-Hodgman clip followed by a shoelace area.

use nalgebra::Point2;

use crate::types::object::Pose;
use crate::types::shape::Shape;

/// Unions smaller than this are treated as no overlap to avoid blowing up
/// the ratio for degenerate footprints.
pub const MIN_UNION_AREA: f64 = 1e-2;

/// Convex footprint polygon of a shape at a pose, counterclockwise.
///
/// Boxes become their four rotated corners; cylinders become a regular
/// octagon with the cylinder radius as circumradius.
pub fn footprint(pose: &Pose, shape: &Shape) -> Vec<Point2<f64>> {
    let cx = pose.position.x;
    let cy = pose.position.y;
    match *shape {
        Shape::BoundingBox { length, width, .. } => {
            let yaw = pose.yaw();
            let (sin, cos) = yaw.sin_cos();
            let hl = 0.5 * length;
            let hw = 0.5 * width;
            [(hl, hw), (-hl, hw), (-hl, -hw), (hl, -hw)]
                .iter()
                .map(|&(dx, dy)| Point2::new(cx + dx * cos - dy * sin, cy + dx * sin + dy * cos))
                .collect()
        }
        Shape::Cylinder { radius, .. } => (0..8)
            .map(|i| {
                let theta = core::f64::consts::FRAC_PI_4 * i as f64;
                Point2::new(cx + radius * theta.cos(), cy + radius * theta.sin())
            })
            .collect(),
    }
}

/// Signed area of a polygon; positive for counterclockwise winding.
pub fn signed_area(polygon: &[Point2<f64>]) -> f64 {
    if polygon.len() < 3 {
        return 0.0;
    }
    let mut acc = 0.0;
    for i in 0..polygon.len() {
        let a = polygon[i];
        let b = polygon[(i + 1) % polygon.len()];
        acc += a.x * b.y - b.x * a.y;
    }
    0.5 * acc
}

#[inline]
fn cross(ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    ax * by - ay * bx
}

/// Clips a convex `subject` polygon against a convex counterclockwise `clip`
/// polygon (Sutherland-Hodgman). Returns the intersection polygon, possibly
/// empty.
pub fn clip_convex(subject: &[Point2<f64>], clip: &[Point2<f64>]) -> Vec<Point2<f64>> {
    let mut output: Vec<Point2<f64>> = subject.to_vec();
    for i in 0..clip.len() {
        if output.is_empty() {
            break;
        }
        let a = clip[i];
        let b = clip[(i + 1) % clip.len()];
        let input = core::mem::take(&mut output);
        for j in 0..input.len() {
            let current = input[j];
            let next = input[(j + 1) % input.len()];
            let side_current = cross(b.x - a.x, b.y - a.y, current.x - a.x, current.y - a.y);
            let side_next = cross(b.x - a.x, b.y - a.y, next.x - a.x, next.y - a.y);
            let inside_current = side_current >= 0.0;
            let inside_next = side_next >= 0.0;
            if inside_current {
                output.push(current);
            }
            if inside_current != inside_next {
                // Edge crosses the clip line; keep the intersection point.
                let t = side_current / (side_current - side_next);
                output.push(Point2::new(
                    current.x + t * (next.x - current.x),
                    current.y + t * (next.y - current.y),
                ));
            }
        }
    }
    output
}

/// 2D intersection-over-union of two footprints.
///
/// Returns 0.0 for non-overlapping footprints and for unions smaller than
/// [`MIN_UNION_AREA`].
pub fn footprint_iou(pose1: &Pose, shape1: &Shape, pose2: &Pose, shape2: &Shape) -> f64 {
    let poly1 = footprint(pose1, shape1);
    let poly2 = footprint(pose2, shape2);
    let intersection = signed_area(&clip_convex(&poly1, &poly2)).abs();
    let union = signed_area(&poly1).abs() + signed_area(&poly2).abs() - intersection;
    if union < MIN_UNION_AREA {
        return 0.0;
    }
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn box_shape(length: f64, width: f64) -> Shape {
        Shape::BoundingBox {
            length,
            width,
            height: 1.5,
        }
    }

    #[test]
    fn test_box_footprint_area() {
        let pose = Pose::from_xy_yaw(3.0, -2.0, 0.7);
        let poly = footprint(&pose, &box_shape(4.0, 2.0));
        assert_relative_eq!(signed_area(&poly), 8.0, epsilon = 1e-9);
    }

    #[test]
    fn test_identical_boxes_iou_is_one() {
        let pose = Pose::from_xy_yaw(1.0, 1.0, 0.3);
        let shape = box_shape(4.0, 2.0);
        assert_relative_eq!(footprint_iou(&pose, &shape, &pose, &shape), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_disjoint_boxes_iou_is_zero() {
        let a = Pose::from_xy_yaw(0.0, 0.0, 0.0);
        let b = Pose::from_xy_yaw(100.0, 0.0, 0.0);
        let shape = box_shape(4.0, 2.0);
        assert_eq!(footprint_iou(&a, &shape, &b, &shape), 0.0);
    }

    #[test]
    fn test_half_overlap_axis_aligned() {
        // Two 4x2 boxes offset by half a length: intersection 4, union 12.
        let a = Pose::from_xy_yaw(0.0, 0.0, 0.0);
        let b = Pose::from_xy_yaw(2.0, 0.0, 0.0);
        let shape = box_shape(4.0, 2.0);
        assert_relative_eq!(
            footprint_iou(&a, &shape, &b, &shape),
            4.0 / 12.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_rotated_overlap_is_symmetric() {
        let a = Pose::from_xy_yaw(0.0, 0.0, 0.0);
        let b = Pose::from_xy_yaw(1.0, 0.5, 0.6);
        let shape = box_shape(4.0, 2.0);
        let ab = footprint_iou(&a, &shape, &b, &shape);
        let ba = footprint_iou(&b, &shape, &a, &shape);
        assert_relative_eq!(ab, ba, epsilon = 1e-9);
        assert!(ab > 0.0 && ab < 1.0);
    }

    #[test]
    fn test_cylinder_octagon_area() {
        let pose = Pose::from_xy_yaw(0.0, 0.0, 0.0);
        let poly = footprint(
            &pose,
            &Shape::Cylinder {
                radius: 1.0,
                height: 1.7,
            },
        );
        // Regular octagon with unit circumradius: 2*sqrt(2).
        assert_relative_eq!(signed_area(&poly), 2.0 * 2.0_f64.sqrt(), epsilon = 1e-9);
    }
}
