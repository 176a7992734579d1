//! Object shape estimates
//!
//! Detections and tracks describe extent either as an oriented bounding box
//! or as a vertical cylinder (typical for pedestrians). Dimensions are meters.

/// Physical extent of an object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    /// Box aligned with the object heading: length along, width across,
    /// height up.
    BoundingBox {
        length: f64,
        width: f64,
        height: f64,
    },
    /// Vertical cylinder centered on the object position.
    Cylinder { radius: f64, height: f64 },
}

impl Shape {
    /// True when every dimension is finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        match *self {
            Shape::BoundingBox {
                length,
                width,
                height,
            } => {
                length.is_finite()
                    && width.is_finite()
                    && height.is_finite()
                    && length > 0.0
                    && width > 0.0
                    && height > 0.0
            }
            Shape::Cylinder { radius, height } => {
                radius.is_finite() && height.is_finite() && radius > 0.0 && height > 0.0
            }
        }
    }

    /// Footprint area in the ground plane.
    pub fn footprint_area(&self) -> f64 {
        match *self {
            Shape::BoundingBox { length, width, .. } => length * width,
            Shape::Cylinder { radius, .. } => core::f64::consts::PI * radius * radius,
        }
    }

    /// Low-pass blend of this shape toward a measured one.
    ///
    /// `keep` is the weight of the current estimate (0.9 keeps dimensions
    /// stable against single-frame size jitter). Returns `None` when the
    /// variants differ; callers decide whether to ignore or replace.
    pub fn blended_toward(&self, measured: &Shape, keep: f64) -> Option<Shape> {
        let mix = 1.0 - keep;
        match (*self, *measured) {
            (
                Shape::BoundingBox {
                    length,
                    width,
                    height,
                },
                Shape::BoundingBox {
                    length: ml,
                    width: mw,
                    height: mh,
                },
            ) => Some(Shape::BoundingBox {
                length: keep * length + mix * ml,
                width: keep * width + mix * mw,
                height: keep * height + mix * mh,
            }),
            (
                Shape::Cylinder { radius, height },
                Shape::Cylinder {
                    radius: mr,
                    height: mh,
                },
            ) => Some(Shape::Cylinder {
                radius: keep * radius + mix * mr,
                height: keep * height + mix * mh,
            }),
            _ => None,
        }
    }
}
