//! Math and geometry utilities shared by the tracking components

pub mod angle;
pub mod geometry;
pub mod units;

pub use angle::{align_to_half_turn, angle_difference, normalize_radian};
pub use units::{deg2rad, kmph2mps};
