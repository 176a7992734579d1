//! Kalman filtering primitives

pub mod kalman;

pub use kalman::{symmetrize, KalmanState};
