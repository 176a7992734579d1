//! Core value types shared across the tracking pipeline

pub mod classification;
pub mod ident;
pub mod object;
pub mod shape;
pub mod time;
