//! Mathematical utilities
//!
//! Heading extraction and yaw-aligned rotations used when re-orienting
//! path segments along their direction of travel.

pub mod rotation;

pub use rotation::*;
