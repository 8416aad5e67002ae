//! # Stride Core
//!
//! Multi-Contact Locomotion Planning - Core library
//!
//! Foundational types for contact-transition planning on legged and
//! multi-limb robots: contact state snapshots, time-parameterized paths,
//! and the capability contracts through which the planning algorithms
//! talk to their collaborators (collision validation, equilibrium
//! checks, local steering, candidate sampling).
//!
//! ## Modules
//!
//! - [`math`]: Rotation and heading utilities
//! - [`state`]: Contact state snapshots and the state arena
//! - [`path`]: Path abstraction, steered segments, path vectors
//! - [`capabilities`]: Contracts for external collaborators

pub mod capabilities;
pub mod math;
pub mod path;
pub mod state;

// Common type aliases
use nalgebra::{DVector, Matrix3, UnitQuaternion, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f64>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f64>;

/// Unit quaternion type for rotations
pub type Quat = UnitQuaternion<f64>;

/// Full robot configuration vector.
///
/// The first three entries are the root position. Configurations with
/// seven or more entries carry the root orientation as a unit
/// quaternion at indices 3..7, in (w, i, j, k) order.
pub type Configuration = DVector<f64>;

/// Limb end-effector identifier
pub type LimbId = String;
