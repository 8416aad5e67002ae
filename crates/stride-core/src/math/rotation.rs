//! Heading and rotation utilities
//!
//! Used by oriented path copies: the root heading of each knot is
//! re-aligned with the local direction of travel, removing rotational
//! discontinuities that a position-only steering step leaves behind.

use nalgebra::Vector3;

use crate::{Quat, Vec3};

/// Directions with a horizontal component below this norm have no
/// usable heading (pure vertical or zero motion).
pub const HEADING_EPS: f64 = 1e-9;

/// Yaw angle of a travel direction, measured in the horizontal plane.
///
/// Returns `None` when the direction has no horizontal component, in
/// which case the caller should keep the current orientation.
pub fn heading_from_direction(dir: &Vec3) -> Option<f64> {
    let horizontal = Vector3::new(dir.x, dir.y, 0.0);
    if horizontal.norm() < HEADING_EPS {
        return None;
    }
    Some(dir.y.atan2(dir.x))
}

/// Rotation about the vertical axis by the given yaw angle.
pub fn quat_from_heading(yaw: f64) -> Quat {
    Quat::from_axis_angle(&Vector3::z_axis(), yaw)
}

/// Yaw component of a rotation (heading of its body x-axis).
pub fn yaw_of(q: &Quat) -> f64 {
    let x_axis = q.transform_vector(&Vector3::x());
    x_axis.y.atan2(x_axis.x)
}
