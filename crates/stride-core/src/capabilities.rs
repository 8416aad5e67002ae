//! Capability contracts for external collaborators
//!
//! The planning algorithms never implement collision geometry,
//! equilibrium math, inverse kinematics, or local steering themselves;
//! they configure, drive, and interpret the results of these
//! capabilities. Implementations are strategy objects selected at
//! configuration time and shared as `Arc<dyn ...>` handles; all of them
//! must be safe to call from parallel transition workers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::path::Path;
use crate::state::{ContactPose, State, SupportNode};
use crate::{Configuration, LimbId, Vec3};

/// Contact-model parameters shared by the stability oracle and the
/// planners: friction limit, foot geometry, and mass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactModel {
    /// Friction coefficient at the contacts
    pub friction: f64,
    /// Foot half-extent along x [m] (rectangular contacts only)
    pub foot_half_x: f64,
    /// Foot half-extent along y [m] (rectangular contacts only)
    pub foot_half_y: f64,
    /// Rectangular contact surfaces; false means point contacts
    pub rectangular_contact: bool,
    /// Robot mass [kg]
    pub mass: f64,
    /// Whether contact generation rejects unstable candidates
    pub check_stability: bool,
}

impl Default for ContactModel {
    fn default() -> Self {
        Self {
            friction: 0.5,
            foot_half_x: 0.0,
            foot_half_y: 0.0,
            rectangular_contact: false,
            mass: 1.0,
            check_stability: true,
        }
    }
}

impl ContactModel {
    /// Rectangular-contact model with the given foot half-extents.
    pub fn rectangular(foot_half_x: f64, foot_half_y: f64) -> Self {
        Self {
            foot_half_x,
            foot_half_y,
            rectangular_contact: true,
            ..Self::default()
        }
    }
}

/// How a configuration validation pass should run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationMode {
    /// Report every active contact instead of stopping at the first
    /// violation.
    pub compute_all_contacts: bool,
}

/// Result of a configuration validation pass.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub valid: bool,
    /// Contacts detected during the pass (populated when the mode
    /// requests all contacts).
    pub contacts: Vec<(LimbId, ContactPose)>,
}

/// Collision and bounds validation of a single configuration.
pub trait ConfigValidator: Send + Sync {
    fn validate(&self, config: &Configuration, mode: ValidationMode) -> ValidationReport;

    /// Shuffle the internal check order; validators for which order is
    /// irrelevant may ignore this.
    fn randomize_check_order(&self) {}
}

/// Equilibrium verdict for a contact set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    Stable,
    Unstable,
}

/// Judges whether a contact set, friction limit, foot geometry, and
/// mass can resist dynamics at a configuration.
pub trait StabilityOracle: Send + Sync {
    fn judge(
        &self,
        config: &Configuration,
        contacts: &[(LimbId, ContactPose)],
        model: &ContactModel,
    ) -> Stability;
}

/// Inverse-kinematics seam for the contact generator.
///
/// Implementations own the solver; the planner owns the combinatorics.
pub trait ContactProjector: Send + Sync {
    /// Configuration satisfying `target` while the `maintained` contacts
    /// stay fixed at their placements in `state`. The result carries
    /// exactly the maintained contacts; the others are dropped.
    fn project_to_target(
        &self,
        state: &State,
        maintained: &[LimbId],
        target: &Configuration,
    ) -> Option<State>;

    /// Add a contact for `limb` at (approximately) `pose`, adjusting the
    /// configuration of `state` without moving the other contacts.
    fn project_contact(&self, state: &State, limb: &str, pose: &ContactPose) -> Option<State>;

    /// Adjust the placements of the existing contact set without moving
    /// the root. The contact set of the result is unchanged.
    fn reposition(&self, state: &State) -> Option<State>;
}

/// A candidate contact placement from the spatial index.
#[derive(Debug, Clone)]
pub struct ContactCandidate {
    pub pose: ContactPose,
}

/// Spatial-index query for admissible contact placements near a point.
pub trait CandidateSampler: Send + Sync {
    fn query(&self, limb: &str, around: &Vec3) -> Vec<ContactCandidate>;
}

/// Dynamics-bounded local steering between two configurations.
///
/// The node anchors the start configuration together with its contact
/// set and equilibrium annotation, which bound the reachable dynamics.
pub trait Steering: Send + Sync {
    fn steer(&self, from: &SupportNode, target: &Configuration) -> Option<Arc<dyn Path>>;
}

/// Result of validating a whole path.
#[derive(Debug, Clone)]
pub struct PathValidity {
    pub valid: bool,
    /// Parameter up to which the path is valid (the range end when the
    /// whole path is valid).
    pub valid_up_to: f64,
}

/// Collision and dynamic-feasibility validation of a whole path.
pub trait PathValidator: Send + Sync {
    fn validate(&self, path: &dyn Path) -> PathValidity;
}

/// Planning metric. Sub-paths produced by steering are assumed optimal
/// for this metric, so the length of a vector is the sum of its
/// sub-path lengths; override `path_length` when that assumption does
/// not hold.
pub trait DistanceMetric: Send + Sync {
    fn distance(&self, a: &Configuration, b: &Configuration) -> f64;

    fn path_length(&self, path: &crate::path::PathVector) -> f64 {
        path.iter().map(|p| p.length()).sum()
    }
}

/// Optional projection of a steered path onto the constraint manifold.
pub trait PathProjector: Send + Sync {
    fn apply(&self, path: &dyn Path) -> Option<Arc<dyn Path>>;
}
