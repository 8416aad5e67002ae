//! Projection reports and drivers
//!
//! Wraps the inverse-kinematics seam: project a state onto a target
//! while a contact subset stays fixed, or re-place an existing contact
//! set without moving the root, then run the candidate through collision
//! validation and the equilibrium oracle.

use tracing::trace;

use stride_core::capabilities::{
    ConfigValidator, ContactModel, ContactProjector, Stability, StabilityOracle, ValidationMode,
};
use stride_core::state::State;
use stride_core::{Configuration, LimbId};

/// Outcome classification of a contact computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactStatus {
    NoContact,
    StableContact,
    UnstableContact,
}

/// Result of projecting a state onto a target.
///
/// When `success` is false the carried state is the best attempt and
/// must not be treated as a valid result.
#[derive(Debug, Clone)]
pub struct ProjectionReport {
    pub success: bool,
    pub result: State,
    pub status: ContactStatus,
}

impl ProjectionReport {
    /// Failed projection carrying the last attempted state.
    pub fn failure(result: State) -> Self {
        Self {
            success: false,
            result,
            status: ContactStatus::NoContact,
        }
    }
}

/// Classify a validated candidate through the equilibrium oracle and
/// build its report. An unstable candidate only succeeds when the model
/// does not gate on stability.
fn judge_candidate(
    oracle: &dyn StabilityOracle,
    model: &ContactModel,
    mut candidate: State,
) -> ProjectionReport {
    if candidate.contact_count() == 0 {
        candidate.stable = false;
        return ProjectionReport {
            success: true,
            result: candidate,
            status: ContactStatus::NoContact,
        };
    }
    let stability = oracle.judge(&candidate.configuration, &candidate.contact_list(), model);
    candidate.stable = stability == Stability::Stable;
    match stability {
        Stability::Stable => ProjectionReport {
            success: true,
            result: candidate,
            status: ContactStatus::StableContact,
        },
        Stability::Unstable => ProjectionReport {
            success: !model.check_stability,
            result: candidate,
            status: ContactStatus::UnstableContact,
        },
    }
}

/// Project `previous` onto `target` while the `maintained` contacts stay
/// fixed, then validate collision and equilibrium.
pub fn project_maintained(
    projector: &dyn ContactProjector,
    validator: &dyn ConfigValidator,
    oracle: &dyn StabilityOracle,
    model: &ContactModel,
    previous: &State,
    maintained: &[LimbId],
    target: &Configuration,
) -> ProjectionReport {
    let Some(projected) = projector.project_to_target(previous, maintained, target) else {
        trace!(subset = ?maintained, "projection onto target failed");
        return ProjectionReport::failure(previous.clone());
    };
    let report = validator.validate(&projected.configuration, ValidationMode::default());
    if !report.valid {
        trace!(subset = ?maintained, "projected configuration in collision");
        return ProjectionReport::failure(previous.clone());
    }
    judge_candidate(oracle, model, projected)
}

/// Re-place the existing contact set of `state` without moving the
/// root, then validate collision and equilibrium. The contact set of a
/// successful result is identical to the input's.
pub fn reposition_in_place(
    projector: &dyn ContactProjector,
    validator: &dyn ConfigValidator,
    oracle: &dyn StabilityOracle,
    model: &ContactModel,
    state: &State,
) -> ProjectionReport {
    let Some(adjusted) = projector.reposition(state) else {
        trace!("contact repositioning failed");
        return ProjectionReport::failure(state.clone());
    };
    if adjusted.limbs_in_contact() != state.limbs_in_contact() {
        trace!("repositioning changed the contact set, rejecting");
        return ProjectionReport::failure(state.clone());
    }
    let report = validator.validate(&adjusted.configuration, ValidationMode::default());
    if !report.valid {
        return ProjectionReport::failure(state.clone());
    }
    judge_candidate(oracle, model, adjusted)
}
