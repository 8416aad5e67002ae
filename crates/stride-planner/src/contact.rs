//! Contact-transition generation
//!
//! Searches for the next feasible contact configuration from a previous
//! state: enumerate subsets of the previous contacts to keep fixed
//! (fewest breaks first), project each onto the target, and re-create
//! the broken contacts from sampled candidate placements. When every
//! combinatorial fails, fall back to repositioning the existing contact
//! set in place.
//!
//! State machine per transition:
//!
//! ```text
//! START -> try next maintained-contact combinatorial
//!       -> success: DONE(success)
//!       -> failure, combinatorials remaining: retry
//!       -> failure, none remaining: REPOSITION -> DONE(success|failure)
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, trace};

use stride_core::capabilities::{
    CandidateSampler, ConfigValidator, ContactModel, ContactProjector, Stability, StabilityOracle,
    ValidationMode,
};
use stride_core::state::State;
use stride_core::{Configuration, LimbId};

use crate::projection::{self, ContactStatus, ProjectionReport};

/// Capabilities the contact generator drives.
#[derive(Clone)]
pub struct ContactCapabilities {
    pub validator: Arc<dyn ConfigValidator>,
    pub oracle: Arc<dyn StabilityOracle>,
    pub projector: Arc<dyn ContactProjector>,
    pub sampler: Arc<dyn CandidateSampler>,
}

/// Per-step scratch context for one contact-transition solve.
///
/// Built from a previous state and a target configuration, used for a
/// single [`one_step`] call, then discarded.
pub struct ContactGenHelper {
    pub caps: ContactCapabilities,
    pub model: ContactModel,
    /// Prior state (read-only)
    pub previous_state: State,
    /// Candidate state under construction
    pub working_state: State,
    /// Requested configuration for this step
    pub target: Configuration,
    /// Untried maintained-contact subsets, fewest breaks first
    pub candidates: VecDeque<Vec<LimbId>>,
}

impl ContactGenHelper {
    pub fn new(
        caps: ContactCapabilities,
        model: ContactModel,
        previous: State,
        target: Configuration,
    ) -> Self {
        let candidates = maintain_combinatorials(&previous);
        Self {
            caps,
            model,
            working_state: previous.clone(),
            previous_state: previous,
            target,
            candidates,
        }
    }
}

/// All subsets of the state's contact set, ordered to prefer maximal
/// retained subsets first; within a size, subsets dropping
/// later-established contacts come first.
fn maintain_combinatorials(state: &State) -> VecDeque<Vec<LimbId>> {
    let limbs = state.limbs_in_contact();
    let mut queue = VecDeque::new();
    for k in (0..=limbs.len()).rev() {
        for subset in combinations(&limbs, k) {
            queue.push_back(subset);
        }
    }
    queue
}

fn combinations(items: &[LimbId], k: usize) -> Vec<Vec<LimbId>> {
    if k == 0 {
        return vec![Vec::new()];
    }
    if k > items.len() {
        return Vec::new();
    }
    let mut out = Vec::new();
    for i in 0..=items.len() - k {
        for tail in combinations(&items[i + 1..], k - 1) {
            let mut subset = Vec::with_capacity(k);
            subset.push(items[i].clone());
            subset.extend(tail);
            out.push(subset);
        }
    }
    out
}

/// Projection report extended with transition flags derived from
/// diffing the previous and resulting contact sets.
#[derive(Debug, Clone)]
pub struct ContactReport {
    pub projection: ProjectionReport,
    /// No contact was repositioned or newly created
    pub contact_maintained: bool,
    /// More than one contact was dropped
    pub multiple_breaks: bool,
    /// Count of contacts fixed relative to the previous state equals the
    /// previous contact count
    pub contact_created: bool,
    /// Result came from the reposition fallback
    pub repositioned_in_place: bool,
}

impl ContactReport {
    /// Derive the transition flags from the parent projection report.
    /// The flags are read-only views over the contact-set diff; they are
    /// never set independently.
    pub fn derive(
        parent: ProjectionReport,
        helper: &ContactGenHelper,
        repositioned_in_place: bool,
    ) -> Self {
        let previous = &helper.previous_state;
        let result = &parent.result;
        let contact_created =
            result.fixed_contacts(previous).len() == previous.contact_count();
        let multiple_breaks = result.contact_breaks(previous).len() > 1;
        let contact_maintained =
            !repositioned_in_place && result.contact_creations(previous).is_empty();
        Self {
            projection: parent,
            contact_maintained,
            multiple_breaks,
            contact_created,
            repositioned_in_place,
        }
    }

    pub fn success(&self) -> bool {
        self.projection.success
    }

    pub fn result(&self) -> &State {
        &self.projection.result
    }

    pub fn status(&self) -> ContactStatus {
        self.projection.status
    }
}

/// Pop untried maintained subsets until one projects onto the target
/// collision-free and statically consistent; the remaining queue is left
/// for later retries.
pub fn maintain_contacts(helper: &mut ContactGenHelper) -> ProjectionReport {
    let mut report = ProjectionReport::failure(helper.previous_state.clone());
    while let Some(subset) = helper.candidates.pop_front() {
        trace!(subset = ?subset, "trying maintained-contact combinatorial");
        report = projection::project_maintained(
            helper.caps.projector.as_ref(),
            helper.caps.validator.as_ref(),
            helper.caps.oracle.as_ref(),
            &helper.model,
            &helper.previous_state,
            &subset,
            &helper.target,
        );
        if report.success {
            return report;
        }
    }
    report
}

/// Re-create every broken contact from sampled candidate placements.
///
/// For each broken limb the spatial index is queried near its previous
/// placement; the first candidate that projects collision-free and
/// passes the equilibrium oracle is kept. Without stability gating, an
/// unstable but collision-free candidate is accepted as a fallback.
pub fn gen_contacts(helper: &mut ContactGenHelper) -> ProjectionReport {
    let broken = helper.working_state.contact_breaks(&helper.previous_state);
    let mut state = helper.working_state.clone();
    let mut saw_unstable = false;

    for limb in &broken {
        let Some(anchor) = helper.previous_state.contact_pose(limb).map(|p| p.position) else {
            continue;
        };
        let candidates = helper.caps.sampler.query(limb, &anchor);
        trace!(limb = %limb, candidates = candidates.len(), "searching placements for broken contact");

        let mut placed: Option<State> = None;
        let mut unstable_fallback: Option<State> = None;
        for candidate in &candidates {
            let Some(trial) = helper
                .caps
                .projector
                .project_contact(&state, limb, &candidate.pose)
            else {
                continue;
            };
            let report = helper
                .caps
                .validator
                .validate(&trial.configuration, ValidationMode::default());
            if !report.valid {
                continue;
            }
            match helper
                .caps
                .oracle
                .judge(&trial.configuration, &trial.contact_list(), &helper.model)
            {
                Stability::Stable => {
                    placed = Some(trial);
                    break;
                }
                Stability::Unstable => {
                    saw_unstable = true;
                    if unstable_fallback.is_none() {
                        unstable_fallback = Some(trial);
                    }
                }
            }
        }

        match placed {
            Some(mut next) => {
                next.stable = true;
                state = next;
            }
            None => match unstable_fallback {
                Some(mut next) if !helper.model.check_stability => {
                    next.stable = false;
                    state = next;
                }
                _ => {
                    let status = if saw_unstable {
                        ContactStatus::UnstableContact
                    } else {
                        ContactStatus::NoContact
                    };
                    return ProjectionReport {
                        success: false,
                        result: helper.working_state.clone(),
                        status,
                    };
                }
            },
        }
    }

    let status = if state.contact_count() == 0 {
        ContactStatus::NoContact
    } else if state.stable {
        ContactStatus::StableContact
    } else {
        ContactStatus::UnstableContact
    };
    ProjectionReport {
        success: true,
        result: state,
        status,
    }
}

/// Retrieve the first feasible maintain combinatorial and, when found,
/// generate the remaining contacts from it.
pub fn gen_contact_from_one_maintain_combinatorial(
    helper: &mut ContactGenHelper,
) -> ProjectionReport {
    let report = maintain_contacts(helper);
    if report.success {
        helper.working_state = report.result.clone();
        return gen_contacts(helper);
    }
    report
}

/// Reposition the existing contacts without moving the root, after all
/// combinatorials failed.
pub fn handle_failure(helper: &mut ContactGenHelper) -> ContactReport {
    helper.working_state = helper.previous_state.clone();
    let report = projection::reposition_in_place(
        helper.caps.projector.as_ref(),
        helper.caps.validator.as_ref(),
        helper.caps.oracle.as_ref(),
        &helper.model,
        &helper.previous_state,
    );
    ContactReport::derive(report, helper, true)
}

/// Single contact-transition solve: try maintain combinatorials until
/// one yields a full contact set, else reposition in place.
pub fn one_step(helper: &mut ContactGenHelper) -> ContactReport {
    let mut report;
    loop {
        report = gen_contact_from_one_maintain_combinatorial(helper);
        if report.success || helper.candidates.is_empty() {
            break;
        }
    }
    if !report.success {
        debug!("maintain combinatorials exhausted, repositioning in place");
        return handle_failure(helper);
    }
    debug!(status = ?report.status, "contact transition solved");
    ContactReport::derive(report, helper, false)
}
