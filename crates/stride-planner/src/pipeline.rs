//! Parallel per-transition planning
//!
//! Transitions between adjacent waypoint states are data-independent:
//! each worker reads only its own state pair plus the shared read-only
//! capability handles, and solves with a private scratch context. The
//! results land in index-aligned slots; a sequential scan then keeps the
//! prefix before the first infeasible transition, since downstream
//! transitions are meaningless once an upstream link is broken. The
//! surviving prefix is concatenated and length-reduced into a single
//! trajectory.

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, warn};

use stride_core::path::{PathError, PathVector};
use stride_core::state::{State, StateArena};

use crate::config::PlannerConfig;
use crate::contact::{self, ContactCapabilities, ContactGenHelper};
use crate::shortcut::{steer_support, DynamicShortcutOptimizer, SteerCapabilities};

/// Planner errors surfaced to the caller.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// Planning needs at least two waypoint states.
    #[error("state sequence needs at least two states")]
    NotEnoughStates,
    /// All maintain combinatorials and the reposition fallback failed
    /// for the given transition; the caller must replan or abort it.
    #[error("no feasible contact transition at step {0}")]
    NoFeasibleContacts(usize),
    /// Concatenation of the surviving transitions failed.
    #[error(transparent)]
    Path(#[from] PathError),
}

/// Capability bundle and configuration shared by all transition workers.
#[derive(Clone)]
pub struct TransitionContext {
    pub contact: ContactCapabilities,
    pub steer: SteerCapabilities,
    pub config: PlannerConfig,
}

/// Result of planning a waypoint sequence.
#[derive(Debug)]
pub struct TransitionPlan {
    /// Concatenated, shortcut-optimized trajectory over the surviving
    /// prefix.
    pub path: PathVector,
    /// Transitions that survived the feasibility scan.
    pub completed: usize,
    /// Transitions requested.
    pub requested: usize,
}

/// Plan every transition of `states` in parallel, keep the feasible
/// prefix, and reduce it to a single optimized trajectory.
pub fn plan_transitions(
    ctx: &TransitionContext,
    states: &[State],
) -> Result<TransitionPlan, PlannerError> {
    if states.len() < 2 {
        return Err(PlannerError::NotEnoughStates);
    }
    let requested = states.len() - 1;

    // One worker per transition, each with a private helper; results go
    // into slots indexed by transition position.
    let results: Vec<Option<PathVector>> = states
        .par_windows(2)
        .map(|pair| plan_one(ctx, &pair[0], &pair[1]))
        .collect();

    let completed = results.iter().position(Option::is_none).unwrap_or(requested);
    if completed == 0 {
        return Err(PlannerError::NoFeasibleContacts(0));
    }
    if completed < requested {
        warn!(
            failed = completed,
            "transition infeasible, discarding downstream transitions"
        );
    }

    let mut path = PathVector::new();
    for partial in results.iter().take(completed).flatten() {
        path.concatenate(partial)?;
    }
    debug!(
        transitions = completed,
        length = path.total_length(),
        "transitions concatenated"
    );

    let mut optimizer = DynamicShortcutOptimizer::new(
        ctx.config.shortcut.clone(),
        ctx.config.contact_model.clone(),
        ctx.steer.clone(),
    );
    let path = optimizer.optimize(&path);
    Ok(TransitionPlan {
        path,
        completed,
        requested,
    })
}

/// Plan the snapshots of an arena in step order.
pub fn plan_arena(
    ctx: &TransitionContext,
    arena: &StateArena,
) -> Result<TransitionPlan, PlannerError> {
    plan_transitions(ctx, arena.states())
}

/// Solve one transition: contact generation towards the target state,
/// then a dynamics-aware steer onto the resulting configuration.
fn plan_one(ctx: &TransitionContext, from: &State, to: &State) -> Option<PathVector> {
    debug!(moving = ?to.contact_variations(from), "planning transition");
    let mut helper = ContactGenHelper::new(
        ctx.contact.clone(),
        ctx.config.contact_model.clone(),
        from.clone(),
        to.configuration.clone(),
    );
    let report = contact::one_step(&mut helper);
    if !report.success() {
        debug!("contact transition infeasible");
        return None;
    }
    let segment = steer_support(
        &ctx.steer,
        &ctx.config.contact_model,
        &from.configuration,
        &report.result().configuration,
    )?;
    Some(PathVector::from_path(segment))
}
