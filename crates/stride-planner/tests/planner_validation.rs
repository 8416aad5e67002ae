//! Planner Validation Tests
//!
//! End-to-end checks of the two solvers against their documented
//! guarantees:
//! 1. Transitions reachable without breaking contacts keep the contact
//!    set and report it maintained
//! 2. Shortcut optimization preserves endpoints, never lengthens the
//!    path, and always terminates
//! 3. Independently planned transitions concatenate into one continuous
//!    trajectory, with infeasible suffixes discarded
//! 4. Repeated projection failures exhaust the error budget instead of
//!    looping forever

use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use nalgebra::DVector;

use stride_core::capabilities::{
    CandidateSampler, ConfigValidator, ContactCandidate, ContactModel, ContactProjector,
    DistanceMetric, PathValidator, PathValidity, Stability, StabilityOracle, Steering,
    ValidationMode, ValidationReport,
};
use stride_core::path::{Path, PathVector, SteeredSegment};
use stride_core::state::{ContactPose, State, SupportNode};
use stride_core::{Configuration, LimbId, Vec3};

use stride_planner::contact::ContactCapabilities;
use stride_planner::shortcut::SteerCapabilities;
use stride_planner::{
    plan_arena, plan_transitions, DynamicShortcutOptimizer, PlannerConfig, PlannerError,
    ShortcutConfig, TransitionContext,
};

// ---------------------------------------------------------------------
// Shared mock capabilities: flat ground, straight-line steering
// ---------------------------------------------------------------------

fn config_at(x: f64, y: f64) -> Configuration {
    DVector::from_vec(vec![x, y, 0.5, 1.0, 0.0, 0.0, 0.0])
}

struct AlwaysValid;
impl ConfigValidator for AlwaysValid {
    fn validate(&self, _config: &Configuration, _mode: ValidationMode) -> ValidationReport {
        ValidationReport {
            valid: true,
            contacts: Vec::new(),
        }
    }
}

struct FlatOracle;
impl StabilityOracle for FlatOracle {
    fn judge(
        &self,
        _config: &Configuration,
        _contacts: &[(LimbId, ContactPose)],
        _model: &ContactModel,
    ) -> Stability {
        Stability::Stable
    }
}

/// Flat-ground inverse kinematics: projection succeeds unless the
/// target is blacklisted, keeping maintained contacts at their poses.
struct FlatProjector {
    /// Targets (by x coordinate) for which projection fails
    infeasible_targets: Vec<f64>,
    /// Whether in-place repositioning succeeds
    reposition_succeeds: bool,
    tried_subsets: Mutex<Vec<Vec<LimbId>>>,
}

impl FlatProjector {
    fn feasible() -> Self {
        Self {
            infeasible_targets: Vec::new(),
            reposition_succeeds: true,
            tried_subsets: Mutex::new(Vec::new()),
        }
    }
}

impl ContactProjector for FlatProjector {
    fn project_to_target(
        &self,
        state: &State,
        maintained: &[LimbId],
        target: &Configuration,
    ) -> Option<State> {
        self.tried_subsets.lock().unwrap().push(maintained.to_vec());
        if self
            .infeasible_targets
            .iter()
            .any(|x| (target[0] - x).abs() < 1e-9)
        {
            return None;
        }
        let kept = maintained
            .iter()
            .filter_map(|l| state.contact_pose(l).map(|p| (l.clone(), p.clone())));
        Some(State::with_contacts(target.clone(), kept))
    }

    fn project_contact(&self, state: &State, limb: &str, pose: &ContactPose) -> Option<State> {
        let mut next = state.clone();
        next.set_contact(limb.to_string(), pose.clone());
        Some(next)
    }

    fn reposition(&self, state: &State) -> Option<State> {
        if !self.reposition_succeeds {
            return None;
        }
        Some(state.clone())
    }
}

struct ForwardSampler;
impl CandidateSampler for ForwardSampler {
    fn query(&self, _limb: &str, around: &Vec3) -> Vec<ContactCandidate> {
        vec![ContactCandidate {
            pose: ContactPose::flat(Vec3::new(around.x + 0.1, around.y, around.z)),
        }]
    }
}

struct LineSteering;
impl Steering for LineSteering {
    fn steer(&self, from: &SupportNode, target: &Configuration) -> Option<Arc<dyn Path>> {
        let q1 = from.configuration.clone();
        let length = (target - &q1).norm();
        Some(Arc::new(SteeredSegment::direct(
            q1,
            target.clone(),
            1.0,
            length,
        )))
    }
}

struct AllPathsValid;
impl PathValidator for AllPathsValid {
    fn validate(&self, path: &dyn Path) -> PathValidity {
        PathValidity {
            valid: true,
            valid_up_to: path.time_range().1,
        }
    }
}

struct Euclidean;
impl DistanceMetric for Euclidean {
    fn distance(&self, a: &Configuration, b: &Configuration) -> f64 {
        (a - b).norm()
    }
}

fn steer_caps() -> SteerCapabilities {
    SteerCapabilities {
        validator: Arc::new(AlwaysValid),
        oracle: Arc::new(FlatOracle),
        steering: Arc::new(LineSteering),
        path_validator: Arc::new(AllPathsValid),
        distance: Arc::new(Euclidean),
        path_projector: None,
    }
}

fn contact_caps(projector: FlatProjector) -> ContactCapabilities {
    ContactCapabilities {
        validator: Arc::new(AlwaysValid),
        oracle: Arc::new(FlatOracle),
        projector: Arc::new(projector),
        sampler: Arc::new(ForwardSampler),
    }
}

fn biped_state(x: f64) -> State {
    State::with_contacts(
        config_at(x, 0.0),
        [
            (
                "left-foot".to_string(),
                ContactPose::flat(Vec3::new(x, 0.1, 0.0)),
            ),
            (
                "right-foot".to_string(),
                ContactPose::flat(Vec3::new(x, -0.1, 0.0)),
            ),
        ],
    )
}

fn segment_between(a: &Configuration, b: &Configuration) -> Arc<dyn Path> {
    let length = (b - a).norm();
    Arc::new(SteeredSegment::direct(a.clone(), b.clone(), 1.0, length))
}

// ---------------------------------------------------------------------
// Contact generation
// ---------------------------------------------------------------------

mod contact_generation {
    use super::*;
    use stride_planner::{one_step, ContactGenHelper};

    #[test]
    fn reachable_target_keeps_the_contact_set() {
        let previous = biped_state(0.0);
        let mut helper = ContactGenHelper::new(
            contact_caps(FlatProjector::feasible()),
            ContactModel::default(),
            previous.clone(),
            config_at(0.02, 0.0),
        );
        let report = one_step(&mut helper);

        assert!(report.success());
        assert!(report.contact_maintained);
        assert_eq!(
            report.result().limbs_in_contact(),
            previous.limbs_in_contact()
        );
        assert_eq!(report.result().fixed_contacts(&previous).len(), 2);
    }

    #[test]
    fn exhausted_combinatorials_reposition_in_place() {
        let previous = biped_state(0.0);
        let target = config_at(5.0, 0.0);
        let caps = contact_caps(FlatProjector {
            infeasible_targets: vec![5.0],
            reposition_succeeds: true,
            tried_subsets: Mutex::new(Vec::new()),
        });
        let mut helper =
            ContactGenHelper::new(caps, ContactModel::default(), previous.clone(), target);
        let report = one_step(&mut helper);

        assert!(report.success());
        assert!(report.repositioned_in_place);
        assert_eq!(
            report.result().limbs_in_contact(),
            previous.limbs_in_contact()
        );
    }
}

// ---------------------------------------------------------------------
// Shortcut optimization
// ---------------------------------------------------------------------

mod shortcut_optimization {
    use super::*;

    /// W-shaped detour: whichever two time parameters a round samples,
    /// at least one of the three segments spans a corner and can be
    /// shortened by a direct steer.
    fn zigzag_path() -> PathVector {
        let a = config_at(0.0, 0.0);
        let b = config_at(1.0, 1.0);
        let c = config_at(2.0, 0.0);
        let d = config_at(3.0, 1.0);
        let mut path = PathVector::new();
        path.append(segment_between(&a, &b)).unwrap();
        path.append(segment_between(&b, &c)).unwrap();
        path.append(segment_between(&c, &d)).unwrap();
        path
    }

    /// Same detour over position-only configurations, so no oriented
    /// variants exist and every corner-spanning round must shorten.
    fn zigzag_path_positions() -> PathVector {
        let points = [
            DVector::from_vec(vec![0.0, 0.0, 0.0]),
            DVector::from_vec(vec![1.0, 1.0, 0.0]),
            DVector::from_vec(vec![2.0, 0.0, 0.0]),
            DVector::from_vec(vec![3.0, 1.0, 0.0]),
        ];
        let mut path = PathVector::new();
        for pair in points.windows(2) {
            path.append(segment_between(&pair[0], &pair[1])).unwrap();
        }
        path
    }

    fn optimizer() -> DynamicShortcutOptimizer {
        DynamicShortcutOptimizer::new(
            ShortcutConfig::default(),
            ContactModel::default(),
            steer_caps(),
        )
    }

    #[test]
    fn endpoints_are_preserved() {
        let path = zigzag_path();
        let optimized = optimizer().optimize(&path);

        assert_relative_eq!(
            (optimized.initial() - path.initial()).norm(),
            0.0,
            epsilon = 1e-9
        );
        assert_relative_eq!((optimized.end() - path.end()).norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn result_is_never_longer() {
        let path = zigzag_path();
        let optimized = optimizer().optimize(&path);
        assert!(optimized.total_length() <= path.total_length() + 1e-9);
    }

    #[test]
    fn detour_is_shortened() {
        let path = zigzag_path_positions();
        let optimized = optimizer().optimize(&path);
        // Every round spans at least one corner, so the detour must
        // shrink before the loop converges.
        assert!(optimized.total_length() < path.total_length() - 1e-3);
        assert_relative_eq!(
            (optimized.initial() - path.initial()).norm(),
            0.0,
            epsilon = 1e-9
        );
        assert_relative_eq!((optimized.end() - path.end()).norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let path = zigzag_path();
        let first = optimizer().optimize(&path);
        let second = optimizer().optimize(&path);
        assert_relative_eq!(
            first.total_length(),
            second.total_length(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn projection_failures_exhaust_the_budget() {
        /// A path that never evaluates: every sampled configuration
        /// fails projection.
        struct FailingPath {
            start: Configuration,
            stop: Configuration,
        }
        impl Path for FailingPath {
            fn time_range(&self) -> (f64, f64) {
                (0.0, 1.0)
            }
            fn initial(&self) -> Configuration {
                self.start.clone()
            }
            fn end(&self) -> Configuration {
                self.stop.clone()
            }
            fn eval(&self, _t: f64) -> Option<Configuration> {
                None
            }
            fn length(&self) -> f64 {
                5.0
            }
        }

        let path = PathVector::from_path(Arc::new(FailingPath {
            start: config_at(0.0, 0.0),
            stop: config_at(2.0, 0.0),
        }));
        let optimized = optimizer().optimize(&path);
        // 100 consecutive failures end the call early with the best
        // (unchanged) path.
        assert!(optimized.total_length() <= path.total_length() + 1e-9);
        assert_relative_eq!(
            (optimized.initial() - path.initial()).norm(),
            0.0,
            epsilon = 1e-12
        );
    }
}

// ---------------------------------------------------------------------
// Transition pipeline
// ---------------------------------------------------------------------

mod transition_pipeline {
    use super::*;

    fn context(projector: FlatProjector) -> TransitionContext {
        TransitionContext {
            contact: contact_caps(projector),
            steer: steer_caps(),
            config: PlannerConfig::default(),
        }
    }

    #[test]
    fn independent_transitions_concatenate_continuously() {
        let configs: Vec<Configuration> = (0..4).map(|i| config_at(i as f64 * 0.3, 0.0)).collect();
        let mut path = PathVector::new();
        for pair in configs.windows(2) {
            path.append(segment_between(&pair[0], &pair[1])).unwrap();
        }

        // N sub-paths give exactly N-1 internal continuity points, each
        // matching the shared boundary configuration.
        assert_eq!(path.sub_path_count(), 3);
        for i in 0..path.sub_path_count() - 1 {
            let end = path.path_at(i).unwrap().end();
            let start = path.path_at(i + 1).unwrap().initial();
            assert_relative_eq!((end - &start).norm(), 0.0, epsilon = 1e-12);
            assert_relative_eq!((start - &configs[i + 1]).norm(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn feasible_sequence_plans_every_transition() {
        let mut arena = stride_core::state::StateArena::new();
        let mut parent = None;
        for i in 0..4 {
            parent = Some(arena.push(biped_state(i as f64 * 0.3), parent));
        }
        assert_eq!(arena.parent(parent.unwrap()), Some(2));

        let states = arena.states().to_vec();
        let plan = plan_arena(&context(FlatProjector::feasible()), &arena).unwrap();

        assert_eq!(plan.completed, 3);
        assert_eq!(plan.requested, 3);
        assert_relative_eq!(
            (plan.path.initial() - &states[0].configuration).norm(),
            0.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            (plan.path.end() - &states[3].configuration).norm(),
            0.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn infeasible_transition_discards_downstream() {
        let states: Vec<State> = (0..4).map(|i| biped_state(i as f64 * 0.3)).collect();
        // The third transition's target (x = 0.9) cannot be projected,
        // and its reposition fallback fails too.
        let projector = FlatProjector {
            infeasible_targets: vec![0.9],
            reposition_succeeds: false,
            tried_subsets: Mutex::new(Vec::new()),
        };
        let plan = plan_transitions(&context(projector), &states).unwrap();

        assert_eq!(plan.completed, 2);
        assert_eq!(plan.requested, 3);
        assert_relative_eq!(
            (plan.path.end() - &states[2].configuration).norm(),
            0.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn infeasible_first_transition_is_surfaced() {
        let states: Vec<State> = (0..3).map(|i| biped_state(i as f64 * 0.3)).collect();
        let projector = FlatProjector {
            infeasible_targets: vec![0.3],
            reposition_succeeds: false,
            tried_subsets: Mutex::new(Vec::new()),
        };
        let err = plan_transitions(&context(projector), &states).unwrap_err();
        assert!(matches!(err, PlannerError::NoFeasibleContacts(0)));
    }
}
