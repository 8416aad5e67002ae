//! Dynamic shortcut optimization
//!
//! Randomized local-replacement optimizer for jagged kinodynamic
//! trajectories. Each round partitions the path at two sampled time
//! parameters, attempts a direct dynamics-aware steer across every
//! segment, and keeps a replacement only when it is strictly shorter
//! and fully valid. Accepted replacements may additionally be
//! re-oriented along the direction of travel, which cascades endpoint
//! adjustments into the neighbouring segments.
//!
//! All per-segment and per-round failures degrade to keeping the
//! previous best portion; only exhausting the shared projection-error
//! budget halts the call, returning the best path found so far.

use std::collections::VecDeque;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace, warn};

use stride_core::capabilities::{
    ConfigValidator, ContactModel, DistanceMetric, PathProjector, PathValidator, StabilityOracle,
    Steering, ValidationMode,
};
use stride_core::path::{Path, PathError, PathVector};
use stride_core::state::SupportNode;
use stride_core::Configuration;

use crate::config::ShortcutConfig;

/// Tolerance when checking that re-oriented segments still share the
/// overall path endpoints.
const ENDPOINT_EPS: f64 = 1e-9;

/// Capabilities the optimizer drives.
#[derive(Clone)]
pub struct SteerCapabilities {
    pub validator: Arc<dyn ConfigValidator>,
    pub oracle: Arc<dyn StabilityOracle>,
    pub steering: Arc<dyn Steering>,
    pub path_validator: Arc<dyn PathValidator>,
    pub distance: Arc<dyn DistanceMetric>,
    pub path_projector: Option<Arc<dyn PathProjector>>,
}

/// Build a contact-aware node at `q1` and steer towards `q2`.
///
/// The node records the active contacts (from a compute-all-contacts
/// validation pass with randomized check order) and their equilibrium
/// annotation under the contact model. Steering results whose realized
/// endpoints differ from the request are rejected; when a path
/// projector is configured only the projected result is kept.
pub(crate) fn steer_support(
    caps: &SteerCapabilities,
    model: &ContactModel,
    q1: &Configuration,
    q2: &Configuration,
) -> Option<Arc<dyn Path>> {
    caps.validator.randomize_check_order();
    let report = caps.validator.validate(
        q1,
        ValidationMode {
            compute_all_contacts: true,
        },
    );
    let stability = caps.oracle.judge(q1, &report.contacts, model);
    let node = SupportNode {
        configuration: q1.clone(),
        contacts: report.contacts,
        stability,
    };

    let path = caps.steering.steer(&node, q2)?;
    if path.initial() != *q1 || path.end() != *q2 {
        trace!("steered path endpoints drifted from the request");
        return None;
    }
    match &caps.path_projector {
        None => Some(path),
        Some(projector) => projector.apply(path.as_ref()),
    }
}

/// One of the three per-round segments: either a steered replacement or
/// the original extracted portion.
#[derive(Clone)]
enum RoundSegment {
    Replaced(Arc<dyn Path>),
    Original(PathVector),
}

impl RoundSegment {
    fn append_to(&self, out: &mut PathVector) -> Result<(), PathError> {
        match self {
            RoundSegment::Replaced(path) => out.append(path.clone()),
            RoundSegment::Original(vector) => out.concatenate(vector),
        }
    }
}

/// Randomized segment-replacement optimizer for kinodynamic paths.
///
/// Sequential: one bounded loop, all capability calls synchronous. The
/// returned path shares the input's endpoints and is never longer.
pub struct DynamicShortcutOptimizer {
    config: ShortcutConfig,
    model: ContactModel,
    caps: SteerCapabilities,
    rng: StdRng,
}

impl DynamicShortcutOptimizer {
    pub fn new(config: ShortcutConfig, model: ContactModel, caps: SteerCapabilities) -> Self {
        let mut model = model;
        if model.rectangular_contact && (model.foot_half_x <= 0.0 || model.foot_half_y <= 0.0) {
            warn!("foot geometry undefined, falling back to point contacts");
            model.rectangular_contact = false;
            model.foot_half_x = 0.0;
            model.foot_half_y = 0.0;
        }
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            model,
            caps,
            rng,
        }
    }

    /// Dynamics-aware local steer between two configurations.
    pub fn steer(&self, q1: &Configuration, q2: &Configuration) -> Option<Arc<dyn Path>> {
        steer_support(&self.caps, &self.model, q1, q2)
    }

    /// Iteratively shorten and smooth `path`, preserving its endpoints.
    pub fn optimize(&mut self, path: &PathVector) -> PathVector {
        let q_start = path.initial();
        let q_goal = path.end();
        let mut current = path.clone();

        let window = self.config.convergence_window.max(2);
        let mut budget = self.config.max_rounds;
        let mut lengths: VecDeque<f64> = VecDeque::with_capacity(window);
        lengths.extend(std::iter::repeat(f64::INFINITY).take(window - 1));
        let initial_length = self.caps.distance.path_length(&current);
        lengths.push_back(initial_length);
        debug!(length = initial_length, "starting shortcut optimization");

        let mut round = 0;
        while round < self.config.max_rounds && budget > 0 {
            round += 1;
            let (t0, t3) = current.time_range();
            if t3 - t0 <= f64::EPSILON {
                break;
            }
            let u1 = t0 + (t3 - t0) * self.rng.gen::<f64>();
            let u2 = t0 + (t3 - t0) * self.rng.gen::<f64>();
            let (t1, t2) = if u1 < u2 { (u1, u2) } else { (u2, u1) };

            let Some(q1) = current.eval(t1) else {
                debug!(t = t1, "configuration could not be evaluated");
                budget -= 1;
                continue;
            };
            let Some(q2) = current.eval(t2) else {
                debug!(t = t2, "configuration could not be evaluated");
                budget -= 1;
                continue;
            };

            let ts = [t0, t1, t2, t3];
            let qs = [q_start.clone(), q1, q2, q_goal.clone()];

            // The current portions are both the comparison baseline and
            // the fallback when a replacement is rejected.
            let portions = match (
                current.extract(ts[0], ts[1]),
                current.extract(ts[1], ts[2]),
                current.extract(ts[2], ts[3]),
            ) {
                (Ok(a), Ok(b), Ok(c)) => [a, b, c],
                _ => {
                    debug!("portion extraction failed, aborting round");
                    budget -= 1;
                    continue;
                }
            };

            let mut valid = [false; 3];
            let mut oriented_valid = [false; 3];
            let mut oriented: [Option<Arc<dyn Path>>; 3] = [None, None, None];
            let mut segments: Vec<RoundSegment> = Vec::with_capacity(3);

            for i in 0..3 {
                let mut replacement: Option<Arc<dyn Path>> = None;
                if let Some(straight) = self.steer(&qs[i], &qs[i + 1]) {
                    // A kinodynamic shortcut is not automatically
                    // shorter than the portion it replaces.
                    let mut ok =
                        straight.length() < self.caps.distance.path_length(&portions[i]);
                    if ok {
                        ok = self.caps.path_validator.validate(straight.as_ref()).valid;
                    }
                    if ok {
                        valid[i] = true;
                        if let Some(op) = straight.oriented_copy() {
                            let mut oriented_ok =
                                self.caps.path_validator.validate(op.as_ref()).valid;
                            // Re-orientation must not move the overall
                            // path endpoints.
                            if oriented_ok && i == 0 {
                                oriented_ok = (op.initial() - &qs[0]).norm() < ENDPOINT_EPS;
                            }
                            if oriented_ok && i == 2 {
                                oriented_ok = (op.end() - &qs[3]).norm() < ENDPOINT_EPS;
                            }
                            if oriented_ok {
                                oriented_valid[i] = true;
                                oriented[i] = Some(op);
                            }
                        }
                        replacement = Some(straight);
                    }
                }
                match replacement {
                    Some(path) => segments.push(RoundSegment::Replaced(path)),
                    None => segments.push(RoundSegment::Original(portions[i].clone())),
                }
            }
            trace!(valid = ?valid, oriented = ?oriented_valid, "segment replacement flags");

            self.apply_orientation_cascade(&mut segments, &qs, &valid, &oriented_valid, &oriented);

            // Compose the round's candidate; a composition error aborts
            // the round and reverts to the pre-round path.
            let mut candidate = PathVector::new();
            let mut composed = true;
            for segment in &segments {
                if let Err(e) = segment.append_to(&mut candidate) {
                    warn!(error = %e, "round composition failed, reverting");
                    budget -= 1;
                    composed = false;
                    break;
                }
            }
            let current_length = *lengths.back().unwrap_or(&f64::INFINITY);
            let mut next = if composed { candidate } else { current.clone() };
            let mut new_length = self.caps.distance.path_length(&next);
            // Orientation adjustments can trade length for continuity;
            // a round only commits when the total does not grow.
            if new_length > current_length + 1e-12 {
                trace!(round, length = new_length, "round lengthened the path, reverting");
                next = current.clone();
                new_length = current_length;
            }
            lengths.push_back(new_length);
            let _ = lengths.pop_front();
            trace!(round, length = new_length, "round complete");
            current = next;

            let oldest = *lengths.front().unwrap_or(&f64::INFINITY);
            let newest = *lengths.back().unwrap_or(&f64::INFINITY);
            if oldest - newest <= self.config.convergence_tol * newest {
                debug!(round, "converged");
                break;
            }
        }

        debug!(
            rounds = round,
            remaining_budget = budget,
            length = current.total_length(),
            "shortcut optimization finished"
        );
        current
    }

    /// Re-orientation cascade. The middle segment takes precedence:
    /// when it is oriented-valid, both neighbours must be adjusted to
    /// its new endpoint orientations for any of the three to commit.
    /// Otherwise an oriented side segment only needs the matching
    /// middle endpoint adjusted, and each side commits independently.
    fn apply_orientation_cascade(
        &self,
        segments: &mut [RoundSegment],
        qs: &[Configuration; 4],
        valid: &[bool; 3],
        oriented_valid: &[bool; 3],
        oriented: &[Option<Arc<dyn Path>>; 3],
    ) {
        if oriented_valid[1] {
            let Some(mid) = &oriented[1] else { return };
            trace!("mid segment oriented, adjusting neighbours");
            let first = self.adjust_tail(
                &segments[0],
                valid[0],
                &oriented[0],
                &qs[0],
                &mid.initial(),
            );
            let Some(first) = first else {
                trace!("first segment could not be adjusted");
                return;
            };
            let last = self.adjust_head(&segments[2], valid[2], &oriented[2], &mid.end(), &qs[3]);
            let Some(last) = last else {
                trace!("last segment could not be adjusted");
                return;
            };
            segments[0] = first;
            segments[1] = RoundSegment::Replaced(mid.clone());
            segments[2] = last;
            return;
        }

        if oriented_valid[0] {
            if let Some(first) = &oriented[0] {
                trace!("first segment oriented, adjusting mid start");
                if let Some(mid) = self.adjust_start(&segments[1], &first.end()) {
                    segments[0] = RoundSegment::Replaced(first.clone());
                    segments[1] = mid;
                }
            }
        }
        if oriented_valid[2] {
            if let Some(last) = &oriented[2] {
                trace!("last segment oriented, adjusting mid end");
                if let Some(mid) = self.adjust_end(&segments[1], &last.initial()) {
                    segments[1] = mid;
                    segments[2] = RoundSegment::Replaced(last.clone());
                }
            }
        }
    }

    fn validated(&self, path: Arc<dyn Path>) -> Option<Arc<dyn Path>> {
        if self.caps.path_validator.validate(path.as_ref()).valid {
            Some(path)
        } else {
            None
        }
    }

    /// Adjust a leading neighbour so that it ends at `target_end`.
    fn adjust_tail(
        &self,
        current: &RoundSegment,
        was_valid: bool,
        oriented: &Option<Arc<dyn Path>>,
        q_start: &Configuration,
        target_end: &Configuration,
    ) -> Option<RoundSegment> {
        if let Some(op) = oriented {
            return Some(RoundSegment::Replaced(op.clone()));
        }
        if was_valid {
            let path = self.steer(q_start, target_end)?;
            return self.validated(path).map(RoundSegment::Replaced);
        }
        // The segment is the original extracted vector: re-orient only
        // its last sub-path.
        let RoundSegment::Original(vector) = current else {
            return None;
        };
        let count = vector.sub_path_count();
        let last = vector.path_at(count.checked_sub(1)?)?;
        let replaced = self.validated(self.steer(&last.initial(), target_end)?)?;
        let mut rebuilt = PathVector::new();
        for i in 0..count - 1 {
            rebuilt.append(vector.path_at(i)?.clone()).ok()?;
        }
        rebuilt.append(replaced).ok()?;
        Some(RoundSegment::Original(rebuilt))
    }

    /// Adjust a trailing neighbour so that it starts at `target_start`.
    fn adjust_head(
        &self,
        current: &RoundSegment,
        was_valid: bool,
        oriented: &Option<Arc<dyn Path>>,
        target_start: &Configuration,
        q_end: &Configuration,
    ) -> Option<RoundSegment> {
        if let Some(op) = oriented {
            return Some(RoundSegment::Replaced(op.clone()));
        }
        if was_valid {
            let path = self.steer(target_start, q_end)?;
            return self.validated(path).map(RoundSegment::Replaced);
        }
        let RoundSegment::Original(vector) = current else {
            return None;
        };
        let first = vector.path_at(0)?;
        let replaced = self.validated(self.steer(target_start, &first.end())?)?;
        let mut rebuilt = PathVector::new();
        rebuilt.append(replaced).ok()?;
        for i in 1..vector.sub_path_count() {
            rebuilt.append(vector.path_at(i)?.clone()).ok()?;
        }
        Some(RoundSegment::Original(rebuilt))
    }

    /// Adjust the middle segment so that it starts at `new_start`.
    fn adjust_start(&self, current: &RoundSegment, new_start: &Configuration) -> Option<RoundSegment> {
        match current {
            RoundSegment::Replaced(path) => {
                let replaced = self.steer(new_start, &path.end())?;
                self.validated(replaced).map(RoundSegment::Replaced)
            }
            RoundSegment::Original(vector) => {
                let first = vector.path_at(0)?;
                let replaced = self.validated(self.steer(new_start, &first.end())?)?;
                let mut rebuilt = PathVector::new();
                rebuilt.append(replaced).ok()?;
                for i in 1..vector.sub_path_count() {
                    rebuilt.append(vector.path_at(i)?.clone()).ok()?;
                }
                Some(RoundSegment::Original(rebuilt))
            }
        }
    }

    /// Adjust the middle segment so that it ends at `new_end`.
    fn adjust_end(&self, current: &RoundSegment, new_end: &Configuration) -> Option<RoundSegment> {
        match current {
            RoundSegment::Replaced(path) => {
                let replaced = self.steer(&path.initial(), new_end)?;
                self.validated(replaced).map(RoundSegment::Replaced)
            }
            RoundSegment::Original(vector) => {
                let count = vector.sub_path_count();
                let last = vector.path_at(count.checked_sub(1)?)?;
                let replaced = self.validated(self.steer(&last.initial(), new_end)?)?;
                let mut rebuilt = PathVector::new();
                for i in 0..count - 1 {
                    rebuilt.append(vector.path_at(i)?.clone()).ok()?;
                }
                rebuilt.append(replaced).ok()?;
                Some(RoundSegment::Original(rebuilt))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;
    use stride_core::capabilities::{PathValidity, Stability, ValidationReport};
    use stride_core::path::SteeredSegment;
    use stride_core::state::ContactPose;
    use stride_core::LimbId;

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

    /// Straight-line steering that echoes the requested endpoints.
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

    /// Steering whose result stops short of the requested target.
    struct DriftingSteering;
    impl Steering for DriftingSteering {
        fn steer(&self, from: &SupportNode, target: &Configuration) -> Option<Arc<dyn Path>> {
            let q1 = from.configuration.clone();
            let mut short = target.clone();
            short[0] -= 0.25;
            let length = (&short - &q1).norm();
            Some(Arc::new(SteeredSegment::direct(q1, short, 1.0, length)))
        }
    }

    fn caps_with(steering: Arc<dyn Steering>) -> SteerCapabilities {
        SteerCapabilities {
            validator: Arc::new(AlwaysValid),
            oracle: Arc::new(FlatOracle),
            steering,
            path_validator: Arc::new(AllPathsValid),
            distance: Arc::new(Euclidean),
            path_projector: None,
        }
    }

    #[test]
    fn steer_rejects_endpoint_drift() {
        let optimizer = DynamicShortcutOptimizer::new(
            ShortcutConfig::default(),
            ContactModel::default(),
            caps_with(Arc::new(DriftingSteering)),
        );
        let q1 = DVector::from_vec(vec![0.0, 0.0, 0.0]);
        let q2 = DVector::from_vec(vec![1.0, 0.0, 0.0]);
        assert!(optimizer.steer(&q1, &q2).is_none());
    }

    #[test]
    fn steer_echoing_endpoints_is_accepted() {
        let optimizer = DynamicShortcutOptimizer::new(
            ShortcutConfig::default(),
            ContactModel::default(),
            caps_with(Arc::new(LineSteering)),
        );
        let q1 = DVector::from_vec(vec![0.0, 0.0, 0.0]);
        let q2 = DVector::from_vec(vec![1.0, 0.0, 0.0]);
        let path = optimizer.steer(&q1, &q2).unwrap();
        assert_eq!(path.initial(), q1);
        assert_eq!(path.end(), q2);
    }

    #[test]
    fn undefined_foot_geometry_falls_back_to_point_contact() {
        let model = ContactModel {
            rectangular_contact: true,
            foot_half_x: 0.0,
            foot_half_y: 0.0,
            ..ContactModel::default()
        };
        let optimizer = DynamicShortcutOptimizer::new(
            ShortcutConfig::default(),
            model,
            caps_with(Arc::new(LineSteering)),
        );
        assert!(!optimizer.model.rectangular_contact);
    }
}
