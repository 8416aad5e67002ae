//! Contact state snapshots
//!
//! A [`State`] captures one planning step: which limbs are in contact,
//! at which 6-DoF poses, and the full configuration that realizes those
//! placements. States are created once per step and treated as immutable
//! afterwards; the plan sequence owns them through a [`StateArena`].
//!
//! The diff queries (`fixed_contacts`, `contact_breaks`,
//! `contact_creations`) compare two snapshots contact-by-contact and are
//! the basis for the report flags of the contact-generation algorithm.
//! A limb whose contact moved between two states counts as both a break
//! and a creation.

use std::collections::BTreeMap;

use crate::capabilities::Stability;
use crate::{Configuration, LimbId, Quat, Vec3};

/// Two placements closer than this are the same contact.
pub const POSE_EPS: f64 = 1e-6;

/// A 6-DoF contact placement plus the surface normal at the contact.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactPose {
    /// Contact position [m] (world frame)
    pub position: Vec3,
    /// Effector orientation at the contact (world frame)
    pub rotation: Quat,
    /// Surface normal at the contact (unit, world frame)
    pub normal: Vec3,
}

impl ContactPose {
    /// Placement on a horizontal surface with the effector axes aligned
    /// to the world frame.
    pub fn flat(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::identity(),
            normal: Vec3::new(0.0, 0.0, 1.0),
        }
    }

    /// Whether two placements coincide (position and orientation within
    /// [`POSE_EPS`]).
    pub fn same_placement(&self, other: &ContactPose) -> bool {
        (self.position - other.position).norm() < POSE_EPS
            && self.rotation.angle_to(&other.rotation) < POSE_EPS
    }
}

/// Immutable snapshot of a robot state with active end-effector contacts.
///
/// Invariant: `configuration` and the contact set are mutually
/// consistent — the contact poses correspond to the limb placements the
/// configuration implies. The mutators exist for building a working copy
/// during contact generation; an accepted state is never modified.
#[derive(Debug, Clone)]
pub struct State {
    contacts: BTreeMap<LimbId, ContactPose>,
    /// Full configuration vector realizing the contact placements
    pub configuration: Configuration,
    /// Equilibrium annotation from the last stability check
    pub stable: bool,
}

impl State {
    /// State with no active contacts.
    pub fn new(configuration: Configuration) -> Self {
        Self {
            contacts: BTreeMap::new(),
            configuration,
            stable: false,
        }
    }

    /// State with the given contact placements.
    pub fn with_contacts(
        configuration: Configuration,
        contacts: impl IntoIterator<Item = (LimbId, ContactPose)>,
    ) -> Self {
        Self {
            contacts: contacts.into_iter().collect(),
            configuration,
            stable: false,
        }
    }

    /// Number of active contacts.
    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Active limbs, in deterministic (lexicographic) order.
    pub fn limbs_in_contact(&self) -> Vec<LimbId> {
        self.contacts.keys().cloned().collect()
    }

    /// Placement of a limb, if it is in contact.
    pub fn contact_pose(&self, limb: &str) -> Option<&ContactPose> {
        self.contacts.get(limb)
    }

    /// Whether the limb is in contact.
    pub fn has_contact(&self, limb: &str) -> bool {
        self.contacts.contains_key(limb)
    }

    /// Iterator over (limb, pose) pairs in deterministic order.
    pub fn contacts(&self) -> impl Iterator<Item = (&LimbId, &ContactPose)> {
        self.contacts.iter()
    }

    /// Contact pairs as an owned list, for capability calls.
    pub fn contact_list(&self) -> Vec<(LimbId, ContactPose)> {
        self.contacts
            .iter()
            .map(|(l, p)| (l.clone(), p.clone()))
            .collect()
    }

    /// Place or move a contact on a working copy.
    pub fn set_contact(&mut self, limb: LimbId, pose: ContactPose) {
        self.contacts.insert(limb, pose);
    }

    /// Remove a contact from a working copy.
    pub fn clear_contact(&mut self, limb: &str) -> Option<ContactPose> {
        self.contacts.remove(limb)
    }

    /// Limbs in contact in both states at the same placement.
    pub fn fixed_contacts(&self, previous: &State) -> Vec<LimbId> {
        self.contacts
            .iter()
            .filter(|(limb, pose)| {
                previous
                    .contact_pose(limb.as_str())
                    .is_some_and(|prev| prev.same_placement(pose))
            })
            .map(|(limb, _)| limb.clone())
            .collect()
    }

    /// Limbs in contact in `previous` whose placement is gone or moved
    /// in `self`.
    pub fn contact_breaks(&self, previous: &State) -> Vec<LimbId> {
        previous
            .contacts
            .iter()
            .filter(|(limb, prev_pose)| {
                !self
                    .contact_pose(limb.as_str())
                    .is_some_and(|pose| pose.same_placement(prev_pose))
            })
            .map(|(limb, _)| limb.clone())
            .collect()
    }

    /// Limbs in contact in `self` whose placement is new or moved
    /// relative to `previous`.
    pub fn contact_creations(&self, previous: &State) -> Vec<LimbId> {
        self.contacts
            .iter()
            .filter(|(limb, pose)| {
                !previous
                    .contact_pose(limb.as_str())
                    .is_some_and(|prev| prev.same_placement(pose))
            })
            .map(|(limb, _)| limb.clone())
            .collect()
    }

    /// Limbs that move across the transition: union of breaks and
    /// creations, deduplicated, in deterministic order.
    pub fn contact_variations(&self, previous: &State) -> Vec<LimbId> {
        let mut limbs = self.contact_breaks(previous);
        for limb in self.contact_creations(previous) {
            if !limbs.contains(&limb) {
                limbs.push(limb);
            }
        }
        limbs.sort();
        limbs
    }
}

/// Index of a state in a [`StateArena`].
pub type StepId = usize;

/// Arena of immutable state snapshots indexed by step id.
///
/// Parent relations are stored as indices rather than ownership
/// pointers, so a plan sequence can be walked in either direction
/// without reference cycles.
#[derive(Debug, Default)]
pub struct StateArena {
    states: Vec<State>,
    parents: Vec<Option<StepId>>,
}

impl StateArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a snapshot; `parent` is the step it was generated from.
    pub fn push(&mut self, state: State, parent: Option<StepId>) -> StepId {
        let id = self.states.len();
        self.states.push(state);
        self.parents.push(parent);
        id
    }

    pub fn get(&self, id: StepId) -> Option<&State> {
        self.states.get(id)
    }

    pub fn parent(&self, id: StepId) -> Option<StepId> {
        self.parents.get(id).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// All snapshots in step order.
    pub fn states(&self) -> &[State] {
        &self.states
    }
}

/// A configuration annotated with its active contacts and equilibrium
/// verdict, anchored at the start of a steering attempt.
#[derive(Debug, Clone)]
pub struct SupportNode {
    pub configuration: Configuration,
    pub contacts: Vec<(LimbId, ContactPose)>,
    pub stability: Stability,
}
