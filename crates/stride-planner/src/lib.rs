//! Stride Motion Planner
//!
//! Contact-transition generation and dynamic shortcut optimization for
//! legged and multi-limb robot locomotion.
//!
//! # Architecture
//!
//! Two coupled solvers drive the planning pipeline:
//!
//! ```text
//! waypoint states ──> per-transition contact solve (one_step)
//!                       combinatorial search over maintained contacts
//!                       + reposition fallback
//!                 ──> concatenated raw trajectory
//!                 ──> dynamic shortcut optimization (optimize)
//!                       randomized segment replacement
//!                       + orientation cascade
//! ```
//!
//! Collision geometry, equilibrium math, inverse kinematics, and local
//! steering stay behind the capability traits of `stride-core`; this
//! crate configures, drives, and interprets them.
//!
//! # Components
//!
//! - [`config`]: Planner configuration
//! - [`projection`]: Projection reports and drivers
//! - [`contact`]: Contact-transition generation
//! - [`shortcut`]: Dynamic shortcut optimizer
//! - [`pipeline`]: Parallel per-transition planning

pub mod config;
pub mod contact;
pub mod pipeline;
pub mod projection;
pub mod shortcut;

// Re-exports
pub use config::{ContactModel, PlannerConfig, ShortcutConfig};
pub use contact::{one_step, ContactCapabilities, ContactGenHelper, ContactReport};
pub use pipeline::{plan_arena, plan_transitions, PlannerError, TransitionContext, TransitionPlan};
pub use projection::{ContactStatus, ProjectionReport};
pub use shortcut::{DynamicShortcutOptimizer, SteerCapabilities};
