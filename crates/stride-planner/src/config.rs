//! Planner configuration
//!
//! Parameters for contact generation and shortcut optimization.

use serde::{Deserialize, Serialize};

pub use stride_core::capabilities::ContactModel;

/// Main planner configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlannerConfig {
    /// Contact-model parameters (friction, foot geometry, mass)
    pub contact_model: ContactModel,
    /// Shortcut-optimizer parameters
    pub shortcut: ShortcutConfig,
}

/// Configuration for the dynamic shortcut optimizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortcutConfig {
    /// Maximum optimization rounds per call
    pub max_rounds: usize,
    /// Number of recent total lengths compared for convergence
    pub convergence_window: usize,
    /// Relative improvement below which the loop stops
    pub convergence_tol: f64,
    /// Seed for the time-parameter sampler, so runs are reproducible
    pub seed: u64,
}

impl Default for ShortcutConfig {
    fn default() -> Self {
        Self {
            max_rounds: 100,
            convergence_window: 5,
            convergence_tol: 1e-4,
            seed: 0x5742_1d3a,
        }
    }
}
