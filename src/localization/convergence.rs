//! Localization-done detection
//!
//! The evaluator is a one-way latch: once every particle has been within
//! tolerance of the estimate right after a resample, the run is localized
//! for good.

use log::info;
use serde::{Deserialize, Serialize};

use crate::common::Pose;
use crate::localization::config::LocalizationMode;
use crate::localization::particle::Particle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvergenceState {
    Searching,
    Localized,
}

impl ConvergenceState {
    pub fn is_localized(self) -> bool {
        self == ConvergenceState::Localized
    }
}

#[derive(Debug, Clone)]
pub struct ConvergenceEvaluator {
    state: ConvergenceState,
    mode: LocalizationMode,
    tolerance: f64,
}

impl ConvergenceEvaluator {
    pub fn new(mode: LocalizationMode, tolerance: f64) -> Self {
        ConvergenceEvaluator {
            state: ConvergenceState::Searching,
            mode,
            tolerance,
        }
    }

    pub fn state(&self) -> ConvergenceState {
        self.state
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Deviation of one particle from the estimate for the current mode
    pub fn deviation(&self, particle: &Particle, estimate: &Pose) -> f64 {
        match self.mode {
            LocalizationMode::OneDimensional => (particle.pose.x - estimate.x).abs(),
            LocalizationMode::TwoDimensional | LocalizationMode::Camera => {
                particle.pose.distance(estimate)
            }
        }
    }

    /// Check a freshly resampled population; skipped once localized
    pub fn evaluate(&mut self, particles: &[Particle], estimate: &Pose) -> ConvergenceState {
        if self.state == ConvergenceState::Localized {
            return self.state;
        }
        let converged = particles
            .iter()
            .all(|p| self.deviation(p, estimate) <= self.tolerance);
        if converged {
            info!(
                "localized at ({:.2}, {:.2}, {:.1} deg) within {:.2}",
                estimate.x, estimate.y, estimate.heading, self.tolerance
            );
            self.state = ConvergenceState::Localized;
        }
        self.state
    }
}
