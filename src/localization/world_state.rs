//! Recorded filter snapshots and the navigable history they form

use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::common::Pose;
use crate::localization::convergence::ConvergenceState;
use crate::localization::particle::Particle;
use crate::localization::sensor::SensorReading;

/// Snapshot of the complete filter state after one instruction.
///
/// Holds its own copy of the particles, so later filter updates never
/// reach into recorded history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub particles: Vec<Particle>,
    pub estimated_pose: Pose,
    pub estimated_spreading: f64,
    /// Instruction that produced this state, e.g. `move 20`
    pub causative_instruction: String,
    pub sensor_reading: Option<SensorReading>,
    pub map_key: String,
    pub convergence: ConvergenceState,
}

impl WorldState {
    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn is_localized(&self) -> bool {
        self.convergence.is_localized()
    }
}

/// Outcome of a history navigation request
#[derive(Debug, Clone, PartialEq)]
pub enum Navigation {
    /// Now viewing the recorded state at this index
    Moved(usize),
    /// Back at the live state; carries the backup taken when browsing began
    Restored(Arc<WorldState>),
    /// Nothing to do
    Unchanged,
}

/// Append-only sequence of world states with a browsing cursor.
///
/// `cursor == len()` means the live state is shown. While browsing, a
/// backup of the live state is held and the cursor stays below `len() - 1`,
/// because the latest entry mirrors the live state.
#[derive(Debug, Clone, Default)]
pub struct History {
    states: Vec<Arc<WorldState>>,
    cursor: usize,
    backup: Option<Arc<WorldState>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a snapshot.
    ///
    /// While browsing, the cursor stays on the viewed entry and the new
    /// state replaces the live backup.
    pub fn record(&mut self, state: WorldState) -> Arc<WorldState> {
        let state = Arc::new(state);
        self.states.push(Arc::clone(&state));
        if self.is_browsing() {
            self.backup = Some(Arc::clone(&state));
        } else {
            self.cursor = self.states.len();
        }
        debug!(
            "recorded world state #{} ({})",
            self.states.len() - 1,
            state.causative_instruction
        );
        state
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_browsing(&self) -> bool {
        self.backup.is_some()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<WorldState>> {
        self.states.get(index)
    }

    pub fn latest(&self) -> Option<&Arc<WorldState>> {
        self.states.last()
    }

    pub fn states(&self) -> &[Arc<WorldState>] {
        &self.states
    }

    /// Recorded state under the cursor while browsing
    pub fn active(&self) -> Option<&Arc<WorldState>> {
        if self.is_browsing() {
            self.states.get(self.cursor)
        } else {
            None
        }
    }

    /// Step one state back. `live` is invoked to take the backup when
    /// browsing starts.
    pub fn step_backward<F>(&mut self, live: F) -> Navigation
    where
        F: FnOnce() -> WorldState,
    {
        let target = if self.is_browsing() {
            self.cursor.checked_sub(1)
        } else {
            self.states.len().checked_sub(2)
        };
        let target = match target {
            Some(target) => target,
            None => return Navigation::Unchanged,
        };

        if self.backup.is_none() {
            self.backup = Some(Arc::new(live()));
        }
        self.cursor = target;
        Navigation::Moved(target)
    }

    /// Step one state forward; reaching the latest entry restores the live state
    pub fn step_forward(&mut self) -> Navigation {
        if !self.is_browsing() {
            return Navigation::Unchanged;
        }
        let target = self.cursor + 1;
        if target + 1 < self.states.len() {
            self.cursor = target;
            Navigation::Moved(target)
        } else {
            self.reset_to_latest()
        }
    }

    /// Leave browsing mode and hand back the live backup, if any
    pub fn reset_to_latest(&mut self) -> Navigation {
        self.cursor = self.states.len();
        match self.backup.take() {
            Some(backup) => Navigation::Restored(backup),
            None => Navigation::Unchanged,
        }
    }
}
