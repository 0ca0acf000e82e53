//! Thread-safe handle to a localization engine
//!
//! The robot driver and the presentation layer run on separate threads.
//! Every operation locks the engine for its whole duration, so neither side
//! ever observes a population that is half updated.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{Environment, LocalizationResult, Pose};
use crate::localization::config::LocalizationConfig;
use crate::localization::convergence::ConvergenceState;
use crate::localization::engine::{DriverRequest, FinalizeOutcome, LocalizationEngine};
use crate::localization::sensor::SensorReading;
use crate::localization::world_state::{Navigation, WorldState};

pub struct SharedLocalizer<E: Environment> {
    inner: Arc<Mutex<LocalizationEngine<E>>>,
}

impl<E: Environment> Clone for SharedLocalizer<E> {
    fn clone(&self) -> Self {
        SharedLocalizer {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Environment> SharedLocalizer<E> {
    pub fn new(env: E, config: LocalizationConfig) -> LocalizationResult<Self> {
        Ok(Self::from_engine(LocalizationEngine::new(env, config)?))
    }

    pub fn from_engine(engine: LocalizationEngine<E>) -> Self {
        SharedLocalizer {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Run `f` with exclusive access to the engine
    pub fn with_engine<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&mut LocalizationEngine<E>) -> T,
    {
        let mut engine = self.inner.lock();
        f(&mut engine)
    }

    // driver side

    pub fn apply_translation(&self, distance: f64) -> LocalizationResult<f64> {
        self.inner.lock().apply_translation(distance)
    }

    pub fn apply_rotation(&self, degrees: f64) -> LocalizationResult<()> {
        self.inner.lock().apply_rotation(degrees)
    }

    pub fn apply_measurement(&self, reading: &SensorReading) -> LocalizationResult<()> {
        self.inner.lock().apply_measurement(reading)
    }

    pub fn finalize(&self) -> Option<FinalizeOutcome> {
        self.inner.lock().finalize()
    }

    pub fn next_request(&self) -> DriverRequest {
        self.inner.lock().next_request()
    }

    // presentation side

    pub fn view(&self) -> Arc<WorldState> {
        self.inner.lock().view()
    }

    pub fn estimated_pose(&self) -> Pose {
        self.inner.lock().estimated_pose()
    }

    pub fn spreading(&self) -> f64 {
        self.inner.lock().spreading()
    }

    pub fn convergence_state(&self) -> ConvergenceState {
        self.inner.lock().convergence_state()
    }

    pub fn is_localized(&self) -> bool {
        self.inner.lock().is_localized()
    }

    pub fn pause(&self) {
        self.inner.lock().pause();
    }

    pub fn resume(&self) {
        self.inner.lock().resume();
    }

    pub fn step_backward(&self) -> LocalizationResult<Navigation> {
        self.inner.lock().step_backward()
    }

    pub fn step_forward(&self) -> LocalizationResult<Navigation> {
        self.inner.lock().step_forward()
    }

    pub fn reset_to_latest(&self) -> LocalizationResult<Navigation> {
        self.inner.lock().reset_to_latest()
    }
}
