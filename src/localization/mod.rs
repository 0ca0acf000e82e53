// Monte Carlo Localization filter core

pub mod config;
pub mod convergence;
pub mod engine;
pub mod likelihood;
pub mod motion_model;
pub mod particle;
pub mod persistence;
pub mod pose_estimator;
pub mod resampler;
pub mod sensor;
pub mod shared;
pub mod world_state;

// Re-exports
pub use config::{LocalizationConfig, LocalizationMode, PosePin, CAMERA_TOLERANCE};
pub use convergence::{ConvergenceEvaluator, ConvergenceState};
pub use engine::{DriverRequest, FinalizeOutcome, LocalizationEngine};
pub use likelihood::{Likelihood, LikelihoodScorer, PenaltyTable};
pub use motion_model::MotionModel;
pub use particle::{generate_population, Particle};
pub use persistence::{HistoryFile, HistoryReplay};
pub use pose_estimator::{HeadingMean, PoseEstimator};
pub use sensor::{SensorReading, UltrasonicDirection, VisionReading};
pub use shared::SharedLocalizer;
pub use world_state::{History, Navigation, WorldState};
