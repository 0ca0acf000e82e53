//! mcl_localization - Monte Carlo Localization for a small mobile robot
//!
//! A particle filter that estimates the robot pose on a known map from
//! motion commands, ultrasonic distances and optional camera landmarks,
//! recording every step into a navigable, persistable history.

// Core modules
pub mod common;
pub mod utils;

// Algorithm modules
pub mod localization;
pub mod mapping;

// Re-export common types for convenience
pub use common::{Bounds, Point2D, Pose, VisionDetection};
pub use common::{Environment, Visualizable};
pub use common::{LocalizationError, LocalizationResult};
pub use localization::{LocalizationConfig, LocalizationEngine, SharedLocalizer};
