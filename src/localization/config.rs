//! Engine configuration, loadable from TOML

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::{LocalizationError, LocalizationResult};

/// Convergence radius used when the camera assists localization
pub const CAMERA_TOLERANCE: f64 = 3.0;

/// How the robot moves and what it senses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalizationMode {
    /// Robot drives along a line; only x matters for convergence
    OneDimensional,
    /// Free 2D motion with ultrasonic sensing
    TwoDimensional,
    /// 2D motion with camera landmark detections fused in
    Camera,
}

impl LocalizationMode {
    pub fn vision_enabled(self) -> bool {
        self == LocalizationMode::Camera
    }
}

impl Default for LocalizationMode {
    fn default() -> Self {
        LocalizationMode::TwoDimensional
    }
}

/// Coordinates fixed at particle generation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PosePin {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub heading: Option<f64>,
}

/// Configuration for the localization engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizationConfig {
    pub particle_count: usize,
    pub mode: LocalizationMode,
    /// Convergence radius outside camera mode
    pub acceptable_tolerance: f64,
    pub pin: PosePin,
    /// Disable to get the deterministic `d = 0` motion model
    pub motion_noise: bool,
    /// Average headings on the circle instead of arithmetically
    pub circular_heading_mean: bool,
    pub seed: Option<u64>,
    pub history_dir: PathBuf,
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            particle_count: 500,
            mode: LocalizationMode::default(),
            acceptable_tolerance: 10.0,
            pin: PosePin::default(),
            motion_noise: true,
            circular_heading_mean: false,
            seed: None,
            history_dir: PathBuf::from("history"),
        }
    }
}

impl LocalizationConfig {
    pub fn from_toml_str(contents: &str) -> LocalizationResult<Self> {
        let config: LocalizationConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> LocalizationResult<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> LocalizationResult<()> {
        if self.particle_count == 0 {
            return Err(LocalizationError::InvalidParameter(
                "particle_count must be at least 1".to_string(),
            ));
        }
        if !(self.acceptable_tolerance > 0.0) {
            return Err(LocalizationError::InvalidParameter(format!(
                "acceptable_tolerance must be positive, got {}",
                self.acceptable_tolerance
            )));
        }
        Ok(())
    }

    /// Convergence radius for the configured mode
    pub fn tolerance(&self) -> f64 {
        if self.mode.vision_enabled() {
            CAMERA_TOLERANCE
        } else {
            self.acceptable_tolerance
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LocalizationConfig::default();
        assert_eq!(config.particle_count, 500);
        assert_eq!(config.mode, LocalizationMode::TwoDimensional);
        assert!(config.motion_noise);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = LocalizationConfig::from_toml_str(
            r#"
            particle_count = 200
            mode = "one_dimensional"
            acceptable_tolerance = 4.5
            motion_noise = false
            seed = 11

            [pin]
            y = 25.0
            "#,
        )
        .unwrap();
        assert_eq!(config.particle_count, 200);
        assert_eq!(config.mode, LocalizationMode::OneDimensional);
        assert_eq!(config.pin.y, Some(25.0));
        assert_eq!(config.pin.x, None);
        assert_eq!(config.seed, Some(11));
        assert_eq!(config.tolerance(), 4.5);
        assert_eq!(config.history_dir, PathBuf::from("history"));
    }

    #[test]
    fn test_camera_mode_uses_fixed_tolerance() {
        let config = LocalizationConfig {
            mode: LocalizationMode::Camera,
            acceptable_tolerance: 50.0,
            ..Default::default()
        };
        assert_eq!(config.tolerance(), CAMERA_TOLERANCE);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = LocalizationConfig::from_toml_str("particle_count = 0").unwrap_err();
        assert!(matches!(err, LocalizationError::InvalidParameter(_)));

        let err = LocalizationConfig::from_toml_str("acceptable_tolerance = -1.0").unwrap_err();
        assert!(matches!(err, LocalizationError::InvalidParameter(_)));

        let err = LocalizationConfig::from_toml_str("mode = \"flying\"").unwrap_err();
        assert!(matches!(err, LocalizationError::Config(_)));
    }
}
