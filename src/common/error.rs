//! Error types for mcl_localization

use thiserror::Error;

/// Main error type for the localization engine
#[derive(Error, Debug)]
pub enum LocalizationError {
    /// Every particle weight was zero when normalizing
    #[error("Degenerate population: all {0} particle weights are zero")]
    DegeneratePopulation(usize),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Operation not allowed in the current engine state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// History (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// History file carries an unknown format tag or version
    #[error("Unsupported history format: {0}")]
    UnsupportedFormat(String),

    /// Plot could not be written
    #[error("Render error: {0}")]
    Render(String),
}

impl From<serde_json::Error> for LocalizationError {
    fn from(e: serde_json::Error) -> Self {
        LocalizationError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for LocalizationError {
    fn from(e: toml::de::Error) -> Self {
        LocalizationError::Config(e.to_string())
    }
}

/// Result type alias for localization operations
pub type LocalizationResult<T> = Result<T, LocalizationError>;
