//! Error types for FaceRig

use thiserror::Error;

/// Main error type for FaceRig
#[derive(Error, Debug)]
pub enum FaceRigError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

/// Per-frame tracking faults.
///
/// The frame loop recovers from `Tracker`, `Decomposition` and
/// `RigUnavailable` by treating the frame as a no-detection frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackingError {
    #[error("Tracker failure: {0}")]
    Tracker(String),

    #[error("Transform decomposition failed: {0}")]
    Decomposition(String),

    #[error("Rig handle not attached")]
    RigUnavailable,

    #[error("Tracker subprocess error: {0}")]
    Subprocess(String),
}

/// Result type alias for FaceRig operations
pub type Result<T> = std::result::Result<T, FaceRigError>;
