//! Error types for the glucodyn_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for glucodyn_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Time bounds are non-increasing or span a full day or more
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Rate override is missing, ambiguous, or not a usable number
    #[error("Invalid override: {0}")]
    InvalidOverride(String),

    /// Basal schedule violates its construction invariants
    #[error("Invalid basal schedule: {0}")]
    InvalidSchedule(String),
}
