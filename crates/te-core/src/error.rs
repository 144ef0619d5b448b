//! Error types for trigeff

use thiserror::Error;

/// trigeff error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Setup-time wiring error: unknown cut, mismatched axes, missing column.
    ///
    /// These abort the whole run.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Inconsistent chunk content (count arrays vs flattened lengths).
    ///
    /// The offending chunk cannot be processed.
    #[error("Data consistency error: {0}")]
    Data(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
