//! Error types shared across the zeroscan workspace.
//!
//! Validation and configuration failures live here because both the
//! discovery engine and the command-line front end raise them. All errors
//! are serializable so they can be emitted in JSON scan reports.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using ZeroscanError as the error type.
pub type Result<T> = std::result::Result<T, ZeroscanError>;

/// Top-level error type for configuration and argument handling.
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum ZeroscanError {
    /// Scan arguments were rejected before any browse started
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised while checking scan arguments.
///
/// These are synchronous and always surface before the discovery backend is
/// asked to browse anything.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ValidationError {
    /// No protocol descriptors were supplied
    #[error("At least one protocol must be supplied")]
    NoProtocols,

    /// A protocol descriptor was empty or whitespace
    #[error("Protocol descriptor at index {index} is blank")]
    BlankProtocol { index: usize },

    /// Retry count below one
    #[error("Retries must be at least 1, got {retries}")]
    InvalidRetries { retries: u32 },

    /// Retry delay of zero
    #[error("Retry delay must be greater than zero")]
    InvalidRetryDelay,

    /// Resolve timeout of zero
    #[error("Resolve timeout must be greater than zero")]
    InvalidResolveTimeout,
}

/// Errors related to configuration.
///
/// These errors occur when loading, parsing, or validating configuration files.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
