//! Error types for throttle operations.

use thiserror::Error;

/// Main error type for throttle operations.
///
/// Admission decisions themselves never fail; these errors come from
/// configuration, rule construction and the state store.
#[derive(Error, Debug)]
pub enum ThrottleError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A check named a rule that is not configured
    #[error("Unknown rule: {0}")]
    UnknownRule(String),

    /// Persisted state could not be encoded or decoded
    #[error("State codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Layered configuration source errors
    #[error("Configuration source error: {0}")]
    Source(#[from] config::ConfigError),
}

/// Result type alias for throttle operations.
pub type Result<T> = std::result::Result<T, ThrottleError>;
