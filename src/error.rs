//! Error types for the Daylog request guard.

use thiserror::Error;

/// Main error type for Daylog guard operations.
///
/// Failed checks (an exhausted rate limit, a CSRF mismatch, a wrong TOTP
/// code) are not errors; they come back as ordinary decision values. These
/// variants cover inputs that are corrupt or environments that are broken.
#[derive(Error, Debug)]
pub enum DaylogError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed input, e.g. a TOTP secret that is not valid base32
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Failure inside a cryptographic primitive
    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl From<config::ConfigError> for DaylogError {
    fn from(err: config::ConfigError) -> Self {
        DaylogError::Config(err.to_string())
    }
}

/// Result type alias for Daylog guard operations.
pub type Result<T> = std::result::Result<T, DaylogError>;
