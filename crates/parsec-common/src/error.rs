//! Common error types shared across Parsec components.

use thiserror::Error;

/// Errors that can occur across Parsec components at a level below any
/// single subsystem's own error type (see `parsec_core::error::ParsecError`
/// for the subsystem-specific taxonomy).
#[derive(Error, Debug)]
pub enum CommonError {
    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias using [`CommonError`].
pub type Result<T> = std::result::Result<T, CommonError>;
