//! Error types for votechess-server
//!
//! Module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for the votechess server
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream HTTP request errors
    #[error("Upstream request error: {0}")]
    Upstream(#[from] reqwest::Error),

    /// Upstream response did not have the expected shape
    #[error("Unexpected upstream payload: {0}")]
    Payload(String),

    /// Challenge creation attempted again too soon
    #[error("Challenge creation rate limited, wait before creating another")]
    ChallengeRateLimited,

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shared library errors
    #[error(transparent)]
    Common(#[from] votechess_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the server Error
pub type Result<T> = std::result::Result<T, Error>;
