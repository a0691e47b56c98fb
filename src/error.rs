//! Error types for the Vergo rate limiting crate.

use thiserror::Error;

/// Main error type for Vergo rate limiting operations.
#[derive(Error, Debug)]
pub enum VergoError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A request was rejected by the rate limiter
    #[error("Rate limit exceeded for {key}, retry after {retry_after_ms}ms")]
    RateLimited {
        /// The key whose quota is exhausted
        key: String,
        /// Milliseconds until the current window ends
        retry_after_ms: u64,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VergoError {
    /// HTTP status a route handler should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            VergoError::RateLimited { .. } => 429,
            _ => 500,
        }
    }

    /// Value for the `Retry-After` header, in whole seconds.
    ///
    /// Rounded up, never below one second.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            VergoError::RateLimited { retry_after_ms, .. } => {
                Some(retry_after_ms.div_ceil(1000).max(1))
            }
            _ => None,
        }
    }
}

impl From<config::ConfigError> for VergoError {
    fn from(err: config::ConfigError) -> Self {
        VergoError::Config(err.to_string())
    }
}

/// Result type alias for Vergo operations.
pub type Result<T> = std::result::Result<T, VergoError>;
