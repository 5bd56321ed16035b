//! Rate Limit Error Types

/// Errors raised inside the rate limiting subsystem.
///
/// None of these reach a request handler: the limiter turns store errors
/// into an admit or reject according to the configured failure mode.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The shared window store could not be read or written
    #[error("Window store unavailable: {0}")]
    StoreUnavailable(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
