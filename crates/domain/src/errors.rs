//! Error types used throughout the sync engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Dayline
#[derive(Error, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum DaylineError {
    /// The stored credentials are expired and the provider rejected the
    /// refresh. Terminal for the affected calendar until the user
    /// re-authenticates; never retried automatically.
    #[error("Token expired: {0}")]
    TokenExpired(String),

    /// No gateway is registered for the calendar's provider name. A
    /// configuration error, not a runtime fluke.
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// Transport-level failure talking to the provider.
    #[error("Network error: {0}")]
    Network(String),

    /// The provider answered with an error response.
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unit-of-Work commit failure; the whole pass was discarded.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DaylineError {
    /// Whether a scheduler may retry the failed pass on its next tick.
    ///
    /// Transient transport and provider-side errors are retryable; expired
    /// tokens and misconfiguration are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Provider(_) | Self::Storage(_))
    }
}

/// Result type alias for Dayline operations
pub type Result<T> = std::result::Result<T, DaylineError>;
