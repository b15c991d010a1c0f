//! Error types for vermilinks-core.
//!
//! None of these errors escape the engine: the polling controller turns them
//! into a `last_error` string and a backoff step, and the realtime bridge logs
//! and drops them. They surface directly only from the snapshot client, the
//! push transports and configuration loading.
//!
//! | Error | Raised by | Engine reaction |
//! |-------|-----------|-----------------|
//! | [`Error::Transport`] | snapshot fetch | backoff, `last_error` |
//! | [`Error::Timeout`] | snapshot fetch | backoff, `last_error` |
//! | [`Error::Api`] | snapshot fetch | backoff, server message in `last_error` |
//! | [`Error::InvalidPayload`] | snapshot fetch | backoff, `last_error` |
//! | [`Error::Channel`] | push transport emit | logged |
//! | [`Error::InvalidUrl`], [`Error::InvalidConfig`] | construction | returned to caller |

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while synchronizing telemetry.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The snapshot endpoint could not be reached.
    #[error("Snapshot endpoint not reachable at {url}: {message}")]
    Transport {
        /// The URL that was requested.
        url: String,
        /// The underlying transport error.
        message: String,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// The server answered with an error status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Server-provided message, or the status text.
        message: String,
    },

    /// The response body was not valid JSON.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The push channel rejected an outbound message.
    #[error("Push channel error: {0}")]
    Channel(String),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a transport error for a URL.
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Message suitable for showing to a dashboard user.
    ///
    /// Structured server messages are preferred over transport detail.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the error came from fetching a snapshot (and so should trigger
    /// backoff) rather than from misuse.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Timeout { .. } | Self::Api { .. } | Self::InvalidPayload(_)
        )
    }
}

/// Result type alias using vermilinks-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
