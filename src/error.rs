//! Error types for the Reap Mini client library.

use thiserror::Error;

/// The main error type for all Reap Mini client operations.
#[derive(Error, Debug)]
pub enum ReapError {
    /// The tap quota for the current window is exhausted.
    #[error("Tap limit of {limit} reached, please try again in a few minutes")]
    LimitReached {
        /// The quota that was hit
        limit: u32,
    },

    /// A persisted store could not be read or written
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Filesystem error while persisting
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP request with middleware failed
    #[error("HTTP request failed: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// A remote endpoint answered with a non-success status
    #[error("Upstream {endpoint} unavailable (HTTP {status})")]
    UpstreamUnavailable {
        /// Endpoint path that failed
        endpoint: String,
        /// HTTP status code returned
        status: u16,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid response from a remote endpoint
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Wallet service failure
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Neither a Telegram user nor a peer DID is available
    #[error("User ID or Peer:DID not available")]
    MissingIdentity,

    /// Configuration value could not be parsed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ReapError {
    /// Check if this is a tap quota rejection.
    pub fn is_limit_reached(&self) -> bool {
        matches!(self, Self::LimitReached { .. })
    }

    /// Check if this error came from the persistence layer.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_) | Self::Io(_))
    }

    /// Check if this error came from a remote endpoint or the transport to it.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Http(_)
                | Self::HttpMiddleware(_)
                | Self::UpstreamUnavailable { .. }
                | Self::InvalidResponse(_)
        )
    }

    pub(crate) fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        Self::StorageUnavailable(format!("{context}: {err}"))
    }
}
