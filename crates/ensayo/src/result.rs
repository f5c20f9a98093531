//! Result and error types for Ensayo.

use thiserror::Error;

/// Result type for Ensayo operations
pub type EnsayoResult<T> = Result<T, EnsayoError>;

/// Errors that can occur in Ensayo
#[derive(Debug, Error)]
pub enum EnsayoError {
    /// Registry accessed before a session exists on the calling key.
    /// Ordering error in the caller; always fatal to the operation.
    #[error("No active session: {message}")]
    UninitializedSession {
        /// Error message
        message: String,
    },

    /// Any failure while setting up a browser/context/page/trace.
    /// The partially created session is already unwound when this is returned.
    #[error("Session start failed: {message}")]
    SessionStart {
        /// Error message
        message: String,
    },

    /// Failure while closing a session resource. Collected during teardown,
    /// never propagated past it.
    #[error("Teardown of {resource} failed: {message}")]
    Teardown {
        /// Resource that failed to close
        resource: String,
        /// Error message
        message: String,
    },

    /// Malformed or missing data-feed file
    #[error("Data feed error: {message}")]
    DataFeed {
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Browser engine error
    #[error("Engine error: {message}")]
    Engine {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EnsayoError {
    /// Create an uninitialized-session error
    #[must_use]
    pub fn uninitialized(message: impl Into<String>) -> Self {
        Self::UninitializedSession {
            message: message.into(),
        }
    }

    /// Create a session-start error
    #[must_use]
    pub fn session_start(message: impl Into<String>) -> Self {
        Self::SessionStart {
            message: message.into(),
        }
    }

    /// Create a teardown error for a named resource
    #[must_use]
    pub fn teardown(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Teardown {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create a data-feed error
    #[must_use]
    pub fn data_feed(message: impl Into<String>) -> Self {
        Self::DataFeed {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an engine error
    #[must_use]
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }
}
