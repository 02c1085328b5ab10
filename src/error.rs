//! Error types for the event correlation engine.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for engine operations
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed ingestion input; the event is not created and no state is mutated
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid rule or engine configuration, rejected before it reaches the matcher
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An individual action's external call failed; caught per action, never propagated
    #[error("Dispatch error in action '{action}': {reason}")]
    Dispatch {
        /// Action name
        action: String,
        /// Failure reason
        reason: String,
    },

    /// An invalid incident state-machine edge was requested
    #[error("Invalid status transition: {0}")]
    Transition(String),

    /// Entity lookup failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
