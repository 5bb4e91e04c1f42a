//! Error types for localai-router
//!
//! One error enum for the whole library. The request router never lets these
//! escape to its callers; snapshot operations return them to operator tooling.

use thiserror::Error;

/// Main error type for the router and snapshot engine
#[derive(Error, Debug)]
pub enum RouterError {
    /// A probe exceeded its deadline
    #[error("Probe of '{service}' timed out after {timeout_ms}ms")]
    ProbeTimeout { service: String, timeout_ms: u64 },

    /// Probe got a response, but the service reported an error status
    #[error("Service '{service}' is unhealthy: HTTP {status_code}")]
    ServiceUnhealthy { service: String, status_code: u16 },

    /// Local model registry is empty
    #[error("No local models available")]
    NoModelAvailable,

    /// Explicitly requested model is not installed
    #[error("Model '{requested}' not available. Available: {available}")]
    ModelNotInstalled { requested: String, available: String },

    /// Local generation failed mid-flight
    #[error("Local inference failed: {0}")]
    LocalInferenceFailure(String),

    /// A backend answered, but with something unusable
    #[error("Invalid response from '{service}': {reason}")]
    InvalidResponse { service: String, reason: String },

    /// Snapshot could not be persisted
    #[error("Backup write failed: {0}")]
    BackupWriteFailure(String),

    /// Unknown snapshot id
    #[error("Snapshot '{0}' not found")]
    SnapshotNotFound(String),

    /// Snapshot file exists but cannot be decoded
    #[error("Snapshot '{id}' is corrupt: {reason}")]
    SnapshotCorrupt { id: String, reason: String },

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for router operations
pub type Result<T> = std::result::Result<T, RouterError>;

impl RouterError {
    /// Whether this error came out of the local inference path
    pub fn is_inference_error(&self) -> bool {
        matches!(
            self,
            RouterError::NoModelAvailable
                | RouterError::ModelNotInstalled { .. }
                | RouterError::LocalInferenceFailure(_)
        )
    }
}
