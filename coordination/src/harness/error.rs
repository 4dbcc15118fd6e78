//! Harness error types
//!
//! Structured error handling for the lower-level harness operations
//! (feature registry, git, progress, hashing). Component-specific errors
//! higher in the stack (`RegistryError`, `CheckpointError`, ...) wrap these
//! via `#[from]` — see [`crate::harness::engine_error`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that can occur during harness operations
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Feature registry file not found
    #[error("Feature registry not found at {path}")]
    RegistryNotFound { path: PathBuf },

    /// Feature registry contains invalid JSON
    #[error("Invalid feature registry JSON: {message}")]
    InvalidRegistry { message: String },

    /// Feature not found in registry
    #[error("Feature not found: {feature_id}")]
    FeatureNotFound { feature_id: String },

    /// Progress file operation failed
    #[error("Progress file error: {message}")]
    ProgressFileError { message: String },

    /// Git operation failed
    #[error("Git operation failed: {operation} - {message}")]
    GitError { operation: String, message: String },

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error (for invalid input parameters)
    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

impl HarnessError {
    /// Create a registry not found error
    pub fn registry_not_found(path: impl Into<PathBuf>) -> Self {
        Self::RegistryNotFound { path: path.into() }
    }

    /// Create an invalid registry error
    pub fn invalid_registry(message: impl Into<String>) -> Self {
        Self::InvalidRegistry {
            message: message.into(),
        }
    }

    /// Create a feature not found error
    pub fn feature_not_found(feature_id: impl Into<String>) -> Self {
        Self::FeatureNotFound {
            feature_id: feature_id.into(),
        }
    }

    /// Create a git error
    pub fn git(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GitError {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a progress file error
    pub fn progress(message: impl Into<String>) -> Self {
        Self::ProgressFileError {
            message: message.into(),
        }
    }

    /// Create a validation error (for invalid input parameters)
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    /// Whether this failure is plausibly transient and worth a single
    /// retry (lock contention, timeouts) versus a hard stop.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::GitError { message, .. } => {
                let lower = message.to_lowercase();
                lower.contains("lock")
                    || lower.contains("timeout")
                    || lower.contains("connection")
                    || lower.contains("network")
                    || lower.contains("could not lock")
                    || lower.contains("another git process")
            }
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}
