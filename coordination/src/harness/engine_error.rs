//! Typed error taxonomy for the session orchestration and verification engine.
//!
//! Mirrors the shape of [`crate::harness::error::HarnessError`]: every
//! component returns its own `thiserror`-derived enum, converted into the
//! orchestrator-level [`EngineError`] via `#[from]`. Each leaf carries a
//! machine code, a human message and, where the failure is actionable, an
//! `is_retryable()` classifier the orchestrator consults for its
//! retry-vs-rollback-vs-escalate policy (the VCS-conflict retry-once rule
//! in particular).

use thiserror::Error;

/// Errors raised by the Feature Registry (C2).
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("malformed catalog: {0}")]
    SchemaError(String),
    #[error("dependency error: {0}")]
    DependencyError(String),
    #[error("protocol violation: {0}")]
    Protocol(#[from] crate::harness::feature_registry::ProtocolError),
    #[error("feature not found: {0}")]
    FeatureNotFound(String),
    #[error(transparent)]
    Harness(#[from] crate::harness::error::HarnessError),
}

impl RegistryError {
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Errors raised by the Baseline Store (C3).
#[derive(Error, Debug)]
pub enum BaselineError {
    #[error("baseline artifact not found at {0}")]
    NotFound(String),
    #[error("baseline artifact corrupted: {0}")]
    Corrupted(String),
    #[error(transparent)]
    Harness(#[from] crate::harness::error::HarnessError),
}

impl BaselineError {
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Errors raised by the Checkpoint Manager (C4).
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint not found: {0}")]
    NotFound(String),
    #[error("rollback hash mismatch for {artifact}: expected {expected}, got {actual}")]
    HashMismatch {
        artifact: String,
        expected: String,
        actual: String,
    },
    #[error("vcs error during checkpoint: {0}")]
    Vcs(String),
    #[error(transparent)]
    Harness(#[from] crate::harness::error::HarnessError),
}

impl CheckpointError {
    /// A hash mismatch on rollback is fatal; nothing here is retryable.
    pub fn is_retryable(&self) -> bool {
        false
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::HashMismatch { .. })
    }
}

/// Errors raised by the Preflight Runner (C5).
#[derive(Error, Debug)]
pub enum PreflightError {
    #[error("working directory check failed: {0}")]
    WorkingDirectory(String),
    #[error("required artifact missing: {0}")]
    MissingArtifact(String),
    #[error("vcs not in a clean state: {0}")]
    VcsNotClean(String),
    #[error("environment init hook failed after {attempts} attempt(s): {message}")]
    InitFailed { attempts: u32, message: String },
    #[error("health probe failed: {0}")]
    HealthProbeFailed(String),
    #[error("baseline suite is not green: {failing:?}")]
    BaselineNotGreen { failing: Vec<String> },
    #[error("projected cost exceeds remaining budget: {0}")]
    BudgetExceeded(String),
    #[error(transparent)]
    Harness(#[from] crate::harness::error::HarnessError),
}

impl PreflightError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::InitFailed { .. } | Self::HealthProbeFailed(_))
    }
}

/// Errors raised by the Progress Monitor (C6).
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("context window exhausted")]
    ContextExhausted,
    #[error("wall-clock timeout exhausted")]
    WallClockExhausted,
    #[error(transparent)]
    Harness(#[from] crate::harness::error::HarnessError),
}

impl MonitorError {
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Errors raised by the Verification Engine (C7).
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("verification subprocess timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("verification subprocess failed to launch: {0}")]
    LaunchFailed(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Baseline(#[from] BaselineError),
    #[error(transparent)]
    Harness(#[from] crate::harness::error::HarnessError),
}

impl VerificationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// The orchestrator-level union of every component error.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Baseline(#[from] BaselineError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Preflight(#[from] PreflightError),
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error(transparent)]
    Harness(#[from] crate::harness::error::HarnessError),
    #[error("engine is already running against this project (lock held)")]
    AlreadyRunning,
    #[error("fatal internal error, human intervention required: {0}")]
    Fatal(String),
}

impl EngineError {
    /// Whether the orchestrator should retry the operation that produced
    /// this error (used for the VCS-conflict retry-once policy).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Registry(e) => e.is_retryable(),
            Self::Baseline(e) => e.is_retryable(),
            Self::Checkpoint(e) => e.is_retryable(),
            Self::Preflight(e) => e.is_retryable(),
            Self::Monitor(e) => e.is_retryable(),
            Self::Verification(e) => e.is_retryable(),
            Self::Harness(e) => e.is_retryable(),
            Self::AlreadyRunning | Self::Fatal(_) => false,
        }
    }

    /// Whether this error halts the engine entirely pending human
    /// intervention (currently only a rollback hash mismatch).
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Checkpoint(e) => e.is_fatal(),
            Self::Fatal(_) => true,
            _ => false,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_mismatch_is_fatal_not_retryable() {
        let err = EngineError::Checkpoint(CheckpointError::HashMismatch {
            artifact: "catalog".into(),
            expected: "aaa".into(),
            actual: "bbb".into(),
        });
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn init_failure_is_retryable() {
        let err = EngineError::Preflight(PreflightError::InitFailed {
            attempts: 1,
            message: "exit 1".into(),
        });
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
    }
}
