//! Session orchestration and verification engine.
//!
//! A single governing concern: the codebase never regresses, and an agent's
//! claim of completion is never trusted — it is re-derived from on-disk
//! artifacts the engine can inspect itself.
//!
//! - `feature_registry` / `types`: the feature catalog, its dependency graph,
//!   and the single-bit-flip commit invariant.
//! - `baseline`: the passing-test-id ledger regressions are measured against.
//! - `checkpoint` / `git_manager`: VCS + state snapshots and their rollback.
//! - `preflight`: the gate run before any agent is launched.
//! - `monitor`: stagnation/repetition/context/wall-clock supervision during a run.
//! - `verification`: independent re-derivation of an agent's claimed outcome.
//! - `orchestrator`: the state machine wiring all of the above into one session.
//! - `decision_log`: the append-only structured audit trail.

pub mod baseline;
pub mod checkpoint;
pub mod decision_log;
pub mod engine_error;
pub mod error;
pub mod feature_registry;
pub mod git_manager;
pub mod hasher;
pub mod monitor;
pub mod orchestrator;
pub mod preflight;
pub mod progress;
pub mod types;
pub mod verification;

pub use baseline::{Baseline, BaselineDiff, BaselineStore};
pub use checkpoint::{
    Checkpoint, CheckpointInputs, CheckpointManager, CheckpointManifest, CheckpointReason,
};
pub use decision_log::{DecisionEntry, DecisionLog, DecisionLogRecord, Severity};
pub use engine_error::{EngineError, EngineResult};
pub use error::{HarnessError, HarnessResult};
pub use feature_registry::FeatureRegistry;
pub use git_manager::GitManager;
pub use hasher::Digest;
pub use monitor::{ActivitySnapshot, MonitorAction, MonitorConfig, ProgressMonitor, TerminationReason};
pub use orchestrator::{
    AgentDriver, EngineConfig, EnginePaths, EngineSessionState, ExitCode, OrchestratorState,
    PromptKind, RunOutcome, SessionOrchestrator, TerminalStatus,
};
pub use preflight::{CheckResult, PreflightConfig, PreflightReport, PreflightRunner};
pub use progress::ProgressTracker;
pub use types::*;
pub use verification::{LocalAction, VerificationEngine, VerificationRequest, VerificationResult, Verdict};
