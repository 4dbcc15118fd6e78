//! Session orchestration and verification engine
//!
//! This crate orchestrates long-running autonomous coding agent sessions:
//! it chooses which feature an agent may attempt next, snapshots the project
//! before the agent acts, supervises the run for stagnation/repetition/context
//! exhaustion, and independently re-verifies whatever the agent claims to have
//! completed — re-running the feature's test, scanning the full suite for
//! regressions against a recorded baseline, and only then committing.
//!
//! An agent's self-report is never authoritative. Every accept decision is
//! re-derived from on-disk artifacts the engine inspects itself.
//!
//! # Components
//!
//! - [`harness::hasher`] — stable content hashing and atomic file I/O.
//! - [`harness::feature_registry`] — the feature catalog, dependency graph,
//!   and single-bit-flip commit invariant.
//! - [`harness::baseline`] — the passing-test-id ledger regressions are
//!   measured against.
//! - [`harness::checkpoint`] / [`harness::git_manager`] — snapshot and
//!   rollback of VCS + engine state.
//! - [`harness::preflight`] — the gate run before any agent is launched.
//! - [`harness::monitor`] — stagnation, repetition, context and wall-clock
//!   supervision during a run.
//! - [`harness::verification`] — independent re-derivation of an agent's
//!   claimed outcome.
//! - [`harness::orchestrator`] — the state machine driving one session
//!   through preflight, selection, snapshot, run, verification and commit
//!   or rollback.
//! - [`harness::decision_log`] — the append-only structured audit trail.
//!
//! The agent itself — the wire protocol, prompt assembly, and the LLM client
//! — is out of scope for this crate. [`harness::orchestrator::AgentDriver`]
//! is the narrow seam the orchestrator calls into.
//!
//! # Usage
//!
//! ```bash
//! # Drive one session against a project directory
//! swarm-engine run --project ./my-project
//! ```

#![allow(dead_code)]
#![allow(clippy::uninlined_format_args)]

pub mod feedback;
pub mod harness;
pub mod verifier;

// Re-export key harness types
pub use harness::{
    Baseline, BaselineDiff, BaselineStore, Checkpoint, CheckpointInputs, CheckpointManager,
    CheckpointManifest, CheckpointReason, Digest, FeatureCategory, FeatureRegistry, FeatureSpec,
    GitManager, HarnessError, HarnessResult, ProgressTracker, VerificationKind,
};

// Re-export decision log types
pub use harness::{DecisionEntry, DecisionLog, DecisionLogRecord, Severity};

// Re-export preflight types
pub use harness::{CheckResult, PreflightConfig, PreflightReport, PreflightRunner};

// Re-export progress monitor types
pub use harness::{ActivitySnapshot, MonitorAction, MonitorConfig, ProgressMonitor, TerminationReason};

// Re-export session orchestration and verification engine types
pub use harness::{
    AgentDriver, EngineConfig, EngineError, EngineResult, EnginePaths, EngineSessionState,
    ExitCode, LocalAction, NullAgent, OrchestratorState, PromptKind, RunOutcome,
    SessionOrchestrator, TerminalStatus, VerificationEngine, VerificationRequest,
    VerificationResult, Verdict,
};

// Re-export the deterministic quality-gate pipeline (the Verification Engine's
// step 3/4/5 test re-run, regression scan, and lint gate reuse this directly)
pub use verifier::{GateOutcome, GateResult, Verifier, VerifierConfig, VerifierReport};
