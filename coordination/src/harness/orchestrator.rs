//! Session Orchestrator (C8)
//!
//! The state machine wiring the Feature Registry, Baseline Store,
//! Checkpoint Manager, Preflight Runner, Progress Monitor and
//! Verification Engine together. Drives exactly one session from
//! preflight through commit or rollback, and decides the prompt kind the
//! (out-of-scope) external prompt-assembly layer should use next.
//!
//! States: `Idle -> Preflight -> Selecting -> Snapshotting -> Running ->
//! Verifying -> Committing -> Idle`, plus terminal failure states
//! `RolledBack`, `Escalated`, `Aborted`. See the module tests for the
//! literal end-to-end scenarios this mirrors.

use crate::harness::baseline::BaselineStore;
use crate::harness::checkpoint::{CheckpointInputs, CheckpointManager, CheckpointReason};
use crate::harness::decision_log::{DecisionLog, Severity};
use crate::harness::engine_error::{EngineError, EngineResult};
use crate::harness::feature_registry::{FeatureRegistry, NextReady};
use crate::harness::git_manager::GitManager;
use crate::harness::monitor::{ActivitySnapshot, MonitorAction, MonitorConfig, ProgressMonitor, TerminationReason};
use crate::harness::preflight::{PreflightConfig, PreflightRunner};
use crate::harness::types::FeatureSpec;
use crate::harness::verification::{VerificationEngine, VerificationRequest, Verdict};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current position of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Preflight,
    Selecting,
    Snapshotting,
    Running,
    Verifying,
    Committing,
    RolledBack,
    Escalated,
    Aborted,
}

/// Terminal status of the most recently completed session, persisted into
/// [`EngineSessionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Complete,
    Partial,
    Failed,
    Paused,
    TimedOut,
    ContextExhausted,
    Stuck,
}

/// What kind of prompt the external prompt-assembly layer should build
/// for the next session. The orchestrator decides this; it never builds
/// the prompt itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    Coding,
    Continuation,
    Cleanup,
    Init,
}

/// The persisted cursor between invocations (§3 Session State).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSessionState {
    pub schema_version: u32,
    pub last_session_number: u32,
    pub last_status: TerminalStatus,
    pub next_prompt_kind: PromptKind,
    pub last_feature_attempted: Option<String>,
    pub stuck_counters: std::collections::BTreeMap<String, u32>,
    pub last_wall_clock_secs: u64,
    pub last_tokens_used: u64,
    /// Consecutive successful completions since the last cleanup session,
    /// driving the cleanup-interval schedule.
    pub consecutive_completions: u32,
}

impl EngineSessionState {
    pub fn initial() -> Self {
        Self {
            schema_version: 1,
            last_session_number: 0,
            last_status: TerminalStatus::Complete,
            next_prompt_kind: PromptKind::Init,
            last_feature_attempted: None,
            stuck_counters: std::collections::BTreeMap::new(),
            last_wall_clock_secs: 0,
            last_tokens_used: 0,
            consecutive_completions: 0,
        }
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        if !path.exists() {
            return Ok(Self::initial());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Fatal(format!("reading session state: {e}")))?;
        serde_json::from_str(&content)
            .map_err(|e| EngineError::Fatal(format!("corrupt session state: {e}")))
    }

    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::Fatal(format!("serializing session state: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .map_err(|e| EngineError::Fatal(format!("writing session state: {e}")))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| EngineError::Fatal(format!("renaming session state: {e}")))?;
        Ok(())
    }
}

/// Process exit codes per §6: 0 on accept/no-work, distinct non-zero codes
/// per failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    PreflightFailure = 10,
    VerificationRejection = 11,
    RegressionRollback = 12,
    Escalation = 13,
    FatalInternal = 14,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// The enumerated, typed configuration schema (§6). Unknown keys reaching
/// the core are a configuration error for whatever external loader
/// deserializes into this struct — the core does not accept free-form
/// keyword expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Catalog-diff validator rejects diffs claiming more than this many
    /// features complete in one session. Contractually always 1.
    pub max_features_per_session: usize,
    pub regression_check_enabled: bool,
    pub monitor: MonitorConfig,
    pub stuck_sessions_limit: u32,
    pub cleanup_interval: u32,
    pub checkpoint_retain_per_feature: usize,
    pub checkpoint_retain_max_age_days: i64,
    pub preflight_max_reset_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_features_per_session: 1,
            regression_check_enabled: true,
            monitor: MonitorConfig::default(),
            stuck_sessions_limit: 3,
            cleanup_interval: 5,
            checkpoint_retain_per_feature: 3,
            checkpoint_retain_max_age_days: 30,
            preflight_max_reset_attempts: 2,
        }
    }
}

/// What the (out-of-scope) agent integration gives the orchestrator for
/// the `Running` state: step the agent forward and report activity. The
/// core never talks the agent wire protocol itself — this trait is the
/// narrow seam Non-goals keeps that protocol behind.
pub trait AgentDriver {
    /// Advance the agent by one step, returning the activity snapshot for
    /// the Progress Monitor to evaluate. `None` means the agent quiesced
    /// or declared completion on its own — Running ends normally.
    fn step(&mut self) -> Option<ActivitySnapshot>;
    /// Whether the agent's structured transcript shows it ran the
    /// claimed feature's test itself.
    fn evidence_present(&self) -> bool;
    /// Deliver a side-channel message (nudge or forced-wrap-up).
    fn inject_message(&mut self, message: &str);
    /// Terminate the agent conversation immediately.
    fn terminate(&mut self, reason: TerminationReason);
}

/// A no-op [`AgentDriver`]: quiesces on its first step, reports no
/// evidence, and ignores every injected message. Stands in for the
/// out-of-scope agent wire protocol so the orchestrator's `Running` state
/// is exercisable without a real LLM client — by a CLI invocation that
/// only wants to verify whatever a prior external process left on disk,
/// or by a test double.
#[derive(Debug, Default)]
pub struct NullAgent {
    pub evidence_present: bool,
}

impl AgentDriver for NullAgent {
    fn step(&mut self) -> Option<ActivitySnapshot> {
        None
    }
    fn evidence_present(&self) -> bool {
        self.evidence_present
    }
    fn inject_message(&mut self, _message: &str) {}
    fn terminate(&mut self, _reason: TerminationReason) {}
}

/// An advisory, per-project exclusive lock preventing two sessions from
/// running against the same state directory concurrently (§5). Acquired
/// with an atomic create-new (the `O_EXCL` equivalent) rather than an OS
/// flock, matching the write-temp-then-rename idiom the rest of the
/// harness uses for crash safety. Released on drop.
struct ProjectLock {
    path: PathBuf,
}

impl ProjectLock {
    fn acquire(state_dir: &Path) -> EngineResult<Self> {
        let path = state_dir.join(".lock");
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(EngineError::AlreadyRunning)
            }
            Err(e) => Err(EngineError::Harness(crate::harness::error::HarnessError::Io(e))),
        }
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Paths to every persisted artifact the orchestrator reads or writes.
pub struct EnginePaths {
    pub project_root: PathBuf,
    pub catalog_path: PathBuf,
    pub narrative_path: PathBuf,
    pub session_state_path: PathBuf,
    pub baseline_path: PathBuf,
    pub checkpoints_dir: PathBuf,
    pub decision_log_path: PathBuf,
}

/// The outcome of one `run()` call, carrying everything a caller (a CLI,
/// a test) needs to report to the operator or decide exit status.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub final_state: OrchestratorState,
    pub exit_code: ExitCode,
    pub verdict: Option<Verdict>,
    pub feature_id: Option<String>,
    pub next_prompt_kind: PromptKind,
}

/// The Session Orchestrator.
pub struct SessionOrchestrator {
    paths: EnginePaths,
    config: EngineConfig,
    git: GitManager,
    session_id: String,
}

impl SessionOrchestrator {
    pub fn new(paths: EnginePaths, config: EngineConfig, git: GitManager) -> Self {
        Self {
            paths,
            config,
            git,
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Drive exactly one session. `agent` is only consulted during the
    /// `Running` state; every other state is internal to the core.
    pub async fn run(&mut self, agent: &mut dyn AgentDriver) -> EngineResult<RunOutcome> {
        let _lock = ProjectLock::acquire(&self.paths.project_root)?;
        let decision_log = DecisionLog::new(&self.paths.decision_log_path)
            .map_err(|e| EngineError::Fatal(e.to_string()))?;
        let mut session_state = EngineSessionState::load(&self.paths.session_state_path)?;
        let session_number = session_state.last_session_number + 1;

        let _ = decision_log.log(
            Severity::Routine,
            "orchestrator.idle_to_preflight",
            &self.session_id,
            format!("starting session {session_number}"),
        );

        // --- Preflight -----------------------------------------------
        let mut registry = FeatureRegistry::load_with_recovery(&self.paths.catalog_path)
            .map_err(EngineError::Harness)?;
        let baseline = BaselineStore::load(&self.paths.baseline_path)
            .map_err(EngineError::Baseline)?;

        let preflight_config = PreflightConfig {
            project_root: self.paths.project_root.clone(),
            required_artifacts: vec![self.paths.catalog_path.clone()],
            max_reset_attempts: self.config.preflight_max_reset_attempts,
            ..PreflightConfig::default()
        };
        let preflight = PreflightRunner::new(preflight_config, &self.git);
        let baseline_ids: Vec<String> = baseline.baseline().passing.iter().cloned().collect();
        let report = preflight.run(&baseline_ids).await;

        if !report.all_passed() {
            let failure = report.first_failure().cloned();
            let reason = failure
                .as_ref()
                .and_then(|f| f.reason.clone())
                .unwrap_or_default();
            let _ = decision_log.log(
                Severity::Critical,
                "preflight.failed",
                &self.session_id,
                format!(
                    "check '{}' failed: {}",
                    failure.map(|f| f.name).unwrap_or("unknown"),
                    reason
                ),
            );
            return Ok(RunOutcome {
                final_state: OrchestratorState::Aborted,
                exit_code: ExitCode::PreflightFailure,
                verdict: None,
                feature_id: None,
                next_prompt_kind: session_state.next_prompt_kind,
            });
        }

        // --- Selecting -------------------------------------------------
        let feature_id = match registry.next_ready() {
            NextReady::Ready(f) => f.id.clone(),
            NextReady::BlockedOnDependency => {
                let _ = decision_log.log(
                    Severity::Important,
                    "selecting.blocked_on_dependency",
                    &self.session_id,
                    "every incomplete feature is blocked on a dependency",
                );
                session_state.last_session_number = session_number;
                session_state.last_status = TerminalStatus::Failed;
                session_state.save(&self.paths.session_state_path)?;
                return Ok(RunOutcome {
                    final_state: OrchestratorState::Aborted,
                    exit_code: ExitCode::FatalInternal,
                    verdict: None,
                    feature_id: None,
                    next_prompt_kind: PromptKind::Coding,
                });
            }
            NextReady::None => {
                let _ = decision_log.log(
                    Severity::Important,
                    "selecting.all_done",
                    &self.session_id,
                    "no incomplete features remain",
                );
                session_state.last_session_number = session_number;
                session_state.last_status = TerminalStatus::Complete;
                session_state.save(&self.paths.session_state_path)?;
                return Ok(RunOutcome {
                    final_state: OrchestratorState::Idle,
                    exit_code: ExitCode::Success,
                    verdict: None,
                    feature_id: None,
                    next_prompt_kind: PromptKind::Coding,
                });
            }
        };

        let stuck_count = registry
            .find(&feature_id)
            .map(|f| f.stuck_counter)
            .unwrap_or(0);
        if stuck_count >= self.config.stuck_sessions_limit {
            let _ = decision_log.log(
                Severity::Critical,
                "selecting.escalated",
                &self.session_id,
                format!("feature '{feature_id}' stuck counter {stuck_count} reached the limit"),
            );
            session_state.last_session_number = session_number;
            session_state.last_status = TerminalStatus::Stuck;
            session_state.last_feature_attempted = Some(feature_id.clone());
            session_state.save(&self.paths.session_state_path)?;
            return Ok(RunOutcome {
                final_state: OrchestratorState::Escalated,
                exit_code: ExitCode::Escalation,
                verdict: None,
                feature_id: Some(feature_id),
                next_prompt_kind: PromptKind::Coding,
            });
        }

        // --- Snapshotting ------------------------------------------------
        let checkpoints = CheckpointManager::new(&self.paths.checkpoints_dir, self.clone_git())
            .with_retention(
                self.config.checkpoint_retain_per_feature,
                self.config.checkpoint_retain_max_age_days,
            );
        let checkpoint = checkpoints
            .create(
                session_number,
                CheckpointReason::PreFeature,
                Some(&feature_id),
                CheckpointInputs {
                    catalog_path: &self.paths.catalog_path,
                    narrative_path: &self.paths.narrative_path,
                    session_state_path: &self.paths.session_state_path,
                    baseline_path: &self.paths.baseline_path,
                },
            )
            .map_err(EngineError::Checkpoint)?;
        let _ = decision_log.log(
            Severity::Important,
            "snapshotting.checkpoint_created",
            &self.session_id,
            format!("checkpoint {} for feature '{feature_id}'", checkpoint.manifest.id),
        );

        // --- Running -------------------------------------------------
        let mut monitor = ProgressMonitor::new(self.config.monitor.clone(), u64::MAX);
        let mut termination: Option<TerminationReason> = None;
        let mut last_snapshot = ActivitySnapshot::default();
        while let Some(snapshot) = agent.step() {
            last_snapshot = snapshot.clone();
            match monitor.tick(snapshot) {
                MonitorAction::Continue => {}
                MonitorAction::Nudge(msg) => agent.inject_message(&msg),
                MonitorAction::ForceWrapUp(msg) => agent.inject_message(&msg),
                MonitorAction::HardStop(reason) => {
                    agent.terminate(reason);
                    termination = Some(reason);
                    break;
                }
            }
        }

        if let Some(reason) = termination {
            let _ = decision_log.log(
                Severity::Important,
                "running.terminated",
                &self.session_id,
                format!("progress monitor terminated the agent: {reason}"),
            );
        }

        // --- Verifying (always runs, regardless of how Running ended) --
        let proposed_catalog = FeatureRegistry::load_with_recovery(&self.paths.catalog_path)
            .map_err(EngineError::Harness)?
            .features()
            .to_vec();

        let verification = VerificationEngine::new(&self.paths.project_root);
        let request = VerificationRequest {
            attempted_feature_id: feature_id.clone(),
            proposed_catalog,
            evidence_present: agent.evidence_present(),
            session_number,
        };
        let result = verification
            .verify(&registry, &baseline, &request)
            .await
            .map_err(EngineError::Verification)?;

        let _ = decision_log.log(
            Severity::Critical,
            "verify.verdict",
            &self.session_id,
            format!("verdict={} feature={:?}", result.verdict, result.feature_id),
        );

        // --- Committing / Rollback / Revert ---------------------------
        let (final_state, exit_code, terminal_status, next_prompt_kind) = match result.verdict {
            Verdict::Accept => {
                let claimed = result.feature_id.clone().unwrap_or_else(|| feature_id.clone());
                let mut baseline_store = BaselineStore::load(&self.paths.baseline_path)
                    .map_err(EngineError::Baseline)?;
                baseline_store.replace_with(session_number, result.tests_passed.clone());
                baseline_store.save().map_err(EngineError::Baseline)?;

                registry
                    .commit_pass(&claimed, request_proposed_catalog_for_commit(&self.paths.catalog_path)?)
                    .map_err(|e| EngineError::Registry(e.into()))?;

                let commit_hash = self
                    .git
                    .create_checkpoint(&claimed, "verified feature complete")
                    .unwrap_or_default();
                let _ = decision_log.log(
                    Severity::Critical,
                    "commit.accepted",
                    &self.session_id,
                    format!("feature '{claimed}' committed at {commit_hash}"),
                );

                session_state.consecutive_completions += 1;
                session_state.stuck_counters.remove(&claimed);

                let next_kind = if session_state.consecutive_completions >= self.config.cleanup_interval {
                    session_state.consecutive_completions = 0;
                    PromptKind::Cleanup
                } else {
                    PromptKind::Coding
                };

                (
                    OrchestratorState::Idle,
                    ExitCode::Success,
                    TerminalStatus::Complete,
                    next_kind,
                )
            }
            Verdict::Regression => {
                checkpoints
                    .rollback(
                        &checkpoint.manifest.id,
                        &self.paths.catalog_path,
                        &self.paths.narrative_path,
                        &self.paths.session_state_path,
                        &self.paths.baseline_path,
                    )
                    .map_err(EngineError::Checkpoint)?;
                let _ = decision_log.log(
                    Severity::Critical,
                    "verify.regression_rollback",
                    &self.session_id,
                    format!(
                        "rolled back to checkpoint {} after regressions: {:?}",
                        checkpoint.manifest.id, result.baseline_diff.regressions
                    ),
                );
                (
                    OrchestratorState::RolledBack,
                    ExitCode::RegressionRollback,
                    TerminalStatus::Failed,
                    PromptKind::Continuation,
                )
            }
            Verdict::RejectClaim => {
                let stuck = registry
                    .increment_stuck(&feature_id)
                    .map_err(EngineError::Harness)?;
                session_state.stuck_counters.insert(feature_id.clone(), stuck);
                let _ = decision_log.log(
                    Severity::Important,
                    "verify.reject_claim",
                    &self.session_id,
                    format!("feature '{feature_id}' test failed re-run; stuck={stuck}"),
                );
                (
                    OrchestratorState::Idle,
                    ExitCode::VerificationRejection,
                    TerminalStatus::Failed,
                    PromptKind::Continuation,
                )
            }
            Verdict::MultipleClaims | Verdict::ProtocolViolation => {
                let _ = decision_log.log(
                    Severity::Important,
                    "verify.protocol_rejected",
                    &self.session_id,
                    format!("catalog diff rejected: {}", result.verdict),
                );
                (
                    OrchestratorState::Idle,
                    ExitCode::VerificationRejection,
                    TerminalStatus::Failed,
                    PromptKind::Continuation,
                )
            }
            Verdict::NoOp => {
                let stuck = registry
                    .increment_stuck(&feature_id)
                    .map_err(EngineError::Harness)?;
                session_state.stuck_counters.insert(feature_id.clone(), stuck);
                let status = match termination {
                    Some(TerminationReason::ContextExhausted) => TerminalStatus::ContextExhausted,
                    Some(TerminationReason::WallClockExhausted) => TerminalStatus::TimedOut,
                    _ => TerminalStatus::Partial,
                };
                let _ = decision_log.log(
                    Severity::Important,
                    "verify.no_op",
                    &self.session_id,
                    "agent made no catalog claim this session",
                );
                (
                    OrchestratorState::Idle,
                    ExitCode::Success,
                    status,
                    PromptKind::Continuation,
                )
            }
        };

        session_state.last_session_number = session_number;
        session_state.last_status = terminal_status;
        session_state.next_prompt_kind = next_prompt_kind;
        session_state.last_feature_attempted = Some(feature_id.clone());
        session_state.last_tokens_used = last_snapshot.cumulative_tokens;
        session_state.last_wall_clock_secs = last_snapshot.elapsed.as_secs();
        session_state.save(&self.paths.session_state_path)?;

        let _ = checkpoints.prune(&registry.passing().iter().map(|f| f.id.clone()).collect::<Vec<_>>());

        Ok(RunOutcome {
            final_state,
            exit_code,
            verdict: Some(result.verdict),
            feature_id: Some(feature_id),
            next_prompt_kind,
        })
    }

    fn clone_git(&self) -> GitManager {
        GitManager::new(&self.paths.project_root, "[harness]")
    }
}

/// Re-reads the on-disk catalog for the exact `Vec<FeatureSpec>` shape
/// `FeatureRegistry::commit_pass` expects to diff against, since the
/// agent writes straight to the catalog file during `Running` and the
/// orchestrator's in-memory `registry` still reflects the pre-session
/// state.
fn request_proposed_catalog_for_commit(catalog_path: &Path) -> EngineResult<Vec<FeatureSpec>> {
    Ok(FeatureRegistry::load_with_recovery(catalog_path)
        .map_err(EngineError::Harness)?
        .features()
        .to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::monitor::ActivitySnapshot;
    use crate::harness::types::{FeatureCategory, VerificationKind};
    use std::process::Command;
    use tempfile::tempdir;

    struct StubAgent {
        steps: Vec<ActivitySnapshot>,
        evidence: bool,
    }

    impl AgentDriver for StubAgent {
        fn step(&mut self) -> Option<ActivitySnapshot> {
            self.steps.pop()
        }
        fn evidence_present(&self) -> bool {
            self.evidence
        }
        fn inject_message(&mut self, _message: &str) {}
        fn terminate(&mut self, _reason: TerminationReason) {}
    }

    fn setup_project() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        let run = |args: &[&str]| {
            Command::new("git")
                .args(args)
                .current_dir(dir.path())
                .output()
                .unwrap();
        };
        run(&["init"]);
        run(&["config", "user.email", "test@test.com"]);
        run(&["config", "user.name", "Test"]);

        let feature = FeatureSpec::new("feat-1", FeatureCategory::Functional, "first feature")
            .with_step("implement")
            .with_verification_kind(VerificationKind::Manual);
        std::fs::write(
            dir.path().join("features.json"),
            serde_json::to_string_pretty(&vec![feature]).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("progress.txt"), "").unwrap();

        run(&["add", "-A"]);
        run(&["commit", "-m", "initial"]);
        dir
    }

    fn paths(dir: &Path) -> EnginePaths {
        EnginePaths {
            project_root: dir.to_path_buf(),
            catalog_path: dir.join("features.json"),
            narrative_path: dir.join("progress.txt"),
            session_state_path: dir.join("session_state.json"),
            baseline_path: dir.join("baseline.json"),
            checkpoints_dir: dir.join(".checkpoints"),
            decision_log_path: dir.join("decisions.jsonl"),
        }
    }

    #[tokio::test]
    async fn all_done_when_no_features_remain() {
        let project = setup_project();
        // Mark the only feature complete up front.
        let mut registry =
            FeatureRegistry::load(project.path().join("features.json")).unwrap();
        registry.mark_passing("feat-1").unwrap();
        registry.save().unwrap();
        Command::new("git")
            .args(["commit", "-am", "complete"])
            .current_dir(project.path())
            .output()
            .unwrap();

        let git = GitManager::new(project.path(), "[harness]");
        let mut orchestrator =
            SessionOrchestrator::new(paths(project.path()), EngineConfig::default(), git);
        let mut agent = StubAgent {
            steps: vec![],
            evidence: true,
        };

        let outcome = orchestrator.run(&mut agent).await.unwrap();
        assert_eq!(outcome.exit_code, ExitCode::Success);
        assert_eq!(outcome.final_state, OrchestratorState::Idle);
        assert!(outcome.feature_id.is_none());
    }

    #[tokio::test]
    async fn escalates_when_stuck_counter_at_limit() {
        let project = setup_project();
        let mut registry =
            FeatureRegistry::load(project.path().join("features.json")).unwrap();
        registry.find_mut("feat-1").unwrap().stuck_counter = 3;
        registry.save().unwrap();
        Command::new("git")
            .args(["commit", "-am", "stuck"])
            .current_dir(project.path())
            .output()
            .unwrap();

        let git = GitManager::new(project.path(), "[harness]");
        let mut orchestrator =
            SessionOrchestrator::new(paths(project.path()), EngineConfig::default(), git);
        let mut agent = StubAgent {
            steps: vec![],
            evidence: true,
        };

        let outcome = orchestrator.run(&mut agent).await.unwrap();
        assert_eq!(outcome.exit_code, ExitCode::Escalation);
        assert_eq!(outcome.final_state, OrchestratorState::Escalated);
    }

    #[test]
    fn project_lock_rejects_concurrent_acquire_and_releases_on_drop() {
        let dir = tempdir().unwrap();
        let first = ProjectLock::acquire(dir.path()).unwrap();
        assert!(matches!(
            ProjectLock::acquire(dir.path()),
            Err(EngineError::AlreadyRunning)
        ));
        drop(first);
        assert!(ProjectLock::acquire(dir.path()).is_ok());
    }
}
