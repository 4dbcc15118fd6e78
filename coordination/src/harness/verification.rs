//! Verification Engine (C7)
//!
//! The core's seat of authority. Given a feature id the agent claims
//! complete and the on-disk state the agent left behind, this engine
//! produces a verdict independent of the agent's self-report — it never
//! trusts a free-text claim, only what it can re-derive from the catalog
//! diff and from test execution it runs itself.
//!
//! Ordered decision procedure (§4.7): catalog-diff validation, an
//! evidence check that informs escalation but never blocks, the feature's
//! own test re-run, a full-suite regression scan against the baseline, a
//! lint pass that warns without rejecting, and — only if every prior step
//! held — commit.

use crate::harness::baseline::{BaselineDiff, BaselineStore};
use crate::harness::engine_error::VerificationError;
use crate::harness::feature_registry::{FeatureRegistry, ProtocolError};
use crate::harness::git_manager::GitManager;
use crate::harness::types::FeatureSpec;
use crate::verifier::pipeline::{Verifier, VerifierConfig};
use std::path::PathBuf;

/// The Verification Engine's categorical judgment on a session's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Everything checked out: commit the catalog, create a VCS commit,
    /// and roll the baseline forward.
    Accept,
    /// The claimed feature's re-run test did not pass. Catalog change is
    /// reverted in place; the session's file edits are left untouched.
    RejectClaim,
    /// A baseline test newly fails. Full rollback to the pre-feature
    /// checkpoint is required.
    Regression,
    /// The proposed catalog claimed more than one feature complete in a
    /// single session.
    MultipleClaims,
    /// The proposed catalog differs from the current one in a way other
    /// than a single false->true `passes` flip.
    ProtocolViolation,
    /// The agent made no catalog claim at all this session (e.g. it
    /// quiesced or was force-terminated before writing anything).
    NoOp,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::RejectClaim => "reject_claim",
            Self::Regression => "regression",
            Self::MultipleClaims => "multiple_claims",
            Self::ProtocolViolation => "protocol_violation",
            Self::NoOp => "no_op",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The full, independently-derived outcome of one verification pass.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    /// The feature id the proposed catalog diff claims complete, if the
    /// diff was well-formed enough to name one.
    pub feature_id: Option<String>,
    pub verdict: Verdict,
    /// Test ids observed passing when the feature's own test was re-run.
    pub feature_test_passed: bool,
    /// Whether the agent's transcript showed it ran the test itself.
    /// Absence is not fatal — it's recorded as a quality signal only.
    pub evidence_present: bool,
    /// Test ids in the full-suite run.
    pub tests_passed: Vec<String>,
    pub tests_failed: Vec<String>,
    /// Baseline tests that regressed, per [`BaselineDiff`].
    pub baseline_diff: BaselineDiff,
    /// Lint findings observed (non-zero does not alone reject).
    pub lint_warning_count: usize,
}

impl VerificationResult {
    pub fn is_acceptable(&self) -> bool {
        self.verdict == Verdict::Accept
    }
}

/// Inputs the orchestrator hands to the Verification Engine for one pass.
pub struct VerificationRequest {
    /// The feature the orchestrator launched the agent to attempt.
    pub attempted_feature_id: String,
    /// The catalog as the agent left it on disk, already parsed.
    pub proposed_catalog: Vec<FeatureSpec>,
    /// Did the agent's structured transcript show it ran the feature test?
    pub evidence_present: bool,
    pub session_number: u32,
}

/// The Verification Engine.
pub struct VerificationEngine {
    project_root: PathBuf,
    gate_timeout_secs: u64,
}

impl VerificationEngine {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            gate_timeout_secs: 300,
        }
    }

    pub fn with_gate_timeout_secs(mut self, secs: u64) -> Self {
        self.gate_timeout_secs = secs;
        self
    }

    /// Run the full ordered decision procedure. Does not itself commit,
    /// rollback, or mutate the registry/baseline — it reports a verdict
    /// and the orchestrator acts on it, so that rollback/commit stay owned
    /// by the Checkpoint Manager and Feature Registry respectively.
    pub async fn verify(
        &self,
        registry: &FeatureRegistry,
        baseline: &BaselineStore,
        request: &VerificationRequest,
    ) -> Result<VerificationResult, VerificationError> {
        // Step 1: catalog-diff validation.
        let claimed = match registry.validate_diff(&request.proposed_catalog) {
            Ok(id) => id,
            Err(ProtocolError::NoOp) => {
                return Ok(VerificationResult {
                    feature_id: None,
                    verdict: Verdict::NoOp,
                    feature_test_passed: false,
                    evidence_present: request.evidence_present,
                    tests_passed: Vec::new(),
                    tests_failed: Vec::new(),
                    baseline_diff: BaselineDiff::default(),
                    lint_warning_count: 0,
                })
            }
            Err(ProtocolError::MultipleClaims(_)) => {
                return Ok(VerificationResult {
                    feature_id: None,
                    verdict: Verdict::MultipleClaims,
                    feature_test_passed: false,
                    evidence_present: request.evidence_present,
                    tests_passed: Vec::new(),
                    tests_failed: Vec::new(),
                    baseline_diff: BaselineDiff::default(),
                    lint_warning_count: 0,
                })
            }
            Err(ProtocolError::ProtocolViolation(_) | ProtocolError::SchemaError(_)) => {
                return Ok(VerificationResult {
                    feature_id: None,
                    verdict: Verdict::ProtocolViolation,
                    feature_test_passed: false,
                    evidence_present: request.evidence_present,
                    tests_passed: Vec::new(),
                    tests_failed: Vec::new(),
                    baseline_diff: BaselineDiff::default(),
                    lint_warning_count: 0,
                })
            }
        };

        // Step 2: evidence check — a quality signal only, never fatal.
        if !request.evidence_present {
            tracing::warn!(
                feature_id = %claimed,
                "agent transcript shows no evidence it ran the feature test itself"
            );
        }

        let feature = registry
            .find(&claimed)
            .ok_or_else(|| VerificationError::Harness(
                crate::harness::error::HarnessError::feature_not_found(&claimed),
            ))?;

        // Step 3: feature test re-run, in a fresh invocation.
        let feature_test_passed = if feature.verification_kind
            == crate::harness::types::VerificationKind::Manual
        {
            // Manual features skip the automated test but still go through
            // the remaining gates.
            true
        } else {
            self.run_feature_test(feature).await?
        };

        if !feature_test_passed {
            return Ok(VerificationResult {
                feature_id: Some(claimed),
                verdict: Verdict::RejectClaim,
                feature_test_passed: false,
                evidence_present: request.evidence_present,
                tests_passed: Vec::new(),
                tests_failed: Vec::new(),
                baseline_diff: BaselineDiff::default(),
                lint_warning_count: 0,
            });
        }

        // Step 4: regression scan against the baseline.
        let suite = self.run_full_suite().await?;
        let diff = baseline.diff_against(suite.test_ids_passed.iter().cloned());

        if diff.has_regressions() {
            return Ok(VerificationResult {
                feature_id: Some(claimed),
                verdict: Verdict::Regression,
                feature_test_passed: true,
                evidence_present: request.evidence_present,
                tests_passed: suite.test_ids_passed,
                tests_failed: suite.test_ids_failed,
                baseline_diff: diff,
                lint_warning_count: 0,
            });
        }

        // Step 5: quality scan. Non-zero findings warn but don't reject.
        let lint_warning_count = self.run_lint_scan().await?;

        // Step 6: accept. Committing is the orchestrator's job (it owns
        // the checkpoint/baseline/registry writes); we only report that
        // every gate held.
        Ok(VerificationResult {
            feature_id: Some(claimed),
            verdict: Verdict::Accept,
            feature_test_passed: true,
            evidence_present: request.evidence_present,
            tests_passed: suite.test_ids_passed,
            tests_failed: suite.test_ids_failed,
            baseline_diff: diff,
            lint_warning_count,
        })
    }

    async fn run_feature_test(&self, feature: &FeatureSpec) -> Result<bool, VerificationError> {
        let test_ref = feature.test_ref.clone().ok_or_else(|| {
            VerificationError::Harness(crate::harness::error::HarnessError::invalid_registry(
                format!("feature '{}' has no test_ref to re-run", feature.id),
            ))
        })?;

        let config = VerifierConfig {
            check_test: true,
            extra_cargo_args: vec![test_ref],
            gate_timeout_secs: self.gate_timeout_secs,
            ..VerifierConfig::none()
        };
        let verifier = Verifier::new(&self.project_root, config);
        let report = verifier.run_pipeline().await;
        Ok(report.all_green)
    }

    async fn run_full_suite(&self) -> Result<crate::verifier::report::VerifierReport, VerificationError> {
        let config = VerifierConfig {
            check_test: true,
            gate_timeout_secs: self.gate_timeout_secs,
            ..VerifierConfig::none()
        };
        let verifier = Verifier::new(&self.project_root, config);
        Ok(verifier.run_pipeline().await)
    }

    async fn run_lint_scan(&self) -> Result<usize, VerificationError> {
        let config = VerifierConfig {
            check_clippy: true,
            gate_timeout_secs: self.gate_timeout_secs,
            ..VerifierConfig::none()
        };
        let verifier = Verifier::new(&self.project_root, config);
        let report = verifier.run_pipeline().await;
        Ok(report
            .gates
            .iter()
            .find(|g| g.gate == "clippy")
            .map(|g| g.warning_count + g.error_count)
            .unwrap_or(0))
    }
}

/// Resolve a [`Verdict`] into the local action the orchestrator takes,
/// independent of the checkpoint/registry plumbing itself — kept here so
/// the mapping from verdict to policy lives next to the verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalAction {
    CommitAndAdvanceBaseline,
    RevertCatalogBitOnly,
    RollbackToPreFeatureCheckpoint,
}

impl Verdict {
    pub fn local_action(&self) -> LocalAction {
        match self {
            Verdict::Accept => LocalAction::CommitAndAdvanceBaseline,
            Verdict::Regression => LocalAction::RollbackToPreFeatureCheckpoint,
            Verdict::RejectClaim
            | Verdict::MultipleClaims
            | Verdict::ProtocolViolation
            | Verdict::NoOp => LocalAction::RevertCatalogBitOnly,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_maps_to_commit() {
        assert_eq!(
            Verdict::Accept.local_action(),
            LocalAction::CommitAndAdvanceBaseline
        );
    }

    #[test]
    fn regression_maps_to_rollback() {
        assert_eq!(
            Verdict::Regression.local_action(),
            LocalAction::RollbackToPreFeatureCheckpoint
        );
    }

    #[test]
    fn reject_claim_reverts_bit_only_per_open_question_decision() {
        // Reverts only the catalog bit, leaving the agent's file edits in
        // place so the next session's continuation prompt can see the work done.
        assert_eq!(
            Verdict::RejectClaim.local_action(),
            LocalAction::RevertCatalogBitOnly
        );
    }

    #[test]
    fn multiple_claims_reverts_bit_only_no_feature_at_fault() {
        assert_eq!(
            Verdict::MultipleClaims.local_action(),
            LocalAction::RevertCatalogBitOnly
        );
    }

    #[test]
    fn verdict_display_matches_spec_vocabulary() {
        assert_eq!(Verdict::Accept.to_string(), "accept");
        assert_eq!(Verdict::RejectClaim.to_string(), "reject_claim");
        assert_eq!(Verdict::Regression.to_string(), "regression");
        assert_eq!(Verdict::MultipleClaims.to_string(), "multiple_claims");
        assert_eq!(Verdict::NoOp.to_string(), "no_op");
    }
}
