//! Preflight Runner (C5)
//!
//! Gate before any agent launch. Runs the ordered checks from the design:
//! working directory sanity, required artifacts present, VCS clean and
//! attached, environment init hook (with bounded reset-and-retry), a
//! health probe, the baseline suite running green, and a budget check.
//! Any failure short-circuits — the orchestrator refuses to launch.

use crate::harness::engine_error::PreflightError;
use crate::harness::git_manager::GitManager;
use crate::verifier::pipeline::run_with_timeout;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// One ordered preflight check's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub reason: Option<String>,
}

/// The full result of a preflight run.
#[derive(Debug, Clone, Default)]
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
}

impl PreflightReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn first_failure(&self) -> Option<&CheckResult> {
        self.checks.iter().find(|c| !c.passed)
    }
}

/// Configuration the Preflight Runner needs from the engine config.
#[derive(Debug, Clone)]
pub struct PreflightConfig {
    pub project_root: PathBuf,
    pub required_artifacts: Vec<PathBuf>,
    pub init_hook: Option<PathBuf>,
    pub reset_hook: Option<PathBuf>,
    pub max_reset_attempts: u32,
    pub health_probe: Option<PathBuf>,
    pub gate_timeout: Duration,
    /// Projected cost of the upcoming session; `None` skips the budget gate.
    pub projected_cost: Option<f64>,
    pub remaining_budget: Option<f64>,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            required_artifacts: Vec::new(),
            init_hook: None,
            reset_hook: None,
            max_reset_attempts: 2,
            health_probe: None,
            gate_timeout: Duration::from_secs(120),
            projected_cost: None,
            remaining_budget: None,
        }
    }
}

pub struct PreflightRunner<'a> {
    config: PreflightConfig,
    git: &'a GitManager,
}

impl<'a> PreflightRunner<'a> {
    pub fn new(config: PreflightConfig, git: &'a GitManager) -> Self {
        Self { config, git }
    }

    /// Run every check in order, short-circuiting on the first failure.
    pub async fn run(&self, baseline_passing_ids: &[String]) -> PreflightReport {
        let mut report = PreflightReport::default();

        let c1 = self.check_working_directory();
        let c1_passed = c1.passed;
        report.checks.push(c1);
        if !c1_passed {
            return report;
        }

        let c2 = self.check_required_artifacts();
        let c2_passed = c2.passed;
        report.checks.push(c2);
        if !c2_passed {
            return report;
        }

        let c3 = self.check_vcs_clean();
        let c3_passed = c3.passed;
        report.checks.push(c3);
        if !c3_passed {
            return report;
        }

        let c4 = self.check_init_hook().await;
        let c4_passed = c4.passed;
        report.checks.push(c4);
        if !c4_passed {
            return report;
        }

        let c5 = self.check_health_probe().await;
        let c5_passed = c5.passed;
        report.checks.push(c5);
        if !c5_passed {
            return report;
        }

        let c6 = self.check_baseline_green(baseline_passing_ids).await;
        let c6_passed = c6.passed;
        report.checks.push(c6);
        if !c6_passed {
            return report;
        }

        let c7 = self.check_budget();
        report.checks.push(c7);

        report
    }

    fn check_working_directory(&self) -> CheckResult {
        let exists = self.config.project_root.is_dir();
        let is_project_root = exists
            && (self.config.project_root.join(".git").exists()
                || self.config.project_root.join("Cargo.toml").exists());
        CheckResult {
            name: "working_directory",
            passed: exists && is_project_root,
            reason: if !exists {
                Some(format!(
                    "{} does not exist",
                    self.config.project_root.display()
                ))
            } else if !is_project_root {
                Some("directory is not the project root".to_string())
            } else {
                None
            },
        }
    }

    fn check_required_artifacts(&self) -> CheckResult {
        let missing: Vec<String> = self
            .config
            .required_artifacts
            .iter()
            .filter(|p| !p.exists())
            .map(|p| p.display().to_string())
            .collect();
        CheckResult {
            name: "required_artifacts",
            passed: missing.is_empty(),
            reason: (!missing.is_empty()).then(|| format!("missing: {}", missing.join(", "))),
        }
    }

    fn check_vcs_clean(&self) -> CheckResult {
        match self.git.current_branch() {
            Ok(branch) => {
                let detached = branch.trim().is_empty() || branch == "HEAD";
                CheckResult {
                    name: "vcs_clean",
                    passed: !detached,
                    reason: detached.then(|| "repository is in detached HEAD state".to_string()),
                }
            }
            Err(e) => CheckResult {
                name: "vcs_clean",
                passed: false,
                reason: Some(e.to_string()),
            },
        }
    }

    async fn check_init_hook(&self) -> CheckResult {
        let Some(hook) = &self.config.init_hook else {
            return CheckResult {
                name: "init_hook",
                passed: true,
                reason: None,
            };
        };

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match run_hook(hook, &self.config.project_root, self.config.gate_timeout).await {
                Ok(true) => {
                    return CheckResult {
                        name: "init_hook",
                        passed: true,
                        reason: None,
                    }
                }
                _ if attempts > self.config.max_reset_attempts => {
                    return CheckResult {
                        name: "init_hook",
                        passed: false,
                        reason: Some(format!(
                            "init hook failed after {} attempt(s)",
                            attempts
                        )),
                    }
                }
                _ => {
                    if let Some(reset) = &self.config.reset_hook {
                        warn!(attempt = attempts, "init hook failed, invoking reset hook");
                        let _ =
                            run_hook(reset, &self.config.project_root, self.config.gate_timeout)
                                .await;
                    }
                }
            }
        }
    }

    async fn check_health_probe(&self) -> CheckResult {
        let Some(probe) = &self.config.health_probe else {
            return CheckResult {
                name: "health_probe",
                passed: true,
                reason: None,
            };
        };
        match run_hook(probe, &self.config.project_root, self.config.gate_timeout).await {
            Ok(true) => CheckResult {
                name: "health_probe",
                passed: true,
                reason: None,
            },
            _ => CheckResult {
                name: "health_probe",
                passed: false,
                reason: Some("health probe did not succeed".to_string()),
            },
        }
    }

    async fn check_baseline_green(&self, baseline_passing_ids: &[String]) -> CheckResult {
        if baseline_passing_ids.is_empty() {
            return CheckResult {
                name: "baseline_green",
                passed: true,
                reason: None,
            };
        }

        use crate::verifier::pipeline::{Verifier, VerifierConfig};
        // Needs the `cargo test` gate to populate `test_ids_passed` — fmt
        // and clippy add nothing to a baseline-green check, so they're
        // left off for speed.
        let baseline_gate_config = VerifierConfig {
            check_fmt: false,
            check_clippy: false,
            check_compile: true,
            check_test: true,
            ..VerifierConfig::default()
        };
        let verifier = Verifier::new(&self.config.project_root, baseline_gate_config);
        let report = verifier.run_pipeline().await;
        let current_ids: std::collections::HashSet<String> =
            report.test_ids_passed.iter().cloned().collect();
        let failing: Vec<String> = baseline_passing_ids
            .iter()
            .filter(|id| !current_ids.contains(*id))
            .cloned()
            .collect();

        CheckResult {
            name: "baseline_green",
            passed: failing.is_empty(),
            reason: (!failing.is_empty())
                .then(|| format!("latent regression in: {}", failing.join(", "))),
        }
    }

    fn check_budget(&self) -> CheckResult {
        match (self.config.projected_cost, self.config.remaining_budget) {
            (Some(projected), Some(remaining)) => CheckResult {
                name: "budget",
                passed: projected <= remaining,
                reason: (projected > remaining).then(|| {
                    format!("projected cost {projected} exceeds remaining budget {remaining}")
                }),
            },
            _ => CheckResult {
                name: "budget",
                passed: true,
                reason: None,
            },
        }
    }
}

async fn run_hook(hook: &Path, cwd: &Path, timeout: Duration) -> Result<bool, PreflightError> {
    let mut cmd = tokio::process::Command::new(hook);
    let output = run_with_timeout(&mut cmd, cwd, timeout)
        .await
        .map_err(|e| PreflightError::InitFailed {
            attempts: 1,
            message: e.to_string(),
        })?;
    info!(hook = %hook.display(), status = ?output.status, "ran preflight hook");
    Ok(output.status.success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup_git_repo(dir: &Path) {
        let run = |args: &[&str]| {
            std::process::Command::new("git")
                .args(args)
                .current_dir(dir)
                .output()
                .unwrap();
        };
        run(&["init"]);
        run(&["config", "user.email", "test@test.com"]);
        run(&["config", "user.name", "Test"]);
        std::fs::write(dir.join("file.txt"), "x").unwrap();
        run(&["add", "-A"]);
        run(&["commit", "-m", "initial"]);
    }

    #[tokio::test]
    async fn working_directory_check_fails_on_missing_markers() {
        let dir = tempdir().unwrap();
        let git = GitManager::new(dir.path(), "checkpoint");
        let config = PreflightConfig {
            project_root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let runner = PreflightRunner::new(config, &git);
        let report = runner.run(&[]).await;
        assert!(!report.all_passed());
        assert_eq!(report.first_failure().unwrap().name, "working_directory");
    }

    #[tokio::test]
    async fn all_checks_pass_on_clean_repo_with_no_optional_hooks() {
        let dir = tempdir().unwrap();
        setup_git_repo(dir.path());
        let git = GitManager::new(dir.path(), "checkpoint");
        let config = PreflightConfig {
            project_root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let runner = PreflightRunner::new(config, &git);
        let report = runner.run(&[]).await;
        assert!(report.all_passed(), "{:?}", report.checks);
    }

    #[tokio::test]
    async fn missing_required_artifact_fails() {
        let dir = tempdir().unwrap();
        setup_git_repo(dir.path());
        let git = GitManager::new(dir.path(), "checkpoint");
        let config = PreflightConfig {
            project_root: dir.path().to_path_buf(),
            required_artifacts: vec![dir.path().join("features.json")],
            ..Default::default()
        };
        let runner = PreflightRunner::new(config, &git);
        let report = runner.run(&[]).await;
        assert!(!report.all_passed());
        assert_eq!(report.first_failure().unwrap().name, "required_artifacts");
    }

    #[test]
    fn budget_check_fails_when_projected_exceeds_remaining() {
        let dir = tempdir().unwrap();
        let git = GitManager::new(dir.path(), "checkpoint");
        let config = PreflightConfig {
            project_root: dir.path().to_path_buf(),
            projected_cost: Some(10.0),
            remaining_budget: Some(5.0),
            ..Default::default()
        };
        let runner = PreflightRunner::new(config, &git);
        let result = runner.check_budget();
        assert!(!result.passed);
    }
}
