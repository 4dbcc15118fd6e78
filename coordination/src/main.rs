//! `swarm-engine` — CLI entry point for the session orchestration and
//! verification engine.
//!
//! The CLI surface itself is an out-of-scope external collaborator per the
//! design: this binary is the thinnest possible wiring of the engine to a
//! project directory on disk, not a configuration or prompt-assembly layer.
//! It drives exactly one session per invocation and exits with the code
//! the orchestrator decided (see [`coordination::ExitCode`]).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coordination::{
    Baseline, EngineConfig, EnginePaths, FeatureCategory, GitManager, NullAgent,
    SessionOrchestrator, VerificationKind,
};

#[derive(Parser, Debug)]
#[command(name = "swarm-engine", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive exactly one session against a project directory: preflight,
    /// select a feature, snapshot, run the agent, verify, commit or
    /// roll back.
    Run {
        /// Project root directory.
        #[arg(long, default_value = ".")]
        project: PathBuf,
    },
    /// Bootstrap the persisted artifacts (empty catalog, narrative,
    /// session state, baseline) a fresh project needs before `run` can
    /// select a first feature.
    Init {
        /// Project root directory.
        #[arg(long, default_value = ".")]
        project: PathBuf,
    },
}

fn engine_paths(project: &std::path::Path) -> EnginePaths {
    EnginePaths {
        project_root: project.to_path_buf(),
        catalog_path: project.join("features.json"),
        narrative_path: project.join("progress.txt"),
        session_state_path: project.join("session_state.json"),
        baseline_path: project.join("baseline.json"),
        checkpoints_dir: project.join(".checkpoints"),
        decision_log_path: project.join("decisions.jsonl"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Init { project } => {
            std::fs::create_dir_all(&project)
                .with_context(|| format!("creating project root {}", project.display()))?;
            let paths = engine_paths(&project);

            if !paths.catalog_path.exists() {
                let seed: Vec<coordination::FeatureSpec> = Vec::new();
                std::fs::write(&paths.catalog_path, serde_json::to_string_pretty(&seed)?)
                    .context("writing empty feature catalog")?;
            }
            if !paths.narrative_path.exists() {
                std::fs::write(&paths.narrative_path, "")
                    .context("writing empty progress narrative")?;
            }
            if !paths.baseline_path.exists() {
                let baseline = coordination::Baseline {
                    schema_version: 1,
                    session_number: 0,
                    passing: Default::default(),
                    pre_existing_failures: Default::default(),
                };
                std::fs::write(&paths.baseline_path, serde_json::to_string_pretty(&baseline)?)
                    .context("writing empty baseline")?;
            }
            std::fs::create_dir_all(&paths.checkpoints_dir)
                .context("creating checkpoints directory")?;

            tracing::info!(project = %project.display(), "project initialized");
            println!("initialized {}", project.display());
            Ok(())
        }
        Command::Run { project } => {
            let paths = engine_paths(&project);
            let git = GitManager::new(&project, "[swarm-engine]");
            let mut orchestrator =
                SessionOrchestrator::new(paths, EngineConfig::default(), git);

            let mut agent = NullAgent::default();
            let outcome = orchestrator.run(&mut agent).await?;

            println!("{}", serde_json::to_string_pretty(&RunOutcomeView::from(&outcome))?);
            std::process::exit(outcome.exit_code.code());
        }
    }
}

/// Serializable view of [`coordination::RunOutcome`] for CLI output —
/// the orchestrator's own type intentionally carries no `Serialize` impl
/// since it is an in-process return value, not a persisted artifact.
#[derive(serde::Serialize)]
struct RunOutcomeView {
    final_state: String,
    exit_code: i32,
    verdict: Option<String>,
    feature_id: Option<String>,
    next_prompt_kind: String,
}

impl From<&coordination::RunOutcome> for RunOutcomeView {
    fn from(outcome: &coordination::RunOutcome) -> Self {
        Self {
            final_state: format!("{:?}", outcome.final_state),
            exit_code: outcome.exit_code.code(),
            verdict: outcome.verdict.map(|v| v.to_string()),
            feature_id: outcome.feature_id.clone(),
            next_prompt_kind: format!("{:?}", outcome.next_prompt_kind),
        }
    }
}

// Referenced only to keep `FeatureCategory`/`VerificationKind` reachable
// for operators hand-authoring a seed catalog; unused directly by `main`.
#[allow(dead_code)]
fn _seed_feature_example() -> coordination::FeatureSpec {
    coordination::FeatureSpec::new("example", FeatureCategory::Functional, "example feature")
        .with_verification_kind(VerificationKind::Automated)
}
