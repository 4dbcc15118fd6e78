//! Checkpoint Manager (C4)
//!
//! Captures a known-good snapshot before any risky transition: a VCS ref,
//! content hashes of the catalog and progress narrative, and copies of the
//! session-state and baseline artifacts. Restoring a checkpoint resets the
//! VCS to the recorded ref, copies the state files back, and verifies
//! post-restore hashes byte-for-byte — a mismatch is fatal and requires
//! human intervention.

use crate::harness::engine_error::CheckpointError;
use crate::harness::git_manager::GitManager;
use crate::harness::hasher::{self, Digest};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SCHEMA_VERSION: u32 = 1;

/// Why a checkpoint was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointReason {
    PreFeature,
    PreVerification,
    Manual,
}

/// Checkpoint directory manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub schema_version: u32,
    pub id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub session_number: u32,
    pub vcs_ref: String,
    pub reason: CheckpointReason,
    pub feature_id: Option<String>,
    pub catalog_hash: String,
    pub narrative_hash: String,
}

/// A taken checkpoint, as returned to the caller.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub manifest: CheckpointManifest,
    pub dir: PathBuf,
}

/// Paths of the artifacts a checkpoint snapshots, relative to the project's
/// state directory.
pub struct CheckpointInputs<'a> {
    pub catalog_path: &'a Path,
    pub narrative_path: &'a Path,
    pub session_state_path: &'a Path,
    pub baseline_path: &'a Path,
}

/// The Checkpoint Manager.
pub struct CheckpointManager {
    checkpoints_dir: PathBuf,
    git: GitManager,
    /// Keep the N most recent checkpoints per feature, plus the last
    /// checkpoint of each successfully completed feature.
    retain_per_feature: usize,
    /// Prune checkpoints older than this many days.
    retain_max_age_days: i64,
}

impl CheckpointManager {
    pub fn new(checkpoints_dir: impl AsRef<Path>, git: GitManager) -> Self {
        Self {
            checkpoints_dir: checkpoints_dir.as_ref().to_path_buf(),
            git,
            retain_per_feature: 3,
            retain_max_age_days: 30,
        }
    }

    pub fn with_retention(mut self, per_feature: usize, max_age_days: i64) -> Self {
        self.retain_per_feature = per_feature;
        self.retain_max_age_days = max_age_days;
        self
    }

    /// Capture the current state as a new checkpoint.
    pub fn create(
        &self,
        session_number: u32,
        reason: CheckpointReason,
        feature_id: Option<&str>,
        inputs: CheckpointInputs<'_>,
    ) -> Result<Checkpoint, CheckpointError> {
        let id = uuid::Uuid::new_v4().to_string();
        let dir = self.checkpoints_dir.join(&id);
        std::fs::create_dir_all(&dir).map_err(|e| CheckpointError::Vcs(e.to_string()))?;

        let vcs_ref = self
            .git
            .current_commit_full()
            .map_err(|e| CheckpointError::Vcs(e.to_string()))?;

        let catalog_hash = hasher::hash_file(inputs.catalog_path)
            .map_err(CheckpointError::from)?
            .to_hex();
        let narrative_hash = if inputs.narrative_path.exists() {
            hasher::hash_file(inputs.narrative_path)
                .map_err(CheckpointError::from)?
                .to_hex()
        } else {
            hasher::hash_bytes(b"").to_hex()
        };

        for (src, name) in [
            (inputs.session_state_path, "session_state.json"),
            (inputs.baseline_path, "baseline.json"),
        ] {
            if src.exists() {
                hasher::copy_atomic(src, dir.join(name)).map_err(CheckpointError::from)?;
            }
        }

        let manifest = CheckpointManifest {
            schema_version: SCHEMA_VERSION,
            id: id.clone(),
            timestamp: chrono::Utc::now(),
            session_number,
            vcs_ref,
            reason,
            feature_id: feature_id.map(str::to_string),
            catalog_hash,
            narrative_hash,
        };

        let manifest_json =
            serde_json::to_string_pretty(&manifest).map_err(|e| CheckpointError::Vcs(e.to_string()))?;
        hasher::write_str(dir.join("manifest.json"), &manifest_json).map_err(CheckpointError::from)?;

        Ok(Checkpoint { manifest, dir })
    }

    /// Load a checkpoint's manifest by id.
    pub fn load(&self, checkpoint_id: &str) -> Result<Checkpoint, CheckpointError> {
        let dir = self.checkpoints_dir.join(checkpoint_id);
        let manifest_path = dir.join("manifest.json");
        if !manifest_path.exists() {
            return Err(CheckpointError::NotFound(checkpoint_id.to_string()));
        }
        let content = hasher::read_to_string(&manifest_path).map_err(CheckpointError::from)?;
        let manifest: CheckpointManifest = serde_json::from_str(&content)
            .map_err(|e| CheckpointError::Vcs(format!("corrupt manifest: {e}")))?;
        Ok(Checkpoint { manifest, dir })
    }

    /// Restore the project to a checkpoint: resets the VCS ref, copies back
    /// session-state and baseline, and verifies post-restore hashes match
    /// the manifest exactly. A hash mismatch is fatal.
    pub fn rollback(
        &self,
        checkpoint_id: &str,
        catalog_path: &Path,
        narrative_path: &Path,
        session_state_path: &Path,
        baseline_path: &Path,
    ) -> Result<(), CheckpointError> {
        let checkpoint = self.load(checkpoint_id)?;

        self.git
            .hard_rollback(&checkpoint.manifest.vcs_ref)
            .map_err(|e| CheckpointError::Vcs(e.to_string()))?;

        for (dest, name) in [
            (session_state_path, "session_state.json"),
            (baseline_path, "baseline.json"),
        ] {
            let src = checkpoint.dir.join(name);
            if src.exists() {
                hasher::copy_atomic(&src, dest).map_err(CheckpointError::from)?;
            }
        }

        let post_ref = self
            .git
            .current_commit_full()
            .map_err(|e| CheckpointError::Vcs(e.to_string()))?;
        if post_ref != checkpoint.manifest.vcs_ref {
            return Err(CheckpointError::HashMismatch {
                artifact: "vcs_ref".to_string(),
                expected: checkpoint.manifest.vcs_ref.clone(),
                actual: post_ref,
            });
        }

        let post_catalog_hash = hasher::hash_file(catalog_path)
            .map_err(CheckpointError::from)?
            .to_hex();
        if post_catalog_hash != checkpoint.manifest.catalog_hash {
            return Err(CheckpointError::HashMismatch {
                artifact: "catalog".to_string(),
                expected: checkpoint.manifest.catalog_hash.clone(),
                actual: post_catalog_hash,
            });
        }

        let post_narrative_hash = if narrative_path.exists() {
            hasher::hash_file(narrative_path)
                .map_err(CheckpointError::from)?
                .to_hex()
        } else {
            hasher::hash_bytes(b"").to_hex()
        };
        if post_narrative_hash != checkpoint.manifest.narrative_hash {
            return Err(CheckpointError::HashMismatch {
                artifact: "narrative".to_string(),
                expected: checkpoint.manifest.narrative_hash.clone(),
                actual: post_narrative_hash,
            });
        }

        Ok(())
    }

    /// List every checkpoint directory, most recent first.
    pub fn list(&self) -> Result<Vec<Checkpoint>, CheckpointError> {
        if !self.checkpoints_dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.checkpoints_dir)
            .map_err(|e| CheckpointError::Vcs(e.to_string()))?
        {
            let entry = entry.map_err(|e| CheckpointError::Vcs(e.to_string()))?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Ok(cp) = self.load(&entry.file_name().to_string_lossy()) {
                out.push(cp);
            }
        }
        out.sort_by(|a, b| b.manifest.timestamp.cmp(&a.manifest.timestamp));
        Ok(out)
    }

    /// Prune checkpoints beyond the retention policy: keep the N most
    /// recent per feature, always keep the last checkpoint of a feature
    /// that has since become passing, and drop anything older than the
    /// configured age horizon.
    pub fn prune(&self, passing_feature_ids: &[String]) -> Result<usize, CheckpointError> {
        let all = self.list()?;
        let cutoff = chrono::Utc::now() - chrono::Duration::days(self.retain_max_age_days);

        let mut by_feature: std::collections::HashMap<String, Vec<&Checkpoint>> =
            std::collections::HashMap::new();
        for cp in &all {
            let key = cp.manifest.feature_id.clone().unwrap_or_default();
            by_feature.entry(key).or_default().push(cp);
        }

        let mut keep_ids: std::collections::HashSet<String> = std::collections::HashSet::new();
        for (feature_id, mut cps) in by_feature {
            cps.sort_by(|a, b| b.manifest.timestamp.cmp(&a.manifest.timestamp));
            for cp in cps.iter().take(self.retain_per_feature) {
                keep_ids.insert(cp.manifest.id.clone());
            }
            if passing_feature_ids.contains(&feature_id) {
                if let Some(latest) = cps.first() {
                    keep_ids.insert(latest.manifest.id.clone());
                }
            }
        }

        let mut pruned = 0;
        for cp in &all {
            let too_old = cp.manifest.timestamp < cutoff;
            let keep = keep_ids.contains(&cp.manifest.id);
            if too_old && !keep {
                let _ = std::fs::remove_dir_all(&cp.dir);
                pruned += 1;
            }
        }
        Ok(pruned)
    }
}

/// Hash a path given in [`CheckpointInputs`], exposed for callers that need
/// to compare the current on-disk state to a checkpoint's recorded hash
/// without going through a full rollback.
pub fn hash_of(path: &Path) -> Result<Digest, CheckpointError> {
    hasher::hash_file(path).map_err(CheckpointError::from)
}
