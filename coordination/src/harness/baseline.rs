//! Baseline Store (C3)
//!
//! Records the set of test identifiers known to pass at a moment in time,
//! and distinguishes three kinds of difference against a freshly observed
//! passing set: a *regression* (was passing, now missing), a *pre-existing
//! failure* (was already known-broken when the project was adopted — never
//! alarms), and a *recovery* (a pre-existing failure that now passes).

use crate::harness::engine_error::BaselineError;
use crate::harness::hasher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const SCHEMA_VERSION: u32 = 1;

/// Persisted baseline artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Baseline {
    pub schema_version: u32,
    /// The session number this baseline was taken at the end of.
    pub session_number: u32,
    /// Test identifiers observed passing.
    pub passing: BTreeSet<String>,
    /// Test identifiers known broken when the project was adopted;
    /// excluded from regression accounting.
    pub pre_existing_failures: BTreeSet<String>,
}

impl Baseline {
    pub fn empty() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            session_number: 0,
            passing: BTreeSet::new(),
            pre_existing_failures: BTreeSet::new(),
        }
    }

    /// Content address: a hash of the sorted passing-test-id set.
    pub fn content_hash(&self) -> hasher::Digest {
        hasher::hash_id_set(self.passing.iter())
    }
}

/// Outcome of diffing a freshly observed passing set against the baseline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaselineDiff {
    /// Baseline tests that are missing from the current passing set and
    /// are not pre-existing failures — true regressions.
    pub regressions: BTreeSet<String>,
    /// Pre-existing failures that now appear in the current passing set.
    pub recoveries: BTreeSet<String>,
}

impl BaselineDiff {
    pub fn has_regressions(&self) -> bool {
        !self.regressions.is_empty()
    }
}

/// The Baseline Store.
pub struct BaselineStore {
    path: PathBuf,
    baseline: Baseline,
}

impl BaselineStore {
    /// Load the baseline from `path`, or start from an empty baseline if
    /// the file does not exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BaselineError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Ok(Self {
                path,
                baseline: Baseline::empty(),
            });
        }
        let content = hasher::read_to_string(&path).map_err(BaselineError::from)?;
        let baseline: Baseline = serde_json::from_str(&content)
            .map_err(|e| BaselineError::Corrupted(e.to_string()))?;
        Ok(Self { path, baseline })
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    /// Persist the current baseline atomically.
    pub fn save(&self) -> Result<(), BaselineError> {
        let content = serde_json::to_string_pretty(&self.baseline)
            .map_err(|e| BaselineError::Corrupted(e.to_string()))?;
        hasher::write_str(&self.path, &content).map_err(BaselineError::from)?;
        Ok(())
    }

    /// Replace the recorded passing set wholesale (called only after a full
    /// successful session, per the Verification Engine's Commit step).
    pub fn replace_with<I, S>(&mut self, session_number: u32, test_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.baseline.session_number = session_number;
        self.baseline.passing = test_ids.into_iter().map(Into::into).collect();
    }

    /// Record test ids known broken at adoption time. Idempotent.
    pub fn set_pre_existing_failures<I, S>(&mut self, test_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.baseline.pre_existing_failures = test_ids.into_iter().map(Into::into).collect();
    }

    /// Diff a freshly observed passing set against the recorded baseline.
    pub fn diff_against<I, S>(&self, current_passing: I) -> BaselineDiff
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let current: BTreeSet<String> = current_passing.into_iter().map(Into::into).collect();

        let mut regressions = BTreeSet::new();
        let mut recoveries = BTreeSet::new();

        for test_id in &self.baseline.passing {
            if !current.contains(test_id) && !self.baseline.pre_existing_failures.contains(test_id)
            {
                regressions.insert(test_id.clone());
            }
        }

        for test_id in &self.baseline.pre_existing_failures {
            if current.contains(test_id) {
                recoveries.insert(test_id.clone());
            }
        }

        BaselineDiff {
            regressions,
            recoveries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_missing_file_yields_empty_baseline() {
        let dir = tempdir().unwrap();
        let store = BaselineStore::load(dir.path().join("baseline.json")).unwrap();
        assert!(store.baseline().passing.is_empty());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("baseline.json");
        let mut store = BaselineStore::load(&path).unwrap();
        store.replace_with(3, ["test_a", "test_b"]);
        store.save().unwrap();

        let reloaded = BaselineStore::load(&path).unwrap();
        assert_eq!(reloaded.baseline().session_number, 3);
        assert_eq!(reloaded.baseline().passing.len(), 2);
    }

    #[test]
    fn diff_detects_regression_but_not_pre_existing_failure() {
        let dir = tempdir().unwrap();
        let mut store = BaselineStore::load(dir.path().join("baseline.json")).unwrap();
        store.replace_with(1, ["test_1", "test_2"]);
        store.set_pre_existing_failures(["test_3"]);

        // test_2 disappeared: regression. test_3 was never passing so it's
        // neither here nor there unless it starts passing (recovery case
        // below).
        let diff = store.diff_against(["test_1"]);
        assert!(diff.regressions.contains("test_2"));
        assert!(diff.recoveries.is_empty());
    }

    #[test]
    fn diff_detects_recovery() {
        let dir = tempdir().unwrap();
        let mut store = BaselineStore::load(dir.path().join("baseline.json")).unwrap();
        store.replace_with(1, ["test_1"]);
        store.set_pre_existing_failures(["test_3"]);

        let diff = store.diff_against(["test_1", "test_3"]);
        assert!(diff.regressions.is_empty());
        assert!(diff.recoveries.contains("test_3"));
    }

    #[test]
    fn content_hash_is_order_independent_and_changes_with_content() {
        let mut a = Baseline::empty();
        a.passing.insert("test_2".to_string());
        a.passing.insert("test_1".to_string());

        let mut b = Baseline::empty();
        b.passing.insert("test_1".to_string());
        b.passing.insert("test_2".to_string());

        assert_eq!(a.content_hash(), b.content_hash());

        b.passing.insert("test_3".to_string());
        assert_ne!(a.content_hash(), b.content_hash());
    }
}
