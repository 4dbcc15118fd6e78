//! Event & Decision Log (C9)
//!
//! A structured, append-only record of everything the orchestrator decided
//! and why, layered over the existing human-narrative [`super::progress::ProgressTracker`]
//! rather than replacing it. Where the narrative log is prose meant for a
//! human skimming `claude-progress.txt`, this log is newline-delimited JSON
//! meant for grepping, diffing, and machine replay of a session's decisions.

use crate::harness::error::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Severity of a logged event, from loudest to quietest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Routine,
    Important,
    Critical,
}

impl Severity {
    /// How long a record at this level is worth keeping around, in days.
    /// Debug churns fast; critical records (rollbacks, escalations) are
    /// worth keeping until someone explicitly prunes them.
    pub fn retention_days(&self) -> Option<u64> {
        match self {
            Severity::Debug => Some(2),
            Severity::Routine => Some(14),
            Severity::Important => Some(90),
            Severity::Critical => None,
        }
    }
}

/// One append-only record in the decision log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionLogRecord {
    /// Monotonically increasing within a single log file.
    pub seq: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub severity: Severity,
    /// Short machine-readable tag, e.g. "preflight.failed", "verify.accept".
    pub kind: String,
    pub session_id: String,
    pub feature_id: Option<String>,
    pub summary: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl DecisionLogRecord {
    fn to_line(&self) -> HarnessResult<String> {
        serde_json::to_string(self).map_err(|e| HarnessError::Io(std::io::Error::other(e)))
    }

    fn from_line(line: &str) -> Option<Self> {
        serde_json::from_str(line).ok()
    }
}

/// Builder-style handle used to assemble a record before appending it.
pub struct DecisionEntry {
    severity: Severity,
    kind: String,
    session_id: String,
    feature_id: Option<String>,
    summary: String,
    details: BTreeMap<String, serde_json::Value>,
}

impl DecisionEntry {
    pub fn new(severity: Severity, kind: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            severity,
            kind: kind.into(),
            session_id: session_id.into(),
            feature_id: None,
            summary: String::new(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_feature(mut self, feature_id: impl Into<String>) -> Self {
        self.feature_id = Some(feature_id.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Append-only newline-delimited-JSON sink for [`DecisionLogRecord`]s.
///
/// Sequence numbers are tracked in memory for the lifetime of this handle;
/// on resume the next sequence number picks up from the last line already
/// on disk so a restarted session does not reuse sequence numbers.
pub struct DecisionLog {
    path: PathBuf,
    next_seq: AtomicU64,
}

impl DecisionLog {
    pub fn new(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let path = path.as_ref().to_path_buf();
        let next_seq = Self::last_seq_on_disk(&path)?.map(|s| s + 1).unwrap_or(0);
        Ok(Self {
            path,
            next_seq: AtomicU64::new(next_seq),
        })
    }

    fn last_seq_on_disk(path: &Path) -> HarnessResult<Option<u64>> {
        if !path.exists() {
            return Ok(None);
        }
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let mut last = None;
        for line in reader.lines().map_while(Result::ok) {
            if let Some(record) = DecisionLogRecord::from_line(&line) {
                last = Some(record.seq);
            }
        }
        Ok(last)
    }

    /// Append a record built from `entry`, stamping `seq` and `timestamp`.
    pub fn record(&self, entry: DecisionEntry) -> HarnessResult<DecisionLogRecord> {
        let record = DecisionLogRecord {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            timestamp: chrono::Utc::now(),
            severity: entry.severity,
            kind: entry.kind,
            session_id: entry.session_id,
            feature_id: entry.feature_id,
            summary: entry.summary,
            details: entry.details,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", record.to_line()?).map_err(HarnessError::Io)?;
        Ok(record)
    }

    /// Convenience wrapper for the common case: no structured details.
    pub fn log(
        &self,
        severity: Severity,
        kind: impl Into<String>,
        session_id: impl Into<String>,
        summary: impl Into<String>,
    ) -> HarnessResult<DecisionLogRecord> {
        self.record(
            DecisionEntry::new(severity, kind, session_id).with_summary(summary),
        )
    }

    /// Read every record currently on disk, in append order.
    pub fn read_all(&self) -> HarnessResult<Vec<DecisionLogRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.path)?;
        let reader = BufReader::new(file);
        Ok(reader
            .lines()
            .map_while(Result::ok)
            .filter_map(|line| DecisionLogRecord::from_line(&line))
            .collect())
    }

    /// Read all records for one session.
    pub fn read_session(&self, session_id: &str) -> HarnessResult<Vec<DecisionLogRecord>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| r.session_id == session_id)
            .collect())
    }

    /// Drop records older than their severity's retention window. Critical
    /// records are never pruned. Rewrites the file atomically.
    pub fn prune(&self, now: chrono::DateTime<chrono::Utc>) -> HarnessResult<usize> {
        let all = self.read_all()?;
        let (keep, drop): (Vec<_>, Vec<_>) = all.into_iter().partition(|r| match r.severity.retention_days() {
            None => true,
            Some(days) => (now - r.timestamp).num_days() < days as i64,
        });

        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut file = std::fs::File::create(&tmp)?;
            for record in &keep {
                writeln!(file, "{}", record.to_line()?).map_err(HarnessError::Io)?;
            }
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(drop.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn appends_and_reads_back_in_order() {
        let dir = tempdir().unwrap();
        let log = DecisionLog::new(dir.path().join("decisions.jsonl")).unwrap();

        log.log(Severity::Routine, "preflight.start", "sess-1", "running preflight")
            .unwrap();
        log.log(Severity::Critical, "preflight.failed", "sess-1", "vcs not clean")
            .unwrap();

        let all = log.read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].seq, 0);
        assert_eq!(all[1].seq, 1);
        assert_eq!(all[1].severity, Severity::Critical);
    }

    #[test]
    fn resumes_sequence_numbers_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");

        {
            let log = DecisionLog::new(&path).unwrap();
            log.log(Severity::Debug, "tick", "sess-1", "tick 1").unwrap();
            log.log(Severity::Debug, "tick", "sess-1", "tick 2").unwrap();
        }

        let resumed = DecisionLog::new(&path).unwrap();
        let record = resumed.log(Severity::Debug, "tick", "sess-1", "tick 3").unwrap();
        assert_eq!(record.seq, 2);
    }

    #[test]
    fn with_detail_round_trips_structured_data() {
        let dir = tempdir().unwrap();
        let log = DecisionLog::new(dir.path().join("decisions.jsonl")).unwrap();

        log.record(
            DecisionEntry::new(Severity::Important, "verify.regression", "sess-1")
                .with_feature("feat-7")
                .with_summary("regression in baseline test")
                .with_detail("test_id", serde_json::Value::String("tests::foo".into())),
        )
        .unwrap();

        let all = log.read_all().unwrap();
        assert_eq!(all[0].feature_id.as_deref(), Some("feat-7"));
        assert_eq!(
            all[0].details.get("test_id").and_then(|v| v.as_str()),
            Some("tests::foo")
        );
    }

    #[test]
    fn read_session_filters_by_session_id() {
        let dir = tempdir().unwrap();
        let log = DecisionLog::new(dir.path().join("decisions.jsonl")).unwrap();
        log.log(Severity::Routine, "k", "sess-1", "a").unwrap();
        log.log(Severity::Routine, "k", "sess-2", "b").unwrap();
        log.log(Severity::Routine, "k", "sess-1", "c").unwrap();

        let sess1 = log.read_session("sess-1").unwrap();
        assert_eq!(sess1.len(), 2);
    }

    #[test]
    fn prune_keeps_critical_and_drops_stale_debug() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");
        let log = DecisionLog::new(&path).unwrap();

        log.record(DecisionEntry {
            severity: Severity::Debug,
            kind: "tick".into(),
            session_id: "sess-1".into(),
            feature_id: None,
            summary: "old tick".into(),
            details: BTreeMap::new(),
        })
        .unwrap();
        log.log(Severity::Critical, "escalated", "sess-1", "stuck session")
            .unwrap();

        let far_future = chrono::Utc::now() + chrono::Duration::days(30);
        let dropped = log.prune(far_future).unwrap();
        assert_eq!(dropped, 1);

        let remaining = log.read_all().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].severity, Severity::Critical);
    }
}
