//! Core types for the agent harness

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Feature specification as recorded in the catalog artifact
///
/// Example:
/// ```json
/// {
///   "id": "new-chat-button",
///   "category": "functional",
///   "description": "New chat button creates fresh conversation",
///   "steps": [
///     "Navigate to main interface",
///     "Click 'New Chat' button",
///     "Verify conversation created"
///   ],
///   "passes": false,
///   "priority": 1
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureSpec {
    /// Unique feature identifier
    pub id: String,

    /// Feature category (e.g., "functional", "ui", "integration")
    pub category: FeatureCategory,

    /// Human-readable description
    pub description: String,

    /// Verification steps
    pub steps: Vec<String>,

    /// Whether the feature passes verification
    pub passes: bool,

    /// Priority level (lower = higher priority)
    #[serde(default = "default_priority")]
    pub priority: u8,

    /// When the feature was last verified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_verified: Option<DateTime<Utc>>,

    /// Notes from verification attempts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,

    /// Dependencies on other features
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// How completion of this feature is attested
    #[serde(default)]
    pub verification_kind: VerificationKind,

    /// Reference to the test artifact that attests completion
    /// (required for `Automated`/`Hybrid` kinds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_ref: Option<String>,

    /// Estimated size class, advisory only
    #[serde(default)]
    pub size_class: SizeClass,

    /// Where this feature came from (operator-authored, agent-proposed, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    /// Consecutive unsuccessful verification attempts
    #[serde(default)]
    pub stuck_counter: u32,
}

fn default_priority() -> u8 {
    5
}

/// How a feature's completion is attested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerificationKind {
    /// Verified purely by an automated test artifact
    #[default]
    Automated,
    /// Verified by an automated artifact plus a human checklist
    Hybrid,
    /// No automated artifact; a human checklist is the sole gate
    Manual,
}

/// Advisory estimate of how large a feature's implementation is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    Small,
    #[default]
    Medium,
    Large,
}

/// Non-fatal advisory raised when a feature exceeds granularity caps.
///
/// Catalog loading still succeeds; this is surfaced alongside the load
/// result so the operator can split an oversized feature later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GranularityWarning {
    pub feature_id: String,
    pub step_count: usize,
    pub declared_file_count: usize,
    pub reason: String,
}

/// Advisory caps used by [`GranularityWarning`] detection.
pub const MAX_ADVISORY_STEPS: usize = 7;
pub const MAX_ADVISORY_FILES: usize = 5;

impl FeatureSpec {
    /// Create a new feature specification
    pub fn new(
        id: impl Into<String>,
        category: FeatureCategory,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            description: description.into(),
            steps: Vec::new(),
            passes: false,
            priority: default_priority(),
            last_verified: None,
            notes: Vec::new(),
            depends_on: Vec::new(),
            verification_kind: VerificationKind::Automated,
            test_ref: None,
            size_class: SizeClass::Medium,
            origin: None,
            stuck_counter: 0,
        }
    }

    /// Add a verification step
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.steps.push(step.into());
        self
    }

    /// Set priority
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Set the verification kind
    pub fn with_verification_kind(mut self, kind: VerificationKind) -> Self {
        self.verification_kind = kind;
        self
    }

    /// Set the test artifact reference
    pub fn with_test_ref(mut self, test_ref: impl Into<String>) -> Self {
        self.test_ref = Some(test_ref.into());
        self
    }

    /// Set the size class
    pub fn with_size_class(mut self, size_class: SizeClass) -> Self {
        self.size_class = size_class;
        self
    }

    /// Set the origin tag
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// `true` if this feature declares a verification artifact requirement
    /// (automated or hybrid) but carries no test reference.
    pub fn missing_required_test_ref(&self) -> bool {
        matches!(
            self.verification_kind,
            VerificationKind::Automated | VerificationKind::Hybrid
        ) && self.test_ref.as_deref().unwrap_or("").is_empty()
    }

    /// Mark as passing
    pub fn mark_passing(&mut self) {
        self.passes = true;
        self.last_verified = Some(Utc::now());
        self.stuck_counter = 0;
    }

    /// Mark as failing with note
    pub fn mark_failing(&mut self, note: impl Into<String>) {
        self.passes = false;
        self.last_verified = Some(Utc::now());
        self.notes.push(note.into());
    }

    /// Record one more unsuccessful verification attempt, returning the
    /// new count. Driven by the Verification Engine's `reject_claim`
    /// outcome; escalation policy compares this against the configured
    /// stuck-sessions limit.
    pub fn increment_stuck(&mut self) -> u32 {
        self.stuck_counter += 1;
        self.stuck_counter
    }

    /// Flip passing true->false as a regression, without touching the
    /// stuck counter (regressions are not attempt failures).
    pub fn mark_regressed(&mut self, note: impl Into<String>) {
        self.passes = false;
        self.last_verified = Some(Utc::now());
        self.notes.push(note.into());
    }

    /// Compute the granularity advisory for this feature, if any.
    pub fn granularity_warning(&self) -> Option<GranularityWarning> {
        let declared_file_count = self
            .steps
            .iter()
            .filter(|s| s.contains('/') || s.contains('.'))
            .count();
        let over_steps = self.steps.len() > MAX_ADVISORY_STEPS;
        let over_files = declared_file_count > MAX_ADVISORY_FILES;
        if !over_steps && !over_files {
            return None;
        }
        let reason = match (over_steps, over_files) {
            (true, true) => format!(
                "exceeds {} steps and {} files",
                MAX_ADVISORY_STEPS, MAX_ADVISORY_FILES
            ),
            (true, false) => format!("exceeds {} steps", MAX_ADVISORY_STEPS),
            (false, true) => format!("exceeds {} files", MAX_ADVISORY_FILES),
            (false, false) => unreachable!(),
        };
        Some(GranularityWarning {
            feature_id: self.id.clone(),
            step_count: self.steps.len(),
            declared_file_count,
            reason,
        })
    }
}

/// Feature categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureCategory {
    /// Core functionality
    Functional,
    /// User interface
    Ui,
    /// API endpoints
    Api,
    /// Integration with external systems
    Integration,
    /// Performance requirements
    Performance,
    /// Security requirements
    Security,
    /// Documentation
    Documentation,
    /// Testing infrastructure
    Testing,
}

impl std::fmt::Display for FeatureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Functional => write!(f, "functional"),
            Self::Ui => write!(f, "ui"),
            Self::Api => write!(f, "api"),
            Self::Integration => write!(f, "integration"),
            Self::Performance => write!(f, "performance"),
            Self::Security => write!(f, "security"),
            Self::Documentation => write!(f, "documentation"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

/// Progress entry for claude-progress.txt
///
/// Format: `[TIMESTAMP] [SESSION_ID] [ITER:N] [MARKER] summary`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEntry {
    /// Entry timestamp
    pub timestamp: DateTime<Utc>,

    /// Session ID this entry belongs to
    pub session_id: String,

    /// Iteration number within session
    pub iteration: u32,

    /// Entry marker/type
    pub marker: ProgressMarker,

    /// Human-readable summary
    pub summary: String,

    /// Associated feature (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<String>,

    /// Additional structured data
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ProgressEntry {
    /// Create a new progress entry
    pub fn new(
        session_id: impl Into<String>,
        iteration: u32,
        marker: ProgressMarker,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: session_id.into(),
            iteration,
            marker,
            summary: summary.into(),
            feature_id: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Add feature association
    pub fn with_feature(mut self, feature_id: impl Into<String>) -> Self {
        self.feature_id = Some(feature_id.into());
        self
    }

    /// Add metadata key-value pair
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Format as log line for claude-progress.txt
    pub fn to_log_line(&self) -> String {
        let feature_part = self
            .feature_id
            .as_ref()
            .map(|f| format!(" [{}]", f))
            .unwrap_or_default();

        let short_id = if self.session_id.len() >= 8 {
            &self.session_id[..8]
        } else {
            &self.session_id
        };

        format!(
            "[{}] [{}] [ITER:{}] [{}]{} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            short_id,
            self.iteration,
            self.marker,
            feature_part,
            self.summary
        )
    }

    /// Parse from log line
    pub fn from_log_line(line: &str) -> Option<Self> {
        // Basic parsing - production would use regex or nom
        // Format: [TIMESTAMP] [SESSION] [ITER:N] [MARKER] [FEATURE?] summary
        let parts: Vec<&str> = line.splitn(6, "] ").collect();
        if parts.len() < 5 {
            return None;
        }

        // Extract timestamp
        let timestamp_str = parts[0].trim_start_matches('[');
        let timestamp = DateTime::parse_from_str(
            &format!("{} +0000", timestamp_str),
            "%Y-%m-%d %H:%M:%S UTC %z",
        )
        .ok()?
        .with_timezone(&Utc);

        // Extract session ID
        let session_id = parts[1].trim_start_matches('[').to_string();

        // Extract iteration
        let iter_part = parts[2].trim_start_matches("[ITER:");
        let iteration: u32 = iter_part.parse().ok()?;

        // Extract marker
        let marker_str = parts[3].trim_start_matches('[');
        let marker = ProgressMarker::from_str(marker_str)?;

        // Remaining is summary (possibly with feature)
        let remaining = parts.get(4).unwrap_or(&"");
        let (feature_id, summary) = if remaining.starts_with('[') {
            if let Some(end) = remaining.find(']') {
                let feature = remaining[1..end].to_string();
                let sum = remaining[end + 1..].trim().to_string();
                (Some(feature), sum)
            } else {
                (None, remaining.to_string())
            }
        } else {
            (None, remaining.to_string())
        };

        Some(Self {
            timestamp,
            session_id,
            iteration,
            marker,
            summary,
            feature_id,
            metadata: serde_json::Map::new(),
        })
    }
}

/// Progress entry markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressMarker {
    /// Session started
    SessionStart,
    /// Feature work started
    FeatureStart,
    /// Feature completed successfully
    FeatureComplete,
    /// Feature failed verification
    FeatureFailed,
    /// Checkpoint created
    Checkpoint,
    /// Rollback performed
    Rollback,
    /// Session ended normally
    SessionEnd,
    /// Session aborted
    SessionAbort,
    /// General progress note
    Progress,
    /// Error occurred
    Error,
}

impl ProgressMarker {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "SESSION_START" => Some(Self::SessionStart),
            "FEATURE_START" => Some(Self::FeatureStart),
            "FEATURE_COMPLETE" => Some(Self::FeatureComplete),
            "FEATURE_FAILED" => Some(Self::FeatureFailed),
            "CHECKPOINT" => Some(Self::Checkpoint),
            "ROLLBACK" => Some(Self::Rollback),
            "SESSION_END" => Some(Self::SessionEnd),
            "SESSION_ABORT" => Some(Self::SessionAbort),
            "PROGRESS" => Some(Self::Progress),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProgressMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionStart => write!(f, "SESSION_START"),
            Self::FeatureStart => write!(f, "FEATURE_START"),
            Self::FeatureComplete => write!(f, "FEATURE_COMPLETE"),
            Self::FeatureFailed => write!(f, "FEATURE_FAILED"),
            Self::Checkpoint => write!(f, "CHECKPOINT"),
            Self::Rollback => write!(f, "ROLLBACK"),
            Self::SessionEnd => write!(f, "SESSION_END"),
            Self::SessionAbort => write!(f, "SESSION_ABORT"),
            Self::Progress => write!(f, "PROGRESS"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}



/// Summary of feature registry state
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FeatureSummary {
    /// Total features in registry
    pub total: usize,

    /// Features passing verification
    pub passing: usize,

    /// Features failing verification
    pub failing: usize,

    /// Features not yet verified
    pub pending: usize,

    /// Completion percentage
    pub completion_percent: f32,
}

impl FeatureSummary {
    /// Calculate summary from feature list
    pub fn from_features(features: &[FeatureSpec]) -> Self {
        let total = features.len();
        let passing = features.iter().filter(|f| f.passes).count();
        let failing = features
            .iter()
            .filter(|f| !f.passes && f.last_verified.is_some())
            .count();
        let pending = total - passing - failing;
        let completion_percent = if total > 0 {
            (passing as f32 / total as f32) * 100.0
        } else {
            0.0
        };

        Self {
            total,
            passing,
            failing,
            pending,
            completion_percent,
        }
    }
}

/// Git commit information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitCommitInfo {
    /// Commit hash (short)
    pub hash: String,

    /// Commit message (first line)
    pub message: String,

    /// Commit timestamp
    pub timestamp: Option<DateTime<Utc>>,

    /// Whether this is a harness checkpoint
    pub is_harness_checkpoint: bool,
}
