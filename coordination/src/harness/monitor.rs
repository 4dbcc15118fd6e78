//! Progress Monitor (C6)
//!
//! Invoked at regular intervals during the agent's run (interval measured
//! in tokens consumed or elapsed seconds, whichever triggers first).
//! Maintains a sliding history of [`ActivitySnapshot`]s and, each tick,
//! computes stagnation, repetition, context-pressure and wall-clock
//! signals. Responses are graduated: a soft nudge at warn levels, a
//! forced-wrap-up instruction at force levels, and a hard stop at terminal
//! thresholds. Two consecutive stagnation ticks escalate straight to a
//! hard stop regardless of the configured thresholds.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// (De)serializes a [`Duration`] as a whole number of seconds, since
/// `std::time::Duration` has no `serde` impl of its own.
mod duration_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

/// A per-interval record the monitor accumulates during a session. Only
/// meaningful within a single session; never persisted.
#[derive(Debug, Clone, Default)]
pub struct ActivitySnapshot {
    /// Cumulative tokens consumed at the time of this tick.
    pub cumulative_tokens: u64,
    /// Files modified since session start, as observed at this tick.
    pub files_modified: std::collections::BTreeSet<String>,
    /// Cumulative count of commands/tool invocations issued.
    pub commands_issued: u64,
    /// Cumulative count of tests run.
    pub tests_run: u64,
    /// Error signatures observed so far, with counts.
    pub error_signatures: HashMap<String, u32>,
    /// Elapsed wall-clock since session start.
    pub elapsed: Duration,
}

/// Why the monitor terminated the agent conversation, recorded into
/// session state so the next session picks the continuation prompt kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    ContextExhausted,
    WallClockExhausted,
    Stagnation,
    Repetition,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContextExhausted => write!(f, "context_exhausted"),
            Self::WallClockExhausted => write!(f, "wall_clock_exhausted"),
            Self::Stagnation => write!(f, "stagnation"),
            Self::Repetition => write!(f, "repetition"),
        }
    }
}

/// What the orchestrator should do in response to a tick's signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorAction {
    /// Nothing notable; continue running.
    Continue,
    /// Inject a side-channel message; the agent keeps going.
    Nudge(String),
    /// Tell the agent to stop new work, document state, and yield.
    ForceWrapUp(String),
    /// Terminate the agent conversation immediately.
    HardStop(TerminationReason),
}

/// Thresholds and tunables the Progress Monitor enforces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Tokens between ticks.
    pub tick_interval_tokens: u64,
    /// Seconds between ticks, whichever of the two triggers first.
    pub tick_interval_secs: u64,
    /// Number of most-recent snapshots considered the "stagnation window".
    pub stagnation_window: usize,
    /// Minimum commands-issued delta within the window to not be stagnant.
    pub min_commands_delta: u64,
    /// Minimum tests-run delta within the window to not be stagnant.
    pub min_tests_delta: u64,
    /// A single error signature reaching this count triggers repetition.
    pub repeated_error_cap: u32,
    /// Context-window proportion that triggers a soft nudge.
    pub context_warn: f64,
    /// Context-window proportion that triggers forced wrap-up.
    pub context_force: f64,
    /// Context-window proportion that triggers a hard stop. Always 1.0 in
    /// practice but kept configurable for testability.
    pub context_hard: f64,
    /// Session-timeout proportion that triggers a soft nudge.
    pub wall_clock_warn: f64,
    /// Session-timeout proportion that triggers a hard stop.
    pub wall_clock_hard: f64,
    /// Configured session wall-clock timeout.
    #[serde(with = "duration_secs")]
    pub session_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_tokens: 5_000,
            tick_interval_secs: 60,
            stagnation_window: 3,
            min_commands_delta: 1,
            min_tests_delta: 0,
            repeated_error_cap: 3,
            context_warn: 0.75,
            context_force: 0.90,
            context_hard: 1.0,
            wall_clock_warn: 0.80,
            wall_clock_hard: 1.0,
            session_timeout: Duration::from_secs(3600),
        }
    }
}

/// The Progress Monitor. Cooperative — invoked once per agent step by the
/// orchestrator, never on a preemptive thread.
pub struct ProgressMonitor {
    config: MonitorConfig,
    history: VecDeque<ActivitySnapshot>,
    consecutive_stagnant_ticks: u32,
    context_limit_tokens: u64,
}

impl ProgressMonitor {
    pub fn new(config: MonitorConfig, context_limit_tokens: u64) -> Self {
        Self {
            config,
            history: VecDeque::new(),
            consecutive_stagnant_ticks: 0,
            context_limit_tokens,
        }
    }

    /// Number of snapshots accumulated so far this session.
    pub fn tick_count(&self) -> usize {
        self.history.len()
    }

    /// Record a new snapshot and compute the response for this tick.
    pub fn tick(&mut self, snapshot: ActivitySnapshot) -> MonitorAction {
        let context_proportion = if self.context_limit_tokens == 0 {
            0.0
        } else {
            snapshot.cumulative_tokens as f64 / self.context_limit_tokens as f64
        };
        let wall_clock_proportion = if self.config.session_timeout.is_zero() {
            0.0
        } else {
            snapshot.elapsed.as_secs_f64() / self.config.session_timeout.as_secs_f64()
        };

        // Hard stops take precedence over anything else.
        if context_proportion >= self.config.context_hard {
            self.push(snapshot);
            return MonitorAction::HardStop(TerminationReason::ContextExhausted);
        }
        if wall_clock_proportion >= self.config.wall_clock_hard {
            self.push(snapshot);
            return MonitorAction::HardStop(TerminationReason::WallClockExhausted);
        }

        if let Some((signature, count)) = self.most_frequent_error(&snapshot) {
            if count >= self.config.repeated_error_cap {
                self.push(snapshot);
                tracing::warn!(signature = %signature, count, "repeated error cap reached");
                return MonitorAction::HardStop(TerminationReason::Repetition);
            }
        }

        let is_stagnant = self.is_stagnant(&snapshot);
        self.push(snapshot);

        if is_stagnant {
            self.consecutive_stagnant_ticks += 1;
            if self.consecutive_stagnant_ticks >= 2 {
                return MonitorAction::HardStop(TerminationReason::Stagnation);
            }
        } else {
            self.consecutive_stagnant_ticks = 0;
        }

        if context_proportion >= self.config.context_force {
            return MonitorAction::ForceWrapUp(format!(
                "context window {:.0}% consumed; stop new work, document state, and yield",
                context_proportion * 100.0
            ));
        }
        if wall_clock_proportion >= self.config.wall_clock_warn {
            return MonitorAction::ForceWrapUp(format!(
                "session timeout {:.0}% consumed; wrap up now",
                wall_clock_proportion * 100.0
            ));
        }
        if context_proportion >= self.config.context_warn {
            return MonitorAction::Nudge(format!(
                "context window {:.0}% consumed; consider summarizing and focusing",
                context_proportion * 100.0
            ));
        }
        if is_stagnant {
            return MonitorAction::Nudge(
                "no file changes or new commands in the last few ticks".to_string(),
            );
        }

        MonitorAction::Continue
    }

    fn push(&mut self, snapshot: ActivitySnapshot) {
        self.history.push_back(snapshot);
        while self.history.len() > self.config.stagnation_window {
            self.history.pop_front();
        }
    }

    fn most_frequent_error(&self, snapshot: &ActivitySnapshot) -> Option<(String, u32)> {
        snapshot
            .error_signatures
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(sig, count)| (sig.clone(), *count))
    }

    /// Stagnation: within the window, the file-modification set is
    /// unchanged and the commands/tests deltas are below threshold.
    fn is_stagnant(&self, latest: &ActivitySnapshot) -> bool {
        let Some(oldest) = self.history.front() else {
            return false;
        };
        if self.history.len() < self.config.stagnation_window {
            return false;
        }

        let files_unchanged = oldest.files_modified == latest.files_modified;
        let commands_delta = latest.commands_issued.saturating_sub(oldest.commands_issued);
        let tests_delta = latest.tests_run.saturating_sub(oldest.tests_run);

        files_unchanged
            && commands_delta < self.config.min_commands_delta.max(1)
            && tests_delta <= self.config.min_tests_delta
    }
}
