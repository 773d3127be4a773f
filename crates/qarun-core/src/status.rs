//! Status enums for runs and tasks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of the client's active run.
///
/// `Idle → Submitting → Running → {Done, Failed}`; a new submission restarts
/// the cycle from any phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Nothing submitted yet, or the last submission failed.
    #[default]
    Idle,
    /// Waiting for the collaborator to hand out a run id.
    Submitting,
    /// Channel open, events being folded.
    Running,
    /// Terminal: `run_end` with `ok: true`.
    Done,
    /// Terminal: `run_end` with `ok: false`, or the channel was lost.
    Failed,
}

impl RunPhase {
    /// Returns true if the run is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true while a run is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Submitting | Self::Running)
    }

    /// Lowercase label used in status lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run ended up in [`RunPhase::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// The service reported `run_end` with `ok: false`.
    Reported,
    /// The channel closed or errored and no `run_end` arrived in time.
    ChannelLost,
}

/// Status of a task in the collaborator's task list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    /// Any status value this client does not know about.
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        assert!(RunPhase::Done.is_terminal());
        assert!(RunPhase::Failed.is_terminal());
        assert!(!RunPhase::Running.is_terminal());
        assert!(!RunPhase::Idle.is_active());
        assert!(RunPhase::Submitting.is_active());
    }

    #[test]
    fn test_unknown_task_status() {
        let status: TaskStatus = serde_json::from_str("\"queued\"").unwrap();
        assert_eq!(status, TaskStatus::Unknown);
        let status: TaskStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(status, TaskStatus::Completed);
    }
}
