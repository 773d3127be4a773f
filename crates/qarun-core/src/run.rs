//! The client's active run and the fold of channel messages into it.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::endpoint::CollaboratorEndpoint;
use crate::event::{ChannelMessage, InboundMessage};
use crate::ids::RunId;
use crate::status::{FailureCause, RunPhase};

/// Who produced a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOrigin {
    /// Delivered by the service over the channel.
    Service,
    /// Written by the client (channel lifecycle, submit errors).
    Client,
}

/// One line of a run's log history.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Position in the run's log, starting at 0.
    pub seq: u64,
    pub received_at: DateTime<Utc>,
    pub origin: LogOrigin,
    pub inbound: InboundMessage,
}

impl LogEntry {
    pub fn kind(&self) -> &str {
        self.inbound.message.kind()
    }

    pub fn summary(&self) -> String {
        self.inbound.summary()
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self.inbound.message,
            ChannelMessage::Error { .. } | ChannelMessage::StepError { .. }
        ) || matches!(
            self.inbound.message,
            ChannelMessage::RunEnd { ok: false } | ChannelMessage::StepEnd { ok: false, .. }
        )
    }
}

/// An artifact produced by a step, with its URL already resolved against the
/// collaborator origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub step: String,
    pub url: String,
}

/// State of the single active run.
///
/// Only the run monitor mutates this; views read clones of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Run {
    /// Assigned once the collaborator accepted the submission.
    pub id: Option<RunId>,
    pub phase: RunPhase,
    /// Set when `phase` is [`RunPhase::Failed`].
    pub failure: Option<FailureCause>,
    /// Every message in arrival order, plus client-originated lines.
    pub logs: Vec<LogEntry>,
    /// Append-only, arrival order, no de-duplication.
    pub artifacts: Vec<Artifact>,
    /// Authoritative result payload, fetched after the terminal event.
    pub result: Option<Value>,
}

impl Run {
    /// Reset everything and enter [`RunPhase::Submitting`].
    pub fn begin_submission(&mut self) {
        *self = Self {
            phase: RunPhase::Submitting,
            ..Self::default()
        };
    }

    /// The collaborator handed out a run id; the channel is about to open.
    pub fn start(&mut self, id: RunId) {
        self.id = Some(id);
        self.phase = RunPhase::Running;
    }

    /// Submission failed: log it and fall back to [`RunPhase::Idle`].
    pub fn submission_failed(&mut self, reason: &str) {
        self.push_log(
            LogOrigin::Client,
            InboundMessage::error(format!("submit failed: {}", reason)),
        );
        self.phase = RunPhase::Idle;
    }

    pub fn push_log(&mut self, origin: LogOrigin, inbound: InboundMessage) {
        let seq = self.logs.len() as u64;
        self.logs.push(LogEntry {
            seq,
            received_at: Utc::now(),
            origin,
            inbound,
        });
    }

    /// Fold one service message into the run.
    ///
    /// The message is always logged first. Artifacts with a non-empty url are
    /// appended; a `run_end` while running moves to `Done`/`Failed`. Returns
    /// the outcome when this message made the run terminal.
    pub fn apply_message(
        &mut self,
        inbound: InboundMessage,
        endpoint: &CollaboratorEndpoint,
    ) -> Option<bool> {
        let message = inbound.message.clone();
        self.push_log(LogOrigin::Service, inbound);

        if let ChannelMessage::Artifact {
            step,
            url: Some(url),
        } = &message
        {
            if !url.is_empty() {
                self.artifacts.push(Artifact {
                    step: step.clone().unwrap_or_default(),
                    url: endpoint.artifact_url(url),
                });
            }
            return None;
        }

        let ok = message.terminal_outcome()?;
        self.conclude(ok)
    }

    /// Fold the reply of a synchronous scenario run.
    ///
    /// The reply is logged as a service line. When it carries a verdict
    /// (`status` of `completed`, `failed` or `error`) the run becomes terminal
    /// and the reply is kept as its result. Returns the outcome in that case.
    pub fn apply_run_reply(&mut self, reply: Value) -> Option<bool> {
        if self.phase != RunPhase::Running {
            return None;
        }
        self.push_log(LogOrigin::Service, InboundMessage::from_value(reply.clone()));

        let ok = match reply.get("status").and_then(Value::as_str) {
            Some("completed") => true,
            Some("failed" | "error") => false,
            _ => return None,
        };
        self.result = Some(reply);
        self.conclude(ok)
    }

    fn conclude(&mut self, ok: bool) -> Option<bool> {
        if self.phase != RunPhase::Running {
            return None;
        }
        if ok {
            self.phase = RunPhase::Done;
        } else {
            self.phase = RunPhase::Failed;
            self.failure = Some(FailureCause::Reported);
        }
        Some(ok)
    }

    /// The channel went away without a terminal event. Returns true if this
    /// moved the run to [`RunPhase::Failed`].
    pub fn channel_lost(&mut self) -> bool {
        if self.phase != RunPhase::Running {
            return false;
        }
        self.push_log(
            LogOrigin::Client,
            InboundMessage::error("channel lost before run_end"),
        );
        self.phase = RunPhase::Failed;
        self.failure = Some(FailureCause::ChannelLost);
        true
    }

    /// Number of log lines that came from the service.
    pub fn service_log_count(&self) -> usize {
        self.logs
            .iter()
            .filter(|entry| entry.origin == LogOrigin::Service)
            .count()
    }
}
