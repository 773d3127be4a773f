//! qarun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP/WebSocket
//! - Async runtime specifics
//!
//! It models the client side of a test-automation run: the run being
//! monitored, the messages folded into it, and the snapshots shown by the
//! task and report views.

pub mod endpoint;
pub mod error;
pub mod event;
pub mod ids;
pub mod report;
pub mod run;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use endpoint::{resolve_collaborator_url, CollaboratorEndpoint, Transport};
pub use error::CoreError;
pub use event::{ChannelMessage, InboundMessage};
pub use ids::{RunId, TaskId};
pub use report::{Metrics, Report};
pub use run::{Artifact, LogEntry, LogOrigin, Run};
pub use status::{FailureCause, RunPhase, TaskStatus};
pub use task::{newest_first, TaskSummary};
