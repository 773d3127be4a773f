//! Client library for the qarun collaborator.
//!
//! - [`http`]: REST calls (submit, result, status, scenarios, tasks, report)
//! - [`channel`]: the per-run realtime event channel
//! - [`monitor`]: the run state machine that ties both together
//! - [`poller`]: periodic refresh of the task list and report snapshots

pub mod api;
pub mod channel;
pub mod config;
pub mod error;
pub mod http;
pub mod monitor;
pub mod poller;

pub use api::{CreatedRun, RunApi, Submission};
pub use channel::{ChannelEvent, ChannelEventKind, EventChannel, WsChannel};
pub use config::ClientConfig;
pub use error::ClientError;
pub use http::HttpClient;
pub use monitor::{spawn_monitor, MonitorConfig, MonitorHandle, RunMonitor};
pub use poller::{Poller, SnapshotSink};
