//! Run state machine.
//!
//! [`RunMonitor`] owns the single active [`Run`] and the single event channel.
//! It runs as one task that multiplexes user commands, channel events, the
//! disconnect deadline and completions of the HTTP requests it spawned.
//! Views observe the run through a `watch` receiver and never write to it.
//!
//! Every submit bumps a generation counter. Spawned requests carry the
//! generation (and run id) they were started for, and their completions are
//! dropped unless they still match the current run.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use qarun_core::{CollaboratorEndpoint, InboundMessage, LogOrigin, Run, RunId, RunPhase};

use crate::api::{CreatedRun, RunApi, Submission};
use crate::channel::{ChannelEvent, ChannelEventKind, EventChannel};
use crate::error::ClientError;

/// Default time to wait for `run_end` after the channel dropped.
pub const DEFAULT_DISCONNECT_GRACE: Duration = Duration::from_secs(15);

/// Run monitor settings.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How long a run may stay `Running` after its channel closed or errored
    /// before it is marked failed.
    pub disconnect_grace: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            disconnect_grace: DEFAULT_DISCONNECT_GRACE,
        }
    }
}

/// Commands accepted by the monitor task.
#[derive(Debug)]
pub enum MonitorCommand {
    /// Start a new run, superseding the current one.
    Submit(Submission),
    /// Close the channel and stop.
    Shutdown,
}

/// Results of requests spawned by the monitor.
#[derive(Debug)]
enum Completion {
    RunCreated {
        generation: u64,
        outcome: Result<CreatedRun, ClientError>,
    },
    ResultFetched {
        generation: u64,
        run_id: RunId,
        outcome: Result<Value, ClientError>,
    },
}

/// The orchestrator for one client instance.
pub struct RunMonitor<A: RunApi, C: EventChannel> {
    api: Arc<A>,
    channel: C,
    endpoint: CollaboratorEndpoint,
    config: MonitorConfig,
    run: Run,
    generation: u64,
    events: Option<mpsc::Receiver<ChannelEvent>>,
    disconnect_deadline: Option<Instant>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    state_tx: watch::Sender<Run>,
}

impl<A: RunApi, C: EventChannel> RunMonitor<A, C> {
    /// Create a monitor and the receiver views use to observe the run.
    pub fn new(
        api: Arc<A>,
        channel: C,
        endpoint: CollaboratorEndpoint,
        config: MonitorConfig,
    ) -> (Self, watch::Receiver<Run>) {
        let (state_tx, state_rx) = watch::channel(Run::default());
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let monitor = Self {
            api,
            channel,
            endpoint,
            config,
            run: Run::default(),
            generation: 0,
            events: None,
            disconnect_deadline: None,
            completions_tx,
            completions_rx,
            state_tx,
        };
        (monitor, state_rx)
    }

    /// Current run state.
    pub fn run_state(&self) -> &Run {
        &self.run
    }

    /// Process commands and events until shutdown or until every handle is dropped.
    pub async fn run(mut self, mut commands: mpsc::Receiver<MonitorCommand>) {
        info!("Run monitor started");

        loop {
            let deadline = self.disconnect_deadline;
            tokio::select! {
                command = commands.recv() => match command {
                    Some(MonitorCommand::Submit(submission)) => self.submit(submission),
                    Some(MonitorCommand::Shutdown) | None => break,
                },
                Some(completion) = self.completions_rx.recv() => {
                    self.handle_completion(completion);
                }
                event = next_event(&mut self.events) => match event {
                    Some(event) => self.handle_channel_event(event),
                    // Reader ended without a close event.
                    None => self.handle_channel_event(ChannelEvent {
                        seq: u64::MAX,
                        kind: ChannelEventKind::Closed,
                    }),
                },
                _ = wait_until(deadline) => self.handle_disconnect_deadline(),
            }
        }

        self.shutdown();
        info!("Run monitor stopped");
    }

    /// Start a new run. Any previous run is superseded and its channel closed
    /// before anything else happens.
    pub fn submit(&mut self, submission: Submission) {
        self.close_channel();
        self.disconnect_deadline = None;
        self.generation += 1;
        self.run.begin_submission();
        self.publish();

        let generation = self.generation;
        info!(generation, "Submitting run");

        let api = Arc::clone(&self.api);
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let outcome = api.create_run(&submission).await;
            let _ = tx.send(Completion::RunCreated {
                generation,
                outcome,
            });
        });
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::RunCreated {
                generation,
                outcome,
            } => {
                if generation != self.generation || self.run.phase != RunPhase::Submitting {
                    debug!(generation, current = self.generation, "Discarding stale submit response");
                    return;
                }
                match outcome {
                    Ok(CreatedRun { run_id, reply }) => {
                        info!(run_id = %run_id, "Run created");
                        self.run.start(run_id.clone());
                        // A synchronous run already carries its verdict.
                        let settled = reply.and_then(|reply| self.run.apply_run_reply(reply));
                        match settled {
                            Some(ok) => info!(run_id = %run_id, ok, "Run finished with reply"),
                            None => self.events = Some(self.channel.open(&run_id)),
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Submit failed");
                        self.run.submission_failed(&e.to_string());
                    }
                }
                self.publish();
            }
            Completion::ResultFetched {
                generation,
                run_id,
                outcome,
            } => {
                if generation != self.generation || self.run.id.as_ref() != Some(&run_id) {
                    debug!(run_id = %run_id, "Discarding stale result response");
                    return;
                }
                match outcome {
                    Ok(result) => {
                        debug!(run_id = %run_id, "Result fetched");
                        self.run.result = Some(result);
                        self.publish();
                    }
                    // Status was already decided by the stream.
                    Err(e) => warn!(run_id = %run_id, error = %e, "Result fetch failed"),
                }
            }
        }
    }

    fn handle_channel_event(&mut self, event: ChannelEvent) {
        if self.run.phase != RunPhase::Running {
            debug!(seq = event.seq, phase = %self.run.phase, "Ignoring channel event outside a running run");
            return;
        }

        match event.kind {
            ChannelEventKind::Connected => {
                self.run
                    .push_log(LogOrigin::Client, InboundMessage::info("channel connected"));
            }
            ChannelEventKind::Message(message) => {
                if let Some(ok) = self.run.apply_message(message, &self.endpoint) {
                    info!(run_id = ?self.run.id, ok, "Run finished");
                    self.finish();
                }
            }
            ChannelEventKind::Closed => {
                self.run
                    .push_log(LogOrigin::Client, InboundMessage::info("channel closed"));
                self.close_channel();
                self.arm_disconnect_deadline();
            }
            ChannelEventKind::Error(error) => {
                self.run.push_log(
                    LogOrigin::Client,
                    InboundMessage::error(format!("channel error: {}", error)),
                );
                self.arm_disconnect_deadline();
            }
        }
        self.publish();
    }

    fn arm_disconnect_deadline(&mut self) {
        if self.disconnect_deadline.is_none() {
            debug!(grace = ?self.config.disconnect_grace, "Channel lost while running, waiting for run_end");
            self.disconnect_deadline = Some(Instant::now() + self.config.disconnect_grace);
        }
    }

    fn handle_disconnect_deadline(&mut self) {
        self.disconnect_deadline = None;
        if self.run.channel_lost() {
            warn!(run_id = ?self.run.id, "No run_end before disconnect grace expired, marking run failed");
            self.finish();
            self.publish();
        }
    }

    /// Terminal transition: fetch the authoritative result, close the channel.
    fn finish(&mut self) {
        self.disconnect_deadline = None;
        if let Some(run_id) = self.run.id.clone() {
            self.spawn_result_fetch(run_id);
        }
        self.close_channel();
    }

    fn spawn_result_fetch(&self, run_id: RunId) {
        let generation = self.generation;
        let api = Arc::clone(&self.api);
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let outcome = api.fetch_result(&run_id).await;
            let _ = tx.send(Completion::ResultFetched {
                generation,
                run_id,
                outcome,
            });
        });
    }

    fn close_channel(&mut self) {
        self.channel.close();
        self.events = None;
    }

    fn shutdown(&mut self) {
        self.close_channel();
        self.disconnect_deadline = None;
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.run.clone());
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<ChannelEvent>>) -> Option<ChannelEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Cheap handle to a running monitor task.
#[derive(Clone)]
pub struct MonitorHandle {
    commands: mpsc::Sender<MonitorCommand>,
    state: watch::Receiver<Run>,
}

impl MonitorHandle {
    /// Submit a new run, superseding the current one.
    pub async fn submit(&self, submission: Submission) -> Result<(), ClientError> {
        self.commands
            .send(MonitorCommand::Submit(submission))
            .await
            .map_err(|_| ClientError::MonitorStopped)
    }

    /// A receiver that observes every published run state.
    pub fn subscribe(&self) -> watch::Receiver<Run> {
        self.state.clone()
    }

    /// Latest published run state.
    pub fn snapshot(&self) -> Run {
        self.state.borrow().clone()
    }

    /// Ask the monitor to close its channel and stop.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(MonitorCommand::Shutdown).await;
    }
}

/// Spawn a monitor task and return a handle to it.
pub fn spawn_monitor<A: RunApi, C: EventChannel>(
    api: Arc<A>,
    channel: C,
    endpoint: CollaboratorEndpoint,
    config: MonitorConfig,
) -> (MonitorHandle, JoinHandle<()>) {
    let (monitor, state) = RunMonitor::new(api, channel, endpoint, config);
    let (commands, commands_rx) = mpsc::channel(16);
    let task = tokio::spawn(monitor.run(commands_rx));
    (MonitorHandle { commands, state }, task)
}
