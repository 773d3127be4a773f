//! Background task driving the run monitor and the refresh pollers.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use qarun_client::{spawn_monitor, ClientConfig, Poller, Submission, WsChannel};
use qarun_core::{Report, TaskSummary};

use crate::event::{BackendCommand, UiEvent};

/// Run the backend loop.
///
/// This function runs in a separate thread with its own tokio runtime. It owns
/// the run monitor and both pollers and forwards every published snapshot to
/// the UI thread via `ui_tx`.
pub async fn run_backend(
    config: ClientConfig,
    ui_tx: mpsc::Sender<UiEvent>,
    mut cmd_rx: mpsc::Receiver<BackendCommand>,
) {
    let (endpoint, http) = match config.endpoint().and_then(|e| Ok((e, config.http_client()?))) {
        Ok(pair) => pair,
        Err(e) => {
            error!(error = %e, "Invalid collaborator configuration");
            let _ = ui_tx.send(UiEvent::Error(format!("Configuration: {}", e))).await;
            return;
        }
    };
    info!(collaborator = %endpoint.http_origin(), base_url = %http.base_url(), "Backend starting");

    let (monitor, monitor_task) = spawn_monitor(
        Arc::new(http.clone()),
        WsChannel::new(endpoint.clone()),
        endpoint,
        config.monitor_config(),
    );
    let mut run_rx = monitor.subscribe();

    let (tasks_tx, mut tasks_rx) = watch::channel::<Option<Vec<TaskSummary>>>(None);
    let tasks_client = http.clone();
    let tasks_poller = Poller::spawn(
        "tasks",
        config.task_poll_interval,
        move || {
            let client = tasks_client.clone();
            async move { client.tasks().await }
        },
        tasks_tx,
    );

    let (report_tx, mut report_rx) = watch::channel::<Option<Report>>(None);
    let report_client = http;
    let report_poller = Poller::spawn(
        "report",
        config.report_poll_interval,
        move || {
            let client = report_client.clone();
            async move { client.report().await }
        },
        report_tx,
    );

    loop {
        tokio::select! {
            changed = run_rx.changed() => {
                if changed.is_err() {
                    error!("Run monitor stopped unexpectedly");
                    let _ = ui_tx.send(UiEvent::Error("run monitor stopped".to_string())).await;
                    break;
                }
                let run = run_rx.borrow_and_update().clone();
                debug!(phase = %run.phase, logs = run.logs.len(), "Run updated");
                let _ = ui_tx.send(UiEvent::RunUpdated(run)).await;
            }

            Ok(()) = tasks_rx.changed() => {
                let tasks = tasks_rx.borrow_and_update().clone();
                if let Some(tasks) = tasks {
                    debug!(count = tasks.len(), "Tasks updated");
                    let _ = ui_tx.send(UiEvent::TasksUpdated(tasks)).await;
                }
            }

            Ok(()) = report_rx.changed() => {
                let report = report_rx.borrow_and_update().clone();
                if let Some(report) = report {
                    debug!("Report updated");
                    let _ = ui_tx.send(UiEvent::ReportUpdated(report)).await;
                }
            }

            // Commands from UI thread
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(BackendCommand::Submit(intent)) => {
                        info!(intent = %intent, "Submitting intent");
                        if let Err(e) = monitor.submit(Submission::intent(intent)).await {
                            let _ = ui_tx.send(UiEvent::Error(e.to_string())).await;
                        }
                    }
                    Some(BackendCommand::RefreshTasks) => {
                        debug!("Manual refresh: tasks");
                        tasks_poller.refresh_now();
                    }
                    Some(BackendCommand::RefreshReport) => {
                        debug!("Manual refresh: report");
                        report_poller.refresh_now();
                    }
                    Some(BackendCommand::Quit) | None => {
                        info!("Received quit command, shutting down backend");
                        break;
                    }
                }
            }
        }
    }

    tasks_poller.cancel().await;
    report_poller.cancel().await;
    monitor.shutdown().await;
    let _ = monitor_task.await;

    info!("Backend shutdown complete");
}
