//! Event types for communication between the backend thread and the UI.

use qarun_core::{Report, Run, TaskSummary};

/// Events sent from the backend to the UI thread.
#[derive(Debug)]
pub enum UiEvent {
    /// The run monitor published a new run state.
    RunUpdated(Run),

    /// Task list snapshot replaced.
    TasksUpdated(Vec<TaskSummary>),

    /// Report snapshot replaced.
    ReportUpdated(Report),

    /// The backend could not start or lost the monitor.
    Error(String),
}

/// Commands sent from the UI to the backend.
#[derive(Debug)]
pub enum BackendCommand {
    /// Submit a natural-language intent as a new run.
    Submit(String),

    /// Fetch the task list now.
    RefreshTasks,

    /// Fetch the report now.
    RefreshReport,

    /// Quit the application.
    Quit,
}
