//! UI state for rendering.

use qarun_core::{newest_first, Report, Run, TaskSummary};

/// Available views in the TUI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Run,
    Tasks,
    Report,
}

impl View {
    pub fn all() -> &'static [View] {
        &[View::Run, View::Tasks, View::Report]
    }

    pub fn name(&self) -> &'static str {
        match self {
            View::Run => "[1] Run",
            View::Tasks => "[2] Tasks",
            View::Report => "[3] Report",
        }
    }

    pub fn next(&self) -> View {
        match self {
            View::Run => View::Tasks,
            View::Tasks => View::Report,
            View::Report => View::Run,
        }
    }

    pub fn prev(&self) -> View {
        match self {
            View::Run => View::Report,
            View::Tasks => View::Run,
            View::Report => View::Tasks,
        }
    }
}

/// Snapshot of data for rendering (no async, no locks).
#[derive(Default)]
pub struct UiState {
    /// Latest run published by the monitor.
    pub run: Run,

    /// Task list in server order, `None` until the first fetch succeeds.
    pub tasks: Option<Vec<TaskSummary>>,

    /// Latest report, `None` until the first fetch succeeds.
    pub report: Option<Report>,

    pub current_view: View,

    /// Intent being typed.
    pub input: String,

    /// Cursor position in characters.
    pub input_cursor: usize,

    pub input_focused: bool,

    pub log_scroll_offset: usize,

    pub selected_task_index: usize,

    /// Collaborator address shown in the header.
    pub collaborator: String,

    /// Last backend error (if any).
    pub last_error: Option<String>,
}

impl UiState {
    pub fn new(collaborator: String) -> Self {
        Self {
            collaborator,
            input_focused: true,
            ..Default::default()
        }
    }

    /// Replace the run. `log_scroll_offset` is the last visible log line and
    /// follows the tail unless the user scrolled up.
    pub fn set_run(&mut self, run: Run) {
        let following = self.log_scroll_offset + 1 >= self.run.logs.len();
        self.run = run;
        let last = self.run.logs.len().saturating_sub(1);
        self.log_scroll_offset = if following {
            last
        } else {
            self.log_scroll_offset.min(last)
        };
    }

    pub fn set_tasks(&mut self, tasks: Vec<TaskSummary>) {
        self.selected_task_index = self
            .selected_task_index
            .min(tasks.len().saturating_sub(1));
        self.tasks = Some(tasks);
    }

    /// Tasks in display order (newest first).
    pub fn visible_tasks(&self) -> Vec<&TaskSummary> {
        self.tasks
            .as_deref()
            .map(|tasks| newest_first(tasks).collect())
            .unwrap_or_default()
    }

    pub fn select_next_task(&mut self) {
        let len = self.tasks.as_ref().map_or(0, Vec::len);
        if self.selected_task_index + 1 < len {
            self.selected_task_index += 1;
        }
    }

    pub fn select_prev_task(&mut self) {
        self.selected_task_index = self.selected_task_index.saturating_sub(1);
    }

    pub fn scroll_logs_down(&mut self) {
        if self.log_scroll_offset + 1 < self.run.logs.len() {
            self.log_scroll_offset += 1;
        }
    }

    pub fn scroll_logs_up(&mut self) {
        self.log_scroll_offset = self.log_scroll_offset.saturating_sub(1);
    }

    // Input editing is char-indexed so multi-byte input stays valid.

    fn byte_index(&self, char_index: usize) -> usize {
        self.input
            .char_indices()
            .nth(char_index)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }

    pub fn insert_char(&mut self, c: char) {
        let idx = self.byte_index(self.input_cursor);
        self.input.insert(idx, c);
        self.input_cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.input_cursor == 0 {
            return;
        }
        self.input_cursor -= 1;
        let idx = self.byte_index(self.input_cursor);
        self.input.remove(idx);
    }

    pub fn delete(&mut self) {
        if self.input_cursor < self.input.chars().count() {
            let idx = self.byte_index(self.input_cursor);
            self.input.remove(idx);
        }
    }

    pub fn cursor_left(&mut self) {
        self.input_cursor = self.input_cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        self.input_cursor = (self.input_cursor + 1).min(self.input.chars().count());
    }

    pub fn cursor_home(&mut self) {
        self.input_cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.input_cursor = self.input.chars().count();
    }

    /// Take the trimmed intent for submission, or `None` if it is blank.
    pub fn take_input(&mut self) -> Option<String> {
        let intent = self.input.trim().to_string();
        if intent.is_empty() {
            return None;
        }
        self.input.clear();
        self.input_cursor = 0;
        Some(intent)
    }

    /// Status line for the footer.
    pub fn status_message(&self) -> String {
        if let Some(error) = &self.last_error {
            return format!("Error: {}", error);
        }
        let run = match &self.run.id {
            Some(id) => format!("{} {}", id, self.run.phase),
            None => self.run.phase.to_string(),
        };
        let tasks = self
            .tasks
            .as_ref()
            .map_or_else(|| "-".to_string(), |t| t.len().to_string());
        format!("Run: {} | Tasks: {}", run, tasks)
    }
}
