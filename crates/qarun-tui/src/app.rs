//! Application state and main event loop.

use std::time::Duration;

use ratatui::crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::DefaultTerminal;
use tokio::sync::mpsc;

use crate::event::{BackendCommand, UiEvent};
use crate::state::{UiState, View};
use crate::ui;

/// Main application with UI state and channel handles.
pub struct App {
    /// Current UI state snapshot for rendering.
    state: UiState,

    /// Receiver for events from the backend.
    ui_rx: mpsc::Receiver<UiEvent>,

    /// Sender for commands to the backend.
    cmd_tx: mpsc::Sender<BackendCommand>,
}

impl App {
    pub fn new(
        collaborator: String,
        ui_rx: mpsc::Receiver<UiEvent>,
        cmd_tx: mpsc::Sender<BackendCommand>,
    ) -> Self {
        Self {
            state: UiState::new(collaborator),
            ui_rx,
            cmd_tx,
        }
    }

    /// Run the main event loop.
    ///
    /// This runs on the main thread and handles:
    /// - Drawing the UI
    /// - Processing keyboard input
    /// - Receiving updates from the backend
    pub fn run(&mut self, mut terminal: DefaultTerminal) -> std::io::Result<()> {
        loop {
            terminal.draw(|frame| ui::render(frame, &self.state))?;

            // Poll terminal events (non-blocking with short timeout)
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && self.handle_key(key.code) {
                        break;
                    }
                }
            }

            // Process backend events (non-blocking)
            while let Ok(event) = self.ui_rx.try_recv() {
                self.apply_event(event);
            }
        }

        let _ = self.cmd_tx.blocking_send(BackendCommand::Quit);

        Ok(())
    }

    /// Apply an event from the backend to the UI state.
    fn apply_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::RunUpdated(run) => self.state.set_run(run),
            UiEvent::TasksUpdated(tasks) => self.state.set_tasks(tasks),
            UiEvent::ReportUpdated(report) => self.state.report = Some(report),
            UiEvent::Error(msg) => self.state.last_error = Some(msg),
        }
    }

    /// Handle a key press.
    ///
    /// Returns true if the app should quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        if self.state.current_view == View::Run && self.state.input_focused {
            self.handle_input_key(code);
            return false;
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => {
                return true;
            }

            // View switching with number keys
            KeyCode::Char('1') => {
                self.state.current_view = View::Run;
            }
            KeyCode::Char('2') => {
                self.state.current_view = View::Tasks;
            }
            KeyCode::Char('3') => {
                self.state.current_view = View::Report;
            }

            KeyCode::Tab => {
                self.state.current_view = self.state.current_view.next();
            }
            KeyCode::BackTab => {
                self.state.current_view = self.state.current_view.prev();
            }

            // Up/Down or j/k navigation
            KeyCode::Up | KeyCode::Char('k') => match self.state.current_view {
                View::Run => self.state.scroll_logs_up(),
                View::Tasks => self.state.select_prev_task(),
                View::Report => {}
            },
            KeyCode::Down | KeyCode::Char('j') => match self.state.current_view {
                View::Run => self.state.scroll_logs_down(),
                View::Tasks => self.state.select_next_task(),
                View::Report => {}
            },

            // Focus the intent editor
            KeyCode::Enter | KeyCode::Char('i') if self.state.current_view == View::Run => {
                self.state.input_focused = true;
            }

            KeyCode::Char('r') => match self.state.current_view {
                View::Tasks => self.send(BackendCommand::RefreshTasks),
                View::Report => self.send(BackendCommand::RefreshReport),
                View::Run => {}
            },

            _ => {}
        }
        false
    }

    /// Keys while the intent editor has focus.
    fn handle_input_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Enter => {
                if let Some(intent) = self.state.take_input() {
                    self.state.last_error = None;
                    self.send(BackendCommand::Submit(intent));
                }
            }
            KeyCode::Esc | KeyCode::Tab => {
                self.state.input_focused = false;
            }
            KeyCode::Char(c) => self.state.insert_char(c),
            KeyCode::Backspace => self.state.backspace(),
            KeyCode::Delete => self.state.delete(),
            KeyCode::Left => self.state.cursor_left(),
            KeyCode::Right => self.state.cursor_right(),
            KeyCode::Home => self.state.cursor_home(),
            KeyCode::End => self.state.cursor_end(),
            _ => {}
        }
    }

    fn send(&self, command: BackendCommand) {
        let _ = self.cmd_tx.blocking_send(command);
    }
}
