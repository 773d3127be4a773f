//! Main render function for the TUI.

use ratatui::layout::{Constraint, Layout, Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, List, ListItem, Paragraph, Row, Table, Tabs, Wrap};
use ratatui::Frame;

use qarun_core::{LogOrigin, RunPhase, TaskStatus};

use crate::state::{UiState, View};

/// Render the entire UI.
pub fn render(frame: &mut Frame, state: &UiState) {
    let area = frame.area();

    // Create main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Fill(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(frame, header_area, state);

    match state.current_view {
        View::Run => render_run_view(frame, body_area, state),
        View::Tasks => render_tasks_view(frame, body_area, state),
        View::Report => render_report_view(frame, body_area, state),
    }

    render_footer(frame, footer_area, state);
}

/// Render the header with navigation tabs.
fn render_header(frame: &mut Frame, area: Rect, state: &UiState) {
    let titles: Vec<&str> = View::all().iter().map(|v| v.name()).collect();

    let selected = View::all()
        .iter()
        .position(|v| *v == state.current_view)
        .unwrap_or(0);

    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" qarun - {} ", state.collaborator))
                .title_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        )
        .select(selected)
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        );

    frame.render_widget(tabs, area);
}

fn phase_style(phase: RunPhase) -> Style {
    match phase {
        RunPhase::Idle => Style::default().fg(Color::Gray),
        RunPhase::Submitting | RunPhase::Running => Style::default().fg(Color::Yellow),
        RunPhase::Done => Style::default().fg(Color::Green),
        RunPhase::Failed => Style::default().fg(Color::Red),
    }
}

/// Render the run view: intent editor, status, logs, artifacts and result.
fn render_run_view(frame: &mut Frame, area: Rect, state: &UiState) {
    let [input_area, status_area, body_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Fill(1),
    ])
    .areas(area);

    // Intent editor
    let border = if state.input_focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let title = if state.run.phase.is_active() {
        " Test intent (Enter replaces the current run) "
    } else {
        " Test intent (Enter to submit) "
    };
    let input = Paragraph::new(state.input.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(border),
    );
    frame.render_widget(input, input_area);
    if state.input_focused {
        let cursor_x = input_area.x + 1 + state.input_cursor as u16;
        frame.set_cursor_position(Position::new(
            cursor_x.min(input_area.right().saturating_sub(2)),
            input_area.y + 1,
        ));
    }

    // Status
    let run = &state.run;
    let mut status = vec![
        Span::raw("Run: "),
        Span::styled(
            run.id.as_ref().map_or("-", |id| id.as_str()),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw("   Status: "),
        Span::styled(run.phase.as_str(), phase_style(run.phase)),
    ];
    if let Some(cause) = run.failure {
        status.push(Span::styled(
            format!(" ({:?})", cause),
            Style::default().fg(Color::Red),
        ));
    }
    status.push(Span::raw(format!(
        "   Logs: {}   Artifacts: {}",
        run.logs.len(),
        run.artifacts.len()
    )));
    frame.render_widget(
        Paragraph::new(Line::from(status))
            .block(Block::default().borders(Borders::ALL).title(" Status ")),
        status_area,
    );

    let [logs_area, side_area] =
        Layout::horizontal([Constraint::Percentage(60), Constraint::Percentage(40)])
            .areas(body_area);
    render_logs(frame, logs_area, state);

    let [artifacts_area, result_area] =
        Layout::vertical([Constraint::Percentage(40), Constraint::Percentage(60)])
            .areas(side_area);
    render_artifacts(frame, artifacts_area, state);
    render_result(frame, result_area, state);
}

fn render_logs(frame: &mut Frame, area: Rect, state: &UiState) {
    let logs = &state.run.logs;
    if logs.is_empty() {
        let empty = Paragraph::new("No log messages yet.")
            .style(Style::default().fg(Color::Gray))
            .block(Block::default().borders(Borders::ALL).title(" Logs "));
        frame.render_widget(empty, area);
        return;
    }

    // The offset is the last visible line.
    let visible_height = area.height.saturating_sub(2) as usize;
    let start = (state.log_scroll_offset + 1).saturating_sub(visible_height);
    let items: Vec<ListItem> = logs
        .iter()
        .skip(start)
        .take(visible_height)
        .map(|entry| {
            let kind_style = if entry.is_error() {
                Style::default().fg(Color::Red)
            } else if entry.origin == LogOrigin::Client {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default().fg(Color::Blue)
            };

            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{} ", entry.received_at.format("%H:%M:%S")),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(format!("[{:<10}] ", entry.kind()), kind_style),
                Span::raw(entry.summary()),
            ]))
        })
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(format!(
        " Logs ({}/{}) ",
        state.log_scroll_offset + 1,
        logs.len()
    )));

    frame.render_widget(list, area);
}

fn render_artifacts(frame: &mut Frame, area: Rect, state: &UiState) {
    let items: Vec<ListItem> = state
        .run
        .artifacts
        .iter()
        .map(|artifact| {
            ListItem::new(vec![
                Line::from(Span::styled(
                    artifact.step.as_str(),
                    Style::default().fg(Color::Cyan),
                )),
                Line::from(Span::raw(format!("  {}", artifact.url))),
            ])
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Artifacts ({}) ", state.run.artifacts.len())),
    );
    frame.render_widget(list, area);
}

fn render_result(frame: &mut Frame, area: Rect, state: &UiState) {
    let text = match &state.run.result {
        Some(result) => serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string()),
        None if state.run.phase.is_terminal() => "Fetching result...".to_string(),
        None => String::new(),
    };

    let result = Paragraph::new(text)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(" Result "));
    frame.render_widget(result, area);
}

/// Render the task list, newest first.
fn render_tasks_view(frame: &mut Frame, area: Rect, state: &UiState) {
    let tasks = state.visible_tasks();
    if tasks.is_empty() {
        let message = if state.tasks.is_none() {
            "Loading tasks..."
        } else {
            "No tasks yet."
        };
        let empty = Paragraph::new(message)
            .style(Style::default().fg(Color::Gray))
            .block(Block::default().borders(Borders::ALL).title(" Tasks "));
        frame.render_widget(empty, area);
        return;
    }

    let header = Row::new(vec![
        Cell::from("ID"),
        Cell::from("Status"),
        Cell::from("Updated"),
        Cell::from("Description"),
    ])
    .style(Style::default().add_modifier(Modifier::BOLD))
    .height(1);

    let rows: Vec<Row> = tasks
        .iter()
        .enumerate()
        .map(|(i, task)| {
            let status_style = match task.status {
                TaskStatus::Pending => Style::default().fg(Color::Gray),
                TaskStatus::Running => Style::default().fg(Color::Yellow),
                TaskStatus::Completed => Style::default().fg(Color::Green),
                TaskStatus::Failed => Style::default().fg(Color::Red),
                TaskStatus::Unknown => Style::default().fg(Color::DarkGray),
            };

            let style = if i == state.selected_task_index {
                Style::default().bg(Color::DarkGray)
            } else {
                Style::default()
            };

            Row::new(vec![
                Cell::from(task.id.short().to_string()),
                Cell::from(task.status.as_str()).style(status_style),
                Cell::from(task.updated_at.clone().unwrap_or_else(|| "-".to_string())),
                Cell::from(task.description_or_dash().to_string()),
            ])
            .style(style)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(11),
            Constraint::Length(21),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Tasks ({}) ", tasks.len())),
    );

    frame.render_widget(table, area);
}

/// Render the report: summary, metrics and failure distribution.
fn render_report_view(frame: &mut Frame, area: Rect, state: &UiState) {
    let Some(report) = &state.report else {
        let empty = Paragraph::new("Loading report...")
            .style(Style::default().fg(Color::Gray))
            .block(Block::default().borders(Borders::ALL).title(" Report "));
        frame.render_widget(empty, area);
        return;
    };

    let [summary_area, metrics_area, failures_area] = Layout::vertical([
        Constraint::Length(5),
        Constraint::Length(9),
        Constraint::Fill(1),
    ])
    .areas(area);

    let summary = Paragraph::new(report.summary.as_str())
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(" Summary "));
    frame.render_widget(summary, summary_area);

    let m = &report.metrics;
    let rate = m.success_rate_display();
    let rate = if m.success_rate().is_some() {
        format!("{}%", rate)
    } else {
        rate
    };
    let metrics_lines = vec![
        Line::from(vec![
            Span::raw("Total Tasks:     "),
            Span::styled(m.total_tasks.to_string(), Style::default().fg(Color::Cyan)),
        ]),
        Line::from(vec![
            Span::raw("Completed:       "),
            Span::styled(m.completed.to_string(), Style::default().fg(Color::Green)),
        ]),
        Line::from(vec![
            Span::raw("Failed:          "),
            Span::styled(
                m.failed.to_string(),
                Style::default().fg(if m.failed > 0 { Color::Red } else { Color::Gray }),
            ),
        ]),
        Line::from(vec![
            Span::raw("Pending:         "),
            Span::styled(m.pending.to_string(), Style::default().fg(Color::Yellow)),
        ]),
        Line::from(vec![
            Span::raw("Success Rate:    "),
            Span::styled(rate, Style::default().fg(Color::Cyan)),
        ]),
        Line::from(vec![
            Span::raw("Avg Duration:    "),
            Span::styled(m.avg_duration_display(), Style::default().fg(Color::Cyan)),
        ]),
        Line::from(vec![
            Span::raw("Recent Tasks:    "),
            Span::styled(m.recent_tasks.len().to_string(), Style::default().fg(Color::Cyan)),
        ]),
    ];
    let metrics = Paragraph::new(metrics_lines)
        .block(Block::default().borders(Borders::ALL).title(" Metrics "));
    frame.render_widget(metrics, metrics_area);

    let rows: Vec<Row> = m
        .top_failures()
        .into_iter()
        .map(|(kind, count)| {
            Row::new(vec![
                Cell::from(kind.to_string()),
                Cell::from(count.to_string()).style(Style::default().fg(Color::Red)),
            ])
        })
        .collect();
    let failures = Table::new(rows, [Constraint::Min(20), Constraint::Length(8)])
        .header(
            Row::new(vec![Cell::from("Failure"), Cell::from("Count")])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Failure Distribution "),
        );
    frame.render_widget(failures, failures_area);
}

/// Render the footer with status message.
fn render_footer(frame: &mut Frame, area: Rect, state: &UiState) {
    let status = state.status_message();
    let status_style = if state.last_error.is_some() {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::Green)
    };

    let help = match state.current_view {
        View::Run if state.input_focused => " Enter: submit | Esc: leave editor ",
        View::Run => " i: edit intent | j/k: scroll logs | Tab: next view | q: quit ",
        View::Tasks => " j/k: navigate | r: refresh | Tab: next view | q: quit ",
        View::Report => " r: refresh | Tab: next view | q: quit ",
    };

    let footer = Line::from(vec![
        Span::styled(status, status_style),
        Span::raw(" | "),
        Span::styled(help, Style::default().fg(Color::DarkGray)),
    ]);

    frame.render_widget(Paragraph::new(footer), area);
}
