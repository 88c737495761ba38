//! Rendering: converts the session state into terminal lines.
//!
//! Visual conventions:
//! - User messages: `> ` prefix in cyan
//! - Agent messages: `[sender]` tag in green
//! - System errors: yellow
//! - Activity block: `⏺` bullets with status glyphs, collapsible
//! - Query/sandbox results: bordered panels below the conversation

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use crate::queries::QueryStatus;
use crate::sandbox::SandboxOutcome;
use crate::session::timeline::{ActivityBlock, StepStatus, StreamEntry};
use crate::session::Role;

use super::app::App;

pub fn render(f: &mut Frame, app: &mut App) {
    let area = f.area();

    let query_height = panel_height(
        app.session.queries.panel_visible,
        app.session.queries.panel_collapsed,
        8,
    );
    let sandbox_height = panel_height(
        app.session.sandbox.panel_visible,
        app.session.sandbox.panel_collapsed,
        6,
    );

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(query_height),
            Constraint::Length(sandbox_height),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(area);

    render_conversation(f, app, chunks[0]);
    if query_height > 0 {
        render_query_panel(f, app, chunks[1]);
    }
    if sandbox_height > 0 {
        render_sandbox_panel(f, app, chunks[2]);
    }
    render_input(f, app, chunks[3]);
    render_status(f, app, chunks[4]);
}

fn panel_height(visible: bool, collapsed: bool, full: u16) -> u16 {
    match (visible, collapsed) {
        (false, _) => 0,
        (true, true) => 1,
        (true, false) => full,
    }
}

fn render_conversation(f: &mut Frame, app: &App, area: Rect) {
    let mut lines = Vec::new();
    for logo_line in App::logo_lines() {
        lines.push(Line::styled(
            logo_line,
            Style::default().fg(Color::Magenta),
        ));
    }
    lines.push(Line::raw(""));
    lines.extend(conversation_lines(&app.session));

    // Scroll from the bottom: offset 0 shows the newest lines.
    let visible = area.height as usize;
    let total = lines.len();
    let max_offset = total.saturating_sub(visible);
    let offset = app.scroll_offset.min(max_offset);
    let end = total - offset;
    let start = end.saturating_sub(visible);
    let window: Vec<Line<'static>> = lines.drain(..).skip(start).take(end - start).collect();

    let para = Paragraph::new(window).wrap(Wrap { trim: false });
    f.render_widget(para, area);
}

/// Messages and the activity block, merged into one stream ordered by
/// time. The block sorts by `last_activity`, so it migrates downward as
/// new steps arrive.
fn conversation_lines(session: &crate::session::ChatSession) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut activity_rendered = false;

    for msg in &session.messages {
        if let (false, Some(block)) = (activity_rendered, session.activity.as_ref()) {
            if block.last_activity <= msg.timestamp {
                lines.extend(render_activity(block, session.processing));
                lines.push(Line::raw(""));
                activity_rendered = true;
            }
        }
        lines.extend(render_message(&msg.sender, &msg.content));
        lines.push(Line::raw(""));
    }

    if let (Some(block), false) = (session.activity.as_ref(), activity_rendered) {
        lines.extend(render_activity(block, session.processing));
        lines.push(Line::raw(""));
    }

    lines
}

fn render_message(sender: &Role, content: &str) -> Vec<Line<'static>> {
    match sender {
        Role::User => content
            .lines()
            .enumerate()
            .map(|(i, l)| {
                let prefix = if i == 0 { "> " } else { "  " };
                Line::from(vec![
                    Span::styled(
                        prefix,
                        Style::default()
                            .fg(Color::Cyan)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(l.to_string()),
                ])
            })
            .collect(),
        Role::SystemError => content
            .lines()
            .map(|l| Line::styled(l.to_string(), Style::default().fg(Color::Yellow)))
            .collect(),
        other => {
            let tag = Span::styled(
                format!("[{}] ", other),
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            );
            let mut out = Vec::new();
            for (i, l) in content.lines().enumerate() {
                if i == 0 {
                    out.push(Line::from(vec![tag.clone(), Span::raw(l.to_string())]));
                } else {
                    out.push(Line::raw(l.to_string()));
                }
            }
            if out.is_empty() {
                out.push(Line::from(vec![tag]));
            }
            out
        }
    }
}

fn render_activity(block: &ActivityBlock, processing: bool) -> Vec<Line<'static>> {
    let pending = block.pending_count();
    let header_label = if processing || pending > 0 {
        format!("⏺ Working… ({} steps)", block.stream.len())
    } else {
        format!("⏺ Activity ({} steps)", block.stream.len())
    };
    let mut lines = vec![Line::styled(
        header_label,
        Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD),
    )];

    if block.collapsed {
        lines.push(Line::styled(
            "  ⎿ collapsed (/collapse to expand)",
            Style::default().fg(Color::DarkGray),
        ));
        return lines;
    }

    for entry in &block.stream {
        match entry {
            StreamEntry::Thinking(step) => {
                for (i, l) in step.text.lines().enumerate() {
                    let prefix = if i == 0 { "  ✱ " } else { "    " };
                    lines.push(Line::styled(
                        format!("{prefix}{l}"),
                        Style::default()
                            .fg(Color::DarkGray)
                            .add_modifier(Modifier::ITALIC),
                    ));
                }
            }
            StreamEntry::ToolCall(call) => {
                let (glyph, color) = match call.status {
                    StepStatus::Pending => ("…", Color::Yellow),
                    StepStatus::Success => ("✓", Color::Green),
                    StepStatus::Error => ("✗", Color::Red),
                };
                lines.push(Line::from(vec![
                    Span::styled(format!("  {glyph} "), Style::default().fg(color)),
                    Span::styled(
                        call.function_name.clone(),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(
                        format!(" {}", call.display_text),
                        Style::default().fg(Color::DarkGray),
                    ),
                ]));
                if let Some(err) = &call.error_message {
                    lines.push(Line::styled(
                        format!("    ⎿ {err}"),
                        Style::default().fg(Color::Red),
                    ));
                }
            }
        }
    }
    lines
}

fn render_query_panel(f: &mut Frame, app: &App, area: Rect) {
    let tracker = &app.session.queries;

    if tracker.panel_collapsed {
        let summary = format!("▸ Queries ({})", tracker.executions.len());
        f.render_widget(
            Paragraph::new(Line::styled(summary, Style::default().fg(Color::Blue))),
            area,
        );
        return;
    }

    // Tab row: one tab per execution, the active one highlighted.
    let mut tabs: Vec<Span<'static>> = Vec::new();
    for (i, exec) in tracker.executions.iter().enumerate() {
        let active = tracker.active_id.as_deref() == Some(exec.id.as_str());
        let style = if active {
            Style::default().fg(Color::Black).bg(Color::Blue)
        } else {
            Style::default().fg(Color::Blue)
        };
        tabs.push(Span::styled(format!(" Query {} ", i + 1), style));
        tabs.push(Span::raw(" "));
    }

    let mut lines = vec![Line::from(tabs)];
    if let Some(exec) = tracker
        .active_id
        .as_deref()
        .and_then(|id| tracker.get(id))
        .or_else(|| tracker.executions.first())
    {
        lines.push(Line::styled(
            exec.query.clone(),
            Style::default().add_modifier(Modifier::ITALIC),
        ));
        match exec.status {
            QueryStatus::Pending => {
                lines.push(Line::styled("Running…", Style::default().fg(Color::Yellow)));
            }
            QueryStatus::Error => {
                let details = exec.error_details.as_deref().unwrap_or("unknown error");
                lines.push(Line::styled(
                    format!("Error: {details}"),
                    Style::default().fg(Color::Red),
                ));
            }
            QueryStatus::Success => {
                let records = exec.records.as_deref().unwrap_or(&[]);
                lines.push(Line::styled(
                    format!("{} record(s)", records.len()),
                    Style::default().fg(Color::Green),
                ));
                for record in records.iter().take(3) {
                    lines.push(Line::styled(
                        record.to_string(),
                        Style::default().fg(Color::DarkGray),
                    ));
                }
            }
        }
    }

    let block = Block::default().borders(Borders::ALL).title(" Query Results ");
    f.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: false }), area);
}

fn render_sandbox_panel(f: &mut Frame, app: &App, area: Rect) {
    let tracker = &app.session.sandbox;

    if tracker.panel_collapsed {
        f.render_widget(
            Paragraph::new(Line::styled(
                "▸ Graph Preview",
                Style::default().fg(Color::Blue),
            )),
            area,
        );
        return;
    }

    let mut lines = Vec::new();
    if tracker.loading {
        lines.push(Line::styled(
            "Deploying graph preview…",
            Style::default().fg(Color::Yellow),
        ));
    }
    match &tracker.result {
        Some(SandboxOutcome::Success(ok)) => {
            lines.push(Line::from(vec![
                Span::raw("Preview ready: "),
                Span::styled(
                    ok.url.clone(),
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::UNDERLINED),
                ),
            ]));
            lines.push(Line::styled(
                format!("sandbox {}", ok.sandbox_id),
                Style::default().fg(Color::DarkGray),
            ));
        }
        Some(SandboxOutcome::Failure(err)) => {
            lines.push(Line::styled(
                format!("Sandbox error: {}", err.error),
                Style::default().fg(Color::Red),
            ));
            if let Some(details) = &err.details {
                lines.push(Line::styled(
                    details.clone(),
                    Style::default().fg(Color::DarkGray),
                ));
            }
        }
        None => {}
    }

    let block = Block::default().borders(Borders::ALL).title(" Graph Preview ");
    f.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: false }), area);
}

fn render_input(f: &mut Frame, app: &App, area: Rect) {
    let line = Line::from(vec![
        Span::styled(
            "❯ ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(app.input.clone()),
        Span::styled("▌", Style::default().fg(Color::Cyan)),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let mut spans = Vec::new();
    if !app.connected {
        spans.push(Span::styled(
            " disconnected ",
            Style::default().fg(Color::Black).bg(Color::Red),
        ));
    } else if app.session.processing {
        spans.push(Span::styled(
            " thinking… ",
            Style::default().fg(Color::Black).bg(Color::Yellow),
        ));
    } else {
        spans.push(Span::styled(
            " ready ",
            Style::default().fg(Color::Black).bg(Color::Green),
        ));
    }
    spans.push(Span::styled(
        "  /quit  /collapse  /clear-queries  /clear-sandbox  ↑/↓ scroll",
        Style::default().fg(Color::DarkGray),
    ));
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

#[cfg(test)]
mod tests {
    use super::conversation_lines;
    use crate::session::timeline::ActivityBlock;
    use crate::session::{ChatSession, Message, Role};
    use ratatui::text::Line;

    fn flatten(line: &Line<'_>) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    fn find_line(lines: &[Line<'_>], needle: &str) -> usize {
        lines
            .iter()
            .position(|l| flatten(l).contains(needle))
            .unwrap_or_else(|| panic!("no line containing {needle:?}"))
    }

    #[test]
    fn activity_block_sorts_by_last_activity() {
        let mut s = ChatSession::new();
        s.messages = vec![
            Message {
                sender: Role::User,
                content: "first question".to_string(),
                timestamp: 100,
            },
            Message {
                sender: Role::Agent,
                content: "final answer".to_string(),
                timestamp: 300,
            },
        ];
        let mut block = ActivityBlock::new(100);
        block.push_thinking("early step".to_string(), 120);
        block.push_thinking("late step".to_string(), 200);
        s.activity = Some(block);

        let lines = conversation_lines(&s);
        let first = find_line(&lines, "first question");
        let header = find_line(&lines, "⏺");
        let answer = find_line(&lines, "final answer");
        // last_activity (200) places the block between the two messages,
        // not at its first step's position.
        assert!(first < header, "block rendered before the first message");
        assert!(header < answer, "block rendered after the final message");
    }

    #[test]
    fn block_newer_than_every_message_renders_last() {
        let mut s = ChatSession::new();
        s.messages = vec![Message {
            sender: Role::User,
            content: "only message".to_string(),
            timestamp: 100,
        }];
        let mut block = ActivityBlock::new(100);
        block.push_thinking("step".to_string(), 500);
        s.activity = Some(block);

        let lines = conversation_lines(&s);
        assert!(find_line(&lines, "only message") < find_line(&lines, "⏺"));
    }
}
