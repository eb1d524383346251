use std::collections::BTreeSet;

use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap},
};
use serde_json::Value;
use strata_app::{
    App, Focus, IMPORT_FIELDS, InitState, ItemStatus, OperationState, ResourceItem, Selector,
    ToastLevel, UiState, ViewMode,
};
use strata_engine::{PropertyMap, Severity, StepOp};

/// Scroll offsets that survive between frames.
#[derive(Debug, Default, Clone)]
pub struct DrawState {
    list_offset: usize,
    history_offset: usize,
}

fn ensure_visible_row(offset: &mut usize, selected_row: usize, height: usize) {
    if height == 0 {
        return;
    }
    let bottom = *offset + height.saturating_sub(1);
    if selected_row < *offset {
        *offset = selected_row;
    } else if selected_row > bottom {
        *offset = selected_row.saturating_sub(height.saturating_sub(1));
    }
}

fn highlight() -> Style {
    Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD)
}

fn dim() -> Style {
    Style::default().fg(Color::DarkGray)
}

pub fn draw_ui(frame: &mut Frame<'_>, app: &App, state: &mut DrawState) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(2),
            Constraint::Min(5),
            Constraint::Length(4),
        ])
        .split(frame.area());

    draw_header(frame, layout[0], app);
    draw_tabs(frame, layout[1], app.ui());
    match app.ui().view {
        ViewMode::History => draw_history(frame, layout[2], app.ui(), state),
        _ => draw_resources(frame, layout[2], app, state),
    }
    draw_footer(frame, layout[3], app);

    for focus in app.ui().focus.iter() {
        draw_overlay(frame, focus, app);
    }
    draw_toasts(frame, app.ui());
}

fn draw_header(frame: &mut Frame<'_>, area: Rect, app: &App) {
    let ui = app.ui();
    let mut spans = vec![Span::styled("strata", highlight())];
    let project = ui
        .project
        .as_ref()
        .map(|project| project.name.as_str())
        .unwrap_or_else(|| app.context().program_name());
    if !project.is_empty() {
        spans.push(Span::raw(format!("  {project}")));
    }
    spans.push(Span::styled(
        format!("  {}", app.context().stack().unwrap_or("no stack")),
        Style::default().fg(Color::Yellow),
    ));
    if let Some(whoami) = &ui.whoami {
        spans.push(Span::styled(format!("  {}", whoami.user), dim()));
    }
    if app.state().init_state != InitState::Complete {
        spans.push(Span::styled(format!("  {}", app.state().init_state), dim()));
    }
    if app.is_working() {
        spans.push(Span::styled(
            format!("  {}", ui.spinner()),
            Style::default().fg(Color::Magenta),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_tabs(frame: &mut Frame<'_>, area: Rect, ui: &UiState) {
    let titles = ViewMode::ALL
        .iter()
        .map(|view| Line::from(view.title()))
        .collect::<Vec<_>>();
    let selected = ViewMode::ALL
        .iter()
        .position(|view| *view == ui.view)
        .unwrap_or(0);
    let tabs = Tabs::new(titles)
        .block(Block::default().borders(Borders::BOTTOM))
        .select(selected)
        .highlight_style(highlight());
    frame.render_widget(tabs, area);
}

fn op_style(op: StepOp) -> Style {
    let color = match op {
        StepOp::Create => Color::Green,
        StepOp::Update => Color::Yellow,
        StepOp::Delete => Color::Red,
        StepOp::Replace => Color::Magenta,
        StepOp::Refresh => Color::Blue,
        StepOp::Same => Color::DarkGray,
    };
    Style::default().fg(color)
}

fn status_span(status: ItemStatus) -> Span<'static> {
    match status {
        ItemStatus::None => Span::raw(""),
        ItemStatus::Pending => Span::styled(" …", dim()),
        ItemStatus::Running => Span::styled(" ⟳", Style::default().fg(Color::Yellow)),
        ItemStatus::Success => Span::styled(" ✓", Style::default().fg(Color::Green)),
        ItemStatus::Failed => Span::styled(" ✗", Style::default().fg(Color::Red)),
    }
}

fn resource_line(app: &App, item: &ResourceItem, depth: usize, marker: &str) -> Line<'static> {
    let mut spans = vec![
        Span::raw("  ".repeat(depth)),
        Span::styled(marker.to_string(), Style::default().fg(Color::Yellow)),
        Span::styled(format!("{:<2} ", item.op.symbol()), op_style(item.op)),
        Span::raw(item.name.clone()),
        Span::styled(format!("  {}", item.resource_type), dim()),
    ];
    let flags = app.state().flags_for(&item.urn);
    for (set, label, color) in [
        (flags.target, " [T]", Color::Cyan),
        (flags.replace, " [R]", Color::Magenta),
        (flags.exclude, " [E]", Color::Red),
    ] {
        if set {
            spans.push(Span::styled(label, Style::default().fg(color)));
        }
    }
    if item.protect {
        spans.push(Span::styled(" [protected]", Style::default().fg(Color::Blue)));
    }
    spans.push(status_span(item.status));
    Line::from(spans)
}

fn draw_resources(frame: &mut Frame<'_>, area: Rect, app: &App, state: &mut DrawState) {
    let ui = app.ui();
    let rows = ui.rows();
    let (start, end) = ui.selection_range();

    let items = rows
        .iter()
        .enumerate()
        .filter_map(|(position, row)| {
            let item = ui.item_at(row)?;
            let marker = match (row.is_branch, row.is_expanded) {
                (true, true) => "▼ ",
                (true, false) => "▶ ",
                (false, _) => "  ",
            };
            let line = resource_line(app, item, row.depth, marker);
            let selected = ui.is_visual() && (start..=end).contains(&position);
            Some(match selected {
                true => ListItem::new(line).style(Style::default().bg(Color::DarkGray)),
                false => ListItem::new(line),
            })
        })
        .collect::<Vec<_>>();

    let title = match ui.view {
        ViewMode::Preview | ViewMode::Execute => match app.state().operation {
            Some(kind) => format!("{} {kind} ({})", ui.view.title(), op_state_label(app)),
            None => ui.view.title().to_string(),
        },
        _ => format!("{} ({})", ui.view.title(), rows.len()),
    };

    if items.is_empty() {
        let text = match ui.view {
            ViewMode::Stack => "no resources",
            _ => "no operation yet",
        };
        let para = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title(title))
            .alignment(Alignment::Center);
        frame.render_widget(para, area);
        return;
    }

    let cursor = ui.cursor.min(rows.len().saturating_sub(1));
    ensure_visible_row(
        &mut state.list_offset,
        cursor,
        area.height.saturating_sub(2) as usize,
    );
    let mut list_state = ListState::default();
    list_state.select(Some(cursor));
    *list_state.offset_mut() = state.list_offset;

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(highlight());
    frame.render_stateful_widget(list, area, &mut list_state);
}

fn draw_history(frame: &mut Frame<'_>, area: Rect, ui: &UiState, state: &mut DrawState) {
    let title = format!("history, page {}", ui.history_page.max(1));
    if ui.history.is_empty() {
        let text = match ui.history_loading {
            true => "loading history...",
            false => "no updates",
        };
        let para = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title(title))
            .alignment(Alignment::Center);
        frame.render_widget(para, area);
        return;
    }

    let items = ui
        .history
        .iter()
        .map(|entry| {
            let result_style = match entry.result.as_str() {
                "succeeded" => Style::default().fg(Color::Green),
                "failed" => Style::default().fg(Color::Red),
                _ => Style::default().fg(Color::Yellow),
            };
            let changes = entry
                .resource_changes
                .iter()
                .map(|(op, count)| format!("{op}:{count}"))
                .collect::<Vec<_>>()
                .join(" ");
            ListItem::new(Line::from(vec![
                Span::raw(format!("#{:<5}", entry.version)),
                Span::raw(format!("{:<9}", entry.kind)),
                Span::styled(format!("{:<11}", entry.result), result_style),
                Span::styled(entry.start_time.clone().unwrap_or_default(), dim()),
                Span::raw(format!("  {changes}")),
                Span::styled(
                    entry
                        .message
                        .as_ref()
                        .map(|message| format!("  {message}"))
                        .unwrap_or_default(),
                    dim(),
                ),
            ]))
        })
        .collect::<Vec<_>>();

    let cursor = ui.history_cursor.min(ui.history.len() - 1);
    ensure_visible_row(
        &mut state.history_offset,
        cursor,
        area.height.saturating_sub(2) as usize,
    );
    let mut list_state = ListState::default();
    list_state.select(Some(cursor));
    *list_state.offset_mut() = state.history_offset;

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(highlight());
    frame.render_stateful_widget(list, area, &mut list_state);
}

fn op_state_label(app: &App) -> &'static str {
    match app.state().op_state {
        OperationState::Idle => "idle",
        OperationState::Starting => "starting",
        OperationState::Running => "running",
        OperationState::Cancelling => "cancelling",
        OperationState::Complete => "complete",
        OperationState::Error => "failed",
    }
}

fn hints(focus: Focus) -> &'static str {
    match focus {
        Focus::Main => {
            "j/k move  space fold  u/r/d preview  ^u/^r/^d run  T/R/E flag  s stacks  h history  ? help  q quit"
        }
        Focus::ErrorModal => "Esc close  w workspaces  s stacks",
        Focus::ConfirmModal => "y confirm  n cancel",
        Focus::ImportModal => "Tab next field  Enter import  Esc cancel",
        Focus::StackInitModal => "Enter create  Esc cancel",
        Focus::WorkspaceSelector => "j/k move  Enter select  Esc close",
        Focus::StackSelector => "j/k move  Enter select  n new stack  Esc close",
        Focus::Help => "Esc close",
        Focus::Details => "Esc close",
    }
}

fn draw_footer(frame: &mut Frame<'_>, area: Rect, app: &App) {
    let ui = app.ui();
    let state = app.state();

    let status = match (state.busy_reason(), state.operation) {
        (Some(reason), _) => Span::styled(format!("{reason}..."), Style::default().fg(Color::Yellow)),
        (None, Some(kind)) if state.op_state != OperationState::Idle => Span::styled(
            format!("{kind}: {}", op_state_label(app)),
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ),
        _ => Span::styled(
            state.init_state.to_string(),
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ),
    };

    let detail = match (&ui.operation_error, ui.diagnostics.back()) {
        (Some(error), _) => Span::styled(error.clone(), Style::default().fg(Color::Red)),
        (None, Some(diagnostic)) => {
            let color = match diagnostic.severity {
                Severity::Error => Color::Red,
                Severity::Warning => Color::Yellow,
                Severity::Info | Severity::Debug => Color::Gray,
            };
            Span::styled(diagnostic.message.clone(), Style::default().fg(color))
        }
        (None, None) => Span::raw(""),
    };

    let lines = vec![
        Line::from(status),
        Line::from(detail),
        Line::from(Span::styled(hints(ui.focus.top()), dim())),
    ];
    let para = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::TOP))
        .wrap(Wrap { trim: true });
    frame.render_widget(para, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn draw_modal(frame: &mut Frame<'_>, area: Rect, title: &str, color: Color, text: Text<'_>) {
    frame.render_widget(Clear, area);
    let para = Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color))
                .title(title.to_string()),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(para, area);
}

fn draw_overlay(frame: &mut Frame<'_>, focus: Focus, app: &App) {
    let ui = app.ui();
    let full = frame.area();
    match focus {
        Focus::Main => {}
        Focus::ErrorModal => {
            let message = app.state().err.clone().unwrap_or_default();
            let text = Text::from(vec![
                Line::from(message),
                Line::from(""),
                Line::from(Span::styled(hints(focus), dim())),
            ]);
            draw_modal(frame, centered_rect(60, 40, full), "error", Color::Red, text);
        }
        Focus::ConfirmModal => {
            let Some(confirm) = &ui.confirm else {
                return;
            };
            let text = Text::from(vec![
                Line::from(confirm.message.clone()),
                Line::from(""),
                Line::from(Span::styled(hints(focus), dim())),
            ]);
            draw_modal(frame, centered_rect(50, 30, full), &confirm.title, Color::Yellow, text);
        }
        Focus::ImportModal => {
            let Some(form) = &ui.import else {
                return;
            };
            let mut lines = IMPORT_FIELDS
                .iter()
                .zip(form.fields.iter())
                .enumerate()
                .map(|(index, (label, value))| {
                    let focused = index == form.focused;
                    let cursor = if focused { "▏" } else { "" };
                    Line::from(vec![
                        Span::styled(
                            format!("{label:>11}: "),
                            if focused { highlight() } else { dim() },
                        ),
                        Span::raw(format!("{value}{cursor}")),
                    ])
                })
                .collect::<Vec<_>>();
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(hints(focus), dim())));
            draw_modal(frame, centered_rect(60, 35, full), "import", Color::Cyan, Text::from(lines));
        }
        Focus::StackInitModal => {
            let text = Text::from(vec![
                Line::from(vec![
                    Span::styled("stack name: ", highlight()),
                    Span::raw(format!("{}▏", ui.stack_name_input)),
                ]),
                Line::from(""),
                Line::from(Span::styled(hints(focus), dim())),
            ]);
            draw_modal(frame, centered_rect(50, 25, full), "new stack", Color::Cyan, text);
        }
        Focus::WorkspaceSelector => draw_selector(
            frame,
            "workspaces",
            &ui.workspaces,
            |workspace| {
                let marker = if workspace.current { "* " } else { "  " };
                format!("{marker}{}  {}", workspace.name, workspace.path.display())
            },
        ),
        Focus::StackSelector => draw_selector(frame, "stacks", &ui.stacks, |stack| {
            let marker = if stack.current { "* " } else { "  " };
            let mut label = format!("{marker}{}", stack.name);
            if let Some(count) = stack.resource_count {
                label.push_str(&format!("  {count} resources"));
            }
            if let Some(last_update) = &stack.last_update {
                label.push_str(&format!("  {last_update}"));
            }
            if stack.update_in_progress {
                label.push_str("  (updating)");
            }
            label
        }),
        Focus::Help => {
            let lines = HELP
                .iter()
                .map(|(keys, action)| {
                    Line::from(vec![
                        Span::styled(format!("{keys:>12}  "), highlight()),
                        Span::raw(*action),
                    ])
                })
                .collect::<Vec<_>>();
            draw_modal(frame, centered_rect(60, 80, full), "keys", Color::Cyan, Text::from(lines));
        }
        Focus::Details => {
            let Some(item) = ui.selected_item() else {
                return;
            };
            let operation_view = matches!(ui.view, ViewMode::Preview | ViewMode::Execute);
            draw_modal(
                frame,
                centered_rect(80, 80, full),
                &item.name,
                Color::Cyan,
                details_text(item, operation_view),
            );
        }
    }
}

const HELP: [(&str, &str); 18] = [
    ("j/k", "move"),
    ("space", "fold or unfold children"),
    ("enter", "details"),
    ("v", "visual selection"),
    ("u r d", "preview up, refresh, destroy"),
    ("^u ^r ^d", "run up, refresh, destroy"),
    ("esc", "cancel operation, leave visual, back to resources"),
    ("T R E", "mark target, replace, exclude"),
    ("C", "clear marks"),
    ("x", "delete from state"),
    ("P", "toggle protect"),
    ("I", "import"),
    ("[ ]", "history pages"),
    ("y", "copy urn"),
    ("s", "stacks"),
    ("w", "workspaces"),
    ("A", "refresh credentials"),
    ("h", "history"),
];

fn draw_selector<T>(
    frame: &mut Frame<'_>,
    title: &str,
    selector: &Selector<T>,
    label: impl Fn(&T) -> String,
) {
    let area = centered_rect(60, 50, frame.area());
    frame.render_widget(Clear, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title.to_string());

    let message = match (&selector.error, selector.loading) {
        (Some(error), _) => Some(Span::styled(error.clone(), Style::default().fg(Color::Red))),
        (None, true) => Some(Span::styled("loading...", dim())),
        (None, false) if selector.items.is_empty() => Some(Span::styled("nothing found", dim())),
        _ => None,
    };
    if let Some(message) = message {
        frame.render_widget(Paragraph::new(Line::from(message)).block(block), area);
        return;
    }

    let items = selector
        .items
        .iter()
        .map(|item| ListItem::new(label(item)))
        .collect::<Vec<_>>();
    let mut list_state = ListState::default();
    list_state.select(Some(selector.selected));
    let list = List::new(items).block(block).highlight_style(highlight());
    frame.render_stateful_widget(list, area, &mut list_state);
}

fn details_text(item: &ResourceItem, operation_view: bool) -> Text<'static> {
    let mut lines = vec![
        Line::from(vec![Span::styled("urn   ", dim()), Span::raw(item.urn.to_string())]),
        Line::from(vec![
            Span::styled("type  ", dim()),
            Span::raw(item.resource_type.clone()),
        ]),
    ];
    if let Some(id) = &item.id {
        lines.push(Line::from(vec![Span::styled("id    ", dim()), Span::raw(id.clone())]));
    }
    if item.protect {
        lines.push(Line::from(Span::styled("protected", Style::default().fg(Color::Blue))));
    }
    if operation_view {
        lines.push(Line::from(vec![
            Span::styled("op    ", dim()),
            Span::styled(item.op.to_string(), op_style(item.op)),
        ]));
    }
    if let Some(message) = &item.message {
        lines.push(Line::from(Span::styled(message.clone(), Style::default().fg(Color::Red))));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled("inputs", highlight())));
    let old = match operation_view {
        true => item.old_inputs.as_ref(),
        false => item.inputs.as_ref(),
    };
    lines.extend(diff_lines(old, item.inputs.as_ref()).iter().map(DiffLine::to_line));

    if let Some(outputs) = &item.outputs {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("outputs", highlight())));
        lines.extend(
            diff_lines(Some(outputs), Some(outputs))
                .iter()
                .map(DiffLine::to_line),
        );
    }
    Text::from(lines)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    Same,
    Added,
    Removed,
    Changed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: DiffKind,
    pub key: String,
    pub text: String,
}

impl DiffLine {
    fn to_line(&self) -> Line<'static> {
        let (prefix, style) = match self.kind {
            DiffKind::Same => ("  ", Style::default()),
            DiffKind::Added => ("+ ", Style::default().fg(Color::Green)),
            DiffKind::Removed => ("- ", Style::default().fg(Color::Red)),
            DiffKind::Changed => ("~ ", Style::default().fg(Color::Yellow)),
        };
        Line::from(Span::styled(
            format!("{prefix}{}: {}", self.key, self.text),
            style,
        ))
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Top-level property diff, keys sorted.
pub fn diff_lines(old: Option<&PropertyMap>, new: Option<&PropertyMap>) -> Vec<DiffLine> {
    let keys: BTreeSet<&String> = old
        .into_iter()
        .chain(new)
        .flat_map(|map| map.keys())
        .collect();

    keys.into_iter()
        .filter_map(|key| {
            let before = old.and_then(|map| map.get(key));
            let after = new.and_then(|map| map.get(key));
            let (kind, text) = match (before, after) {
                (Some(before), Some(after)) if before == after => {
                    (DiffKind::Same, render_value(after))
                }
                (Some(before), Some(after)) => (
                    DiffKind::Changed,
                    format!("{} => {}", render_value(before), render_value(after)),
                ),
                (None, Some(after)) => (DiffKind::Added, render_value(after)),
                (Some(before), None) => (DiffKind::Removed, render_value(before)),
                (None, None) => return None,
            };
            Some(DiffLine {
                kind,
                key: key.clone(),
                text,
            })
        })
        .collect()
}

fn draw_toasts(frame: &mut Frame<'_>, ui: &UiState) {
    let full = frame.area();
    let width = (full.width / 3).max(20).min(full.width);
    for (row, toast) in ui.toasts.iter().rev().take(5).enumerate() {
        let y = full.y + 1 + row as u16;
        if y >= full.bottom() {
            break;
        }
        let area = Rect::new(full.right().saturating_sub(width), y, width, 1);
        let color = match toast.level {
            ToastLevel::Info => Color::Cyan,
            ToastLevel::Success => Color::Green,
            ToastLevel::Warning => Color::Yellow,
            ToastLevel::Error => Color::Red,
        };
        frame.render_widget(Clear, area);
        frame.render_widget(
            Paragraph::new(Span::styled(
                toast.message.clone(),
                Style::default().fg(Color::Black).bg(color),
            )),
            area,
        );
    }
}
