//! TUI rendering functions

use super::app::{DetailTab, InputMode, TuiApp, View};
use crate::inspector::body::{self, RenderedBody, StatusClass};
use crate::inspector::{RequestResponse, Snapshot};
use crate::transport::ReadyState;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        Block, Borders, Cell, Paragraph, Row, Scrollbar, ScrollbarOrientation, ScrollbarState,
        Table, TableState, Tabs, Wrap,
    },
    Frame,
};
use tunnelscope_common::{Headers, Method, ProtocolError, RequestPayload};

/// Draw the TUI
pub fn draw(frame: &mut Frame, app: &mut TuiApp) {
    let snapshot = app.session.snapshot();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // Header with tunnel info
            Constraint::Length(1), // Summary row
            Constraint::Length(1), // Filter bar
            Constraint::Min(5),    // Requests (+ detail)
            Constraint::Length(1), // Footer
        ])
        .split(frame.area());

    draw_header(frame, app, chunks[0]);
    draw_summary_row(frame, app, chunks[1]);
    draw_filter_bar(frame, app, chunks[2]);

    let selected = app
        .session
        .selected_index()
        .and_then(|i| snapshot.pairs.get(i));

    match (app.view, selected) {
        (View::Detail, Some(pair)) => {
            let panes = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
                .split(chunks[3]);
            draw_requests(frame, app, &snapshot, panes[0], true);
            draw_detail(frame, app, pair, panes[1]);
        }
        _ => draw_requests(frame, app, &snapshot, chunks[3], false),
    }

    draw_footer(frame, app, chunks[4]);
}

/// Draw the header with connection state and tunnel info
fn draw_header(frame: &mut Frame, app: &TuiApp, area: Rect) {
    let state = app.session.ready_state();
    let status_color = match state {
        ReadyState::Open => Color::Green,
        ReadyState::Connecting => Color::Yellow,
        ReadyState::Closing | ReadyState::Closed => Color::Red,
    };

    let max_url_len = (area.width as usize).saturating_sub(20);
    let tunnel_url = app.session.tunnel_url().unwrap_or("loading...");

    let lines = vec![
        Line::from(vec![
            Span::styled("● ", Style::default().fg(status_color)),
            Span::styled("TUNNELSCOPE", Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
            Span::styled(format!("  v{}", app.version), Style::default().fg(Color::DarkGray)),
        ]),
        Line::from(vec![
            Span::styled("Session Status  ", Style::default().fg(Color::DarkGray)),
            Span::styled(
                state.as_str(),
                Style::default().fg(status_color).add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::styled("Forwarding      ", Style::default().fg(Color::DarkGray)),
            Span::styled(truncate_str(tunnel_url, max_url_len), Style::default().fg(Color::Green)),
        ]),
        Line::from(vec![
            Span::styled("Inspector       ", Style::default().fg(Color::DarkGray)),
            Span::styled(
                truncate_str(&app.inspect_url, max_url_len),
                Style::default().fg(Color::Magenta),
            ),
        ]),
    ];

    frame.render_widget(Paragraph::new(lines), area);
}

/// Draw the traffic summary (compact, single line)
fn draw_summary_row(frame: &mut Frame, app: &mut TuiApp, area: Rect) {
    let m = app.session.summary();

    let text = Line::from(vec![
        Span::styled("Reqs ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{} ", m.total_requests), Style::default().fg(Color::White)),
        Span::styled(format!("{}… ", m.in_flight), Style::default().fg(Color::Yellow)),
        Span::styled(format!("{}✗ ", m.errors), Style::default().fg(Color::Red)),
        Span::styled("│ ", Style::default().fg(Color::DarkGray)),
        Span::styled("WS ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{} ", m.websockets), Style::default().fg(Color::White)),
        Span::styled(format!("({} open) ", m.open_websockets), Style::default().fg(Color::DarkGray)),
        Span::styled("│ ", Style::default().fg(Color::DarkGray)),
        Span::styled("p50:", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{}ms ", m.p50_timing_ms), Style::default().fg(Color::White)),
        Span::styled("p90:", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{}ms ", m.p90_timing_ms), Style::default().fg(Color::Yellow)),
        Span::styled("p99:", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{}ms", m.p99_timing_ms), Style::default().fg(Color::Red)),
    ]);

    frame.render_widget(Paragraph::new(text), area);
}

/// Draw method filter, search text and regex flag
fn draw_filter_bar(frame: &mut Frame, app: &TuiApp, area: Rect) {
    let filter = app.session.filter();
    let editing = app.input == InputMode::Search;

    let mut spans = vec![
        Span::styled("Method ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("[{}] ", filter.methods.label()),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled("Search ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            if filter.search.is_empty() && !editing {
                "-".to_string()
            } else {
                filter.search.clone()
            },
            Style::default().fg(Color::White),
        ),
    ];
    if editing {
        spans.push(Span::styled("▏", Style::default().fg(Color::Cyan)));
    }
    if filter.regex {
        spans.push(Span::styled(" (regex)", Style::default().fg(Color::Magenta)));
    }
    if let Some(error) = app.session.filter_error() {
        let message = error.lines().last().unwrap_or(error);
        spans.push(Span::styled(
            format!("  invalid pattern: {}", message.trim()),
            Style::default().fg(Color::Red),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Draw the filtered request list, newest first, with a scrollbar
fn draw_requests(frame: &mut Frame, app: &TuiApp, snapshot: &Snapshot, area: Rect, compact: bool) {
    let fixed_width = if compact { 7 + 6 + 4 } else { 9 + 7 + 6 + 8 + 6 };
    let path_width = (area.width as usize).saturating_sub(fixed_width).max(10);

    let header = Row::new(column_titles(compact).to_vec())
        .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .bottom_margin(0);

    let rows: Vec<Row> = snapshot
        .rows()
        .into_iter()
        .map(|(_, pair)| request_row(pair, path_width, compact))
        .collect();

    let widths: Vec<Constraint> = if compact {
        vec![Constraint::Length(7), Constraint::Min(10), Constraint::Length(4)]
    } else {
        vec![
            Constraint::Length(9),
            Constraint::Length(7),
            Constraint::Min(10),
            Constraint::Length(4),
            Constraint::Length(8),
        ]
    };

    // Split area to leave room for scrollbar
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(area);

    let store = app.session.store();
    let title = if snapshot.visible.len() == store.len() {
        format!(" Requests ({}) ", store.len())
    } else {
        format!(" Requests ({}/{}) ", snapshot.visible.len(), store.len())
    };

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .title(title.clone())
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        )
        .row_highlight_style(Style::default().bg(Color::Rgb(40, 40, 60)));

    let position = app
        .session
        .selected_index()
        .and_then(|index| snapshot.visible.iter().position(|&i| i == index));

    let placeholder = if store.is_empty() {
        Some("No requests")
    } else if app.session.filter().methods.is_empty() {
        Some("All methods hidden, press M to show them")
    } else {
        None
    };

    if let Some(text) = placeholder {
        let empty = Paragraph::new(Line::from(Span::styled(
            text,
            Style::default().fg(Color::DarkGray),
        )))
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        );
        frame.render_widget(empty, chunks[0]);
        return;
    }

    let mut state = TableState::default();
    state.select(position);
    frame.render_stateful_widget(table, chunks[0], &mut state);

    if !snapshot.visible.is_empty() {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("▲"))
            .end_symbol(Some("▼"))
            .track_symbol(Some("│"))
            .thumb_symbol("█");

        let mut scrollbar_state =
            ScrollbarState::new(snapshot.visible.len()).position(position.unwrap_or(0));

        frame.render_stateful_widget(scrollbar, chunks[1], &mut scrollbar_state);
    }
}

/// Column headers of the request table
fn column_titles(compact: bool) -> &'static [&'static str] {
    if compact {
        &["Method", "Path", "Stat"]
    } else {
        &["Time", "Method", "Path", "Stat", "Dur"]
    }
}

fn request_row(pair: &RequestResponse, path_width: usize, compact: bool) -> Row<'static> {
    let request = &pair.request;
    let status = pair.response.as_ref().map(|r| r.status);
    let status_text = if pair.is_pending() {
        "…".to_string()
    } else {
        status.map(|s| s.to_string()).unwrap_or_default()
    };

    let method = Cell::from(format!("{:>6}", truncate_str(request.method.as_str(), 6)))
        .style(method_style(request.method));
    let path = Cell::from(truncate_str(&request.path, path_width));
    let status = Cell::from(status_text).style(status_style(status));

    if compact {
        return Row::new(vec![method, path, status]);
    }

    let timing = pair
        .response
        .as_ref()
        .map(|r| body::format_timing(r.timing))
        .unwrap_or_default();

    Row::new(vec![
        Cell::from(format_timestamp(request)),
        method,
        path,
        status,
        Cell::from(timing),
    ])
}

/// Draw the detail pane for the selected pair
fn draw_detail(frame: &mut Frame, app: &TuiApp, pair: &RequestResponse, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(1),
        ])
        .split(inner);

    let request = &pair.request;
    let status = pair.response.as_ref().map(|r| r.status);
    let mut summary = vec![
        Span::styled(
            format!("{} ", request.method),
            method_style(request.method).add_modifier(Modifier::BOLD),
        ),
        Span::styled(request.path.clone(), Style::default().fg(Color::White)),
        Span::raw("  "),
        Span::styled(
            status.map(|s| s.to_string()).unwrap_or_else(|| "pending".to_string()),
            status_style(status),
        ),
    ];
    if let Some(response) = &pair.response {
        spans_push_dim(&mut summary, format!("  {}", body::format_timing(response.timing)));
    }
    if app.session.raw_body() {
        spans_push_dim(&mut summary, "  [raw]".to_string());
    }
    frame.render_widget(Paragraph::new(Line::from(summary)), chunks[0]);

    let tabs = [DetailTab::Headers, DetailTab::Request, DetailTab::Response];
    let titles: Vec<Line> = tabs
        .iter()
        .map(|tab| {
            let style = if *tab == DetailTab::Response && pair.is_pending() {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default().fg(Color::White)
            };
            Line::from(Span::styled(tab.title(), style))
        })
        .collect();
    let selected_tab = tabs.iter().position(|t| *t == app.tab).unwrap_or(0);
    let tab_bar = Tabs::new(titles)
        .select(selected_tab)
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
    frame.render_widget(tab_bar, chunks[1]);

    let content = match app.tab {
        DetailTab::Headers => {
            let mut lines = header_lines("Request headers", &request.headers);
            if let Some(response) = &pair.response {
                lines.push(Line::from(""));
                lines.extend(header_lines("Response headers", &response.headers));
            }
            lines
        }
        DetailTab::Request => body_lines(&request.headers, request.body_bytes(), app.session.raw_body()),
        DetailTab::Response => match &pair.response {
            Some(response) => {
                body_lines(&response.headers, response.body_bytes(), app.session.raw_body())
            }
            None => vec![Line::from(Span::styled(
                "Waiting for response...",
                Style::default().fg(Color::DarkGray),
            ))],
        },
    };

    frame.render_widget(Paragraph::new(content).wrap(Wrap { trim: false }), chunks[2]);
}

fn spans_push_dim(spans: &mut Vec<Span<'static>>, text: String) {
    spans.push(Span::styled(text, Style::default().fg(Color::DarkGray)));
}

fn header_lines(title: &str, headers: &Headers) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(Span::styled(
        title.to_string(),
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD),
    ))];
    lines.extend(headers.iter().map(|(key, value)| {
        Line::from(vec![
            Span::styled(format!("{}: ", key), Style::default().fg(Color::Cyan)),
            Span::raw(value.clone()),
        ])
    }));
    lines
}

fn body_lines(
    headers: &Headers,
    bytes: Result<Vec<u8>, ProtocolError>,
    raw: bool,
) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let summary = body::content_summary(headers);
    if !summary.is_empty() {
        lines.push(Line::from(Span::styled(summary, Style::default().fg(Color::DarkGray))));
        lines.push(Line::from(""));
    }

    match body::render(headers, bytes, raw) {
        Ok(RenderedBody::Empty) => lines.push(Line::from(Span::styled(
            "(empty body)",
            Style::default().fg(Color::DarkGray),
        ))),
        Ok(RenderedBody::Text(text)) | Ok(RenderedBody::Json(text)) => {
            lines.extend(text.lines().map(|l| Line::from(l.to_string())));
        }
        Ok(RenderedBody::Binary { content_type, len }) => lines.push(Line::from(format!(
            "{} ({})",
            content_type,
            format_size(len)
        ))),
        Err(e) => {
            tracing::debug!("Body could not be rendered: {}", e);
            lines.push(Line::from(Span::styled(
                "Body could not be rendered",
                Style::default().fg(Color::Yellow),
            )));
            lines.push(Line::from(Span::styled(
                format!("{} - press v to view raw", e),
                Style::default().fg(Color::DarkGray),
            )));
        }
    }
    lines
}

/// Draw the footer with key hints
fn draw_footer(frame: &mut Frame, app: &TuiApp, area: Rect) {
    let hints: &[(&str, &str)] = match (app.input, app.view) {
        (InputMode::Search, _) => &[("Enter", " Done  "), ("Ctrl+R", " Regex  "), ("Ctrl+C", " Quit")],
        (_, View::Detail) => &[
            ("Esc", " Back  "),
            ("Tab", " Tabs  "),
            ("v", " Raw  "),
            ("r", " Resend  "),
            ("c", " Clear  "),
            ("q", " Quit"),
        ],
        (_, View::List) => &[
            ("↑/↓", " Navigate  "),
            ("Enter", " Inspect  "),
            ("/", " Search  "),
            ("m", " Method  "),
            ("0-9", " Methods  "),
            ("c", " Clear  "),
            ("o", " Open URL  "),
            ("q", " Quit"),
        ],
    };

    let mut spans: Vec<Span> = hints
        .iter()
        .flat_map(|(key, label)| {
            [
                Span::styled(*key, Style::default().fg(Color::Cyan)),
                Span::styled(*label, Style::default().fg(Color::DarkGray)),
            ]
        })
        .collect();

    if let Some(notice) = &app.notice {
        spans.push(Span::styled(format!("   {}", notice), Style::default().fg(Color::Yellow)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Get style for HTTP method
fn method_style(method: Method) -> Style {
    match method {
        Method::Get => Style::default().fg(Color::Green),
        Method::Post => Style::default().fg(Color::Yellow),
        Method::Put => Style::default().fg(Color::Blue),
        Method::Patch => Style::default().fg(Color::Magenta),
        Method::Delete => Style::default().fg(Color::Red),
        Method::Head => Style::default().fg(Color::Cyan),
        _ => Style::default().fg(Color::White),
    }
}

/// Get style for HTTP status code
fn status_style(status: Option<u16>) -> Style {
    match StatusClass::of(status) {
        StatusClass::Pending => Style::default().fg(Color::DarkGray),
        StatusClass::Informational => Style::default().fg(Color::Blue),
        StatusClass::Success => Style::default().fg(Color::Green),
        StatusClass::Redirect => Style::default().fg(Color::Cyan),
        StatusClass::ClientError => Style::default().fg(Color::Red),
        StatusClass::ServerError => Style::default().fg(Color::Yellow),
        StatusClass::Unknown => Style::default().fg(Color::White),
    }
}

/// Format capture time for display
fn format_timestamp(request: &RequestPayload) -> String {
    request
        .captured_at()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| truncate_str(&request.timestamp, 8))
}

/// Format size in bytes
fn format_size(bytes: usize) -> String {
    if bytes >= 1_000_000 {
        format!("{:.1}MB", bytes as f64 / 1_000_000.0)
    } else if bytes >= 1_000 {
        format!("{:.1}KB", bytes as f64 / 1_000.0)
    } else {
        format!("{}B", bytes)
    }
}

/// Truncate any string to max length (in characters)
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len > 3 {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    } else {
        s.chars().take(max_len).collect()
    }
}
