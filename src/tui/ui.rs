//! UI rendering for the TUI

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
    Frame,
};

use super::app::{App, ConnectionState, Pane};
use super::compose;
use super::help;
use super::messages;
use super::sidebar::{self, SidebarCtx};

/// Returns status indicator symbol, label and color for the connection state
fn status_indicator(state: &ConnectionState) -> (&'static str, &'static str, Color) {
    match state {
        ConnectionState::Connected => ("*", "online", Color::Green),
        ConnectionState::Connecting => ("~", "connecting", Color::Yellow),
        ConnectionState::Disconnected(_) => ("o", "offline", Color::Red),
    }
}

/// Main render function
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    // Layout: header (1 line) + main content + status bar (1 line)
    let [header_area, main_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(header_area, frame.buffer_mut(), app);

    // Split main area: sidebar (26 cols) + content
    let [sidebar_area, content_area] =
        Layout::horizontal([Constraint::Length(26), Constraint::Fill(1)]).areas(main_area);

    let open_id = app.view.conversation_id();
    sidebar::render(
        sidebar_area,
        frame.buffer_mut(),
        &app.sidebar,
        &SidebarCtx {
            user_id: app.view.user_id(),
            open_id,
            presence: app.view.presence(),
            focused: app.active_pane == Pane::Sidebar,
        },
    );

    // Split content area: messages (fill) + compose box (4 lines)
    let [messages_area, compose_area] = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(compose::COMPOSE_HEIGHT),
    ])
    .areas(content_area);

    let title = app.conversation_title();
    // Presence is shown for the other participant of a direct conversation.
    let peer = open_id
        .and_then(|id| app.sidebar.find(id))
        .filter(|c| !c.is_group)
        .and_then(|c| c.other_participant(app.view.user_id()))
        .map(|p| p.id.as_str());
    messages::render(
        messages_area,
        frame.buffer_mut(),
        &app.view,
        &app.messages,
        &title,
        peer,
        app.active_pane == Pane::Messages,
    );

    compose::render(
        compose_area,
        frame,
        app.view.composer(),
        open_id.map(|_| title.as_str()),
        app.active_pane == Pane::Compose,
    );

    render_status(status_area, frame.buffer_mut(), app);

    // Help popup overlay (on top of everything else)
    if app.show_help {
        help::render_help_popup(frame);
    }
}

/// Render the header bar
fn render_header(area: Rect, buf: &mut Buffer, app: &App) {
    let title = Span::styled(
        " Club Chat",
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    );

    let help_indicator = Span::styled(" [?] Help ", Style::default().fg(Color::Gray));

    let (status_symbol, status_label, status_color) = status_indicator(&app.connection);
    let online_status = Span::styled(
        format!(" {} {} ", status_symbol, status_label),
        Style::default().fg(status_color),
    );

    let user_name = Span::styled(
        format!(" {} ", app.user_name),
        Style::default().fg(Color::Cyan),
    );

    // Calculate spacing to right-align the right-side elements
    let left_width = unicode_width::UnicodeWidthStr::width(" Club Chat");
    let right_content = format!(
        " [?] Help  {} {}  {} ",
        status_symbol, status_label, app.user_name
    );
    let right_width = unicode_width::UnicodeWidthStr::width(right_content.as_str());
    let padding_width = (area.width as usize).saturating_sub(left_width + right_width);
    let padding = Span::raw(" ".repeat(padding_width));

    let header_line = Line::from(vec![
        title,
        padding,
        help_indicator,
        online_status,
        user_name,
    ]);

    let header = Paragraph::new(header_line).style(Style::default().bg(Color::DarkGray));

    header.render(area, buf);
}

/// Render the status bar
fn render_status(area: Rect, buf: &mut Buffer, app: &App) {
    // Errors take the whole bar until dismissed.
    if let Some(err) = app.view.error() {
        let line = Line::from(vec![
            Span::styled(
                format!(" {} ", err),
                Style::default().fg(Color::Red).bg(Color::DarkGray),
            ),
            Span::styled(" (Esc to dismiss)", Style::default().fg(Color::Gray)),
        ]);
        Paragraph::new(line)
            .style(Style::default().bg(Color::DarkGray))
            .render(area, buf);
        return;
    }

    if let Some(typing) = app.view.typing_label() {
        let line = Line::from(Span::styled(
            format!(" {}", typing),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::ITALIC),
        ));
        Paragraph::new(line)
            .style(Style::default().bg(Color::DarkGray))
            .render(area, buf);
        return;
    }

    let (conn_symbol, conn_label, conn_color) = status_indicator(&app.connection);
    let detail = match app.connection {
        ConnectionState::Connected => format!(
            "{} ({} active)",
            conn_label,
            app.view.presence().online_count()
        ),
        ConnectionState::Disconnected(ref reason) => format!("{} ({})", conn_label, reason),
        ConnectionState::Connecting => conn_label.to_string(),
    };
    let connection = Span::styled(
        format!(" {} {} ", conn_symbol, detail),
        Style::default().fg(conn_color),
    );

    let sep_style = Style::default().fg(Color::DarkGray);

    let pane = Span::styled(
        format!("Tab: {} ", app.active_pane.as_str()),
        Style::default().fg(Color::Cyan),
    );

    let hints = match app.active_pane {
        Pane::Sidebar => "Enter: open",
        Pane::Messages => "r reply  e edit  d delete  1-5 react",
        Pane::Compose => "Enter: send",
    };
    let hint = Span::styled(hints, Style::default().fg(Color::Gray));

    let help_hint = Span::styled("?: help", Style::default().fg(Color::Gray));

    let status_line = Line::from(vec![
        connection,
        Span::styled(" | ", sep_style),
        pane,
        Span::styled(" | ", sep_style),
        hint,
        Span::styled(" | ", sep_style),
        help_hint,
    ]);

    let status = Paragraph::new(status_line).style(Style::default().bg(Color::DarkGray));

    status.render(area, buf);
}
