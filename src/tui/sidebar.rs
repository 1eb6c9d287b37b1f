//! Sidebar widget: the conversation list with presence badges.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};

use crate::chat::PresenceTracker;
use crate::models::Conversation;

/// Sidebar state: owns the conversation list and tracks navigation.
pub struct SidebarState {
    pub conversations: Vec<Conversation>,
    /// Index into `conversations`.
    pub selected: usize,
    /// Whether data is still loading.
    pub loading: bool,
    /// Last load failure, shown in place of the list.
    pub error: Option<String>,
}

impl Default for SidebarState {
    fn default() -> Self {
        Self {
            conversations: Vec::new(),
            selected: 0,
            loading: true,
            error: None,
        }
    }
}

impl SidebarState {
    /// Replace the list from an API response.
    pub fn set_conversations(&mut self, conversations: Vec<Conversation>) {
        // Keep the cursor on the same conversation across reloads.
        let current = self.selected_conversation().map(|c| c.id.clone());
        self.conversations = conversations;
        self.loading = false;
        self.error = None;
        self.selected = current
            .and_then(|id| self.conversations.iter().position(|c| c.id == id))
            .unwrap_or(0);
        self.clamp_selection();
    }

    pub fn set_error(&mut self, error: String) {
        self.loading = false;
        self.error = Some(error);
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.conversations.len() {
            self.selected += 1;
        }
    }

    pub fn selected_conversation(&self) -> Option<&Conversation> {
        self.conversations.get(self.selected)
    }

    pub fn find(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Clamp selected index to valid range after structural changes.
    fn clamp_selection(&mut self) {
        if self.selected >= self.conversations.len() {
            self.selected = self.conversations.len().saturating_sub(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// What the sidebar needs besides its own state.
pub struct SidebarCtx<'a> {
    pub user_id: &'a str,
    /// Conversation currently shown in the messages pane.
    pub open_id: Option<&'a str>,
    pub presence: &'a PresenceTracker,
    pub focused: bool,
}

/// Render the sidebar into the given area.
pub fn render(area: Rect, buf: &mut Buffer, state: &SidebarState, ctx: &SidebarCtx) {
    let border_style = if ctx.focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let border_type = if ctx.focused {
        BorderType::Double
    } else {
        BorderType::Plain
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(border_type)
        .border_style(border_style);

    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    // Section header.
    let prefix = if ctx.focused { ">> CHATS " } else { " -- CHATS " };
    let dashes = (inner.width as usize).saturating_sub(prefix.len());
    let header = format!("{}{}", prefix, "-".repeat(dashes));
    let header_style = Style::default().fg(Color::DarkGray);
    render_row(
        buf,
        Rect::new(inner.x, inner.y, inner.width, 1),
        &header,
        "",
        header_style,
        header_style,
    );

    let list_area = Rect::new(
        inner.x,
        inner.y + 1,
        inner.width,
        inner.height.saturating_sub(1),
    );
    if list_area.height == 0 {
        return;
    }

    let placeholder = if let Some(ref err) = state.error {
        Some((format!(" Error: {}", err), Color::Red))
    } else if state.loading && state.conversations.is_empty() {
        Some((" Loading...".to_string(), Color::DarkGray))
    } else if state.conversations.is_empty() {
        Some((" No conversations".to_string(), Color::DarkGray))
    } else {
        None
    };
    if let Some((text, color)) = placeholder {
        let line = Line::from(Span::styled(text, Style::default().fg(color)));
        Paragraph::new(line).render(Rect::new(list_area.x, list_area.y, list_area.width, 1), buf);
        return;
    }

    let available_height = list_area.height as usize;
    let total = state.conversations.len();
    let scroll_offset = compute_scroll_offset(state.selected, available_height, total);

    for (row_idx, idx) in (scroll_offset..total).take(available_height).enumerate() {
        let conv = &state.conversations[idx];
        let row_area = Rect::new(list_area.x, list_area.y + row_idx as u16, list_area.width, 1);
        render_conversation(buf, row_area, conv, idx == state.selected, ctx);
    }
}

/// Render one conversation row: cursor, icon, name and presence badge.
fn render_conversation(
    buf: &mut Buffer,
    area: Rect,
    conv: &Conversation,
    selected: bool,
    ctx: &SidebarCtx,
) {
    let is_open = ctx.open_id == Some(conv.id.as_str());
    let icon = if conv.is_group { "#" } else { "@" };
    let cursor = if selected { "\u{25BA}" } else { " " };
    let label = format!("{}{} {}", cursor, icon, conv.display_name(ctx.user_id));

    let (badge, online) = presence_badge(conv, ctx.user_id, ctx.presence);

    let style = item_style(selected, is_open);
    let bstyle = if online {
        Style::default().fg(Color::Green)
    } else if !badge.is_empty() {
        badge_style(selected)
    } else {
        style
    };

    render_row(buf, area, &label, &badge, style, bstyle);
}

/// "*" for an online direct peer, the online count for groups.
fn presence_badge(conv: &Conversation, user_id: &str, presence: &PresenceTracker) -> (String, bool) {
    if conv.is_group {
        let online = conv
            .participants
            .iter()
            .filter(|p| p.id != user_id && presence.is_online(&p.id))
            .count();
        if online > 0 {
            return (online.to_string(), false);
        }
        return (String::new(), false);
    }
    match conv.other_participant(user_id) {
        Some(peer) if presence.is_online(&peer.id) => ("*".to_string(), true),
        _ => (String::new(), false),
    }
}

/// Simple scroll offset: keep selected item visible.
fn compute_scroll_offset(selected: usize, height: usize, total: usize) -> usize {
    if total <= height {
        return 0;
    }
    if selected < height {
        return 0;
    }
    let max_offset = total.saturating_sub(height);
    let offset = selected.saturating_sub(height - 1);
    offset.min(max_offset)
}

/// Style for a conversation row based on selection and whether it is open.
fn item_style(selected: bool, is_open: bool) -> Style {
    if selected {
        Style::default()
            .fg(Color::White)
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD)
    } else if is_open {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    }
}

/// Style for a badge (online count) based on selection state.
fn badge_style(selected: bool) -> Style {
    if selected {
        Style::default()
            .fg(Color::Yellow)
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD)
    }
}

/// Render a row with left-aligned text and an optional right-aligned badge.
fn render_row(
    buf: &mut Buffer,
    area: Rect,
    left: &str,
    badge: &str,
    text_style: Style,
    badge_style: Style,
) {
    let width = area.width as usize;
    if width == 0 {
        return;
    }

    // Truncate left text if needed, leaving room for badge + 1 space
    let badge_len = badge.chars().count();
    let max_left = if badge_len > 0 {
        width.saturating_sub(badge_len + 1)
    } else {
        width
    };

    let left_truncated: String = left.chars().take(max_left).collect();
    let left_len = left_truncated.chars().count();

    let pad = width.saturating_sub(left_len + badge_len);

    let line = Line::from(vec![
        Span::styled(left_truncated, text_style),
        Span::styled(" ".repeat(pad), text_style),
        Span::styled(badge.to_string(), badge_style),
    ]);

    let row_area = Rect::new(area.x, area.y, area.width, 1);
    Paragraph::new(line).render(row_area, buf);
}
