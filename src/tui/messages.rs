//! Messages pane: the open conversation with reply previews, reactions and tombstones.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};
use unicode_width::UnicodeWidthStr;

use crate::chat::ChatView;
use crate::models::Message;

/// Selection state for the messages pane.
///
/// `selected` indexes the renderable messages. `None` follows the newest
/// message as new ones arrive.
#[derive(Debug, Default)]
pub struct MessagesState {
    pub selected: Option<usize>,
    /// Vertical scroll offset (in rendered lines, 0 = top).
    pub scroll_offset: usize,
}

impl MessagesState {
    /// Move selection up by one message.
    pub fn select_previous(&mut self, total: usize) {
        if total == 0 {
            return;
        }
        self.selected = Some(match self.selected {
            None => total - 1,
            Some(i) => i.min(total - 1).saturating_sub(1),
        });
    }

    /// Move selection down; past the last message the pane follows again.
    pub fn select_next(&mut self, total: usize) {
        match self.selected {
            Some(i) if i + 1 < total => self.selected = Some(i + 1),
            _ => self.follow(),
        }
    }

    pub fn follow(&mut self) {
        self.selected = None;
    }

    /// Conversation switched.
    pub fn reset(&mut self) {
        self.selected = None;
        self.scroll_offset = 0;
    }

    /// Id of the selected message, or the newest one when following.
    pub fn selected_id(&self, view: &ChatView) -> Option<String> {
        let messages = view.store()?.renderable();
        let index = self.selected.unwrap_or(messages.len().checked_sub(1)?);
        messages.get(index).map(|m| m.id.clone())
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render the messages pane into the given area.
pub fn render(
    area: Rect,
    buf: &mut Buffer,
    view: &ChatView,
    state: &MessagesState,
    title: &str,
    peer: Option<&str>,
    focused: bool,
) {
    let border_style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let border_type = if focused {
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

    // Reserve the first line for the conversation header.
    let header_area = Rect::new(inner.x, inner.y, inner.width, 1);
    render_conversation_header(header_area, buf, view, title, peer);

    let messages_area = Rect::new(
        inner.x,
        inner.y + 1,
        inner.width,
        inner.height.saturating_sub(1),
    );

    if messages_area.height == 0 {
        return;
    }

    let Some(store) = view.store() else {
        render_hint(messages_area, buf, " Select a conversation (Enter)");
        return;
    };
    if store.renderable().is_empty() {
        let hint = if view.is_loading() {
            " Loading..."
        } else {
            " No messages yet"
        };
        render_hint(messages_area, buf, hint);
        return;
    }

    let (all_lines, msg_line_ranges) =
        build_message_lines(view, state, messages_area.width as usize);
    let total_lines = all_lines.len();
    let visible_height = messages_area.height as usize;

    let selected = state
        .selected
        .unwrap_or(msg_line_ranges.len().saturating_sub(1));
    let scroll = compute_auto_scroll(
        state.scroll_offset,
        selected,
        &msg_line_ranges,
        visible_height,
        total_lines,
    );

    for (row, line_idx) in (scroll..total_lines).take(visible_height).enumerate() {
        let y = messages_area.y + row as u16;
        let line_area = Rect::new(messages_area.x, y, messages_area.width, 1);
        Paragraph::new(all_lines[line_idx].clone()).render(line_area, buf);
    }

    // Scroll indicators.
    if total_lines > visible_height {
        let indicator_x = messages_area.x + messages_area.width.saturating_sub(1);
        if scroll > 0 {
            let cell = &mut buf[(indicator_x, messages_area.y)];
            cell.set_char('^');
            cell.set_style(Style::default().fg(Color::DarkGray));
        }
        if scroll + visible_height < total_lines {
            let bottom_y = messages_area.y + messages_area.height.saturating_sub(1);
            let cell = &mut buf[(indicator_x, bottom_y)];
            cell.set_char('v');
            cell.set_style(Style::default().fg(Color::DarkGray));
        }
    }
}

fn render_hint(area: Rect, buf: &mut Buffer, text: &str) {
    let line = Line::from(Span::styled(
        text.to_string(),
        Style::default().fg(Color::DarkGray),
    ));
    Paragraph::new(line).render(Rect::new(area.x, area.y, area.width, 1), buf);
}

/// Conversation name plus presence of the other participant for direct chats.
fn render_conversation_header(
    area: Rect,
    buf: &mut Buffer,
    view: &ChatView,
    title: &str,
    peer: Option<&str>,
) {
    let mut spans = vec![Span::styled(
        format!(" {} ", if title.is_empty() { "Club Chat" } else { title }),
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    )];

    if let Some(peer) = peer {
        let online = view.presence().is_online(peer);
        let color = if online { Color::Green } else { Color::Gray };
        spans.push(Span::styled(
            view.presence().label(peer),
            Style::default().fg(color),
        ));
    }

    Paragraph::new(Line::from(spans))
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

/// Build the flat line buffer and per-message line ranges in a single pass.
fn build_message_lines(
    view: &ChatView,
    state: &MessagesState,
    width: usize,
) -> (Vec<Line<'static>>, Vec<(usize, usize)>) {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut ranges: Vec<(usize, usize)> = Vec::new();

    let Some(store) = view.store() else {
        return (lines, ranges);
    };

    for (msg_idx, msg) in store.renderable().into_iter().enumerate() {
        let start = lines.len();
        let card = Card {
            is_selected: state.selected == Some(msg_idx),
            is_own: msg.is_from(view.user_id()),
            reply: msg
                .reply_to_id
                .as_deref()
                .and_then(|id| store.reply_preview(id)),
            reactions: view
                .reaction_groups(msg)
                .into_iter()
                .map(|g| (g.label(), g.mine))
                .collect(),
        };
        render_message_card(&mut lines, msg, &card, width);

        // Blank line between messages.
        lines.push(Line::from(""));

        ranges.push((start, lines.len()));
    }

    (lines, ranges)
}

/// Per-message render inputs resolved from the view.
struct Card {
    is_selected: bool,
    is_own: bool,
    /// (sender, preview) of the message replied to
    reply: Option<(String, String)>,
    /// (label, reacted by current user)
    reactions: Vec<(String, bool)>,
}

/// Render a single message card into the line buffer.
fn render_message_card(lines: &mut Vec<Line<'static>>, msg: &Message, card: &Card, width: usize) {
    let card_inner_width = width.saturating_sub(2);

    if card_inner_width < 10 {
        // Too narrow to render anything useful.
        return;
    }
    let content_width = card_inner_width.saturating_sub(2);

    let border_style = if card.is_selected {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::Gray)
    };

    let sender_style = if card.is_own {
        Style::default()
            .fg(Color::Green)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD)
    };

    let timestamp_style = Style::default().fg(Color::DarkGray);

    // Top border of card.
    lines.push(Line::from(Span::styled(
        format!("+-{}-+", "-".repeat(card_inner_width.saturating_sub(2))),
        border_style,
    )));

    // Sender line: "| sender              10:42 (edited) |"
    let sender = msg
        .sender
        .as_ref()
        .map(|s| s.display_name())
        .unwrap_or_default();
    let mut timestamp = msg
        .created_at
        .with_timezone(&chrono::Local)
        .format("%H:%M")
        .to_string();
    if msg.is_edited && !msg.is_deleted() {
        timestamp.push_str(" (edited)");
    }
    let sender = truncate_to_width(&sender, content_width.saturating_sub(timestamp.width() + 2));
    let sender_ts_pad = content_width
        .saturating_sub(sender.width())
        .saturating_sub(timestamp.width())
        .saturating_sub(1);
    lines.push(Line::from(vec![
        Span::styled("| ".to_string(), border_style),
        Span::styled(format!(" {}", sender), sender_style),
        Span::raw(" ".repeat(sender_ts_pad)),
        Span::styled(timestamp, timestamp_style),
        Span::styled(" |".to_string(), border_style),
    ]));

    // Quoted reply preview.
    if let Some((ref name, ref preview)) = card.reply {
        let quote = truncate_to_width(&format!("> {}: {}", name, preview), content_width);
        let pad = content_width.saturating_sub(quote.width());
        lines.push(Line::from(vec![
            Span::styled("| ".to_string(), border_style),
            Span::styled(
                quote,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::DIM),
            ),
            Span::raw(" ".repeat(pad)),
            Span::styled(" |".to_string(), border_style),
        ]));
    }

    // Body, or the tombstone label.
    let body_style = if msg.is_deleted() {
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC)
    } else {
        Style::default()
    };
    for cl in wrap_text(&msg.display_text(), content_width) {
        let pad = content_width.saturating_sub(cl.width());
        lines.push(Line::from(vec![
            Span::styled("| ".to_string(), border_style),
            Span::styled(format!("{}{}", cl, " ".repeat(pad)), body_style),
            Span::styled(" |".to_string(), border_style),
        ]));
    }

    // Reactions.
    if !card.reactions.is_empty() && !msg.is_deleted() {
        let mut spans: Vec<Span<'static>> = vec![Span::styled("| ".to_string(), border_style)];
        let mut used = 0;
        for (i, (label, mine)) in card.reactions.iter().enumerate() {
            let style = if *mine {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };
            used += label.width();
            spans.push(Span::styled(label.clone(), style));
            if i + 1 < card.reactions.len() {
                spans.push(Span::raw("  "));
                used += 2;
            }
        }
        spans.push(Span::raw(" ".repeat(content_width.saturating_sub(used))));
        spans.push(Span::styled(" |".to_string(), border_style));
        lines.push(Line::from(spans));
    }

    // Bottom border.
    lines.push(Line::from(Span::styled(
        format!("+-{}-+", "-".repeat(card_inner_width.saturating_sub(2))),
        border_style,
    )));
}

/// Cut `text` so it occupies at most `max_width` columns.
fn truncate_to_width(text: &str, max_width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > max_width {
            break;
        }
        used += w;
        out.push(ch);
    }
    out
}

/// Simple word-wrapping: split content by newlines first, then wrap long lines.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 {
        return vec![];
    }
    let mut result = Vec::new();
    for line in text.lines() {
        if line.width() <= max_width {
            result.push(line.to_string());
            continue;
        }
        let mut current = String::new();
        for word in line.split_whitespace() {
            // Words wider than the card are hard-split.
            let mut word = word.to_string();
            while word.width() > max_width {
                if !current.is_empty() {
                    result.push(std::mem::take(&mut current));
                }
                let head = truncate_to_width(&word, max_width);
                if head.is_empty() {
                    break;
                }
                word = word[head.len()..].to_string();
                result.push(head);
            }
            if current.is_empty() {
                current = word;
            } else if current.width() + 1 + word.width() <= max_width {
                current.push(' ');
                current.push_str(&word);
            } else {
                result.push(std::mem::replace(&mut current, word));
            }
        }
        if !current.is_empty() {
            result.push(current);
        }
    }
    result
}

/// Compute scroll offset that keeps the selected message visible.
fn compute_auto_scroll(
    current_scroll: usize,
    selected: usize,
    ranges: &[(usize, usize)],
    visible_height: usize,
    total_lines: usize,
) -> usize {
    if ranges.is_empty() || total_lines <= visible_height {
        return 0;
    }

    let (sel_start, sel_end) = if selected < ranges.len() {
        ranges[selected]
    } else {
        return current_scroll;
    };

    let mut scroll = current_scroll;

    // If the message is taller than the viewport, always show its start.
    let msg_height = sel_end.saturating_sub(sel_start);
    if msg_height >= visible_height {
        scroll = sel_start;
    } else {
        if sel_start < scroll {
            scroll = sel_start;
        }
        if sel_end > scroll + visible_height {
            scroll = sel_end.saturating_sub(visible_height);
        }
    }

    let max_scroll = total_lines.saturating_sub(visible_height);
    scroll.min(max_scroll)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::store::tests::msg;
    use crate::chat::{PresenceTracker, ViewOptions};
    use crate::models::Reaction;
    use crate::realtime::PushEvent;
    use std::time::Duration;
    use tokio::time::Instant;

    fn text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    fn view_with(page: Vec<Message>) -> ChatView {
        let mut view = ChatView::new(
            "me",
            ViewOptions {
                page_size: 50,
                typing_timeout: Duration::from_millis(3000),
                remote_typing_timeout: None,
            },
            PresenceTracker::new(),
        );
        view.open("c1");
        view.messages_loaded(view.generation(), Ok(page));
        view
    }

    #[test]
    fn test_selection_follows_and_clamps() {
        let mut state = MessagesState::default();
        state.select_previous(3);
        assert_eq!(state.selected, Some(2));
        state.select_previous(3);
        state.select_previous(3);
        state.select_previous(3);
        assert_eq!(state.selected, Some(0));
        state.select_next(3);
        state.select_next(3);
        assert_eq!(state.selected, Some(2));
        state.select_next(3);
        assert_eq!(state.selected, None);

        state.select_previous(0);
        assert_eq!(state.selected, None);
    }

    #[test]
    fn test_selected_id_defaults_to_newest() {
        let view = view_with(vec![msg("m1", "u2", "a", 1), msg("m2", "u2", "b", 2)]);
        let mut state = MessagesState::default();
        assert_eq!(state.selected_id(&view).as_deref(), Some("m2"));
        state.selected = Some(0);
        assert_eq!(state.selected_id(&view).as_deref(), Some("m1"));
    }

    #[test]
    fn test_cards_show_reply_tombstone_and_reactions() {
        let mut original = msg("m1", "u2", "who brings the balls?", 1);
        original.deleted_at = Some(chrono::Utc::now());
        let mut reply = msg("m2", "me", "I will", 2);
        reply.reply_to_id = Some("m1".to_string());
        reply.reactions = vec![
            Reaction {
                user_id: "u2".to_string(),
                emoji: "👍".to_string(),
            },
            Reaction {
                user_id: "u3".to_string(),
                emoji: "👍".to_string(),
            },
        ];
        let view = view_with(vec![original, reply]);

        let (lines, ranges) = build_message_lines(&view, &MessagesState::default(), 60);
        assert_eq!(ranges.len(), 2);
        let rendered: Vec<String> = lines.iter().map(text).collect();

        assert!(rendered.iter().any(|l| l.contains("message deleted")));
        assert!(!rendered.iter().any(|l| l.contains("who brings the balls?")));
        assert!(rendered.iter().any(|l| l.contains("> u2: message deleted")));
        assert!(rendered.iter().any(|l| l.contains("👍 2")));
    }

    #[test]
    fn test_edited_marker_follows_push() {
        let mut view = view_with(vec![msg("m1", "me", "a", 1)]);
        let mut updated = msg("m1", "me", "b", 1);
        updated.is_edited = true;
        view.handle_push(
            PushEvent::MessageUpdated {
                conversation_id: "c1".to_string(),
                message: updated,
            },
            Instant::now(),
        );
        let (lines, _) = build_message_lines(&view, &MessagesState::default(), 60);
        let rendered: Vec<String> = lines.iter().map(text).collect();
        assert!(rendered.iter().any(|l| l.contains("(edited)")));
        assert!(rendered.iter().any(|l| l.contains("| b")));
    }

    #[test]
    fn test_wrap_text() {
        assert_eq!(wrap_text("short", 10), vec!["short"]);
        assert_eq!(
            wrap_text("one two three four", 9),
            vec!["one two", "three", "four"]
        );
        assert_eq!(wrap_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap_text("a\nb", 4), vec!["a", "b"]);
        assert!(wrap_text("anything", 0).is_empty());
    }

    #[test]
    fn test_compute_auto_scroll() {
        let ranges = vec![(0, 5), (5, 10), (10, 15)];
        assert_eq!(compute_auto_scroll(0, 2, &ranges, 6, 15), 9);
        assert_eq!(compute_auto_scroll(9, 0, &ranges, 6, 15), 0);
        assert_eq!(compute_auto_scroll(0, 0, &ranges, 20, 15), 0);
    }
}
