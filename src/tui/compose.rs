//! Compose box: reply/edit banner above a single-line text input.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::chat::compose::Composer;

/// Height of the compose box: 1 border + 1 banner + 1 input + 1 border = 4 lines.
pub const COMPOSE_HEIGHT: u16 = 4;

/// Render the compose box into the given area.
///
/// Uses `Frame` directly so we can both write to the buffer and set cursor.
pub fn render(
    area: Rect,
    frame: &mut Frame,
    composer: &Composer,
    conversation_name: Option<&str>,
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
    frame.render_widget(block, area);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let banner_area = Rect::new(inner.x, inner.y, inner.width, 1);
    render_banner(banner_area, frame.buffer_mut(), composer, focused);

    if inner.height >= 2 {
        let input_area = Rect::new(inner.x, inner.y + 1, inner.width, 1);

        // Compute cursor position before rendering (need immutable state access).
        let cursor = compute_cursor_position(input_area, composer, focused);

        render_input(input_area, frame.buffer_mut(), composer, conversation_name);

        if let Some((cx, cy)) = cursor {
            frame.set_cursor_position((cx, cy));
        }
    }
}

/// Compute the cursor position if the compose box is focused.
fn compute_cursor_position(
    input_area: Rect,
    composer: &Composer,
    focused: bool,
) -> Option<(u16, u16)> {
    if !focused {
        return None;
    }

    if composer.text().is_empty() {
        Some((input_area.x + 1, input_area.y))
    } else {
        let w = input_area.width as usize;
        let display = compose_display_text(composer.text(), composer.cursor_pos(), w);
        let cursor_x = input_area.x + 1 + display.cursor_offset as u16;
        Some((cursor_x, input_area.y))
    }
}

/// Text and style of the banner line for the composer's mode.
fn banner(composer: &Composer, focused: bool) -> (String, Style) {
    if composer.is_editing() {
        return (
            " Editing message (Enter save, Esc cancel)".to_string(),
            Style::default()
                .fg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
        );
    }
    if let Some(target) = composer.reply_target() {
        return (
            format!(
                " Replying to {}: {} (Esc dismiss)",
                target.sender_name, target.preview
            ),
            Style::default().fg(Color::Cyan),
        );
    }
    let style = if focused {
        Style::default().fg(Color::Gray)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    (" Enter send | Ctrl+U clear | Esc back".to_string(), style)
}

fn render_banner(area: Rect, buf: &mut Buffer, composer: &Composer, focused: bool) {
    let (text, style) = banner(composer, focused);
    let truncated: String = text.chars().take(area.width as usize).collect();
    Paragraph::new(Line::from(Span::styled(truncated, style))).render(area, buf);
}

/// Render the input line (with placeholder or text).
///
/// Cursor positioning is handled separately to avoid borrow conflicts.
fn render_input(
    area: Rect,
    buf: &mut Buffer,
    composer: &Composer,
    conversation_name: Option<&str>,
) {
    let w = area.width as usize;

    if composer.text().is_empty() {
        let placeholder = match conversation_name {
            Some(name) => format!(" Type a message to {}...", name),
            None => " Open a conversation to start typing".to_string(),
        };
        let style = Style::default().fg(Color::DarkGray);
        let truncated: String = placeholder.chars().take(w).collect();
        let line = Line::from(Span::styled(truncated, style));
        Paragraph::new(line).render(area, buf);
    } else {
        // Show input text with horizontal scrolling.
        let display = compose_display_text(composer.text(), composer.cursor_pos(), w);
        let line = Line::from(Span::styled(
            format!(" {}", display.visible),
            Style::default().fg(Color::White),
        ));
        Paragraph::new(line).render(area, buf);
    }
}

/// Information about what text to display and where the cursor is.
struct DisplayText {
    /// The visible portion of text to render.
    visible: String,
    /// The cursor offset within the visible text (in columns).
    cursor_offset: usize,
}

/// Compute the visible text and cursor offset for display.
///
/// Newlines are shown as " | " separators on the single display line.
/// Horizontal scrolling keeps the cursor visible. Offsets are in columns so
/// wide characters (emoji, CJK) place the cursor correctly.
fn compose_display_text(input: &str, cursor_pos: usize, width: usize) -> DisplayText {
    let cells: Vec<String> = input
        .chars()
        .map(|ch| {
            if ch == '\n' {
                " | ".to_string()
            } else {
                ch.to_string()
            }
        })
        .collect();

    // Available display width (1 column margin on the left for the " " prefix).
    let avail = width.saturating_sub(1);
    if avail == 0 {
        return DisplayText {
            visible: String::new(),
            cursor_offset: 0,
        };
    }

    let widths: Vec<usize> = cells.iter().map(|c| c.width()).collect();
    let cursor_pos = cursor_pos.min(cells.len());
    let flat_cursor: usize = widths[..cursor_pos].iter().sum();
    let total: usize = widths.iter().sum();

    if total <= avail {
        return DisplayText {
            visible: cells.concat(),
            cursor_offset: flat_cursor,
        };
    }

    // Drop cells from the left until the cursor fits.
    let mut start = 0;
    let mut skipped = 0;
    while flat_cursor - skipped >= avail && start < cursor_pos {
        skipped += widths[start];
        start += 1;
    }

    let mut visible = String::new();
    let mut used = 0;
    for (cell, w) in cells[start..].iter().zip(&widths[start..]) {
        if used + w > avail {
            break;
        }
        used += w;
        visible.push_str(cell);
    }

    DisplayText {
        visible,
        cursor_offset: flat_cursor - skipped,
    }
}
