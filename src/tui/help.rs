//! Help popup overlay: shows all keyboard shortcuts organized by category.

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

/// Popup dimensions.
const POPUP_WIDTH: u16 = 84;
const POPUP_HEIGHT: u16 = 26;

/// A shortcut entry: key binding and its description.
struct Shortcut {
    key: &'static str,
    desc: &'static str,
}

/// A category of shortcuts with a title.
struct Category {
    title: &'static str,
    shortcuts: &'static [Shortcut],
}

const NAVIGATION: Category = Category {
    title: "NAVIGATION",
    shortcuts: &[
        Shortcut {
            key: "Up/Down, k/j",
            desc: "Move within pane",
        },
        Shortcut {
            key: "Tab",
            desc: "Cycle focus forward",
        },
        Shortcut {
            key: "Shift+Tab",
            desc: "Cycle focus backward",
        },
        Shortcut {
            key: "Left/Right",
            desc: "Chats / messages pane",
        },
        Shortcut {
            key: "Enter",
            desc: "Open conversation",
        },
    ],
};

const MESSAGES: Category = Category {
    title: "MESSAGES",
    shortcuts: &[
        Shortcut {
            key: "r",
            desc: "Reply to message",
        },
        Shortcut {
            key: "e",
            desc: "Edit your message",
        },
        Shortcut {
            key: "d",
            desc: "Delete your message",
        },
        Shortcut {
            key: "1-5",
            desc: "React 👍 ❤️ 😂 😮 🎉",
        },
        Shortcut {
            key: "Enter / i",
            desc: "Write a message",
        },
    ],
};

const COMPOSE: Category = Category {
    title: "COMPOSE",
    shortcuts: &[
        Shortcut {
            key: "Enter",
            desc: "Send / save edit",
        },
        Shortcut {
            key: "Esc",
            desc: "Cancel edit / dismiss reply",
        },
        Shortcut {
            key: "Ctrl+U",
            desc: "Clear compose box",
        },
        Shortcut {
            key: "Home/End",
            desc: "Jump to start / end",
        },
        Shortcut {
            key: "Up",
            desc: "Back to messages",
        },
    ],
};

const MISC: Category = Category {
    title: "MISC",
    shortcuts: &[
        Shortcut {
            key: "Esc",
            desc: "Dismiss error",
        },
        Shortcut {
            key: "q",
            desc: "Quit",
        },
        Shortcut {
            key: "Ctrl+C",
            desc: "Quit from anywhere",
        },
        Shortcut {
            key: "?",
            desc: "Toggle this help",
        },
    ],
};

/// Render the help popup overlay centered on screen.
///
/// Clears the area behind the popup and draws a bordered box with all
/// keyboard shortcuts organized in a two-column layout.
pub fn render_help_popup(frame: &mut Frame) {
    let area = frame.area();

    // Calculate centered popup area, clamped to terminal size.
    let popup_w = POPUP_WIDTH.min(area.width.saturating_sub(2));
    let popup_h = POPUP_HEIGHT.min(area.height.saturating_sub(2));

    let popup_area = centered_rect(popup_w, popup_h, area);

    // Clear the background behind the popup.
    frame.render_widget(Clear, popup_area);

    // Outer block with title and footer.
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Line::from(vec![
            Span::styled(
                " HELP ",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled("(? to close) ", Style::default().fg(Color::Gray)),
        ]))
        .title_bottom(Line::from(Span::styled(
            " Press any key to close ",
            Style::default().fg(Color::Gray),
        )));

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    // Split inner area into two columns.
    let [left_col, right_col] =
        Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(inner);

    let left_lines = build_column_lines(&[&NAVIGATION, &MISC]);
    let left_para = Paragraph::new(left_lines);
    frame.render_widget(left_para, inset(left_col, 1, 1));

    let right_lines = build_column_lines(&[&MESSAGES, &COMPOSE]);
    let right_para = Paragraph::new(right_lines);
    frame.render_widget(right_para, inset(right_col, 1, 1));
}

/// Build the lines for one column of categories.
fn build_column_lines<'a>(categories: &[&Category]) -> Vec<Line<'a>> {
    let mut lines: Vec<Line<'a>> = Vec::new();

    for (cat_idx, cat) in categories.iter().enumerate() {
        if cat_idx > 0 {
            // Blank line between categories.
            lines.push(Line::from(""));
        }

        // Category title.
        lines.push(Line::from(Span::styled(
            cat.title,
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )));

        // Separator line under title.
        let sep_len = 36;
        let sep: String = "\u{2500}".repeat(sep_len);
        lines.push(Line::from(Span::styled(
            sep,
            Style::default().fg(Color::DarkGray),
        )));

        // Shortcut entries.
        for sc in cat.shortcuts.iter() {
            let key_width = 14;
            let key_display = format!("{:<width$}", sc.key, width = key_width);
            lines.push(Line::from(vec![
                Span::styled(key_display, Style::default().fg(Color::Yellow)),
                Span::styled(sc.desc, Style::default().fg(Color::Gray)),
            ]));
        }
    }

    lines
}

/// Return a centered sub-rect of the given size within `area`.
fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect::new(x, y, width, height)
}

/// Inset a rect by the given horizontal and vertical margins.
fn inset(area: Rect, h: u16, v: u16) -> Rect {
    Rect::new(
        area.x + h,
        area.y + v,
        area.width.saturating_sub(h * 2),
        area.height.saturating_sub(v * 2),
    )
}
