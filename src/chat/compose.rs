//! Composition controller: draft text, reply target and edit target.

use thiserror::Error;

use crate::models::{MessageKind, OutgoingMessage};

/// Why a draft or edit could not be submitted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComposeError {
    #[error("message is empty")]
    Empty,

    #[error("no message is being edited")]
    NotEditing,
}

/// Message being replied to, shown as a preview above the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    pub message_id: String,
    pub sender_name: String,
    pub preview: String,
}

/// Message being edited. The draft is parked while editing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditTarget {
    pub message_id: String,
    stashed_input: String,
    stashed_cursor: usize,
}

/// Edit ready to be sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditCommit {
    pub message_id: String,
    pub content: String,
}

/// State for the compose box.
///
/// `input` holds the draft, or the replacement text while an edit is active.
#[derive(Debug, Default)]
pub struct Composer {
    input: String,
    /// Cursor position (character offset into `input`).
    cursor_pos: usize,
    reply_target: Option<ReplyTarget>,
    editing: Option<EditTarget>,
}

impl Composer {
    pub fn text(&self) -> &str {
        &self.input
    }

    pub fn cursor_pos(&self) -> usize {
        self.cursor_pos
    }

    /// Insert a character at the current cursor position.
    pub fn insert_char(&mut self, c: char) {
        let byte_pos = self.char_to_byte(self.cursor_pos);
        self.input.insert(byte_pos, c);
        self.cursor_pos += 1;
    }

    /// Insert pasted text at the current cursor position.
    pub fn insert_str(&mut self, s: &str) {
        let byte_pos = self.char_to_byte(self.cursor_pos);
        self.input.insert_str(byte_pos, s);
        self.cursor_pos += s.chars().count();
    }

    /// Delete the character before the cursor (backspace).
    pub fn backspace(&mut self) {
        if self.cursor_pos > 0 {
            let byte_pos = self.char_to_byte(self.cursor_pos);
            let prev_byte_pos = self.char_to_byte(self.cursor_pos - 1);
            self.input.drain(prev_byte_pos..byte_pos);
            self.cursor_pos -= 1;
        }
    }

    /// Delete the character at the cursor (delete key).
    pub fn delete(&mut self) {
        let char_count = self.input.chars().count();
        if self.cursor_pos < char_count {
            let byte_pos = self.char_to_byte(self.cursor_pos);
            let next_byte_pos = self.char_to_byte(self.cursor_pos + 1);
            self.input.drain(byte_pos..next_byte_pos);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor_pos = self.cursor_pos.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        if self.cursor_pos < self.input.chars().count() {
            self.cursor_pos += 1;
        }
    }

    pub fn move_home(&mut self) {
        self.cursor_pos = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor_pos = self.input.chars().count();
    }

    /// Clear all input text (Ctrl+U).
    pub fn clear(&mut self) {
        self.input.clear();
        self.cursor_pos = 0;
    }

    pub fn reply_target(&self) -> Option<&ReplyTarget> {
        self.reply_target.as_ref()
    }

    pub fn set_reply(&mut self, target: ReplyTarget) {
        self.reply_target = Some(target);
    }

    pub fn dismiss_reply(&mut self) {
        self.reply_target = None;
    }

    /// Build the create-message request for the current draft.
    ///
    /// Whitespace-only drafts are rejected. The draft is left untouched; it is
    /// only cleared by `mark_sent` once the server has confirmed.
    pub fn prepare_send(&self) -> Result<OutgoingMessage, ComposeError> {
        let content = self.input.trim();
        if content.is_empty() {
            return Err(ComposeError::Empty);
        }
        Ok(OutgoingMessage {
            content: content.to_string(),
            kind: MessageKind::Text,
            reply_to_id: self.reply_target.as_ref().map(|r| r.message_id.clone()),
        })
    }

    /// Server confirmed the send: clear the draft and the reply it answered.
    ///
    /// If an edit began while the send was in flight, the parked draft is the
    /// sent text. It is dropped and the edit text is left alone. A reply target
    /// picked after sending survives.
    pub fn mark_sent(&mut self, replied_to: Option<&str>) {
        match self.editing.as_mut() {
            Some(target) => {
                target.stashed_input.clear();
                target.stashed_cursor = 0;
            }
            None => self.clear(),
        }
        let answered = self.reply_target.as_ref().map(|r| r.message_id.as_str());
        if answered.is_some() && answered == replied_to {
            self.reply_target = None;
        }
    }

    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    /// Start editing `message_id`, loading its current content into the input.
    ///
    /// The draft in progress is parked and comes back on commit or cancel.
    pub fn begin_edit(&mut self, message_id: &str, content: &str) {
        let (stashed_input, stashed_cursor) = match self.editing.take() {
            Some(previous) => (previous.stashed_input, previous.stashed_cursor),
            None => (std::mem::take(&mut self.input), self.cursor_pos),
        };
        self.editing = Some(EditTarget {
            message_id: message_id.to_string(),
            stashed_input,
            stashed_cursor,
        });
        self.input = content.to_string();
        self.move_end();
    }

    /// Finish the edit. Empty replacement text keeps edit mode active.
    pub fn commit_edit(&mut self) -> Result<EditCommit, ComposeError> {
        let message_id = match self.editing {
            Some(ref target) => target.message_id.clone(),
            None => return Err(ComposeError::NotEditing),
        };
        let content = self.input.trim().to_string();
        if content.is_empty() {
            return Err(ComposeError::Empty);
        }
        self.restore_draft();
        Ok(EditCommit {
            message_id,
            content,
        })
    }

    /// Leave edit mode without side effects.
    pub fn cancel_edit(&mut self) {
        self.restore_draft();
    }

    fn restore_draft(&mut self) {
        if let Some(target) = self.editing.take() {
            self.input = target.stashed_input;
            self.cursor_pos = target.stashed_cursor;
        }
    }

    /// Convert a char-based cursor position to a byte offset.
    fn char_to_byte(&self, char_pos: usize) -> usize {
        self.input
            .char_indices()
            .nth(char_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }
}
