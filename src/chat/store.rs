//! Conversation store: the ordered, de-duplicated message list of one
//! open conversation.
//!
//! Position is fixed at insertion. `replace` and `mark_deleted` mutate entries
//! in place; nothing is ever removed or re-sorted after a load.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::Message;

/// Messages of the currently open conversation.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversation_id: String,
    messages: Vec<Message>,
    /// Message id -> index into `messages`.
    index: HashMap<String, usize>,
}

impl ConversationStore {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Whether an event for `conversation_id` belongs in this store.
    pub fn accepts(&self, conversation_id: &str) -> bool {
        self.conversation_id == conversation_id
    }

    /// Replace the whole store with a freshly loaded page.
    ///
    /// The page is ordered oldest first (stable on equal timestamps) and
    /// duplicate ids keep their first occurrence.
    pub fn load(&mut self, mut page: Vec<Message>) {
        page.sort_by_key(|m| m.created_at);

        self.messages.clear();
        self.index.clear();
        for msg in page {
            if self.index.contains_key(&msg.id) {
                tracing::debug!("Dropping duplicate message {} from loaded page", msg.id);
                continue;
            }
            self.index.insert(msg.id.clone(), self.messages.len());
            self.messages.push(msg);
        }
    }

    /// Append a message unless one with the same id is already stored.
    ///
    /// Returns `true` if the store changed.
    pub fn append(&mut self, msg: Message) -> bool {
        if self.index.contains_key(&msg.id) {
            return false;
        }
        self.index.insert(msg.id.clone(), self.messages.len());
        self.messages.push(msg);
        true
    }

    /// Overwrite the stored message with the same id, keeping its position.
    ///
    /// Returns `false` (and changes nothing) when the id is unknown.
    pub fn replace(&mut self, msg: Message) -> bool {
        match self.index.get(&msg.id) {
            Some(&pos) => {
                self.messages[pos] = msg;
                true
            }
            None => false,
        }
    }

    /// Turn the message into a tombstone. The entry stays addressable.
    pub fn mark_deleted(&mut self, id: &str, at: DateTime<Utc>) -> bool {
        match self.index.get(id) {
            Some(&pos) => {
                let msg = &mut self.messages[pos];
                if msg.deleted_at.is_none() {
                    msg.deleted_at = Some(at);
                }
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.position(id).map(|pos| &self.messages[pos])
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of messages whose content is shown (not tombstoned).
    pub fn visible_count(&self) -> usize {
        self.messages.iter().filter(|m| !m.is_deleted()).count()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages fit for rendering. Entries without a resolvable sender are
    /// skipped with a diagnostic instead of breaking the view.
    pub fn renderable(&self) -> Vec<&Message> {
        self.messages
            .iter()
            .filter(|m| {
                if m.sender.is_none() {
                    tracing::warn!("Skipping message {} without a resolvable sender", m.id);
                    return false;
                }
                true
            })
            .collect()
    }

    /// Sender name and text of the message `id` refers to, for reply previews.
    pub fn reply_preview(&self, id: &str) -> Option<(String, String)> {
        let msg = self.get(id)?;
        let sender = msg
            .sender
            .as_ref()
            .map(|s| s.display_name())
            .unwrap_or_else(|| "?".to_string());
        Some((sender, msg.display_text()))
    }

    /// Count of visible messages from other users not yet read by `user_id`.
    pub fn unread_from_others(&self, user_id: &str) -> usize {
        self.messages
            .iter()
            .filter(|m| !m.is_deleted())
            .filter(|m| m.sender_id().is_some_and(|s| s != user_id))
            .filter(|m| !m.read_by.iter().any(|r| r == user_id))
            .count()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{MessageKind, Participant};
    use chrono::TimeZone;

    pub(crate) fn msg(id: &str, sender: &str, content: &str, minute: u32) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: "c1".to_string(),
            sender: Some(Participant::bare(sender)),
            content: Some(content.to_string()),
            kind: MessageKind::Text,
            media_url: None,
            file_name: None,
            file_size: None,
            reply_to_id: None,
            reactions: Vec::new(),
            read_by: Vec::new(),
            is_edited: false,
            deleted_at: None,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 10, minute, 0).unwrap(),
        }
    }

    fn store_with(ids: &[&str]) -> ConversationStore {
        let mut store = ConversationStore::new("c1");
        for (i, id) in ids.iter().enumerate() {
            store.append(msg(id, "u1", id, i as u32));
        }
        store
    }

    #[test]
    fn test_append_is_idempotent() {
        let mut store = store_with(&["m1", "m2"]);
        let before: Vec<Message> = store.messages().to_vec();

        let mut dup = msg("m2", "u9", "different body", 30);
        dup.is_edited = true;
        assert!(!store.append(dup));

        assert_eq!(store.len(), 2);
        assert_eq!(store.messages(), &before[..]);
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut store = store_with(&["m1", "m2", "m3"]);

        let mut edited = msg("m2", "u1", "edited", 59);
        edited.is_edited = true;
        assert!(store.replace(edited));

        assert_eq!(store.position("m2"), Some(1));
        assert_eq!(store.messages()[1].content.as_deref(), Some("edited"));
        let ids: Vec<&str> = store.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
        assert_eq!(store.get("m2").unwrap().content.as_deref(), Some("edited"));
    }

    #[test]
    fn test_replace_unknown_is_noop() {
        let mut store = store_with(&["m1"]);
        assert!(!store.replace(msg("m9", "u1", "early update", 5)));
        assert_eq!(store.len(), 1);
        assert!(store.get("m9").is_none());
    }

    #[test]
    fn test_mark_deleted_leaves_tombstone() {
        let mut store = store_with(&["m1", "m2"]);
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        assert!(store.mark_deleted("m1", at));

        assert_eq!(store.len(), 2);
        assert_eq!(store.visible_count(), 1);
        let (_, text) = store.reply_preview("m1").unwrap();
        assert_eq!(text, "message deleted");
        assert!(!store.mark_deleted("missing", at));
    }

    #[test]
    fn test_load_orders_and_dedups() {
        let mut store = store_with(&["old"]);
        store.load(vec![
            msg("m3", "u1", "third", 3),
            msg("m1", "u1", "first", 1),
            msg("m2", "u2", "second", 2),
            msg("m1", "u1", "first again", 1),
        ]);

        let ids: Vec<&str> = store.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
        assert_eq!(store.get("m1").unwrap().content.as_deref(), Some("first"));
        assert!(store.get("old").is_none());
        assert_eq!(store.position("m3"), Some(2));
    }

    #[test]
    fn test_renderable_skips_missing_sender() {
        let mut store = store_with(&["m1"]);
        let mut orphan = msg("m2", "u1", "orphan", 2);
        orphan.sender = None;
        store.append(orphan);

        assert_eq!(store.len(), 2);
        let ids: Vec<&str> = store.renderable().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1"]);
    }

    #[test]
    fn test_unread_from_others() {
        let mut store = ConversationStore::new("c1");
        store.append(msg("m1", "me", "mine", 1));
        let mut seen = msg("m2", "u2", "seen", 2);
        seen.read_by.push("me".to_string());
        store.append(seen);
        store.append(msg("m3", "u2", "new", 3));

        assert_eq!(store.unread_from_others("me"), 1);
    }
}
