//! Message-related models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::participant::{Participant, UserRef};

/// Message payload kind (wire field `type`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Video,
    File,
    Audio,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Video => "video",
            MessageKind::File => "file",
            MessageKind::Audio => "audio",
            MessageKind::System => "system",
        }
    }

    /// Whether this kind carries `mediaUrl` / `fileName` / `fileSize`.
    pub fn is_media(&self) -> bool {
        matches!(
            self,
            MessageKind::Image | MessageKind::Video | MessageKind::File | MessageKind::Audio
        )
    }
}

impl From<String> for MessageKind {
    fn from(kind: String) -> Self {
        match kind.to_ascii_lowercase().as_str() {
            "image" => MessageKind::Image,
            "video" => MessageKind::Video,
            "file" => MessageKind::File,
            "audio" => MessageKind::Audio,
            "system" => MessageKind::System,
            _ => MessageKind::Text,
        }
    }
}

/// One user's reaction on a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub user_id: String,
    pub emoji: String,
}

/// Chat message, normalized at read time.
///
/// `sender` is `None` when the wire record had no resolvable sender; such a
/// message is kept in the store but skipped when rendering.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "MessageRecord")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender: Option<Participant>,
    pub content: Option<String>,
    pub kind: MessageKind,
    pub media_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub reply_to_id: Option<String>,
    pub reactions: Vec<Reaction>,
    pub read_by: Vec<String>,
    pub is_edited: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn sender_id(&self) -> Option<&str> {
        self.sender.as_ref().map(|s| s.id.as_str())
    }

    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender_id() == Some(user_id)
    }

    /// Text shown for this message: tombstone label, body, or media caption.
    pub fn display_text(&self) -> String {
        if self.is_deleted() {
            return "message deleted".to_string();
        }
        if let Some(ref content) = self.content {
            if !content.trim().is_empty() {
                return content.clone();
            }
        }
        match self.kind {
            MessageKind::Text | MessageKind::System => String::new(),
            kind => match self.file_name {
                Some(ref name) => format!("[{}] {}", kind.as_str(), name),
                None => format!("[{}]", kind.as_str()),
            },
        }
    }
}

/// Body of a create-message request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub content: String,
    #[serde(rename = "type", serialize_with = "serialize_kind")]
    pub kind: MessageKind,
    #[serde(rename = "replyTo", skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
}

fn serialize_kind<S: serde::Serializer>(kind: &MessageKind, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(kind.as_str())
}

/// Message reference: bare id or populated message.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum MessageRef {
    Id(String),
    Populated {
        #[serde(alias = "_id")]
        id: String,
    },
}

impl MessageRef {
    fn into_id(self) -> String {
        match self {
            MessageRef::Id(id) | MessageRef::Populated { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReactionRecord {
    user_id: Option<UserRef>,
    #[serde(default)]
    emoji: String,
}

/// Message as sent by the backend.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRecord {
    #[serde(alias = "_id")]
    id: String,
    #[serde(default, alias = "conversation")]
    conversation_id: String,
    #[serde(default)]
    sender_id: Option<UserRef>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<MessageKind>,
    #[serde(default)]
    media_url: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    file_size: Option<u64>,
    #[serde(default, alias = "replyTo")]
    reply_to_id: Option<MessageRef>,
    #[serde(default)]
    reactions: Vec<ReactionRecord>,
    #[serde(default)]
    read_by: Vec<UserRef>,
    #[serde(default)]
    is_edited: bool,
    #[serde(default)]
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<MessageRecord> for Message {
    fn from(rec: MessageRecord) -> Self {
        let kind = rec.kind.unwrap_or_default();
        let (media_url, file_name, file_size) = if kind.is_media() {
            (rec.media_url, rec.file_name, rec.file_size)
        } else {
            (None, None, None)
        };

        Message {
            id: rec.id,
            conversation_id: rec.conversation_id,
            sender: rec.sender_id.as_ref().and_then(UserRef::normalize),
            content: rec.content,
            kind,
            media_url,
            file_name,
            file_size,
            reply_to_id: rec.reply_to_id.map(MessageRef::into_id),
            reactions: rec
                .reactions
                .into_iter()
                .map(|r| Reaction {
                    user_id: r
                        .user_id
                        .as_ref()
                        .and_then(UserRef::id)
                        .unwrap_or_default()
                        .to_string(),
                    emoji: r.emoji,
                })
                .collect(),
            read_by: rec
                .read_by
                .iter()
                .filter_map(|u| u.id().map(String::from))
                .collect(),
            is_edited: rec.is_edited,
            deleted_at: rec.deleted_at,
            created_at: rec.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_populated_sender_and_reply() {
        let msg: Message = serde_json::from_value(serde_json::json!({
            "_id": "m1",
            "conversationId": "c1",
            "senderId": {"_id": "u1", "firstName": "Lina", "lastName": "Haddad"},
            "content": "Training moved to 6pm",
            "type": "text",
            "replyTo": {"_id": "m0", "content": "When is training?"},
            "reactions": [{"userId": "u2", "emoji": "👍"}],
            "readBy": ["u1", {"_id": "u2"}],
            "createdAt": "2026-03-01T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(msg.id, "m1");
        assert_eq!(msg.sender_id(), Some("u1"));
        assert_eq!(msg.sender.as_ref().unwrap().display_name(), "Lina Haddad");
        assert_eq!(msg.reply_to_id.as_deref(), Some("m0"));
        assert_eq!(msg.reactions[0].user_id, "u2");
        assert_eq!(msg.read_by, vec!["u1", "u2"]);
        assert!(!msg.is_edited);
    }

    #[test]
    fn test_missing_sender_is_none() {
        let msg: Message = serde_json::from_value(serde_json::json!({
            "id": "m2",
            "conversationId": "c1",
            "content": "orphan",
            "createdAt": "2026-03-01T10:00:00Z"
        }))
        .unwrap();

        assert!(msg.sender.is_none());
        assert_eq!(msg.kind, MessageKind::Text);
    }

    #[test]
    fn test_media_fields_only_for_media_kinds() {
        let text: Message = serde_json::from_value(serde_json::json!({
            "_id": "m3",
            "senderId": "u1",
            "type": "text",
            "content": "hi",
            "mediaUrl": "https://cdn.example/x.png",
            "createdAt": "2026-03-01T10:00:00Z"
        }))
        .unwrap();
        assert!(text.media_url.is_none());

        let file: Message = serde_json::from_value(serde_json::json!({
            "_id": "m4",
            "senderId": "u1",
            "type": "file",
            "mediaUrl": "https://cdn.example/roster.pdf",
            "fileName": "roster.pdf",
            "fileSize": 2048,
            "createdAt": "2026-03-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(file.kind, MessageKind::File);
        assert_eq!(file.file_size, Some(2048));
        assert_eq!(file.display_text(), "[file] roster.pdf");
    }

    #[test]
    fn test_unknown_kind_falls_back_to_text() {
        assert_eq!(MessageKind::from("sticker".to_string()), MessageKind::Text);
        assert_eq!(MessageKind::from("IMAGE".to_string()), MessageKind::Image);
    }

    #[test]
    fn test_outgoing_body() {
        let body = serde_json::to_value(OutgoingMessage {
            content: "see you at 6".to_string(),
            kind: MessageKind::Text,
            reply_to_id: Some("m0".to_string()),
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"content": "see you at 6", "type": "text", "replyTo": "m0"})
        );

        let body = serde_json::to_value(OutgoingMessage {
            content: "hi".to_string(),
            kind: MessageKind::Text,
            reply_to_id: None,
        })
        .unwrap();
        assert!(body.get("replyTo").is_none());
    }

    #[test]
    fn test_deleted_message_hides_content() {
        let msg: Message = serde_json::from_value(serde_json::json!({
            "_id": "m5",
            "senderId": "u1",
            "content": "secret",
            "deletedAt": "2026-03-01T11:00:00Z",
            "createdAt": "2026-03-01T10:00:00Z"
        }))
        .unwrap();

        assert!(msg.is_deleted());
        assert_eq!(msg.display_text(), "message deleted");
    }
}
