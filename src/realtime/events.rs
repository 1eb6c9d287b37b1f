//! Realtime event vocabulary: server pushes in, client signals out.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::codec::{self, Packet};
use crate::chat::TypingEntry;
use crate::models::Message;

/// Event pushed by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    NewMessage {
        conversation_id: String,
        message: Message,
    },
    MessageUpdated {
        conversation_id: String,
        message: Message,
    },
    MessageDeleted {
        conversation_id: String,
        message_id: String,
        deleted_at: Option<DateTime<Utc>>,
    },
    TypingStarted {
        conversation_id: String,
        entry: TypingEntry,
    },
    TypingStopped {
        conversation_id: String,
        user_id: String,
    },
    UserOnline {
        user_id: String,
    },
    UserOffline {
        user_id: String,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePayload {
    #[serde(default)]
    conversation_id: Option<String>,
    data: Message,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeletedPayload {
    conversation_id: String,
    #[serde(alias = "_id")]
    message_id: String,
    #[serde(default)]
    deleted_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypingPayload {
    conversation_id: String,
    #[serde(flatten)]
    entry: TypingEntry,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopTypingPayload {
    conversation_id: String,
    user_id: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UserPayload {
    Object {
        #[serde(rename = "userId")]
        user_id: String,
    },
    Bare(String),
}

impl UserPayload {
    fn into_id(self) -> String {
        match self {
            UserPayload::Object { user_id } | UserPayload::Bare(user_id) => user_id,
        }
    }
}

impl PushEvent {
    /// Decode a Socket.IO event. Returns `Ok(None)` for events this client
    /// does not handle.
    pub fn decode(name: &str, payload: Value) -> Result<Option<Self>> {
        let event = match name {
            "new-message" | "message-updated" => {
                let p: MessagePayload = serde_json::from_value(payload)
                    .with_context(|| format!("Invalid {} payload", name))?;
                let conversation_id = p
                    .conversation_id
                    .unwrap_or_else(|| p.data.conversation_id.clone());
                if name == "new-message" {
                    PushEvent::NewMessage {
                        conversation_id,
                        message: p.data,
                    }
                } else {
                    PushEvent::MessageUpdated {
                        conversation_id,
                        message: p.data,
                    }
                }
            }
            "message-deleted" => {
                let p: DeletedPayload = serde_json::from_value(payload)
                    .context("Invalid message-deleted payload")?;
                PushEvent::MessageDeleted {
                    conversation_id: p.conversation_id,
                    message_id: p.message_id,
                    deleted_at: p.deleted_at,
                }
            }
            "user-typing" => {
                let p: TypingPayload =
                    serde_json::from_value(payload).context("Invalid user-typing payload")?;
                PushEvent::TypingStarted {
                    conversation_id: p.conversation_id,
                    entry: p.entry,
                }
            }
            "user-stop-typing" => {
                let p: StopTypingPayload = serde_json::from_value(payload)
                    .context("Invalid user-stop-typing payload")?;
                PushEvent::TypingStopped {
                    conversation_id: p.conversation_id,
                    user_id: p.user_id,
                }
            }
            "user-online" => {
                let p: UserPayload =
                    serde_json::from_value(payload).context("Invalid user-online payload")?;
                PushEvent::UserOnline {
                    user_id: p.into_id(),
                }
            }
            "user-offline" => {
                let p: UserPayload =
                    serde_json::from_value(payload).context("Invalid user-offline payload")?;
                PushEvent::UserOffline {
                    user_id: p.into_id(),
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Signal sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    Join {
        conversation_id: String,
    },
    Leave {
        conversation_id: String,
    },
    Typing {
        conversation_id: String,
        user_name: String,
        user_name_ar: Option<String>,
    },
    StopTyping {
        conversation_id: String,
    },
}

impl OutboundEvent {
    pub fn to_packet(&self) -> Packet {
        match self {
            OutboundEvent::Join { conversation_id } => {
                codec::event("join-conversation", Value::String(conversation_id.clone()))
            }
            OutboundEvent::Leave { conversation_id } => {
                codec::event("leave-conversation", Value::String(conversation_id.clone()))
            }
            OutboundEvent::Typing {
                conversation_id,
                user_name,
                user_name_ar,
            } => codec::event(
                "typing",
                serde_json::json!({
                    "conversationId": conversation_id,
                    "userName": user_name,
                    "userNameAr": user_name_ar,
                }),
            ),
            OutboundEvent::StopTyping { conversation_id } => codec::event(
                "stop-typing",
                serde_json::json!({ "conversationId": conversation_id }),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_new_message() {
        let event = PushEvent::decode(
            "new-message",
            json!({
                "conversationId": "c1",
                "data": {
                    "_id": "m1",
                    "conversationId": "c1",
                    "senderId": {"_id": "u2", "firstName": "Karim"},
                    "content": "on my way",
                    "createdAt": "2026-03-01T10:00:00Z"
                }
            }),
        )
        .unwrap()
        .unwrap();

        match event {
            PushEvent::NewMessage {
                conversation_id,
                message,
            } => {
                assert_eq!(conversation_id, "c1");
                assert_eq!(message.id, "m1");
                assert_eq!(message.sender_id(), Some("u2"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_conversation_id_falls_back_to_message() {
        let event = PushEvent::decode(
            "message-updated",
            json!({
                "data": {
                    "_id": "m1",
                    "conversationId": "c7",
                    "senderId": "u2",
                    "content": "edited",
                    "isEdited": true,
                    "createdAt": "2026-03-01T10:00:00Z"
                }
            }),
        )
        .unwrap()
        .unwrap();
        assert!(matches!(
            event,
            PushEvent::MessageUpdated { ref conversation_id, .. } if conversation_id == "c7"
        ));
    }

    #[test]
    fn test_decode_typing_and_presence() {
        let typing = PushEvent::decode(
            "user-typing",
            json!({"conversationId": "c1", "userId": "u2", "userName": "Karim", "userNameAr": "كريم"}),
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            typing,
            PushEvent::TypingStarted {
                conversation_id: "c1".to_string(),
                entry: TypingEntry {
                    user_id: "u2".to_string(),
                    user_name: "Karim".to_string(),
                    user_name_ar: Some("كريم".to_string()),
                },
            }
        );

        let online = PushEvent::decode("user-online", json!("u3")).unwrap().unwrap();
        assert_eq!(
            online,
            PushEvent::UserOnline {
                user_id: "u3".to_string()
            }
        );
        let offline = PushEvent::decode("user-offline", json!({"userId": "u3"}))
            .unwrap()
            .unwrap();
        assert_eq!(
            offline,
            PushEvent::UserOffline {
                user_id: "u3".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_event_ignored() {
        assert!(PushEvent::decode("meeting-created", json!({}))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_bad_payload_is_error() {
        assert!(PushEvent::decode("message-deleted", json!({"nope": 1})).is_err());
    }

    #[test]
    fn test_outbound_packets() {
        let join = OutboundEvent::Join {
            conversation_id: "c1".to_string(),
        };
        assert_eq!(
            codec::encode(&join.to_packet()),
            r#"42["join-conversation","c1"]"#
        );

        let stop = OutboundEvent::StopTyping {
            conversation_id: "c1".to_string(),
        };
        assert_eq!(
            codec::encode(&stop.to_packet()),
            r#"42["stop-typing",{"conversationId":"c1"}]"#
        );
    }
}
