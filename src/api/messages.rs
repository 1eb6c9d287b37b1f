//! Message endpoints: history, send, edit, delete, reactions, read receipts

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::client::{unwrap_data, unwrap_list, MessagingClient};
use crate::chat::compose::Composer;
use crate::chat::store::ConversationStore;
use crate::chat::reactions;
use crate::config::Config;
use crate::models::{Message, OutgoingMessage};

/// Decode list items one by one, skipping records that do not parse.
pub(crate) fn decode_items<T: DeserializeOwned>(items: Vec<Value>, what: &str) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Skipping malformed {}: {}", what, e);
                None
            }
        })
        .collect()
}

/// Fetch the most recent `limit` messages of a conversation.
pub async fn list_messages(
    client: &MessagingClient,
    conversation_id: &str,
    limit: usize,
) -> Result<Vec<Message>> {
    let limit = limit.to_string();
    let body: Value = client
        .get(&["messages", conversation_id], &[("limit", limit.as_str())])
        .await?
        .json()
        .await
        .context("Failed to parse messages response")?;

    let items = unwrap_list(body, "messages")?;
    Ok(decode_items(items, "message"))
}

/// Create a message; returns the server's copy.
pub async fn send_message(
    client: &MessagingClient,
    conversation_id: &str,
    message: &OutgoingMessage,
) -> Result<Message> {
    let body = serde_json::to_value(message).context("Failed to encode message")?;
    let resp: Value = client
        .post(&["messages", conversation_id], &body)
        .await?
        .json()
        .await
        .context("Failed to parse send response")?;

    serde_json::from_value(unwrap_data(resp)).context("Unexpected send response")
}

/// Replace the content of a message. The store learns of it from the push.
pub async fn edit_message(client: &MessagingClient, message_id: &str, content: &str) -> Result<()> {
    client
        .put(&["messages", message_id], &serde_json::json!({ "content": content }))
        .await?;
    Ok(())
}

pub async fn delete_message(client: &MessagingClient, message_id: &str) -> Result<()> {
    client.delete(&["messages", message_id]).await?;
    Ok(())
}

pub async fn add_reaction(client: &MessagingClient, message_id: &str, emoji: &str) -> Result<()> {
    client
        .post(&["messages", message_id, "reactions"], &serde_json::json!({ "emoji": emoji }))
        .await?;
    Ok(())
}

/// Mark every message in a conversation as read by the current user.
pub async fn mark_read(client: &MessagingClient, conversation_id: &str) -> Result<()> {
    client
        .put(&["messages", conversation_id, "read"], &serde_json::json!({}))
        .await?;
    Ok(())
}

/// Print the history of a conversation (oldest first).
pub async fn read_messages(conversation_id: &str, limit: usize) -> Result<()> {
    let config = Config::load()?;
    let session = config.require_session()?;
    let client = MessagingClient::new(&session);

    let page = list_messages(&client, conversation_id, limit).await?;
    let mut store = ConversationStore::new(conversation_id);
    store.load(page);

    if store.is_empty() {
        println!("(no messages)");
        return Ok(());
    }

    for line in format_history(&store, &session.user_id) {
        println!("{}", line);
    }
    println!(
        "\n{} messages, {} unread",
        store.visible_count(),
        store.unread_from_others(&session.user_id)
    );
    Ok(())
}

fn format_history(store: &ConversationStore, user_id: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for msg in store.renderable() {
        let sender = msg
            .sender
            .as_ref()
            .map(|s| s.display_name())
            .unwrap_or_default();
        let mut line = format!(
            "[{}] {}: {}",
            msg.created_at.format("%Y-%m-%d %H:%M"),
            sender,
            msg.display_text()
        );
        if msg.is_edited && !msg.is_deleted() {
            line.push_str(" (edited)");
        }
        lines.push(line);

        if let Some((name, preview)) = msg
            .reply_to_id
            .as_deref()
            .and_then(|id| store.reply_preview(id))
        {
            lines.push(format!("    > {}: {}", name, preview));
        }

        let groups = reactions::aggregate(&msg.reactions, user_id);
        if !groups.is_empty() {
            let labels: Vec<String> = groups.iter().map(|g| g.label()).collect();
            lines.push(format!("    {}", labels.join("  ")));
        }
    }
    lines
}

/// Send a text message from the command line.
pub async fn send_text(
    conversation_id: &str,
    text: &str,
    reply_to: Option<&str>,
) -> Result<()> {
    let client = MessagingClient::from_config()?;

    let mut composer = Composer::default();
    composer.insert_str(text);
    let mut outgoing = composer.prepare_send()?;
    outgoing.reply_to_id = reply_to.map(String::from);

    let sent = send_message(&client, conversation_id, &outgoing).await?;
    println!("Message sent ({}).", sent.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::store::tests::msg;
    use crate::models::Reaction;
    use serde_json::json;

    #[test]
    fn test_decode_items_skips_malformed() {
        let items = vec![
            json!({"_id": "m1", "conversationId": "c1", "senderId": "u1",
                   "content": "hi", "createdAt": "2026-03-01T10:00:00Z"}),
            json!({"content": "no id"}),
        ];
        let parsed: Vec<Message> = decode_items(items, "message");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].id, "m1");
    }

    #[test]
    fn test_format_history() {
        let mut store = ConversationStore::new("c1");
        let mut question = msg("m1", "u2", "training at 6?", 1);
        question.reactions = vec![
            Reaction {
                user_id: "u1".to_string(),
                emoji: "👍".to_string(),
            },
            Reaction {
                user_id: "me".to_string(),
                emoji: "👍".to_string(),
            },
        ];
        let mut answer = msg("m2", "me", "yes", 2);
        answer.reply_to_id = Some("m1".to_string());
        answer.is_edited = true;
        store.load(vec![answer, question]);

        let lines = format_history(&store, "me");
        assert_eq!(
            lines,
            vec![
                "[2026-03-01 10:01] u2: training at 6?".to_string(),
                "    👍 2".to_string(),
                "[2026-03-01 10:02] me: yes (edited)".to_string(),
                "    > u2: training at 6?".to_string(),
            ]
        );
    }
}
