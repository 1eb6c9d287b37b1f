//! Conversation list endpoint

use anyhow::{Context, Result};
use serde_json::Value;

use super::client::{unwrap_list, MessagingClient};
use super::messages::decode_items;
use crate::config::Config;
use crate::models::Conversation;

/// Conversations the current user participates in.
pub async fn list_conversations(client: &MessagingClient) -> Result<Vec<Conversation>> {
    let body: Value = client
        .get(&["conversations"], &[])
        .await?
        .json()
        .await
        .context("Failed to parse conversations response")?;

    let items = unwrap_list(body, "conversations")?;
    Ok(decode_items(items, "conversation"))
}

/// List conversations (prints to stdout).
pub async fn print_conversations() -> Result<()> {
    let config = Config::load()?;
    let session = config.require_session()?;
    let client = MessagingClient::new(&session);

    let conversations = list_conversations(&client).await?;

    println!("\nConversations:");
    println!("{:-<60}", "");

    if conversations.is_empty() {
        println!("  (no conversations found)");
        return Ok(());
    }

    for conv in &conversations {
        let kind = if conv.is_group { "group" } else { "direct" };
        println!("{} [{}]", conv.display_name(&session.user_id), kind);
        println!("  ID: {}", conv.id);
        if conv.is_group {
            println!("  Members: {}", conv.participants.len());
        }
        println!();
    }

    Ok(())
}
