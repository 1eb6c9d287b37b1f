//! API client module for the messaging backend

pub mod client;
pub mod conversations;
pub mod messages;

pub use client::MessagingClient;

use anyhow::Result;

/// List conversations
pub async fn list_conversations() -> Result<()> {
    conversations::print_conversations().await
}

/// Read messages from a conversation
pub async fn read_messages(conversation_id: &str, limit: usize) -> Result<()> {
    messages::read_messages(conversation_id, limit).await
}

/// Send a text message to a conversation
pub async fn send_message(to: &str, message: &str, reply_to: Option<&str>) -> Result<()> {
    messages::send_text(to, message, reply_to).await
}
