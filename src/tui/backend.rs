//! Async backend: runs REST calls off the UI loop.
//!
//! Uses an mpsc channel pair. The TUI sends `BackendCommand` values, and a
//! background tokio task executes them and sends `BackendResponse` values back.
//! Results for the open conversation carry the view generation that asked for
//! them so the view can drop late arrivals.

use anyhow::Result;
use tokio::sync::mpsc;

use crate::api::{conversations, messages, MessagingClient};
use crate::models::{Conversation, Message, OutgoingMessage};

/// Commands sent from the TUI event loop to the async backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    LoadConversations,
    LoadMessages {
        generation: u64,
        conversation_id: String,
        limit: usize,
    },
    SendMessage {
        generation: u64,
        conversation_id: String,
        message: OutgoingMessage,
    },
    EditMessage {
        message_id: String,
        content: String,
    },
    DeleteMessage {
        message_id: String,
    },
    AddReaction {
        message_id: String,
        emoji: String,
    },
    MarkRead {
        conversation_id: String,
    },
}

/// Responses from the async backend to the TUI.
pub enum BackendResponse {
    Conversations(Result<Vec<Conversation>>),
    Messages {
        generation: u64,
        result: Result<Vec<Message>>,
    },
    MessageSent {
        generation: u64,
        result: Result<Message>,
    },
    /// Edit, delete or reaction request finished. Success needs no action
    /// because the push event carries the change.
    Acknowledged {
        action: &'static str,
        result: Result<()>,
    },
}

/// Handle for interacting with the backend from the TUI side.
pub struct Backend {
    cmd_tx: mpsc::UnboundedSender<BackendCommand>,
    resp_rx: mpsc::UnboundedReceiver<BackendResponse>,
}

impl Backend {
    /// Start the backend. Spawns a tokio task that processes commands.
    pub fn start(client: MessagingClient) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (resp_tx, resp_rx) = mpsc::unbounded_channel();

        tokio::spawn(backend_loop(client, cmd_rx, resp_tx));

        Self { cmd_tx, resp_rx }
    }

    /// Send a command to the backend (non-blocking).
    pub fn send(&self, cmd: BackendCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            tracing::error!("Backend channel closed -- command dropped");
        }
    }

    /// Receive a response from the backend.
    ///
    /// Suspends until a response is available. Returns `None` only when the
    /// backend channel is permanently closed (all senders dropped).
    /// Designed to be used inside `tokio::select!`.
    pub async fn recv(&mut self) -> Option<BackendResponse> {
        self.resp_rx.recv().await
    }
}

/// Background loop that processes commands.
///
/// Requests are not cancelled; each one runs to completion in its own task.
async fn backend_loop(
    client: MessagingClient,
    mut cmd_rx: mpsc::UnboundedReceiver<BackendCommand>,
    resp_tx: mpsc::UnboundedSender<BackendResponse>,
) {
    while let Some(cmd) = cmd_rx.recv().await {
        let client = client.clone();
        let resp_tx = resp_tx.clone();

        // Spawn each command as a separate task so we don't block the loop.
        tokio::spawn(async move {
            let response = match cmd {
                BackendCommand::LoadConversations => {
                    let result = conversations::list_conversations(&client).await;
                    BackendResponse::Conversations(result)
                }
                BackendCommand::LoadMessages {
                    generation,
                    conversation_id,
                    limit,
                } => {
                    let result = messages::list_messages(&client, &conversation_id, limit).await;
                    BackendResponse::Messages { generation, result }
                }
                BackendCommand::SendMessage {
                    generation,
                    conversation_id,
                    message,
                } => {
                    let result = messages::send_message(&client, &conversation_id, &message).await;
                    BackendResponse::MessageSent { generation, result }
                }
                BackendCommand::EditMessage {
                    message_id,
                    content,
                } => BackendResponse::Acknowledged {
                    action: "edit message",
                    result: messages::edit_message(&client, &message_id, &content).await,
                },
                BackendCommand::DeleteMessage { message_id } => BackendResponse::Acknowledged {
                    action: "delete message",
                    result: messages::delete_message(&client, &message_id).await,
                },
                BackendCommand::AddReaction { message_id, emoji } => {
                    BackendResponse::Acknowledged {
                        action: "add reaction",
                        result: messages::add_reaction(&client, &message_id, &emoji).await,
                    }
                }
                BackendCommand::MarkRead { conversation_id } => {
                    // Read receipts are best-effort and never reach the UI.
                    if let Err(e) = messages::mark_read(&client, &conversation_id).await {
                        tracing::warn!("Failed to mark {} as read: {:#}", conversation_id, e);
                    }
                    return;
                }
            };
            let _ = resp_tx.send(response);
        });
    }
}
