//! Chat view controller.
//!
//! Owns the state of the open conversation and applies user input and push
//! events to it. It performs no I/O: every request to the REST API or the
//! realtime transport is returned as an `Effect` for the caller to execute.
//!
//! Results of async requests come back tagged with the generation that issued
//! them. Opening another conversation bumps the generation, so late results
//! from the previous one are dropped instead of landing in the new store.

use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use super::compose::{ComposeError, Composer, ReplyTarget};
use super::presence::PresenceTracker;
use super::reactions::{self, ReactionGroup};
use super::store::ConversationStore;
use super::typing::{TypingDebounce, TypingIndicators, TypingSignal};
use crate::models::{Message, MessageKind, OutgoingMessage};
use crate::realtime::PushEvent;

/// Request the view wants executed.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Join {
        conversation_id: String,
    },
    Leave {
        conversation_id: String,
    },
    Typing {
        conversation_id: String,
        signal: TypingSignal,
    },
    LoadMessages {
        generation: u64,
        conversation_id: String,
        limit: usize,
    },
    Send {
        generation: u64,
        conversation_id: String,
        message: OutgoingMessage,
    },
    Edit {
        message_id: String,
        content: String,
    },
    Delete {
        message_id: String,
    },
    React {
        message_id: String,
        emoji: String,
    },
    MarkRead {
        conversation_id: String,
    },
}

/// Tunables taken from config.
#[derive(Debug, Clone)]
pub struct ViewOptions {
    pub page_size: usize,
    pub typing_timeout: Duration,
    pub remote_typing_timeout: Option<Duration>,
}

/// State of the open chat view.
pub struct ChatView {
    user_id: String,
    options: ViewOptions,
    presence: PresenceTracker,
    store: Option<ConversationStore>,
    composer: Composer,
    typing: TypingIndicators,
    debounce: TypingDebounce,
    generation: u64,
    loading: bool,
    error: Option<String>,
}

impl ChatView {
    pub fn new(user_id: &str, options: ViewOptions, presence: PresenceTracker) -> Self {
        Self {
            user_id: user_id.to_string(),
            typing: TypingIndicators::new(options.remote_typing_timeout),
            debounce: TypingDebounce::new(options.typing_timeout),
            options,
            presence,
            store: None,
            composer: Composer::default(),
            generation: 0,
            loading: false,
            error: None,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.store.as_ref().map(|s| s.conversation_id())
    }

    pub fn store(&self) -> Option<&ConversationStore> {
        self.store.as_ref()
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// Direct access for cursor movement and text editing. Call
    /// `input_changed` afterwards when the text itself changed.
    pub fn composer_mut(&mut self) -> &mut Composer {
        &mut self.composer
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// User-visible error from the last failed request.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// "X is typing..." for the open conversation.
    pub fn typing_label(&self) -> Option<String> {
        self.typing.label(self.conversation_id()?)
    }

    pub fn reaction_groups(&self, msg: &Message) -> Vec<ReactionGroup> {
        reactions::aggregate(&msg.reactions, &self.user_id)
    }

    /// Open a conversation, leaving the current one first.
    pub fn open(&mut self, conversation_id: &str) -> Vec<Effect> {
        if self.conversation_id() == Some(conversation_id) {
            return Vec::new();
        }

        let mut effects = self.close();
        self.generation += 1;
        self.store = Some(ConversationStore::new(conversation_id));
        self.loading = true;

        tracing::info!(
            "Opening conversation {} (generation {})",
            conversation_id,
            self.generation
        );

        effects.push(Effect::Join {
            conversation_id: conversation_id.to_string(),
        });
        effects.push(Effect::LoadMessages {
            generation: self.generation,
            conversation_id: conversation_id.to_string(),
            limit: self.options.page_size,
        });
        effects.push(Effect::MarkRead {
            conversation_id: conversation_id.to_string(),
        });
        effects
    }

    /// Tear down the open conversation: stop typing, leave, drop the store.
    pub fn close(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Some(store) = self.store.take() else {
            return effects;
        };
        let conversation_id = store.conversation_id().to_string();

        if let Some(signal) = self.debounce.reset() {
            effects.push(Effect::Typing {
                conversation_id: conversation_id.clone(),
                signal,
            });
        }
        self.typing.clear(&conversation_id);
        self.composer = Composer::default();
        self.loading = false;
        self.error = None;

        effects.push(Effect::Leave { conversation_id });
        effects
    }

    /// History page arrived (or failed).
    pub fn messages_loaded(&mut self, generation: u64, result: anyhow::Result<Vec<Message>>) {
        if generation != self.generation {
            tracing::debug!("Ignoring stale message page (generation {})", generation);
            return;
        }
        self.loading = false;
        let Some(store) = self.store.as_mut() else {
            return;
        };
        match result {
            Ok(page) => {
                tracing::debug!(
                    "Loaded {} messages for {}",
                    page.len(),
                    store.conversation_id()
                );
                store.load(page);
            }
            Err(e) => {
                // Keep whatever the store had.
                tracing::warn!(
                    "Failed to load messages for {}: {:#}",
                    store.conversation_id(),
                    e
                );
                self.error = Some(format!("Could not load messages: {:#}", e));
            }
        }
    }

    /// The draft text changed; decide which typing signal to emit.
    pub fn input_changed(&mut self, now: Instant) -> Vec<Effect> {
        if self.composer.is_editing() {
            return Vec::new();
        }
        let Some(conversation_id) = self.conversation_id().map(String::from) else {
            return Vec::new();
        };
        match self.debounce.on_input(self.composer.text(), now) {
            Some(signal) => vec![Effect::Typing {
                conversation_id,
                signal,
            }],
            None => Vec::new(),
        }
    }

    /// Enter pressed: commit the edit in progress, or send the draft.
    pub fn submit(&mut self) -> Vec<Effect> {
        let Some(conversation_id) = self.conversation_id().map(String::from) else {
            return Vec::new();
        };

        if self.composer.is_editing() {
            return match self.composer.commit_edit() {
                // The store changes when the "message updated" push arrives.
                Ok(commit) => vec![Effect::Edit {
                    message_id: commit.message_id,
                    content: commit.content,
                }],
                Err(ComposeError::Empty) | Err(ComposeError::NotEditing) => Vec::new(),
            };
        }

        match self.composer.prepare_send() {
            Ok(message) => vec![Effect::Send {
                generation: self.generation,
                conversation_id,
                message,
            }],
            Err(ComposeError::Empty) | Err(ComposeError::NotEditing) => Vec::new(),
        }
    }

    /// Create-message request finished.
    pub fn send_finished(&mut self, generation: u64, result: anyhow::Result<Message>) -> Vec<Effect> {
        if generation != self.generation {
            tracing::debug!("Ignoring stale send result (generation {})", generation);
            return Vec::new();
        }
        let Some(store) = self.store.as_mut() else {
            return Vec::new();
        };

        match result {
            Ok(message) => {
                let conversation_id = store.conversation_id().to_string();
                self.composer.mark_sent(message.reply_to_id.as_deref());
                store.append(message);
                self.error = None;
                match self.debounce.on_sent() {
                    Some(signal) => vec![Effect::Typing {
                        conversation_id,
                        signal,
                    }],
                    None => Vec::new(),
                }
            }
            Err(e) => {
                tracing::warn!("Failed to send message: {:#}", e);
                self.error = Some(format!("Failed to send message: {:#}", e));
                Vec::new()
            }
        }
    }

    /// An edit/delete/react request failed.
    pub fn request_failed(&mut self, action: &str, err: &anyhow::Error) {
        tracing::warn!("Failed to {}: {:#}", action, err);
        self.error = Some(format!("Failed to {}: {:#}", action, err));
    }

    /// Enter edit mode for one of the user's own text messages.
    pub fn begin_edit(&mut self, message_id: &str) -> bool {
        let Some(msg) = self.store.as_ref().and_then(|s| s.get(message_id)) else {
            return false;
        };
        if !msg.is_from(&self.user_id) || msg.is_deleted() || msg.kind != MessageKind::Text {
            return false;
        }
        let content = msg.content.clone().unwrap_or_default();
        self.composer.begin_edit(message_id, &content);
        true
    }

    pub fn cancel_edit(&mut self) {
        self.composer.cancel_edit();
    }

    /// Target a message for reply. Tombstones cannot be replied to.
    pub fn start_reply(&mut self, message_id: &str) -> bool {
        let Some(msg) = self.store.as_ref().and_then(|s| s.get(message_id)) else {
            return false;
        };
        if msg.is_deleted() {
            return false;
        }
        let sender_name = msg
            .sender
            .as_ref()
            .map(|s| s.display_name())
            .unwrap_or_else(|| "?".to_string());
        self.composer.set_reply(ReplyTarget {
            message_id: message_id.to_string(),
            sender_name,
            preview: msg.display_text(),
        });
        true
    }

    pub fn dismiss_reply(&mut self) {
        self.composer.dismiss_reply();
    }

    /// Request deletion of one of the user's own messages.
    pub fn delete(&mut self, message_id: &str) -> Vec<Effect> {
        match self.store.as_ref().and_then(|s| s.get(message_id)) {
            Some(msg) if msg.is_from(&self.user_id) && !msg.is_deleted() => vec![Effect::Delete {
                message_id: message_id.to_string(),
            }],
            _ => Vec::new(),
        }
    }

    /// Fire-and-forget reaction; the count changes when the store is updated.
    pub fn react(&mut self, message_id: &str, emoji: &str) -> Vec<Effect> {
        match self.store.as_ref().and_then(|s| s.get(message_id)) {
            Some(msg) if !msg.is_deleted() => vec![Effect::React {
                message_id: message_id.to_string(),
                emoji: emoji.to_string(),
            }],
            _ => Vec::new(),
        }
    }

    /// Apply a server push event.
    pub fn handle_push(&mut self, event: PushEvent, now: Instant) -> Vec<Effect> {
        match event {
            PushEvent::NewMessage {
                conversation_id,
                message,
            } => {
                let incoming = !message.is_from(&self.user_id);
                let Some(store) = self.open_store(&conversation_id) else {
                    return Vec::new();
                };
                if store.append(message) && incoming {
                    return vec![Effect::MarkRead { conversation_id }];
                }
                Vec::new()
            }
            PushEvent::MessageUpdated {
                conversation_id,
                message,
            } => {
                if let Some(store) = self.open_store(&conversation_id) {
                    if !store.replace(message) {
                        tracing::debug!("Update for unknown message dropped");
                    }
                }
                Vec::new()
            }
            PushEvent::MessageDeleted {
                conversation_id,
                message_id,
                deleted_at,
            } => {
                if let Some(store) = self.open_store(&conversation_id) {
                    store.mark_deleted(&message_id, deleted_at.unwrap_or_else(Utc::now));
                }
                Vec::new()
            }
            PushEvent::TypingStarted {
                conversation_id,
                entry,
            } => {
                if entry.user_id != self.user_id {
                    self.typing.start(&conversation_id, entry, now);
                }
                Vec::new()
            }
            PushEvent::TypingStopped {
                conversation_id,
                user_id,
            } => {
                self.typing.stop(&conversation_id, &user_id);
                Vec::new()
            }
            PushEvent::UserOnline { user_id } => {
                self.presence.mark_online(&user_id);
                Vec::new()
            }
            PushEvent::UserOffline { user_id } => {
                self.presence.mark_offline(&user_id);
                Vec::new()
            }
        }
    }

    /// Timer work: outbound stop-typing and remote indicator expiry.
    pub fn tick(&mut self, now: Instant) -> Vec<Effect> {
        self.typing.expire(now);
        let Some(conversation_id) = self.conversation_id().map(String::from) else {
            return Vec::new();
        };
        match self.debounce.poll(now) {
            Some(signal) => vec![Effect::Typing {
                conversation_id,
                signal,
            }],
            None => Vec::new(),
        }
    }

    /// When `tick` next has something to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.debounce.deadline(), self.typing.next_expiry()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Store of the open conversation, if `conversation_id` is the open one.
    fn open_store(&mut self, conversation_id: &str) -> Option<&mut ConversationStore> {
        match self.store.as_mut() {
            Some(store) if store.accepts(conversation_id) => Some(store),
            _ => {
                tracing::debug!("Discarding event for conversation {}", conversation_id);
                None
            }
        }
    }
}
