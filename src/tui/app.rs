//! TUI application state and main event loop

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::{FutureExt, StreamExt};
use ratatui::DefaultTerminal;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::backend::{Backend, BackendCommand, BackendResponse};
use super::messages::MessagesState;
use super::sidebar::SidebarState;
use super::ui;
use crate::api::MessagingClient;
use crate::chat::{ChatView, Effect, PresenceTracker, TypingSignal, ViewOptions};
use crate::config::{Config, Session};
use crate::realtime::{OutboundEvent, RealtimeEvent, RealtimeHandle};

/// Redraw interval when nothing else happens (keeps clocks current).
const RENDER_TICK_MS: u64 = 1000;

/// Reactions bound to the number keys in the messages pane.
pub const QUICK_REACTIONS: [&str; 5] = ["👍", "❤️", "😂", "😮", "🎉"];

/// Active pane in the TUI
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    #[default]
    Sidebar,
    Messages,
    Compose,
}

impl Pane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pane::Sidebar => "chats",
            Pane::Messages => "messages",
            Pane::Compose => "compose",
        }
    }

    fn next(self) -> Self {
        match self {
            Pane::Sidebar => Pane::Messages,
            Pane::Messages => Pane::Compose,
            Pane::Compose => Pane::Sidebar,
        }
    }

    fn previous(self) -> Self {
        match self {
            Pane::Sidebar => Pane::Compose,
            Pane::Messages => Pane::Sidebar,
            Pane::Compose => Pane::Messages,
        }
    }
}

/// Realtime connection state, for the header and status bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected(String),
}

/// Where an effect gets executed.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Realtime(OutboundEvent),
    Backend(BackendCommand),
}

/// Map a view effect onto the realtime socket or the REST backend.
pub fn route(effect: Effect, session: &Session) -> Route {
    match effect {
        Effect::Join { conversation_id } => Route::Realtime(OutboundEvent::Join { conversation_id }),
        Effect::Leave { conversation_id } => {
            Route::Realtime(OutboundEvent::Leave { conversation_id })
        }
        Effect::Typing {
            conversation_id,
            signal: TypingSignal::Start,
        } => Route::Realtime(OutboundEvent::Typing {
            conversation_id,
            user_name: session.user_name.clone(),
            user_name_ar: session.user_name_ar.clone(),
        }),
        Effect::Typing {
            conversation_id,
            signal: TypingSignal::Stop,
        } => Route::Realtime(OutboundEvent::StopTyping { conversation_id }),
        Effect::LoadMessages {
            generation,
            conversation_id,
            limit,
        } => Route::Backend(BackendCommand::LoadMessages {
            generation,
            conversation_id,
            limit,
        }),
        Effect::Send {
            generation,
            conversation_id,
            message,
        } => Route::Backend(BackendCommand::SendMessage {
            generation,
            conversation_id,
            message,
        }),
        Effect::Edit {
            message_id,
            content,
        } => Route::Backend(BackendCommand::EditMessage {
            message_id,
            content,
        }),
        Effect::Delete { message_id } => Route::Backend(BackendCommand::DeleteMessage { message_id }),
        Effect::React { message_id, emoji } => {
            Route::Backend(BackendCommand::AddReaction { message_id, emoji })
        }
        Effect::MarkRead { conversation_id } => {
            Route::Backend(BackendCommand::MarkRead { conversation_id })
        }
    }
}

/// Application state
pub struct App {
    /// Whether the app should exit
    pub should_exit: bool,
    /// Current user name
    pub user_name: String,
    pub connection: ConnectionState,
    /// Active pane
    pub active_pane: Pane,
    pub sidebar: SidebarState,
    pub messages: MessagesState,
    /// The open conversation
    pub view: ChatView,
    pub show_help: bool,
}

impl App {
    pub fn new(session: &Session, options: ViewOptions) -> Self {
        Self {
            should_exit: false,
            user_name: session.user_name.clone(),
            connection: ConnectionState::Connecting,
            active_pane: Pane::default(),
            sidebar: SidebarState::default(),
            messages: MessagesState::default(),
            view: ChatView::new(&session.user_id, options, PresenceTracker::new()),
            show_help: false,
        }
    }

    /// Display name of the open conversation.
    pub fn conversation_title(&self) -> String {
        let Some(id) = self.view.conversation_id() else {
            return String::new();
        };
        match self.sidebar.find(id) {
            Some(conv) => conv.display_name(self.view.user_id()),
            None => id.to_string(),
        }
    }

    /// Handle a key press; returns the effects to execute.
    pub fn handle_key(&mut self, key: KeyEvent, now: Instant) -> Vec<Effect> {
        if key.kind != KeyEventKind::Press {
            return Vec::new();
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_exit = true;
            return Vec::new();
        }

        if self.show_help {
            // Any key closes the help popup.
            self.show_help = false;
            return Vec::new();
        }

        match key.code {
            KeyCode::Tab => {
                self.active_pane = self.active_pane.next();
                return Vec::new();
            }
            KeyCode::BackTab => {
                self.active_pane = self.active_pane.previous();
                return Vec::new();
            }
            _ => {}
        }

        match self.active_pane {
            Pane::Sidebar => self.handle_sidebar_key(key),
            Pane::Messages => self.handle_messages_key(key),
            Pane::Compose => self.handle_compose_key(key, now),
        }
    }

    fn handle_sidebar_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        match key.code {
            KeyCode::Char('q') => self.should_exit = true,
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Up | KeyCode::Char('k') => self.sidebar.select_previous(),
            KeyCode::Down | KeyCode::Char('j') => self.sidebar.select_next(),
            KeyCode::Right => self.active_pane = Pane::Messages,
            KeyCode::Esc => self.view.dismiss_error(),
            KeyCode::Enter => {
                let Some(id) = self.sidebar.selected_conversation().map(|c| c.id.clone()) else {
                    return Vec::new();
                };
                let effects = self.view.open(&id);
                if !effects.is_empty() {
                    self.messages.reset();
                }
                self.active_pane = Pane::Compose;
                return effects;
            }
            _ => {}
        }
        Vec::new()
    }

    fn handle_messages_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        let total = self.view.store().map(|s| s.renderable().len()).unwrap_or(0);
        match key.code {
            KeyCode::Char('q') => self.should_exit = true,
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Up | KeyCode::Char('k') => self.messages.select_previous(total),
            KeyCode::Down | KeyCode::Char('j') => self.messages.select_next(total),
            KeyCode::Left => self.active_pane = Pane::Sidebar,
            KeyCode::Enter | KeyCode::Char('i') => self.active_pane = Pane::Compose,
            KeyCode::Esc => self.view.dismiss_error(),
            KeyCode::Char('r') => {
                if let Some(id) = self.messages.selected_id(&self.view) {
                    if self.view.start_reply(&id) {
                        self.active_pane = Pane::Compose;
                    }
                }
            }
            KeyCode::Char('e') => {
                if let Some(id) = self.messages.selected_id(&self.view) {
                    if self.view.begin_edit(&id) {
                        self.active_pane = Pane::Compose;
                    }
                }
            }
            KeyCode::Char('d') => {
                if let Some(id) = self.messages.selected_id(&self.view) {
                    return self.view.delete(&id);
                }
            }
            KeyCode::Char(c @ '1'..='5') => {
                let index = c as usize - '1' as usize;
                if let Some(id) = self.messages.selected_id(&self.view) {
                    return self.view.react(&id, QUICK_REACTIONS[index]);
                }
            }
            _ => {}
        }
        Vec::new()
    }

    fn handle_compose_key(&mut self, key: KeyEvent, now: Instant) -> Vec<Effect> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => {
                if self.view.composer().is_editing() {
                    self.view.cancel_edit();
                } else if self.view.composer().reply_target().is_some() {
                    self.view.dismiss_reply();
                } else {
                    self.active_pane = Pane::Messages;
                }
                Vec::new()
            }
            KeyCode::Enter => {
                let effects = self.view.submit();
                if !effects.is_empty() {
                    self.messages.follow();
                }
                effects
            }
            KeyCode::Char('u') if ctrl => {
                self.view.composer_mut().clear();
                self.view.input_changed(now)
            }
            KeyCode::Char(_) if ctrl => Vec::new(),
            KeyCode::Char(c) => {
                self.view.composer_mut().insert_char(c);
                self.view.input_changed(now)
            }
            KeyCode::Backspace => {
                self.view.composer_mut().backspace();
                self.view.input_changed(now)
            }
            KeyCode::Delete => {
                self.view.composer_mut().delete();
                self.view.input_changed(now)
            }
            KeyCode::Left => {
                self.view.composer_mut().move_left();
                Vec::new()
            }
            KeyCode::Right => {
                self.view.composer_mut().move_right();
                Vec::new()
            }
            KeyCode::Home => {
                self.view.composer_mut().move_home();
                Vec::new()
            }
            KeyCode::End => {
                self.view.composer_mut().move_end();
                Vec::new()
            }
            KeyCode::Up => {
                self.active_pane = Pane::Messages;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// Apply a backend response.
    pub fn handle_response(&mut self, response: BackendResponse) -> Vec<Effect> {
        match response {
            BackendResponse::Conversations(Ok(conversations)) => {
                tracing::info!("Loaded {} conversations", conversations.len());
                self.sidebar.set_conversations(conversations);
                Vec::new()
            }
            BackendResponse::Conversations(Err(e)) => {
                tracing::warn!("Failed to load conversations: {:#}", e);
                self.sidebar.set_error(format!("{:#}", e));
                Vec::new()
            }
            BackendResponse::Messages { generation, result } => {
                self.view.messages_loaded(generation, result);
                Vec::new()
            }
            BackendResponse::MessageSent { generation, result } => {
                self.view.send_finished(generation, result)
            }
            BackendResponse::Acknowledged { action, result } => {
                if let Err(e) = result {
                    self.view.request_failed(action, &e);
                }
                Vec::new()
            }
        }
    }

    /// Apply a realtime connection event.
    pub fn handle_realtime(&mut self, event: RealtimeEvent, now: Instant) -> Vec<Effect> {
        match event {
            RealtimeEvent::Connected => {
                self.connection = ConnectionState::Connected;
                Vec::new()
            }
            RealtimeEvent::Disconnected(reason) => {
                self.connection = ConnectionState::Disconnected(reason);
                Vec::new()
            }
            RealtimeEvent::Push(push) => self.view.handle_push(push, now),
        }
    }

    /// Render the UI
    pub fn render(&self, frame: &mut ratatui::Frame) {
        ui::render(frame, self);
    }
}

/// Run the TUI application with panic-safe terminal restore
pub async fn run() -> Result<()> {
    let config = Config::load().context("Failed to load config")?;
    let session = config.require_session()?;
    let options = ViewOptions {
        page_size: config.page_size,
        typing_timeout: config.typing_timeout(),
        remote_typing_timeout: config.remote_typing_timeout(),
    };

    let mut terminal = ratatui::init();
    let result = AssertUnwindSafe(run_app(&mut terminal, session, options))
        .catch_unwind()
        .await;
    ratatui::restore();

    match result {
        Ok(r) => r,
        Err(e) => std::panic::resume_unwind(e),
    }
}

async fn run_app(
    terminal: &mut DefaultTerminal,
    session: Session,
    options: ViewOptions,
) -> Result<()> {
    let mut backend = Backend::start(MessagingClient::new(&session));
    let mut realtime = RealtimeHandle::start(session.clone());
    let mut app = App::new(&session, options);

    let mut events = EventStream::new();
    let mut render_tick = time::interval(Duration::from_millis(RENDER_TICK_MS));
    render_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    backend.send(BackendCommand::LoadConversations);

    let dispatch = |effects: Vec<Effect>, backend: &Backend, realtime: &RealtimeHandle| {
        for effect in effects {
            match route(effect, &session) {
                Route::Realtime(event) => realtime.emit(event),
                Route::Backend(cmd) => backend.send(cmd),
            }
        }
    };

    let mut outcome = Ok(());
    while !app.should_exit {
        terminal.draw(|frame| app.render(frame))?;

        let deadline = app.view.next_deadline();
        let effects = tokio::select! {
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) => app.handle_key(key, Instant::now()),
                Some(Ok(_)) => Vec::new(),
                Some(Err(e)) => {
                    outcome = Err(anyhow::Error::new(e).context("Terminal input error"));
                    break;
                }
                None => break,
            },
            Some(response) = backend.recv() => app.handle_response(response),
            Some(event) = realtime.recv() => app.handle_realtime(event, Instant::now()),
            _ = sleep_until(deadline) => app.view.tick(Instant::now()),
            _ = render_tick.tick() => Vec::new(),
        };

        dispatch(effects, &backend, &realtime);
    }

    // Owed stop-typing and leave are flushed before the socket closes.
    dispatch(app.view.close(), &backend, &realtime);
    realtime.shutdown().await;
    outcome
}

/// Sleep until the view's next timer, or forever when none is armed.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::store::tests::msg;
    use crate::models::Conversation;
    use crate::realtime::PushEvent;

    fn session() -> Session {
        Session {
            api_url: "http://localhost:5000/api".to_string(),
            socket_url: "http://localhost:5000".to_string(),
            token: "t".to_string(),
            user_id: "me".to_string(),
            user_name: "Me".to_string(),
            user_name_ar: Some("أنا".to_string()),
        }
    }

    fn app() -> App {
        let mut app = App::new(
            &session(),
            ViewOptions {
                page_size: 50,
                typing_timeout: Duration::from_millis(3000),
                remote_typing_timeout: None,
            },
        );
        let conv: Conversation = serde_json::from_value(serde_json::json!({
            "_id": "c1",
            "isGroup": false,
            "participants": [
                {"_id": "me", "firstName": "Me"},
                {"_id": "u2", "firstName": "Karim", "lastName": "Haddad"}
            ]
        }))
        .unwrap();
        app.sidebar.set_conversations(vec![conv]);
        app
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_route_typing_carries_names() {
        let start = route(
            Effect::Typing {
                conversation_id: "c1".to_string(),
                signal: TypingSignal::Start,
            },
            &session(),
        );
        assert_eq!(
            start,
            Route::Realtime(OutboundEvent::Typing {
                conversation_id: "c1".to_string(),
                user_name: "Me".to_string(),
                user_name_ar: Some("أنا".to_string()),
            })
        );

        let read = route(
            Effect::MarkRead {
                conversation_id: "c1".to_string(),
            },
            &session(),
        );
        assert_eq!(
            read,
            Route::Backend(BackendCommand::MarkRead {
                conversation_id: "c1".to_string()
            })
        );
    }

    #[test]
    fn test_open_type_and_send() {
        let now = Instant::now();
        let mut app = app();

        let effects = app.handle_key(press(KeyCode::Enter), now);
        assert!(effects.contains(&Effect::Join {
            conversation_id: "c1".to_string()
        }));
        assert_eq!(app.active_pane, Pane::Compose);
        assert_eq!(app.conversation_title(), "Karim Haddad");

        let generation = app.view.generation();
        app.handle_response(BackendResponse::Messages {
            generation,
            result: Ok(Vec::new()),
        });

        let effects = app.handle_key(press(KeyCode::Char('h')), now);
        assert_eq!(
            effects,
            vec![Effect::Typing {
                conversation_id: "c1".to_string(),
                signal: TypingSignal::Start
            }]
        );
        app.handle_key(press(KeyCode::Char('i')), now);

        let effects = app.handle_key(press(KeyCode::Enter), now);
        assert!(matches!(effects.as_slice(), [Effect::Send { .. }]));

        let effects = app.handle_response(BackendResponse::MessageSent {
            generation,
            result: Ok(msg("m1", "me", "hi", 1)),
        });
        assert_eq!(
            effects,
            vec![Effect::Typing {
                conversation_id: "c1".to_string(),
                signal: TypingSignal::Stop
            }]
        );
        assert_eq!(app.view.composer().text(), "");
        assert_eq!(app.view.store().unwrap().len(), 1);
    }

    #[test]
    fn test_message_actions_use_selection() {
        let now = Instant::now();
        let mut app = app();
        app.handle_key(press(KeyCode::Enter), now);
        let generation = app.view.generation();
        app.handle_response(BackendResponse::Messages {
            generation,
            result: Ok(vec![msg("m1", "u2", "hello", 1), msg("m2", "me", "hey", 2)]),
        });

        app.active_pane = Pane::Messages;
        app.handle_key(press(KeyCode::Up), now);
        assert_eq!(app.messages.selected_id(&app.view).as_deref(), Some("m2"));
        assert_eq!(
            app.handle_key(press(KeyCode::Char('d')), now),
            vec![Effect::Delete {
                message_id: "m2".to_string()
            }]
        );

        app.handle_key(press(KeyCode::Up), now);
        assert_eq!(
            app.handle_key(press(KeyCode::Char('1')), now),
            vec![Effect::React {
                message_id: "m1".to_string(),
                emoji: "👍".to_string()
            }]
        );

        // Someone else's message cannot be edited; reply is fine.
        app.handle_key(press(KeyCode::Char('e')), now);
        assert_eq!(app.active_pane, Pane::Messages);
        app.handle_key(press(KeyCode::Char('r')), now);
        assert_eq!(app.active_pane, Pane::Compose);
        assert_eq!(
            app.view.composer().reply_target().unwrap().message_id,
            "m1"
        );

        app.handle_key(press(KeyCode::Esc), now);
        assert!(app.view.composer().reply_target().is_none());
    }

    #[test]
    fn test_failed_action_surfaces_error() {
        let mut app = app();
        app.handle_response(BackendResponse::Acknowledged {
            action: "delete message",
            result: Err(anyhow::anyhow!("HTTP 403")),
        });
        assert!(app.view.error().unwrap().contains("delete message"));
    }

    #[test]
    fn test_realtime_events_update_state() {
        let now = Instant::now();
        let mut app = app();
        app.handle_realtime(RealtimeEvent::Connected, now);
        assert_eq!(app.connection, ConnectionState::Connected);

        app.handle_realtime(
            RealtimeEvent::Push(PushEvent::UserOnline {
                user_id: "u2".to_string(),
            }),
            now,
        );
        assert!(app.view.presence().is_online("u2"));

        app.handle_realtime(RealtimeEvent::Disconnected("timeout".to_string()), now);
        assert_eq!(
            app.connection,
            ConnectionState::Disconnected("timeout".to_string())
        );
    }

    #[test]
    fn test_help_and_quit() {
        let now = Instant::now();
        let mut app = app();
        app.handle_key(press(KeyCode::Char('?')), now);
        assert!(app.show_help);
        app.handle_key(press(KeyCode::Char('q')), now);
        assert!(!app.show_help);
        assert!(!app.should_exit);
        app.handle_key(press(KeyCode::Char('q')), now);
        assert!(app.should_exit);
    }
}
