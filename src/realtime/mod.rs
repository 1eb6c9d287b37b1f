//! Realtime push client
//!
//! Keeps a Socket.IO connection to the chat server open, forwards push
//! events to the caller and sends join/leave/typing signals. Reconnects
//! with exponential backoff and re-joins the open conversation.

pub mod codec;
pub mod events;
pub mod socket;

pub use events::{OutboundEvent, PushEvent};

use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;

use crate::chat::PresenceTracker;
use crate::config::{Config, Session};
use codec::Packet;
use socket::RealtimeSocket;

/// Upper bound for the reconnect delay, in seconds.
const MAX_BACKOFF_SECS: u64 = 64;

/// A session this long is considered stable and resets the backoff.
const STABILITY_THRESHOLD: Duration = Duration::from_secs(60);

/// How long to wait for the handshake and namespace connect.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

/// How long `shutdown` waits for queued signals to be flushed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// What the connection reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    Connected,
    Disconnected(String),
    Push(PushEvent),
}

/// Reason the inner connection loop exited.
enum DisconnectReason {
    /// Owner dropped the handle. Do not reconnect.
    Shutdown,
    /// Error or server-initiated close. Should reconnect.
    Error(anyhow::Error),
}

/// Owner side of the realtime connection.
pub struct RealtimeHandle {
    cmd_tx: mpsc::UnboundedSender<OutboundEvent>,
    event_rx: mpsc::UnboundedReceiver<RealtimeEvent>,
    task: JoinHandle<()>,
}

impl RealtimeHandle {
    /// Spawn the connection task. It runs until the handle is dropped.
    pub fn start(session: Session) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let connection = Connection {
            session,
            joined: None,
            cmd_rx,
            event_tx,
        };
        let task = tokio::spawn(connection.connect_and_run());

        Self {
            cmd_tx,
            event_rx,
            task,
        }
    }

    /// Queue an outbound signal (non-blocking).
    pub fn emit(&self, event: OutboundEvent) {
        if self.cmd_tx.send(event).is_err() {
            tracing::error!("Realtime channel closed -- signal dropped");
        }
    }

    /// Next connection or push event. `None` once the task has stopped.
    pub async fn recv(&mut self) -> Option<RealtimeEvent> {
        self.event_rx.recv().await
    }
    /// Close the connection after the queued signals have been sent.
    ///
    /// The task drains the command channel, sends the namespace disconnect
    /// and closes the socket. Gives up after `SHUTDOWN_GRACE`.
    pub async fn shutdown(self) {
        let Self {
            cmd_tx,
            event_rx,
            task,
        } = self;
        drop(cmd_tx);

        match time::timeout(SHUTDOWN_GRACE, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Realtime task failed: {}", e),
            Err(_) => tracing::warn!(
                "Realtime task still running after {:?}, dropping it",
                SHUTDOWN_GRACE
            ),
        }
        // Held until here so pushes arriving mid-flush don't end the session early.
        drop(event_rx);
    }
}

/// Connection task state that survives reconnects.
struct Connection {
    session: Session,
    /// Conversation to re-join after a reconnect.
    joined: Option<String>,
    cmd_rx: mpsc::UnboundedReceiver<OutboundEvent>,
    event_tx: mpsc::UnboundedSender<RealtimeEvent>,
}

impl Connection {
    /// Run the connection with automatic reconnection.
    ///
    /// Backoff doubles from 1s up to 64s and resets after a session that
    /// stayed up for at least a minute.
    async fn connect_and_run(mut self) {
        let mut backoff = 1u64;

        loop {
            let started = Instant::now();
            let reason = self.run_session().await;
            let stable = started.elapsed() >= STABILITY_THRESHOLD;

            let err = match reason {
                DisconnectReason::Shutdown => {
                    tracing::info!("Realtime connection shut down");
                    return;
                }
                DisconnectReason::Error(e) => e,
            };

            if stable {
                backoff = 1;
            }
            tracing::warn!(
                "Realtime disconnected: {:#}. Reconnecting in {}s...",
                err,
                backoff
            );
            if self
                .event_tx
                .send(RealtimeEvent::Disconnected(format!("{:#}", err)))
                .is_err()
            {
                return;
            }

            if !self.wait(Duration::from_secs(backoff)).await {
                tracing::info!("Realtime connection shut down");
                return;
            }
            backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
        }
    }

    /// Sleep between attempts while still tracking join/leave.
    ///
    /// Returns false when the owner went away.
    async fn wait(&mut self, delay: Duration) -> bool {
        let sleep = time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(event) => {
                        self.track(&event);
                        tracing::debug!("Offline, dropping signal {:?}", event);
                    }
                    None => return false,
                },
            }
        }
    }

    /// Remember which conversation is joined.
    fn track(&mut self, event: &OutboundEvent) {
        match event {
            OutboundEvent::Join { conversation_id } => {
                self.joined = Some(conversation_id.clone());
            }
            OutboundEvent::Leave { conversation_id } => {
                if self.joined.as_deref() == Some(conversation_id.as_str()) {
                    self.joined = None;
                }
            }
            OutboundEvent::Typing { .. } | OutboundEvent::StopTyping { .. } => {}
        }
    }

    /// One connection: handshake, auth, re-join, event loop.
    async fn run_session(&mut self) -> DisconnectReason {
        let (mut ws, ping_deadline) = match time::timeout(HANDSHAKE_TIMEOUT, self.open()).await {
            Ok(Ok(opened)) => opened,
            Ok(Err(e)) => return DisconnectReason::Error(e),
            Err(_) => return DisconnectReason::Error(anyhow::anyhow!("Handshake timed out")),
        };

        if self.event_tx.send(RealtimeEvent::Connected).is_err() {
            ws.close().await;
            return DisconnectReason::Shutdown;
        }

        if let Some(conversation_id) = self.joined.clone() {
            tracing::info!("Re-joining conversation {}", conversation_id);
            let join = OutboundEvent::Join { conversation_id };
            if let Err(e) = ws.send_packet(&join.to_packet()).await {
                return DisconnectReason::Error(e.context("Re-join failed"));
            }
        }

        // The server pings every ping_interval; silence past
        // interval + timeout means the connection is dead.
        let watchdog = time::sleep(ping_deadline);
        tokio::pin!(watchdog);

        let reason = loop {
            tokio::select! {
                packet = ws.recv_packet() => {
                    match packet {
                        Ok(Some(packet)) => {
                            watchdog.as_mut().reset(time::Instant::now() + ping_deadline);
                            if let Err(e) = self.handle_packet(packet) {
                                break e;
                            }
                        }
                        Ok(None) => {
                            break DisconnectReason::Error(anyhow::anyhow!("WebSocket closed by server"));
                        }
                        Err(e) => {
                            break DisconnectReason::Error(e.context("WebSocket recv error"));
                        }
                    }
                }
                cmd = self.cmd_rx.recv() => {
                    let Some(event) = cmd else {
                        break DisconnectReason::Shutdown;
                    };
                    self.track(&event);
                    if let Err(e) = ws.send_packet(&event.to_packet()).await {
                        break DisconnectReason::Error(e.context("Signal send failed"));
                    }
                }
                _ = &mut watchdog => {
                    break DisconnectReason::Error(anyhow::anyhow!("Ping timeout"));
                }
            }
        };

        if matches!(reason, DisconnectReason::Shutdown) {
            while let Ok(event) = self.cmd_rx.try_recv() {
                if let Err(e) = ws.send_packet(&event.to_packet()).await {
                    tracing::debug!("Queued signal not sent: {:#}", e);
                    break;
                }
            }
            if let Err(e) = ws.send_packet(&Packet::Disconnect).await {
                tracing::debug!("Disconnect packet not sent: {:#}", e);
            }
            ws.close().await;
        }
        reason
    }

    /// Connect, read the Engine.IO handshake, and authenticate the namespace.
    ///
    /// Returns the socket and the liveness deadline derived from the handshake.
    async fn open(&mut self) -> Result<(RealtimeSocket, Duration)> {
        let mut ws = RealtimeSocket::connect(&self.session.socket_url).await?;

        let handshake = match ws
            .recv_packet()
            .await?
            .context("Connection closed before handshake")?
        {
            Packet::Open(handshake) => handshake,
            other => anyhow::bail!("Expected Engine.IO open, got {:?}", other),
        };
        tracing::info!(
            "Engine.IO session {} (ping every {}ms)",
            handshake.sid,
            handshake.ping_interval
        );

        let auth = serde_json::json!({ "token": self.session.token });
        ws.send_packet(&Packet::Connect(Some(auth))).await?;

        loop {
            match ws
                .recv_packet()
                .await?
                .context("Connection closed before namespace connect")?
            {
                Packet::Connect(_) => break,
                Packet::ConnectError(reason) => {
                    anyhow::bail!("Server rejected connection: {}", reason)
                }
                Packet::Ping => {}
                other => tracing::debug!("Ignoring {:?} before connect", other),
            }
        }
        tracing::info!("Realtime connected");

        let deadline = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
        Ok((ws, deadline))
    }

    /// Route one packet. An `Err` ends the session.
    fn handle_packet(&mut self, packet: Packet) -> std::result::Result<(), DisconnectReason> {
        match packet {
            Packet::Event { name, payload, .. } => match PushEvent::decode(&name, payload) {
                Ok(Some(event)) => {
                    if self.event_tx.send(RealtimeEvent::Push(event)).is_err() {
                        return Err(DisconnectReason::Shutdown);
                    }
                }
                Ok(None) => tracing::debug!("Ignoring event {}", name),
                Err(e) => tracing::warn!("Dropping malformed {} event: {:#}", name, e),
            },
            Packet::Disconnect => {
                return Err(DisconnectReason::Error(anyhow::anyhow!(
                    "Server disconnected the namespace"
                )));
            }
            Packet::ConnectError(reason) => {
                return Err(DisconnectReason::Error(anyhow::anyhow!(
                    "Connect error: {}",
                    reason
                )));
            }
            Packet::Ping | Packet::Pong | Packet::Ack | Packet::Connect(_) => {}
            other => tracing::debug!("Unexpected packet {:?}", other),
        }
        Ok(())
    }
}

/// Stream push events for one conversation to stdout until Ctrl-C.
pub async fn watch(conversation_id: &str) -> Result<()> {
    let config = Config::load().context("Failed to load config")?;
    let session = config.require_session()?;
    let user_id = session.user_id.clone();
    let presence = PresenceTracker::new();

    let mut handle = RealtimeHandle::start(session);
    handle.emit(OutboundEvent::Join {
        conversation_id: conversation_id.to_string(),
    });

    println!("Watching {} (Ctrl-C to stop)", conversation_id);

    loop {
        tokio::select! {
            event = handle.recv() => {
                let Some(event) = event else {
                    anyhow::bail!("Realtime connection stopped");
                };
                match event {
                    RealtimeEvent::Push(PushEvent::UserOnline { ref user_id }) => {
                        presence.mark_online(user_id)
                    }
                    RealtimeEvent::Push(PushEvent::UserOffline { ref user_id }) => {
                        presence.mark_offline(user_id)
                    }
                    _ => {}
                }
                if let Some(line) = describe(&event, conversation_id, &user_id, &presence) {
                    println!("{}", line);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                handle.emit(OutboundEvent::Leave {
                    conversation_id: conversation_id.to_string(),
                });
                handle.shutdown().await;
                return Ok(());
            }
        }
    }
}

/// One printable line for a realtime event, if it concerns `conversation_id`.
fn describe(
    event: &RealtimeEvent,
    conversation_id: &str,
    user_id: &str,
    presence: &PresenceTracker,
) -> Option<String> {
    let push = match event {
        RealtimeEvent::Connected => return Some("[connected]".to_string()),
        RealtimeEvent::Disconnected(reason) => {
            return Some(format!("[disconnected] {}", reason))
        }
        RealtimeEvent::Push(push) => push,
    };

    match push {
        PushEvent::NewMessage {
            conversation_id: c,
            message,
        } if c == conversation_id => {
            let sender = message
                .sender
                .as_ref()
                .map(|s| s.display_name())
                .unwrap_or_else(|| "?".to_string());
            Some(format!(
                "[{}] {}: {}",
                message.created_at.format("%H:%M"),
                sender,
                message.display_text()
            ))
        }
        PushEvent::MessageUpdated {
            conversation_id: c,
            message,
        } if c == conversation_id => Some(format!(
            "[edited] {}: {}",
            message.id,
            message.display_text()
        )),
        PushEvent::MessageDeleted {
            conversation_id: c,
            message_id,
            ..
        } if c == conversation_id => Some(format!("[deleted] {}", message_id)),
        PushEvent::TypingStarted {
            conversation_id: c,
            entry,
        } if c == conversation_id && entry.user_id != user_id => {
            Some(format!("{} is typing...", entry.user_name))
        }
        PushEvent::UserOnline { user_id } | PushEvent::UserOffline { user_id } => {
            let state = if presence.is_online(user_id) {
                "online"
            } else {
                "offline"
            };
            Some(format!(
                "[{}] {} (online: {})",
                state,
                user_id,
                presence.snapshot().join(", ")
            ))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::store::tests::msg;
    use crate::chat::TypingEntry;
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    fn session(socket_url: &str) -> Session {
        Session {
            api_url: "http://localhost:5000/api".to_string(),
            socket_url: socket_url.to_string(),
            token: "t".to_string(),
            user_id: "me".to_string(),
            user_name: "Me".to_string(),
            user_name_ar: None,
        }
    }

    fn connection() -> (
        Connection,
        mpsc::UnboundedSender<OutboundEvent>,
        mpsc::UnboundedReceiver<RealtimeEvent>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let connection = Connection {
            session: session("http://localhost:5000"),
            joined: None,
            cmd_rx,
            event_tx,
        };
        (connection, cmd_tx, event_rx)
    }

    #[test]
    fn test_track_joined_conversation() {
        let (mut conn, _cmd_tx, _event_rx) = connection();
        conn.track(&OutboundEvent::Join {
            conversation_id: "c1".to_string(),
        });
        assert_eq!(conn.joined.as_deref(), Some("c1"));

        // Leaving some other conversation keeps c1.
        conn.track(&OutboundEvent::Leave {
            conversation_id: "c0".to_string(),
        });
        assert_eq!(conn.joined.as_deref(), Some("c1"));

        conn.track(&OutboundEvent::StopTyping {
            conversation_id: "c1".to_string(),
        });
        conn.track(&OutboundEvent::Leave {
            conversation_id: "c1".to_string(),
        });
        assert!(conn.joined.is_none());
    }

    #[test]
    fn test_handle_packet_forwards_push_events() {
        let (mut conn, _cmd_tx, mut event_rx) = connection();
        let packet = codec::decode(r#"42["user-online",{"userId":"u2"}]"#).unwrap();
        assert!(conn.handle_packet(packet).is_ok());
        assert_eq!(
            event_rx.try_recv().unwrap(),
            RealtimeEvent::Push(PushEvent::UserOnline {
                user_id: "u2".to_string()
            })
        );

        // Unknown and malformed events are skipped.
        let unknown = codec::decode(r#"42["poll-created",{}]"#).unwrap();
        assert!(conn.handle_packet(unknown).is_ok());
        let malformed = codec::decode(r#"42["user-stop-typing",{"x":1}]"#).unwrap();
        assert!(conn.handle_packet(malformed).is_ok());
        assert!(event_rx.try_recv().is_err());
    }

    #[test]
    fn test_handle_packet_disconnect_ends_session() {
        let (mut conn, _cmd_tx, _event_rx) = connection();
        assert!(matches!(
            conn.handle_packet(Packet::Disconnect),
            Err(DisconnectReason::Error(_))
        ));
    }

    #[test]
    fn test_handle_packet_shutdown_when_owner_gone() {
        let (mut conn, _cmd_tx, event_rx) = connection();
        drop(event_rx);
        let packet = codec::decode(r#"42["user-offline",{"userId":"u2"}]"#).unwrap();
        assert!(matches!(
            conn.handle_packet(packet),
            Err(DisconnectReason::Shutdown)
        ));
    }

    #[tokio::test]
    async fn test_wait_tracks_joins_and_stops_on_close() {
        let (mut conn, cmd_tx, _event_rx) = connection();
        cmd_tx
            .send(OutboundEvent::Join {
                conversation_id: "c2".to_string(),
            })
            .unwrap();
        assert!(conn.wait(Duration::from_millis(20)).await);
        assert_eq!(conn.joined.as_deref(), Some("c2"));

        drop(cmd_tx);
        assert!(!conn.wait(Duration::from_secs(5)).await);
    }

    /// Accept one client, complete the handshake and namespace connect,
    /// then collect every packet until the client closes.
    async fn serve_one(listener: TcpListener) -> Vec<Packet> {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

        let open = Packet::Open(codec::Handshake {
            sid: "s1".to_string(),
            ping_interval: 25_000,
            ping_timeout: 20_000,
        });
        ws.send(Message::Text(codec::encode(&open))).await.unwrap();

        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                assert_eq!(
                    codec::decode(&text).unwrap(),
                    Packet::Connect(Some(serde_json::json!({ "token": "t" })))
                );
            }
            other => panic!("expected namespace connect, got {:?}", other),
        }
        let connected = Packet::Connect(Some(serde_json::json!({ "sid": "n1" })));
        ws.send(Message::Text(codec::encode(&connected))).await.unwrap();

        let mut received = Vec::new();
        while let Some(Ok(frame)) = ws.next().await {
            match frame {
                Message::Text(text) => received.push(codec::decode(&text).unwrap()),
                Message::Close(_) => break,
                _ => {}
            }
        }
        received
    }

    #[tokio::test]
    async fn test_shutdown_flushes_queued_signals() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_one(listener));

        let mut handle = RealtimeHandle::start(session(&format!("http://{}", addr)));
        assert_eq!(handle.recv().await, Some(RealtimeEvent::Connected));

        let signals = vec![
            OutboundEvent::Join {
                conversation_id: "c1".to_string(),
            },
            OutboundEvent::StopTyping {
                conversation_id: "c1".to_string(),
            },
            OutboundEvent::Leave {
                conversation_id: "c1".to_string(),
            },
        ];
        for signal in &signals {
            handle.emit(signal.clone());
        }
        handle.shutdown().await;

        let mut expected: Vec<Packet> = signals.iter().map(|s| s.to_packet()).collect();
        expected.push(Packet::Disconnect);
        assert_eq!(server.await.unwrap(), expected);
    }

    #[test]
    fn test_describe_filters_by_conversation() {
        let presence = PresenceTracker::new();
        let push = |conversation_id: &str| {
            RealtimeEvent::Push(PushEvent::NewMessage {
                conversation_id: conversation_id.to_string(),
                message: msg("m1", "u2", "hello", 5),
            })
        };
        assert_eq!(
            describe(&push("c1"), "c1", "me", &presence).as_deref(),
            Some("[10:05] u2: hello")
        );
        assert!(describe(&push("c2"), "c1", "me", &presence).is_none());

        let own_typing = RealtimeEvent::Push(PushEvent::TypingStarted {
            conversation_id: "c1".to_string(),
            entry: TypingEntry {
                user_id: "me".to_string(),
                user_name: "Me".to_string(),
                user_name_ar: None,
            },
        });
        assert!(describe(&own_typing, "c1", "me", &presence).is_none());
    }

    #[test]
    fn test_describe_presence_lists_online_users() {
        let presence = PresenceTracker::new();
        presence.mark_online("u3");
        presence.mark_online("u2");
        let online = RealtimeEvent::Push(PushEvent::UserOnline {
            user_id: "u2".to_string(),
        });
        assert_eq!(
            describe(&online, "c1", "me", &presence).as_deref(),
            Some("[online] u2 (online: u2, u3)")
        );

        presence.mark_offline("u2");
        let offline = RealtimeEvent::Push(PushEvent::UserOffline {
            user_id: "u2".to_string(),
        });
        assert_eq!(
            describe(&offline, "c1", "me", &presence).as_deref(),
            Some("[offline] u2 (online: u3)")
        );
    }
}
