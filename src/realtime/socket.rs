//! Engine.IO WebSocket connection and frame handling

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use super::codec::{self, Packet};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub struct RealtimeSocket {
    stream: WsStream,
}

impl RealtimeSocket {
    /// Connect to the Socket.IO endpoint under `socket_url`.
    ///
    /// Auth happens after the handshake with the namespace connect packet,
    /// not on the WebSocket itself.
    pub async fn connect(socket_url: &str) -> Result<Self> {
        let ws_url = websocket_url(socket_url)?;

        tracing::info!("Connecting WebSocket to {}", ws_url);

        let (stream, response) = connect_async(ws_url.as_str())
            .await
            .context("WebSocket connection failed")?;

        tracing::info!("WebSocket connected (status={})", response.status());

        Ok(Self { stream })
    }

    pub async fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        let text = codec::encode(packet);
        tracing::debug!("WS send: {}", text);
        self.stream
            .send(Message::Text(text))
            .await
            .context("Failed to send WebSocket message")
    }

    /// Receive the next packet.
    ///
    /// Engine.IO pings are answered here before being returned, so the caller
    /// only uses them as a liveness signal. Frames that fail to decode are
    /// logged and skipped. `Ok(None)` means the server closed.
    pub async fn recv_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!("WS recv: {}", text);

                    let packet = match codec::decode(&text) {
                        Ok(packet) => packet,
                        Err(e) => {
                            tracing::warn!("Dropping undecodable frame: {}", e);
                            continue;
                        }
                    };

                    match packet {
                        Packet::Ping => {
                            self.send_packet(&Packet::Pong)
                                .await
                                .context("Failed to answer ping")?;
                            return Ok(Some(Packet::Ping));
                        }
                        Packet::Noop => {}
                        Packet::Close => return Ok(None),
                        other => return Ok(Some(other)),
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .context("Failed to send pong")?;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!("WebSocket closed: {:?}", frame);
                    return Ok(None);
                }
                Some(Ok(other)) => {
                    tracing::debug!("WS frame (ignored): {:?}", other);
                }
                Some(Err(e)) => {
                    return Err(e).context("WebSocket receive error");
                }
                None => {
                    return Ok(None);
                }
            }
        }
    }

    /// Best-effort close; errors are only logged.
    pub async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("WebSocket close failed: {}", e);
        }
    }
}

/// Build the Engine.IO v4 WebSocket URL from the configured socket base.
fn websocket_url(socket_url: &str) -> Result<Url> {
    let mut url = Url::parse(socket_url)
        .with_context(|| format!("Invalid socket URL: {}", socket_url))?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => anyhow::bail!("Unsupported socket URL scheme: {}", other),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow::anyhow!("Cannot use scheme {} for {}", scheme, socket_url))?;

    let path = format!("{}/socket.io/", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url() {
        assert_eq!(
            websocket_url("https://chat.example.org").unwrap().as_str(),
            "wss://chat.example.org/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            websocket_url("http://localhost:5000/").unwrap().as_str(),
            "ws://localhost:5000/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            websocket_url("https://example.org/rt").unwrap().as_str(),
            "wss://example.org/rt/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn test_websocket_url_rejects_other_schemes() {
        assert!(websocket_url("ftp://example.org").is_err());
        assert!(websocket_url("not a url").is_err());
    }
}
