//! Socket.IO v5 over Engine.IO v4 frame codec
//!
//! Text frames only. Layout:
//!   0{json}            Engine.IO open (handshake)
//!   1                  Engine.IO close
//!   2 / 3              Engine.IO ping / pong
//!   6                  Engine.IO noop
//!   40[/nsp,]{json}    Socket.IO connect (client: auth, server: sid)
//!   41[/nsp,]          Socket.IO disconnect
//!   42[/nsp,][ack]["event",payload]
//!   43[/nsp,]ack[...]  ack response (ignored by this client)
//!   44[/nsp,]{json}    connect error

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Engine.IO handshake sent by the server on connect.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Noop,
    Connect(Option<Value>),
    Disconnect,
    Event {
        name: String,
        payload: Value,
        ack_id: Option<u64>,
    },
    Ack,
    ConnectError(Value),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,

    #[error("unknown Engine.IO packet type '{0}'")]
    UnknownEnginePacket(char),

    #[error("unknown Socket.IO packet type '{0}'")]
    UnknownSocketPacket(char),

    #[error("invalid JSON in frame: {0}")]
    Json(String),

    #[error("malformed event frame: {0}")]
    MalformedEvent(String),
}

/// Decode one text frame.
pub fn decode(frame: &str) -> Result<Packet, FrameError> {
    let mut chars = frame.chars();
    let engine_type = chars.next().ok_or(FrameError::Empty)?;
    let rest = chars.as_str();

    match engine_type {
        '0' => {
            let handshake: Handshake =
                serde_json::from_str(rest).map_err(|e| FrameError::Json(e.to_string()))?;
            Ok(Packet::Open(handshake))
        }
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '6' => Ok(Packet::Noop),
        '4' => decode_socket(rest),
        other => Err(FrameError::UnknownEnginePacket(other)),
    }
}

fn decode_socket(body: &str) -> Result<Packet, FrameError> {
    let mut chars = body.chars();
    let socket_type = chars.next().ok_or(FrameError::Empty)?;
    let rest = strip_namespace(chars.as_str());

    match socket_type {
        '0' => {
            if rest.is_empty() {
                return Ok(Packet::Connect(None));
            }
            let value: Value =
                serde_json::from_str(rest).map_err(|e| FrameError::Json(e.to_string()))?;
            Ok(Packet::Connect(Some(value)))
        }
        '1' => Ok(Packet::Disconnect),
        '2' => decode_event(rest),
        '3' => Ok(Packet::Ack),
        '4' => {
            let value: Value = serde_json::from_str(rest).unwrap_or(Value::String(rest.to_string()));
            Ok(Packet::ConnectError(value))
        }
        other => Err(FrameError::UnknownSocketPacket(other)),
    }
}

/// Drop a leading "/namespace," prefix.
fn strip_namespace(body: &str) -> &str {
    if !body.starts_with('/') {
        return body;
    }
    match body.find(',') {
        Some(pos) => &body[pos + 1..],
        // Namespace with no payload, e.g. "40/chat"
        None => "",
    }
}

fn decode_event(body: &str) -> Result<Packet, FrameError> {
    let digits = body.chars().take_while(|c| c.is_ascii_digit()).count();
    let ack_id = if digits > 0 {
        body[..digits].parse().ok()
    } else {
        None
    };

    let args: Vec<Value> =
        serde_json::from_str(&body[digits..]).map_err(|e| FrameError::Json(e.to_string()))?;
    let mut args = args.into_iter();
    let name = match args.next() {
        Some(Value::String(name)) => name,
        Some(other) => {
            return Err(FrameError::MalformedEvent(format!(
                "event name is not a string: {}",
                other
            )))
        }
        None => return Err(FrameError::MalformedEvent("no event name".to_string())),
    };
    let payload = args.next().unwrap_or(Value::Null);

    Ok(Packet::Event {
        name,
        payload,
        ack_id,
    })
}

/// Encode a frame for sending.
pub fn encode(packet: &Packet) -> String {
    match packet {
        Packet::Open(handshake) => format!(
            "0{}",
            serde_json::json!({
                "sid": handshake.sid,
                "pingInterval": handshake.ping_interval,
                "pingTimeout": handshake.ping_timeout,
            })
        ),
        Packet::Close => "1".to_string(),
        Packet::Ping => "2".to_string(),
        Packet::Pong => "3".to_string(),
        Packet::Noop => "6".to_string(),
        Packet::Connect(None) => "40".to_string(),
        Packet::Connect(Some(auth)) => format!("40{}", auth),
        Packet::Disconnect => "41".to_string(),
        Packet::Event {
            name,
            payload,
            ack_id,
        } => {
            let args = if payload.is_null() {
                serde_json::json!([name])
            } else {
                serde_json::json!([name, payload])
            };
            match ack_id {
                Some(id) => format!("42{}{}", id, args),
                None => format!("42{}", args),
            }
        }
        Packet::Ack => "43".to_string(),
        Packet::ConnectError(value) => format!("44{}", value),
    }
}

/// Shorthand for an outbound event without ack.
pub fn event(name: &str, payload: Value) -> Packet {
    Packet::Event {
        name: name.to_string(),
        payload,
        ack_id: None,
    }
}
