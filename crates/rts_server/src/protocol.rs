//! JSON wire protocol.
//!
//! Every WebSocket text frame is an object `{"event": name, "payload": ...}`.
//! A client frame may carry `"ack": n`; the server answers it with an `ack`
//! frame whose payload repeats `n` next to `ok` and, when refused, `reason`.

use rts_core::commands::Command;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ServerError;

/// Server to client event names.
#[allow(missing_docs)]
pub mod events {
    pub const ACK: &str = "ack";
    pub const LOBBY_LIST: &str = "lobbyList";
    pub const LOBBY_JOINED: &str = "lobbyJoined";
    pub const LOBBY_UPDATE: &str = "lobbyUpdate";
    pub const LOBBY_LEFT: &str = "lobbyLeft";
    pub const QUEUE: &str = "queue";
    pub const MATCH_START: &str = "matchStart";
    pub const STATE_UPDATE: &str = "stateUpdate";
}

/// A frame as sent by a client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientFrame {
    /// Event name.
    pub event: String,
    /// Event payload; anything at all.
    #[serde(default)]
    pub payload: Value,
    /// Acknowledgement request id.
    #[serde(default)]
    pub ack: Option<u64>,
}

/// Decode one text frame.
pub fn parse_frame(text: &str) -> Result<ClientFrame, ServerError> {
    Ok(serde_json::from_str(text)?)
}

#[derive(Serialize)]
struct Frame<'a, T: ?Sized> {
    event: &'a str,
    payload: &'a T,
}

/// Encode one server frame.
pub fn encode<T: Serialize + ?Sized>(event: &str, payload: &T) -> Result<String, ServerError> {
    Ok(serde_json::to_string(&Frame { event, payload })?)
}

#[derive(Serialize)]
struct AckPayload<'a, T> {
    ack: u64,
    #[serde(flatten)]
    body: &'a T,
}

/// Encode the answer to the request tagged `ack`.
pub fn encode_ack<T: Serialize>(ack: u64, body: &T) -> Result<String, ServerError> {
    encode(events::ACK, &AckPayload { ack, body })
}

/// Answer to a lobby or queue request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    /// Lobby id, for lobby requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Reply {
    /// Success.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            ok: true,
            reason: None,
            id: None,
        }
    }

    /// Success naming a lobby.
    #[must_use]
    pub fn lobby(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::ok()
        }
    }

    /// Refusal.
    #[must_use]
    pub const fn refused(reason: &'static str) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
            id: None,
        }
    }
}

/// Payload of `queue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub status: &'static str,
}

/// Payload of `lobbyLeft`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LobbyLeft {
    pub reason: &'static str,
}

/// A decoded `command` payload.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandPayload {
    /// A command the simulation understands.
    Parsed(Command),
    /// Not an object, or no string `type`.
    Invalid,
    /// An object with a `type` that did not decode; ignored.
    Unreadable(String),
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    RequestLobbies,
    CreateLobby { name: Option<String> },
    JoinLobby { lobby: Option<String> },
    LeaveLobby,
    StartLobby { lobby: Option<String> },
    SetLobbyCheats { lobby: Option<String>, allow: bool },
    SetLobbyColor { lobby: Option<String>, color: String },
    SetLobbyTeam { lobby: Option<String>, team: Option<f64> },
    Play,
    CancelQueue,
    Singleplayer,
    Command(CommandPayload),
}

impl ClientEvent {
    /// Interpret a frame. Unknown event names give `None`.
    ///
    /// Lobby payloads are read leniently: a missing or non-object payload
    /// behaves like an empty one. Id lists in commands are cut to
    /// `max_ids` entries before decoding.
    #[must_use]
    pub fn from_frame(frame: &ClientFrame, max_ids: usize) -> Option<Self> {
        let field = |key: &str| frame.payload.as_object().and_then(|o| o.get(key));
        let lobby = || field("id").and_then(text);
        let event = match frame.event.as_str() {
            "requestLobbies" => ClientEvent::RequestLobbies,
            "createLobby" => ClientEvent::CreateLobby {
                name: field("name").and_then(text),
            },
            "joinLobby" => ClientEvent::JoinLobby { lobby: lobby() },
            "leaveLobby" => ClientEvent::LeaveLobby,
            "startLobby" => ClientEvent::StartLobby { lobby: lobby() },
            "setLobbyCheats" => ClientEvent::SetLobbyCheats {
                lobby: lobby(),
                allow: field("allowCheats").is_some_and(truthy),
            },
            "setLobbyColor" => ClientEvent::SetLobbyColor {
                lobby: lobby(),
                color: field("colorId").and_then(text).unwrap_or_default(),
            },
            "setLobbyTeam" => ClientEvent::SetLobbyTeam {
                lobby: lobby(),
                team: field("team").and_then(number),
            },
            "play" => ClientEvent::Play,
            "cancelQueue" => ClientEvent::CancelQueue,
            "singleplayer" => ClientEvent::Singleplayer,
            "command" => ClientEvent::Command(parse_command(&frame.payload, max_ids)),
            _ => return None,
        };
        Some(event)
    }
}

/// Decode a `command` payload.
#[must_use]
pub fn parse_command(payload: &Value, max_ids: usize) -> CommandPayload {
    let Some(object) = payload.as_object() else {
        return CommandPayload::Invalid;
    };
    let Some(kind) = object.get("type").and_then(Value::as_str) else {
        return CommandPayload::Invalid;
    };
    let kind = kind.to_string();
    match serde_json::from_value(Value::Object(truncate_id_lists(object, max_ids))) {
        Ok(command) => CommandPayload::Parsed(command),
        Err(_) => CommandPayload::Unreadable(kind),
    }
}

fn truncate_id_lists(object: &Map<String, Value>, max_ids: usize) -> Map<String, Value> {
    object
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::Array(items) if key.ends_with("Ids") && items.len() > max_ids => {
                    Value::Array(items[..max_ids].to_vec())
                }
                other => other.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}

/// Non-empty strings, and numbers written out.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        _ => None,
    }
}
