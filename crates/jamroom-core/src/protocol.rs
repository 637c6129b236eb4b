//! Signaling wire format.
//!
//! Frames are JSON text messages. The canonical shape is an envelope
//! `{"event": "<name>", "data": <payload>}`; inbound frames may also use the
//! positional array shape `["join-room", "<sessionId>", "<peerId>"]` emitted
//! by socket-style clients.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::ValidationError;
use crate::ids::{PeerId, SessionId};

pub const JOIN_ROOM: &str = "join-room";
pub const VIEWER_JOINING: &str = "viewer joining";
pub const VIEWER_LEAVING: &str = "viewer leaving";

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("unknown event: {0}")]
    UnknownEvent(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Client → server events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    JoinRoom { session_id: SessionId, peer_id: PeerId },
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct JoinRoomData {
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(rename = "peerId")]
    peer_id: String,
}

impl InboundEvent {
    /// Parse and validate one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let (session_id, peer_id) = match value {
            Value::Array(items) => {
                let mut items = items.into_iter();
                let event = match items.next() {
                    Some(Value::String(e)) => e,
                    _ => return Err(ProtocolError::Malformed("missing event name".into())),
                };
                if event != JOIN_ROOM {
                    return Err(ProtocolError::UnknownEvent(event));
                }
                match (items.next(), items.next()) {
                    (Some(Value::String(s)), Some(Value::String(p))) => (s, p),
                    _ => {
                        return Err(ProtocolError::Malformed(
                            "join-room expects sessionId and peerId strings".into(),
                        ))
                    }
                }
            }
            other => {
                let envelope: Envelope = serde_json::from_value(other)
                    .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
                if envelope.event != JOIN_ROOM {
                    return Err(ProtocolError::UnknownEvent(envelope.event));
                }
                let data: JoinRoomData = serde_json::from_value(envelope.data)
                    .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
                (data.session_id, data.peer_id)
            }
        };

        Ok(Self::JoinRoom {
            session_id: SessionId::parse(&session_id)?,
            peer_id: PeerId::parse(&peer_id)?,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => JOIN_ROOM,
        }
    }
}

/// Server → client events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundEvent {
    ViewerJoining { peer_id: PeerId },
    /// `peer_id` is only set when the leave-payload extension is enabled.
    ViewerLeaving { peer_id: Option<PeerId> },
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ViewerJoining { .. } => VIEWER_JOINING,
            Self::ViewerLeaving { .. } => VIEWER_LEAVING,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::ViewerJoining { peer_id } => json!({
                "event": VIEWER_JOINING,
                "data": { "peerId": peer_id },
            }),
            Self::ViewerLeaving { peer_id: None } => json!({ "event": VIEWER_LEAVING }),
            Self::ViewerLeaving {
                peer_id: Some(peer_id),
            } => json!({
                "event": VIEWER_LEAVING,
                "data": { "peerId": peer_id },
            }),
        }
    }

    /// Serialized text frame.
    pub fn to_frame(&self) -> String {
        self.to_json().to_string()
    }
}
