//! JSON wire protocol for the chat transport.
//!
//! Every frame is a WebSocket text message holding one JSON object tagged
//! by `type`:
//! ```text
//! client → server   {"type":"join"}
//!                   {"type":"message","text":"hi"}
//!                   {"type":"leave"}
//!                   {"type":"ping"}
//!
//! server → client   {"type":"welcome","connection_id":"…","max_users":5}
//!                   {"type":"member-joined","room_id":"room-1","member":"…","occupancy":2}
//!                   {"type":"message","room_id":"room-1","from":"…","text":"hi"}
//!                   {"type":"member-left","room_id":"room-1","member":"…","occupancy":1}
//!                   {"type":"rejected","kind":"protocol-violation","reason":"…"}
//!                   {"type":"pong"}
//! ```

use huddle_core::{ClientEvent, ConnectionId, ErrorKind, RoomEvent, RoomId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Frames sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientFrame {
    /// Ask to be placed in a room
    Join,
    /// Chat text for the current room
    Message { text: String },
    /// Leave the room (ends the session)
    Leave,
    /// Application-level heartbeat
    Ping,
}

impl ClientFrame {
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message { text: text.into() }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::DeserializationError(e.to_string()))
    }

    /// The allocator event this frame maps to; `None` for transport-only
    /// frames such as ping.
    pub fn into_event(self) -> Option<ClientEvent> {
        match self {
            Self::Join => Some(ClientEvent::Join),
            Self::Message { text } => Some(ClientEvent::Message(text)),
            Self::Leave => Some(ClientEvent::Leave),
            Self::Ping => None,
        }
    }
}

/// Why a client frame was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectKind {
    ProtocolViolation,
    ResourceExhaustion,
    MalformedFrame,
}

impl From<ErrorKind> for RejectKind {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::ProtocolViolation => Self::ProtocolViolation,
            ErrorKind::ResourceExhaustion | ErrorKind::Configuration => Self::ResourceExhaustion,
        }
    }
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerFrame {
    /// First frame on every connection
    Welcome {
        connection_id: ConnectionId,
        max_users: usize,
    },
    MemberJoined {
        room_id: RoomId,
        member: ConnectionId,
        occupancy: usize,
    },
    Message {
        room_id: RoomId,
        from: ConnectionId,
        text: String,
    },
    MemberLeft {
        room_id: RoomId,
        member: ConnectionId,
        occupancy: usize,
    },
    Rejected {
        kind: RejectKind,
        reason: String,
    },
    Pong,
}

impl ServerFrame {
    pub fn rejected(kind: RejectKind, reason: impl Into<String>) -> Self {
        Self::Rejected {
            kind,
            reason: reason.into(),
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::DeserializationError(e.to_string()))
    }
}

impl From<RoomEvent> for ServerFrame {
    fn from(event: RoomEvent) -> Self {
        match event {
            RoomEvent::MemberJoined {
                room_id,
                member,
                occupancy,
            } => Self::MemberJoined {
                room_id,
                member,
                occupancy,
            },
            RoomEvent::Message {
                room_id,
                from,
                text,
            } => Self::Message {
                room_id,
                from,
                text,
            },
            RoomEvent::MemberLeft {
                room_id,
                member,
                occupancy,
            } => Self::MemberLeft {
                room_id,
                member,
                occupancy,
            },
        }
    }
}

/// Protocol errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Unsupported frame: {0}")]
    UnsupportedFrame(&'static str),
    #[error("Connection closed")]
    ConnectionClosed,
}
