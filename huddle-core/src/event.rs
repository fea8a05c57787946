//! Room-scoped events delivered to members.

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionId;
use crate::room::RoomId;

/// An event delivered only to current members of `room_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RoomEvent {
    /// A connection was admitted; `occupancy` counts it.
    MemberJoined {
        room_id: RoomId,
        member: ConnectionId,
        occupancy: usize,
    },
    /// Chat text relayed from `from`.
    Message {
        room_id: RoomId,
        from: ConnectionId,
        text: String,
    },
    /// A connection left; `occupancy` no longer counts it.
    MemberLeft {
        room_id: RoomId,
        member: ConnectionId,
        occupancy: usize,
    },
}

impl RoomEvent {
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::MemberJoined { room_id, .. }
            | Self::Message { room_id, .. }
            | Self::MemberLeft { room_id, .. } => room_id,
        }
    }

    /// Wire name of the event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MemberJoined { .. } => "member-joined",
            Self::Message { .. } => "message",
            Self::MemberLeft { .. } => "member-left",
        }
    }
}
