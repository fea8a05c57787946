//! Error taxonomy for room allocation and delivery.

use thiserror::Error;

use crate::connection::ConnectionId;
use crate::room::RoomId;

/// Broad class of a [`RoomError`], used by transports to decide how to
/// report a rejected operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller broke the join/message/leave contract.
    ProtocolViolation,
    /// The allocator could not obtain a resource (room identifier, slot).
    ResourceExhaustion,
    /// Invalid configuration at startup.
    Configuration,
}

/// Errors returned by allocator, registry and broadcaster operations.
///
/// None of these are fatal; every variant describes a single rejected
/// operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("connection {connection} is already in room {room}")]
    AlreadyInRoom { connection: ConnectionId, room: RoomId },
    #[error("connection {0} is not in a room")]
    NotInRoom(ConnectionId),
    #[error("connection {0} has already left")]
    Departed(ConnectionId),
    #[error("room {0} is full")]
    RoomFull(RoomId),
    #[error("room {0} does not exist")]
    UnknownRoom(RoomId),
    #[error("no free room identifier after {0} attempts")]
    IdentifiersExhausted(usize),
    #[error("room capacity must be at least 1")]
    InvalidCapacity,
}

impl RoomError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyInRoom { .. } | Self::NotInRoom(_) | Self::Departed(_) => {
                ErrorKind::ProtocolViolation
            }
            Self::RoomFull(_) | Self::UnknownRoom(_) | Self::IdentifiersExhausted(_) => {
                ErrorKind::ResourceExhaustion
            }
            Self::InvalidCapacity => ErrorKind::Configuration,
        }
    }
}

/// Why a single recipient did not receive an event.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The receiving side of the outbound channel is gone.
    #[error("outbound channel closed")]
    Closed,
    /// The outbound channel is at capacity (slow consumer).
    #[error("outbound channel full")]
    Full,
    /// The transport already dropped the handle.
    #[error("connection handle dropped")]
    Dropped,
}
