//! Per-client connection handle.
//!
//! The transport owns each handle through an `Arc`; rooms only keep a
//! `Weak` reference. The handle's placement moves strictly forward:
//!
//! ```text
//! Unassigned ──join──► Assigned(room) ──leave──► Departed
//!      └───────────────leave──────────────────────┘
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::DeliveryError;
use crate::event::RoomEvent;
use crate::room::RoomId;

/// Opaque identifier assigned at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where a connection currently sits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Connected, not yet placed in a room
    Unassigned,
    /// Member of the given room
    Assigned(RoomId),
    /// Left or disconnected; can never be placed again
    Departed,
}

/// One connected anonymous client.
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: mpsc::Sender<RoomEvent>,
    /// Only written while the registry lock is held.
    placement: Mutex<Placement>,
}

impl ConnectionHandle {
    /// Create a handle with a fresh identifier and a bounded outbound
    /// channel. Returns the handle and the receiver the transport drains.
    pub fn new(outbound_capacity: usize) -> (Arc<Self>, mpsc::Receiver<RoomEvent>) {
        let (outbound, rx) = mpsc::channel(outbound_capacity.max(1));
        let handle = Arc::new(Self {
            id: ConnectionId::new(),
            outbound,
            placement: Mutex::new(Placement::Unassigned),
        });
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current placement (a point-in-time read).
    pub fn placement(&self) -> Placement {
        self.placement
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Room this connection belongs to, if any.
    pub fn room_id(&self) -> Option<RoomId> {
        match self.placement() {
            Placement::Assigned(room_id) => Some(room_id),
            _ => None,
        }
    }

    pub fn is_departed(&self) -> bool {
        matches!(self.placement(), Placement::Departed)
    }

    /// Swap in a new placement, returning the previous one.
    pub(crate) fn replace_placement(&self, next: Placement) -> Placement {
        let mut slot = self
            .placement
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, next)
    }

    /// Push an event onto the outbound channel without waiting.
    pub fn deliver(&self, event: RoomEvent) -> Result<(), DeliveryError> {
        self.outbound.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("placement", &self.placement())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(text: &str) -> RoomEvent {
        RoomEvent::Message {
            room_id: RoomId::from("room-1"),
            from: ConnectionId::new(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_new_handle_is_unassigned() {
        let (handle, _rx) = ConnectionHandle::new(4);
        assert_eq!(handle.placement(), Placement::Unassigned);
        assert!(handle.room_id().is_none());
        assert!(!handle.is_departed());
    }

    #[test]
    fn test_ids_are_unique() {
        let (a, _rx_a) = ConnectionHandle::new(4);
        let (b, _rx_b) = ConnectionHandle::new(4);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_replace_placement_returns_previous() {
        let (handle, _rx) = ConnectionHandle::new(4);
        let room = RoomId::from("room-7");

        let prev = handle.replace_placement(Placement::Assigned(room.clone()));
        assert_eq!(prev, Placement::Unassigned);
        assert_eq!(handle.room_id(), Some(room.clone()));

        let prev = handle.replace_placement(Placement::Departed);
        assert_eq!(prev, Placement::Assigned(room));
        assert!(handle.is_departed());
    }

    #[tokio::test]
    async fn test_deliver_reaches_receiver() {
        let (handle, mut rx) = ConnectionHandle::new(4);
        handle.deliver(message("hello")).unwrap();

        match rx.recv().await {
            Some(RoomEvent::Message { text, .. }) => assert_eq!(text, "hello"),
            other => panic!("Expected message, got {other:?}"),
        }
    }

    #[test]
    fn test_deliver_to_closed_channel() {
        let (handle, rx) = ConnectionHandle::new(4);
        drop(rx);
        assert_eq!(handle.deliver(message("lost")), Err(DeliveryError::Closed));
    }

    #[test]
    fn test_deliver_to_full_channel() {
        let (handle, _rx) = ConnectionHandle::new(1);
        handle.deliver(message("first")).unwrap();
        assert_eq!(handle.deliver(message("second")), Err(DeliveryError::Full));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (handle, _rx) = ConnectionHandle::new(0);
        assert!(handle.deliver(message("fits")).is_ok());
    }
}
