//! Bounded-capacity rooms.

use std::fmt;
use std::sync::{Arc, Weak};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::error::DeliveryError;
use crate::event::RoomEvent;

/// Room identifier (`room-<ordinal>` when allocated by the registry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn from_ordinal(ordinal: u64) -> Self {
        Self(format!("room-{ordinal}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RoomId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A member reference captured in a broadcast snapshot.
///
/// Holds a `Weak` so that a snapshot never extends a connection's life.
#[derive(Debug, Clone)]
pub struct Recipient {
    id: ConnectionId,
    handle: Weak<ConnectionHandle>,
}

impl Recipient {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn deliver(&self, event: RoomEvent) -> Result<(), DeliveryError> {
        match self.handle.upgrade() {
            Some(handle) => handle.deliver(event),
            None => Err(DeliveryError::Dropped),
        }
    }
}

/// A bounded set of connections sharing one broadcast scope.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    /// Creation order; lower is older
    ordinal: u64,
    capacity: usize,
    members: FxHashMap<ConnectionId, Weak<ConnectionHandle>>,
}

impl Room {
    pub(crate) fn new(id: RoomId, ordinal: u64, capacity: usize) -> Self {
        Self {
            id,
            ordinal,
            capacity,
            members: FxHashMap::default(),
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members.contains_key(id)
    }

    pub fn member_ids(&self) -> Vec<ConnectionId> {
        self.members.keys().copied().collect()
    }

    /// Add a member. Returns `false` when the room is full or the
    /// connection is already a member.
    pub(crate) fn admit(&mut self, handle: &Arc<ConnectionHandle>) -> bool {
        if self.is_full() || self.members.contains_key(&handle.id()) {
            return false;
        }
        self.members.insert(handle.id(), Arc::downgrade(handle));
        true
    }

    pub(crate) fn remove(&mut self, id: &ConnectionId) -> bool {
        self.members.remove(id).is_some()
    }

    /// Current membership as delivery targets.
    pub(crate) fn recipients(&self) -> Vec<Recipient> {
        self.members
            .iter()
            .map(|(id, handle)| Recipient {
                id: *id,
                handle: handle.clone(),
            })
            .collect()
    }
}
