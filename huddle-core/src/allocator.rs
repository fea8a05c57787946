//! First-fit-by-age room placement.
//!
//! A joiner goes into the oldest open room that still has a free slot.
//! Only when no such room exists is a new one opened. Packing the oldest
//! rooms first keeps the number of concurrently open rooms (and with it
//! broadcast fan-out) as low as possible.

use std::sync::Arc;

use crate::connection::{ConnectionHandle, ConnectionId, Placement};
use crate::error::RoomError;
use crate::registry::RoomRegistry;
use crate::room::{Recipient, RoomId};

/// A successful placement.
#[derive(Debug)]
pub struct Admission {
    pub room_id: RoomId,
    pub member: ConnectionId,
    /// Occupancy after admission
    pub occupancy: usize,
    /// Whether the room was opened for this joiner
    pub created: bool,
    /// Membership at admission time, newcomer included
    pub recipients: Vec<Recipient>,
}

/// Places joining connections into rooms held by a [`RoomRegistry`].
pub struct Allocator {
    registry: Arc<RoomRegistry>,
}

impl Allocator {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Place `handle` and return the room it landed in.
    pub async fn join(&self, handle: &Arc<ConnectionHandle>) -> Result<RoomId, RoomError> {
        self.admit(handle).await.map(|admission| admission.room_id)
    }

    /// Place `handle`, returning the full admission record.
    ///
    /// The whole scan-create-admit sequence runs under the registry lock,
    /// so concurrent joins can never overfill a room and a concurrent
    /// leave can never tear down the room being joined.
    pub async fn admit(&self, handle: &Arc<ConnectionHandle>) -> Result<Admission, RoomError> {
        let mut state = self.registry.lock().await;

        match handle.placement() {
            Placement::Unassigned => {}
            Placement::Assigned(room) => {
                return Err(RoomError::AlreadyInRoom {
                    connection: handle.id(),
                    room,
                });
            }
            Placement::Departed => return Err(RoomError::Departed(handle.id())),
        }

        let (room_id, created) = match state.first_fit() {
            Some(room_id) => (room_id, false),
            None => (state.open_room()?, true),
        };

        let (occupancy, recipients) = match state.admit(&room_id, handle) {
            Ok(admitted) => admitted,
            Err(e) => {
                if created {
                    state.discard_if_empty(&room_id);
                }
                return Err(e);
            }
        };
        drop(state);

        log::debug!(
            "Connection {} placed in {room_id} ({occupancy}/{})",
            handle.id(),
            self.registry.capacity()
        );

        Ok(Admission {
            room_id,
            member: handle.id(),
            occupancy,
            created,
            recipients,
        })
    }
}
