//! Authoritative room registry.
//!
//! Holds every live room plus the candidate pool: rooms with at least one
//! member and at least one free slot, ordered by creation. All mutation
//! goes through a single `tokio::sync::Mutex`, so admission, removal and
//! room teardown are totally ordered with respect to each other.

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::sync::{Mutex, MutexGuard};

use crate::config::RoomConfig;
use crate::connection::{ConnectionHandle, ConnectionId, Placement};
use crate::error::RoomError;
use crate::room::{Recipient, Room, RoomId};

/// Identifier generation attempts before a join is refused.
pub const MAX_ID_ATTEMPTS: usize = 8;

/// Result of removing a connection from its room.
#[derive(Debug)]
pub struct Departure {
    pub room_id: RoomId,
    pub member: ConnectionId,
    /// Members left behind
    pub occupancy: usize,
    /// Whether the room was torn down because it emptied
    pub destroyed: bool,
    /// Remaining members, for the `member-left` announcement
    pub recipients: Vec<Recipient>,
}

/// What a leave call did.
#[derive(Debug)]
pub enum LeaveOutcome {
    /// The connection was removed from a room.
    Left(Departure),
    /// The connection never joined a room; it is now marked departed.
    NotPlaced,
    /// A previous leave already ran; nothing changed.
    AlreadyLeft,
}

impl LeaveOutcome {
    pub fn departure(&self) -> Option<&Departure> {
        match self {
            Self::Left(departure) => Some(departure),
            _ => None,
        }
    }
}

/// Point-in-time view of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    /// Live rooms and their occupancy, oldest first
    pub rooms: Vec<(RoomId, usize)>,
    /// Join candidates, oldest first
    pub candidates: Vec<RoomId>,
}

impl RegistrySnapshot {
    pub fn member_count(&self) -> usize {
        self.rooms.iter().map(|(_, n)| n).sum()
    }
}

/// State guarded by the registry lock.
pub(crate) struct RegistryState {
    rooms: FxHashMap<RoomId, Room>,
    /// ordinal → room id, so iteration is oldest-first
    candidates: BTreeMap<u64, RoomId>,
    next_ordinal: u64,
    capacity: usize,
}

impl RegistryState {
    fn new(capacity: usize) -> Self {
        Self {
            rooms: FxHashMap::default(),
            candidates: BTreeMap::new(),
            next_ordinal: 0,
            capacity,
        }
    }

    /// Oldest candidate room with a free slot.
    pub(crate) fn first_fit(&self) -> Option<RoomId> {
        self.candidates
            .values()
            .find(|id| self.rooms.get(*id).is_some_and(|room| !room.is_full()))
            .cloned()
    }

    /// Register a new, empty room under a fresh identifier.
    pub(crate) fn open_room(&mut self) -> Result<RoomId, RoomError> {
        self.open_room_with(RoomId::from_ordinal)
    }

    fn open_room_with(
        &mut self,
        mut make_id: impl FnMut(u64) -> RoomId,
    ) -> Result<RoomId, RoomError> {
        for attempt in 1..=MAX_ID_ATTEMPTS {
            self.next_ordinal += 1;
            let ordinal = self.next_ordinal;
            let room_id = make_id(ordinal);
            if self.rooms.contains_key(&room_id) {
                log::warn!(
                    "Room id {room_id} already registered (attempt {attempt}/{MAX_ID_ATTEMPTS})"
                );
                continue;
            }
            self.rooms
                .insert(room_id.clone(), Room::new(room_id.clone(), ordinal, self.capacity));
            log::info!("Room {room_id} created");
            return Ok(room_id);
        }
        Err(RoomError::IdentifiersExhausted(MAX_ID_ATTEMPTS))
    }

    /// Place `handle` into `room_id` and mark it assigned.
    ///
    /// Returns the new occupancy and the membership snapshot including the
    /// newcomer.
    pub(crate) fn admit(
        &mut self,
        room_id: &RoomId,
        handle: &Arc<ConnectionHandle>,
    ) -> Result<(usize, Vec<Recipient>), RoomError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RoomError::UnknownRoom(room_id.clone()))?;
        if !room.admit(handle) {
            return Err(RoomError::RoomFull(room_id.clone()));
        }
        handle.replace_placement(Placement::Assigned(room_id.clone()));
        let occupancy = room.len();
        let recipients = room.recipients();
        self.refresh_candidacy(room_id);
        Ok((occupancy, recipients))
    }

    /// Drop a room nobody was admitted to (failed placement).
    pub(crate) fn discard_if_empty(&mut self, room_id: &RoomId) {
        if let Some(room) = self.rooms.get(room_id) {
            if room.is_empty() {
                self.candidates.remove(&room.ordinal());
                self.rooms.remove(room_id);
            }
        }
    }

    fn refresh_candidacy(&mut self, room_id: &RoomId) {
        let Some(room) = self.rooms.get(room_id) else {
            return;
        };
        if room.is_empty() || room.is_full() {
            self.candidates.remove(&room.ordinal());
        } else {
            self.candidates.insert(room.ordinal(), room_id.clone());
        }
    }

    fn release(&mut self, handle: &ConnectionHandle) -> LeaveOutcome {
        let room_id = match handle.replace_placement(Placement::Departed) {
            Placement::Departed => return LeaveOutcome::AlreadyLeft,
            Placement::Unassigned => return LeaveOutcome::NotPlaced,
            Placement::Assigned(room_id) => room_id,
        };

        let Some(room) = self.rooms.get_mut(&room_id) else {
            log::error!(
                "Connection {} was assigned to unknown room {room_id}",
                handle.id()
            );
            return LeaveOutcome::NotPlaced;
        };

        room.remove(&handle.id());
        let occupancy = room.len();
        let recipients = room.recipients();
        let ordinal = room.ordinal();

        let destroyed = occupancy == 0;
        if destroyed {
            self.candidates.remove(&ordinal);
            self.rooms.remove(&room_id);
            log::info!("Room {room_id} removed (empty)");
        } else {
            self.refresh_candidacy(&room_id);
        }

        LeaveOutcome::Left(Departure {
            room_id,
            member: handle.id(),
            occupancy,
            destroyed,
            recipients,
        })
    }

    fn recipients_for(
        &self,
        handle: &ConnectionHandle,
    ) -> Result<(RoomId, Vec<Recipient>), RoomError> {
        match handle.placement() {
            Placement::Assigned(room_id) => {
                let room = self
                    .rooms
                    .get(&room_id)
                    .ok_or_else(|| RoomError::UnknownRoom(room_id.clone()))?;
                let recipients = room.recipients();
                Ok((room_id, recipients))
            }
            Placement::Unassigned | Placement::Departed => Err(RoomError::NotInRoom(handle.id())),
        }
    }

    fn snapshot(&self) -> RegistrySnapshot {
        let mut rooms: Vec<&Room> = self.rooms.values().collect();
        rooms.sort_by_key(|room| room.ordinal());
        RegistrySnapshot {
            rooms: rooms
                .into_iter()
                .map(|room| (room.id().clone(), room.len()))
                .collect(),
            candidates: self.candidates.values().cloned().collect(),
        }
    }
}

/// Single source of truth for room existence and membership.
pub struct RoomRegistry {
    state: Mutex<RegistryState>,
    capacity: usize,
}

impl RoomRegistry {
    pub fn new(config: RoomConfig) -> Self {
        Self {
            state: Mutex::new(RegistryState::new(config.max_users)),
            capacity: config.max_users,
        }
    }

    /// Per-room member ceiling.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().await
    }

    /// Remove `handle` from its room, destroying the room if it empties.
    ///
    /// Safe to call any number of times; only the first call has an effect.
    pub async fn leave(&self, handle: &ConnectionHandle) -> LeaveOutcome {
        let outcome = self.lock().await.release(handle);
        if let LeaveOutcome::Left(ref departure) = outcome {
            log::debug!(
                "Connection {} left {} ({} remaining)",
                departure.member,
                departure.room_id,
                departure.occupancy
            );
        }
        outcome
    }

    /// Join candidates, oldest first.
    pub async fn candidate_rooms(&self) -> Vec<RoomId> {
        self.lock().await.candidates.values().cloned().collect()
    }

    pub async fn room_count(&self) -> usize {
        self.lock().await.rooms.len()
    }

    pub async fn contains(&self, room_id: &RoomId) -> bool {
        self.lock().await.rooms.contains_key(room_id)
    }

    pub async fn occupancy(&self, room_id: &RoomId) -> Option<usize> {
        self.lock().await.rooms.get(room_id).map(Room::len)
    }

    pub async fn members(&self, room_id: &RoomId) -> Vec<ConnectionId> {
        self.lock()
            .await
            .rooms
            .get(room_id)
            .map(Room::member_ids)
            .unwrap_or_default()
    }

    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.lock().await.snapshot()
    }

    /// Sender's room and its membership, read under the lock.
    pub(crate) async fn recipients_for(
        &self,
        handle: &ConnectionHandle,
    ) -> Result<(RoomId, Vec<Recipient>), RoomError> {
        self.lock().await.recipients_for(handle)
    }
}
