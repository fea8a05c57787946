//! Client event routing.
//!
//! Ties allocator, registry and broadcaster together behind the three
//! client events a transport forwards: join, message and leave. Room
//! announcements (`member-joined`, `member-left`) are sent from here after
//! the registry lock has been released.

use std::sync::Arc;

use crate::allocator::Allocator;
use crate::broadcast::{BroadcastStats, Broadcaster, DeliveryReport};
use crate::config::RoomConfig;
use crate::connection::ConnectionHandle;
use crate::error::RoomError;
use crate::event::RoomEvent;
use crate::registry::{LeaveOutcome, RoomRegistry};
use crate::room::RoomId;

/// An event received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Join,
    Message(String),
    Leave,
}

/// What handling a [`ClientEvent`] did.
#[derive(Debug)]
pub enum EventOutcome {
    Joined(RoomId),
    Relayed(DeliveryReport),
    Left(LeaveOutcome),
}

/// Room allocation service shared by every connection of a process.
pub struct ChatService {
    config: RoomConfig,
    registry: Arc<RoomRegistry>,
    allocator: Allocator,
    broadcaster: Broadcaster,
}

impl ChatService {
    pub fn new(config: RoomConfig) -> Self {
        let registry = Arc::new(RoomRegistry::new(config));
        Self {
            config,
            allocator: Allocator::new(registry.clone()),
            broadcaster: Broadcaster::new(registry.clone()),
            registry,
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub fn broadcast_stats(&self) -> BroadcastStats {
        self.broadcaster.stats()
    }

    /// Route one client event.
    pub async fn on_client_event(
        &self,
        handle: &Arc<ConnectionHandle>,
        event: ClientEvent,
    ) -> Result<EventOutcome, RoomError> {
        match event {
            ClientEvent::Join => self.join(handle).await.map(EventOutcome::Joined),
            ClientEvent::Message(text) => {
                self.message(handle, text).await.map(EventOutcome::Relayed)
            }
            ClientEvent::Leave => Ok(EventOutcome::Left(self.leave(handle).await)),
        }
    }

    /// Place the connection and announce it to the room.
    pub async fn join(&self, handle: &Arc<ConnectionHandle>) -> Result<RoomId, RoomError> {
        let admission = self.allocator.admit(handle).await?;
        log::info!(
            "Connection {} joined {} ({}/{})",
            admission.member,
            admission.room_id,
            admission.occupancy,
            self.config.max_users
        );

        let event = RoomEvent::MemberJoined {
            room_id: admission.room_id.clone(),
            member: admission.member,
            occupancy: admission.occupancy,
        };
        self.broadcaster.announce(&admission.recipients, event);
        Ok(admission.room_id)
    }

    /// Relay chat text to the sender's room.
    pub async fn message(
        &self,
        handle: &ConnectionHandle,
        text: String,
    ) -> Result<DeliveryReport, RoomError> {
        let report = self.broadcaster.broadcast(handle, text).await?;
        log::debug!(
            "Relayed message from {} to {} members of {}",
            handle.id(),
            report.delivered,
            report.room_id
        );
        Ok(report)
    }

    /// Release the connection's slot and tell the remaining members.
    ///
    /// Called for explicit leave events and transport disconnects alike;
    /// repeated calls are no-ops.
    pub async fn leave(&self, handle: &ConnectionHandle) -> LeaveOutcome {
        let outcome = self.registry.leave(handle).await;
        if let LeaveOutcome::Left(ref departure) = outcome {
            log::info!(
                "Connection {} left {} ({} remaining)",
                departure.member,
                departure.room_id,
                departure.occupancy
            );
            if !departure.recipients.is_empty() {
                let event = RoomEvent::MemberLeft {
                    room_id: departure.room_id.clone(),
                    member: departure.member,
                    occupancy: departure.occupancy,
                };
                self.broadcaster.announce(&departure.recipients, event);
            }
        }
        outcome
    }
}
