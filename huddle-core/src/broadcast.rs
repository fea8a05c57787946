//! Room-scoped fan-out.
//!
//! Membership is snapshotted under the registry lock; delivery happens
//! after the lock is released, with a non-blocking push per recipient. A
//! failed push is counted and logged but never stops the rest of the
//! fan-out, and never removes the recipient from its room.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::connection::ConnectionHandle;
use crate::error::RoomError;
use crate::event::RoomEvent;
use crate::registry::RoomRegistry;
use crate::room::{Recipient, RoomId};

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub deliveries: u64,
    pub delivery_failures: u64,
}

/// Lock-free counters behind [`BroadcastStats`].
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
}

impl AtomicBroadcastStats {
    fn new() -> Self {
        Self {
            messages_sent: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
        }
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub room_id: RoomId,
    pub delivered: usize,
    pub failed: usize,
}

/// Delivers events to the members of a room.
pub struct Broadcaster {
    registry: Arc<RoomRegistry>,
    stats: AtomicBroadcastStats,
}

impl Broadcaster {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self {
            registry,
            stats: AtomicBroadcastStats::new(),
        }
    }

    /// Relay `text` from `sender` to every current member of its room,
    /// the sender included.
    ///
    /// Fails with [`RoomError::NotInRoom`] if the sender never joined or
    /// has already left.
    pub async fn broadcast(
        &self,
        sender: &ConnectionHandle,
        text: impl Into<String>,
    ) -> Result<DeliveryReport, RoomError> {
        let (room_id, recipients) = self.registry.recipients_for(sender).await?;
        let event = RoomEvent::Message {
            room_id: room_id.clone(),
            from: sender.id(),
            text: text.into(),
        };
        self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        Ok(self.announce(&recipients, event))
    }

    /// Push `event` to each recipient of an already-taken snapshot.
    pub fn announce(&self, recipients: &[Recipient], event: RoomEvent) -> DeliveryReport {
        let mut delivered = 0;
        let mut failed = 0;
        for recipient in recipients {
            match recipient.deliver(event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    log::warn!(
                        "Dropped {} for {} in {}: {e}",
                        event.kind(),
                        recipient.id(),
                        event.room_id()
                    );
                }
            }
        }

        self.stats
            .deliveries
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.stats
            .delivery_failures
            .fetch_add(failed as u64, Ordering::Relaxed);

        DeliveryReport {
            room_id: event.room_id().clone(),
            delivered,
            failed,
        }
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.stats.messages_sent.load(Ordering::Relaxed),
            deliveries: self.stats.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.stats.delivery_failures.load(Ordering::Relaxed),
        }
    }
}
