//! Post-relay hook.
//!
//! Collaborators that act on chat text after it has been delivered (such
//! as a sentiment scorer) implement [`RelayObserver`]. The server
//! calls it once per relayed message, outside of any registry lock.

use huddle_core::{ConnectionId, DeliveryReport, RoomId};

/// A message that has just been fanned out to its room.
#[derive(Debug, Clone, Copy)]
pub struct RelayedMessage<'a> {
    pub room_id: &'a RoomId,
    pub from: ConnectionId,
    pub text: &'a str,
    pub report: &'a DeliveryReport,
}

pub trait RelayObserver: Send + Sync {
    fn on_relayed(&self, message: &RelayedMessage<'_>);
}

/// Observer that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RelayObserver for NoopObserver {
    fn on_relayed(&self, _message: &RelayedMessage<'_>) {}
}

impl<F> RelayObserver for F
where
    F: Fn(&RelayedMessage<'_>) + Send + Sync,
{
    fn on_relayed(&self, message: &RelayedMessage<'_>) {
        self(message)
    }
}
