//! # huddle-core — Room allocation for anonymous group chat
//!
//! Places anonymous connections into bounded-capacity rooms, relays
//! messages inside a room, and tears rooms down the moment they empty.
//!
//! ## Architecture
//!
//! ```text
//!   transport connect
//!          │
//!          ▼
//! ┌──────────────────┐   join    ┌─────────────┐
//! │ ConnectionHandle │ ────────► │  Allocator  │  first-fit by age
//! │ (Arc, mpsc tx)   │           └──────┬──────┘
//! └────────┬─────────┘                  │ one critical section
//!          │ message                    ▼
//!          │                    ┌───────────────┐
//!          └──────────────────► │ RoomRegistry  │  rooms + candidate pool
//!            Broadcaster        └───────┬───────┘
//!            (snapshot under lock,      │ Weak member refs
//!             deliver outside it)       ▼
//!                                ┌─────────────┐
//!                                │    Room     │  ≤ max_users members
//!                                └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`connection`] — per-client handle, outbound channel, placement state
//! - [`room`] — bounded member set and room identifiers
//! - [`registry`] — authoritative room map and candidate pool
//! - [`allocator`] — first-fit-by-age placement
//! - [`broadcast`] — snapshot fan-out with per-recipient failure isolation
//! - [`service`] — client event routing (join / message / leave)

pub mod allocator;
pub mod broadcast;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod registry;
pub mod room;
pub mod service;

pub use allocator::{Admission, Allocator};
pub use broadcast::{BroadcastStats, Broadcaster, DeliveryReport};
pub use config::{RoomConfig, DEFAULT_MAX_USERS};
pub use connection::{ConnectionHandle, ConnectionId, Placement};
pub use error::{DeliveryError, ErrorKind, RoomError};
pub use event::RoomEvent;
pub use registry::{Departure, LeaveOutcome, RegistrySnapshot, RoomRegistry};
pub use room::{Recipient, Room, RoomId};
pub use service::{ChatService, ClientEvent, EventOutcome};
