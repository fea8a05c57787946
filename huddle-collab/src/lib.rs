//! # huddle-collab — WebSocket transport for huddle chat rooms
//!
//! Puts the room allocator from `huddle-core` behind a WebSocket server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket      ┌─────────────┐
//! │ ChatClient  │ ◄─────────────────► │ ChatServer  │
//! │ (per user)  │     JSON frames     │ (central)   │
//! └─────────────┘                     └──────┬──────┘
//!                                            │
//!                                     ┌──────┴──────┐
//!                                     │ ChatService │
//!                                     │ (allocator) │
//!                                     └──────┬──────┘
//!                                            │
//!                                     ┌──────┴──────┐
//!                                     │RelayObserver│
//!                                     │ (post-hook) │
//!                                     └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — JSON wire frames
//! - [`server`] — WebSocket chat server
//! - [`client`] — WebSocket chat client
//! - [`observer`] — hook invoked after each relayed message

pub mod client;
pub mod observer;
pub mod protocol;
pub mod server;

pub use client::{ChatClient, ChatEvent, ConnectionState};
pub use observer::{NoopObserver, RelayObserver, RelayedMessage};
pub use protocol::{ClientFrame, ProtocolError, RejectKind, ServerFrame};
pub use server::{ChatServer, ServerConfig, ServerError, ServerStats};
