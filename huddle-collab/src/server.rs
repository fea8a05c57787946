//! WebSocket chat server.
//!
//! Architecture:
//! ```text
//! Client A ──┐                       ┌── Room "room-1" (≤ max_users)
//! Client B ──┼── ChatService ────────┤
//! Client C ──┘   (Allocator,         └── Room "room-2"
//!                 RoomRegistry,
//!                 Broadcaster)
//! ```
//!
//! Each connection task owns one `ConnectionHandle` and selects between
//! inbound WebSocket frames and the handle's outbound event channel. Every
//! exit path (leave frame, close frame, stream end, socket error) releases
//! the connection's room slot exactly once.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use huddle_core::{
    ChatService, ClientEvent, ConnectionHandle, EventOutcome, RoomConfig, RoomError,
    DEFAULT_MAX_USERS,
};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;

use crate::observer::{NoopObserver, RelayObserver, RelayedMessage};
use crate::protocol::{ClientFrame, ProtocolError, RejectKind, ServerFrame};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Maximum members per room
    pub max_users: usize,
    /// Outbound events buffered per connection before delivery fails
    pub outbound_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            max_users: DEFAULT_MAX_USERS,
            outbound_capacity: 256,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub rejected_events: u64,
    pub active_rooms: usize,
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("Invalid configuration: {0}")]
    Config(#[from] RoomError),
}

/// What the connection loop should do after handling a client frame.
enum Dispatch {
    Continue,
    Reply(ServerFrame),
    Close,
}

/// The chat server.
pub struct ChatServer {
    config: ServerConfig,
    service: Arc<ChatService>,
    stats: Arc<RwLock<ServerStats>>,
    observer: Arc<dyn RelayObserver>,
}

impl ChatServer {
    /// Create a new server; fails if `max_users` is zero.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let room_config = RoomConfig::new(config.max_users)?;
        Ok(Self::from_parts(config, room_config))
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::from_parts(ServerConfig::default(), RoomConfig::default())
    }

    fn from_parts(config: ServerConfig, room_config: RoomConfig) -> Self {
        Self {
            config,
            service: Arc::new(ChatService::new(room_config)),
            stats: Arc::new(RwLock::new(ServerStats::default())),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Install a hook that sees every relayed message.
    pub fn with_observer(mut self, observer: impl RelayObserver + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!(
            "Chat server listening on {} (max {} per room)",
            self.config.bind_addr,
            self.config.max_users
        );
        self.serve(listener).await
    }

    /// Accept connections from an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    log::error!("Failed to accept connection: {e}");
                    continue;
                }
            };
            log::debug!("New TCP connection from {addr}");

            let service = self.service.clone();
            let stats = self.stats.clone();
            let observer = self.observer.clone();
            let outbound_capacity = self.config.outbound_capacity;

            tokio::spawn(async move {
                if let Err(e) =
                    Self::handle_connection(stream, addr, service, stats, observer, outbound_capacity)
                        .await
                {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        service: Arc<ChatService>,
        stats: Arc<RwLock<ServerStats>>,
        observer: Arc<dyn RelayObserver>,
        outbound_capacity: usize,
    ) -> Result<(), ServerError> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let (handle, mut outbound) = ConnectionHandle::new(outbound_capacity);
        log::info!("Connection {} established from {addr}", handle.id());

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let result: Result<(), ServerError> = async {
            let welcome = ServerFrame::Welcome {
                connection_id: handle.id(),
                max_users: service.config().max_users,
            };
            ws_sender.send(Message::Text(welcome.encode()?.into())).await?;

            loop {
                tokio::select! {
                    // Incoming WebSocket frame
                    msg = ws_receiver.next() => {
                        let dispatch = match msg {
                            Some(Ok(Message::Text(text))) => {
                                stats.write().await.total_messages += 1;
                                match ClientFrame::decode(text.as_str()) {
                                    Ok(frame) => {
                                        Self::dispatch(frame, &handle, &service, observer.as_ref()).await
                                    }
                                    Err(e) => {
                                        log::warn!("Malformed frame from {addr}: {e}");
                                        Dispatch::Reply(ServerFrame::rejected(
                                            RejectKind::MalformedFrame,
                                            e.to_string(),
                                        ))
                                    }
                                }
                            }

                            Some(Ok(Message::Binary(_))) => {
                                let e = ProtocolError::UnsupportedFrame("binary");
                                log::warn!("{e} from {addr}");
                                Dispatch::Reply(ServerFrame::rejected(
                                    RejectKind::MalformedFrame,
                                    e.to_string(),
                                ))
                            }

                            Some(Ok(Message::Ping(data))) => {
                                ws_sender.send(Message::Pong(data)).await?;
                                Dispatch::Continue
                            }

                            Some(Ok(Message::Close(_))) | None => {
                                log::info!("Connection closed from {addr}");
                                break;
                            }

                            Some(Err(e)) => {
                                log::error!("WebSocket error from {addr}: {e}");
                                break;
                            }

                            Some(Ok(_)) => Dispatch::Continue,
                        };

                        match dispatch {
                            Dispatch::Continue => {}
                            Dispatch::Reply(frame) => {
                                if matches!(frame, ServerFrame::Rejected { .. }) {
                                    stats.write().await.rejected_events += 1;
                                }
                                ws_sender.send(Message::Text(frame.encode()?.into())).await?;
                            }
                            Dispatch::Close => {
                                ws_sender.send(Message::Close(None)).await?;
                                break;
                            }
                        }
                    }

                    // Outgoing room event
                    event = outbound.recv() => {
                        match event {
                            Some(event) => {
                                let frame = ServerFrame::from(event);
                                ws_sender.send(Message::Text(frame.encode()?.into())).await?;
                            }
                            None => break,
                        }
                    }
                }
            }
            Ok(())
        }
        .await;

        // Release the room slot on every exit path; no-op after an explicit leave.
        service.leave(&handle).await;

        let active_rooms = service.registry().room_count().await;
        {
            let mut s = stats.write().await;
            s.active_connections -= 1;
            s.active_rooms = active_rooms;
        }
        log::info!("Connection {} from {addr} finished", handle.id());

        result
    }

    async fn dispatch(
        frame: ClientFrame,
        handle: &Arc<ConnectionHandle>,
        service: &ChatService,
        observer: &dyn RelayObserver,
    ) -> Dispatch {
        let Some(event) = frame.into_event() else {
            return Dispatch::Reply(ServerFrame::Pong);
        };
        let relayed_text = match &event {
            ClientEvent::Message(text) => Some(text.clone()),
            _ => None,
        };

        match service.on_client_event(handle, event).await {
            Ok(EventOutcome::Joined(_)) => Dispatch::Continue,
            Ok(EventOutcome::Relayed(report)) => {
                if let Some(text) = relayed_text {
                    observer.on_relayed(&RelayedMessage {
                        room_id: &report.room_id,
                        from: handle.id(),
                        text: &text,
                        report: &report,
                    });
                }
                Dispatch::Continue
            }
            Ok(EventOutcome::Left(_)) => Dispatch::Close,
            Err(e) => {
                log::warn!("Rejected event from {}: {e}", handle.id());
                Dispatch::Reply(ServerFrame::rejected(e.kind().into(), e.to_string()))
            }
        }
    }

    /// Get server statistics.
    pub async fn stats(&self) -> ServerStats {
        let mut stats = self.stats.read().await.clone();
        stats.active_rooms = self.service.registry().room_count().await;
        stats
    }

    /// Get the configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// Get the shared allocation service.
    pub fn service(&self) -> &Arc<ChatService> {
        &self.service
    }
}
