//! WebSocket chat client.
//!
//! Provides:
//! - Connection lifecycle (connect, disconnect)
//! - Join, message and leave frames
//! - Decoded server frames delivered on an event channel

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use huddle_core::ConnectionId;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{ClientFrame, ProtocolError, ServerFrame};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the chat client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// WebSocket handshake completed
    Connected,
    /// A decoded frame from the server
    Frame(ServerFrame),
    /// The server closed the connection or the socket failed
    Disconnected,
}

/// The chat client.
pub struct ChatClient {
    server_url: String,
    state: Arc<RwLock<ConnectionState>>,
    /// Identity assigned by the server's welcome frame
    connection_id: Arc<RwLock<Option<ConnectionId>>>,
    /// Channel to the WebSocket writer task
    outgoing_tx: Option<mpsc::Sender<Message>>,
    event_rx: Option<mpsc::Receiver<ChatEvent>>,
    event_tx: mpsc::Sender<ChatEvent>,
}

impl ChatClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            server_url: server_url.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            connection_id: Arc::new(RwLock::new(None)),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<ChatEvent>> {
        self.event_rx.take()
    }

    /// Connect to the server.
    ///
    /// Spawns background tasks for reading/writing WebSocket messages.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let ws_stream = match tokio_tungstenite::connect_async(&self.server_url).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                log::warn!("Failed to connect to {}: {e}", self.server_url);
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ProtocolError::ConnectionClosed);
            }
        };
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward outgoing channel to WebSocket
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(256);
        self.outgoing_tx = Some(out_tx);
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if ws_writer.send(msg).await.is_err() {
                    break;
                }
            }
        });

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(ChatEvent::Connected).await;

        // Reader task: decode server frames
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        let connection_id = self.connection_id.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match ServerFrame::decode(text.as_str()) {
                        Ok(frame) => {
                            if let ServerFrame::Welcome { connection_id: id, .. } = frame {
                                *connection_id.write().await = Some(id);
                            }
                            let _ = event_tx.send(ChatEvent::Frame(frame)).await;
                        }
                        Err(e) => log::warn!("Ignoring undecodable server frame: {e}"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(ChatEvent::Disconnected).await;
        });

        Ok(())
    }

    async fn send_frame(&self, frame: &ClientFrame) -> Result<(), ProtocolError> {
        let encoded = frame.encode()?;
        let tx = self
            .outgoing_tx
            .as_ref()
            .ok_or(ProtocolError::ConnectionClosed)?;
        tx.send(Message::Text(encoded.into()))
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Ask the server for a room.
    pub async fn join(&self) -> Result<(), ProtocolError> {
        self.send_frame(&ClientFrame::Join).await
    }

    /// Send chat text to the current room.
    pub async fn send_message(&self, text: impl Into<String>) -> Result<(), ProtocolError> {
        self.send_frame(&ClientFrame::message(text)).await
    }

    /// Leave the room; the server ends the session afterwards.
    pub async fn leave(&self) -> Result<(), ProtocolError> {
        self.send_frame(&ClientFrame::Leave).await
    }

    /// Send an application-level ping.
    pub async fn ping(&self) -> Result<(), ProtocolError> {
        self.send_frame(&ClientFrame::Ping).await
    }

    /// Close the WebSocket without leaving first.
    pub async fn disconnect(&mut self) -> Result<(), ProtocolError> {
        let tx = self.outgoing_tx.take().ok_or(ProtocolError::ConnectionClosed)?;
        tx.send(Message::Close(None))
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Get the current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Identity assigned by the server, once the welcome frame arrived.
    pub async fn connection_id(&self) -> Option<ConnectionId> {
        *self.connection_id.read().await
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}
