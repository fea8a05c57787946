//! Integration tests for end-to-end WebSocket chat.
//!
//! These tests start a real server and connect real clients,
//! verifying the allocation and relay pipeline over the wire.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, Stream, StreamExt};
use huddle_collab::client::{ChatClient, ChatEvent, ConnectionState};
use huddle_collab::observer::{RelayObserver, RelayedMessage};
use huddle_collab::protocol::{RejectKind, ServerFrame};
use huddle_collab::server::{ChatServer, ServerConfig};
use huddle_core::{ConnectionId, RoomId};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Start a server on a free port, return its URL and a handle for stats.
async fn start_test_server(max_users: usize) -> (String, Arc<ChatServer>) {
    start_server_with(ChatServer::new(server_config(max_users)).unwrap()).await
}

fn server_config(max_users: usize) -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        max_users,
        outbound_capacity: 64,
    }
}

async fn start_server_with(server: ChatServer) -> (String, Arc<ChatServer>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = Arc::new(server);
    let running = server.clone();
    tokio::spawn(async move {
        running.serve(listener).await.unwrap();
    });
    (format!("ws://127.0.0.1:{port}"), server)
}

/// Next decoded frame, skipping connection lifecycle events.
async fn next_frame(rx: &mut mpsc::Receiver<ChatEvent>) -> ServerFrame {
    loop {
        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("Should receive event within timeout")
            .expect("Event channel closed");
        match event {
            ChatEvent::Frame(frame) => return frame,
            ChatEvent::Connected => continue,
            ChatEvent::Disconnected => panic!("Disconnected while waiting for a frame"),
        }
    }
}

async fn wait_disconnected(rx: &mut mpsc::Receiver<ChatEvent>) {
    loop {
        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("Should disconnect within timeout");
        match event {
            Some(ChatEvent::Disconnected) | None => return,
            Some(_) => continue,
        }
    }
}

struct Member {
    client: ChatClient,
    rx: mpsc::Receiver<ChatEvent>,
    id: ConnectionId,
}

/// Connect and consume the welcome frame.
async fn connect(url: &str) -> Member {
    let mut client = ChatClient::new(url);
    let mut rx = client.take_event_rx().unwrap();
    client.connect().await.expect("Client should connect");

    match next_frame(&mut rx).await {
        ServerFrame::Welcome { connection_id, .. } => Member {
            client,
            rx,
            id: connection_id,
        },
        other => panic!("Expected welcome, got {other:?}"),
    }
}

/// Connect, join, and wait for our own member-joined announcement.
///
/// Announcements for concurrent joiners may arrive first; they are skipped.
async fn connect_and_join(url: &str) -> (Member, RoomId, usize) {
    let mut member = connect(url).await;
    member.client.join().await.unwrap();
    loop {
        match next_frame(&mut member.rx).await {
            ServerFrame::MemberJoined {
                room_id,
                member: who,
                occupancy,
            } if who == member.id => return (member, room_id, occupancy),
            ServerFrame::MemberJoined { .. } => continue,
            other => panic!("Expected member-joined, got {other:?}"),
        }
    }
}

async fn read_raw_frame<S>(reader: &mut S) -> ServerFrame
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let msg = timeout(Duration::from_secs(2), reader.next())
        .await
        .expect("Should receive frame within timeout")
        .expect("Stream ended")
        .expect("WebSocket error");
    match msg {
        Message::Text(text) => ServerFrame::decode(text.as_str()).unwrap(),
        other => panic!("Expected text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_welcome_frame() {
    let (url, _server) = start_test_server(5).await;
    let mut client = ChatClient::new(&url);
    let mut rx = client.take_event_rx().unwrap();
    client.connect().await.unwrap();

    match next_frame(&mut rx).await {
        ServerFrame::Welcome {
            connection_id,
            max_users,
        } => {
            assert_eq!(max_users, 5);
            assert_eq!(client.connection_id().await, Some(connection_id));
        }
        other => panic!("Expected welcome, got {other:?}"),
    }
    assert_eq!(client.connection_state().await, ConnectionState::Connected);
}

#[tokio::test]
async fn test_sixth_client_opens_second_room() {
    let (url, server) = start_test_server(5).await;

    let mut members = Vec::new();
    for expected in 1..=5 {
        let (member, room_id, occupancy) = connect_and_join(&url).await;
        assert_eq!(room_id.as_str(), "room-1");
        assert_eq!(occupancy, expected);
        members.push(member);
    }

    let (sixth, room_id, occupancy) = connect_and_join(&url).await;
    assert_eq!(room_id.as_str(), "room-2");
    assert_eq!(occupancy, 1);
    members.push(sixth);

    let stats = server.stats().await;
    assert_eq!(stats.active_rooms, 2);
    assert_eq!(stats.active_connections, 6);
    assert_eq!(server.service().registry().occupancy(&RoomId::from("room-1")).await, Some(5));
}

#[tokio::test]
async fn test_members_see_later_joins() {
    let (url, _server) = start_test_server(5).await;
    let (mut alice, room_id, _) = connect_and_join(&url).await;
    let (bob, _, _) = connect_and_join(&url).await;

    assert_eq!(
        next_frame(&mut alice.rx).await,
        ServerFrame::MemberJoined {
            room_id,
            member: bob.id,
            occupancy: 2,
        }
    );
}

#[tokio::test]
async fn test_messages_scoped_to_room() {
    let (url, _server) = start_test_server(2).await;
    let (mut alice, room_a, _) = connect_and_join(&url).await;
    let (mut bob, _, _) = connect_and_join(&url).await;
    let (mut carol, room_c, _) = connect_and_join(&url).await;
    assert_ne!(room_a, room_c);

    // Alice's copy of Bob's join
    next_frame(&mut alice.rx).await;

    alice.client.send_message("hello bob").await.unwrap();

    let expected = ServerFrame::Message {
        room_id: room_a.clone(),
        from: alice.id,
        text: "hello bob".into(),
    };
    assert_eq!(next_frame(&mut bob.rx).await, expected);
    assert_eq!(next_frame(&mut alice.rx).await, expected, "Sender gets its own copy");

    carol.client.ping().await.unwrap();
    assert_eq!(
        next_frame(&mut carol.rx).await,
        ServerFrame::Pong,
        "Other rooms see nothing"
    );
}

#[tokio::test]
async fn test_message_before_join_is_rejected() {
    let (url, server) = start_test_server(5).await;
    let mut member = connect(&url).await;

    member.client.send_message("too early").await.unwrap();
    match next_frame(&mut member.rx).await {
        ServerFrame::Rejected { kind, .. } => assert_eq!(kind, RejectKind::ProtocolViolation),
        other => panic!("Expected rejection, got {other:?}"),
    }

    // The session survives a rejection
    member.client.join().await.unwrap();
    assert!(matches!(
        next_frame(&mut member.rx).await,
        ServerFrame::MemberJoined { .. }
    ));
    assert_eq!(server.stats().await.rejected_events, 1);
}

#[tokio::test]
async fn test_double_join_is_rejected() {
    let (url, _server) = start_test_server(5).await;
    let (mut member, _, _) = connect_and_join(&url).await;

    member.client.join().await.unwrap();
    match next_frame(&mut member.rx).await {
        ServerFrame::Rejected { kind, .. } => assert_eq!(kind, RejectKind::ProtocolViolation),
        other => panic!("Expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_frames_are_rejected() {
    let (url, _server) = start_test_server(5).await;
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let (mut writer, mut reader) = ws.split();

    assert!(matches!(read_raw_frame(&mut reader).await, ServerFrame::Welcome { .. }));

    writer.send(Message::Text("not json".to_string().into())).await.unwrap();
    assert!(matches!(
        read_raw_frame(&mut reader).await,
        ServerFrame::Rejected {
            kind: RejectKind::MalformedFrame,
            ..
        }
    ));

    writer.send(Message::Binary(vec![1u8, 2, 3].into())).await.unwrap();
    assert!(matches!(
        read_raw_frame(&mut reader).await,
        ServerFrame::Rejected {
            kind: RejectKind::MalformedFrame,
            ..
        }
    ));
}

#[tokio::test]
async fn test_leave_notifies_room_and_closes() {
    let (url, server) = start_test_server(5).await;
    let (mut alice, room_id, _) = connect_and_join(&url).await;
    let (mut bob, _, _) = connect_and_join(&url).await;
    next_frame(&mut alice.rx).await;

    bob.client.leave().await.unwrap();
    wait_disconnected(&mut bob.rx).await;
    assert_eq!(bob.client.connection_state().await, ConnectionState::Disconnected);

    assert_eq!(
        next_frame(&mut alice.rx).await,
        ServerFrame::MemberLeft {
            room_id: room_id.clone(),
            member: bob.id,
            occupancy: 1,
        }
    );
    assert_eq!(server.service().registry().occupancy(&room_id).await, Some(1));
}

#[tokio::test]
async fn test_last_leave_destroys_room() {
    let (url, server) = start_test_server(5).await;
    let (mut alice, room_id, _) = connect_and_join(&url).await;
    assert_eq!(server.stats().await.active_rooms, 1);

    alice.client.leave().await.unwrap();
    wait_disconnected(&mut alice.rx).await;

    assert!(!server.service().registry().contains(&room_id).await);
    assert_eq!(server.stats().await.active_rooms, 0);

    // A fresh join never reuses the destroyed room's id
    let (_carol, next_room, _) = connect_and_join(&url).await;
    assert_eq!(next_room.as_str(), "room-2");
}

#[tokio::test]
async fn test_disconnect_releases_slot() {
    let (url, server) = start_test_server(2).await;
    let (mut alice, room_id, _) = connect_and_join(&url).await;
    let (mut bob, _, _) = connect_and_join(&url).await;
    next_frame(&mut alice.rx).await;

    bob.client.disconnect().await.unwrap();
    assert_eq!(
        next_frame(&mut alice.rx).await,
        ServerFrame::MemberLeft {
            room_id: room_id.clone(),
            member: bob.id,
            occupancy: 1,
        }
    );

    // Freed slot goes to the next joiner
    let (_dave, dave_room, occupancy) = connect_and_join(&url).await;
    assert_eq!(dave_room, room_id);
    assert_eq!(occupancy, 2);
    assert_eq!(server.stats().await.active_rooms, 1);
}

#[tokio::test]
async fn test_ping_pong() {
    let (url, _server) = start_test_server(5).await;
    let mut member = connect(&url).await;
    member.client.ping().await.unwrap();
    assert_eq!(next_frame(&mut member.rx).await, ServerFrame::Pong);
}

#[derive(Clone, Default)]
struct RecordingObserver {
    relayed: Arc<AtomicUsize>,
    texts: Arc<Mutex<Vec<String>>>,
}

impl RelayObserver for RecordingObserver {
    fn on_relayed(&self, message: &RelayedMessage<'_>) {
        self.relayed.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(message.text.to_string());
    }
}

#[tokio::test]
async fn test_observer_sees_relayed_messages() {
    let recorder = RecordingObserver::default();
    let server = ChatServer::new(server_config(5))
        .unwrap()
        .with_observer(recorder.clone());
    let (url, _server) = start_server_with(server).await;

    let (mut alice, _, _) = connect_and_join(&url).await;
    alice.client.send_message("first").await.unwrap();
    assert!(matches!(next_frame(&mut alice.rx).await, ServerFrame::Message { .. }));
    alice.client.send_message("second").await.unwrap();
    assert!(matches!(next_frame(&mut alice.rx).await, ServerFrame::Message { .. }));

    assert_eq!(recorder.relayed.load(Ordering::SeqCst), 2);
    assert_eq!(*recorder.texts.lock().unwrap(), vec!["first", "second"]);
}

#[tokio::test]
async fn test_concurrent_joins_fill_rooms() {
    let (url, server) = start_test_server(5).await;

    let mut tasks = Vec::new();
    for _ in 0..23 {
        let url = url.clone();
        tasks.push(tokio::spawn(async move { connect_and_join(&url).await }));
    }
    let mut members = Vec::new();
    for task in tasks {
        members.push(task.await.unwrap());
    }

    let snapshot = server.service().registry().snapshot().await;
    assert_eq!(snapshot.member_count(), 23);
    assert_eq!(snapshot.rooms.len(), 5);
    assert!(snapshot.rooms.iter().all(|(_, n)| *n <= 5));
    assert_eq!(snapshot.rooms.iter().filter(|(_, n)| *n < 5).count(), 1);
}
