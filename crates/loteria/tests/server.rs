//! Integration tests for the Lotería server: handshake, routing and full
//! games over real WebSocket connections.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use loteria::prelude::*;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Rooms whose games finish in well under a second.
fn fast_rooms() -> RoomConfig {
    RoomConfig {
        warm_up: Duration::from_millis(20),
        grace_period: Duration::from_millis(30),
        intervals: DrawIntervals {
            // Slow enough that a host can end the game before the deck runs out.
            easy: Duration::from_secs(1),
            normal: Duration::from_millis(10),
            // Sixteen draws take well over any round-trip, so an early
            // claim can never be valid.
            hard: Duration::from_millis(40),
        },
        ..RoomConfig::default()
    }
}

/// Starts a server on a random port and returns its address and registry.
async fn start_server_with(builder: LoteriaServerBuilder) -> (String, std::sync::Arc<RoomRegistry>) {
    let server = builder
        .bind("127.0.0.1:0")
        .build()
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();
    let registry = server.registry();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    (addr, registry)
}

async fn start_server() -> String {
    start_server_with(LoteriaServer::builder().room_config(fast_rooms()))
        .await
        .0
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, payload: Payload) {
    let envelope = Envelope {
        seq: 0,
        timestamp: 0,
        payload,
    };
    let text = serde_json::to_string(&envelope).expect("encode");
    ws.send(Message::text(text)).await.expect("send");
}

async fn act(ws: &mut ClientWs, action: ClientAction) {
    send(ws, Payload::Action(action)).await;
}

/// Next payload from the server, failing after two seconds.
async fn recv(ws: &mut ClientWs) -> Payload {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out waiting for server")
        .expect("stream ended")
        .expect("recv error");
    let envelope: Envelope = serde_json::from_slice(&msg.into_data()).expect("decode");
    envelope.payload
}

/// Reads until an event matching `pred` arrives, skipping the rest.
async fn recv_event(ws: &mut ClientWs, pred: impl Fn(&ServerEvent) -> bool) -> ServerEvent {
    loop {
        if let Payload::Event(event) = recv(ws).await {
            if pred(&event) {
                return event;
            }
        }
    }
}

async fn recv_error(ws: &mut ClientWs) -> (u16, String) {
    match recv(ws).await {
        Payload::System(SystemMessage::Error { code, message }) => (code, message),
        other => panic!("expected Error, got {other:?}"),
    }
}

/// Sends a handshake and returns the assigned player id.
async fn handshake(ws: &mut ClientWs) -> PlayerId {
    send(
        ws,
        Payload::System(SystemMessage::Handshake {
            version: PROTOCOL_VERSION,
        }),
    )
    .await;
    match recv(ws).await {
        Payload::System(SystemMessage::HandshakeAck { player_id, .. }) => player_id,
        other => panic!("expected HandshakeAck, got {other:?}"),
    }
}

/// Connects, handshakes and creates a room. Returns the room code.
async fn host_room(addr: &str, name: &str) -> (ClientWs, PlayerId, RoomCode) {
    let mut ws = connect(addr).await;
    let id = handshake(&mut ws).await;
    act(&mut ws, ClientAction::CreateRoom { name: name.into() }).await;
    match recv(&mut ws).await {
        Payload::Event(ServerEvent::RoomCreated { code, player }) => {
            assert_eq!(player.id, id);
            (ws, id, code)
        }
        other => panic!("expected RoomCreated, got {other:?}"),
    }
}

async fn join_room(addr: &str, code: &str, name: &str) -> (ClientWs, PlayerId) {
    let mut ws = connect(addr).await;
    let id = handshake(&mut ws).await;
    act(
        &mut ws,
        ClientAction::JoinRoom {
            code: RoomCode::parse(code).unwrap(),
            name: name.into(),
        },
    )
    .await;
    match recv(&mut ws).await {
        Payload::Event(ServerEvent::RoomJoined { player, .. }) => assert_eq!(player.id, id),
        other => panic!("expected RoomJoined, got {other:?}"),
    }
    (ws, id)
}

// =========================================================================
// Handshake and system messages
// =========================================================================

#[tokio::test]
async fn test_handshake_assigns_distinct_ids() {
    let addr = start_server().await;
    let mut ws1 = connect(&addr).await;
    let mut ws2 = connect(&addr).await;

    let p1 = handshake(&mut ws1).await;
    let p2 = handshake(&mut ws2).await;
    assert_ne!(p1, p2);
}

#[tokio::test]
async fn test_handshake_version_mismatch() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send(
        &mut ws,
        Payload::System(SystemMessage::Handshake { version: 999 }),
    )
    .await;
    let (code, message) = recv_error(&mut ws).await;
    assert_eq!(code, 400);
    assert!(message.contains("version mismatch"));
}

#[tokio::test]
async fn test_first_message_must_be_handshake() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    act(&mut ws, ClientAction::CreateRoom { name: "Ana".into() }).await;
    let (code, _) = recv_error(&mut ws).await;
    assert_eq!(code, 400);
}

#[tokio::test]
async fn test_heartbeat_response() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws).await;

    send(
        &mut ws,
        Payload::System(SystemMessage::Heartbeat { client_time: 12345 }),
    )
    .await;
    match recv(&mut ws).await {
        Payload::System(SystemMessage::HeartbeatAck { client_time, .. }) => {
            assert_eq!(client_time, 12345);
        }
        other => panic!("expected HeartbeatAck, got {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_frame_is_reported_and_skipped() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws).await;

    ws.send(Message::text("not json".to_string())).await.expect("send");
    let (code, _) = recv_error(&mut ws).await;
    assert_eq!(code, 400);

    // The connection is still usable.
    send(
        &mut ws,
        Payload::System(SystemMessage::Heartbeat { client_time: 999 }),
    )
    .await;
    assert!(matches!(
        recv(&mut ws).await,
        Payload::System(SystemMessage::HeartbeatAck { .. })
    ));
}

#[tokio::test]
async fn test_disconnect_closes_connection() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws).await;

    send(
        &mut ws,
        Payload::System(SystemMessage::Disconnect {
            reason: "bye".into(),
        }),
    )
    .await;

    let result = tokio::time::timeout(Duration::from_secs(2), ws.next()).await;
    match result {
        Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => {}
        other => panic!("expected close, got {other:?}"),
    }
}

// =========================================================================
// Room actions
// =========================================================================

#[tokio::test]
async fn test_create_room_deals_a_board() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    let id = handshake(&mut ws).await;

    act(&mut ws, ClientAction::CreateRoom { name: " Ana ".into() }).await;
    match recv(&mut ws).await {
        Payload::Event(ServerEvent::RoomCreated { code, player }) => {
            assert_eq!(code.as_str().len(), 6);
            assert_eq!(player.name, "Ana");
            assert_eq!(player.board.len(), 16);
        }
        other => panic!("expected RoomCreated, got {other:?}"),
    }
    match recv(&mut ws).await {
        Payload::Event(ServerEvent::PlayersUpdated { host, players }) => {
            assert_eq!(host, id);
            assert_eq!(players.len(), 1);
        }
        other => panic!("expected PlayersUpdated, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_name_is_rejected() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws).await;

    act(&mut ws, ClientAction::CreateRoom { name: "   ".into() }).await;
    let (code, _) = recv_error(&mut ws).await;
    assert_eq!(code, 400);
}

#[tokio::test]
async fn test_join_unknown_room_is_not_found() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws).await;

    act(
        &mut ws,
        ClientAction::JoinRoom {
            code: RoomCode::parse("ZZZZZZ").unwrap(),
            name: "Ana".into(),
        },
    )
    .await;
    let (code, _) = recv_error(&mut ws).await;
    assert_eq!(code, 404);
}

#[tokio::test]
async fn test_actions_need_a_room() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws).await;

    act(&mut ws, ClientAction::ClaimWin).await;
    let (code, message) = recv_error(&mut ws).await;
    assert_eq!(code, 409);
    assert!(message.contains("not in a room"));
}

#[tokio::test]
async fn test_join_with_lowercase_code_and_roster() {
    let addr = start_server().await;
    let (mut ana, ana_id, code) = host_room(&addr, "Ana").await;
    let (_beto, beto_id) = join_room(&addr, &code.as_str().to_lowercase(), "Beto").await;

    let event = recv_event(&mut ana, |e| {
        matches!(e, ServerEvent::PlayersUpdated { players, .. } if players.len() == 2)
    })
    .await;
    if let ServerEvent::PlayersUpdated { host, players } = event {
        assert_eq!(host, ana_id);
        assert!(players.iter().any(|p| p.id == beto_id && p.name == "Beto"));
    }
}

#[tokio::test]
async fn test_only_host_ends_game() {
    let addr = start_server().await;
    let (mut ana, _, code) = host_room(&addr, "Ana").await;
    let (mut beto, _) = join_room(&addr, code.as_str(), "Beto").await;

    act(
        &mut beto,
        ClientAction::StartGame {
            difficulty: Some("easy".into()),
        },
    )
    .await;
    recv_event(&mut beto, |e| matches!(e, ServerEvent::GameStarted { .. })).await;

    act(&mut beto, ClientAction::EndGame).await;
    let code = loop {
        if let Payload::System(SystemMessage::Error { code, .. }) = recv(&mut beto).await {
            break code;
        }
    };
    assert_eq!(code, 403);

    act(&mut ana, ClientAction::EndGame).await;
    let event = recv_event(&mut ana, |e| matches!(e, ServerEvent::GameOver { .. })).await;
    assert_eq!(
        event,
        ServerEvent::GameOver {
            winner: None,
            reason: "Ended by host".into(),
        }
    );
}

#[tokio::test]
async fn test_full_game_over_the_wire() {
    let addr = start_server().await;
    let (mut ana, _, code) = host_room(&addr, "Ana").await;
    let (mut beto, _) = join_room(&addr, code.as_str(), "Beto").await;

    act(
        &mut ana,
        ClientAction::StartGame {
            difficulty: Some("hard".into()),
        },
    )
    .await;
    let started = recv_event(&mut ana, |e| matches!(e, ServerEvent::GameStarted { .. })).await;
    assert_eq!(started, ServerEvent::GameStarted { deck_size: 28 });

    // A claim after the first card cannot be valid.
    recv_event(&mut beto, |e| matches!(e, ServerEvent::CardDrawn(_))).await;
    act(&mut beto, ClientAction::ClaimWin).await;
    let claim = recv_event(&mut beto, |e| matches!(e, ServerEvent::WinClaimed { .. })).await;
    assert_eq!(claim, ServerEvent::WinClaimed { valid: false });

    let mut cards = 0;
    let over = loop {
        match recv_event(&mut ana, |_| true).await {
            ServerEvent::CardDrawn(_) => cards += 1,
            event @ ServerEvent::GameOver { .. } => break event,
            _ => {}
        }
    };
    assert_eq!(cards, 28);
    assert_eq!(
        over,
        ServerEvent::GameOver {
            winner: None,
            reason: "Deck exhausted".into(),
        }
    );

    act(&mut ana, ClientAction::RequestState).await;
    let snapshot = recv_event(&mut ana, |e| matches!(e, ServerEvent::RoomSnapshot(_))).await;
    if let ServerEvent::RoomSnapshot(snapshot) = snapshot {
        assert_eq!(snapshot.code, code);
        assert_eq!(snapshot.drawn_cards.len(), 28);
        assert!(snapshot.me.is_some());
    }
}

#[tokio::test]
async fn test_dropped_connection_leaves_room() {
    let addr = start_server().await;
    let (mut ana, _, code) = host_room(&addr, "Ana").await;
    let (beto, _) = join_room(&addr, code.as_str(), "Beto").await;
    recv_event(&mut ana, |e| {
        matches!(e, ServerEvent::PlayersUpdated { players, .. } if players.len() == 2)
    })
    .await;

    drop(beto);

    let event = recv_event(&mut ana, |e| matches!(e, ServerEvent::PlayersUpdated { .. })).await;
    if let ServerEvent::PlayersUpdated { players, .. } = event {
        assert_eq!(players.len(), 1);
    }
}

#[tokio::test]
async fn test_leave_room_and_idle_timeout_clean_up() {
    let (addr, registry) = start_server_with(
        LoteriaServer::builder()
            .room_config(fast_rooms())
            .idle_timeout(Duration::from_millis(200)),
    )
    .await;

    // Explicit leave.
    let (mut ana, _, code) = host_room(&addr, "Ana").await;
    act(&mut ana, ClientAction::LeaveRoom).await;
    let left = recv_event(&mut ana, |e| matches!(e, ServerEvent::RoomLeft { .. })).await;
    assert_eq!(left, ServerEvent::RoomLeft { code });
    assert_eq!(registry.room_count().await, 0);

    // Silent client: the server closes it and drops its room.
    let (mut beto, _, _) = host_room(&addr, "Beto").await;
    assert_eq!(registry.room_count().await, 1);
    loop {
        match tokio::time::timeout(Duration::from_secs(2), beto.next()).await {
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => break,
            Ok(Some(Ok(_))) => continue,
            Err(_) => panic!("idle connection was not closed"),
        }
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(registry.room_count().await, 0);
}

#[tokio::test]
async fn test_no_events_from_a_room_after_leaving_it() {
    let addr = start_server().await;
    let (mut ana, _, code) = host_room(&addr, "Ana").await;
    let (mut beto, _) = join_room(&addr, code.as_str(), "Beto").await;

    // Normal pace draws every 10 ms; Beto keeps the old room drawing.
    act(&mut beto, ClientAction::StartGame { difficulty: None }).await;
    recv_event(&mut ana, |e| matches!(e, ServerEvent::CardDrawn(_))).await;

    act(&mut ana, ClientAction::LeaveRoom).await;
    recv_event(&mut ana, |e| matches!(e, ServerEvent::RoomLeft { .. })).await;

    act(&mut ana, ClientAction::CreateRoom { name: "Ana".into() }).await;
    let new_code = match recv(&mut ana).await {
        Payload::Event(ServerEvent::RoomCreated { code, .. }) => code,
        other => panic!("expected RoomCreated right after RoomLeft, got {other:?}"),
    };
    assert_ne!(new_code, code);

    // The old room is still drawing, but none of it reaches Ana.
    let quiet_until = tokio::time::Instant::now() + Duration::from_millis(150);
    while let Ok(Some(Ok(msg))) = tokio::time::timeout_at(quiet_until, ana.next()).await {
        let envelope: Envelope = serde_json::from_slice(&msg.into_data()).expect("decode");
        if let Payload::Event(event) = envelope.payload {
            assert!(
                !matches!(event, ServerEvent::CardDrawn(_) | ServerEvent::GameOver { .. }),
                "event from a room already left: {event:?}"
            );
        }
    }
    recv_event(&mut beto, |e| matches!(e, ServerEvent::CardDrawn(_))).await;
}
