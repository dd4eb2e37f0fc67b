//! Per-connection handler: handshake, action routing, event forwarding.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Upgrade to WebSocket, receive Handshake, validate version
//!   2. Assign a PlayerId, send HandshakeAck
//!   3. Loop: client frames → room registry; room events → client
//!
//! Leaving the loop for any reason (close, error, idle timeout) takes the
//! player out of their room.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use loteria_protocol::{
    ClientAction, Codec, Difficulty, Envelope, PROTOCOL_VERSION, Payload, PlayerId, ProtocolError,
    RoomCode, ServerEvent, SystemMessage,
};
use loteria_room::{PlayerSender, RoomError};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{error::Elapsed, timeout, timeout_at};

use crate::server::ServerState;
use crate::{LoteriaError, TransportError, WebSocketConnection};

/// Longest display name accepted, in characters.
pub const MAX_NAME_LEN: usize = 24;

/// What woke the connection loop up.
enum Inbound {
    Frame(Result<Result<Option<Vec<u8>>, TransportError>, Elapsed>),
    Event(ServerEvent),
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState<C>>,
) -> Result<(), LoteriaError> {
    let started = Instant::now();

    let conn = match timeout(
        state.config.handshake_timeout,
        WebSocketConnection::upgrade(stream, peer),
    )
    .await
    {
        Ok(conn) => conn?,
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("websocket upgrade timed out".into()).into());
        }
    };

    let player_id = perform_handshake(&conn, &state, started).await?;
    tracing::info!(%peer, %player_id, "player connected");

    let mut session = Session {
        conn,
        state,
        player_id,
        started,
        seq: 1,
        room: None,
        events: None,
    };

    // Only client frames push the idle deadline back; room events do not.
    let idle = session.state.config.idle_timeout;
    let mut deadline = tokio::time::Instant::now() + idle;

    loop {
        let inbound = tokio::select! {
            frame = timeout_at(deadline, session.conn.recv()) => Inbound::Frame(frame),
            Some(event) = next_event(&mut session.events) => Inbound::Event(event),
        };

        match inbound {
            Inbound::Event(event) => session.send(Payload::Event(event)).await?,
            Inbound::Frame(Ok(Ok(Some(data)))) => {
                deadline = tokio::time::Instant::now() + idle;
                if session.handle_frame(&data).await? {
                    let _ = session.conn.close().await;
                    break;
                }
            }
            Inbound::Frame(Ok(Ok(None))) => {
                tracing::info!(%player_id, "connection closed cleanly");
                break;
            }
            Inbound::Frame(Ok(Err(e))) => {
                tracing::debug!(%player_id, error = %e, "recv error");
                break;
            }
            Inbound::Frame(Err(_)) => {
                tracing::info!(%player_id, "connection timed out");
                let _ = session.conn.close().await;
                break;
            }
        }
    }

    // `session` drops here and leaves its room.
    Ok(())
}

/// Receives the Handshake, validates it and answers with the new identity.
async fn perform_handshake<C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<C>,
    started: Instant,
) -> Result<PlayerId, LoteriaError> {
    let data = match timeout(state.config.handshake_timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(TransportError::ConnectionClosed("closed before handshake".into()).into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let envelope: Envelope = state.codec.decode(&data)?;

    let version = match envelope.payload {
        Payload::System(SystemMessage::Handshake { version }) => version,
        _ => {
            send_error(conn, &state.codec, 400, "expected Handshake", 0, started).await?;
            return Err(ProtocolError::InvalidMessage("first message must be Handshake".into()).into());
        }
    };

    if version != PROTOCOL_VERSION {
        send_error(
            conn,
            &state.codec,
            400,
            &format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
            0,
            started,
        )
        .await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    let player_id = state.next_player_id();
    let ack = Envelope {
        seq: 0,
        timestamp: elapsed_ms(started),
        payload: Payload::System(SystemMessage::HandshakeAck {
            player_id,
            server_time: elapsed_ms(started),
        }),
    };
    conn.send(&state.codec.encode(&ack)?).await?;

    Ok(player_id)
}

/// A handshaken connection and the room it is in.
struct Session<C: Codec> {
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
    player_id: PlayerId,
    started: Instant,
    /// Next outbound sequence number; the ack used 0.
    seq: u64,
    room: Option<RoomCode>,
    /// Broadcasts from the current room. Replaced on every create or join,
    /// so nothing from a room already left reaches the client.
    events: Option<mpsc::UnboundedReceiver<ServerEvent>>,
}

impl<C: Codec> Session<C> {
    /// Handles one client frame. Returns `true` if the connection should
    /// close.
    async fn handle_frame(&mut self, data: &[u8]) -> Result<bool, LoteriaError> {
        let envelope: Envelope = match self.state.codec.decode(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(player_id = %self.player_id, error = %e, "failed to decode envelope");
                self.send_error(400, &format!("invalid frame: {e}")).await?;
                return Ok(false);
            }
        };

        match envelope.payload {
            Payload::System(msg) => self.handle_system(msg).await,
            Payload::Action(action) => {
                self.handle_action(action).await?;
                Ok(false)
            }
            Payload::Event(_) => {
                self.send_error(400, "clients cannot send events").await?;
                Ok(false)
            }
        }
    }

    async fn handle_system(&mut self, msg: SystemMessage) -> Result<bool, LoteriaError> {
        match msg {
            SystemMessage::Heartbeat { client_time } => {
                let server_time = elapsed_ms(self.started);
                self.send(Payload::System(SystemMessage::HeartbeatAck {
                    client_time,
                    server_time,
                }))
                .await?;
            }
            SystemMessage::Disconnect { reason } => {
                tracing::info!(player_id = %self.player_id, %reason, "client disconnected");
                return Ok(true);
            }
            SystemMessage::Handshake { .. } => {
                self.send_error(400, "already connected").await?;
            }
            _ => {
                tracing::debug!(player_id = %self.player_id, "ignoring unexpected system message");
            }
        }
        Ok(false)
    }

    async fn handle_action(&mut self, action: ClientAction) -> Result<(), LoteriaError> {
        let player_id = self.player_id;
        let registry = Arc::clone(&self.state.registry);
        tracing::debug!(%player_id, ?action, "action");

        match action {
            ClientAction::CreateRoom { name } => {
                let Some(name) = self.check_name(&name).await? else {
                    return Ok(());
                };
                if let Some(code) = &self.room {
                    let err = RoomError::AlreadyInRoom(player_id, code.clone());
                    return self.send_room_error(err).await;
                }

                let code = registry.create_room(player_id).await;
                let events = self.subscribe();
                match registry
                    .join_room(&code, player_id, name, events)
                    .await
                {
                    Ok(player) => {
                        self.room = Some(code.clone());
                        self.send(Payload::Event(ServerEvent::RoomCreated { code, player }))
                            .await?;
                    }
                    Err(err) => {
                        self.events = None;
                        let _ = registry.destroy_room(&code).await;
                        self.send_room_error(err).await?;
                    }
                }
            }

            ClientAction::JoinRoom { code, name } => {
                let Some(name) = self.check_name(&name).await? else {
                    return Ok(());
                };
                if let Some(current) = &self.room {
                    let err = RoomError::AlreadyInRoom(player_id, current.clone());
                    return self.send_room_error(err).await;
                }

                let events = self.subscribe();
                match registry
                    .join_room(&code, player_id, name, events)
                    .await
                {
                    Ok(player) => {
                        self.room = Some(code.clone());
                        self.send(Payload::Event(ServerEvent::RoomJoined { code, player }))
                            .await?;
                    }
                    Err(err) => {
                        self.events = None;
                        self.send_room_error(err).await?;
                    }
                }
            }

            ClientAction::LeaveRoom => {
                let Some(code) = self.room.take() else {
                    return self.send_error(409, "not in a room").await;
                };
                self.events = None;
                if let Err(e) = registry.leave_room(&code, player_id).await {
                    tracing::debug!(%player_id, error = %e, "leave room failed");
                }
                self.send(Payload::Event(ServerEvent::RoomLeft { code })).await?;
            }

            ClientAction::StartGame { difficulty } => {
                let Some(code) = self.current_room().await? else {
                    return Ok(());
                };
                let difficulty = Difficulty::from_name(difficulty.as_deref());
                if let Err(err) = registry.start_game(&code, player_id, difficulty).await {
                    self.send_room_error(err).await?;
                }
            }

            ClientAction::EndGame => {
                let Some(code) = self.current_room().await? else {
                    return Ok(());
                };
                if let Err(err) = registry.end_game(&code, player_id).await {
                    self.send_room_error(err).await?;
                }
            }

            ClientAction::ClaimWin => {
                let Some(code) = self.current_room().await? else {
                    return Ok(());
                };
                match registry.claim_win(&code, player_id).await {
                    Ok(valid) => {
                        self.send(Payload::Event(ServerEvent::WinClaimed { valid }))
                            .await?;
                    }
                    Err(err) => self.send_room_error(err).await?,
                }
            }

            ClientAction::MarkCard { index, marked } => {
                let Some(code) = self.current_room().await? else {
                    return Ok(());
                };
                if let Err(err) = registry.mark_card(&code, player_id, index, marked).await {
                    self.send_room_error(err).await?;
                }
            }

            ClientAction::RequestState => {
                let Some(code) = self.current_room().await? else {
                    return Ok(());
                };
                match registry.snapshot(&code, Some(player_id)).await {
                    Ok(snapshot) => {
                        self.send(Payload::Event(ServerEvent::RoomSnapshot(snapshot)))
                            .await?;
                    }
                    Err(err) => self.send_room_error(err).await?,
                }
            }
        }

        Ok(())
    }

    /// Opens a fresh event channel for the room about to be joined and
    /// drops the previous one along with anything still queued in it.
    fn subscribe(&mut self) -> PlayerSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(rx);
        tx
    }

    /// The player's room, or `None` after telling them they have none.
    async fn current_room(&mut self) -> Result<Option<RoomCode>, LoteriaError> {
        match &self.room {
            Some(code) => Ok(Some(code.clone())),
            None => {
                self.send_error(409, "not in a room").await?;
                Ok(None)
            }
        }
    }

    /// The trimmed display name, or `None` after rejecting it.
    async fn check_name(&mut self, name: &str) -> Result<Option<String>, LoteriaError> {
        let name = name.trim();
        if name.is_empty() {
            self.send_error(400, "name must not be empty").await?;
            return Ok(None);
        }
        if name.chars().count() > MAX_NAME_LEN {
            self.send_error(400, &format!("name must be at most {MAX_NAME_LEN} characters"))
                .await?;
            return Ok(None);
        }
        Ok(Some(name.to_string()))
    }

    async fn send_room_error(&mut self, err: RoomError) -> Result<(), LoteriaError> {
        if matches!(&err, RoomError::RoomNotFound(code) if self.room.as_ref() == Some(code)) {
            // The room went away under us.
            self.room = None;
            self.events = None;
        }
        tracing::debug!(player_id = %self.player_id, error = %err, "request rejected");
        self.send_error(err.code(), &err.to_string()).await
    }

    async fn send_error(&mut self, code: u16, message: &str) -> Result<(), LoteriaError> {
        let seq = next_seq(&mut self.seq);
        send_error(&self.conn, &self.state.codec, code, message, seq, self.started).await
    }

    async fn send(&mut self, payload: Payload) -> Result<(), LoteriaError> {
        let envelope = Envelope {
            seq: next_seq(&mut self.seq),
            timestamp: elapsed_ms(self.started),
            payload,
        };
        let bytes = self.state.codec.encode(&envelope)?;
        self.conn.send(&bytes).await?;
        Ok(())
    }
}

impl<C: Codec> Drop for Session<C> {
    /// Leaves the room even if the handler bailed out with an error.
    /// `Drop` is synchronous, so the leave runs in its own task.
    fn drop(&mut self) {
        let Some(code) = self.room.take() else {
            return;
        };
        let player_id = self.player_id;
        let registry = Arc::clone(&self.state.registry);
        tokio::spawn(async move {
            if let Err(e) = registry.leave_room(&code, player_id).await {
                tracing::debug!(%player_id, room = %code, error = %e, "leave on disconnect failed");
            }
        });
    }
}

/// Sends a `SystemMessage::Error` envelope to the client.
async fn send_error(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    code: u16,
    message: &str,
    seq: u64,
    started: Instant,
) -> Result<(), LoteriaError> {
    let envelope = Envelope {
        seq,
        timestamp: elapsed_ms(started),
        payload: Payload::System(SystemMessage::Error {
            code,
            message: message.to_string(),
        }),
    };
    let bytes = codec.encode(&envelope)?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Next broadcast from the current room. Pends forever outside a room.
async fn next_event(events: &mut Option<mpsc::UnboundedReceiver<ServerEvent>>) -> Option<ServerEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
