//! Framing types for the wire format.
//!
//! Everything a connection sends or receives is an [`Envelope`]. The
//! envelope's [`Payload`] says whether the frame is framework plumbing
//! ([`SystemMessage`]), a player request ([`ClientAction`]), or a room
//! announcement ([`ServerEvent`]).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ClientAction, ProtocolError, ServerEvent};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Opaque identifier of a connected player.
///
/// The gateway assigns one per connection; the room engine only needs it
/// to be stable and unique. `#[serde(transparent)]` keeps it a plain
/// number on the wire, so `PlayerId(42)` is just `42`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A short, human-typeable room code such as `"K7Q2ZD"`.
///
/// Codes are uppercase ASCII alphanumerics. Parsing trims whitespace and
/// uppercases, so players can type `k7q2zd` and still land in the room.
/// Deserialization goes through the same parser, so a code read off the
/// wire is always normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Longest code accepted from a client.
    pub const MAX_LEN: usize = 16;

    /// Parses user input into a normalized code.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] when the input is empty,
    /// too long, or contains anything but ASCII letters and digits.
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.len() > Self::MAX_LEN {
            return Err(ProtocolError::InvalidMessage(format!(
                "room code must be 1-{} characters",
                Self::MAX_LEN
            )));
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ProtocolError::InvalidMessage(format!(
                "room code {trimmed:?} must be alphanumeric"
            )));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// The normalized code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// SystemMessage — framework-level messages
// ---------------------------------------------------------------------------

/// Messages used by the gateway itself (not game-specific).
///
/// `#[serde(tag = "type")]` produces internally tagged JSON:
/// `{ "type": "Handshake", "version": 1 }` rather than
/// `{ "Handshake": { "version": 1 } }`, which is easier to switch on in
/// JavaScript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SystemMessage {
    // -- Connection lifecycle --
    /// Client → Server: first frame of every connection.
    Handshake { version: u32 },

    /// Server → Client: the connection is live; `player_id` is the identity
    /// the server will use for this connection from now on.
    HandshakeAck { player_id: PlayerId, server_time: u64 },

    /// Either direction: "I'm disconnecting."
    Disconnect { reason: String },

    // -- Heartbeat (keep-alive) --
    /// Client → Server: "I'm still here." Resets the idle timeout.
    Heartbeat { client_time: u64 },

    /// Server → Client: echoes `client_time` for RTT estimation.
    HeartbeatAck { client_time: u64, server_time: u64 },

    // -- Errors --
    /// Server → Client: a rejected request. `code` follows HTTP
    /// conventions (400 bad request, 403 forbidden, 404 not found,
    /// 409 conflict); `message` is safe to show to the player.
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Payload and Envelope
// ---------------------------------------------------------------------------

/// The content of a frame.
///
/// `#[serde(tag = "type", content = "data")]` produces adjacently tagged
/// JSON, e.g. `{ "type": "Action", "data": { "type": "claimWin" } }`, so a
/// client can route on the outer tag before looking inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    /// Handshake, heartbeat, disconnect, error.
    System(SystemMessage),
    /// Client → Server: a request for the room engine.
    Action(ClientAction),
    /// Server → Client: something happened in the player's room, or the
    /// answer to one of their actions.
    Event(ServerEvent),
}

/// The top-level message wrapper. Every frame on the wire is an Envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-direction, auto-incrementing sequence number.
    pub seq: u64,
    /// Milliseconds since the sender's connection started.
    pub timestamp: u64,
    /// The frame content.
    pub payload: Payload,
}
