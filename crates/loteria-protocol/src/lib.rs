//! Wire protocol for the Lotería server.
//!
//! This crate defines the "language" that clients and the server speak:
//!
//! - **Framing** ([`Envelope`], [`Payload`], [`SystemMessage`]) — the
//!   structures every frame is wrapped in.
//! - **Game messages** ([`ClientAction`], [`ServerEvent`], [`Card`],
//!   [`Difficulty`], [`RoomStatus`]) — what players ask for and what rooms
//!   announce.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those messages are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while doing so.
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (raw bytes) and the room
//! engine. It knows nothing about connections or timers — only how
//! messages are shaped and serialized.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Room engine (actions/events)
//! ```

mod codec;
mod error;
mod game;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use game::{
    Card, ClientAction, Difficulty, PlayerSummary, PlayerView, RoomSnapshot,
    RoomStatus, ServerEvent,
};
pub use types::{Envelope, Payload, PlayerId, RoomCode, SystemMessage};

/// The current protocol version. Clients must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;
