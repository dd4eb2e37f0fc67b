//! # Lotería
//!
//! Multiplayer Lotería server: a WebSocket gateway in front of the room
//! engine in [`loteria_room`].
//!
//! Every connection handshakes, receives a [`PlayerId`], then sends
//! [`ClientAction`]s and receives [`ServerEvent`]s, all wrapped in
//! [`Envelope`]s. Game rules, timing and win validation live in the room
//! actors; this crate only routes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use loteria::prelude::*;
//!
//! # async fn run() -> Result<(), LoteriaError> {
//! let server = LoteriaServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;
mod transport;

pub use error::LoteriaError;
pub use handler::MAX_NAME_LEN;
pub use server::{DEFAULT_BIND, LoteriaServer, LoteriaServerBuilder, ServerConfig};
pub use transport::{TransportError, WebSocketConnection, WebSocketTransport};

pub use loteria_protocol::{
    ClientAction, Envelope, Payload, PlayerId, RoomCode, ServerEvent, SystemMessage,
};

/// Everything needed to configure and run a server.
pub mod prelude {
    pub use crate::{LoteriaError, LoteriaServer, LoteriaServerBuilder, ServerConfig};
    pub use loteria_protocol::{
        Card, ClientAction, Codec, Difficulty, Envelope, JsonCodec, PROTOCOL_VERSION, Payload,
        PlayerId, RoomCode, ServerEvent, SystemMessage,
    };
    pub use loteria_room::{DrawIntervals, RoomConfig, RoomRegistry};
}
