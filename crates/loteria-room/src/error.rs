//! Error types for the room layer.

use loteria_protocol::{PlayerId, RoomCode};

use crate::BOARD_SIZE;

/// Errors that can occur during room operations.
///
/// Every variant is a rejected request, safe to show to the player who
/// made it. None of them leave the room partially updated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// No live room has this code.
    #[error("room {0} not found")]
    RoomNotFound(RoomCode),

    /// The room already has its maximum number of players.
    #[error("room {0} is full (max {1} players)")]
    RoomFull(RoomCode, usize),

    /// Joining is only possible before the first game starts.
    #[error("the game in room {0} has already started")]
    GameAlreadyStarted(RoomCode),

    /// The player is not a member of this room.
    #[error("player {0} not in room {1}")]
    PlayerNotFound(PlayerId, RoomCode),

    /// The player is already a member of this room.
    #[error("player {0} already in room {1}")]
    AlreadyInRoom(PlayerId, RoomCode),

    /// Only the room's host may do this.
    #[error("player {0} is not the host of room {1}")]
    NotHost(PlayerId, RoomCode),

    /// The operation needs a game in progress (e.g. a second win claim
    /// after the first one already ended the game).
    #[error("no game in progress in room {0}")]
    GameNotInProgress(RoomCode),

    /// A board mark outside `0..16`.
    #[error("card index {0} is outside the board (0-{max})", max = BOARD_SIZE - 1)]
    InvalidCardIndex(usize),

    /// The room's actor stopped before answering.
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),
}

impl RoomError {
    /// HTTP-style status code used when the error is sent to a client.
    pub fn code(&self) -> u16 {
        match self {
            Self::InvalidCardIndex(_) => 400,
            Self::NotHost(..) => 403,
            Self::RoomNotFound(_) | Self::PlayerNotFound(..) => 404,
            Self::RoomFull(..)
            | Self::GameAlreadyStarted(_)
            | Self::AlreadyInRoom(..)
            | Self::GameNotInProgress(_) => 409,
            Self::Unavailable(_) => 503,
        }
    }
}
