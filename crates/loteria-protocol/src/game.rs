//! Game-level messages: what players ask for and what rooms announce.
//!
//! Variant and field names are camelCase on the wire (`cardDrawn`,
//! `deckSize`) because browser clients consume them directly.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{PlayerId, ProtocolError, RoomCode};

// ---------------------------------------------------------------------------
// Card
// ---------------------------------------------------------------------------

/// One Lotería card.
///
/// The catalog is static, so names are borrowed `&'static str` on the
/// server; `Cow` lets the same type own its name after being decoded on a
/// client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    /// Stable id, `1..=28`.
    pub id: u8,
    /// Display name.
    pub name: Cow<'static, str>,
}

impl Card {
    /// Builds a catalog entry at compile time.
    pub const fn new(id: u8, name: &'static str) -> Self {
        Self {
            id,
            name: Cow::Borrowed(name),
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.id, self.name)
    }
}

// ---------------------------------------------------------------------------
// Difficulty
// ---------------------------------------------------------------------------

/// Draw speed chosen by whoever starts the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Normal,
    Hard,
}

impl Difficulty {
    /// Resolves an optional, possibly unknown difficulty name.
    ///
    /// Omitted or unrecognized names fall back to [`Difficulty::Normal`];
    /// a typo in the start screen should never prevent a game from
    /// starting.
    pub fn from_name(name: Option<&str>) -> Self {
        name.and_then(|n| n.parse().ok()).unwrap_or_default()
    }
}

impl FromStr for Difficulty {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "normal" => Ok(Self::Normal),
            "hard" => Ok(Self::Hard),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown difficulty {other:?}"
            ))),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Easy => f.write_str("easy"),
            Self::Normal => f.write_str("normal"),
            Self::Hard => f.write_str("hard"),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomStatus
// ---------------------------------------------------------------------------

/// The lifecycle state of a room.
///
/// Transitions never go back to `Waiting` and never skip `Playing`:
///
/// ```text
/// Waiting → Playing → Ended
///              ↑        │
///              └────────┘  (rematch with the same players)
/// ```
///
/// - **Waiting**: accepting joins, no deck yet.
/// - **Playing**: deck shuffled, cards being drawn on a timer.
/// - **Ended**: the round is over. Someone won, the deck ran out, the host
///   ended the game, or everyone left. Only a new `start` leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Ended,
}

impl RoomStatus {
    /// Returns `true` if the room is accepting new players.
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Returns `true` if moving to `target` is a legal transition.
    ///
    /// `Waiting` may also be forced straight to `Ended`: an empty room is
    /// closed even if its game never started.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Waiting | Self::Ended, Self::Playing) | (Self::Waiting | Self::Playing, Self::Ended)
        )
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => f.write_str("waiting"),
            Self::Playing => f.write_str("playing"),
            Self::Ended => f.write_str("ended"),
        }
    }
}

// ---------------------------------------------------------------------------
// Player views
// ---------------------------------------------------------------------------

/// A player as seen by themselves: includes the full board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub board: Vec<Card>,
}

/// A player as seen by the rest of the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub id: PlayerId,
    pub name: String,
    /// How many board cells the player has marked (advisory).
    pub marked: usize,
}

/// Everything a client needs to rebuild its screen after missing events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub code: RoomCode,
    pub status: RoomStatus,
    pub host: PlayerId,
    pub players: Vec<PlayerSummary>,
    pub drawn_cards: Vec<Card>,
    pub deck_size: usize,
    /// The requester's own board, when they are in the room.
    pub me: Option<PlayerView>,
    /// Board indices the requester has marked, ascending.
    pub marked_indices: Vec<usize>,
}

// ---------------------------------------------------------------------------
// ClientAction — client → server
// ---------------------------------------------------------------------------

/// Requests a player can send once connected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientAction {
    /// Open a new room and join it as host.
    CreateRoom { name: String },
    /// Join an existing room by code.
    JoinRoom { code: RoomCode, name: String },
    /// Leave the current room.
    LeaveRoom,
    /// Start (or, after it ended, restart) the game in the current room.
    /// `difficulty` is free text; unknown values mean "normal".
    StartGame {
        #[serde(default)]
        difficulty: Option<String>,
    },
    /// Host only: end the running game.
    EndGame,
    /// "¡Lotería!" — ask the server to verify the player's board.
    ClaimWin,
    /// Mirror a board cell mark. Advisory only; wins never consult it.
    MarkCard { index: usize, marked: bool },
    /// Resynchronize: ask for a [`RoomSnapshot`].
    RequestState,
}

// ---------------------------------------------------------------------------
// ServerEvent — server → client
// ---------------------------------------------------------------------------

/// Room broadcasts and per-player replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    // -- Broadcast to the whole room --
    /// A new deck was shuffled; the first card follows after the warm-up.
    GameStarted { deck_size: usize },
    /// The next card of the deck was revealed.
    CardDrawn(Card),
    /// The game is over. `winner` is `None` when nobody won.
    GameOver {
        winner: Option<PlayerId>,
        reason: String,
    },
    /// Lobby roster changed.
    PlayersUpdated {
        host: PlayerId,
        players: Vec<PlayerSummary>,
    },

    // -- Replies to the requester only --
    RoomCreated { code: RoomCode, player: PlayerView },
    RoomJoined { code: RoomCode, player: PlayerView },
    RoomLeft { code: RoomCode },
    /// Outcome of a `claimWin`. A valid claim is followed by `gameOver`.
    WinClaimed { valid: bool },
    RoomSnapshot(RoomSnapshot),
}
