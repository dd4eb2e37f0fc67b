//! Room lifecycle management for Lotería.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! players, its deck and its draw timer. Joins, timer ticks and win claims
//! are processed one at a time by that task, so no two can interleave.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: creates rooms, looks them up by code, routes players
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`Game`]: the synchronous state machine a room actor drives
//! - [`RoomConfig`]: player limit, warm-up, intervals, grace period
//! - [`CATALOG`]: the 28 cards every board and deck is drawn from

mod board;
mod catalog;
mod config;
mod error;
mod game;
mod manager;
mod room;

pub use board::{Board, shuffled_deck};
pub use catalog::{BOARD_SIZE, CATALOG, DECK_SIZE, card_by_id};
pub use config::{DrawIntervals, MAX_PLAYERS, RoomConfig};
pub use error::RoomError;
pub use game::{
    Draw, Game, Player, REASON_DECK_EXHAUSTED, REASON_ENDED_BY_HOST, REASON_WIN,
};
pub use loteria_protocol::RoomStatus;
pub use manager::RoomRegistry;
pub use room::{LeaveOutcome, PlayerSender, RoomHandle, RoomInfo};
