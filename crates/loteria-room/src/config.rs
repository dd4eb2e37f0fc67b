//! Room configuration.

use std::time::Duration;

use loteria_protocol::{Difficulty, RoomCode};
use loteria_tick::DrawTimings;
use tracing::warn;

/// Hard upper bound on players per room.
pub const MAX_PLAYERS: usize = 4;

// ---------------------------------------------------------------------------
// DrawIntervals
// ---------------------------------------------------------------------------

/// Time between draws for each difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawIntervals {
    pub easy: Duration,
    pub normal: Duration,
    pub hard: Duration,
}

impl Default for DrawIntervals {
    fn default() -> Self {
        Self {
            easy: Duration::from_millis(6_000),
            normal: Duration::from_millis(4_000),
            hard: Duration::from_millis(3_000),
        }
    }
}

impl DrawIntervals {
    /// The interval for `difficulty`.
    pub fn for_difficulty(&self, difficulty: Difficulty) -> Duration {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Normal => self.normal,
            Difficulty::Hard => self.hard,
        }
    }
}

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Configuration shared by every room a registry creates.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Maximum players allowed in a room. Capped at [`MAX_PLAYERS`].
    pub max_players: usize,

    /// Delay between `gameStarted` and the first `cardDrawn`, giving
    /// clients time to render their boards.
    pub warm_up: Duration,

    /// Window after the last card during which a win can still be claimed.
    pub grace_period: Duration,

    /// Draw interval per difficulty.
    pub intervals: DrawIntervals,

    /// Length of generated room codes.
    pub code_length: usize,

    /// Capacity of each room actor's command channel. Senders wait when
    /// it is full.
    pub command_buffer: usize,

    /// Seed for board and deck shuffles. `None` seeds from the OS; a fixed
    /// seed makes every room deal the same boards and decks.
    pub rng_seed: Option<u64>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_players: MAX_PLAYERS,
            warm_up: Duration::from_millis(2_000),
            grace_period: Duration::from_millis(4_000),
            intervals: DrawIntervals::default(),
            code_length: 6,
            command_buffer: 64,
            rng_seed: None,
        }
    }
}

impl RoomConfig {
    /// Shortest generated code; fewer characters make collisions likely.
    pub const MIN_CODE_LENGTH: usize = 4;

    /// Clamp any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`RoomRegistry::new`](crate::RoomRegistry::new).
    pub fn validated(mut self) -> Self {
        if self.max_players == 0 || self.max_players > MAX_PLAYERS {
            warn!(
                max_players = self.max_players,
                cap = MAX_PLAYERS,
                "max_players out of range, clamping"
            );
            self.max_players = self.max_players.clamp(1, MAX_PLAYERS);
        }
        let code_length = self
            .code_length
            .clamp(Self::MIN_CODE_LENGTH, RoomCode::MAX_LEN);
        if code_length != self.code_length {
            warn!(
                code_length = self.code_length,
                clamped = code_length,
                "code_length out of range, clamping"
            );
            self.code_length = code_length;
        }
        self.command_buffer = self.command_buffer.max(1);
        self
    }

    /// Timer settings for a game at `difficulty`.
    pub fn timings(&self, difficulty: Difficulty) -> DrawTimings {
        DrawTimings {
            warm_up: self.warm_up,
            interval: self.intervals.for_difficulty(difficulty),
            grace: self.grace_period,
        }
    }
}
