//! Room registry: creates rooms, looks them up by code, and routes player
//! requests to them.

use std::collections::HashMap;
use std::future::Future;

use loteria_protocol::{Difficulty, PlayerId, PlayerView, RoomCode, RoomSnapshot};
use rand::Rng;
use tokio::sync::RwLock;

use crate::room::spawn_room;
use crate::{LeaveOutcome, PlayerSender, RoomConfig, RoomError, RoomHandle, RoomInfo};

/// Characters generated room codes are drawn from.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Every live room, keyed by code.
///
/// Constructed explicitly and shared behind an `Arc`; there is no global
/// instance. The map lock only guards lookups and insertions: it is
/// released before any request reaches a room, so a slow room never
/// blocks the others.
pub struct RoomRegistry {
    config: RoomConfig,
    rooms: RwLock<HashMap<RoomCode, RoomHandle>>,
}

impl RoomRegistry {
    /// Creates an empty registry. `config` is validated once here and
    /// shared by every room.
    pub fn new(config: RoomConfig) -> Self {
        Self {
            config: config.validated(),
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// The validated room configuration.
    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Spawns a new room with a fresh code. `host` still has to join it.
    ///
    /// Codes are unique among live rooms: a collision just draws again.
    pub async fn create_room(&self, host: PlayerId) -> RoomCode {
        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, handle| !handle.is_closed());

        let code = loop {
            let Ok(code) = RoomCode::parse(&generate_code(self.config.code_length)) else {
                continue;
            };
            if !rooms.contains_key(&code) {
                break code;
            }
            tracing::debug!(room = %code, "room code collision, drawing again");
        };

        let handle = spawn_room(code.clone(), host, self.config.clone());
        rooms.insert(code.clone(), handle);
        tracing::info!(room = %code, %host, rooms = rooms.len(), "room created");
        code
    }

    /// Looks up a live room. Codes compare case-insensitively because
    /// [`RoomCode`] is normalized on parse.
    pub async fn get_room(&self, code: &RoomCode) -> Option<RoomHandle> {
        self.rooms
            .read()
            .await
            .get(code)
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    /// Adds a player to a room.
    ///
    /// # Errors
    /// [`RoomError::RoomNotFound`] when no live room has `code`; otherwise
    /// whatever the room rejects the join with.
    pub async fn join_room(
        &self,
        code: &RoomCode,
        player_id: PlayerId,
        name: String,
        sender: PlayerSender,
    ) -> Result<PlayerView, RoomError> {
        self.with_room(code, |room| async move { room.join(player_id, name, sender).await })
            .await
    }

    /// Removes a player from a room, dropping the room once it is empty.
    pub async fn leave_room(
        &self,
        code: &RoomCode,
        player_id: PlayerId,
    ) -> Result<LeaveOutcome, RoomError> {
        let (outcome, room) = self
            .with_room(code, |room| async move {
                let outcome = room.leave(player_id).await?;
                Ok((outcome, room))
            })
            .await?;

        if outcome.remaining == 0 {
            self.forget_room(&room).await;
        }
        Ok(outcome)
    }

    /// Starts (or restarts) the game. `Ok(false)` if it was already running.
    pub async fn start_game(
        &self,
        code: &RoomCode,
        player_id: PlayerId,
        difficulty: Difficulty,
    ) -> Result<bool, RoomError> {
        self.with_room(code, |room| async move { room.start(player_id, difficulty).await })
            .await
    }

    /// Checks a win claim; on success the room ends the game and
    /// broadcasts the winner.
    pub async fn claim_win(&self, code: &RoomCode, player_id: PlayerId) -> Result<bool, RoomError> {
        self.with_room(code, |room| async move { room.claim_win(player_id).await })
            .await
    }

    /// Side-effect-free board check.
    pub async fn validate_win(
        &self,
        code: &RoomCode,
        player_id: PlayerId,
    ) -> Result<bool, RoomError> {
        self.with_room(code, |room| async move { room.validate_win(player_id).await })
            .await
    }

    pub async fn end_game(&self, code: &RoomCode, player_id: PlayerId) -> Result<(), RoomError> {
        self.with_room(code, |room| async move { room.end_game(player_id).await })
            .await
    }

    pub async fn mark_card(
        &self,
        code: &RoomCode,
        player_id: PlayerId,
        index: usize,
        marked: bool,
    ) -> Result<(), RoomError> {
        self.with_room(code, |room| async move { room.mark(player_id, index, marked).await })
            .await
    }

    pub async fn snapshot(
        &self,
        code: &RoomCode,
        player_id: Option<PlayerId>,
    ) -> Result<RoomSnapshot, RoomError> {
        self.with_room(code, |room| async move { room.snapshot(player_id).await })
            .await
    }

    pub async fn room_info(&self, code: &RoomCode) -> Result<RoomInfo, RoomError> {
        self.with_room(code, |room| async move { room.info().await })
            .await
    }

    /// Shuts a room down and forgets it.
    pub async fn destroy_room(&self, code: &RoomCode) -> Result<(), RoomError> {
        let handle = self
            .rooms
            .write()
            .await
            .remove(code)
            .ok_or_else(|| RoomError::RoomNotFound(code.clone()))?;

        // The actor may already be gone; the entry is removed either way.
        let _ = handle.shutdown().await;
        tracing::info!(room = %code, "room destroyed");
        Ok(())
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms
            .read()
            .await
            .values()
            .filter(|handle| !handle.is_closed())
            .count()
    }

    /// Codes of every live room.
    pub async fn room_codes(&self) -> Vec<RoomCode> {
        self.rooms
            .read()
            .await
            .iter()
            .filter(|(_, handle)| !handle.is_closed())
            .map(|(code, _)| code.clone())
            .collect()
    }

    /// Runs `op` against the room with `code`.
    ///
    /// A room whose actor exited between lookup and request is reported
    /// as not found and its stale entry is dropped.
    /// Drops the entry for `room`. Leaves the code alone if it was already
    /// handed to a newer room. Returns whether an entry was removed.
    async fn forget_room(&self, room: &RoomHandle) -> bool {
        let mut rooms = self.rooms.write().await;
        if !rooms.get(room.code()).is_some_and(|current| current.same_room(room)) {
            return false;
        }
        rooms.remove(room.code());
        tracing::info!(room = %room.code(), rooms = rooms.len(), "room destroyed");
        true
    }

    async fn with_room<T, F, Fut>(&self, code: &RoomCode, op: F) -> Result<T, RoomError>
    where
        F: FnOnce(RoomHandle) -> Fut,
        Fut: Future<Output = Result<T, RoomError>>,
    {
        let room = self
            .get_room(code)
            .await
            .ok_or_else(|| RoomError::RoomNotFound(code.clone()))?;

        match op(room).await {
            Err(RoomError::Unavailable(_)) => {
                let mut rooms = self.rooms.write().await;
                if rooms.get(code).is_some_and(RoomHandle::is_closed) {
                    rooms.remove(code);
                }
                Err(RoomError::RoomNotFound(code.clone()))
            }
            result => result,
        }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(RoomConfig::default())
    }
}

/// A random code of `length` characters from [`CODE_ALPHABET`].
fn generate_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
        .collect()
}
