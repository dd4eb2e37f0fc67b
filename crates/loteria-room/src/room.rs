//! Room actor: an isolated Tokio task that owns one [`Game`] and its draw
//! timer.
//!
//! Commands arrive on a bounded mpsc channel, timer events come from the
//! actor's own [`DrawScheduler`], and the loop handles exactly one of them
//! at a time. A draw tick can therefore never interleave with a join, a
//! leave or a win claim, and cancelling the timer is a plain field update.

use std::collections::HashMap;
use std::ops::ControlFlow;

use loteria_protocol::{
    Difficulty, PlayerId, PlayerView, RoomCode, RoomSnapshot, RoomStatus, ServerEvent,
};
use loteria_tick::{DrawScheduler, TimerEvent};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{mpsc, oneshot};

use crate::{
    Game, REASON_DECK_EXHAUSTED, REASON_ENDED_BY_HOST, REASON_WIN, RoomConfig, RoomError,
};

/// Channel sender for delivering room events to a player's connection.
pub type PlayerSender = mpsc::UnboundedSender<ServerEvent>;

/// Commands sent to a room actor through its channel.
///
/// Variants carrying a `oneshot::Sender` expect a reply; the caller awaits
/// it on the other end.
pub(crate) enum RoomCommand {
    Join {
        player_id: PlayerId,
        name: String,
        sender: PlayerSender,
        reply: oneshot::Sender<Result<PlayerView, RoomError>>,
    },
    Leave {
        player_id: PlayerId,
        reply: oneshot::Sender<LeaveOutcome>,
    },
    Start {
        player_id: PlayerId,
        difficulty: Difficulty,
        reply: oneshot::Sender<Result<bool, RoomError>>,
    },
    EndGame {
        player_id: PlayerId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    ClaimWin {
        player_id: PlayerId,
        reply: oneshot::Sender<Result<bool, RoomError>>,
    },
    ValidateWin {
        player_id: PlayerId,
        reply: oneshot::Sender<bool>,
    },
    Mark {
        player_id: PlayerId,
        index: usize,
        marked: bool,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Snapshot {
        player_id: Option<PlayerId>,
        reply: oneshot::Sender<RoomSnapshot>,
    },
    GetInfo {
        reply: oneshot::Sender<RoomInfo>,
    },
    Shutdown,
}

/// Result of a leave request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// `false` if the player was not in the room (leave is idempotent).
    pub was_member: bool,
    /// Players left after the removal. At zero the actor has shut down.
    pub remaining: usize,
}

/// A snapshot of room metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub code: RoomCode,
    pub status: RoomStatus,
    pub host: PlayerId,
    pub player_count: usize,
    pub max_players: usize,
}

/// Handle to a running room actor.
///
/// Cheap to clone. Every method fails with [`RoomError::Unavailable`] once
/// the actor has exited.
#[derive(Clone)]
pub struct RoomHandle {
    code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// The room's code.
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// `true` once the actor has exited.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// `true` if both handles reach the same actor. A reused code does not
    /// make two rooms the same.
    pub fn same_room(&self, other: &RoomHandle) -> bool {
        self.sender.same_channel(&other.sender)
    }

    /// Adds a player; `sender` receives every room broadcast from now on.
    pub async fn join(
        &self,
        player_id: PlayerId,
        name: String,
        sender: PlayerSender,
    ) -> Result<PlayerView, RoomError> {
        self.request(|reply| RoomCommand::Join {
            player_id,
            name,
            sender,
            reply,
        })
        .await?
    }

    /// Removes a player. Idempotent.
    pub async fn leave(&self, player_id: PlayerId) -> Result<LeaveOutcome, RoomError> {
        self.request(|reply| RoomCommand::Leave { player_id, reply })
            .await
    }

    /// Starts a game. `Ok(false)` means one was already running.
    pub async fn start(
        &self,
        player_id: PlayerId,
        difficulty: Difficulty,
    ) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::Start {
            player_id,
            difficulty,
            reply,
        })
        .await?
    }

    /// Host only: ends the running game.
    pub async fn end_game(&self, player_id: PlayerId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::EndGame { player_id, reply })
            .await?
    }

    /// Checks a win claim; a valid one ends the game.
    pub async fn claim_win(&self, player_id: PlayerId) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::ClaimWin { player_id, reply })
            .await?
    }

    /// Checks a board against the drawn cards without side effects.
    pub async fn validate_win(&self, player_id: PlayerId) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::ValidateWin { player_id, reply })
            .await
    }

    pub async fn mark(
        &self,
        player_id: PlayerId,
        index: usize,
        marked: bool,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Mark {
            player_id,
            index,
            marked,
            reply,
        })
        .await?
    }

    /// Current room state, including `player_id`'s board when given.
    pub async fn snapshot(&self, player_id: Option<PlayerId>) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Snapshot { player_id, reply })
            .await
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomCommand::GetInfo { reply }).await
    }

    /// Tells the room to shut down without waiting for it.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }
}

/// What woke the actor up.
enum Step {
    Command(Option<RoomCommand>),
    Timer(TimerEvent),
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    game: Game,
    config: RoomConfig,
    /// Per-player event channels.
    senders: HashMap<PlayerId, PlayerSender>,
    scheduler: DrawScheduler,
    rng: StdRng,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    /// Runs the actor loop until shutdown, until the room empties, or until
    /// every handle is dropped.
    async fn run(mut self) {
        tracing::info!(room = %self.game.code(), host = %self.game.host(), "room actor started");

        loop {
            let step = tokio::select! {
                cmd = self.receiver.recv() => Step::Command(cmd),
                event = self.scheduler.wait() => Step::Timer(event),
            };

            let flow = match step {
                Step::Command(Some(cmd)) => self.handle_command(cmd),
                Step::Command(None) => ControlFlow::Break(()),
                Step::Timer(event) => {
                    self.handle_timer(event);
                    ControlFlow::Continue(())
                }
            };
            if flow.is_break() {
                break;
            }
        }

        self.scheduler.cancel();
        self.game.stop();
        tracing::info!(room = %self.game.code(), "room actor stopped");
    }

    fn handle_command(&mut self, cmd: RoomCommand) -> ControlFlow<()> {
        match cmd {
            RoomCommand::Join {
                player_id,
                name,
                sender,
                reply,
            } => {
                let result = self.handle_join(player_id, name, sender);
                let _ = reply.send(result);
            }
            RoomCommand::Leave { player_id, reply } => {
                let outcome = self.handle_leave(player_id);
                let _ = reply.send(outcome);
                if outcome.remaining == 0 {
                    tracing::info!(room = %self.game.code(), "room empty, closing");
                    return ControlFlow::Break(());
                }
            }
            RoomCommand::Start {
                player_id,
                difficulty,
                reply,
            } => {
                let result = self.handle_start(player_id, difficulty);
                let _ = reply.send(result);
            }
            RoomCommand::EndGame { player_id, reply } => {
                let result = self.handle_end_game(player_id);
                let _ = reply.send(result);
            }
            RoomCommand::ClaimWin { player_id, reply } => {
                let result = self.handle_claim_win(player_id);
                let _ = reply.send(result);
            }
            RoomCommand::ValidateWin { player_id, reply } => {
                let _ = reply.send(self.game.validate_win(player_id));
            }
            RoomCommand::Mark {
                player_id,
                index,
                marked,
                reply,
            } => {
                let _ = reply.send(self.game.mark(player_id, index, marked));
            }
            RoomCommand::Snapshot { player_id, reply } => {
                let _ = reply.send(self.game.snapshot(player_id));
            }
            RoomCommand::GetInfo { reply } => {
                let _ = reply.send(self.info());
            }
            RoomCommand::Shutdown => {
                tracing::info!(room = %self.game.code(), "room shutting down");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_join(
        &mut self,
        player_id: PlayerId,
        name: String,
        sender: PlayerSender,
    ) -> Result<PlayerView, RoomError> {
        let view = self.game.join(player_id, name, &mut self.rng)?;
        self.senders.insert(player_id, sender);
        tracing::info!(
            room = %self.game.code(),
            %player_id,
            players = self.game.player_count(),
            "player joined"
        );
        self.broadcast_roster();
        Ok(view)
    }

    fn handle_leave(&mut self, player_id: PlayerId) -> LeaveOutcome {
        let host_before = self.game.host();
        let was_member = self.game.leave(player_id);
        self.senders.remove(&player_id);

        if was_member {
            tracing::info!(
                room = %self.game.code(),
                %player_id,
                players = self.game.player_count(),
                "player left"
            );
        }

        if self.game.is_empty() {
            // Game::leave already ended the game; the timer goes with it.
            self.scheduler.cancel();
        } else if was_member {
            if self.game.host() != host_before {
                tracing::info!(room = %self.game.code(), host = %self.game.host(), "host handed off");
            }
            self.broadcast_roster();
        }

        LeaveOutcome {
            was_member,
            remaining: self.game.player_count(),
        }
    }

    fn handle_start(&mut self, player_id: PlayerId, difficulty: Difficulty) -> Result<bool, RoomError> {
        if self.game.player(player_id).is_none() {
            return Err(RoomError::PlayerNotFound(player_id, self.game.code().clone()));
        }
        if !self.game.start(&mut self.rng) {
            tracing::debug!(room = %self.game.code(), %player_id, "start ignored, game already running");
            return Ok(false);
        }

        let timings = self.config.timings(difficulty);
        self.scheduler.arm(timings);
        tracing::info!(
            room = %self.game.code(),
            %player_id,
            %difficulty,
            interval_ms = timings.interval.as_millis(),
            players = self.game.player_count(),
            "game started"
        );
        self.broadcast(ServerEvent::GameStarted {
            deck_size: self.game.deck().len(),
        });
        Ok(true)
    }

    fn handle_end_game(&mut self, player_id: PlayerId) -> Result<(), RoomError> {
        self.game.ensure_host(player_id)?;
        if self.game.status() != RoomStatus::Playing {
            return Err(RoomError::GameNotInProgress(self.game.code().clone()));
        }
        self.finish(None, REASON_ENDED_BY_HOST);
        Ok(())
    }

    fn handle_claim_win(&mut self, player_id: PlayerId) -> Result<bool, RoomError> {
        let valid = self.game.claim_win(player_id)?;
        if valid {
            self.finish(Some(player_id), REASON_WIN);
        } else {
            tracing::info!(
                room = %self.game.code(),
                %player_id,
                drawn = self.game.drawn_cards().len(),
                "win claim rejected"
            );
        }
        Ok(valid)
    }

    fn handle_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::Draw { tick } => {
                let Some(draw) = self.game.draw_next_card() else {
                    tracing::debug!(room = %self.game.code(), tick, "stray draw tick ignored");
                    self.scheduler.cancel();
                    return;
                };
                tracing::debug!(
                    room = %self.game.code(),
                    tick,
                    card = draw.card.id,
                    index = draw.index,
                    "card drawn"
                );
                self.broadcast(ServerEvent::CardDrawn(draw.card));

                if draw.is_last {
                    // Same turn as the final draw: no further tick can fire.
                    self.scheduler.begin_grace();
                    tracing::info!(room = %self.game.code(), "last card drawn, grace period started");
                }
            }
            TimerEvent::GraceElapsed => {
                if self.game.status() == RoomStatus::Playing {
                    self.finish(None, REASON_DECK_EXHAUSTED);
                }
            }
        }
    }

    /// Ends the game: timer first, then status, then the broadcast.
    fn finish(&mut self, winner: Option<PlayerId>, reason: &str) {
        self.scheduler.cancel();
        self.game.stop();
        tracing::info!(
            room = %self.game.code(),
            winner = ?winner,
            reason,
            drawn = self.game.drawn_cards().len(),
            "game over"
        );
        self.broadcast(ServerEvent::GameOver {
            winner,
            reason: reason.to_owned(),
        });
    }

    fn broadcast_roster(&self) {
        self.broadcast(ServerEvent::PlayersUpdated {
            host: self.game.host(),
            players: self.game.roster(),
        });
    }

    /// Sends `event` to every member. Closed receivers are skipped; their
    /// connection's leave arrives separately.
    fn broadcast(&self, event: ServerEvent) {
        for (player_id, sender) in &self.senders {
            if sender.send(event.clone()).is_err() {
                tracing::debug!(room = %self.game.code(), %player_id, "receiver gone, event dropped");
            }
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            code: self.game.code().clone(),
            status: self.game.status(),
            host: self.game.host(),
            player_count: self.game.player_count(),
            max_players: self.game.max_players(),
        }
    }
}

/// Spawns a new room actor task and returns a handle to communicate with it.
///
/// The room starts empty; `host` is expected to join first.
pub(crate) fn spawn_room(code: RoomCode, host: PlayerId, config: RoomConfig) -> RoomHandle {
    let (tx, rx) = mpsc::channel(config.command_buffer);
    let rng = match config.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let actor = RoomActor {
        game: Game::new(code.clone(), host, config.max_players),
        config,
        senders: HashMap::new(),
        scheduler: DrawScheduler::new(),
        rng,
        receiver: rx,
    };

    tokio::spawn(actor.run());

    RoomHandle { code, sender: tx }
}
