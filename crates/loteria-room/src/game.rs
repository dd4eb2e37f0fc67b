//! The room state machine, free of channels and timers.
//!
//! [`Game`] holds everything a room knows: players and their boards, the
//! deck, how far into it the draw has gone, and the lifecycle status. It
//! never blocks and never spawns; the room actor owns one and decides
//! when to call each method. Every method checks its preconditions before
//! touching any field, so a rejected call leaves the game unchanged.

use std::collections::{BTreeSet, HashMap, HashSet};

use loteria_protocol::{
    Card, PlayerId, PlayerSummary, PlayerView, RoomCode, RoomSnapshot, RoomStatus,
};
use rand::Rng;

use crate::{BOARD_SIZE, Board, RoomError, shuffled_deck};

/// `gameOver` reason when the grace period after the last card elapses.
pub const REASON_DECK_EXHAUSTED: &str = "Deck exhausted";
/// `gameOver` reason for a validated win claim.
pub const REASON_WIN: &str = "Lotería";
/// `gameOver` reason when the host ends the game.
pub const REASON_ENDED_BY_HOST: &str = "Ended by host";

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// A member of a room.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub board: Board,
    /// Board indices the client reports as marked. Advisory: win checks
    /// only look at the server's drawn cards.
    pub marked: BTreeSet<usize>,
}

impl Player {
    /// The player's own view, board included.
    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id,
            name: self.name.clone(),
            board: self.board.cards().to_vec(),
        }
    }

    /// The view other players get.
    pub fn summary(&self) -> PlayerSummary {
        PlayerSummary {
            id: self.id,
            name: self.name.clone(),
            marked: self.marked.len(),
        }
    }
}

/// One revealed card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draw {
    pub card: Card,
    /// Position of the card in the deck, `0..28`.
    pub index: usize,
    /// `true` for the deck's final card.
    pub is_last: bool,
}

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

/// State of one room.
///
/// Invariants:
/// - at most `max_players` players;
/// - `Waiting` ⇒ empty deck and no card drawn;
/// - `Playing` ⇒ the deck is a permutation of the catalog;
/// - `drawn_cards() == deck()[..=current_card_index()]`.
#[derive(Debug)]
pub struct Game {
    code: RoomCode,
    host: PlayerId,
    max_players: usize,
    players: HashMap<PlayerId, Player>,
    deck: Vec<Card>,
    drawn: Vec<Card>,
    /// Index of the last drawn card; `None` before the first draw.
    current_card_index: Option<usize>,
    status: RoomStatus,
}

impl Game {
    /// A waiting room with no players yet.
    pub fn new(code: RoomCode, host: PlayerId, max_players: usize) -> Self {
        Self {
            code,
            host,
            max_players,
            players: HashMap::new(),
            deck: Vec::new(),
            drawn: Vec::new(),
            current_card_index: None,
            status: RoomStatus::Waiting,
        }
    }

    /// Adds a player and deals them a board.
    ///
    /// # Errors
    /// - [`RoomError::RoomFull`] when the room is at capacity
    /// - [`RoomError::GameAlreadyStarted`] once a game has started
    /// - [`RoomError::AlreadyInRoom`] when `player_id` is already a member
    pub fn join<R: Rng + ?Sized>(
        &mut self,
        player_id: PlayerId,
        name: String,
        rng: &mut R,
    ) -> Result<PlayerView, RoomError> {
        if self.players.len() >= self.max_players {
            return Err(RoomError::RoomFull(self.code.clone(), self.max_players));
        }
        if !self.status.is_joinable() {
            return Err(RoomError::GameAlreadyStarted(self.code.clone()));
        }
        if self.players.contains_key(&player_id) {
            return Err(RoomError::AlreadyInRoom(player_id, self.code.clone()));
        }

        let player = Player {
            id: player_id,
            name,
            board: Board::random(rng),
            marked: BTreeSet::new(),
        };
        let view = player.view();
        self.players.insert(player_id, player);
        Ok(view)
    }

    /// Removes a player. Returns `false` if they were not a member.
    ///
    /// When the host leaves, the remaining player with the lowest id takes
    /// over. When nobody is left the game is forced to `Ended`.
    pub fn leave(&mut self, player_id: PlayerId) -> bool {
        let removed = self.players.remove(&player_id).is_some();
        if removed && player_id == self.host {
            if let Some(next) = self.players.keys().min().copied() {
                self.host = next;
            }
        }
        if self.players.is_empty() {
            self.stop();
        }
        removed
    }

    /// Shuffles a new deck and enters `Playing`.
    ///
    /// Returns `false` (and changes nothing) if a game is already running,
    /// so redundant start requests are harmless. Starting from `Ended`
    /// begins a rematch: drawn cards and marks are cleared, boards are kept.
    pub fn start<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if !self.status.can_transition_to(RoomStatus::Playing) {
            return false;
        }
        self.status = RoomStatus::Playing;
        self.deck = shuffled_deck(rng);
        self.drawn.clear();
        self.current_card_index = None;
        for player in self.players.values_mut() {
            player.marked.clear();
        }
        true
    }

    /// Reveals the next card of the deck.
    ///
    /// Returns `None` when no game is running or the deck is exhausted, so
    /// a stray tick is harmless.
    pub fn draw_next_card(&mut self) -> Option<Draw> {
        if self.status != RoomStatus::Playing {
            return None;
        }
        let index = self.current_card_index.map_or(0, |i| i + 1);
        let card = self.deck.get(index)?.clone();

        self.current_card_index = Some(index);
        self.drawn.push(card.clone());
        Some(Draw {
            card,
            index,
            is_last: index + 1 == self.deck.len(),
        })
    }

    /// Ends the game. Idempotent.
    pub fn stop(&mut self) {
        self.status = RoomStatus::Ended;
    }

    /// `true` iff every card on the player's board has been drawn.
    ///
    /// Marks are deliberately ignored: a client cannot win by marking
    /// cards the server never revealed. Unknown players never win.
    pub fn validate_win(&self, player_id: PlayerId) -> bool {
        let Some(player) = self.players.get(&player_id) else {
            return false;
        };
        let drawn: HashSet<u8> = self.drawn.iter().map(|c| c.id).collect();
        player.board.is_covered_by(&drawn)
    }

    /// Checks a "¡Lotería!" claim. Does not end the game by itself.
    ///
    /// # Errors
    /// - [`RoomError::GameNotInProgress`] unless `Playing`; this is what a
    ///   second claim gets after the first one won
    /// - [`RoomError::PlayerNotFound`] for non-members
    pub fn claim_win(&self, player_id: PlayerId) -> Result<bool, RoomError> {
        if self.status != RoomStatus::Playing {
            return Err(RoomError::GameNotInProgress(self.code.clone()));
        }
        if !self.players.contains_key(&player_id) {
            return Err(RoomError::PlayerNotFound(player_id, self.code.clone()));
        }
        Ok(self.validate_win(player_id))
    }

    /// Fails unless `player_id` is a member and the host.
    pub fn ensure_host(&self, player_id: PlayerId) -> Result<(), RoomError> {
        if !self.players.contains_key(&player_id) {
            return Err(RoomError::PlayerNotFound(player_id, self.code.clone()));
        }
        if self.host != player_id {
            return Err(RoomError::NotHost(player_id, self.code.clone()));
        }
        Ok(())
    }

    /// Records a client-side mark.
    pub fn mark(&mut self, player_id: PlayerId, index: usize, marked: bool) -> Result<(), RoomError> {
        if index >= BOARD_SIZE {
            return Err(RoomError::InvalidCardIndex(index));
        }
        let player = self
            .players
            .get_mut(&player_id)
            .ok_or_else(|| RoomError::PlayerNotFound(player_id, self.code.clone()))?;
        if marked {
            player.marked.insert(index);
        } else {
            player.marked.remove(&index);
        }
        Ok(())
    }

    /// Player summaries ordered by id.
    pub fn roster(&self) -> Vec<PlayerSummary> {
        let mut players: Vec<PlayerSummary> = self.players.values().map(Player::summary).collect();
        players.sort_by_key(|p| p.id);
        players
    }

    /// Full state for a client that needs to resynchronize.
    pub fn snapshot(&self, requester: Option<PlayerId>) -> RoomSnapshot {
        let me = requester.and_then(|id| self.players.get(&id));
        RoomSnapshot {
            code: self.code.clone(),
            status: self.status,
            host: self.host,
            players: self.roster(),
            drawn_cards: self.drawn.clone(),
            deck_size: self.deck.len(),
            me: me.map(Player::view),
            marked_indices: me
                .map(|p| p.marked.iter().copied().collect())
                .unwrap_or_default(),
        }
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn host(&self) -> PlayerId {
        self.host
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&Player> {
        self.players.get(&player_id)
    }

    pub fn deck(&self) -> &[Card] {
        &self.deck
    }

    pub fn drawn_cards(&self) -> &[Card] {
        &self.drawn
    }

    /// Index of the last drawn card, `None` before the first draw.
    pub fn current_card_index(&self) -> Option<usize> {
        self.current_card_index
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::DECK_SIZE;

    const HOST: PlayerId = PlayerId(1);

    fn rng() -> StdRng {
        StdRng::seed_from_u64(28)
    }

    fn new_game() -> Game {
        Game::new(RoomCode::parse("TEST01").unwrap(), HOST, 4)
    }

    fn game_with_players(n: u64, rng: &mut StdRng) -> Game {
        let mut game = new_game();
        for id in 1..=n {
            game.join(PlayerId(id), format!("player{id}"), rng).unwrap();
        }
        game
    }

    /// Draws until every card of `player`'s board is revealed.
    fn draw_until_covered(game: &mut Game, player: PlayerId) {
        while !game.validate_win(player) {
            game.draw_next_card().expect("deck covers every board");
        }
    }

    // =====================================================================
    // join
    // =====================================================================

    #[test]
    fn test_join_deals_board_with_no_marks() {
        let mut rng = rng();
        let mut game = new_game();
        let view = game.join(PlayerId(1), "Ana".into(), &mut rng).unwrap();

        assert_eq!(view.name, "Ana");
        assert_eq!(view.board.len(), BOARD_SIZE);
        let player = game.player(PlayerId(1)).unwrap();
        assert!(player.marked.is_empty());
        assert_eq!(player.board.cards(), view.board.as_slice());
    }

    #[test]
    fn test_join_full_room_fails_without_mutation() {
        let mut rng = rng();
        let mut game = game_with_players(4, &mut rng);

        let err = game.join(PlayerId(5), "Quinto".into(), &mut rng).unwrap_err();
        assert!(matches!(err, RoomError::RoomFull(_, 4)));
        assert_eq!(game.player_count(), 4);
        assert!(game.player(PlayerId(5)).is_none());
    }

    #[test]
    fn test_join_after_start_fails() {
        let mut rng = rng();
        let mut game = game_with_players(1, &mut rng);
        game.start(&mut rng);

        let err = game.join(PlayerId(2), "Beto".into(), &mut rng).unwrap_err();
        assert!(matches!(err, RoomError::GameAlreadyStarted(_)));

        game.stop();
        let err = game.join(PlayerId(2), "Beto".into(), &mut rng).unwrap_err();
        assert!(matches!(err, RoomError::GameAlreadyStarted(_)));
        assert_eq!(game.player_count(), 1);
    }

    #[test]
    fn test_join_twice_fails() {
        let mut rng = rng();
        let mut game = game_with_players(1, &mut rng);
        let board_before = game.player(PlayerId(1)).unwrap().board.clone();

        let err = game.join(PlayerId(1), "again".into(), &mut rng).unwrap_err();
        assert!(matches!(err, RoomError::AlreadyInRoom(..)));
        assert_eq!(game.player(PlayerId(1)).unwrap().board, board_before);
    }

    // =====================================================================
    // leave
    // =====================================================================

    #[test]
    fn test_leave_is_idempotent() {
        let mut rng = rng();
        let mut game = game_with_players(2, &mut rng);
        assert!(game.leave(PlayerId(2)));
        assert!(!game.leave(PlayerId(2)));
        assert_eq!(game.player_count(), 1);
        assert_eq!(game.status(), RoomStatus::Waiting);
    }

    #[test]
    fn test_last_player_leaving_ends_the_room() {
        let mut rng = rng();
        let mut game = game_with_players(1, &mut rng);
        game.start(&mut rng);
        game.draw_next_card();

        game.leave(PlayerId(1));
        assert!(game.is_empty());
        assert_eq!(game.status(), RoomStatus::Ended);
        assert!(game.draw_next_card().is_none());
    }

    #[test]
    fn test_empty_waiting_room_ends_too() {
        let mut rng = rng();
        let mut game = game_with_players(1, &mut rng);
        game.leave(PlayerId(1));
        assert_eq!(game.status(), RoomStatus::Ended);
    }

    #[test]
    fn test_host_leaving_hands_off_to_lowest_id() {
        let mut rng = rng();
        let mut game = game_with_players(3, &mut rng);
        assert_eq!(game.host(), HOST);

        game.leave(HOST);
        assert_eq!(game.host(), PlayerId(2));
    }

    // =====================================================================
    // start / draw / stop
    // =====================================================================

    #[test]
    fn test_waiting_room_has_no_deck() {
        let mut rng = rng();
        let game = game_with_players(2, &mut rng);
        assert!(game.deck().is_empty());
        assert!(game.drawn_cards().is_empty());
        assert_eq!(game.current_card_index(), None);
    }

    #[test]
    fn test_start_shuffles_full_permutation() {
        let mut rng = rng();
        let mut game = game_with_players(2, &mut rng);
        assert!(game.start(&mut rng));

        assert_eq!(game.status(), RoomStatus::Playing);
        let mut ids: Vec<u8> = game.deck().iter().map(|c| c.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=28).collect::<Vec<u8>>());
        assert_eq!(game.current_card_index(), None);
    }

    #[test]
    fn test_start_while_playing_is_noop() {
        let mut rng = rng();
        let mut game = game_with_players(1, &mut rng);
        game.start(&mut rng);
        game.draw_next_card();
        let deck = game.deck().to_vec();

        assert!(!game.start(&mut rng));
        assert_eq!(game.deck(), deck.as_slice());
        assert_eq!(game.current_card_index(), Some(0));
    }

    #[test]
    fn test_draws_walk_the_deck_once() {
        let mut rng = rng();
        let mut game = game_with_players(1, &mut rng);
        game.start(&mut rng);

        for expected in 0..DECK_SIZE {
            let draw = game.draw_next_card().unwrap();
            assert_eq!(draw.index, expected);
            assert_eq!(draw.is_last, expected == DECK_SIZE - 1);
            assert_eq!(game.current_card_index(), Some(expected));
            assert_eq!(game.drawn_cards(), &game.deck()[..=expected]);
        }

        assert!(game.draw_next_card().is_none(), "29th draw must be refused");
        assert_eq!(game.current_card_index(), Some(DECK_SIZE - 1));
        assert_eq!(game.drawn_cards().len(), DECK_SIZE);
    }

    #[test]
    fn test_no_draws_before_start_or_after_stop() {
        let mut rng = rng();
        let mut game = game_with_players(1, &mut rng);
        assert!(game.draw_next_card().is_none());

        game.start(&mut rng);
        game.draw_next_card();
        game.stop();
        game.stop();
        assert_eq!(game.status(), RoomStatus::Ended);
        assert!(game.draw_next_card().is_none());
        assert_eq!(game.drawn_cards().len(), 1);
    }

    #[test]
    fn test_restart_after_end_resets_round() {
        let mut rng = rng();
        let mut game = game_with_players(1, &mut rng);
        game.start(&mut rng);
        game.draw_next_card();
        game.mark(PlayerId(1), 3, true).unwrap();
        game.stop();

        assert!(game.start(&mut rng));
        assert_eq!(game.status(), RoomStatus::Playing);
        assert!(game.drawn_cards().is_empty());
        assert_eq!(game.current_card_index(), None);
        assert!(game.player(PlayerId(1)).unwrap().marked.is_empty());
    }

    // =====================================================================
    // win validation
    // =====================================================================

    #[test]
    fn test_marks_alone_never_win() {
        let mut rng = rng();
        let mut game = game_with_players(1, &mut rng);
        game.start(&mut rng);
        for index in 0..BOARD_SIZE {
            game.mark(PlayerId(1), index, true).unwrap();
        }

        assert!(!game.validate_win(PlayerId(1)));
        assert_eq!(game.claim_win(PlayerId(1)), Ok(false));
    }

    #[test]
    fn test_win_once_every_board_card_is_drawn() {
        let mut rng = rng();
        let mut game = game_with_players(2, &mut rng);
        game.start(&mut rng);

        draw_until_covered(&mut game, PlayerId(1));
        assert!(game.validate_win(PlayerId(1)));
        assert_eq!(game.claim_win(PlayerId(1)), Ok(true));
        // Claim checks do not end the game by themselves.
        assert_eq!(game.status(), RoomStatus::Playing);
    }

    #[test]
    fn test_win_requires_every_card() {
        let mut rng = rng();
        let mut game = game_with_players(1, &mut rng);
        game.start(&mut rng);
        draw_until_covered(&mut game, PlayerId(1));

        // The card that completed the board was the last one drawn; without
        // it the board is not covered.
        let last = game.drawn.pop().unwrap();
        assert!(game.player(PlayerId(1)).unwrap().board.ids().any(|id| id == last.id));
        assert!(!game.validate_win(PlayerId(1)));
    }

    #[test]
    fn test_unknown_player_never_wins() {
        let mut rng = rng();
        let mut game = game_with_players(1, &mut rng);
        game.start(&mut rng);
        while game.draw_next_card().is_some() {}

        assert!(!game.validate_win(PlayerId(99)));
        assert!(matches!(
            game.claim_win(PlayerId(99)),
            Err(RoomError::PlayerNotFound(..))
        ));
    }

    #[test]
    fn test_claim_outside_a_game_is_rejected() {
        let mut rng = rng();
        let mut game = game_with_players(1, &mut rng);
        assert!(matches!(
            game.claim_win(PlayerId(1)),
            Err(RoomError::GameNotInProgress(_))
        ));

        game.start(&mut rng);
        game.stop();
        assert!(matches!(
            game.claim_win(PlayerId(1)),
            Err(RoomError::GameNotInProgress(_))
        ));
    }

    // =====================================================================
    // host, marks, snapshot
    // =====================================================================

    #[test]
    fn test_ensure_host() {
        let mut rng = rng();
        let game = game_with_players(2, &mut rng);
        assert!(game.ensure_host(HOST).is_ok());
        assert!(matches!(game.ensure_host(PlayerId(2)), Err(RoomError::NotHost(..))));
        assert!(matches!(
            game.ensure_host(PlayerId(9)),
            Err(RoomError::PlayerNotFound(..))
        ));
    }

    #[test]
    fn test_mark_and_unmark() {
        let mut rng = rng();
        let mut game = game_with_players(1, &mut rng);
        game.mark(PlayerId(1), 0, true).unwrap();
        game.mark(PlayerId(1), 15, true).unwrap();
        game.mark(PlayerId(1), 0, false).unwrap();

        let marked: Vec<usize> = game.player(PlayerId(1)).unwrap().marked.iter().copied().collect();
        assert_eq!(marked, vec![15]);
        assert_eq!(game.mark(PlayerId(1), 16, true), Err(RoomError::InvalidCardIndex(16)));
        assert!(matches!(
            game.mark(PlayerId(7), 1, true),
            Err(RoomError::PlayerNotFound(..))
        ));
    }

    #[test]
    fn test_snapshot_for_member() {
        let mut rng = rng();
        let mut game = game_with_players(2, &mut rng);
        game.start(&mut rng);
        game.draw_next_card();
        game.draw_next_card();
        game.mark(PlayerId(2), 4, true).unwrap();

        let snap = game.snapshot(Some(PlayerId(2)));
        assert_eq!(snap.status, RoomStatus::Playing);
        assert_eq!(snap.host, HOST);
        assert_eq!(snap.deck_size, DECK_SIZE);
        assert_eq!(snap.drawn_cards, game.drawn_cards());
        assert_eq!(snap.players.len(), 2);
        assert_eq!(snap.players[0].id, PlayerId(1));
        assert_eq!(snap.players[1].marked, 1);
        assert_eq!(snap.me.map(|me| me.id), Some(PlayerId(2)));
        assert_eq!(snap.marked_indices, vec![4]);

        let outsider = game.snapshot(None);
        assert!(outsider.me.is_none());
        assert!(outsider.marked_indices.is_empty());
    }
}
