//! Boards and decks: random draws from the catalog.

use std::collections::HashSet;

use loteria_protocol::Card;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::{BOARD_SIZE, CATALOG};

/// A player's 16-card board.
///
/// Cards are distinct and their order is fixed at creation. Order is for
/// display only; winning depends on which ids are on the board, never on
/// where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board(Vec<Card>);

impl Board {
    /// Deals a board: a uniform 16-of-28 sample without replacement.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut cards = shuffled_deck(rng);
        cards.truncate(BOARD_SIZE);
        Self(cards)
    }

    /// The cards in display order.
    pub fn cards(&self) -> &[Card] {
        &self.0
    }

    /// Iterator over the card ids.
    pub fn ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().map(|c| c.id)
    }

    /// Returns `true` if every card on the board is in `drawn`.
    pub fn is_covered_by(&self, drawn: &HashSet<u8>) -> bool {
        self.ids().all(|id| drawn.contains(&id))
    }
}

#[cfg(test)]
impl From<Vec<Card>> for Board {
    fn from(cards: Vec<Card>) -> Self {
        Self(cards)
    }
}

/// A fresh uniform permutation of the whole catalog.
pub fn shuffled_deck<R: Rng + ?Sized>(rng: &mut R) -> Vec<Card> {
    let mut cards = CATALOG.to_vec();
    cards.shuffle(rng);
    cards
}
