use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::cards::{full_deck, Card};

/// An ordered 52-card deck with a seeded RNG. The same seed produces the
/// same shuffle sequence, which keeps hands reproducible in tests.
#[derive(Debug)]
pub struct Deck {
    cards: Vec<Card>,
    position: usize,
    rng: ChaCha20Rng,
}

impl Deck {
    pub fn new_with_seed(seed: u64) -> Self {
        Self {
            cards: full_deck(),
            position: 0,
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    /// Restore the full 52 cards and shuffle them. Called once per hand.
    pub fn shuffle(&mut self) {
        self.cards = full_deck();
        self.cards.shuffle(&mut self.rng);
        self.position = 0;
    }

    pub fn deal_card(&mut self) -> Option<Card> {
        let c = self.cards.get(self.position).copied();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    /// Discard the top card face down before dealing a street.
    pub fn burn_card(&mut self) {
        let _ = self.deal_card();
    }

    pub fn remaining(&self) -> usize {
        self.cards.len().saturating_sub(self.position)
    }
}
