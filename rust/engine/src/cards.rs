use serde::{Deserialize, Serialize};

/// One of the four suits in a standard 52-card deck.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Suit {
    /// Clubs suit (♣)
    Clubs,
    /// Diamonds suit (♦)
    Diamonds,
    /// Hearts suit (♥)
    Hearts,
    /// Spades suit (♠)
    Spades,
}

/// Rank of a playing card, Two through Ace. Numeric values 2..=14 are
/// used for hand evaluation, with Ace high (14) except in the wheel.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Rank {
    /// Rank 2
    Two = 2,
    /// Rank 3
    Three,
    /// Rank 4
    Four,
    /// Rank 5
    Five,
    /// Rank 6
    Six,
    /// Rank 7
    Seven,
    /// Rank 8
    Eight,
    /// Rank 9
    Nine,
    /// Rank 10
    Ten,
    /// Jack (11)
    Jack,
    /// Queen (12)
    Queen,
    /// King (13)
    King,
    /// Ace (14)
    Ace,
}

impl Rank {
    /// Numeric evaluation value, 2..=14.
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Rank {
        match v {
            2 => Rank::Two,
            3 => Rank::Three,
            4 => Rank::Four,
            5 => Rank::Five,
            6 => Rank::Six,
            7 => Rank::Seven,
            8 => Rank::Eight,
            9 => Rank::Nine,
            10 => Rank::Ten,
            11 => Rank::Jack,
            12 => Rank::Queen,
            13 => Rank::King,
            _ => Rank::Ace,
        }
    }
}

/// A single playing card. The fundamental unit of play, held in seats'
/// hole cards, the community board, and the deck.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Card {
    /// The suit of the card
    pub suit: Suit,
    /// The rank of the card
    pub rank: Rank,
}

pub fn all_suits() -> [Suit; 4] {
    [Suit::Clubs, Suit::Diamonds, Suit::Hearts, Suit::Spades]
}

pub fn all_ranks() -> [Rank; 13] {
    [
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
    ]
}

/// All 52 cards in suit-major order.
pub fn full_deck() -> Vec<Card> {
    let mut v = Vec::with_capacity(52);
    for &s in &all_suits() {
        for &r in &all_ranks() {
            v.push(Card { suit: s, rank: r });
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn full_deck_has_52_unique_cards() {
        let deck = full_deck();
        assert_eq!(deck.len(), 52);
        let unique: HashSet<Card> = deck.into_iter().collect();
        assert_eq!(unique.len(), 52);
    }

    #[test]
    fn rank_values_span_two_through_ace() {
        assert_eq!(Rank::Two.value(), 2);
        assert_eq!(Rank::Ten.value(), 10);
        assert_eq!(Rank::Ace.value(), 14);
        assert_eq!(Rank::from_u8(11), Rank::Jack);
        assert_eq!(Rank::from_u8(14), Rank::Ace);
    }
}
