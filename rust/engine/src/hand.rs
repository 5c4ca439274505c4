use serde::{Deserialize, Serialize};

use crate::cards::{Card, Suit};
use crate::errors::GameError;

/// Hand category, ascending by strength.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Category {
    HighCard = 0,
    OnePair = 1,
    TwoPair = 2,
    ThreeOfAKind = 3,
    Straight = 4,
    Flush = 5,
    FullHouse = 6,
    FourOfAKind = 7,
    StraightFlush = 8,
}

/// Total-order-comparable strength of a best five-card hand. Ordering is
/// lexicographic: category first, then the kicker vector high to low.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct HandStrength {
    pub category: Category,
    // tiebreakers, high -> low; unused slots are zero
    pub kickers: [u8; 5],
}

/// Evaluates the best five-card hand available in `cards`.
///
/// Accepts 5 to 7 cards (2 hole cards plus 3–5 community cards). Ace
/// plays high everywhere except the A-2-3-4-5 wheel, where the straight
/// high card is the five.
///
/// # Errors
///
/// Returns [`GameError::InsufficientCards`] when fewer than five cards
/// are supplied.
///
/// # Examples
///
/// ```
/// use felt_engine::cards::{Card, Rank, Suit};
/// use felt_engine::hand::{evaluate_hand, Category};
///
/// let cards = [
///     Card { suit: Suit::Hearts, rank: Rank::Ace },
///     Card { suit: Suit::Hearts, rank: Rank::King },
///     Card { suit: Suit::Hearts, rank: Rank::Queen },
///     Card { suit: Suit::Hearts, rank: Rank::Jack },
///     Card { suit: Suit::Hearts, rank: Rank::Ten },
///     Card { suit: Suit::Clubs, rank: Rank::Two },
///     Card { suit: Suit::Diamonds, rank: Rank::Three },
/// ];
/// let strength = evaluate_hand(&cards).unwrap();
/// assert_eq!(strength.category, Category::StraightFlush);
/// assert_eq!(strength.kickers[0], 14);
/// ```
pub fn evaluate_hand(cards: &[Card]) -> Result<HandStrength, GameError> {
    if cards.len() < 5 {
        return Err(GameError::InsufficientCards {
            have: cards.len(),
            need: 5,
        });
    }

    let mut rank_counts = [0u8; 15]; // indices 2..=14
    let mut by_suit: [Vec<u8>; 4] = [vec![], vec![], vec![], vec![]];
    for &c in cards {
        let r = c.rank.value();
        rank_counts[r as usize] += 1;
        by_suit[suit_index(c.suit)].push(r);
    }

    let flush_suit = by_suit.iter().position(|v| v.len() >= 5);

    // Straight flush
    if let Some(s) = flush_suit {
        let mut suited = by_suit[s].clone();
        suited.sort_unstable();
        suited.dedup();
        if let Some(high) = straight_high(&suited) {
            return Ok(HandStrength {
                category: Category::StraightFlush,
                kickers: [high, 0, 0, 0, 0],
            });
        }
    }

    // Four of a kind
    if let Some(quad) = highest_with_count(&rank_counts, 4) {
        let kicker = (2..=14u8)
            .rev()
            .find(|&r| r != quad && rank_counts[r as usize] > 0)
            .unwrap_or(0);
        return Ok(HandStrength {
            category: Category::FourOfAKind,
            kickers: [quad, kicker, 0, 0, 0],
        });
    }

    // Full house: best trips plus best remaining pair (or second trips)
    let trips: Vec<u8> = ranks_with_count_at_least(&rank_counts, 3);
    let pairs: Vec<u8> = ranks_with_exact_count(&rank_counts, 2);
    if let Some(&t) = trips.first() {
        let pair_part = trips
            .get(1)
            .copied()
            .into_iter()
            .chain(pairs.first().copied())
            .max();
        if let Some(p) = pair_part {
            return Ok(HandStrength {
                category: Category::FullHouse,
                kickers: [t, p, 0, 0, 0],
            });
        }
    }

    // Flush
    if let Some(s) = flush_suit {
        let mut suited = by_suit[s].clone();
        suited.sort_unstable_by(|a, b| b.cmp(a));
        let mut kickers = [0u8; 5];
        kickers.copy_from_slice(&suited[..5]);
        return Ok(HandStrength {
            category: Category::Flush,
            kickers,
        });
    }

    // Straight
    let mut unique: Vec<u8> = (2..=14u8)
        .filter(|&r| rank_counts[r as usize] > 0)
        .collect();
    unique.sort_unstable();
    if let Some(high) = straight_high(&unique) {
        return Ok(HandStrength {
            category: Category::Straight,
            kickers: [high, 0, 0, 0, 0],
        });
    }

    let singles: Vec<u8> = ranks_with_exact_count(&rank_counts, 1);

    // Three of a kind
    if let Some(&t) = trips.first() {
        let mut kickers = [t, 0, 0, 0, 0];
        for (slot, r) in kickers[1..3].iter_mut().zip(singles.iter()) {
            *slot = *r;
        }
        return Ok(HandStrength {
            category: Category::ThreeOfAKind,
            kickers,
        });
    }

    // Two pair
    if pairs.len() >= 2 {
        let kicker = pairs
            .get(2)
            .copied()
            .into_iter()
            .chain(singles.first().copied())
            .max()
            .unwrap_or(0);
        return Ok(HandStrength {
            category: Category::TwoPair,
            kickers: [pairs[0], pairs[1], kicker, 0, 0],
        });
    }

    // One pair
    if let Some(&p) = pairs.first() {
        let mut kickers = [p, 0, 0, 0, 0];
        for (slot, r) in kickers[1..4].iter_mut().zip(singles.iter()) {
            *slot = *r;
        }
        return Ok(HandStrength {
            category: Category::OnePair,
            kickers,
        });
    }

    // High card
    let mut kickers = [0u8; 5];
    for (slot, r) in kickers.iter_mut().zip(singles.iter()) {
        *slot = *r;
    }
    Ok(HandStrength {
        category: Category::HighCard,
        kickers,
    })
}

fn suit_index(s: Suit) -> usize {
    match s {
        Suit::Clubs => 0,
        Suit::Diamonds => 1,
        Suit::Hearts => 2,
        Suit::Spades => 3,
    }
}

fn highest_with_count(rank_counts: &[u8; 15], count: u8) -> Option<u8> {
    (2..=14u8).rev().find(|&r| rank_counts[r as usize] == count)
}

/// Ranks with at least `count` copies, high to low.
fn ranks_with_count_at_least(rank_counts: &[u8; 15], count: u8) -> Vec<u8> {
    (2..=14u8)
        .rev()
        .filter(|&r| rank_counts[r as usize] >= count)
        .collect()
}

/// Ranks with exactly `count` copies, high to low.
fn ranks_with_exact_count(rank_counts: &[u8; 15], count: u8) -> Vec<u8> {
    (2..=14u8)
        .rev()
        .filter(|&r| rank_counts[r as usize] == count)
        .collect()
}

/// Highest straight top card in an ascending deduplicated rank list.
/// An Ace doubles as a one for the wheel.
fn straight_high(sorted_unique: &[u8]) -> Option<u8> {
    let mut ranks = sorted_unique.to_vec();
    if ranks.binary_search(&14).is_ok() {
        ranks.insert(0, 1);
    }

    let mut run = 1usize;
    let mut best = None;
    for i in 1..ranks.len() {
        if ranks[i] == ranks[i - 1] + 1 {
            run += 1;
            if run >= 5 {
                best = Some(ranks[i]);
            }
        } else {
            run = 1;
        }
    }
    best
}
