use crate::cards::Card;
use serde::{Deserialize, Serialize};

/// Stable identity of an agent across connections and matches.
pub type PlayerId = String;

/// A player action during a betting round. `Bet` and `Raise` carry the
/// round total the seat is wagering to, not the increment.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum PlayerAction {
    /// Fold and forfeit the hand
    Fold,
    /// Check (only valid when there is nothing to call)
    Check,
    /// Call the current bet
    Call,
    /// Open the betting for the given round total
    Bet(u32),
    /// Raise the current bet to the given round total
    Raise(u32),
    /// Wager the entire remaining stack
    AllIn,
}

impl PlayerAction {
    /// Short wire name used in statistics and event payloads.
    pub fn kind_name(&self) -> &'static str {
        match self {
            PlayerAction::Fold => "fold",
            PlayerAction::Check => "check",
            PlayerAction::Call => "call",
            PlayerAction::Bet(_) => "bet",
            PlayerAction::Raise(_) => "raise",
            PlayerAction::AllIn => "all_in",
        }
    }
}

/// A seat at a table: one player's chips, cards and betting flags for the
/// current hand. Seats keep their position in the table's seat list for
/// the whole lifetime of the player at the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub player_id: PlayerId,
    pub name: String,
    /// Uncommitted chips behind
    pub stack: u32,
    /// Chips committed on the current street
    pub round_wager: u32,
    /// Chips committed across the whole hand
    pub hand_wager: u32,
    pub hole: [Option<Card>; 2],
    /// Dealt into the current hand
    pub in_hand: bool,
    pub folded: bool,
    pub all_in: bool,
    pub has_acted: bool,
    /// Asked to leave mid-hand; the seat is dropped once the hand ends
    pub departed: bool,
}

impl Seat {
    pub fn new(player_id: PlayerId, name: String, stack: u32) -> Self {
        Self {
            player_id,
            name,
            stack,
            round_wager: 0,
            hand_wager: 0,
            hole: [None, None],
            in_hand: false,
            folded: false,
            all_in: false,
            has_acted: false,
            departed: false,
        }
    }

    /// Move chips from the stack into the current round's wager. Amounts
    /// beyond the stack are clamped; emptying the stack marks all-in.
    pub fn commit(&mut self, amount: u32) -> u32 {
        let paid = amount.min(self.stack);
        self.stack -= paid;
        self.round_wager += paid;
        self.hand_wager += paid;
        if self.stack == 0 && paid > 0 {
            self.all_in = true;
        }
        paid
    }

    pub fn give_card(&mut self, card: Card) {
        if self.hole[0].is_none() {
            self.hole[0] = Some(card);
        } else if self.hole[1].is_none() {
            self.hole[1] = Some(card);
        }
    }

    pub fn hole_cards(&self) -> Option<[Card; 2]> {
        match self.hole {
            [Some(a), Some(b)] => Some([a, b]),
            _ => None,
        }
    }

    /// True when the seat may still be asked to act this round.
    pub fn can_act(&self) -> bool {
        self.in_hand && !self.folded && !self.all_in && !self.departed
    }

    /// True when the seat is still contesting the pot.
    pub fn contesting(&self) -> bool {
        self.in_hand && !self.folded
    }

    pub fn reset_for_hand(&mut self) {
        self.round_wager = 0;
        self.hand_wager = 0;
        self.hole = [None, None];
        self.in_hand = false;
        self.folded = false;
        self.all_in = false;
        self.has_acted = false;
    }
}
