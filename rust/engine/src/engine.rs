use serde::{Deserialize, Serialize};

use crate::cards::Card;
use crate::deck::Deck;
use crate::errors::GameError;
use crate::hand::{evaluate_hand, HandStrength};
use crate::player::{PlayerAction, PlayerId, Seat};
use crate::pot::{build_pots, distribute_pots, Pot, PotAward};
use crate::rules::{possible_actions, validate_action, BetContext, PossibleAction, ValidatedAction};

/// Lifecycle phase of a table. Betting happens in the four street
/// phases; `Showdown` and `HandComplete` are terminal for a hand.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    WaitingForPlayers,
    PreFlop,
    Flop,
    Turn,
    River,
    Showdown,
    HandComplete,
}

impl Phase {
    pub fn is_betting(self) -> bool {
        matches!(self, Phase::PreFlop | Phase::Flop | Phase::Turn | Phase::River)
    }
}

/// A revealed hand at showdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowdownReveal {
    pub player_id: PlayerId,
    pub cards: [Card; 2],
    pub strength: HandStrength,
}

/// Net chip movement for one seat over a completed hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatDelta {
    pub player_id: PlayerId,
    pub net: i64,
}

/// What an action resolved to once validated and clamped. An all-in is
/// a call, bet or raise depending on what the committed chips covered;
/// consumers that care about betting pressure read this, not the
/// submitted [`PlayerAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliedAction {
    Fold,
    Check,
    Call { amount: u32 },
    Bet { to: u32 },
    Raise { to: u32 },
}

/// Everything a hand-state mutation produced, in emission order. The
/// table owner publishes and records these; the engine itself never
/// talks to the outside world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HandEvent {
    HandStarted {
        hand_number: u64,
        dealer: PlayerId,
        small_blind_seat: PlayerId,
        big_blind_seat: PlayerId,
        small_blind_posted: u32,
        big_blind_posted: u32,
    },
    HoleCardsDealt {
        player_id: PlayerId,
        cards: [Card; 2],
    },
    PhaseChanged {
        phase: Phase,
    },
    CommunityDealt {
        phase: Phase,
        cards: Vec<Card>,
    },
    ActionTaken {
        player_id: PlayerId,
        action: PlayerAction,
        applied: AppliedAction,
    },
    BetsCollected {
        pot_total: u32,
    },
    SeatEliminated {
        player_id: PlayerId,
    },
    ShowdownResolved {
        reveals: Vec<ShowdownReveal>,
        awards: Vec<PotAward>,
    },
    HandCompleted {
        winners: Vec<PlayerId>,
        deltas: Vec<SeatDelta>,
    },
}

/// One seat in a full-state snapshot. Hole cards are present whenever
/// dealt; masking for a particular viewer happens outside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatSnapshot {
    pub player_id: PlayerId,
    pub name: String,
    pub stack: u32,
    pub round_wager: u32,
    pub hand_wager: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hole: Option<[Card; 2]>,
    pub folded: bool,
    pub all_in: bool,
}

/// Immutable full projection of a table. This is the only view of the
/// mutable state the engine hands out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub phase: Phase,
    pub hand_number: u64,
    pub community: Vec<Card>,
    pub pots: Vec<Pot>,
    pub current_bet: u32,
    pub min_raise: u32,
    /// Distinguishes a showdown finish from a fold-out; hole cards are
    /// only ever revealed after a real showdown.
    pub went_to_showdown: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dealer: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_act: Option<PlayerId>,
    pub seats: Vec<SeatSnapshot>,
}

/// The per-match hand state machine: seats, deck, board, pots and the
/// betting bookkeeping for the hand in progress. All mutating
/// operations validate first and leave the state untouched on `Err`,
/// and return the [`HandEvent`]s they produced on `Ok`.
#[derive(Debug)]
pub struct GameState {
    seats: Vec<Seat>,
    deck: Deck,
    community: Vec<Card>,
    pots: Vec<Pot>,
    phase: Phase,
    dealer: usize,
    small_blind: u32,
    big_blind: u32,
    min_raise: u32,
    current_bet: u32,
    hand_number: u64,
    to_act: Option<usize>,
    // bumped every time the turn is handed to a seat, so the table
    // owner can tell a fresh turn from a lingering one even when both
    // belong to the same seat
    turn_serial: u64,
    went_to_showdown: bool,
    // chips on the table when the current hand was dealt
    hand_chip_total: u64,
}

impl GameState {
    pub fn new(small_blind: u32, big_blind: u32, seed: u64) -> Self {
        Self {
            seats: Vec::new(),
            deck: Deck::new_with_seed(seed),
            community: Vec::new(),
            pots: Vec::new(),
            phase: Phase::WaitingForPlayers,
            dealer: 0,
            small_blind,
            big_blind,
            min_raise: big_blind,
            current_bet: 0,
            hand_number: 0,
            to_act: None,
            turn_serial: 0,
            went_to_showdown: false,
            hand_chip_total: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn hand_number(&self) -> u64 {
        self.hand_number
    }

    pub fn big_blind(&self) -> u32 {
        self.big_blind
    }

    pub fn seat_count(&self) -> usize {
        self.seats.iter().filter(|s| !s.departed).count()
    }

    /// Seats that could be dealt into the next hand.
    pub fn funded_seat_count(&self) -> usize {
        self.seats
            .iter()
            .filter(|s| !s.departed && s.stack > 0)
            .count()
    }

    pub fn contains_player(&self, player_id: &str) -> bool {
        self.seats
            .iter()
            .any(|s| s.player_id == player_id && !s.departed)
    }

    pub fn player_name(&self, player_id: &str) -> Option<&str> {
        self.seats
            .iter()
            .find(|s| s.player_id == player_id)
            .map(|s| s.name.as_str())
    }

    pub fn to_act_player(&self) -> Option<&PlayerId> {
        self.to_act.map(|i| &self.seats[i].player_id)
    }

    /// Counts turn hand-offs. Two observations with the same serial are
    /// looking at the same turn; a changed serial is a new turn even if
    /// the same seat holds it again after a street boundary.
    pub fn turn_serial(&self) -> u64 {
        self.turn_serial
    }

    /// Seats a new player in the next free position. Players may join
    /// mid-hand; they sit out until the next deal.
    pub fn add_seat(
        &mut self,
        player_id: PlayerId,
        name: String,
        stack: u32,
    ) -> Result<(), GameError> {
        if self.contains_player(&player_id) {
            return Err(GameError::IllegalAction(format!(
                "player {player_id} is already seated"
            )));
        }
        self.seats.push(Seat::new(player_id, name, stack));
        Ok(())
    }

    /// Removes a player. A seat involved in a live hand folds first and
    /// is physically dropped once the hand finishes, so its wagers stay
    /// in the pot accounting.
    pub fn retire_seat(&mut self, player_id: &str) -> Result<Vec<HandEvent>, GameError> {
        let idx = self
            .seats
            .iter()
            .position(|s| s.player_id == player_id && !s.departed)
            .ok_or_else(|| GameError::UnknownPlayer(player_id.to_string()))?;

        let mut events = Vec::new();
        let in_live_hand = (self.phase.is_betting() || self.phase == Phase::Showdown)
            && self.seats[idx].in_hand;
        if in_live_hand {
            // wagers must stay in the pot accounting, so the seat is only
            // marked and physically dropped once the hand is over
            let was_contesting = self.seats[idx].contesting();
            self.seats[idx].departed = true;
            if was_contesting {
                self.seats[idx].folded = true;
                events.push(HandEvent::ActionTaken {
                    player_id: player_id.to_string(),
                    action: PlayerAction::Fold,
                    applied: AppliedAction::Fold,
                });
                if self.to_act == Some(idx) {
                    self.progress_after_action(idx, &mut events);
                } else if self.contesting_count() == 1 {
                    self.award_uncontested(&mut events);
                }
            }
        } else {
            self.drop_seat(idx);
        }
        Ok(events)
    }

    /// Deals the next hand: prunes broke and departed seats, rotates the
    /// dealer, posts blinds, deals hole cards and opens preflop betting.
    pub fn start_hand(&mut self) -> Result<Vec<HandEvent>, GameError> {
        if self.phase.is_betting() || self.phase == Phase::Showdown {
            return Err(GameError::IllegalAction("a hand is in progress".into()));
        }

        // the seats that would survive the prune; checked first so a
        // rejected start leaves the table untouched
        let dealable = self
            .seats
            .iter()
            .filter(|s| !s.departed && s.stack > 0)
            .count();
        if dealable < 2 {
            return Err(GameError::InsufficientPlayers {
                seated: dealable,
                required: 2,
            });
        }

        let mut events = Vec::new();
        self.prune_seats(&mut events);

        if self.hand_number > 0 {
            self.dealer = (self.dealer + 1) % self.seats.len();
        } else {
            self.dealer = 0;
        }
        self.hand_number += 1;

        for seat in &mut self.seats {
            seat.reset_for_hand();
            seat.in_hand = true;
        }
        self.community.clear();
        self.pots.clear();
        self.went_to_showdown = false;
        self.hand_chip_total = self.seats.iter().map(|s| u64::from(s.stack)).sum();

        let n = self.seats.len();
        let (sb, bb) = if n == 2 {
            // heads-up: the dealer posts the small blind
            (self.dealer, (self.dealer + 1) % 2)
        } else {
            ((self.dealer + 1) % n, (self.dealer + 2) % n)
        };
        let sb_posted = self.seats[sb].commit(self.small_blind);
        let bb_posted = self.seats[bb].commit(self.big_blind);
        self.current_bet = self.big_blind;
        self.min_raise = self.big_blind;

        events.push(HandEvent::HandStarted {
            hand_number: self.hand_number,
            dealer: self.seats[self.dealer].player_id.clone(),
            small_blind_seat: self.seats[sb].player_id.clone(),
            big_blind_seat: self.seats[bb].player_id.clone(),
            small_blind_posted: sb_posted,
            big_blind_posted: bb_posted,
        });

        self.deck.shuffle();
        // two clockwise passes starting left of the dealer
        for _ in 0..2 {
            for offset in 1..=n {
                let idx = (self.dealer + offset) % n;
                if let Some(card) = self.deck.deal_card() {
                    self.seats[idx].give_card(card);
                }
            }
        }
        for seat in &self.seats {
            if let Some(cards) = seat.hole_cards() {
                events.push(HandEvent::HoleCardsDealt {
                    player_id: seat.player_id.clone(),
                    cards,
                });
            }
        }

        self.phase = Phase::PreFlop;
        events.push(HandEvent::PhaseChanged {
            phase: Phase::PreFlop,
        });
        self.refresh_pots();

        match self.next_unacted_after(bb) {
            Some(first) => self.hand_turn_to(first),
            // blinds already have everyone all-in, run the board out
            None => self.finish_betting_round(&mut events),
        }

        self.check_conservation()?;
        Ok(events)
    }

    /// Applies one validated action from the seat holding the turn and
    /// advances the hand as far as it can go without further input.
    pub fn apply_action(
        &mut self,
        player_id: &str,
        action: PlayerAction,
    ) -> Result<Vec<HandEvent>, GameError> {
        if !self.phase.is_betting() {
            return Err(GameError::GameNotRunning);
        }
        let idx = self
            .seats
            .iter()
            .position(|s| s.player_id == player_id && !s.departed)
            .ok_or_else(|| GameError::UnknownPlayer(player_id.to_string()))?;
        if self.to_act != Some(idx) {
            return Err(GameError::NotYourTurn {
                actual: player_id.to_string(),
            });
        }

        let validated = validate_action(self.bet_context(idx), &action)?;

        let mut events = Vec::new();
        let applied = match validated {
            ValidatedAction::Fold => {
                self.seats[idx].folded = true;
                AppliedAction::Fold
            }
            ValidatedAction::Check => AppliedAction::Check,
            ValidatedAction::Call(pay) => {
                self.seats[idx].commit(pay);
                AppliedAction::Call { amount: pay }
            }
            ValidatedAction::Bet(total) => {
                let wagered = self.seats[idx].round_wager;
                self.seats[idx].commit(total - wagered);
                self.current_bet = self.seats[idx].round_wager;
                self.min_raise = total;
                self.reopen_betting(idx);
                AppliedAction::Bet { to: total }
            }
            ValidatedAction::Raise(to) => {
                let wagered = self.seats[idx].round_wager;
                self.seats[idx].commit(to - wagered);
                self.min_raise = to - self.current_bet;
                self.current_bet = to;
                self.reopen_betting(idx);
                AppliedAction::Raise { to }
            }
            ValidatedAction::AllIn(stack) => {
                let opening = self.current_bet == 0;
                self.seats[idx].commit(stack);
                let total = self.seats[idx].round_wager;
                if total > self.current_bet {
                    let raise_size = total - self.current_bet;
                    if raise_size >= self.min_raise {
                        self.min_raise = raise_size;
                    }
                    self.current_bet = total;
                    self.reopen_betting(idx);
                    if opening {
                        AppliedAction::Bet { to: total }
                    } else {
                        AppliedAction::Raise { to: total }
                    }
                } else {
                    // covering less than the bet: an all-in call
                    AppliedAction::Call { amount: stack }
                }
            }
        };
        self.seats[idx].has_acted = true;

        events.push(HandEvent::ActionTaken {
            player_id: player_id.to_string(),
            action,
            applied,
        });
        self.refresh_pots();
        self.progress_after_action(idx, &mut events);
        self.check_conservation()?;
        Ok(events)
    }

    /// Legal actions for the given player right now; empty unless the
    /// player holds the turn.
    pub fn possible_actions_for(&self, player_id: &str) -> Vec<PossibleAction> {
        match self.to_act {
            Some(idx) if self.seats[idx].player_id == player_id => {
                possible_actions(self.bet_context(idx))
            }
            _ => Vec::new(),
        }
    }

    /// Overwrites a seat's stack between hands. Test support for driving
    /// elimination scenarios without scripting a full showdown.
    #[doc(hidden)]
    pub fn set_stack_for_test(&mut self, player_id: &str, stack: u32) -> Result<(), GameError> {
        if self.phase.is_betting() || self.phase == Phase::Showdown {
            return Err(GameError::IllegalAction("a hand is in progress".into()));
        }
        let seat = self
            .seats
            .iter_mut()
            .find(|s| s.player_id == player_id)
            .ok_or_else(|| GameError::UnknownPlayer(player_id.to_string()))?;
        seat.stack = stack;
        Ok(())
    }

    /// Full unmasked state; per-viewer filtering happens downstream.
    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            phase: self.phase,
            hand_number: self.hand_number,
            community: self.community.clone(),
            pots: self.pots.clone(),
            current_bet: self.current_bet,
            min_raise: self.min_raise,
            went_to_showdown: self.went_to_showdown,
            dealer: self.seats.get(self.dealer).map(|s| s.player_id.clone()),
            to_act: self.to_act_player().cloned(),
            seats: self
                .seats
                .iter()
                .map(|s| SeatSnapshot {
                    player_id: s.player_id.clone(),
                    name: s.name.clone(),
                    stack: s.stack,
                    round_wager: s.round_wager,
                    hand_wager: s.hand_wager,
                    hole: s.hole_cards(),
                    folded: s.folded,
                    all_in: s.all_in,
                })
                .collect(),
        }
    }

    fn bet_context(&self, idx: usize) -> BetContext {
        let seat = &self.seats[idx];
        BetContext {
            stack: seat.stack,
            round_wager: seat.round_wager,
            current_bet: self.current_bet,
            min_raise: self.min_raise,
            big_blind: self.big_blind,
        }
    }

    fn contesting_count(&self) -> usize {
        self.seats.iter().filter(|s| s.contesting()).count()
    }

    /// A raise gives every other live seat a fresh option to act.
    fn reopen_betting(&mut self, raiser: usize) {
        for (i, seat) in self.seats.iter_mut().enumerate() {
            if i != raiser && seat.can_act() {
                seat.has_acted = false;
            }
        }
    }

    fn refresh_pots(&mut self) {
        self.pots = build_pots(&self.seats);
    }

    /// First seat after `from` (clockwise) that may still act this round.
    fn next_unacted_after(&self, from: usize) -> Option<usize> {
        let n = self.seats.len();
        (1..=n)
            .map(|offset| (from + offset) % n)
            .find(|&i| self.seats[i].can_act() && !self.seats[i].has_acted)
    }

    /// Hands the turn to a seat, marking it as a fresh turn.
    fn hand_turn_to(&mut self, idx: usize) {
        self.to_act = Some(idx);
        self.turn_serial += 1;
    }

    fn progress_after_action(&mut self, actor: usize, events: &mut Vec<HandEvent>) {
        if self.contesting_count() == 1 {
            self.award_uncontested(events);
            return;
        }
        match self.next_unacted_after(actor) {
            Some(next) => self.hand_turn_to(next),
            None => self.finish_betting_round(events),
        }
    }

    /// Closes the street: folds round wagers into the pots, then either
    /// deals the next street, runs the board out, or goes to showdown.
    fn finish_betting_round(&mut self, events: &mut Vec<HandEvent>) {
        for seat in &mut self.seats {
            seat.round_wager = 0;
            seat.has_acted = false;
        }
        self.refresh_pots();
        self.current_bet = 0;
        self.min_raise = self.big_blind;
        self.to_act = None;
        events.push(HandEvent::BetsCollected {
            pot_total: self.pots.iter().map(|p| p.amount).sum(),
        });

        if self.phase == Phase::River {
            self.showdown(events);
            return;
        }

        let able = self.seats.iter().filter(|s| s.can_act()).count();
        if able <= 1 {
            // nobody left to bet against: run the remaining streets out
            while self.phase != Phase::River {
                self.advance_street(events);
            }
            self.showdown(events);
            return;
        }

        self.advance_street(events);
        match self.next_unacted_after(self.dealer) {
            Some(first) => self.hand_turn_to(first),
            None => {
                while self.phase != Phase::River {
                    self.advance_street(events);
                }
                self.showdown(events);
            }
        }
    }

    fn advance_street(&mut self, events: &mut Vec<HandEvent>) {
        let (next, deal) = match self.phase {
            Phase::PreFlop => (Phase::Flop, 3),
            Phase::Flop => (Phase::Turn, 1),
            Phase::Turn => (Phase::River, 1),
            _ => return,
        };
        self.phase = next;
        self.deck.burn_card();
        let mut dealt = Vec::with_capacity(deal);
        for _ in 0..deal {
            if let Some(card) = self.deck.deal_card() {
                dealt.push(card);
            }
        }
        self.community.extend(&dealt);
        events.push(HandEvent::PhaseChanged { phase: next });
        events.push(HandEvent::CommunityDealt {
            phase: next,
            cards: dealt,
        });
    }

    /// Everyone else folded: the last seat standing takes the whole pot
    /// without showing cards.
    fn award_uncontested(&mut self, events: &mut Vec<HandEvent>) {
        for seat in &mut self.seats {
            seat.round_wager = 0;
            seat.has_acted = false;
        }
        self.refresh_pots();
        let total: u32 = self.pots.iter().map(|p| p.amount).sum();
        events.push(HandEvent::BetsCollected { pot_total: total });
        let winner = self
            .seats
            .iter()
            .position(|s| s.contesting())
            .expect("one contesting seat remains");
        self.seats[winner].stack += total;
        let winner_id = self.seats[winner].player_id.clone();

        self.pots.clear();
        self.current_bet = 0;
        self.to_act = None;
        self.phase = Phase::HandComplete;
        events.push(HandEvent::HandCompleted {
            winners: vec![winner_id.clone()],
            deltas: self.hand_deltas(&[(winner_id, total)]),
        });
    }

    fn showdown(&mut self, events: &mut Vec<HandEvent>) {
        self.phase = Phase::Showdown;
        self.went_to_showdown = true;
        events.push(HandEvent::PhaseChanged {
            phase: Phase::Showdown,
        });

        let mut strengths: Vec<(PlayerId, HandStrength)> = Vec::new();
        let mut reveals = Vec::new();
        for seat in &self.seats {
            if !seat.contesting() {
                continue;
            }
            let Some(cards) = seat.hole_cards() else { continue };
            let mut all = cards.to_vec();
            all.extend(&self.community);
            if let Ok(strength) = evaluate_hand(&all) {
                strengths.push((seat.player_id.clone(), strength.clone()));
                reveals.push(ShowdownReveal {
                    player_id: seat.player_id.clone(),
                    cards,
                    strength,
                });
            }
        }

        let n = self.seats.len();
        let clockwise: Vec<PlayerId> = (1..=n)
            .map(|offset| self.seats[(self.dealer + offset) % n].player_id.clone())
            .collect();
        let awards = distribute_pots(&self.pots, &strengths, &clockwise);

        let mut won: Vec<(PlayerId, u32)> = Vec::new();
        for award in &awards {
            if let Some(seat) = self
                .seats
                .iter_mut()
                .find(|s| s.player_id == award.player_id)
            {
                seat.stack += award.amount;
            }
            match won.iter_mut().find(|(id, _)| *id == award.player_id) {
                Some((_, total)) => *total += award.amount,
                None => won.push((award.player_id.clone(), award.amount)),
            }
        }

        events.push(HandEvent::ShowdownResolved { reveals, awards });

        self.pots.clear();
        self.to_act = None;
        self.phase = Phase::HandComplete;
        events.push(HandEvent::HandCompleted {
            winners: won.iter().map(|(id, _)| id.clone()).collect(),
            deltas: self.hand_deltas(&won),
        });
    }

    fn hand_deltas(&self, won: &[(PlayerId, u32)]) -> Vec<SeatDelta> {
        self.seats
            .iter()
            .filter(|s| s.in_hand)
            .map(|s| {
                let winnings = won
                    .iter()
                    .find(|(id, _)| *id == s.player_id)
                    .map(|(_, amount)| *amount)
                    .unwrap_or(0);
                SeatDelta {
                    player_id: s.player_id.clone(),
                    net: i64::from(winnings) - i64::from(s.hand_wager),
                }
            })
            .collect()
    }

    fn drop_seat(&mut self, idx: usize) {
        self.seats.remove(idx);
        if self.dealer > idx {
            self.dealer -= 1;
        }
        if let Some(t) = self.to_act {
            if t > idx {
                self.to_act = Some(t - 1);
            }
        }
        if !self.seats.is_empty() {
            self.dealer %= self.seats.len();
        } else {
            self.dealer = 0;
        }
    }

    /// Removes departed seats and busts zero-stack seats between hands.
    fn prune_seats(&mut self, events: &mut Vec<HandEvent>) {
        let mut idx = 0;
        while idx < self.seats.len() {
            let seat = &self.seats[idx];
            if seat.departed {
                self.drop_seat(idx);
            } else if seat.stack == 0 {
                events.push(HandEvent::SeatEliminated {
                    player_id: seat.player_id.clone(),
                });
                self.drop_seat(idx);
            } else {
                idx += 1;
            }
        }
    }

    /// Chips never appear or vanish mid-hand: stacks of dealt-in seats
    /// plus the pots always equal the total on the table at the deal.
    fn check_conservation(&self) -> Result<(), GameError> {
        if !(self.phase.is_betting() || self.phase == Phase::Showdown) {
            return Ok(());
        }
        let stacks: u64 = self
            .seats
            .iter()
            .filter(|s| s.in_hand)
            .map(|s| u64::from(s.stack) + u64::from(s.round_wager))
            .sum();
        let pots: u64 = self
            .seats
            .iter()
            .filter(|s| s.in_hand)
            .map(|s| u64::from(s.hand_wager) - u64::from(s.round_wager))
            .sum();
        if stacks + pots != self.hand_chip_total {
            return Err(GameError::InvariantViolation(format!(
                "chip total drifted from {} to {}",
                self.hand_chip_total,
                stacks + pots
            )));
        }
        Ok(())
    }
}
