use felt_engine::cards::Card;
use felt_engine::engine::{AppliedAction, Phase, SeatDelta, ShowdownReveal};
use felt_engine::player::{PlayerAction, PlayerId};
use felt_engine::pot::PotAward;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

use crate::controller::GameId;

// Bounded channel per subscriber; a full channel drops events for that
// subscriber instead of blocking the match.
const EVENT_CHANNEL_BUFFER: usize = 1000;

pub type EventSender = mpsc::Sender<GameEvent>;
pub type EventReceiver = mpsc::Receiver<GameEvent>;

/// Everything observable about a match, keyed by game id on the bus and
/// appended verbatim to the replay log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    GameStarted {
        game_id: GameId,
        players: Vec<PlayerId>,
    },
    HandStarted {
        game_id: GameId,
        hand_number: u64,
        dealer: PlayerId,
        small_blind_seat: PlayerId,
        big_blind_seat: PlayerId,
    },
    /// Community cards carry their values; hole-card deals name only the
    /// receiving seat, the cards themselves stay private to projections.
    CardsDealt {
        game_id: GameId,
        #[serde(skip_serializing_if = "Option::is_none")]
        phase: Option<Phase>,
        #[serde(skip_serializing_if = "Option::is_none")]
        community: Option<Vec<Card>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        player_id: Option<PlayerId>,
    },
    PhaseChanged {
        game_id: GameId,
        phase: Phase,
    },
    ActionTaken {
        game_id: GameId,
        hand_number: u64,
        player_id: PlayerId,
        /// The action as the agent submitted it
        action: PlayerAction,
        /// What it resolved to after clamping (an all-in call is a call)
        applied: AppliedAction,
        timestamp_ms: i64,
    },
    BetCollected {
        game_id: GameId,
        pot_total: u32,
    },
    Showdown {
        game_id: GameId,
        hand_number: u64,
        reveals: Vec<ShowdownReveal>,
        awards: Vec<PotAward>,
    },
    HandComplete {
        game_id: GameId,
        hand_number: u64,
        winners: Vec<PlayerId>,
        deltas: Vec<SeatDelta>,
    },
    PlayerJoined {
        game_id: GameId,
        player_id: PlayerId,
        name: String,
        chip_stack: u32,
    },
    PlayerLeft {
        game_id: GameId,
        player_id: PlayerId,
    },
    PlayerEliminated {
        game_id: GameId,
        player_id: PlayerId,
    },
    GameEnded {
        game_id: GameId,
        reason: String,
    },
    TurnTimeout {
        game_id: GameId,
        player_id: PlayerId,
    },
}

impl GameEvent {
    pub fn game_id(&self) -> &GameId {
        match self {
            GameEvent::GameStarted { game_id, .. }
            | GameEvent::HandStarted { game_id, .. }
            | GameEvent::CardsDealt { game_id, .. }
            | GameEvent::PhaseChanged { game_id, .. }
            | GameEvent::ActionTaken { game_id, .. }
            | GameEvent::BetCollected { game_id, .. }
            | GameEvent::Showdown { game_id, .. }
            | GameEvent::HandComplete { game_id, .. }
            | GameEvent::PlayerJoined { game_id, .. }
            | GameEvent::PlayerLeft { game_id, .. }
            | GameEvent::PlayerEliminated { game_id, .. }
            | GameEvent::GameEnded { game_id, .. }
            | GameEvent::TurnTimeout { game_id, .. } => game_id,
        }
    }

    /// The seat the event is about, when there is exactly one.
    pub fn actor(&self) -> Option<&PlayerId> {
        match self {
            GameEvent::ActionTaken { player_id, .. }
            | GameEvent::PlayerJoined { player_id, .. }
            | GameEvent::PlayerLeft { player_id, .. }
            | GameEvent::PlayerEliminated { player_id, .. }
            | GameEvent::TurnTimeout { player_id, .. } => Some(player_id),
            GameEvent::CardsDealt { player_id, .. } => player_id.as_ref(),
            _ => None,
        }
    }
}

/// A live subscription to one match's events. Dropping it unsubscribes.
pub struct EventSubscription {
    bus: EventBus,
    game_id: GameId,
    subscriber_id: usize,
    pub receiver: EventReceiver,
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.game_id, self.subscriber_id);
    }
}

/// In-process fan-out of match events, keyed by game id. Publishing is
/// synchronous and non-blocking: slow subscribers lose events rather
/// than stalling the match, and dead ones are pruned on the spot.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

#[derive(Debug, Default)]
struct EventBusInner {
    subscribers: RwLock<HashMap<GameId, Vec<(usize, EventSender)>>>,
    next_id: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, game_id: GameId) -> EventSubscription {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);
        let id = self.inner.next_id.fetch_add(1, Ordering::AcqRel);
        match self.inner.subscribers.write() {
            Ok(mut guard) => guard.entry(game_id.clone()).or_default().push((id, tx)),
            Err(poisoned) => poisoned
                .into_inner()
                .entry(game_id.clone())
                .or_default()
                .push((id, tx)),
        }

        tracing::debug!(game_id = %game_id, subscriber_id = id, "subscribed to match events");

        EventSubscription {
            bus: self.clone(),
            game_id,
            subscriber_id: id,
            receiver: rx,
        }
    }

    pub fn broadcast(&self, game_id: &GameId, event: &GameEvent) {
        let subscribers = {
            let guard = match self.inner.subscribers.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.get(game_id).cloned()
        };

        let Some(list) = subscribers else { return };
        let mut dead = Vec::new();
        for (id, sender) in &list {
            if let Err(err) = sender.try_send(event.clone()) {
                tracing::warn!(
                    game_id = %game_id,
                    subscriber_id = id,
                    error = ?err,
                    "dropping event for unresponsive subscriber"
                );
                if matches!(err, mpsc::error::TrySendError::Closed(_)) {
                    dead.push(*id);
                }
            }
        }
        if !dead.is_empty() {
            self.remove_subscribers(game_id, &dead);
        }
    }

    pub fn unsubscribe(&self, game_id: &GameId, subscriber_id: usize) {
        self.remove_subscribers(game_id, &[subscriber_id]);
    }

    /// Drops every subscription for a match; used when the match goes away.
    pub fn drop_game(&self, game_id: &GameId) {
        let mut guard = match self.inner.subscribers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.remove(game_id);
    }

    pub fn subscriber_count(&self) -> usize {
        let guard = match self.inner.subscribers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.values().map(|list| list.len()).sum()
    }

    fn remove_subscribers(&self, game_id: &GameId, ids: &[usize]) {
        let mut guard = match self.inner.subscribers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(list) = guard.get_mut(game_id) {
            list.retain(|(id, _)| !ids.contains(id));
            if list.is_empty() {
                guard.remove(game_id);
            }
        }
    }
}
