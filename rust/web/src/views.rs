//! Per-viewer masking of table state. `project` is a pure function: the
//! controller hands it the full snapshot and the viewer identity, and it
//! returns exactly what that viewer is allowed to see.

use felt_engine::cards::Card;
use felt_engine::engine::{Phase, TableSnapshot};
use felt_engine::player::PlayerId;
use felt_engine::pot::Pot;
use felt_engine::rules::PossibleAction;
use serde::{Deserialize, Serialize};

use crate::controller::GameId;

/// Who is looking at the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    Player(PlayerId),
    Spectator,
    Replay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatView {
    pub player_id: PlayerId,
    pub name: String,
    pub stack: u32,
    pub round_wager: u32,
    pub hand_wager: u32,
    pub folded: bool,
    pub all_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hole_cards: Option<Vec<Card>>,
}

/// A viewer-specific rendering of a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateView {
    pub game_id: GameId,
    pub phase: Phase,
    pub hand_number: u64,
    pub community: Vec<Card>,
    pub pots: Vec<Pot>,
    pub current_bet: u32,
    pub min_raise: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dealer: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_player_to_act: Option<PlayerId>,
    pub seats: Vec<SeatView>,
    /// Present only for the seat currently to act
    #[serde(skip_serializing_if = "Option::is_none")]
    pub possible_actions: Option<Vec<PossibleAction>>,
}

/// Seat X's hole cards are visible iff the viewer is seat X, or the hand
/// reached showdown and seat X did not fold. A hand folded out never
/// reveals anything, not even in replays.
fn hole_visible(snapshot: &TableSnapshot, viewer: &Viewer, seat_player: &str, folded: bool) -> bool {
    if let Viewer::Player(id) = viewer {
        if id == seat_player {
            return true;
        }
    }
    let at_showdown = snapshot.phase == Phase::Showdown
        || (snapshot.phase == Phase::HandComplete && snapshot.went_to_showdown);
    at_showdown && !folded
}

pub fn project(
    game_id: &GameId,
    snapshot: &TableSnapshot,
    possible: &[PossibleAction],
    viewer: &Viewer,
) -> GameStateView {
    let seats = snapshot
        .seats
        .iter()
        .map(|seat| SeatView {
            player_id: seat.player_id.clone(),
            name: seat.name.clone(),
            stack: seat.stack,
            round_wager: seat.round_wager,
            hand_wager: seat.hand_wager,
            folded: seat.folded,
            all_in: seat.all_in,
            hole_cards: seat
                .hole
                .filter(|_| hole_visible(snapshot, viewer, &seat.player_id, seat.folded))
                .map(|cards| cards.to_vec()),
        })
        .collect();

    let possible_actions = match (viewer, &snapshot.to_act) {
        (Viewer::Player(id), Some(actor)) if id == actor && !possible.is_empty() => {
            Some(possible.to_vec())
        }
        _ => None,
    };

    GameStateView {
        game_id: game_id.clone(),
        phase: snapshot.phase,
        hand_number: snapshot.hand_number,
        community: snapshot.community.clone(),
        pots: snapshot.pots.clone(),
        current_bet: snapshot.current_bet,
        min_raise: snapshot.min_raise,
        dealer: snapshot.dealer.clone(),
        current_player_to_act: snapshot.to_act.clone(),
        seats,
        possible_actions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use felt_engine::engine::GameState;
    use felt_engine::player::PlayerAction;

    fn table_preflop() -> GameState {
        let mut state = GameState::new(10, 20, 11);
        state.add_seat("p1".into(), "Alice".into(), 1_000).unwrap();
        state.add_seat("p2".into(), "Bob".into(), 1_000).unwrap();
        state.start_hand().unwrap();
        state
    }

    fn seat<'a>(view: &'a GameStateView, id: &str) -> &'a SeatView {
        view.seats.iter().find(|s| s.player_id == id).unwrap()
    }

    #[test]
    fn players_see_only_their_own_hole_cards() {
        let state = table_preflop();
        let snapshot = state.snapshot();
        let possible = state.possible_actions_for("p1");
        let game_id = "g".to_string();

        let view = project(&game_id, &snapshot, &possible, &Viewer::Player("p1".into()));
        assert!(seat(&view, "p1").hole_cards.is_some());
        assert!(seat(&view, "p2").hole_cards.is_none());

        let view = project(&game_id, &snapshot, &possible, &Viewer::Player("p2".into()));
        assert!(seat(&view, "p1").hole_cards.is_none());
        assert!(seat(&view, "p2").hole_cards.is_some());
    }

    #[test]
    fn spectators_see_no_hole_cards_before_showdown() {
        let state = table_preflop();
        let snapshot = state.snapshot();
        let game_id = "g".to_string();
        for viewer in [Viewer::Spectator, Viewer::Replay] {
            let view = project(&game_id, &snapshot, &[], &viewer);
            assert!(view.seats.iter().all(|s| s.hole_cards.is_none()));
        }
    }

    #[test]
    fn possible_actions_go_only_to_the_seat_to_act() {
        let state = table_preflop();
        let snapshot = state.snapshot();
        let game_id = "g".to_string();
        let actor = snapshot.to_act.clone().unwrap();
        let possible = state.possible_actions_for(&actor);

        let view = project(&game_id, &snapshot, &possible, &Viewer::Player(actor.clone()));
        assert!(view.possible_actions.is_some());

        let other = if actor == "p1" { "p2" } else { "p1" };
        let view = project(
            &game_id,
            &snapshot,
            &state.possible_actions_for(other),
            &Viewer::Player(other.into()),
        );
        assert!(view.possible_actions.is_none());

        let view = project(&game_id, &snapshot, &possible, &Viewer::Spectator);
        assert!(view.possible_actions.is_none());
    }

    #[test]
    fn showdown_reveals_non_folded_seats_to_everyone() {
        let mut state = table_preflop();
        // check the hand down to showdown
        state.apply_action("p1", PlayerAction::Call).unwrap();
        state.apply_action("p2", PlayerAction::Check).unwrap();
        for _ in 0..3 {
            let a = state.to_act_player().unwrap().clone();
            state.apply_action(&a, PlayerAction::Check).unwrap();
            let b = state.to_act_player().unwrap().clone();
            state.apply_action(&b, PlayerAction::Check).unwrap();
        }
        let snapshot = state.snapshot();
        assert!(snapshot.went_to_showdown);

        let game_id = "g".to_string();
        let view = project(&game_id, &snapshot, &[], &Viewer::Spectator);
        assert!(view.seats.iter().all(|s| s.hole_cards.is_some()));
    }

    #[test]
    fn fold_win_reveals_nothing_even_at_hand_complete() {
        let mut state = table_preflop();
        state.apply_action("p1", PlayerAction::Raise(60)).unwrap();
        state.apply_action("p2", PlayerAction::Fold).unwrap();
        let snapshot = state.snapshot();
        assert!(!snapshot.went_to_showdown);

        let game_id = "g".to_string();
        let view = project(&game_id, &snapshot, &[], &Viewer::Replay);
        assert!(view.seats.iter().all(|s| s.hole_cards.is_none()));
    }
}
