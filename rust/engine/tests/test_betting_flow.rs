use felt_engine::engine::{AppliedAction, GameState, HandEvent, Phase};
use felt_engine::errors::GameError;
use felt_engine::player::PlayerAction;
use felt_engine::rules::ActionKind;

fn three_handed(stacks: [u32; 3]) -> GameState {
    let mut state = GameState::new(10, 20, 1234);
    state.add_seat("p1".into(), "p1".into(), stacks[0]).unwrap();
    state.add_seat("p2".into(), "p2".into(), stacks[1]).unwrap();
    state.add_seat("p3".into(), "p3".into(), stacks[2]).unwrap();
    state.start_hand().unwrap();
    state
}

fn act(state: &mut GameState, action: PlayerAction) -> Vec<HandEvent> {
    let actor = state.to_act_player().expect("someone to act").clone();
    state.apply_action(&actor, action).unwrap()
}

#[test]
fn preflop_turn_order_starts_left_of_big_blind() {
    let state = three_handed([1_000, 1_000, 1_000]);
    // dealer p1, small blind p2, big blind p3: first to act is the dealer
    assert_eq!(state.to_act_player().map(String::as_str), Some("p1"));
}

#[test]
fn big_blind_gets_the_option_after_limps() {
    let mut state = three_handed([1_000, 1_000, 1_000]);
    act(&mut state, PlayerAction::Call); // p1 limps
    act(&mut state, PlayerAction::Call); // p2 completes
    // p3 already matches the bet but has not acted: the option is his
    assert_eq!(state.to_act_player().map(String::as_str), Some("p3"));
    let kinds: Vec<ActionKind> = state
        .possible_actions_for("p3")
        .iter()
        .map(|a| a.kind)
        .collect();
    assert!(kinds.contains(&ActionKind::Check));
    assert!(kinds.contains(&ActionKind::Raise));
    assert!(!kinds.contains(&ActionKind::Fold));

    act(&mut state, PlayerAction::Check);
    assert_eq!(state.phase(), Phase::Flop);
}

#[test]
fn a_raise_reopens_the_action_for_callers() {
    let mut state = three_handed([1_000, 1_000, 1_000]);
    act(&mut state, PlayerAction::Call); // p1
    act(&mut state, PlayerAction::Call); // p2
    act(&mut state, PlayerAction::Raise(80)); // p3 raises the option
    // action comes back around to the limpers
    assert_eq!(state.to_act_player().map(String::as_str), Some("p1"));
    act(&mut state, PlayerAction::Call);
    assert_eq!(state.to_act_player().map(String::as_str), Some("p2"));
    act(&mut state, PlayerAction::Call);
    assert_eq!(state.phase(), Phase::Flop);
}

#[test]
fn min_raise_tracks_the_last_raise_size() {
    let mut state = three_handed([1_000, 1_000, 1_000]);
    act(&mut state, PlayerAction::Raise(60)); // p1 raises 40 over the blind
    let raise = state
        .possible_actions_for("p2")
        .into_iter()
        .find(|a| a.kind == ActionKind::Raise)
        .expect("raise offered");
    // next raise must add at least the 40 the last raise added
    assert_eq!(raise.min, Some(100));
}

#[test]
fn folded_and_all_in_seats_are_skipped_in_rotation() {
    let mut state = three_handed([1_000, 60, 1_000]);
    act(&mut state, PlayerAction::Raise(60)); // p1
    act(&mut state, PlayerAction::AllIn); // p2 calls all-in for 60
    act(&mut state, PlayerAction::Call); // p3
    assert_eq!(state.phase(), Phase::Flop);
    // p2 is all-in: flop action is p3 (left of dealer) then p1 only
    assert_eq!(state.to_act_player().map(String::as_str), Some("p3"));
    act(&mut state, PlayerAction::Check);
    assert_eq!(state.to_act_player().map(String::as_str), Some("p1"));
    act(&mut state, PlayerAction::Check);
    assert_eq!(state.phase(), Phase::Turn);
}

#[test]
fn heads_up_all_in_runs_the_board_out() {
    let mut state = GameState::new(10, 20, 99);
    state.add_seat("p1".into(), "p1".into(), 500).unwrap();
    state.add_seat("p2".into(), "p2".into(), 500).unwrap();
    state.start_hand().unwrap();

    let events = act(&mut state, PlayerAction::AllIn);
    assert!(!events
        .iter()
        .any(|e| matches!(e, HandEvent::ShowdownResolved { .. })));
    let events = act(&mut state, PlayerAction::AllIn);

    // the remaining streets were dealt with no further betting
    assert_eq!(state.phase(), Phase::HandComplete);
    let community: usize = events
        .iter()
        .filter_map(|e| match e {
            HandEvent::CommunityDealt { cards, .. } => Some(cards.len()),
            _ => None,
        })
        .sum();
    assert_eq!(community, 5);
    assert!(events
        .iter()
        .any(|e| matches!(e, HandEvent::ShowdownResolved { .. })));

    // chips conserved across the shove
    let snapshot = state.snapshot();
    let total: u32 = snapshot.seats.iter().map(|s| s.stack).sum();
    assert_eq!(total, 1_000);
}

#[test]
fn all_in_is_classified_by_what_it_covers() {
    let mut state = GameState::new(10, 20, 55);
    state.add_seat("a".into(), "a".into(), 1_000).unwrap();
    state.add_seat("b".into(), "b".into(), 100).unwrap();
    state.start_hand().unwrap();

    let events = act(&mut state, PlayerAction::Raise(300));
    assert!(matches!(
        events[0],
        HandEvent::ActionTaken {
            applied: AppliedAction::Raise { to: 300 },
            ..
        }
    ));

    // b covers only part of the raise: the all-in resolves to a call
    let events = act(&mut state, PlayerAction::AllIn);
    assert!(matches!(
        events[0],
        HandEvent::ActionTaken {
            action: PlayerAction::AllIn,
            applied: AppliedAction::Call { amount: 80 },
            ..
        }
    ));
}

#[test]
fn street_boundary_hands_a_fresh_turn_to_the_same_seat() {
    let mut state = GameState::new(10, 20, 66);
    state.add_seat("p1".into(), "p1".into(), 500).unwrap();
    state.add_seat("p2".into(), "p2".into(), 500).unwrap();
    state.start_hand().unwrap();

    act(&mut state, PlayerAction::Call); // p1 completes the small blind
    let preflop_serial = state.turn_serial();
    assert_eq!(state.to_act_player().map(String::as_str), Some("p2"));

    // p2's own check closes preflop; heads-up the flop opens on the big
    // blind, so the same seat is up again but it is a new turn
    act(&mut state, PlayerAction::Check);
    assert_eq!(state.phase(), Phase::Flop);
    assert_eq!(state.to_act_player().map(String::as_str), Some("p2"));
    assert_ne!(state.turn_serial(), preflop_serial);
}

#[test]
fn actions_in_closed_phases_are_rejected() {
    let mut state = GameState::new(10, 20, 3);
    state.add_seat("p1".into(), "p1".into(), 500).unwrap();
    state.add_seat("p2".into(), "p2".into(), 500).unwrap();
    assert_eq!(
        state.apply_action("p1", PlayerAction::Check).unwrap_err(),
        GameError::GameNotRunning
    );

    state.start_hand().unwrap();
    let err = state.apply_action("ghost", PlayerAction::Check).unwrap_err();
    assert_eq!(err, GameError::UnknownPlayer("ghost".into()));
}

#[test]
fn starting_a_hand_mid_hand_is_rejected() {
    let mut state = GameState::new(10, 20, 3);
    state.add_seat("p1".into(), "p1".into(), 500).unwrap();
    state.add_seat("p2".into(), "p2".into(), 500).unwrap();
    state.start_hand().unwrap();
    assert!(state.start_hand().is_err());
}

#[test]
fn single_seat_cannot_start_a_hand() {
    let mut state = GameState::new(10, 20, 3);
    state.add_seat("p1".into(), "p1".into(), 500).unwrap();
    assert_eq!(
        state.start_hand().unwrap_err(),
        GameError::InsufficientPlayers {
            seated: 1,
            required: 2
        }
    );
}

#[test]
fn dealer_rotates_between_hands() {
    let mut state = three_handed([1_000, 1_000, 1_000]);
    // hand 1: dealer p1; fold it out
    act(&mut state, PlayerAction::Fold);
    act(&mut state, PlayerAction::Fold);
    assert_eq!(state.phase(), Phase::HandComplete);

    let events = state.start_hand().unwrap();
    let dealer = events
        .iter()
        .find_map(|e| match e {
            HandEvent::HandStarted { dealer, .. } => Some(dealer.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(dealer, "p2");
}

#[test]
fn snapshot_round_trips_through_serde() {
    let mut state = three_handed([1_000, 1_000, 1_000]);
    act(&mut state, PlayerAction::Raise(60));
    let snapshot = state.snapshot();
    let json = serde_json::to_string(&snapshot).unwrap();
    let back: felt_engine::engine::TableSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(back, snapshot);
}
