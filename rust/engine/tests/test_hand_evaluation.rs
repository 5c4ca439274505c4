use felt_engine::cards::{Card, Rank, Suit};
use felt_engine::errors::GameError;
use felt_engine::hand::{evaluate_hand, Category};

fn card(rank: Rank, suit: Suit) -> Card {
    Card { suit, rank }
}

fn seven(specs: [(Rank, Suit); 7]) -> Vec<Card> {
    specs.into_iter().map(|(r, s)| card(r, s)).collect()
}

#[test]
fn category_ladder_orders_correctly() {
    let straight_flush = seven([
        (Rank::Nine, Suit::Hearts),
        (Rank::Eight, Suit::Hearts),
        (Rank::Seven, Suit::Hearts),
        (Rank::Six, Suit::Hearts),
        (Rank::Five, Suit::Hearts),
        (Rank::Two, Suit::Clubs),
        (Rank::Three, Suit::Diamonds),
    ]);
    let quads = seven([
        (Rank::Ace, Suit::Clubs),
        (Rank::Ace, Suit::Diamonds),
        (Rank::Ace, Suit::Hearts),
        (Rank::Ace, Suit::Spades),
        (Rank::King, Suit::Clubs),
        (Rank::Queen, Suit::Diamonds),
        (Rank::Two, Suit::Hearts),
    ]);
    let full_house = seven([
        (Rank::King, Suit::Clubs),
        (Rank::King, Suit::Diamonds),
        (Rank::King, Suit::Hearts),
        (Rank::Queen, Suit::Clubs),
        (Rank::Queen, Suit::Diamonds),
        (Rank::Two, Suit::Hearts),
        (Rank::Three, Suit::Spades),
    ]);

    let sf = evaluate_hand(&straight_flush).unwrap();
    let q = evaluate_hand(&quads).unwrap();
    let fh = evaluate_hand(&full_house).unwrap();

    assert_eq!(sf.category, Category::StraightFlush);
    assert_eq!(q.category, Category::FourOfAKind);
    assert_eq!(fh.category, Category::FullHouse);
    assert!(sf > q);
    assert!(q > fh);
}

#[test]
fn kickers_break_ties_within_a_category() {
    let ace_kicker = seven([
        (Rank::Ten, Suit::Clubs),
        (Rank::Ten, Suit::Diamonds),
        (Rank::Ace, Suit::Hearts),
        (Rank::Seven, Suit::Spades),
        (Rank::Five, Suit::Clubs),
        (Rank::Three, Suit::Diamonds),
        (Rank::Two, Suit::Hearts),
    ]);
    let king_kicker = seven([
        (Rank::Ten, Suit::Hearts),
        (Rank::Ten, Suit::Spades),
        (Rank::King, Suit::Clubs),
        (Rank::Seven, Suit::Diamonds),
        (Rank::Five, Suit::Hearts),
        (Rank::Three, Suit::Spades),
        (Rank::Two, Suit::Clubs),
    ]);
    let a = evaluate_hand(&ace_kicker).unwrap();
    let b = evaluate_hand(&king_kicker).unwrap();
    assert_eq!(a.category, Category::OnePair);
    assert_eq!(b.category, Category::OnePair);
    assert!(a > b);
}

#[test]
fn identical_boards_play_equal() {
    // both holes miss the board entirely; the board plays for both
    let board = [
        (Rank::Ace, Suit::Clubs),
        (Rank::King, Suit::Diamonds),
        (Rank::Queen, Suit::Hearts),
        (Rank::Jack, Suit::Spades),
        (Rank::Ten, Suit::Clubs),
    ];
    let mut a = seven([
        board[0], board[1], board[2], board[3], board[4],
        (Rank::Two, Suit::Hearts),
        (Rank::Three, Suit::Clubs),
    ]);
    let mut b = seven([
        board[0], board[1], board[2], board[3], board[4],
        (Rank::Four, Suit::Diamonds),
        (Rank::Five, Suit::Spades),
    ]);
    let sa = evaluate_hand(&a).unwrap();
    let sb = evaluate_hand(&b).unwrap();
    assert_eq!(sa.category, Category::Straight);
    assert_eq!(sa, sb);
    // order of input cards is irrelevant
    a.reverse();
    b.reverse();
    assert_eq!(evaluate_hand(&a).unwrap(), sa);
    assert_eq!(evaluate_hand(&b).unwrap(), sb);
}

#[test]
fn steel_wheel_is_a_straight_flush_to_the_five() {
    let cards = seven([
        (Rank::Ace, Suit::Spades),
        (Rank::Two, Suit::Spades),
        (Rank::Three, Suit::Spades),
        (Rank::Four, Suit::Spades),
        (Rank::Five, Suit::Spades),
        (Rank::King, Suit::Hearts),
        (Rank::Queen, Suit::Diamonds),
    ]);
    let s = evaluate_hand(&cards).unwrap();
    assert_eq!(s.category, Category::StraightFlush);
    assert_eq!(s.kickers[0], 5);
}

#[test]
fn flush_picks_best_five_of_six_suited() {
    let cards = seven([
        (Rank::Two, Suit::Clubs),
        (Rank::Four, Suit::Clubs),
        (Rank::Eight, Suit::Clubs),
        (Rank::Nine, Suit::Clubs),
        (Rank::Jack, Suit::Clubs),
        (Rank::Ace, Suit::Clubs),
        (Rank::King, Suit::Hearts),
    ]);
    let s = evaluate_hand(&cards).unwrap();
    assert_eq!(s.category, Category::Flush);
    assert_eq!(s.kickers, [14, 11, 9, 8, 4]);
}

#[test]
fn six_card_input_is_accepted() {
    let cards = [
        card(Rank::Nine, Suit::Clubs),
        card(Rank::Nine, Suit::Diamonds),
        card(Rank::Nine, Suit::Hearts),
        card(Rank::Four, Suit::Spades),
        card(Rank::Seven, Suit::Clubs),
        card(Rank::Two, Suit::Diamonds),
    ];
    let s = evaluate_hand(&cards).unwrap();
    assert_eq!(s.category, Category::ThreeOfAKind);
    assert_eq!(s.kickers[0], 9);
    assert_eq!(s.kickers[1], 7);
    assert_eq!(s.kickers[2], 4);
}

#[test]
fn four_cards_are_insufficient() {
    let cards = [
        card(Rank::Nine, Suit::Clubs),
        card(Rank::Nine, Suit::Diamonds),
        card(Rank::Nine, Suit::Hearts),
        card(Rank::Nine, Suit::Spades),
    ];
    assert_eq!(
        evaluate_hand(&cards).unwrap_err(),
        GameError::InsufficientCards { have: 4, need: 5 }
    );
}
