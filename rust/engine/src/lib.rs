//! # felt-engine: Texas Hold'em table state machine
//!
//! The deterministic core of the felt match server: cards, seeded
//! shuffles, hand evaluation, pot construction and the per-hand betting
//! state machine for 2–10 seats. The crate is synchronous and I/O-free;
//! timers, transports and event fan-out live in the web crate on top of
//! the [`engine::HandEvent`] stream this crate emits.
//!
//! ## Core Modules
//!
//! - [`cards`] - Card representation (Suit, Rank, Card) and deck construction
//! - [`deck`] - Deterministic deck shuffling with ChaCha20 RNG
//! - [`hand`] - Best-five hand evaluation and total-order comparison
//! - [`pot`] - Main/side pot construction and showdown distribution
//! - [`rules`] - Legal-action enumeration and bet validation
//! - [`player`] - Seats, actions and per-hand betting flags
//! - [`engine`] - The table state machine: deal, betting rounds, showdown
//! - [`errors`] - Error types for table operations
//!
//! ## Deterministic play
//!
//! All card outcomes are reproducible from the table seed:
//!
//! ```rust
//! use felt_engine::deck::Deck;
//!
//! let mut a = Deck::new_with_seed(42);
//! let mut b = Deck::new_with_seed(42);
//! a.shuffle();
//! b.shuffle();
//! assert_eq!(a.deal_card(), b.deal_card());
//! ```
//!
//! ## Driving a hand
//!
//! ```rust
//! use felt_engine::engine::{GameState, Phase};
//! use felt_engine::player::PlayerAction;
//!
//! let mut table = GameState::new(10, 20, 7);
//! table.add_seat("p1".into(), "Alice".into(), 1_000).unwrap();
//! table.add_seat("p2".into(), "Bob".into(), 1_000).unwrap();
//! table.start_hand().unwrap();
//!
//! assert_eq!(table.phase(), Phase::PreFlop);
//! // heads-up: the dealer posted the small blind and acts first
//! let events = table.apply_action("p1", PlayerAction::Call).unwrap();
//! assert!(!events.is_empty());
//! ```

pub mod cards;
pub mod deck;
pub mod engine;
pub mod errors;
pub mod hand;
pub mod player;
pub mod pot;
pub mod rules;
