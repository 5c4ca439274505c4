use thiserror::Error;

use crate::player::PlayerId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("no hand is running")]
    GameNotRunning,
    #[error("need at least {required} funded seats, have {seated}")]
    InsufficientPlayers { seated: usize, required: usize },
    #[error("it is not {actual}'s turn")]
    NotYourTurn { actual: PlayerId },
    #[error("illegal action: {0}")]
    IllegalAction(String),
    #[error("amount {amount} outside [{min}, {max}]")]
    AmountOutOfRange { amount: u32, min: u32, max: u32 },
    #[error("hand evaluation needs at least {need} cards, got {have}")]
    InsufficientCards { have: usize, need: usize },
    #[error("player {0} is not seated at this table")]
    UnknownPlayer(PlayerId),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}
