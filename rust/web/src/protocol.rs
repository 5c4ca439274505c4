//! Wire protocol for the bidirectional agent socket. Tagged JSON
//! messages; the string forms live only here, everything inland is the
//! typed enums.

use felt_engine::player::{PlayerAction, PlayerId};
use serde::{Deserialize, Serialize};

use crate::controller::GameId;
use crate::events::GameEvent;
use crate::views::GameStateView;

/// Agent → server messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// First message on a fresh connection: claim a seat in a match.
    #[serde(rename_all = "camelCase")]
    Identify {
        bot_name: String,
        game_id: GameId,
        chip_stack: i64,
    },
    Action {
        action: PlayerAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp_ms: Option<i64>,
    },
    Ping,
    /// Resume a seat after a transport drop.
    #[serde(rename_all = "camelCase")]
    Reconnect {
        player_id: PlayerId,
        game_id: GameId,
    },
    Leave,
}

/// Server → agent messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    IdentificationSuccess { player_id: PlayerId },
    #[serde(rename_all = "camelCase")]
    GameState { game_state: GameStateView },
    #[serde(rename_all = "camelCase")]
    TurnStart { time_limit_seconds: u64 },
    ActionSuccess { action: PlayerAction },
    GameEvent { event: GameEvent },
    Disconnect { reason: String },
    Error { code: String, message: String },
}
