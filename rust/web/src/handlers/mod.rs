pub mod games;
pub mod health;
pub mod replays;
pub mod sse;
pub mod ws;

pub use games::{
    available_games, create_game, delete_game, game_state, get_game, list_games, start_game,
    submit_action, CreateGameRequest, StartGameRequest, StateQuery,
};
pub use health::{health, stats};
pub use replays::{get_analysis, get_hand, get_replay, save_replay};
pub use sse::stream_events;
pub use ws::client_connection;
