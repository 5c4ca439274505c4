use std::sync::Arc;
use warp::http::StatusCode;
use warp::reply::Response;

use crate::analyzer;
use crate::controller::GameId;
use crate::errors::{ok_response, IntoErrorResponse};
use crate::replay::ReplayStore;

/// GET /api/replays/:id
pub async fn get_replay(store: Arc<ReplayStore>, game_id: GameId) -> Response {
    match store.snapshot(&game_id) {
        Ok(data) => ok_response(StatusCode::OK, data),
        Err(err) => err.into_http_response(),
    }
}

/// GET /api/replays/:id/analysis
pub async fn get_analysis(store: Arc<ReplayStore>, game_id: GameId) -> Response {
    match store.snapshot(&game_id) {
        Ok(data) => ok_response(StatusCode::OK, analyzer::analyze(&data)),
        Err(err) => err.into_http_response(),
    }
}

/// GET /api/replays/:id/hands/:n
pub async fn get_hand(store: Arc<ReplayStore>, game_id: GameId, hand_number: u64) -> Response {
    match store.hand_slice(&game_id, hand_number) {
        Ok(data) => ok_response(StatusCode::OK, data),
        Err(err) => err.into_http_response(),
    }
}

/// POST /api/replays/:id/save
pub async fn save_replay(store: Arc<ReplayStore>, game_id: GameId) -> Response {
    match store.save(&game_id) {
        Ok(()) => ok_response(StatusCode::OK, serde_json::json!({ "gameId": game_id })),
        Err(err) => err.into_http_response(),
    }
}
