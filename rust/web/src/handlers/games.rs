use serde::Deserialize;
use warp::http::StatusCode;
use warp::reply::Response;

use crate::controller::{GameConfig, GameController, GameId, SubmittedAction};
use crate::errors::{ok_response, ApiEnvelope, IntoErrorResponse};
use crate::views::Viewer;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGameRequest {
    pub game_id: GameId,
    #[serde(default)]
    pub config: Option<GameConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameRequest {
    #[serde(default)]
    pub requester_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateQuery {
    #[serde(default)]
    pub viewer_id: Option<String>,
}

/// GET /api/games
pub async fn list_games(controller: GameController) -> Response {
    ok_response(StatusCode::OK, controller.list_games())
}

/// GET /api/games/available
pub async fn available_games(controller: GameController) -> Response {
    ok_response(StatusCode::OK, controller.available_games())
}

/// POST /api/games
pub async fn create_game(controller: GameController, request: CreateGameRequest) -> Response {
    let config = request.config.unwrap_or_default();
    match controller.create_game(request.game_id.clone(), config) {
        Ok(()) => match controller.game_summary(&request.game_id) {
            Ok(summary) => ok_response(StatusCode::CREATED, summary),
            Err(err) => err.into_http_response(),
        },
        Err(err) => err.into_http_response(),
    }
}

/// GET /api/games/:id
pub async fn get_game(controller: GameController, game_id: GameId) -> Response {
    match controller.game_summary(&game_id) {
        Ok(summary) => ok_response(StatusCode::OK, summary),
        Err(err) => err.into_http_response(),
    }
}

/// GET /api/games/:id/state?viewerId=
pub async fn game_state(controller: GameController, game_id: GameId, query: StateQuery) -> Response {
    let viewer = match query.viewer_id {
        Some(id) => Viewer::Player(id),
        None => Viewer::Spectator,
    };
    match controller.project(&game_id, &viewer) {
        Ok(view) => ok_response(StatusCode::OK, view),
        Err(err) => err.into_http_response(),
    }
}

/// POST /api/games/:id/start. The body is optional; an empty body is a
/// start request with no requester identity.
pub async fn start_game(
    controller: GameController,
    game_id: GameId,
    body: warp::hyper::body::Bytes,
) -> Response {
    let request: StartGameRequest = if body.is_empty() {
        StartGameRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(err) => {
                return ApiEnvelope::failure("invalid_body", err.to_string())
                    .into_response(StatusCode::BAD_REQUEST)
            }
        }
    };
    match controller.start_game(&game_id, request.requester_id.as_deref()) {
        Ok(()) => ok_response(StatusCode::OK, serde_json::json!({ "gameId": game_id })),
        Err(err) => err.into_http_response(),
    }
}

/// DELETE /api/games/:id
pub async fn delete_game(controller: GameController, game_id: GameId) -> Response {
    match controller.remove_game(&game_id) {
        Ok(()) => ok_response(StatusCode::OK, serde_json::json!({ "gameId": game_id })),
        Err(err) => err.into_http_response(),
    }
}

/// POST /api/games/:id/actions. HTTP fallback for agents without a
/// socket; the canonical path is the WebSocket `action` message.
pub async fn submit_action(
    controller: GameController,
    game_id: GameId,
    submitted: SubmittedAction,
) -> Response {
    match controller.process_action(&game_id, submitted) {
        Ok(()) => ok_response(StatusCode::ACCEPTED, serde_json::json!({ "gameId": game_id })),
        Err(err) => err.into_http_response(),
    }
}
