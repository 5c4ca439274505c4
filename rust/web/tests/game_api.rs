//! HTTP surface tests against the assembled warp routes.

use felt_web::{AppContext, ManualClock, ServerConfig, Viewer, WebServer};
use serde_json::{json, Value};
use std::sync::Arc;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;

fn test_context() -> (AppContext, ManualClock) {
    let clock = ManualClock::new();
    let context = AppContext::with_clock(ServerConfig::for_tests(), Arc::new(clock.clone()));
    (context, clock)
}

fn routes(context: &AppContext) -> BoxedFilter<(warp::reply::Response,)> {
    WebServer::routes(context)
}

async fn get(routes: &BoxedFilter<(warp::reply::Response,)>, path: &str) -> (StatusCode, Value) {
    let response = warp::test::request().path(path).reply(routes).await;
    let status = response.status();
    let body = serde_json::from_slice(response.body()).unwrap_or(Value::Null);
    (status, body)
}

async fn post(
    routes: &BoxedFilter<(warp::reply::Response,)>,
    path: &str,
    body: &Value,
) -> (StatusCode, Value) {
    let response = warp::test::request()
        .method("POST")
        .path(path)
        .json(body)
        .reply(routes)
        .await;
    let status = response.status();
    let body = serde_json::from_slice(response.body()).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn health_and_stats_respond() {
    let (context, _clock) = test_context();
    let routes = routes(&context);

    let (status, body) = get(&routes, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");

    let (status, body) = get(&routes, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["activeGames"], 0);
    assert!(body["data"]["serverUptimeSeconds"].is_u64());
}

#[tokio::test]
async fn create_list_and_fetch_games() {
    let (context, _clock) = test_context();
    let routes = routes(&context);

    let (status, body) = post(
        &routes,
        "/api/games",
        &json!({
            "gameId": "g1",
            "config": { "maxPlayers": 4, "smallBlindAmount": 5, "bigBlindAmount": 10 }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["gameId"], "g1");
    assert_eq!(body["data"]["maxPlayers"], 4);

    // duplicate ids are rejected
    let (status, body) = post(&routes, "/api/games", &json!({ "gameId": "g1" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "duplicate_game_id");

    let (status, body) = get(&routes, "/api/games").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    let (status, body) = get(&routes, "/api/games/g1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["phase"], "waiting_for_players");

    let (status, body) = get(&routes, "/api/games/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown_game");
}

#[tokio::test]
async fn available_games_exclude_full_tables() {
    let (context, _clock) = test_context();
    let routes = routes(&context);
    let controller = context.controller();

    let (status, _) = post(
        &routes,
        "/api/games",
        &json!({ "gameId": "g1", "config": { "maxPlayers": 2 } }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    controller
        .add_player("g1", "p1".into(), "P1".into(), 500)
        .unwrap();
    controller
        .add_player("g1", "p2".into(), "P2".into(), 500)
        .unwrap();

    let (status, body) = get(&routes, "/api/games/available").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn state_endpoint_masks_by_viewer() {
    let (context, clock) = test_context();
    let routes = routes(&context);
    let controller = context.controller();

    let (status, _) = post(
        &routes,
        "/api/games",
        &json!({ "gameId": "g1", "config": { "maxPlayers": 2, "seed": 9 } }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    controller
        .add_player("g1", "p1".into(), "P1".into(), 500)
        .unwrap();
    controller
        .add_player("g1", "p2".into(), "P2".into(), 500)
        .unwrap();
    clock.advance(std::time::Duration::from_secs(2));

    let (status, body) = get(&routes, "/api/games/g1/state?viewerId=p1").await;
    assert_eq!(status, StatusCode::OK);
    let seats = body["data"]["seats"].as_array().expect("seats");
    let p1 = seats.iter().find(|s| s["playerId"] == "p1").unwrap();
    let p2 = seats.iter().find(|s| s["playerId"] == "p2").unwrap();
    assert!(p1["holeCards"].is_array());
    assert!(p2.get("holeCards").is_none());

    // spectators see nobody's cards
    let (_, body) = get(&routes, "/api/games/g1/state").await;
    let seats = body["data"]["seats"].as_array().expect("seats");
    assert!(seats.iter().all(|s| s.get("holeCards").is_none()));
}

#[tokio::test]
async fn start_endpoint_validates_players_and_permissions() {
    let (context, _clock) = test_context();
    let routes = routes(&context);
    let controller = context.controller();

    let (status, _) = post(
        &routes,
        "/api/games",
        &json!({
            "gameId": "g1",
            "config": {
                "startSettings": { "condition": "manual", "creatorId": "boss" }
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // too few players
    let (status, body) = post(&routes, "/api/games/g1/start", &json!({ "requesterId": "boss" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "insufficient_players");

    controller
        .add_player("g1", "p1".into(), "P1".into(), 500)
        .unwrap();
    controller
        .add_player("g1", "p2".into(), "P2".into(), 500)
        .unwrap();

    let (status, body) = post(&routes, "/api/games/g1/start", &json!({ "requesterId": "imp" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "permission_denied");

    let (status, body) = post(&routes, "/api/games/g1/start", &json!({ "requesterId": "boss" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn delete_endpoint_removes_the_match() {
    let (context, _clock) = test_context();
    let routes = routes(&context);

    let (status, _) = post(&routes, "/api/games", &json!({ "gameId": "g1" })).await;
    assert_eq!(status, StatusCode::CREATED);

    let response = warp::test::request()
        .method("DELETE")
        .path("/api/games/g1")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = get(&routes, "/api/games/g1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn replay_endpoints_serve_recorded_matches() {
    let (context, clock) = test_context();
    let routes = routes(&context);
    let controller = context.controller();

    let (status, _) = post(
        &routes,
        "/api/games",
        &json!({ "gameId": "g1", "config": { "maxPlayers": 2, "seed": 4 } }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    controller
        .add_player("g1", "p1".into(), "P1".into(), 500)
        .unwrap();
    controller
        .add_player("g1", "p2".into(), "P2".into(), 500)
        .unwrap();
    clock.advance(std::time::Duration::from_secs(2));

    let (status, body) = get(&routes, "/api/replays/g1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["gameId"], "g1");
    assert!(body["data"]["events"].as_array().map(Vec::len).unwrap_or(0) > 0);

    let (status, body) = get(&routes, "/api/replays/g1/analysis").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["playerStats"].is_object());

    let (status, body) = get(&routes, "/api/replays/g1/hands/1").await;
    assert_eq!(status, StatusCode::OK);
    let events = body["data"]["events"].as_array().expect("hand events");
    assert!(!events.is_empty());

    let (status, body) = get(&routes, "/api/replays/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown_replay");

    // no sink configured
    let (status, body) = post(&routes, "/api/replays/g1/save", &json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "no_replay_sink");
}

#[tokio::test]
async fn websocket_identify_binds_a_seat() {
    let (context, _clock) = test_context();
    let routes = routes(&context);
    let controller = context.controller();

    let (status, _) = post(
        &routes,
        "/api/games",
        &json!({ "gameId": "g1", "config": { "maxPlayers": 2, "seed": 2 } }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let mut client = warp::test::ws()
        .path("/ws")
        .handshake(routes.clone())
        .await
        .expect("websocket handshake");

    client
        .send_text(json!({ "type": "identify", "botName": "crusher", "gameId": "g1", "chipStack": 1000 }).to_string())
        .await;

    let message = client.recv().await.expect("identification reply");
    let reply: Value = serde_json::from_str(message.to_str().unwrap()).unwrap();
    assert_eq!(reply["type"], "identificationSuccess");
    let player_id = reply["playerId"].as_str().unwrap().to_string();
    assert!(controller.has_player("g1", &player_id));

    let message = client.recv().await.expect("initial state");
    let reply: Value = serde_json::from_str(message.to_str().unwrap()).unwrap();
    assert_eq!(reply["type"], "gameState");
    assert_eq!(reply["gameState"]["gameId"], "g1");
}

#[tokio::test]
async fn projection_respects_possible_actions_over_http() {
    let (context, clock) = test_context();
    let controller = context.controller();
    controller
        .create_game(
            "g1".into(),
            felt_web::GameConfig {
                max_players: 2,
                seed: Some(11),
                ..felt_web::GameConfig::default()
            },
        )
        .unwrap();
    controller
        .add_player("g1", "p1".into(), "P1".into(), 500)
        .unwrap();
    controller
        .add_player("g1", "p2".into(), "P2".into(), 500)
        .unwrap();
    clock.advance(std::time::Duration::from_secs(2));

    let actor_view = controller.project("g1", &Viewer::Player("p1".into())).unwrap();
    assert!(actor_view.possible_actions.is_some());
    let other_view = controller.project("g1", &Viewer::Player("p2".into())).unwrap();
    assert!(other_view.possible_actions.is_none());
}
