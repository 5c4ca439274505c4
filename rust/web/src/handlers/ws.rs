//! The bidirectional agent socket. One task per connection: a short
//! identification phase binds the socket to a seat, then the main loop
//! multiplexes inbound agent messages with the match's event stream.
//! A transport drop leaves the seat intact; `reconnect` resumes it.

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use uuid::Uuid;
use warp::ws::{Message, WebSocket};

use crate::controller::{GameController, GameId, SubmittedAction};
use crate::errors::IntoErrorResponse;
use crate::events::{EventBus, EventSubscription};
use crate::metrics::MetricsCollector;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::views::Viewer;

struct BotSession {
    player_id: String,
    game_id: GameId,
    turn_limit_seconds: u64,
    subscription: EventSubscription,
}

type WsSink = SplitSink<WebSocket, Message>;

async fn send(tx: &mut WsSink, message: &ServerMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(json) => tx.send(Message::text(json)).await.is_ok(),
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize server message");
            true
        }
    }
}

async fn send_error(tx: &mut WsSink, code: &str, message: impl Into<String>) -> bool {
    send(
        tx,
        &ServerMessage::Error {
            code: code.to_string(),
            message: message.into(),
        },
    )
    .await
}

pub async fn client_connection(
    ws: WebSocket,
    controller: GameController,
    bus: EventBus,
    metrics: MetricsCollector,
) {
    metrics.client_connected();
    let (mut tx, mut rx) = ws.split();

    if let Some(session) = identify_phase(&mut tx, &mut rx, &controller, &bus).await {
        run_session(&mut tx, &mut rx, &controller, session).await;
    }

    metrics.client_disconnected();
}

/// Waits for `identify` or `reconnect` and binds the socket to a seat.
async fn identify_phase(
    tx: &mut WsSink,
    rx: &mut (impl futures::Stream<Item = Result<Message, warp::Error>> + Unpin),
    controller: &GameController,
    bus: &EventBus,
) -> Option<BotSession> {
    while let Some(Ok(message)) = rx.next().await {
        if message.is_close() {
            return None;
        }
        let Ok(text) = message.to_str() else { continue };
        let parsed: ClientMessage = match serde_json::from_str(text) {
            Ok(parsed) => parsed,
            Err(err) => {
                send_error(tx, "malformed_message", err.to_string()).await;
                continue;
            }
        };

        match parsed {
            ClientMessage::Identify {
                bot_name,
                game_id,
                chip_stack,
            } => {
                let player_id = Uuid::new_v4().to_string();
                match controller.add_player(&game_id, player_id.clone(), bot_name, chip_stack) {
                    Ok(()) => {
                        return bind_session(tx, controller, bus, game_id, player_id).await;
                    }
                    Err(err) => {
                        send_error(tx, err.error_code(), err.to_string()).await;
                    }
                }
            }
            ClientMessage::Reconnect { player_id, game_id } => {
                if controller.has_player(&game_id, &player_id) {
                    return bind_session(tx, controller, bus, game_id, player_id).await;
                }
                send_error(tx, "unknown_player", "no such seat to resume").await;
            }
            ClientMessage::Ping => {}
            ClientMessage::Leave => return None,
            ClientMessage::Action { .. } => {
                send_error(tx, "not_identified", "identify before acting").await;
            }
        }
    }
    None
}

async fn bind_session(
    tx: &mut WsSink,
    controller: &GameController,
    bus: &EventBus,
    game_id: GameId,
    player_id: String,
) -> Option<BotSession> {
    let turn_limit_seconds = controller
        .config(&game_id)
        .map(|c| c.turn_time_limit_seconds)
        .unwrap_or(30);
    let subscription = bus.subscribe(game_id.clone());

    if !send(
        tx,
        &ServerMessage::IdentificationSuccess {
            player_id: player_id.clone(),
        },
    )
    .await
    {
        return None;
    }
    if let Ok(view) = controller.project(&game_id, &Viewer::Player(player_id.clone())) {
        send(tx, &ServerMessage::GameState { game_state: view }).await;
    }

    tracing::info!(game_id = %game_id, player_id = %player_id, "agent socket bound");
    Some(BotSession {
        player_id,
        game_id,
        turn_limit_seconds,
        subscription,
    })
}

async fn run_session(
    tx: &mut WsSink,
    rx: &mut (impl futures::Stream<Item = Result<Message, warp::Error>> + Unpin),
    controller: &GameController,
    mut session: BotSession,
) {
    // on a resume mid-hand the seat may already hold the turn
    let mut was_my_turn = false;
    if let Ok(view) = controller.project(
        &session.game_id,
        &Viewer::Player(session.player_id.clone()),
    ) {
        was_my_turn = view.current_player_to_act.as_deref() == Some(session.player_id.as_str());
        if was_my_turn {
            send(
                tx,
                &ServerMessage::TurnStart {
                    time_limit_seconds: session.turn_limit_seconds,
                },
            )
            .await;
        }
    }

    loop {
        tokio::select! {
            inbound = rx.next() => {
                let Some(Ok(message)) = inbound else { break };
                if message.is_close() {
                    break;
                }
                let Ok(text) = message.to_str() else { continue };
                let parsed: ClientMessage = match serde_json::from_str(text) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        send_error(tx, "malformed_message", err.to_string()).await;
                        continue;
                    }
                };
                match parsed {
                    ClientMessage::Action { action, timestamp_ms } => {
                        let submitted = SubmittedAction {
                            player_id: session.player_id.clone(),
                            action: action.clone(),
                            timestamp_ms,
                        };
                        match controller.process_action(&session.game_id, submitted) {
                            Ok(()) => {
                                send(tx, &ServerMessage::ActionSuccess { action }).await;
                            }
                            Err(err) => {
                                send_error(tx, err.error_code(), err.to_string()).await;
                            }
                        }
                    }
                    ClientMessage::Leave => {
                        if let Err(err) =
                            controller.remove_player(&session.game_id, &session.player_id)
                        {
                            tracing::debug!(error = %err, "leave for already-removed seat");
                        }
                        send(
                            tx,
                            &ServerMessage::Disconnect {
                                reason: "left".into(),
                            },
                        )
                        .await;
                        break;
                    }
                    ClientMessage::Ping => {}
                    ClientMessage::Identify { .. } | ClientMessage::Reconnect { .. } => {
                        send_error(tx, "already_identified", "socket already bound to a seat")
                            .await;
                    }
                }
            }
            event = session.subscription.receiver.recv() => {
                let Some(event) = event else {
                    // the match was torn down
                    send(
                        tx,
                        &ServerMessage::Disconnect {
                            reason: "game_closed".into(),
                        },
                    )
                    .await;
                    break;
                };
                if !send(tx, &ServerMessage::GameEvent { event }).await {
                    break;
                }
                // every event is followed by a fresh projection; the turn
                // prompt fires on the rising edge only, after the agent has
                // already observed the hand's events
                if let Ok(view) = controller.project(
                    &session.game_id,
                    &Viewer::Player(session.player_id.clone()),
                ) {
                    let my_turn = view.current_player_to_act.as_deref()
                        == Some(session.player_id.as_str());
                    send(tx, &ServerMessage::GameState { game_state: view }).await;
                    if my_turn && !was_my_turn {
                        send(
                            tx,
                            &ServerMessage::TurnStart {
                                time_limit_seconds: session.turn_limit_seconds,
                            },
                        )
                        .await;
                    }
                    was_my_turn = my_turn;
                }
            }
        }
    }
}
