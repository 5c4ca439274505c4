use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use warp::http;
use warp::reply::{self, Response};
use warp::sse;
use warp::Reply;

use crate::controller::{GameController, GameId};
use crate::errors::IntoErrorResponse;
use crate::events::{EventBus, EventSubscription, GameEvent};

/// GET /api/games/:id/events. Streams the match's events as SSE.
/// The subscription unsubscribes itself when the client goes away.
pub async fn stream_events(
    game_id: GameId,
    controller: GameController,
    bus: EventBus,
) -> Response {
    if let Err(err) = controller.game_summary(&game_id) {
        return err.into_http_response();
    }

    let subscription = bus.subscribe(game_id);
    let stream = subscription_stream(subscription);
    let keep_alive = sse::keep_alive()
        .interval(Duration::from_secs(15))
        .text(":keep-alive\n");

    let reply = sse::reply(keep_alive.stream(stream));
    reply::with_header(reply, http::header::CACHE_CONTROL, "no-cache").into_response()
}

fn subscription_stream(
    mut subscription: EventSubscription,
) -> impl tokio_stream::Stream<Item = Result<sse::Event, Infallible>> {
    // move the receiver into the stream while keeping the subscription
    // alive for its unsubscribe-on-drop
    let (_tx, placeholder) = mpsc::channel(1);
    let receiver = std::mem::replace(&mut subscription.receiver, placeholder);
    let subscription = Arc::new(subscription);

    ReceiverStream::new(receiver).map(move |event| {
        let _keep_alive = Arc::clone(&subscription);
        Ok(render_event(event))
    })
}

fn render_event(event: GameEvent) -> sse::Event {
    match serde_json::to_string(&event) {
        Ok(json) => sse::Event::default().event("game_event").data(json),
        Err(err) => {
            let fallback = serde_json::json!({
                "type": "error",
                "message": format!("failed to serialize game event: {err}")
            })
            .to_string();
            sse::Event::default().event("game_event").data(fallback)
        }
    }
}
