//! # felt_web: the felt match server
//!
//! Multi-tenant Texas Hold'em for programmatic agents: the game
//! controller and its timers, the in-process event bus, the replay
//! recorder and analyzer, per-viewer state projection, and the
//! HTTP/SSE/WebSocket surface over all of it. The card and betting
//! semantics live in the `felt-engine` crate; this crate owns
//! everything concurrent and everything on the wire.

pub mod analyzer;
pub mod clock;
pub mod controller;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod protocol;
pub mod replay;
pub mod server;
pub mod views;

pub use analyzer::{ReplayAnalysis, ReplayAnalyzer};
pub use clock::{CancelHandle, Clock, ManualClock, TokioClock};
pub use controller::{
    ControllerError, GameConfig, GameController, GameId, GameSummary, StartCondition,
    StartSettings, SubmittedAction,
};
pub use errors::{ApiEnvelope, ErrorSeverity, IntoErrorResponse};
pub use events::{EventBus, EventSubscription, GameEvent};
pub use logging::init_logging;
pub use metrics::{MetricsCollector, StatsSnapshot};
pub use protocol::{ClientMessage, ServerMessage};
pub use replay::{JsonFileSink, ReplayData, ReplayError, ReplayLog, ReplaySink, ReplayStore};
pub use server::{AppContext, ServerConfig, ServerError, ServerHandle, WebServer};
pub use views::{GameStateView, Viewer};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_provides_shared_components() {
        let context = AppContext::with_clock(
            ServerConfig::for_tests(),
            std::sync::Arc::new(ManualClock::new()),
        );
        assert_eq!(context.bus().subscriber_count(), 0);
        assert!(context.controller().list_games().is_empty());
        assert_eq!(context.metrics().snapshot().active_games, 0);
    }
}
