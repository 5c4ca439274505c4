//! Match lifecycle coordination. The controller owns the registry of
//! matches, serializes all mutation per match behind that match's lock,
//! and drives the five timed behaviors through the [`Clock`] seam. Every
//! accepted state change is published on the event bus and appended to
//! the match's replay log before the lock is released, which keeps
//! subscriber order and replay order identical.

use felt_engine::engine::{GameState, HandEvent, Phase};
use felt_engine::errors::GameError;
use felt_engine::player::{PlayerAction, PlayerId};
use felt_engine::rules::ActionKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;

use crate::clock::{CancelHandle, Clock};
use crate::errors::{ErrorSeverity, IntoErrorResponse};
use crate::events::{EventBus, GameEvent};
use crate::metrics::MetricsCollector;
use crate::replay::{ReplayLog, ReplayStore};
use crate::views::{project, GameStateView, Viewer};

pub type GameId = String;

/// Empty matches linger this long before being torn down; a rejoin
/// within the window cancels the teardown.
pub const CLEANUP_DELAY: Duration = Duration::from_secs(5);

fn default_max_players() -> usize {
    10
}
fn default_small_blind() -> u32 {
    10
}
fn default_big_blind() -> u32 {
    20
}
fn default_turn_limit_secs() -> u64 {
    30
}
fn default_hand_delay_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    #[serde(default = "default_small_blind")]
    pub small_blind_amount: u32,
    #[serde(default = "default_big_blind")]
    pub big_blind_amount: u32,
    #[serde(default = "default_turn_limit_secs")]
    pub turn_time_limit_seconds: u64,
    #[serde(default = "default_hand_delay_ms")]
    pub hand_start_delay_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_settings: Option<StartSettings>,
    #[serde(default)]
    pub is_tournament: bool,
    /// Opaque tournament parameters, carried through for the lobby
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournament_settings: Option<serde_json::Value>,
    /// Deck seed; fixed seeds make matches reproducible in tests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_players: default_max_players(),
            small_blind_amount: default_small_blind(),
            big_blind_amount: default_big_blind(),
            turn_time_limit_seconds: default_turn_limit_secs(),
            hand_start_delay_ms: default_hand_delay_ms(),
            start_settings: None,
            is_tournament: false,
            tournament_settings: None,
            seed: None,
        }
    }
}

impl GameConfig {
    fn validate(&self) -> Result<(), ControllerError> {
        if !(2..=10).contains(&self.max_players) {
            return Err(ControllerError::InvalidConfig(format!(
                "maxPlayers {} outside 2..=10",
                self.max_players
            )));
        }
        if self.small_blind_amount == 0 || self.big_blind_amount <= self.small_blind_amount {
            return Err(ControllerError::InvalidConfig(format!(
                "blinds {}/{} are not ascending",
                self.small_blind_amount, self.big_blind_amount
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StartCondition {
    Manual,
    MinPlayers,
    Scheduled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSettings {
    pub condition: StartCondition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_players: Option<usize>,
    /// Unix epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_start_time_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<PlayerId>,
}

/// An agent-submitted action with its client timestamp; the timestamp
/// doubles as the idempotency key against double delivery.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAction {
    pub player_id: PlayerId,
    pub action: PlayerAction,
    #[serde(default)]
    pub timestamp_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub game_id: GameId,
    pub phase: Phase,
    pub hand_number: u64,
    pub player_count: usize,
    pub max_players: usize,
    pub small_blind: u32,
    pub big_blind: u32,
    pub is_running: bool,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("game {0} already exists")]
    DuplicateGameId(GameId),
    #[error("no game with id {0}")]
    UnknownGame(GameId),
    #[error("game {0} is already running")]
    AlreadyRunning(GameId),
    #[error("game {0} has no free seat")]
    GameFull(GameId),
    #[error("requester may not start game {0}")]
    PermissionDenied(GameId),
    #[error("game {0} was frozen after an invariant violation")]
    GameCorrupted(GameId),
    #[error("invalid game config: {0}")]
    InvalidConfig(String),
    #[error("match storage poisoned")]
    StoragePoisoned,
    #[error(transparent)]
    Engine(#[from] GameError),
}

impl IntoErrorResponse for ControllerError {
    fn status_code(&self) -> warp::http::StatusCode {
        use warp::http::StatusCode;
        match self {
            ControllerError::DuplicateGameId(_)
            | ControllerError::AlreadyRunning(_)
            | ControllerError::GameFull(_)
            | ControllerError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            ControllerError::UnknownGame(_) => StatusCode::NOT_FOUND,
            ControllerError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ControllerError::GameCorrupted(_) => StatusCode::CONFLICT,
            ControllerError::StoragePoisoned => StatusCode::INTERNAL_SERVER_ERROR,
            ControllerError::Engine(err) => match err {
                GameError::UnknownPlayer(_) => StatusCode::NOT_FOUND,
                GameError::InvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            },
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ControllerError::DuplicateGameId(_) => "duplicate_game_id",
            ControllerError::UnknownGame(_) => "unknown_game",
            ControllerError::AlreadyRunning(_) => "already_running",
            ControllerError::GameFull(_) => "game_full",
            ControllerError::PermissionDenied(_) => "permission_denied",
            ControllerError::GameCorrupted(_) => "game_corrupted",
            ControllerError::InvalidConfig(_) => "invalid_config",
            ControllerError::StoragePoisoned => "storage_error",
            ControllerError::Engine(err) => match err {
                GameError::GameNotRunning => "game_not_running",
                GameError::InsufficientPlayers { .. } => "insufficient_players",
                GameError::NotYourTurn { .. } => "not_your_turn",
                GameError::IllegalAction(_) => "illegal_action",
                GameError::AmountOutOfRange { .. } => "amount_out_of_range",
                GameError::InsufficientCards { .. } => "insufficient_cards",
                GameError::UnknownPlayer(_) => "unknown_player",
                GameError::InvariantViolation(_) => "invariant_violation",
            },
        }
    }

    fn error_message(&self) -> String {
        self.to_string()
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            ControllerError::StoragePoisoned | ControllerError::GameCorrupted(_) => {
                ErrorSeverity::Critical
            }
            ControllerError::Engine(GameError::InvariantViolation(_)) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Client,
        }
    }
}

struct MatchState {
    engine: GameState,
    started: bool,
    ended: bool,
    corrupt: bool,
    last_action: Option<(PlayerId, i64)>,
    turn_epoch: u64,
    turn_timer: Option<CancelHandle>,
    /// Engine turn serial the running timer was armed for
    turn_armed_serial: Option<u64>,
    cleanup_epoch: u64,
    cleanup_timer: Option<CancelHandle>,
    next_hand_timer: Option<CancelHandle>,
    scheduled_start_timer: Option<CancelHandle>,
}

impl MatchState {
    fn cancel_timers(&mut self) {
        for timer in [
            self.turn_timer.take(),
            self.cleanup_timer.take(),
            self.next_hand_timer.take(),
            self.scheduled_start_timer.take(),
        ]
        .into_iter()
        .flatten()
        {
            timer.cancel();
        }
        self.turn_armed_serial = None;
    }
}

struct MatchHandle {
    id: GameId,
    config: GameConfig,
    state: Mutex<MatchState>,
    replay: Arc<Mutex<ReplayLog>>,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Translates the engine's hand events into bus events. Hole cards are
/// stripped here: the public stream only ever names the receiving seat.
pub(crate) fn map_engine_events(
    game_id: &str,
    hand_number: u64,
    timestamp_ms: i64,
    events: Vec<HandEvent>,
) -> Vec<GameEvent> {
    events
        .into_iter()
        .map(|event| match event {
            HandEvent::HandStarted {
                hand_number,
                dealer,
                small_blind_seat,
                big_blind_seat,
                ..
            } => GameEvent::HandStarted {
                game_id: game_id.to_string(),
                hand_number,
                dealer,
                small_blind_seat,
                big_blind_seat,
            },
            HandEvent::HoleCardsDealt { player_id, .. } => GameEvent::CardsDealt {
                game_id: game_id.to_string(),
                phase: None,
                community: None,
                player_id: Some(player_id),
            },
            HandEvent::PhaseChanged { phase } => GameEvent::PhaseChanged {
                game_id: game_id.to_string(),
                phase,
            },
            HandEvent::CommunityDealt { phase, cards } => GameEvent::CardsDealt {
                game_id: game_id.to_string(),
                phase: Some(phase),
                community: Some(cards),
                player_id: None,
            },
            HandEvent::ActionTaken {
                player_id,
                action,
                applied,
            } => GameEvent::ActionTaken {
                game_id: game_id.to_string(),
                hand_number,
                player_id,
                action,
                applied,
                timestamp_ms,
            },
            HandEvent::BetsCollected { pot_total } => GameEvent::BetCollected {
                game_id: game_id.to_string(),
                pot_total,
            },
            HandEvent::SeatEliminated { player_id } => GameEvent::PlayerEliminated {
                game_id: game_id.to_string(),
                player_id,
            },
            HandEvent::ShowdownResolved { reveals, awards } => GameEvent::Showdown {
                game_id: game_id.to_string(),
                hand_number,
                reveals,
                awards,
            },
            HandEvent::HandCompleted { winners, deltas } => GameEvent::HandComplete {
                game_id: game_id.to_string(),
                hand_number,
                winners,
                deltas,
            },
        })
        .collect()
}

/// The per-process match coordinator. Cheap to clone; all clones share
/// the same registry, bus, clock and replay store.
#[derive(Clone)]
pub struct GameController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    matches: RwLock<HashMap<GameId, Arc<MatchHandle>>>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
    replays: Arc<ReplayStore>,
    metrics: MetricsCollector,
}

impl GameController {
    pub fn new(
        bus: EventBus,
        clock: Arc<dyn Clock>,
        replays: Arc<ReplayStore>,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                matches: RwLock::new(HashMap::new()),
                bus,
                clock,
                replays,
                metrics,
            }),
        }
    }

    pub fn create_game(&self, game_id: GameId, config: GameConfig) -> Result<(), ControllerError> {
        ControllerInner::create_game(&self.inner, game_id, config)
    }

    pub fn add_player(
        &self,
        game_id: &str,
        player_id: PlayerId,
        name: String,
        chip_stack: i64,
    ) -> Result<(), ControllerError> {
        ControllerInner::add_player(&self.inner, game_id, player_id, name, chip_stack)
    }

    pub fn remove_player(&self, game_id: &str, player_id: &str) -> Result<(), ControllerError> {
        ControllerInner::remove_player(&self.inner, game_id, player_id)
    }

    pub fn start_game(
        &self,
        game_id: &str,
        requester: Option<&str>,
    ) -> Result<(), ControllerError> {
        ControllerInner::start_game(&self.inner, game_id, requester)
    }

    pub fn start_hand(&self, game_id: &str) -> Result<(), ControllerError> {
        ControllerInner::start_hand(&self.inner, game_id)
    }

    pub fn process_action(
        &self,
        game_id: &str,
        submitted: SubmittedAction,
    ) -> Result<(), ControllerError> {
        ControllerInner::process_action(&self.inner, game_id, submitted)
    }

    pub fn project(&self, game_id: &str, viewer: &Viewer) -> Result<GameStateView, ControllerError> {
        self.inner.project(game_id, viewer)
    }

    pub fn list_games(&self) -> Vec<GameSummary> {
        self.inner.list_games(false)
    }

    pub fn available_games(&self) -> Vec<GameSummary> {
        self.inner.list_games(true)
    }

    pub fn game_summary(&self, game_id: &str) -> Result<GameSummary, ControllerError> {
        self.inner.game_summary(game_id)
    }

    pub fn config(&self, game_id: &str) -> Result<GameConfig, ControllerError> {
        Ok(self.inner.get_match(game_id)?.config.clone())
    }

    pub fn has_player(&self, game_id: &str, player_id: &str) -> bool {
        self.inner
            .get_match(game_id)
            .ok()
            .and_then(|handle| {
                let state = handle.state.lock().ok()?;
                Some(state.engine.contains_player(player_id))
            })
            .unwrap_or(false)
    }

    pub fn remove_game(&self, game_id: &str) -> Result<(), ControllerError> {
        ControllerInner::remove_game(&self.inner, game_id, "deleted")
    }

    /// Overwrites a seat's stack between hands; test support for
    /// elimination scenarios.
    #[doc(hidden)]
    pub fn set_stack_for_test(
        &self,
        game_id: &str,
        player_id: &str,
        stack: u32,
    ) -> Result<(), ControllerError> {
        let handle = self.inner.get_match(game_id)?;
        let mut state = handle
            .state
            .lock()
            .map_err(|_| ControllerError::StoragePoisoned)?;
        state.engine.set_stack_for_test(player_id, stack)?;
        Ok(())
    }

    /// Cancels every timer and drops every match. Replays survive.
    pub fn destroy(&self) {
        self.inner.destroy();
    }
}

impl ControllerInner {
    fn get_match(&self, game_id: &str) -> Result<Arc<MatchHandle>, ControllerError> {
        let guard = self
            .matches
            .read()
            .map_err(|_| ControllerError::StoragePoisoned)?;
        guard
            .get(game_id)
            .cloned()
            .ok_or_else(|| ControllerError::UnknownGame(game_id.to_string()))
    }

    fn lock_state<'a>(
        &self,
        handle: &'a MatchHandle,
    ) -> Result<std::sync::MutexGuard<'a, MatchState>, ControllerError> {
        handle
            .state
            .lock()
            .map_err(|_| ControllerError::StoragePoisoned)
    }

    fn create_game(
        this: &Arc<Self>,
        game_id: GameId,
        config: GameConfig,
    ) -> Result<(), ControllerError> {
        config.validate()?;
        let seed = config
            .seed
            .unwrap_or_else(|| chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0) as u64);
        let engine = GameState::new(config.small_blind_amount, config.big_blind_amount, seed);
        let replay = Arc::new(Mutex::new(ReplayLog::new(
            game_id.clone(),
            config.small_blind_amount,
            config.big_blind_amount,
        )));

        let handle = Arc::new(MatchHandle {
            id: game_id.clone(),
            config: config.clone(),
            state: Mutex::new(MatchState {
                engine,
                started: false,
                ended: false,
                corrupt: false,
                last_action: None,
                turn_epoch: 0,
                turn_timer: None,
                turn_armed_serial: None,
                cleanup_epoch: 0,
                cleanup_timer: None,
                next_hand_timer: None,
                scheduled_start_timer: None,
            }),
            replay: Arc::clone(&replay),
        });

        {
            let mut guard = this
                .matches
                .write()
                .map_err(|_| ControllerError::StoragePoisoned)?;
            if guard.contains_key(&game_id) {
                return Err(ControllerError::DuplicateGameId(game_id));
            }
            guard.insert(game_id.clone(), Arc::clone(&handle));
        }
        this.replays.register(game_id.clone(), replay);
        this.metrics.game_created();

        tracing::info!(game_id = %game_id, max_players = config.max_players, "match created");

        // scheduled starts arm their timer at creation
        if let Some(settings) = &config.start_settings {
            if settings.condition == StartCondition::Scheduled {
                if let Some(start_ms) = settings.scheduled_start_time_ms {
                    let delay = Duration::from_millis((start_ms - now_ms()).max(0) as u64);
                    let weak = Arc::downgrade(this);
                    let id = game_id.clone();
                    let timer = this.clock.schedule_after(
                        delay,
                        Box::new(move || {
                            if let Some(inner) = weak.upgrade() {
                                ControllerInner::run_scheduled_start(&inner, &id);
                            }
                        }),
                    );
                    if let Ok(mut state) = handle.state.lock() {
                        state.scheduled_start_timer = Some(timer);
                    }
                }
            }
        }

        Ok(())
    }

    fn add_player(
        this: &Arc<Self>,
        game_id: &str,
        player_id: PlayerId,
        name: String,
        chip_stack: i64,
    ) -> Result<(), ControllerError> {
        let handle = this.get_match(game_id)?;
        let mut state = this.lock_state(&handle)?;
        if state.corrupt {
            return Err(ControllerError::GameCorrupted(handle.id.clone()));
        }
        if state.engine.seat_count() >= handle.config.max_players {
            return Err(ControllerError::GameFull(handle.id.clone()));
        }

        // non-positive buy-ins are coerced so seat invariants hold
        let stack = chip_stack.clamp(1, i64::from(u32::MAX)) as u32;
        state.engine.add_seat(player_id.clone(), name.clone(), stack)?;

        // a rejoin within the cleanup window keeps the match alive
        if let Some(timer) = state.cleanup_timer.take() {
            timer.cancel();
            state.cleanup_epoch += 1;
            tracing::debug!(game_id = %handle.id, "cleanup cancelled by join");
        }

        let joined = GameEvent::PlayerJoined {
            game_id: handle.id.clone(),
            player_id,
            name,
            chip_stack: stack,
        };
        this.record_and_publish(&handle, &state.engine, std::slice::from_ref(&joined));

        if this.start_trigger_satisfied(&handle, &state) {
            ControllerInner::schedule_next_hand(this, &handle, &mut state);
        }
        Ok(())
    }

    fn start_trigger_satisfied(&self, handle: &MatchHandle, state: &MatchState) -> bool {
        if state.started
            || state.ended
            || state.next_hand_timer.is_some()
            || state.engine.phase() != Phase::WaitingForPlayers
        {
            return false;
        }
        let seats = state.engine.seat_count();
        match &handle.config.start_settings {
            None => seats >= 2,
            Some(settings) => match settings.condition {
                StartCondition::MinPlayers => seats >= settings.min_players.unwrap_or(2).max(2),
                StartCondition::Manual | StartCondition::Scheduled => false,
            },
        }
    }

    fn remove_player(
        this: &Arc<Self>,
        game_id: &str,
        player_id: &str,
    ) -> Result<(), ControllerError> {
        let handle = this.get_match(game_id)?;
        let mut state = this.lock_state(&handle)?;

        let engine_events = state.engine.retire_seat(player_id)?;
        let hand_number = state.engine.hand_number();
        let mut events = map_engine_events(&handle.id, hand_number, now_ms(), engine_events);
        events.push(GameEvent::PlayerLeft {
            game_id: handle.id.clone(),
            player_id: player_id.to_string(),
        });
        this.record_and_publish(&handle, &state.engine, &events);
        ControllerInner::after_state_change(this, &handle, &mut state);

        if state.engine.seat_count() == 0 && !state.ended {
            ControllerInner::arm_cleanup_timer(this, &handle, &mut state);
        }
        Ok(())
    }

    /// Last-empty-wins: every empty transition re-arms a fresh timer and
    /// invalidates the previous one.
    fn arm_cleanup_timer(this: &Arc<Self>, handle: &Arc<MatchHandle>, state: &mut MatchState) {
        if let Some(timer) = state.cleanup_timer.take() {
            timer.cancel();
        }
        state.cleanup_epoch += 1;
        let epoch = state.cleanup_epoch;
        let weak = Arc::downgrade(this);
        let game_id = handle.id.clone();
        state.cleanup_timer = Some(this.clock.schedule_after(
            CLEANUP_DELAY,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    ControllerInner::run_cleanup(&inner, &game_id, epoch);
                }
            }),
        ));
        tracing::debug!(game_id = %handle.id, "cleanup timer armed");
    }

    fn run_cleanup(this: &Arc<Self>, game_id: &str, epoch: u64) {
        let Ok(handle) = this.get_match(game_id) else {
            return;
        };
        {
            let Ok(mut state) = handle.state.lock() else {
                return;
            };
            if epoch != state.cleanup_epoch || state.engine.seat_count() > 0 {
                return; // raced with a rejoin
            }
            state.cleanup_timer = None;
        }
        let _ = ControllerInner::remove_game(this, game_id, "abandoned");
    }

    fn start_game(
        this: &Arc<Self>,
        game_id: &str,
        requester: Option<&str>,
    ) -> Result<(), ControllerError> {
        let handle = this.get_match(game_id)?;
        let mut state = this.lock_state(&handle)?;
        if state.corrupt {
            return Err(ControllerError::GameCorrupted(handle.id.clone()));
        }
        if state.engine.phase() != Phase::WaitingForPlayers {
            return Err(ControllerError::AlreadyRunning(handle.id.clone()));
        }
        if let Some(creator) = handle
            .config
            .start_settings
            .as_ref()
            .and_then(|s| s.creator_id.as_deref())
        {
            if requester != Some(creator) {
                return Err(ControllerError::PermissionDenied(handle.id.clone()));
            }
        }
        let funded = state.engine.funded_seat_count();
        if funded < 2 {
            return Err(GameError::InsufficientPlayers {
                seated: funded,
                required: 2,
            }
            .into());
        }
        ControllerInner::begin_hand(this, &handle, &mut state)
    }

    fn start_hand(this: &Arc<Self>, game_id: &str) -> Result<(), ControllerError> {
        let handle = this.get_match(game_id)?;
        let mut state = this.lock_state(&handle)?;
        if state.corrupt {
            return Err(ControllerError::GameCorrupted(handle.id.clone()));
        }
        ControllerInner::begin_hand(this, &handle, &mut state)
    }

    fn begin_hand(
        this: &Arc<Self>,
        handle: &Arc<MatchHandle>,
        state: &mut MatchState,
    ) -> Result<(), ControllerError> {
        if !state.started {
            state.started = true;
            this.metrics.game_started();
            let players: Vec<PlayerId> = state
                .engine
                .snapshot()
                .seats
                .iter()
                .map(|s| s.player_id.clone())
                .collect();
            let event = GameEvent::GameStarted {
                game_id: handle.id.clone(),
                players,
            };
            this.record_and_publish(handle, &state.engine, std::slice::from_ref(&event));
        }

        let engine_events = ControllerInner::run_engine(this, handle, state, GameState::start_hand)?;
        let hand_number = state.engine.hand_number();
        let events = map_engine_events(&handle.id, hand_number, now_ms(), engine_events);
        this.record_and_publish(handle, &state.engine, &events);
        ControllerInner::after_state_change(this, handle, state);
        Ok(())
    }

    fn process_action(
        this: &Arc<Self>,
        game_id: &str,
        submitted: SubmittedAction,
    ) -> Result<(), ControllerError> {
        let handle = this.get_match(game_id)?;
        let mut state = this.lock_state(&handle)?;
        if state.corrupt {
            return Err(ControllerError::GameCorrupted(handle.id.clone()));
        }

        let timestamp = submitted.timestamp_ms.unwrap_or_else(now_ms);
        if state.last_action == Some((submitted.player_id.clone(), timestamp)) {
            return Err(GameError::IllegalAction(
                "duplicate action (same actor and timestamp)".into(),
            )
            .into());
        }

        let player_id = submitted.player_id.clone();
        let action = submitted.action.clone();
        let engine_events =
            ControllerInner::run_engine(this, &handle, &mut state, move |engine| {
                engine.apply_action(&player_id, action)
            })?;

        state.last_action = Some((submitted.player_id, timestamp));
        let hand_number = state.engine.hand_number();
        let events = map_engine_events(&handle.id, hand_number, timestamp, engine_events);
        this.record_and_publish(&handle, &state.engine, &events);
        ControllerInner::after_state_change(this, &handle, &mut state);
        Ok(())
    }

    /// Runs one engine mutation, classifying a fatal invariant failure:
    /// the match freezes, the replay is marked corrupt, and the bus gets
    /// a terminal `game_ended`.
    fn run_engine<F>(
        this: &Arc<Self>,
        handle: &Arc<MatchHandle>,
        state: &mut MatchState,
        op: F,
    ) -> Result<Vec<HandEvent>, ControllerError>
    where
        F: FnOnce(&mut GameState) -> Result<Vec<HandEvent>, GameError>,
    {
        match op(&mut state.engine) {
            Ok(events) => Ok(events),
            Err(GameError::InvariantViolation(detail)) => {
                tracing::error!(game_id = %handle.id, %detail, "invariant violation, freezing match");
                state.corrupt = true;
                state.cancel_timers();
                if let Ok(mut log) = handle.replay.lock() {
                    log.mark_corrupt();
                    log.end_game();
                }
                let ended = GameEvent::GameEnded {
                    game_id: handle.id.clone(),
                    reason: "invariant".into(),
                };
                this.record_and_publish(handle, &state.engine, std::slice::from_ref(&ended));
                Err(GameError::InvariantViolation(detail).into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Timer upkeep and hand scheduling after any accepted mutation.
    fn after_state_change(this: &Arc<Self>, handle: &Arc<MatchHandle>, state: &mut MatchState) {
        match state.engine.to_act_player().cloned() {
            Some(player) => {
                // arm on every new turn serial: a seat keeping the turn
                // across a street boundary still gets a fresh window,
                // while a bystander joining or leaving mid-turn does
                // not restart the current actor's clock
                let serial = state.engine.turn_serial();
                if state.turn_armed_serial != Some(serial) {
                    ControllerInner::arm_turn_timer(this, handle, state, player, serial);
                }
            }
            None => {
                if let Some(timer) = state.turn_timer.take() {
                    timer.cancel();
                }
                state.turn_armed_serial = None;
            }
        }

        if state.engine.phase() == Phase::HandComplete
            && !state.ended
            && state.next_hand_timer.is_none()
        {
            if state.engine.funded_seat_count() >= 2 {
                ControllerInner::schedule_next_hand(this, handle, state);
            } else {
                this.finish_game(handle, state, "insufficient_players");
            }
        }
    }

    fn arm_turn_timer(
        this: &Arc<Self>,
        handle: &Arc<MatchHandle>,
        state: &mut MatchState,
        player: PlayerId,
        serial: u64,
    ) {
        if let Some(timer) = state.turn_timer.take() {
            timer.cancel();
        }
        state.turn_epoch += 1;
        let epoch = state.turn_epoch;
        let weak = Arc::downgrade(this);
        let game_id = handle.id.clone();
        let limit = Duration::from_secs(handle.config.turn_time_limit_seconds);
        state.turn_timer = Some(this.clock.schedule_after(
            limit,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    ControllerInner::run_turn_timeout(&inner, &game_id, &player, epoch);
                }
            }),
        ));
        state.turn_armed_serial = Some(serial);
    }

    fn run_turn_timeout(this: &Arc<Self>, game_id: &str, player: &str, epoch: u64) {
        let Ok(handle) = this.get_match(game_id) else {
            return;
        };
        let Ok(mut state) = handle.state.lock() else {
            return;
        };
        if state.corrupt || state.ended || epoch != state.turn_epoch {
            return; // stale fire, discarded silently
        }
        if state.engine.to_act_player().map(String::as_str) != Some(player) {
            return;
        }
        state.turn_timer = None;
        state.turn_armed_serial = None;

        // a free check is preferred over folding the seat out
        let action = if state
            .engine
            .possible_actions_for(player)
            .iter()
            .any(|a| a.kind == ActionKind::Check)
        {
            PlayerAction::Check
        } else {
            PlayerAction::Fold
        };

        tracing::info!(game_id = %handle.id, player_id = %player, action = ?action, "turn timed out");
        let timeout = GameEvent::TurnTimeout {
            game_id: handle.id.clone(),
            player_id: player.to_string(),
        };
        this.record_and_publish(&handle, &state.engine, std::slice::from_ref(&timeout));

        let player_owned = player.to_string();
        match ControllerInner::run_engine(this, &handle, &mut state, move |engine| {
            engine.apply_action(&player_owned, action)
        }) {
            Ok(engine_events) => {
                let hand_number = state.engine.hand_number();
                let events = map_engine_events(&handle.id, hand_number, now_ms(), engine_events);
                this.record_and_publish(&handle, &state.engine, &events);
                ControllerInner::after_state_change(this, &handle, &mut state);
            }
            Err(err) => {
                tracing::debug!(game_id = %handle.id, error = %err, "synthetic action rejected");
            }
        }
    }

    fn schedule_next_hand(this: &Arc<Self>, handle: &Arc<MatchHandle>, state: &mut MatchState) {
        let delay = Duration::from_millis(handle.config.hand_start_delay_ms);
        let weak = Arc::downgrade(this);
        let game_id = handle.id.clone();
        state.next_hand_timer = Some(this.clock.schedule_after(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    ControllerInner::run_scheduled_hand(&inner, &game_id);
                }
            }),
        ));
    }

    fn run_scheduled_hand(this: &Arc<Self>, game_id: &str) {
        let Ok(handle) = this.get_match(game_id) else {
            return;
        };
        let Ok(mut state) = handle.state.lock() else {
            return;
        };
        state.next_hand_timer = None;
        if state.corrupt || state.ended || state.engine.phase().is_betting() {
            return;
        }
        if state.engine.funded_seat_count() < 2 {
            return;
        }
        if let Err(err) = ControllerInner::begin_hand(this, &handle, &mut state) {
            tracing::warn!(game_id = %game_id, error = %err, "scheduled hand failed to start");
        }
    }

    fn run_scheduled_start(this: &Arc<Self>, game_id: &str) {
        let Ok(handle) = this.get_match(game_id) else {
            return;
        };
        let Ok(mut state) = handle.state.lock() else {
            return;
        };
        state.scheduled_start_timer = None;
        if state.started || state.ended || state.corrupt {
            return;
        }
        if state.engine.funded_seat_count() < 2 {
            tracing::warn!(game_id = %game_id, "scheduled start skipped, not enough players");
            return;
        }
        if let Err(err) = ControllerInner::begin_hand(this, &handle, &mut state) {
            tracing::warn!(game_id = %game_id, error = %err, "scheduled start failed");
        }
    }

    /// Ends a game in place (the match object stays for inspection).
    fn finish_game(&self, handle: &Arc<MatchHandle>, state: &mut MatchState, reason: &str) {
        state.ended = true;
        state.cancel_timers();
        let event = GameEvent::GameEnded {
            game_id: handle.id.clone(),
            reason: reason.to_string(),
        };
        self.record_and_publish(handle, &state.engine, std::slice::from_ref(&event));
        if let Ok(mut log) = handle.replay.lock() {
            log.end_game();
        }
        // finished replays flow to the durable sink when one is attached
        match self.replays.save(&handle.id) {
            Ok(()) | Err(crate::replay::ReplayError::NoSink) => {}
            Err(err) => {
                tracing::warn!(game_id = %handle.id, error = %err, "replay auto-save failed")
            }
        }
        tracing::info!(game_id = %handle.id, reason, "game ended");
    }

    fn remove_game(this: &Arc<Self>, game_id: &str, reason: &str) -> Result<(), ControllerError> {
        let handle = {
            let mut guard = this
                .matches
                .write()
                .map_err(|_| ControllerError::StoragePoisoned)?;
            guard
                .remove(game_id)
                .ok_or_else(|| ControllerError::UnknownGame(game_id.to_string()))?
        };
        {
            let mut state = this.lock_state(&handle)?;
            if !state.ended {
                this.finish_game(&handle, &mut state, reason);
            }
        }
        this.bus.drop_game(&handle.id);
        this.metrics.game_removed();
        Ok(())
    }

    fn project(&self, game_id: &str, viewer: &Viewer) -> Result<GameStateView, ControllerError> {
        let handle = self.get_match(game_id)?;
        let state = self.lock_state(&handle)?;
        let snapshot = state.engine.snapshot();
        let possible = snapshot
            .to_act
            .as_deref()
            .map(|actor| state.engine.possible_actions_for(actor))
            .unwrap_or_default();
        Ok(project(&handle.id, &snapshot, &possible, viewer))
    }

    fn list_games(&self, only_available: bool) -> Vec<GameSummary> {
        let handles: Vec<Arc<MatchHandle>> = match self.matches.read() {
            Ok(guard) => guard.values().cloned().collect(),
            Err(_) => return Vec::new(),
        };
        let mut summaries: Vec<GameSummary> = handles
            .iter()
            .filter_map(|handle| summarize(handle).ok())
            .filter(|s| !only_available || s.player_count < s.max_players)
            .collect();
        summaries.sort_by(|a, b| a.game_id.cmp(&b.game_id));
        summaries
    }

    fn game_summary(&self, game_id: &str) -> Result<GameSummary, ControllerError> {
        let handle = self.get_match(game_id)?;
        summarize(&handle)
    }

    fn record_and_publish(&self, handle: &MatchHandle, engine: &GameState, events: &[GameEvent]) {
        if events.is_empty() {
            return;
        }
        if let Ok(mut log) = handle.replay.lock() {
            for event in events {
                log.log_event(event, || engine.snapshot());
            }
        }
        for event in events {
            self.bus.broadcast(&handle.id, event);
        }
    }

    fn destroy(&self) {
        let handles: Vec<Arc<MatchHandle>> = match self.matches.write() {
            Ok(mut guard) => guard.drain().map(|(_, h)| h).collect(),
            Err(poisoned) => poisoned.into_inner().drain().map(|(_, h)| h).collect(),
        };
        for handle in handles {
            if let Ok(mut state) = handle.state.lock() {
                state.cancel_timers();
                state.ended = true;
            }
            self.bus.drop_game(&handle.id);
            self.metrics.game_removed();
        }
    }
}

fn summarize(handle: &MatchHandle) -> Result<GameSummary, ControllerError> {
    let state = handle
        .state
        .lock()
        .map_err(|_| ControllerError::StoragePoisoned)?;
    Ok(GameSummary {
        game_id: handle.id.clone(),
        phase: state.engine.phase(),
        hand_number: state.engine.hand_number(),
        player_count: state.engine.seat_count(),
        max_players: handle.config.max_players,
        small_blind: handle.config.small_blind_amount,
        big_blind: handle.config.big_blind_amount,
        is_running: state.started && !state.ended,
    })
}
