//! Append-only replay recording. Every published event lands here with a
//! gap-free sequence id; every Nth event (and every hand start) carries a
//! full state snapshot so the analyzer can jump without re-running the
//! whole log. The wire format of [`ReplayData`] is its in-memory
//! structure verbatim.

use chrono::{DateTime, Utc};
use felt_engine::engine::{Phase, TableSnapshot};
use felt_engine::player::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;

use crate::controller::GameId;
use crate::errors::{ErrorSeverity, IntoErrorResponse};
use crate::events::GameEvent;

pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayEvent {
    /// Monotonic from 1, gap-free per match
    pub sequence_id: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hand_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<PlayerId>,
    pub event: GameEvent,
    /// Inline checkpoint: the full unmasked state after this event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_state_snapshot: Option<TableSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayMetadata {
    pub player_names: HashMap<PlayerId, String>,
    pub small_blind: u32,
    pub big_blind: u32,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub total_events: u64,
    pub total_actions: u64,
    pub hand_count: u64,
    /// Set when a fatal invariant violation aborted the match
    #[serde(default)]
    pub corrupt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandCheckpoint {
    pub hand_number: u64,
    pub sequence_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayData {
    pub game_id: GameId,
    pub metadata: ReplayMetadata,
    pub events: Vec<ReplayEvent>,
    pub hand_checkpoints: Vec<HandCheckpoint>,
}

impl ReplayData {
    /// Sequence ids must be exactly 1..=N. Anything else is malformed.
    pub fn validate(&self) -> Result<(), ReplayError> {
        for (i, event) in self.events.iter().enumerate() {
            let expected = i as u64 + 1;
            if event.sequence_id != expected {
                return Err(ReplayError::InvalidReplay(format!(
                    "sequence id {} at position {} (expected {})",
                    event.sequence_id, i, expected
                )));
            }
        }
        if self.metadata.total_events != self.events.len() as u64 {
            return Err(ReplayError::InvalidReplay(format!(
                "metadata counts {} events, log holds {}",
                self.metadata.total_events,
                self.events.len()
            )));
        }
        Ok(())
    }

    /// Events belonging to one hand, bounded by its `hand_started` and
    /// the start of the following hand.
    pub fn hand_events(&self, hand_number: u64) -> Vec<&ReplayEvent> {
        self.events
            .iter()
            .filter(|e| e.hand_number == Some(hand_number))
            .collect()
    }
}

/// Per-match append-only recorder.
#[derive(Debug)]
pub struct ReplayLog {
    data: ReplayData,
    checkpoint_interval: u64,
    current_hand: Option<u64>,
    current_phase: Option<Phase>,
}

impl ReplayLog {
    pub fn new(game_id: GameId, small_blind: u32, big_blind: u32) -> Self {
        Self::with_checkpoint_interval(game_id, small_blind, big_blind, DEFAULT_CHECKPOINT_INTERVAL)
    }

    pub fn with_checkpoint_interval(
        game_id: GameId,
        small_blind: u32,
        big_blind: u32,
        checkpoint_interval: u64,
    ) -> Self {
        Self {
            data: ReplayData {
                game_id,
                metadata: ReplayMetadata {
                    player_names: HashMap::new(),
                    small_blind,
                    big_blind,
                    start_time: Utc::now(),
                    end_time: None,
                    total_events: 0,
                    total_actions: 0,
                    hand_count: 0,
                    corrupt: false,
                },
                events: Vec::new(),
                hand_checkpoints: Vec::new(),
            },
            checkpoint_interval: checkpoint_interval.max(1),
            current_hand: None,
            current_phase: None,
        }
    }

    /// Appends one event, assigning the next sequence id. The snapshot
    /// closure is only invoked when this event is a checkpoint.
    pub fn log_event(&mut self, event: &GameEvent, snapshot: impl FnOnce() -> TableSnapshot) {
        let sequence_id = self.data.events.len() as u64 + 1;

        match event {
            GameEvent::HandStarted { hand_number, .. } => {
                self.current_hand = Some(*hand_number);
                self.current_phase = None;
                self.data.metadata.hand_count += 1;
                self.data.hand_checkpoints.push(HandCheckpoint {
                    hand_number: *hand_number,
                    sequence_id,
                });
            }
            GameEvent::PhaseChanged { phase, .. } => {
                self.current_phase = Some(*phase);
            }
            GameEvent::ActionTaken { .. } => {
                self.data.metadata.total_actions += 1;
            }
            GameEvent::PlayerJoined {
                player_id, name, ..
            } => {
                self.data
                    .metadata
                    .player_names
                    .insert(player_id.clone(), name.clone());
            }
            GameEvent::HandComplete { .. } => {
                self.current_phase = Some(Phase::HandComplete);
            }
            _ => {}
        }

        let is_checkpoint = sequence_id % self.checkpoint_interval == 0
            || matches!(event, GameEvent::HandStarted { .. });

        self.data.events.push(ReplayEvent {
            sequence_id,
            timestamp: Utc::now(),
            hand_number: self.current_hand,
            phase: self.current_phase,
            actor_id: event.actor().cloned(),
            event: event.clone(),
            game_state_snapshot: is_checkpoint.then(snapshot),
        });
        self.data.metadata.total_events = sequence_id;
    }

    /// Stamps the end time. Further events would be a logic error but
    /// the log stays readable either way.
    pub fn end_game(&mut self) {
        if self.data.metadata.end_time.is_none() {
            self.data.metadata.end_time = Some(Utc::now());
        }
    }

    pub fn mark_corrupt(&mut self) {
        self.data.metadata.corrupt = true;
    }

    pub fn data(&self) -> &ReplayData {
        &self.data
    }
}

/// Durable sink for finished replays.
pub trait ReplaySink: Send + Sync {
    fn persist(&self, data: &ReplayData) -> Result<(), ReplayError>;
}

/// Writes one pretty-printed JSON document per match into a directory.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ReplaySink for JsonFileSink {
    fn persist(&self, data: &ReplayData) -> Result<(), ReplayError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.json", data.game_id));
        let mut file = fs::File::create(&path)?;
        let body = serde_json::to_vec_pretty(data)
            .map_err(|e| ReplayError::InvalidReplay(e.to_string()))?;
        file.write_all(&body)?;
        file.flush()?;
        tracing::info!(game_id = %data.game_id, path = %path.display(), "replay persisted");
        Ok(())
    }
}

/// All recorders, live and finished, keyed by game id. Outlives the
/// matches themselves so finished games stay queryable.
#[derive(Default)]
pub struct ReplayStore {
    logs: RwLock<HashMap<GameId, Arc<Mutex<ReplayLog>>>>,
    sink: Option<Arc<dyn ReplaySink>>,
}

impl ReplayStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: Arc<dyn ReplaySink>) -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
            sink: Some(sink),
        }
    }

    pub fn register(&self, game_id: GameId, log: Arc<Mutex<ReplayLog>>) {
        match self.logs.write() {
            Ok(mut guard) => {
                guard.insert(game_id, log);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(game_id, log);
            }
        }
    }

    fn log(&self, game_id: &str) -> Result<Arc<Mutex<ReplayLog>>, ReplayError> {
        let guard = self
            .logs
            .read()
            .map_err(|_| ReplayError::StoragePoisoned)?;
        guard
            .get(game_id)
            .cloned()
            .ok_or_else(|| ReplayError::UnknownReplay(game_id.to_string()))
    }

    pub fn snapshot(&self, game_id: &str) -> Result<ReplayData, ReplayError> {
        let log = self.log(game_id)?;
        let guard = log.lock().map_err(|_| ReplayError::StoragePoisoned)?;
        Ok(guard.data().clone())
    }

    /// A copy of the replay reduced to a single hand.
    pub fn hand_slice(&self, game_id: &str, hand_number: u64) -> Result<ReplayData, ReplayError> {
        let full = self.snapshot(game_id)?;
        let events: Vec<ReplayEvent> = full
            .events
            .iter()
            .filter(|e| e.hand_number == Some(hand_number))
            .cloned()
            .collect();
        if events.is_empty() {
            return Err(ReplayError::UnknownReplay(format!(
                "{game_id} hand {hand_number}"
            )));
        }
        Ok(ReplayData {
            game_id: full.game_id,
            metadata: full.metadata,
            hand_checkpoints: full
                .hand_checkpoints
                .iter()
                .filter(|c| c.hand_number == hand_number)
                .copied()
                .collect(),
            events,
        })
    }

    /// Persists one replay to the attached sink.
    pub fn save(&self, game_id: &str) -> Result<(), ReplayError> {
        let sink = self.sink.as_ref().ok_or(ReplayError::NoSink)?;
        let data = self.snapshot(game_id)?;
        sink.persist(&data)
    }
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("malformed replay: {0}")]
    InvalidReplay(String),
    #[error("no replay recorded for {0}")]
    UnknownReplay(String),
    #[error("no replay sink attached")]
    NoSink,
    #[error("replay storage poisoned")]
    StoragePoisoned,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IntoErrorResponse for ReplayError {
    fn status_code(&self) -> warp::http::StatusCode {
        use warp::http::StatusCode;
        match self {
            ReplayError::InvalidReplay(_) => StatusCode::BAD_REQUEST,
            ReplayError::UnknownReplay(_) => StatusCode::NOT_FOUND,
            ReplayError::NoSink => StatusCode::BAD_REQUEST,
            ReplayError::StoragePoisoned | ReplayError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ReplayError::InvalidReplay(_) => "invalid_replay",
            ReplayError::UnknownReplay(_) => "unknown_replay",
            ReplayError::NoSink => "no_replay_sink",
            ReplayError::StoragePoisoned => "replay_storage_error",
            ReplayError::Io(_) => "replay_io_error",
        }
    }

    fn error_message(&self) -> String {
        self.to_string()
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            ReplayError::StoragePoisoned => ErrorSeverity::Critical,
            ReplayError::Io(_) => ErrorSeverity::Server,
            _ => ErrorSeverity::Client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> TableSnapshot {
        TableSnapshot {
            phase: Phase::WaitingForPlayers,
            hand_number: 0,
            community: vec![],
            pots: vec![],
            current_bet: 0,
            min_raise: 20,
            went_to_showdown: false,
            dealer: None,
            to_act: None,
            seats: vec![],
        }
    }

    fn joined(game_id: &str, player: &str) -> GameEvent {
        GameEvent::PlayerJoined {
            game_id: game_id.into(),
            player_id: player.into(),
            name: player.to_uppercase(),
            chip_stack: 1_000,
        }
    }

    #[test]
    fn sequence_ids_are_gap_free_from_one() {
        let mut log = ReplayLog::new("g".into(), 10, 20);
        for i in 0..5 {
            log.log_event(&joined("g", &format!("p{i}")), snapshot);
        }
        let data = log.data();
        assert_eq!(data.metadata.total_events, 5);
        for (i, event) in data.events.iter().enumerate() {
            assert_eq!(event.sequence_id, i as u64 + 1);
        }
        data.validate().expect("valid log");
    }

    #[test]
    fn checkpoints_land_on_interval_and_hand_starts() {
        let mut log = ReplayLog::with_checkpoint_interval("g".into(), 10, 20, 3);
        log.log_event(&joined("g", "a"), snapshot); // 1
        log.log_event(&joined("g", "b"), snapshot); // 2
        log.log_event(
            &GameEvent::HandStarted {
                game_id: "g".into(),
                hand_number: 1,
                dealer: "a".into(),
                small_blind_seat: "a".into(),
                big_blind_seat: "b".into(),
            },
            snapshot,
        ); // 3: interval AND hand start
        log.log_event(&joined("g", "c"), snapshot); // 4

        let data = log.data();
        assert!(data.events[0].game_state_snapshot.is_none());
        assert!(data.events[2].game_state_snapshot.is_some());
        assert!(data.events[3].game_state_snapshot.is_none());
        assert_eq!(
            data.hand_checkpoints,
            vec![HandCheckpoint {
                hand_number: 1,
                sequence_id: 3
            }]
        );
    }

    #[test]
    fn metadata_counts_actions_and_players() {
        let mut log = ReplayLog::new("g".into(), 10, 20);
        log.log_event(&joined("g", "a"), snapshot);
        log.log_event(
            &GameEvent::ActionTaken {
                game_id: "g".into(),
                hand_number: 1,
                player_id: "a".into(),
                action: felt_engine::player::PlayerAction::Check,
                applied: felt_engine::engine::AppliedAction::Check,
                timestamp_ms: 0,
            },
            snapshot,
        );
        log.end_game();

        let data = log.data();
        assert_eq!(data.metadata.total_actions, 1);
        assert_eq!(data.metadata.player_names.get("a").map(String::as_str), Some("A"));
        assert!(data.metadata.end_time.is_some());
    }

    #[test]
    fn serialization_round_trip_is_lossless() {
        let mut log = ReplayLog::with_checkpoint_interval("g".into(), 10, 20, 2);
        log.log_event(&joined("g", "a"), snapshot);
        log.log_event(&joined("g", "b"), snapshot);
        log.end_game();

        let json = serde_json::to_string(log.data()).expect("serialize");
        let back: ReplayData = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(&back, log.data());
    }

    #[test]
    fn invalid_sequences_fail_validation() {
        let mut log = ReplayLog::new("g".into(), 10, 20);
        log.log_event(&joined("g", "a"), snapshot);
        let mut data = log.data().clone();
        data.events[0].sequence_id = 7;
        assert!(matches!(
            data.validate(),
            Err(ReplayError::InvalidReplay(_))
        ));
    }

    #[test]
    fn file_sink_writes_loadable_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = JsonFileSink::new(dir.path());
        let store = ReplayStore::with_sink(Arc::new(sink));

        let mut log = ReplayLog::new("g1".into(), 10, 20);
        log.log_event(&joined("g1", "a"), snapshot);
        store.register("g1".into(), Arc::new(Mutex::new(log)));
        store.save("g1").expect("save");

        let raw = std::fs::read_to_string(dir.path().join("g1.json")).expect("read back");
        let parsed: ReplayData = serde_json::from_str(&raw).expect("parse");
        assert_eq!(parsed.game_id, "g1");
        assert_eq!(parsed.events.len(), 1);
    }

    #[test]
    fn saving_without_a_sink_fails() {
        let store = ReplayStore::new();
        let mut log = ReplayLog::new("g1".into(), 10, 20);
        log.log_event(&joined("g1", "a"), snapshot);
        store.register("g1".into(), Arc::new(Mutex::new(log)));
        assert!(matches!(store.save("g1"), Err(ReplayError::NoSink)));
    }
}
