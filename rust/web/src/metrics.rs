use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Server-level counters backing the `/stats` endpoint.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    active_games: AtomicU64,
    connected_clients: AtomicU64,
    total_games_played: AtomicU64,
    started: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                active_games: AtomicU64::new(0),
                connected_clients: AtomicU64::new(0),
                total_games_played: AtomicU64::new(0),
                started: Instant::now(),
            }),
        }
    }

    pub fn game_created(&self) {
        let count = self.inner.active_games.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(active_games = count, "match count increased");
    }

    pub fn game_removed(&self) {
        let mut current = self.inner.active_games.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                tracing::warn!("attempted to decrement active_games below zero");
                return;
            }
            match self.inner.active_games.compare_exchange(
                current,
                current - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// A match dealt its first hand.
    pub fn game_started(&self) {
        self.inner
            .total_games_played
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn client_connected(&self) {
        self.inner
            .connected_clients
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn client_disconnected(&self) {
        let mut current = self.inner.connected_clients.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return;
            }
            match self.inner.connected_clients.compare_exchange(
                current,
                current - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            active_games: self.inner.active_games.load(Ordering::Relaxed),
            connected_clients: self.inner.connected_clients.load(Ordering::Relaxed),
            total_games_played: self.inner.total_games_played.load(Ordering::Relaxed),
            server_uptime_seconds: self.inner.started.elapsed().as_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub active_games: u64,
    pub connected_clients: u64,
    pub total_games_played: u64,
    pub server_uptime_seconds: u64,
}
