//! Deferred-work seam for the five timed behaviors (turn timeout,
//! hand-start delay, empty-match cleanup, scheduled start, replay
//! auto-save). Production schedules on the tokio runtime; tests drive a
//! manual clock so timer semantics are deterministic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Cancellation token for a scheduled task. Cancelling is idempotent; a
/// task observing its token after cancellation simply never runs.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// One-shot timer scheduling.
pub trait Clock: Send + Sync + 'static {
    fn schedule_after(&self, delay: Duration, task: TimerTask) -> CancelHandle;
}

/// Production clock: each task is a spawned tokio sleep. Must be used
/// from within a runtime.
#[derive(Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn schedule_after(&self, delay: Duration, task: TimerTask) -> CancelHandle {
        let handle = CancelHandle::new();
        let token = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !token.is_cancelled() {
                task();
            }
        });
        handle
    }
}

struct PendingTimer {
    fire_at: Duration,
    sequence: u64,
    handle: CancelHandle,
    task: TimerTask,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    sequence: u64,
    pending: Vec<PendingTimer>,
}

/// Test clock driven by explicit [`ManualClock::advance`] calls. Due
/// tasks run on the advancing thread, in fire-time order (insertion
/// order on ties), outside the clock's own lock so they may schedule
/// follow-up timers.
#[derive(Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, delta: Duration) {
        let target = {
            let state = self.state.lock().expect("clock state");
            state.now + delta
        };

        loop {
            let due = {
                let mut state = self.state.lock().expect("clock state");
                state.pending.retain(|t| !t.handle.is_cancelled());
                let next = state
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.fire_at <= target)
                    .min_by_key(|(_, t)| (t.fire_at, t.sequence))
                    .map(|(i, _)| i);
                match next {
                    Some(i) => {
                        let timer = state.pending.remove(i);
                        state.now = timer.fire_at;
                        Some(timer)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };
            match due {
                Some(timer) => (timer.task)(),
                None => break,
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        let state = self.state.lock().expect("clock state");
        state
            .pending
            .iter()
            .filter(|t| !t.handle.is_cancelled())
            .count()
    }
}

impl Clock for ManualClock {
    fn schedule_after(&self, delay: Duration, task: TimerTask) -> CancelHandle {
        let handle = CancelHandle::new();
        let mut state = self.state.lock().expect("clock state");
        state.sequence += 1;
        let timer = PendingTimer {
            fire_at: state.now + delay,
            sequence: state.sequence,
            handle: handle.clone(),
            task,
        };
        state.pending.push(timer);
        handle
    }
}
