//! Per-slot backoff timer and the clocks that drive it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Source of wall-clock seconds.
pub trait Clock: Send + Sync {
    /// Current time in whole seconds since an arbitrary, fixed epoch.
    fn now_secs(&self) -> u64;
}

/// Unix time from the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Clock advanced by hand. Used by tests and by hosts with their own
/// tick source.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Start at `now` seconds.
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    /// Move forward by `secs`.
    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    /// Jump to an absolute time, forwards or backwards.
    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Persisted form of a running timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    /// Clock reading when the timer was started.
    pub started_at: u64,
    /// Requested duration in seconds.
    pub duration: u32,
}

impl TimerState {
    /// Seconds left at `now`, never more than `duration`.
    ///
    /// A start time in the future (clock moved backwards) counts as
    /// "just started".
    pub fn remaining_at(&self, now: u64) -> u32 {
        let elapsed = now.saturating_sub(self.started_at);
        let left = u64::from(self.duration).saturating_sub(elapsed);
        u32::try_from(left).unwrap_or(self.duration)
    }
}

/// Countdown guarding a slot.
#[derive(Clone)]
pub struct ElapsedTimer {
    state: Option<TimerState>,
    clock: Arc<dyn Clock>,
}

impl ElapsedTimer {
    /// Stopped timer reading `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { state: None, clock }
    }

    /// Resume from a persisted state.
    pub fn restore(clock: Arc<dyn Clock>, state: Option<TimerState>) -> Self {
        Self { state, clock }
    }

    /// (Re)start counting down `duration_secs` from now.
    pub fn start(&mut self, duration_secs: u32) {
        self.state = Some(TimerState {
            started_at: self.clock.now_secs(),
            duration: duration_secs,
        });
    }

    /// Stop the timer.
    pub fn stop(&mut self) {
        self.state = None;
    }

    /// Seconds until the timer elapses; 0 when stopped or elapsed.
    pub fn remaining(&self) -> u32 {
        self.state
            .map_or(0, |state| state.remaining_at(self.clock.now_secs()))
    }

    /// Whether a countdown has been started and not stopped. An elapsed
    /// timer still counts as running until the next stop or start.
    pub fn is_running(&self) -> bool {
        self.state.is_some()
    }

    /// State to persist.
    pub fn state(&self) -> Option<TimerState> {
        self.state
    }
}

impl fmt::Debug for ElapsedTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElapsedTimer")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
