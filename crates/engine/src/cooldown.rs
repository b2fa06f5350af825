//! Time gate between scan cycles.
//!
//! One cooldown window per gate. Starting a scan is a single check-and-set
//! under the lock, so two near-simultaneous presence edges cannot both
//! start a cycle: the loser gets `None` until the winner's permit drops.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A lockout started by a decision or a timed-out scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownWindow {
    pub started_at: Instant,
    pub duration: Duration,
}

impl CooldownWindow {
    /// Active on `[started_at, started_at + duration)`.
    pub fn is_active(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started_at) < self.duration
    }

    /// Time left until the window closes; zero once expired.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.duration
            .saturating_sub(now.saturating_duration_since(self.started_at))
    }
}

#[derive(Debug, Default)]
struct CooldownState {
    window: Option<CooldownWindow>,
    scan_in_flight: bool,
}

/// Shared cooldown state for one gate.
#[derive(Debug)]
pub struct CooldownScheduler {
    duration: Duration,
    state: Mutex<CooldownState>,
}

impl CooldownScheduler {
    /// Every recorded decision opens a window of `duration`.
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            state: Mutex::new(CooldownState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CooldownState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True when no window is active at `now`.
    pub fn may_scan(&self, now: Instant) -> bool {
        !self.lock().window.is_some_and(|w| w.is_active(now))
    }

    /// Starts a new window, replacing any previous one.
    pub fn record_decision(&self, now: Instant) {
        self.lock().window = Some(CooldownWindow {
            started_at: now,
            duration: self.duration,
        });
        tracing::debug!(cooldown_ms = self.duration.as_millis() as u64, "cooldown started");
    }

    /// Atomically checks the window and claims the single scan slot.
    pub fn try_begin_scan(self: &Arc<Self>, now: Instant) -> Option<ScanPermit> {
        let mut state = self.lock();
        if state.scan_in_flight || state.window.is_some_and(|w| w.is_active(now)) {
            return None;
        }
        state.scan_in_flight = true;
        Some(ScanPermit {
            scheduler: Arc::clone(self),
        })
    }

    /// The window in force at `now`, if any.
    pub fn active_window(&self, now: Instant) -> Option<CooldownWindow> {
        self.lock().window.filter(|w| w.is_active(now))
    }

    /// Whether a [`ScanPermit`] is currently held.
    pub fn scan_in_flight(&self) -> bool {
        self.lock().scan_in_flight
    }
}

/// Held for the lifetime of one scan cycle; dropping it frees the slot.
#[derive(Debug)]
pub struct ScanPermit {
    scheduler: Arc<CooldownScheduler>,
}

impl Drop for ScanPermit {
    fn drop(&mut self) {
        self.scheduler.lock().scan_in_flight = false;
    }
}
