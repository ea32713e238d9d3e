// THEORY:
// The `IdleWatchdog` decides when nobody is looking at a traffic light any more.
// Running a detector on an empty street drains the battery and keeps the camera
// busy, so after `timeout` without a single detection the loop pauses itself.
//
//   Running --(Expire)--> Paused --(reset by start())--> Running
//
// The reference instant is the last frame with a detection, or the session start
// when there has been none yet. `Expire` is reported once; the watchdog stays
// expired until the owner resets it.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogSignal {
    Continue,
    Expire,
}

#[derive(Debug, Clone)]
pub struct IdleWatchdog {
    timeout: Duration,
    session_started_at: Instant,
    last_nonempty_at: Option<Instant>,
    expired: bool,
}

impl IdleWatchdog {
    pub fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            timeout,
            session_started_at: now,
            last_nonempty_at: None,
            expired: false,
        }
    }

    pub fn observe(&mut self, has_detections: bool, now: Instant) -> WatchdogSignal {
        if has_detections {
            self.last_nonempty_at = Some(now);
            return WatchdogSignal::Continue;
        }
        if self.expired {
            return WatchdogSignal::Continue;
        }
        let reference = self.last_nonempty_at.unwrap_or(self.session_started_at);
        if now.saturating_duration_since(reference) > self.timeout {
            self.expired = true;
            WatchdogSignal::Expire
        } else {
            WatchdogSignal::Continue
        }
    }

    /// Starts a fresh session at `now`.
    pub fn reset(&mut self, now: Instant) {
        self.session_started_at = now;
        self.last_nonempty_at = None;
        self.expired = false;
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    pub fn last_nonempty_at(&self) -> Option<Instant> {
        self.last_nonempty_at
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
