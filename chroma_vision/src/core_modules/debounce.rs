// THEORY:
// A `DebounceState` is the memory of one notification channel: the last command
// that was approved for dispatch and the instant it was approved. It is owned by
// the `ColorStateMachine` and nobody else reads or writes it.
//
// The two fields move together. Keeping them in one `Option` makes the invariant
// "the timestamp exists iff the command exists" impossible to break.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct DebounceState<C> {
    last: Option<(C, Instant)>,
}

impl<C> Default for DebounceState<C> {
    fn default() -> Self {
        Self { last: None }
    }
}

impl<C: Copy + PartialEq> DebounceState<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_sent(&self) -> Option<C> {
        self.last.map(|(command, _)| command)
    }

    pub fn last_sent_at(&self) -> Option<Instant> {
        self.last.map(|(_, at)| at)
    }

    /// True when `command` is exactly what was last sent.
    pub fn is_repeat(&self, command: C) -> bool {
        self.last_sent() == Some(command)
    }

    /// True when nothing was sent yet or at least `interval` has passed since.
    pub fn interval_elapsed(&self, now: Instant, interval: Duration) -> bool {
        match self.last_sent_at() {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= interval,
        }
    }

    pub fn record(&mut self, command: C, now: Instant) {
        self.last = Some((command, now));
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
