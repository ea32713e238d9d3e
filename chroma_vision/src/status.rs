// THEORY:
// The `status` module is the only surface the UI layer touches. The engine never
// draws anything; it publishes a `TickReport` per tick on a broadcast bus and lets
// whoever cares (a GUI, a logger, a test) subscribe. Slow subscribers lag and skip
// reports rather than slowing the loop down.
//
// The reverse direction is a `ControlHandle`: a watch channel the UI flips to stop a
// running loop.

use crate::core_modules::color::{AudioCommand, Detection, VibrationCommand};
use crate::core_modules::notification::ChannelStatus;
use tokio::sync::{broadcast, watch};

/// Everything a UI needs to render one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    /// `None` when no frame arrived this tick.
    pub frame_id: Option<u64>,
    /// Colors and boxes ready for annotation.
    pub detections: Vec<Detection>,
    pub vibration: Option<VibrationCommand>,
    pub audio: Option<AudioCommand>,
    /// Human readable summary of the tick.
    pub status_text: String,
    pub vibration_status: ChannelStatus,
    pub vibration_enabled: bool,
    pub audio_enabled: bool,
    /// The idle watchdog paused the loop on this tick.
    pub paused: bool,
}

#[derive(Clone)]
pub struct StatusBus {
    reports_tx: broadcast::Sender<TickReport>,
}

impl StatusBus {
    pub fn new(capacity: usize) -> Self {
        let (reports_tx, _) = broadcast::channel::<TickReport>(capacity.max(1));
        Self { reports_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TickReport> {
        self.reports_tx.subscribe()
    }

    /// Fire and forget; nobody listening is fine.
    pub fn publish(&self, report: TickReport) {
        let _ = self.reports_tx.send(report);
    }
}

/// Lets the UI stop a running loop. `true` means keep running.
#[derive(Clone)]
pub struct ControlHandle {
    pub play_tx: watch::Sender<bool>,
}

impl ControlHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (play_tx, play_rx) = watch::channel(true);
        (Self { play_tx }, play_rx)
    }

    pub fn stop(&self) {
        self.play_tx.send_replace(false);
    }
}
