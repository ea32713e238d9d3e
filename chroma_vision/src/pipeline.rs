// THEORY:
// The `pipeline` module is the top-level API of the signal engine. It wires the
// layers into one tick:
//
//   frame --> classifier --> confidence gate --> ColorStateMachine --> channels
//                                          \--> IdleWatchdog --> pause?
//
// The `DetectionLoop` owns every piece of mutable state (debounce memory, watchdog,
// both channel producers), so nothing is shared across instances and nothing needs a
// lock outside the channels' own mailboxes. A tick is synchronous and cheap; the
// only concurrency lives behind `dispatch`, which never waits for the transport.
//
// Lifecycle:
//   start() ----> active --(idle expiry)--> paused --start()--> active (fresh state)
//                   \--stop()--> stopped --start()--> active (fresh state)
//
// The idle expiry is the only coupling point to the camera/UI code outside the
// engine: the tick report says `paused = true` and the caller releases the camera.

use crate::core_modules::classifier::Classifier;
use crate::core_modules::color::{Detection, VibrationCommand};
use crate::core_modules::color_state_machine::ColorStateMachine;
use crate::core_modules::frame::{FrameBuffer, FrameSource};
use crate::core_modules::idle_watchdog::{IdleWatchdog, WatchdogSignal};
use crate::core_modules::notification::{AudioChannel, ChannelKind, VibrationChannel};
use crate::error::ConfigError;
use crate::status::{StatusBus, TickReport};
use std::time::Instant;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

// Re-export key data structures for the public API.
pub use crate::config::PipelineConfig;
pub use crate::core_modules::color::{AudioCommand, Color};
pub use crate::core_modules::color_state_machine::StepResult;
pub use crate::core_modules::notification::ChannelStatus;

pub const PAUSED_TEXT: &str = "Detection paused due to inactivity. Tap Start Detection to resume.";
pub const NO_LIGHTS_TEXT: &str = "No traffic lights detected";
pub const NO_FRAME_TEXT: &str = "Failed to capture frame from camera.";

/// Why `DetectionLoop::run` returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopReason {
    /// The loop was not active when `run` was called.
    #[default]
    Inactive,
    /// Stopped through the control handle.
    Stopped,
    /// Paused by the idle watchdog.
    IdlePaused,
    /// The frame source ran dry.
    SourceExhausted,
    /// Reached the requested number of ticks.
    TickLimit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub frames: u64,
    pub vibration_commands: Vec<VibrationCommand>,
    pub beeps: u64,
    pub stop_reason: StopReason,
}

impl RunSummary {
    fn record(&mut self, report: &TickReport) {
        self.ticks += 1;
        if report.frame_id.is_some() {
            self.frames += 1;
        }
        if let Some(command) = report.vibration {
            self.vibration_commands.push(command);
        }
        if report.audio.is_some() {
            self.beeps += 1;
        }
    }
}

/// The main, top-level struct for the signal engine.
pub struct DetectionLoop {
    config: PipelineConfig,
    classifier: Box<dyn Classifier>,
    state_machine: ColorStateMachine,
    watchdog: IdleWatchdog,
    audio: AudioChannel,
    vibration: VibrationChannel,
    status_bus: StatusBus,
    active: bool,
    tick_count: u64,
}

impl DetectionLoop {
    /// Builds an inactive loop. Fails fast on an invalid configuration.
    pub fn new(
        config: PipelineConfig,
        classifier: Box<dyn Classifier>,
        audio: AudioChannel,
        vibration: VibrationChannel,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            state_machine: ColorStateMachine::new(config.audio_min_interval()),
            watchdog: IdleWatchdog::new(config.idle_timeout(), Instant::now()),
            status_bus: StatusBus::new(config.status_capacity),
            config,
            classifier,
            audio,
            vibration,
            active: false,
            tick_count: 0,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Starts detection with fresh debounce and idle history. No-op while active.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.active {
            debug!("detection already active");
            return false;
        }
        self.state_machine.reset();
        self.watchdog.reset(now);
        self.active = true;
        info!(
            fps = self.config.fps,
            idle_timeout = ?self.config.idle_timeout(),
            "detection started"
        );
        true
    }

    /// Stops detection. Safe to call repeatedly.
    pub fn stop(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.deactivate();
        info!(ticks = self.tick_count, "detection stopped");
        true
    }

    fn deactivate(&mut self) {
        self.active = false;
        self.state_machine.reset();
        self.watchdog.reset(Instant::now());
    }

    /// Mutes or unmutes one channel. Returns whether anything changed.
    pub fn set_channel_enabled(&mut self, channel: ChannelKind, enabled: bool) -> bool {
        match channel {
            ChannelKind::Audio => self.audio.set_enabled(enabled),
            ChannelKind::Vibration => self.vibration.set_enabled(enabled),
        }
    }

    pub fn audio_channel(&self) -> &AudioChannel {
        &self.audio
    }

    pub fn vibration_channel(&self) -> &VibrationChannel {
        &self.vibration
    }

    pub fn status_bus(&self) -> &StatusBus {
        &self.status_bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TickReport> {
        self.status_bus.subscribe()
    }

    /// Runs one tick. Returns `None` while inactive; nothing is dispatched then.
    pub fn tick(&mut self, frame: Option<FrameBuffer>, now: Instant) -> Option<TickReport> {
        if !self.active {
            return None;
        }
        self.tick_count += 1;

        let frame_id = frame.as_ref().map(|frame| frame.frame_id);
        let detections = match &frame {
            Some(frame) => self.classify(frame),
            None => {
                debug!(tick = self.tick_count, "no frame this tick");
                Vec::new()
            }
        };

        let step = self.state_machine.step(&detections, now);
        self.dispatch(step);

        let paused = self.watchdog.observe(!detections.is_empty(), now) == WatchdogSignal::Expire;
        let status_text = if paused {
            PAUSED_TEXT.to_string()
        } else if frame.is_none() {
            NO_FRAME_TEXT.to_string()
        } else {
            describe(&detections)
        };
        if paused {
            info!(
                ticks = self.tick_count,
                idle_timeout = ?self.config.idle_timeout(),
                "detection paused due to inactivity"
            );
            self.deactivate();
        }

        let report = TickReport {
            tick: self.tick_count,
            frame_id,
            detections,
            vibration: step.vibration,
            audio: step.audio,
            status_text,
            vibration_status: self.vibration.status(),
            vibration_enabled: self.vibration.is_enabled(),
            audio_enabled: self.audio.is_enabled(),
            paused,
        };
        self.status_bus.publish(report.clone());
        Some(report)
    }

    fn classify(&mut self, frame: &FrameBuffer) -> Vec<Detection> {
        match self.classifier.classify(frame) {
            Ok(detections) => detections
                .into_iter()
                .filter(|d| d.color.is_lit() && d.confidence >= self.config.confidence_threshold)
                .collect(),
            Err(err) => {
                warn!(frame_id = frame.frame_id, error = %err, "classifier failed, treating frame as empty");
                Vec::new()
            }
        }
    }

    fn dispatch(&self, step: StepResult) {
        if let Some(command) = step.vibration {
            if let Err(err) = self.vibration.send(command) {
                debug!(%command, error = %err, "vibration command not dispatched");
            }
        }
        if let Some(command) = step.audio {
            if let Err(err) = self.audio.play(command) {
                debug!(%command, error = %err, "audio command not dispatched");
            }
        }
    }

    /// Drives `tick` at the configured rate until the loop pauses, is stopped through
    /// `control`, the source runs dry or `max_ticks` is reached.
    pub async fn run<S: FrameSource>(
        &mut self,
        source: &mut S,
        mut control: watch::Receiver<bool>,
        max_ticks: Option<u64>,
    ) -> RunSummary {
        let mut summary = RunSummary::default();
        if !self.active {
            return summary;
        }
        if !*control.borrow_and_update() {
            self.stop();
            summary.stop_reason = StopReason::Stopped;
            return summary;
        }

        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut control_open = true;

        loop {
            if max_ticks.is_some_and(|max| summary.ticks >= max) {
                summary.stop_reason = StopReason::TickLimit;
                break;
            }
            if source.is_exhausted() {
                summary.stop_reason = StopReason::SourceExhausted;
                break;
            }

            tokio::select! {
                instant = interval.tick() => {
                    let frame = source.next_frame();
                    let Some(report) = self.tick(frame, instant.into_std()) else {
                        summary.stop_reason = StopReason::Stopped;
                        break;
                    };
                    summary.record(&report);
                    if report.paused {
                        summary.stop_reason = StopReason::IdlePaused;
                        break;
                    }
                }
                changed = control.changed(), if control_open => {
                    if changed.is_err() {
                        control_open = false;
                    } else if !*control.borrow_and_update() {
                        self.stop();
                        summary.stop_reason = StopReason::Stopped;
                        break;
                    }
                }
            }
        }
        summary
    }

    /// Stops detection and waits for both channels to drain their mailboxes.
    pub async fn shutdown(mut self) {
        self.stop();
        let Self { audio, vibration, .. } = self;
        futures::future::join(audio.shutdown(), vibration.shutdown()).await;
    }
}

/// "Detections: 2 - Red: 0.91, Green: 0.75"
fn describe(detections: &[Detection]) -> String {
    if detections.is_empty() {
        return NO_LIGHTS_TEXT.to_string();
    }
    let parts: Vec<String> = detections
        .iter()
        .map(|d| format!("{}: {:.2}", d.color, d.confidence))
        .collect();
    format!("Detections: {} - {}", detections.len(), parts.join(", "))
}
