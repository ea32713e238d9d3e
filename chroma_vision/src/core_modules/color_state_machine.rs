// THEORY:
// The `ColorStateMachine` turns a noisy per-frame list of detections into a sparse
// stream of notifications. It is the only owner of the two `DebounceState`s and it
// never touches I/O, so a step is a total function of (state, detections, now).
//
// Two independent channels are computed every step:
//
// 1.  **Vibration**: the wearable must buzz once per distinct state change, never once
//     per frame. The state of a frame is its highest priority lit color
//     (Red > Yellow > Green), or `Off` when nothing is lit. A command is emitted only
//     when that state differs from the last one sent. Only the dominant color is
//     compared: {Red, Green} with RED last sent emits nothing, not GREEN.
// 2.  **Audio**: only red beeps. A run of consecutive red frames earns exactly one
//     beep, rate limited by `audio_min_interval`. The alert re-arms as soon as a frame
//     arrives without red.
//
//  frame has red?      armed   interval ok    result
//  ------------------  ------  -------------  ------------------------------
//  no                  any     any            re-arm, no beep
//  yes                 yes     yes            beep, disarm, stamp
//  yes                 yes     no             no beep (stays armed)
//  yes                 no      any            no beep

use crate::core_modules::color::{AudioCommand, Color, Detection, VibrationCommand};
use crate::core_modules::debounce::DebounceState;
use std::time::{Duration, Instant};

/// Commands approved for dispatch by a single step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepResult {
    pub vibration: Option<VibrationCommand>,
    pub audio: Option<AudioCommand>,
}

impl StepResult {
    pub fn is_empty(&self) -> bool {
        self.vibration.is_none() && self.audio.is_none()
    }
}

/// The set of lit colors seen in one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresentColors {
    red: bool,
    yellow: bool,
    green: bool,
}

impl PresentColors {
    pub fn from_detections(detections: &[Detection]) -> Self {
        let mut present = Self::default();
        for detection in detections {
            match detection.color {
                Color::Red => present.red = true,
                Color::Yellow => present.yellow = true,
                Color::Green => present.green = true,
                Color::Off => {}
            }
        }
        present
    }

    pub fn contains(&self, color: Color) -> bool {
        match color {
            Color::Red => self.red,
            Color::Yellow => self.yellow,
            Color::Green => self.green,
            Color::Off => self.is_empty(),
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.red || self.yellow || self.green)
    }

    /// Highest priority lit color, or `Off`.
    pub fn dominant(&self) -> Color {
        Color::PRIORITY
            .into_iter()
            .find(|color| self.contains(*color))
            .unwrap_or(Color::Off)
    }
}

pub struct ColorStateMachine {
    audio_min_interval: Duration,
    vibration_state: DebounceState<VibrationCommand>,
    audio_state: DebounceState<AudioCommand>,
    red_alert_armed: bool,
}

impl ColorStateMachine {
    pub fn new(audio_min_interval: Duration) -> Self {
        Self {
            audio_min_interval,
            vibration_state: DebounceState::new(),
            audio_state: DebounceState::new(),
            red_alert_armed: true,
        }
    }

    pub fn step(&mut self, detections: &[Detection], now: Instant) -> StepResult {
        let present = PresentColors::from_detections(detections);
        StepResult {
            vibration: self.step_vibration(present, now),
            audio: self.step_audio(present, now),
        }
    }

    fn step_vibration(&mut self, present: PresentColors, now: Instant) -> Option<VibrationCommand> {
        let command = VibrationCommand::from(present.dominant());
        if self.vibration_state.is_repeat(command) {
            return None;
        }
        self.vibration_state.record(command, now);
        Some(command)
    }

    fn step_audio(&mut self, present: PresentColors, now: Instant) -> Option<AudioCommand> {
        if !present.contains(Color::Red) {
            self.red_alert_armed = true;
            return None;
        }
        if !self.red_alert_armed || !self.audio_state.interval_elapsed(now, self.audio_min_interval) {
            return None;
        }
        let command = AudioCommand::Beep(Color::Red);
        self.red_alert_armed = false;
        self.audio_state.record(command, now);
        Some(command)
    }

    /// Forgets all history, as if freshly built.
    pub fn reset(&mut self) {
        self.vibration_state.reset();
        self.audio_state.reset();
        self.red_alert_armed = true;
    }

    pub fn vibration_state(&self) -> &DebounceState<VibrationCommand> {
        &self.vibration_state
    }

    pub fn audio_state(&self) -> &DebounceState<AudioCommand> {
        &self.audio_state
    }

    pub fn red_alert_armed(&self) -> bool {
        self.red_alert_armed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(colors: &[Color]) -> Vec<Detection> {
        colors
            .iter()
            .filter_map(|color| Detection::new(*color, 0.9, (10.0, 10.0, 20.0, 40.0)))
            .collect()
    }

    fn machine() -> ColorStateMachine {
        ColorStateMachine::new(Duration::from_millis(300))
    }

    #[test]
    fn first_empty_frame_sends_off() {
        let mut sm = machine();
        let result = sm.step(&[], Instant::now());
        assert_eq!(result.vibration, Some(VibrationCommand::Off));
        assert_eq!(result.audio, None);
    }

    #[test]
    fn repeated_state_is_suppressed() {
        let mut sm = machine();
        let t0 = Instant::now();
        assert_eq!(sm.step(&lit(&[Color::Green]), t0).vibration, Some(VibrationCommand::Green));
        for i in 1..10 {
            let now = t0 + Duration::from_millis(66 * i);
            assert_eq!(sm.step(&lit(&[Color::Green]), now).vibration, None);
        }
    }

    #[test]
    fn red_outranks_other_colors() {
        let mut sm = machine();
        let t0 = Instant::now();
        let result = sm.step(&lit(&[Color::Green, Color::Yellow, Color::Red]), t0);
        assert_eq!(result.vibration, Some(VibrationCommand::Red));
        // Red still dominant, nothing new to say.
        let result = sm.step(&lit(&[Color::Green, Color::Red]), t0 + Duration::from_secs(1));
        assert_eq!(result.vibration, None);
        let result = sm.step(&lit(&[Color::Green, Color::Yellow]), t0 + Duration::from_secs(2));
        assert_eq!(result.vibration, Some(VibrationCommand::Yellow));
    }

    #[test]
    fn duplicate_detections_count_once() {
        let present = PresentColors::from_detections(&lit(&[Color::Red, Color::Red, Color::Red]));
        assert!(present.contains(Color::Red));
        assert!(!present.contains(Color::Green));
        assert_eq!(present.dominant(), Color::Red);
    }

    #[test]
    fn red_run_beeps_once() {
        let mut sm = machine();
        let t0 = Instant::now();
        let mut beeps = 0;
        for i in 0..60 {
            let now = t0 + Duration::from_millis(66 * i);
            if sm.step(&lit(&[Color::Red]), now).audio.is_some() {
                beeps += 1;
            }
        }
        assert_eq!(beeps, 1);
        assert!(!sm.red_alert_armed());
    }

    #[test]
    fn absence_rearms_the_beep() {
        let mut sm = machine();
        let t0 = Instant::now();
        assert!(sm.step(&lit(&[Color::Red]), t0).audio.is_some());
        assert!(sm.step(&[], t0 + Duration::from_secs(1)).audio.is_none());
        assert!(sm.red_alert_armed());
        assert!(sm.step(&lit(&[Color::Red]), t0 + Duration::from_secs(2)).audio.is_some());
    }

    #[test]
    fn quick_reappearance_waits_for_interval() {
        let mut sm = machine();
        let t0 = Instant::now();
        assert!(sm.step(&lit(&[Color::Red]), t0).audio.is_some());
        assert!(sm.step(&[], t0 + Duration::from_millis(66)).audio.is_none());
        // Re-armed but the interval has not passed yet.
        assert!(sm.step(&lit(&[Color::Red]), t0 + Duration::from_millis(132)).audio.is_none());
        assert!(sm.red_alert_armed());
        assert!(sm.step(&lit(&[Color::Red]), t0 + Duration::from_millis(300)).audio.is_some());
    }

    #[test]
    fn non_red_colors_never_beep() {
        let mut sm = machine();
        let t0 = Instant::now();
        for (i, color) in [Color::Green, Color::Yellow, Color::Green].into_iter().enumerate() {
            let result = sm.step(&lit(&[color]), t0 + Duration::from_secs(i as u64));
            assert_eq!(result.audio, None);
        }
    }

    #[test]
    fn reset_restores_fresh_behavior() {
        let mut sm = machine();
        let t0 = Instant::now();
        sm.step(&lit(&[Color::Red]), t0);
        sm.reset();
        assert_eq!(sm.vibration_state().last_sent(), None);
        assert_eq!(sm.audio_state().last_sent(), None);
        let result = sm.step(&lit(&[Color::Red]), t0 + Duration::from_millis(10));
        assert_eq!(result.vibration, Some(VibrationCommand::Red));
        assert_eq!(result.audio, Some(AudioCommand::Beep(Color::Red)));
    }
}
