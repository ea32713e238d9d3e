use chroma_vision::core_modules::classifier::{ColorThresholdClassifier, ScriptedClassifier};
use chroma_vision::core_modules::frame::{BlankFrames, FrameQueue};
use chroma_vision::core_modules::transport::{MemoryTransport, TransportLog};
use chroma_vision::pipeline::{NO_LIGHTS_TEXT, PAUSED_TEXT};
use chroma_vision::{
    AudioChannel, AudioCommand, ChannelConfig, ChannelKind, Color, ControlHandle, Detection,
    DetectionLoop, FrameBuffer, PipelineConfig, StopReason, VibrationChannel, VibrationCommand,
};
use std::time::{Duration, Instant};

struct Harness {
    detection: DetectionLoop,
    vibration: TransportLog<VibrationCommand>,
    audio: TransportLog<AudioCommand>,
}

impl Harness {
    fn new(config: PipelineConfig, script: Vec<Vec<Detection>>) -> Self {
        let vibration_transport = MemoryTransport::<VibrationCommand>::new();
        let audio_transport = MemoryTransport::<AudioCommand>::new();
        let vibration = vibration_transport.log();
        let audio = audio_transport.log();
        let channel_config = ChannelConfig {
            capacity: 64,
            delivery_timeout: Duration::from_secs(1),
        };
        let detection = DetectionLoop::new(
            config,
            Box::new(ScriptedClassifier::new(script)),
            AudioChannel::spawn(ChannelKind::Audio, audio_transport, channel_config),
            VibrationChannel::spawn(ChannelKind::Vibration, vibration_transport, channel_config),
        )
        .unwrap();
        Self { detection, vibration, audio }
    }

    /// Ticks once per entry of `frames`, `period` apart, starting at `t0`.
    fn tick_many(&mut self, t0: Instant, period: Duration, frames: usize) -> Vec<Option<bool>> {
        (0..frames)
            .map(|i| {
                let now = t0 + period * i as u32;
                self.detection
                    .tick(Some(FrameBuffer::blank(i as u64)), now)
                    .map(|report| report.paused)
            })
            .collect()
    }

    async fn finish(self) -> (Vec<VibrationCommand>, Vec<AudioCommand>) {
        self.detection.shutdown().await;
        (self.vibration.delivered(), self.audio.delivered())
    }
}

fn lit(color: Color) -> Detection {
    Detection::new(color, 0.9, (10.0, 10.0, 30.0, 60.0)).unwrap()
}

const FRAME: Duration = Duration::from_millis(66);

#[tokio::test]
async fn red_then_nothing_buzzes_twice_and_beeps_once() {
    let script = vec![vec![lit(Color::Red)], vec![lit(Color::Red)], vec![]];
    let mut harness = Harness::new(PipelineConfig::default(), script);
    let t0 = Instant::now();
    harness.detection.start(t0);
    harness.tick_many(t0, FRAME, 3);

    let (vibration, audio) = harness.finish().await;
    assert_eq!(vibration, vec![VibrationCommand::Red, VibrationCommand::Off]);
    assert_eq!(audio, vec![AudioCommand::Beep(Color::Red)]);
}

#[tokio::test]
async fn changing_colors_buzz_each_change_and_beep_on_red() {
    let script = vec![
        vec![lit(Color::Green)],
        vec![lit(Color::Yellow)],
        vec![lit(Color::Red)],
    ];
    let mut harness = Harness::new(PipelineConfig::default(), script);
    let t0 = Instant::now();
    harness.detection.start(t0);
    harness.tick_many(t0, FRAME, 3);

    let (vibration, audio) = harness.finish().await;
    assert_eq!(
        vibration,
        vec![VibrationCommand::Green, VibrationCommand::Yellow, VibrationCommand::Red]
    );
    assert_eq!(audio, vec![AudioCommand::Beep(Color::Red)]);
}

#[tokio::test]
async fn idle_expiry_pauses_once_and_silences_the_loop() {
    let config = PipelineConfig {
        idle_timeout_secs: 30.0,
        status_capacity: 64,
        ..Default::default()
    };
    let mut harness = Harness::new(config, vec![vec![]; 40]);
    let mut reports = harness.detection.subscribe();
    let t0 = Instant::now();
    harness.detection.start(t0);

    let paused: Vec<Option<bool>> = (1..=40u64)
        .map(|i| {
            harness
                .detection
                .tick(Some(FrameBuffer::blank(i)), t0 + Duration::from_secs(i))
                .map(|report| report.paused)
        })
        .collect();

    // Ticks 1..=30 run, tick 31 pauses, the rest are ignored.
    assert!(paused[..30].iter().all(|p| *p == Some(false)));
    assert_eq!(paused[30], Some(true));
    assert!(paused[31..].iter().all(Option::is_none));
    assert!(!harness.detection.is_active());

    let mut last_text = String::new();
    let mut published = 0;
    while let Ok(report) = reports.try_recv() {
        published += 1;
        last_text = report.status_text;
    }
    assert_eq!(published, 31);
    assert_eq!(last_text, PAUSED_TEXT);

    let (vibration, audio) = harness.finish().await;
    assert_eq!(vibration, vec![VibrationCommand::Off]);
    assert!(audio.is_empty());
}

#[tokio::test]
async fn restart_after_pause_starts_from_scratch() {
    let config = PipelineConfig {
        idle_timeout_secs: 1.0,
        ..Default::default()
    };
    let script = vec![vec![lit(Color::Red)], vec![], vec![], vec![lit(Color::Red)]];
    let mut harness = Harness::new(config, script);
    let t0 = Instant::now();
    harness.detection.start(t0);

    let first = harness.detection.tick(Some(FrameBuffer::blank(0)), t0).unwrap();
    assert!(!first.paused);
    let second = harness
        .detection
        .tick(Some(FrameBuffer::blank(1)), t0 + Duration::from_millis(500))
        .unwrap();
    assert_eq!(second.status_text, NO_LIGHTS_TEXT);
    let third = harness
        .detection
        .tick(Some(FrameBuffer::blank(2)), t0 + Duration::from_millis(1500))
        .unwrap();
    assert!(third.paused);

    let t1 = t0 + Duration::from_secs(10);
    assert!(harness.detection.start(t1));
    let fourth = harness.detection.tick(Some(FrameBuffer::blank(3)), t1).unwrap();
    assert_eq!(fourth.vibration, Some(VibrationCommand::Red));
    assert_eq!(fourth.audio, Some(AudioCommand::Beep(Color::Red)));

    let (vibration, audio) = harness.finish().await;
    assert_eq!(
        vibration,
        vec![VibrationCommand::Red, VibrationCommand::Off, VibrationCommand::Red]
    );
    assert_eq!(audio.len(), 2);
}

#[tokio::test]
async fn flickering_scene_never_repeats_a_vibration_command() {
    let pattern = [
        vec![lit(Color::Red)],
        vec![lit(Color::Red), lit(Color::Green)],
        vec![lit(Color::Green)],
        vec![lit(Color::Green)],
        vec![],
        vec![lit(Color::Yellow), lit(Color::Green)],
        vec![lit(Color::Yellow)],
        vec![],
        vec![],
        vec![lit(Color::Red)],
    ];
    let script: Vec<Vec<Detection>> = pattern.iter().cycle().take(60).cloned().collect();
    let mut harness = Harness::new(PipelineConfig::default(), script);
    let t0 = Instant::now();
    harness.detection.start(t0);
    harness.tick_many(t0, FRAME, 60);

    let (vibration, _) = harness.finish().await;
    assert!(!vibration.is_empty());
    assert!(
        vibration.windows(2).all(|pair| pair[0] != pair[1]),
        "consecutive duplicates in {vibration:?}"
    );
}

#[tokio::test]
async fn muting_vibration_does_not_replay_a_backlog() {
    let script = vec![
        vec![lit(Color::Red)],
        vec![lit(Color::Green)],
        vec![lit(Color::Green)],
        vec![],
    ];
    let mut harness = Harness::new(PipelineConfig::default(), script);
    let t0 = Instant::now();
    harness.detection.start(t0);

    harness.detection.tick(Some(FrameBuffer::blank(0)), t0);
    assert!(harness.detection.set_channel_enabled(ChannelKind::Vibration, false));
    harness.detection.tick(Some(FrameBuffer::blank(1)), t0 + FRAME);
    assert!(harness.detection.set_channel_enabled(ChannelKind::Vibration, true));
    harness.detection.tick(Some(FrameBuffer::blank(2)), t0 + FRAME * 2);
    harness.detection.tick(Some(FrameBuffer::blank(3)), t0 + FRAME * 3);

    let (vibration, _) = harness.finish().await;
    assert_eq!(
        vibration,
        vec![
            VibrationCommand::Red,
            VibrationCommand::VibrationDisable,
            VibrationCommand::VibrationEnable,
            VibrationCommand::Off,
        ]
    );
}

#[tokio::test]
async fn missing_wearable_does_not_stop_audio() {
    let audio_transport = MemoryTransport::<AudioCommand>::new();
    let audio_log = audio_transport.log();
    let mut detection = DetectionLoop::new(
        PipelineConfig::default(),
        Box::new(ScriptedClassifier::new(vec![vec![lit(Color::Red)]])),
        AudioChannel::spawn(ChannelKind::Audio, audio_transport, ChannelConfig::default()),
        VibrationChannel::unavailable(ChannelKind::Vibration),
    )
    .unwrap();
    assert!(!detection.set_channel_enabled(ChannelKind::Vibration, true));

    let t0 = Instant::now();
    detection.start(t0);
    let report = detection.tick(Some(FrameBuffer::blank(0)), t0).unwrap();
    assert_eq!(report.vibration, Some(VibrationCommand::Red));
    assert!(!report.vibration_enabled);
    assert_eq!(report.vibration_status.to_string(), "Disabled (unavailable)");

    detection.shutdown().await;
    assert_eq!(audio_log.delivered(), vec![AudioCommand::Beep(Color::Red)]);
}

#[tokio::test(start_paused = true)]
async fn run_stops_when_the_source_runs_dry() {
    let script = vec![vec![lit(Color::Green)]; 5];
    let mut harness = Harness::new(PipelineConfig::default(), script);
    let (_control, play_rx) = ControlHandle::new();
    harness.detection.start(tokio::time::Instant::now().into_std());

    let summary = harness
        .detection
        .run(&mut BlankFrames::new(5), play_rx, None)
        .await;
    assert_eq!(summary.stop_reason, StopReason::SourceExhausted);
    assert_eq!(summary.ticks, 5);
    assert_eq!(summary.frames, 5);
    assert_eq!(summary.vibration_commands, vec![VibrationCommand::Green]);
    assert_eq!(summary.beeps, 0);
    harness.finish().await;
}

#[tokio::test(start_paused = true)]
async fn run_pauses_on_idle() {
    let config = PipelineConfig {
        fps: 10,
        idle_timeout_secs: 1.0,
        ..Default::default()
    };
    let mut harness = Harness::new(config, vec![]);
    let (_control, play_rx) = ControlHandle::new();
    harness.detection.start(tokio::time::Instant::now().into_std());

    let summary = harness
        .detection
        .run(&mut BlankFrames::new(1_000), play_rx, None)
        .await;
    assert_eq!(summary.stop_reason, StopReason::IdlePaused);
    assert_eq!(summary.vibration_commands, vec![VibrationCommand::Off]);
    assert!(!harness.detection.is_active());
    harness.finish().await;
}

#[tokio::test(start_paused = true)]
async fn run_honors_the_control_handle_and_tick_limit() {
    let mut harness = Harness::new(PipelineConfig::default(), vec![]);
    let (control, play_rx) = ControlHandle::new();
    harness.detection.start(tokio::time::Instant::now().into_std());

    let limited = harness
        .detection
        .run(&mut BlankFrames::new(1_000), play_rx.clone(), Some(3))
        .await;
    assert_eq!(limited.stop_reason, StopReason::TickLimit);
    assert_eq!(limited.ticks, 3);
    assert!(harness.detection.is_active());

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        control.stop();
    });
    let stopped = harness
        .detection
        .run(&mut BlankFrames::new(1_000), play_rx, None)
        .await;
    stopper.await.unwrap();
    assert_eq!(stopped.stop_reason, StopReason::Stopped);
    assert!(stopped.ticks > 0);
    assert!(!harness.detection.is_active());
    harness.finish().await;
}

fn lamp_frame(frame_id: u64, rgb: [u8; 3]) -> FrameBuffer {
    let mut image = image::RgbImage::from_pixel(100, 100, image::Rgb([20, 20, 24]));
    for y in 40..50 {
        for x in 40..50 {
            image.put_pixel(x, y, image::Rgb(rgb));
        }
    }
    FrameBuffer::new(frame_id, image)
}

#[tokio::test(start_paused = true)]
async fn captured_frames_drive_the_heuristic_classifier() {
    let vibration_transport = MemoryTransport::<VibrationCommand>::new();
    let vibration_log = vibration_transport.log();
    let mut detection = DetectionLoop::new(
        PipelineConfig::default(),
        Box::new(ColorThresholdClassifier::default()),
        AudioChannel::spawn(ChannelKind::Audio, MemoryTransport::<AudioCommand>::new(), ChannelConfig::default()),
        VibrationChannel::spawn(ChannelKind::Vibration, vibration_transport, ChannelConfig::default()),
    )
    .unwrap();
    let mut frames = FrameQueue::new([
        lamp_frame(0, [250, 30, 20]),
        // Undecodable capture: the classifier fails and the tick sees nothing.
        FrameBuffer::new(1, image::RgbImage::new(0, 0)),
        lamp_frame(2, [30, 230, 90]),
    ]);
    let (_control, play_rx) = ControlHandle::new();
    detection.start(tokio::time::Instant::now().into_std());

    let summary = detection.run(&mut frames, play_rx, None).await;
    assert_eq!(summary.stop_reason, StopReason::SourceExhausted);
    assert_eq!(summary.ticks, 3);
    assert_eq!(
        summary.vibration_commands,
        vec![VibrationCommand::Red, VibrationCommand::Off, VibrationCommand::Green]
    );
    assert_eq!(summary.beeps, 1);

    detection.shutdown().await;
    assert_eq!(
        vibration_log.delivered(),
        vec![VibrationCommand::Red, VibrationCommand::Off, VibrationCommand::Green]
    );
}
