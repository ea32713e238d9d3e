use anyhow::{bail, Context};
use chroma_vision::core_modules::classifier::ScriptedClassifier;
use chroma_vision::core_modules::color::Tone;
use chroma_vision::core_modules::frame::BlankFrames;
use chroma_vision::core_modules::transport::{LineTransport, TracingTransport};
use chroma_vision::{
    build_classifier, AudioChannel, AudioCommand, ChannelKind, Classifier, ControlHandle,
    DetectionLoop, FrameBuffer, FrameSource, NotifyError, PipelineConfig, Transport,
    VibrationChannel,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Replays captured frames or recorded detections through the signal engine.
#[derive(Debug, Parser)]
#[command(name = "chroma_runner", version)]
struct Args {
    /// Directory of captured frames (png/jpg), replayed in file name order.
    #[arg(long)]
    frames: Option<PathBuf>,
    /// JSON-lines detection script, one array of detections per frame.
    #[arg(long)]
    script: Option<PathBuf>,
    /// JSON pipeline configuration. Missing keys keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Writable serial node of the wearable. Without it vibration is only logged.
    #[arg(long)]
    vibration_device: Option<PathBuf>,
    #[arg(long)]
    no_audio: bool,
    #[arg(long)]
    no_vibration: bool,
    /// Stop after this many ticks.
    #[arg(long)]
    max_ticks: Option<u64>,
    /// Overrides the configured tick rate.
    #[arg(long)]
    fps: Option<u32>,
}

/// Rings the terminal bell once per beep.
struct BellSink {
    out: Stdout,
}

impl Transport<AudioCommand> for BellSink {
    async fn deliver(&mut self, command: AudioCommand) -> Result<(), NotifyError> {
        if let Some(Tone { frequency_hz, duration_ms }) = command.tone() {
            info!(frequency_hz, duration_ms, "beep");
        }
        self.out.write_all(b"\x07").await?;
        self.out.flush().await?;
        Ok(())
    }
}

/// Loads frames from a directory lazily. An unreadable file is a missed frame.
struct ImageDirSource {
    paths: std::vec::IntoIter<PathBuf>,
    next_id: u64,
}

impl ImageDirSource {
    fn open(dir: &Path) -> anyhow::Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("reading frame directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
            })
            .collect();
        paths.sort();
        if paths.is_empty() {
            bail!("no png or jpg frames in {}", dir.display());
        }
        info!(frames = paths.len(), dir = %dir.display(), "frame directory opened");
        Ok(Self {
            paths: paths.into_iter(),
            next_id: 0,
        })
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Option<FrameBuffer> {
        let path = self.paths.next()?;
        let frame_id = self.next_id;
        self.next_id += 1;
        match image::open(&path) {
            Ok(image) => Some(FrameBuffer::new(frame_id, image.to_rgb8())),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to decode frame");
                None
            }
        }
    }

    fn is_exhausted(&self) -> bool {
        self.paths.len() == 0
    }
}

async fn open_vibration(args: &Args, config: &PipelineConfig) -> VibrationChannel {
    let channel_config = config.channel_config();
    let Some(path) = &args.vibration_device else {
        return VibrationChannel::spawn(
            ChannelKind::Vibration,
            TracingTransport::new(config.device_name.clone()),
            channel_config,
        );
    };
    match tokio::fs::OpenOptions::new().write(true).open(path).await {
        Ok(device) => {
            info!(device = %path.display(), name = %config.device_name, "wearable connected");
            VibrationChannel::spawn(ChannelKind::Vibration, LineTransport::new(device), channel_config)
        }
        Err(err) => {
            warn!(device = %path.display(), error = %err, "wearable unavailable, vibration disabled");
            VibrationChannel::unavailable(ChannelKind::Vibration)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Argument Parsing & Setup ---
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(fps) = args.fps {
        config.fps = fps;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    // --- 2. Classifier & Frame Source ---
    let (classifier, scripted_frames): (Box<dyn Classifier>, Option<usize>) = match &args.script {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading detection script {}", path.display()))?;
            let script = ScriptedClassifier::from_json_lines(&text)?;
            let frames = script.remaining();
            (Box::new(script), Some(frames))
        }
        None => (build_classifier(config.classifier, config.threshold), None),
    };

    let mut source: Box<dyn FrameSource> = match (&args.frames, scripted_frames) {
        (Some(dir), _) => Box::new(ImageDirSource::open(dir)?),
        (None, Some(frames)) => Box::new(BlankFrames::new(frames as u64)),
        (None, None) => bail!("nothing to replay: pass --frames and/or --script"),
    };

    // --- 3. Notification Channels ---
    let audio = AudioChannel::spawn(
        ChannelKind::Audio,
        BellSink { out: tokio::io::stdout() },
        config.channel_config(),
    );
    let vibration = open_vibration(&args, &config).await;

    // --- 4. Detection Loop Initialization ---
    let mut detection = DetectionLoop::new(config, classifier, audio, vibration)?;
    if args.no_audio {
        detection.set_channel_enabled(ChannelKind::Audio, false);
    }
    if args.no_vibration {
        detection.set_channel_enabled(ChannelKind::Vibration, false);
    }

    let mut reports = detection.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match reports.recv().await {
                Ok(report) => info!(
                    tick = report.tick,
                    frame = ?report.frame_id,
                    vibration = %report.vibration_status,
                    "{}",
                    report.status_text
                ),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "status printer fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let (control, play_rx) = ControlHandle::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, stopping detection");
            control.stop();
        }
    });

    // --- 5. Main Processing Loop ---
    detection.start(Instant::now());
    let summary = detection.run(&mut source, play_rx, args.max_ticks).await;
    info!(
        ticks = summary.ticks,
        frames = summary.frames,
        vibrations = summary.vibration_commands.len(),
        beeps = summary.beeps,
        reason = ?summary.stop_reason,
        "replay finished"
    );

    // --- 6. Cleanup ---
    detection.shutdown().await;
    if let Err(err) = printer.await {
        warn!(error = %err, "status printer ended abnormally");
    }
    Ok(())
}
