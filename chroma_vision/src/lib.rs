// THEORY:
// This file is the main entry point for the `chroma_vision` library crate.
// It exports the `DetectionLoop` and its associated data structures
// (`PipelineConfig`, `TickReport`, the notification channels) as the high-level
// interface of the signal engine. The camera, the object-detection model and the
// UI all live outside; they talk to the engine through frames in, `TickReport`s out
// and two notification channels that own their transports.
//
// The `core_modules` are layered bottom-up: domain values, pure per-frame decisions,
// then asynchronous delivery. Nothing in a lower layer knows about a higher one.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod status;

pub use config::PipelineConfig;
pub use core_modules::classifier::{build_classifier, Classifier, ClassifierKind};
pub use core_modules::color::{AudioCommand, BoundingBox, Color, Detection, VibrationCommand};
pub use core_modules::frame::{FrameBuffer, FrameSource};
pub use core_modules::notification::{
    AudioChannel, ChannelConfig, ChannelKind, ChannelStatus, Transport, VibrationChannel,
};
pub use error::{ClassifierError, ConfigError, NotifyError};
pub use pipeline::{DetectionLoop, RunSummary, StopReason};
pub use status::{ControlHandle, StatusBus, TickReport};
