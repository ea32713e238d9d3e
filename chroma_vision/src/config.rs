//! Tunable behavior of the detection loop.

use crate::core_modules::classifier::{ClassifierKind, ThresholdConfig};
use crate::core_modules::notification::ChannelConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the `DetectionLoop`.
///
/// Durations are stored as seconds so the JSON file stays readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Tick rate of the detection loop.
    pub fps: u32,
    /// Minimum gap between two red beeps.
    pub audio_min_interval_secs: f64,
    /// Frames without any detection for this long pause the loop.
    pub idle_timeout_secs: f64,
    /// Detections below this confidence are ignored.
    pub confidence_threshold: f32,
    /// Upper bound on a single notification delivery.
    pub transport_timeout_secs: f64,
    /// Per-channel mailbox bound.
    pub queue_capacity: usize,
    /// Buffered tick reports per status subscriber.
    pub status_capacity: usize,
    /// Name of the wearable, used in status text.
    pub device_name: String,
    pub classifier: ClassifierKind,
    pub threshold: ThresholdConfig,
    pub log_level: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fps: 15,
            audio_min_interval_secs: 0.3,
            idle_timeout_secs: 30.0,
            confidence_threshold: 0.7,
            transport_timeout_secs: 5.0,
            queue_capacity: 8,
            status_capacity: 16,
            device_name: "CHROMA_ESP32".to_string(),
            classifier: ClassifierKind::default(),
            threshold: ThresholdConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fps == 0 {
            return Err(invalid("fps must be positive"));
        }
        positive_secs("audio_min_interval_secs", self.audio_min_interval_secs)?;
        positive_secs("idle_timeout_secs", self.idle_timeout_secs)?;
        positive_secs("transport_timeout_secs", self.transport_timeout_secs)?;
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(invalid(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity must be positive"));
        }
        if self.status_capacity == 0 {
            return Err(invalid("status_capacity must be positive"));
        }
        let t = &self.threshold;
        if !(0.0..=1.0).contains(&t.min_saturation) || !(0.0..=1.0).contains(&t.min_value) {
            return Err(invalid("threshold saturation and value must be within [0, 1]"));
        }
        if !(t.min_fraction > 0.0 && t.min_fraction <= 1.0) {
            return Err(invalid("threshold min_fraction must be within (0, 1]"));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }

    pub fn audio_min_interval(&self) -> Duration {
        Duration::from_secs_f64(self.audio_min_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.idle_timeout_secs)
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.transport_timeout_secs)
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            capacity: self.queue_capacity,
            delivery_timeout: self.transport_timeout(),
        }
    }
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidConfig(reason.into())
}

fn positive_secs(name: &str, value: f64) -> Result<(), ConfigError> {
    // Also rejects NaN and values Duration cannot hold.
    if value.is_finite() && value > 0.0 && value < 1e9 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be a positive number of seconds, got {value}")))
    }
}
