// THEORY:
// The classifier is a black box to the engine: a frame goes in, a list of lit-light
// detections comes out. One capability, several interchangeable implementations,
// chosen by configuration:
//
// 1.  **ScriptedClassifier**: replays detections recorded from an external model
//     (one JSON array per frame). This is how a real object-detection model plugs
//     in: the model runs elsewhere and its output is fed through here.
// 2.  **ColorThresholdClassifier**: a model-free heuristic. It buckets bright,
//     saturated pixels by hue and reports every color whose lit area is large
//     enough, with the bounding box of its pixels.
//
// Any failure is reported as a `ClassifierError`; the loop treats that frame as
// having no detections.

use crate::core_modules::color::{BoundingBox, Color, Detection};
use crate::core_modules::frame::FrameBuffer;
use crate::core_modules::pixel::pixel::Pixel;
use crate::error::ClassifierError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub trait Classifier: Send {
    fn classify(&mut self, frame: &FrameBuffer) -> Result<Vec<Detection>, ClassifierError>;
}

impl<T: Classifier + ?Sized> Classifier for Box<T> {
    fn classify(&mut self, frame: &FrameBuffer) -> Result<Vec<Detection>, ClassifierError> {
        (**self).classify(frame)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    #[default]
    Scripted,
    ColorThreshold,
}

/// Replays one recorded detection list per frame. Runs dry into empty lists.
#[derive(Debug, Clone, Default)]
pub struct ScriptedClassifier {
    frames: VecDeque<Vec<Detection>>,
}

impl ScriptedClassifier {
    pub fn new(frames: impl IntoIterator<Item = Vec<Detection>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    /// Parses a JSON-lines script: one array of detections per line.
    ///
    /// Blank lines are frames with nothing in them. Unlit entries are dropped.
    pub fn from_json_lines(script: &str) -> Result<Self, ClassifierError> {
        let mut frames = VecDeque::new();
        for (index, line) in script.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                frames.push_back(Vec::new());
                continue;
            }
            let detections: Vec<Detection> = serde_json::from_str(line)
                .map_err(|source| ClassifierError::Script { line: index + 1, source })?;
            frames.push_back(detections.into_iter().filter(|d| d.color.is_lit()).collect());
        }
        Ok(Self { frames })
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl Classifier for ScriptedClassifier {
    fn classify(&mut self, _frame: &FrameBuffer) -> Result<Vec<Detection>, ClassifierError> {
        Ok(self.frames.pop_front().unwrap_or_default())
    }
}

/// Tuning for `ColorThresholdClassifier`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Minimum HSV saturation for a pixel to count as lit.
    pub min_saturation: f32,
    /// Minimum HSV value for a pixel to count as lit.
    pub min_value: f32,
    /// Share of the frame a color must cover to be reported.
    pub min_fraction: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_saturation: 0.5,
            min_value: 0.6,
            min_fraction: 0.0005,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ColorRegion {
    count: u64,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl ColorRegion {
    fn new(x: u32, y: u32) -> Self {
        Self { count: 1, min_x: x, min_y: y, max_x: x, max_y: y }
    }

    fn grow(&mut self, x: u32, y: u32) {
        self.count += 1;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    fn bounding_box(&self) -> BoundingBox {
        BoundingBox::new(
            self.min_x as f32,
            self.min_y as f32,
            (self.max_x + 1) as f32,
            (self.max_y + 1) as f32,
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct ColorThresholdClassifier {
    config: ThresholdConfig,
}

impl ColorThresholdClassifier {
    pub fn new(config: ThresholdConfig) -> Self {
        Self { config }
    }

    /// Which lamp color a pixel belongs to, if it is lit at all.
    fn lamp_color(&self, pixel: &Pixel) -> Option<Color> {
        if pixel.saturation_hsv() < self.config.min_saturation || pixel.value_hsv() < self.config.min_value {
            return None;
        }
        match pixel.hue() {
            h if !(20.0..340.0).contains(&h) => Some(Color::Red),
            h if (35.0..70.0).contains(&h) => Some(Color::Yellow),
            h if (90.0..180.0).contains(&h) => Some(Color::Green),
            _ => None,
        }
    }
}

impl Classifier for ColorThresholdClassifier {
    fn classify(&mut self, frame: &FrameBuffer) -> Result<Vec<Detection>, ClassifierError> {
        let total_pixels = u64::from(frame.width()) * u64::from(frame.height());
        if total_pixels == 0 {
            return Err(ClassifierError::EmptyFrame { frame_id: frame.frame_id });
        }

        // Indexed in priority order: red, yellow, green.
        let mut regions: [Option<ColorRegion>; 3] = [None; 3];
        for (x, y, rgb) in frame.image.enumerate_pixels() {
            let Some(color) = self.lamp_color(&Pixel::from(rgb.0)) else {
                continue;
            };
            let slot = match color {
                Color::Red => 0,
                Color::Yellow => 1,
                _ => 2,
            };
            match &mut regions[slot] {
                Some(region) => region.grow(x, y),
                empty => *empty = Some(ColorRegion::new(x, y)),
            }
        }

        let saturation_point = self.config.min_fraction * 4.0;
        let detections = Color::PRIORITY
            .into_iter()
            .zip(regions)
            .filter_map(|(color, region)| {
                let region = region?;
                let fraction = region.count as f32 / total_pixels as f32;
                if fraction < self.config.min_fraction {
                    return None;
                }
                let confidence = (fraction / saturation_point).min(1.0);
                Detection::new(color, confidence, region.bounding_box())
            })
            .collect();
        Ok(detections)
    }
}

/// Builds the classifier named by `kind`. Scripted classifiers start empty.
pub fn build_classifier(kind: ClassifierKind, threshold: ThresholdConfig) -> Box<dyn Classifier> {
    match kind {
        ClassifierKind::Scripted => Box::new(ScriptedClassifier::default()),
        ClassifierKind::ColorThreshold => Box::new(ColorThresholdClassifier::new(threshold)),
    }
}
