// THEORY:
// The `color` module holds the vocabulary every other layer speaks. It is a set of
// "dumb" data containers with no behavior beyond conversion:
//
// 1.  **Color**: the closed set of traffic-light states. `Off` is synthetic. No
//     classifier ever reports it; the state machine produces it when a frame has
//     no lit lights at all.
// 2.  **Detection**: one classifier output for one frame. A frame produces a list
//     of these, in whatever order the classifier likes.
// 3.  **Commands**: what actually leaves the engine. `VibrationCommand` is the
//     wearable's token set (it carries two control tokens that are not colors),
//     and `AudioCommand` is a beep request.
//
// The wire tokens (`RED`, `VIB_ON`, ...) are the interoperability contract with the
// wearable firmware and must never change spelling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A traffic-light state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    Red,
    Yellow,
    Green,
    /// No lit light in the frame.
    Off,
}

impl Color {
    /// Lit colors in vibration priority order.
    pub const PRIORITY: [Color; 3] = [Color::Red, Color::Yellow, Color::Green];

    /// Maps a detection model class id to a color.
    ///
    /// The model was trained with `0 = Red, 1 = Green, 2 = Off, 3 = Yellow`.
    pub fn from_class_id(class_id: u32) -> Option<Color> {
        match class_id {
            0 => Some(Color::Red),
            1 => Some(Color::Green),
            2 => Some(Color::Off),
            3 => Some(Color::Yellow),
            _ => None,
        }
    }

    pub fn is_lit(&self) -> bool {
        !matches!(self, Color::Off)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Red => write!(f, "Red"),
            Color::Yellow => write!(f, "Yellow"),
            Color::Green => write!(f, "Green"),
            Color::Off => write!(f, "Off"),
        }
    }
}

/// Axis-aligned box in frame pixel coordinates, `(x1, y1)` top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<(f32, f32, f32, f32)> for BoundingBox {
    fn from((x1, y1, x2, y2): (f32, f32, f32, f32)) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

/// A single classifier output for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Always a lit color.
    pub color: Color,
    /// Classifier confidence in `[0, 1]`.
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    /// Builds a detection for a lit color. Returns `None` for `Color::Off`.
    pub fn new(color: Color, confidence: f32, bbox: impl Into<BoundingBox>) -> Option<Self> {
        if !color.is_lit() {
            return None;
        }
        Some(Self {
            color,
            confidence: confidence.clamp(0.0, 1.0),
            bbox: bbox.into(),
        })
    }

    /// Builds a detection from a raw model class id.
    ///
    /// Unlit housings (`Off`) and unknown classes are discarded.
    pub fn from_class(class_id: u32, confidence: f32, bbox: impl Into<BoundingBox>) -> Option<Self> {
        Color::from_class_id(class_id).and_then(|color| Self::new(color, confidence, bbox))
    }
}

/// A token sent verbatim to the wearable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VibrationCommand {
    Red,
    Yellow,
    Green,
    Off,
    VibrationEnable,
    VibrationDisable,
}

impl VibrationCommand {
    pub fn token(&self) -> &'static str {
        match self {
            VibrationCommand::Red => "RED",
            VibrationCommand::Yellow => "YELLOW",
            VibrationCommand::Green => "GREEN",
            VibrationCommand::Off => "OFF",
            VibrationCommand::VibrationEnable => "VIB_ON",
            VibrationCommand::VibrationDisable => "VIB_OFF",
        }
    }

    /// The newline-terminated frame written to the transport.
    pub fn wire_line(&self) -> String {
        format!("{}\n", self.token())
    }

    pub fn parse_token(token: &str) -> Option<Self> {
        match token.trim_end_matches(['\r', '\n']) {
            "RED" => Some(VibrationCommand::Red),
            "YELLOW" => Some(VibrationCommand::Yellow),
            "GREEN" => Some(VibrationCommand::Green),
            "OFF" => Some(VibrationCommand::Off),
            "VIB_ON" => Some(VibrationCommand::VibrationEnable),
            "VIB_OFF" => Some(VibrationCommand::VibrationDisable),
            _ => None,
        }
    }

    /// Control tokens toggle the motor and say nothing about the light.
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            VibrationCommand::VibrationEnable | VibrationCommand::VibrationDisable
        )
    }
}

impl From<Color> for VibrationCommand {
    fn from(color: Color) -> Self {
        match color {
            Color::Red => VibrationCommand::Red,
            Color::Yellow => VibrationCommand::Yellow,
            Color::Green => VibrationCommand::Green,
            Color::Off => VibrationCommand::Off,
        }
    }
}

impl fmt::Display for VibrationCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Frequency and length of a beep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    pub frequency_hz: u32,
    pub duration_ms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioCommand {
    Beep(Color),
}

impl AudioCommand {
    /// Red gets a long low tone so it cannot be missed.
    pub fn tone(&self) -> Option<Tone> {
        match self {
            AudioCommand::Beep(Color::Red) => Some(Tone { frequency_hz: 800, duration_ms: 4000 }),
            AudioCommand::Beep(Color::Yellow) => Some(Tone { frequency_hz: 1000, duration_ms: 300 }),
            AudioCommand::Beep(Color::Green) => Some(Tone { frequency_hz: 1200, duration_ms: 300 }),
            AudioCommand::Beep(Color::Off) => None,
        }
    }
}

impl fmt::Display for AudioCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioCommand::Beep(color) => write!(f, "BEEP({color})"),
        }
    }
}
