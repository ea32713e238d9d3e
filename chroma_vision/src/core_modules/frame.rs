// THEORY:
// Frames come from outside the engine (a camera, a directory of captures, a test).
// The engine only needs two things from a source: the next frame, or the news that
// there is none this tick. A missing frame is treated exactly like a frame with no
// lights in it; a camera glitch and an empty street look the same to the debouncer.

use image::RgbImage;
use std::time::Instant;

/// One captured frame.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    pub frame_id: u64,
    pub image: RgbImage,
    pub captured_at: Instant,
}

impl FrameBuffer {
    pub fn new(frame_id: u64, image: RgbImage) -> Self {
        Self {
            frame_id,
            image,
            captured_at: Instant::now(),
        }
    }

    /// A 1x1 black frame for sources that carry no pixels (scripted replays).
    pub fn blank(frame_id: u64) -> Self {
        Self::new(frame_id, RgbImage::new(1, 1))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

pub trait FrameSource {
    /// `None` means no frame this tick.
    fn next_frame(&mut self) -> Option<FrameBuffer>;

    /// A finite source that will never produce another frame.
    fn is_exhausted(&self) -> bool {
        false
    }
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn next_frame(&mut self) -> Option<FrameBuffer> {
        (**self).next_frame()
    }

    fn is_exhausted(&self) -> bool {
        (**self).is_exhausted()
    }
}

/// Yields `count` blank frames, then nothing.
#[derive(Debug, Clone)]
pub struct BlankFrames {
    produced: u64,
    count: u64,
}

impl BlankFrames {
    pub fn new(count: u64) -> Self {
        Self { produced: 0, count }
    }
}

impl FrameSource for BlankFrames {
    fn next_frame(&mut self) -> Option<FrameBuffer> {
        if self.produced >= self.count {
            return None;
        }
        let frame = FrameBuffer::blank(self.produced);
        self.produced += 1;
        Some(frame)
    }

    fn is_exhausted(&self) -> bool {
        self.produced >= self.count
    }
}

/// Replays a fixed list of frames in order.
#[derive(Debug, Clone, Default)]
pub struct FrameQueue {
    frames: std::collections::VecDeque<FrameBuffer>,
}

impl FrameQueue {
    pub fn new(frames: impl IntoIterator<Item = FrameBuffer>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for FrameQueue {
    fn next_frame(&mut self) -> Option<FrameBuffer> {
        self.frames.pop_front()
    }

    fn is_exhausted(&self) -> bool {
        self.frames.is_empty()
    }
}
