//! Synthetic faces and scripted adapters shared by unit tests.

use crate::detector::{DetectorError, FaceDetector};
use crate::source::{CaptureError, FrameSource};
use crate::types::Region;
use image::{GrayImage, Luma};
use std::collections::VecDeque;

const DARK: u8 = 40;
const BRIGHT: u8 = 160;

/// Two dark columns, two bright columns, repeating. `offset` brightens everything.
pub(crate) fn vertical_stripes(size: u32, offset: u8) -> GrayImage {
    GrayImage::from_fn(size, size, |x, _| stripe(x, offset))
}

/// Same as [`vertical_stripes`], rotated by 90°.
pub(crate) fn horizontal_stripes(size: u32, offset: u8) -> GrayImage {
    GrayImage::from_fn(size, size, |_, y| stripe(y, offset))
}

fn stripe(i: u32, offset: u8) -> Luma<u8> {
    let base = if (i / 2) % 2 == 0 { DARK } else { BRIGHT };
    Luma([base.saturating_add(offset)])
}

/// Plays back a fixed list of frames, then reports itself unavailable.
pub(crate) struct ScriptedSource {
    frames: VecDeque<Result<GrayImage, CaptureError>>,
    pub(crate) reads: usize,
}

impl ScriptedSource {
    pub(crate) fn new(frames: Vec<Result<GrayImage, CaptureError>>) -> Self {
        Self {
            frames: frames.into(),
            reads: 0,
        }
    }

    pub(crate) fn ok(frames: Vec<GrayImage>) -> Self {
        Self::new(frames.into_iter().map(Ok).collect())
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<GrayImage, CaptureError> {
        self.reads += 1;
        self.frames
            .pop_front()
            .unwrap_or_else(|| Err(CaptureError::Unavailable("script exhausted".into())))
    }
}

/// Reports one face covering the whole frame, or none for an all-black frame.
pub(crate) struct WholeFrameDetector;

impl FaceDetector for WholeFrameDetector {
    fn detect(&mut self, frame: &GrayImage) -> Result<Vec<Region>, DetectorError> {
        if frame.as_raw().iter().all(|&p| p == 0) {
            return Ok(Vec::new());
        }
        Ok(vec![Region::new(0, 0, frame.width(), frame.height())])
    }
}

/// Reports the same regions for every frame.
pub(crate) struct FixedDetector(pub(crate) Vec<Region>);

impl FaceDetector for FixedDetector {
    fn detect(&mut self, _frame: &GrayImage) -> Result<Vec<Region>, DetectorError> {
        Ok(self.0.clone())
    }
}
