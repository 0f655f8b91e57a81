//! Frame acquisition seam. Camera drivers live outside this crate.

use image::GrayImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    /// A single read failed; the next one may succeed.
    #[error("frame read failed: {0}")]
    ReadFailed(String),
    /// The source cannot produce any more frames.
    #[error("frame source unavailable: {0}")]
    Unavailable(String),
}

impl CaptureError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureError::ReadFailed(_))
    }
}

/// Yields grayscale frames one at a time.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<GrayImage, CaptureError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<GrayImage, CaptureError> {
        (**self).next_frame()
    }
}
