//! The live login loop: one frame at a time, yielding between frames.

use crate::classifier::Classifier;
use crate::detector::FaceDetector;
use crate::engine::{EngineError, FrameReport, RecognitionEngine};
use crate::source::{CaptureError, FrameSource};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("camera unavailable: {0}")]
    Capture(#[source] CaptureError),
}

/// Loop timing.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    /// Pause after each processed frame.
    pub frame_interval: Duration,
    /// Pause after a failed read before trying again.
    pub retry_delay: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames: usize,
    pub skipped: usize,
}

/// Pull frames from `source` and publish a report for each until `on_report`
/// breaks, `cancel` is raised, or the source is gone.
///
/// Transient read failures skip the frame and retry after `pacing.retry_delay`.
pub fn run_session<S, D, C>(
    source: &mut S,
    engine: &mut RecognitionEngine<D, C>,
    pacing: Pacing,
    cancel: &AtomicBool,
    mut on_report: impl FnMut(&FrameReport) -> ControlFlow<()>,
) -> Result<SessionSummary, SessionError>
where
    S: FrameSource + ?Sized,
    D: FaceDetector,
    C: Classifier,
{
    let mut summary = SessionSummary::default();

    while !cancel.load(Ordering::Relaxed) {
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(e) if e.is_transient() => {
                summary.skipped += 1;
                tracing::warn!(error = %e, "failed to capture frame; retrying");
                std::thread::sleep(pacing.retry_delay);
                continue;
            }
            Err(e) => return Err(SessionError::Capture(e)),
        };

        let report = engine.process_frame(&frame)?;
        summary.frames += 1;
        if on_report(&report).is_break() {
            break;
        }
        std::thread::sleep(pacing.frame_interval);
    }

    tracing::info!(frames = summary.frames, skipped = summary.skipped, "login session ended");
    Ok(summary)
}
