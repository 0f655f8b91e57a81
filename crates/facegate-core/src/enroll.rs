//! Enrollment: capture face crops of one identity into the sample store.

use crate::detector::{DetectorError, FaceDetector};
use crate::source::{CaptureError, FrameSource};
use crate::store::{validate_identity, SampleStore, StoreError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Consecutive transient read failures tolerated before giving up.
const MAX_CONSECUTIVE_READ_FAILURES: usize = 30;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("invalid identity name {0:?}: must be non-empty and must not contain path separators")]
    InvalidIdentity(String),
    #[error("target sample count must be positive")]
    InvalidTarget,
    #[error("camera unavailable: {0}; check the camera index with `facegate devices`")]
    Acquisition(#[source] CaptureError),
    #[error("face detector failed: {0}")]
    Detector(#[from] DetectorError),
    #[error("sample store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct EnrollOptions {
    /// Samples to capture before stopping.
    pub target: usize,
    /// Pause after each stored sample so the subject can move slightly.
    pub capture_interval: Duration,
    /// Pause before retrying a failed frame read.
    pub retry_delay: Duration,
}

/// Emitted after every stored sample.
#[derive(Debug)]
pub struct EnrollProgress<'a> {
    pub captured: usize,
    pub target: usize,
    pub path: &'a std::path::Path,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollOutcome {
    pub captured: usize,
    pub target: usize,
    pub cancelled: bool,
    pub partition: PathBuf,
}

/// Capture up to `options.target` samples of `identity`.
///
/// Every non-empty detected region of every frame is stored until the target is
/// reached or `cancel` is raised. Validation happens before the source is read.
pub fn enroll<S, D>(
    store: &SampleStore,
    identity: &str,
    options: &EnrollOptions,
    source: &mut S,
    detector: &mut D,
    cancel: &AtomicBool,
    mut on_progress: impl FnMut(&EnrollProgress<'_>),
) -> Result<EnrollOutcome, EnrollError>
where
    S: FrameSource + ?Sized,
    D: FaceDetector + ?Sized,
{
    validate_identity(identity).map_err(|_| EnrollError::InvalidIdentity(identity.to_string()))?;
    if options.target == 0 {
        return Err(EnrollError::InvalidTarget);
    }

    tracing::info!(identity, target = options.target, "enrollment started");

    let mut captured = 0usize;
    let mut failures = 0usize;

    while captured < options.target {
        if cancel.load(Ordering::Relaxed) {
            tracing::info!(identity, captured, "enrollment cancelled");
            return Ok(outcome(store, identity, captured, options, true));
        }

        let frame = match source.next_frame() {
            Ok(frame) => {
                failures = 0;
                frame
            }
            Err(e) if e.is_transient() && failures < MAX_CONSECUTIVE_READ_FAILURES => {
                failures += 1;
                tracing::warn!(error = %e, attempt = failures, "frame read failed; retrying");
                std::thread::sleep(options.retry_delay);
                continue;
            }
            Err(e) => return Err(EnrollError::Acquisition(e)),
        };

        for region in detector.detect(&frame)? {
            if captured >= options.target {
                break;
            }
            let Some(crop) = region.crop(&frame) else {
                tracing::debug!(%region, "empty crop; skipping");
                continue;
            };

            let path = store.store_sample(identity, &crop)?;
            captured += 1;
            on_progress(&EnrollProgress {
                captured,
                target: options.target,
                path: &path,
            });

            if !options.capture_interval.is_zero() {
                std::thread::sleep(options.capture_interval);
            }
        }
    }

    tracing::info!(identity, captured, "enrollment complete");
    Ok(outcome(store, identity, captured, options, false))
}

fn outcome(
    store: &SampleStore,
    identity: &str,
    captured: usize,
    options: &EnrollOptions,
    cancelled: bool,
) -> EnrollOutcome {
    EnrollOutcome {
        captured,
        target: options.target,
        cancelled,
        partition: store.partition(identity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{vertical_stripes, FixedDetector, ScriptedSource, WholeFrameDetector};
    use crate::types::Region;

    fn options(target: usize) -> EnrollOptions {
        EnrollOptions {
            target,
            capture_interval: Duration::ZERO,
            retry_delay: Duration::ZERO,
        }
    }

    fn frames(n: usize) -> Vec<image::GrayImage> {
        (0..n).map(|i| vertical_stripes(32, i as u8)).collect()
    }

    #[test]
    fn test_enroll_reaches_target() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::open(dir.path());
        let mut source = ScriptedSource::ok(frames(8));
        let cancel = AtomicBool::new(false);
        let mut seen = Vec::new();

        let out = enroll(
            &store,
            "alice",
            &options(5),
            &mut source,
            &mut WholeFrameDetector,
            &cancel,
            |p| seen.push(p.captured),
        )
        .unwrap();

        assert_eq!(out.captured, 5);
        assert!(!out.cancelled);
        assert_eq!(source.reads, 5);
        assert_eq!(store.identities().unwrap(), vec!["alice"]);
        assert_eq!(store.sample_count("alice").unwrap(), 5);
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_enroll_stops_mid_frame_at_target() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::open(dir.path());
        let mut source = ScriptedSource::ok(frames(4));
        let mut detector = FixedDetector(vec![Region::new(0, 0, 16, 16), Region::new(16, 16, 16, 16)]);

        let out = enroll(
            &store,
            "bob",
            &options(3),
            &mut source,
            &mut detector,
            &AtomicBool::new(false),
            |_| {},
        )
        .unwrap();

        assert_eq!(out.captured, 3);
        assert_eq!(source.reads, 2);
        assert_eq!(store.sample_count("bob").unwrap(), 3);
    }

    #[test]
    fn test_enroll_skips_empty_crops() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::open(dir.path());
        let mut source = ScriptedSource::ok(frames(2));
        let mut detector = FixedDetector(vec![Region::new(100, 100, 10, 10), Region::new(0, 0, 8, 8)]);

        let out = enroll(
            &store,
            "carol",
            &options(2),
            &mut source,
            &mut detector,
            &AtomicBool::new(false),
            |_| {},
        )
        .unwrap();

        assert_eq!(out.captured, 2);
        assert_eq!(source.reads, 2);
    }

    #[test]
    fn test_empty_identity_has_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::open(dir.path().join("dataset"));
        let mut source = ScriptedSource::ok(frames(3));

        let err = enroll(
            &store,
            "",
            &options(3),
            &mut source,
            &mut WholeFrameDetector,
            &AtomicBool::new(false),
            |_| {},
        )
        .unwrap_err();

        assert!(matches!(err, EnrollError::InvalidIdentity(_)));
        assert_eq!(source.reads, 0);
        assert!(!store.exists());
    }

    #[test]
    fn test_zero_target_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = enroll(
            &SampleStore::open(dir.path()),
            "alice",
            &options(0),
            &mut ScriptedSource::ok(frames(1)),
            &mut WholeFrameDetector,
            &AtomicBool::new(false),
            |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, EnrollError::InvalidTarget));
    }

    #[test]
    fn test_cancel_before_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::open(dir.path().join("dataset"));
        let mut source = ScriptedSource::ok(frames(3));

        let out = enroll(
            &store,
            "alice",
            &options(3),
            &mut source,
            &mut WholeFrameDetector,
            &AtomicBool::new(true),
            |_| {},
        )
        .unwrap();

        assert!(out.cancelled);
        assert_eq!(out.captured, 0);
        assert_eq!(source.reads, 0);
        assert!(!store.partition("alice").exists());
    }

    #[test]
    fn test_unavailable_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ScriptedSource::new(vec![Err(CaptureError::Unavailable("unplugged".into()))]);

        let err = enroll(
            &SampleStore::open(dir.path()),
            "alice",
            &options(3),
            &mut source,
            &mut WholeFrameDetector,
            &AtomicBool::new(false),
            |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, EnrollError::Acquisition(_)));
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::open(dir.path());
        let mut source = ScriptedSource::new(vec![
            Err(CaptureError::ReadFailed("timeout".into())),
            Ok(vertical_stripes(32, 0)),
            Err(CaptureError::ReadFailed("timeout".into())),
            Ok(vertical_stripes(32, 5)),
        ]);

        let out = enroll(
            &store,
            "alice",
            &options(2),
            &mut source,
            &mut WholeFrameDetector,
            &AtomicBool::new(false),
            |_| {},
        )
        .unwrap();
        assert_eq!(out.captured, 2);
        assert_eq!(source.reads, 4);
    }
}
