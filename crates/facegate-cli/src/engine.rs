//! Camera-owning worker thread for capture and login.
//!
//! V4L2 streaming and detection are blocking, so both run on a dedicated OS
//! thread. The async side receives events over a tokio channel and stops the
//! worker through a shared cancel flag. The camera is opened, and released,
//! on the worker thread.

use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use facegate_core::{
    enroll, run_session, CaptureError, EnrollOutcome, FrameReport, FrameSource, LbphClassifier,
    RecognitionEngine, SampleStore, SeetaDetector, SessionSummary,
};
use facegate_hw::{device_path, Camera, CameraError, Frame, FrameStream};
use image::GrayImage;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};

const THREAD_NAME: &str = "facegate-engine";
const EVENT_QUEUE: usize = 8;

/// Adapts a V4L2 [`FrameStream`] to the core [`FrameSource`] seam.
pub struct CameraSource<'a> {
    stream: FrameStream<'a>,
}

impl<'a> CameraSource<'a> {
    pub fn new(stream: FrameStream<'a>) -> Self {
        Self { stream }
    }
}

impl FrameSource for CameraSource<'_> {
    fn next_frame(&mut self) -> Result<GrayImage, CaptureError> {
        let frame = self.stream.next_frame().map_err(capture_error)?;
        frame_to_image(frame)
    }
}

/// Read failures are worth retrying; anything else means the device is gone.
fn capture_error(err: CameraError) -> CaptureError {
    match err {
        CameraError::Read(msg) => CaptureError::ReadFailed(msg),
        other => CaptureError::Unavailable(other.to_string()),
    }
}

fn frame_to_image(frame: Frame) -> Result<GrayImage, CaptureError> {
    let (width, height, len) = (frame.width, frame.height, frame.data.len());
    GrayImage::from_raw(width, height, frame.data).ok_or_else(|| {
        CaptureError::ReadFailed(format!("{len} bytes do not fill a {width}x{height} frame"))
    })
}

/// Enrollment progress forwarded to the terminal.
#[derive(Debug, Clone, Copy)]
pub struct CaptureProgress {
    pub captured: usize,
    pub target: usize,
}

/// A running worker: its event stream and the thread's final result.
pub struct Worker<E, R> {
    pub events: mpsc::Receiver<E>,
    thread: JoinHandle<Result<R>>,
}

impl<E, R: Send + 'static> Worker<E, R> {
    /// Wait for the worker to report that its camera and models are ready.
    async fn start(
        events: mpsc::Receiver<E>,
        ready: oneshot::Receiver<Result<()>>,
        thread: JoinHandle<Result<R>>,
    ) -> Result<Self> {
        match ready.await {
            Ok(Ok(())) => Ok(Self { events, thread }),
            Ok(Err(e)) => {
                let _ = join_thread(thread).await;
                Err(e)
            }
            Err(_) => match join_thread(thread).await {
                Err(e) => Err(e),
                Ok(_) => Err(anyhow!("engine thread exited during startup")),
            },
        }
    }

    /// Wait for the worker thread to exit without blocking the runtime.
    pub async fn join(self) -> Result<R> {
        join_thread(self.thread).await
    }
}

async fn join_thread<R: Send + 'static>(thread: JoinHandle<Result<R>>) -> Result<R> {
    tokio::task::spawn_blocking(move || thread.join())
        .await
        .context("engine join task failed")?
        .map_err(|_| anyhow!("engine thread panicked"))?
}

fn startup_failed<T>(ready: oneshot::Sender<Result<()>>, err: anyhow::Error) -> Result<T> {
    tracing::error!(error = %format!("{err:#}"), "engine startup failed");
    let _ = ready.send(Err(err));
    Err(anyhow!("engine startup failed"))
}

/// Forward enrollment progress. A closed receiver means nobody is watching
/// any more, so the capture is cancelled.
fn forward_progress(tx: &mpsc::Sender<CaptureProgress>, cancel: &AtomicBool, progress: CaptureProgress) {
    if tx.blocking_send(progress).is_err() && !cancel.swap(true, Ordering::Relaxed) {
        tracing::warn!("progress receiver closed; cancelling capture");
    }
}

fn open_camera(index: u32, mirror: bool) -> Result<Camera> {
    Camera::open(index, mirror).with_context(|| {
        format!(
            "could not open camera {}; check the index with `facegate devices`",
            device_path(index)
        )
    })
}

fn load_detector(config: &Config) -> Result<SeetaDetector> {
    Ok(SeetaDetector::load(&config.detector_model)?)
}

/// Start the live login loop on the engine thread.
///
/// Fails if the models or the camera cannot be loaded. Each processed frame
/// is sent as a [`FrameReport`]; the loop ends when `cancel` is raised or the
/// receiver is dropped.
pub async fn spawn_login(
    config: Config,
    camera_index: u32,
    cancel: Arc<AtomicBool>,
) -> Result<Worker<FrameReport, SessionSummary>> {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE);
    let (ready_tx, ready_rx) = oneshot::channel();

    let thread = std::thread::Builder::new()
        .name(THREAD_NAME.into())
        .spawn(move || {
            let loaded = load_detector(&config).and_then(|detector| {
                RecognitionEngine::load(
                    detector,
                    LbphClassifier::default(),
                    &config.artifacts(),
                    config.threshold,
                )
                .map_err(anyhow::Error::from)
            });
            let mut engine = match loaded {
                Ok(engine) => engine,
                Err(e) => return startup_failed(ready_tx, e),
            };
            let camera = match open_camera(camera_index, config.mirror) {
                Ok(camera) => camera,
                Err(e) => return startup_failed(ready_tx, e),
            };
            let mut source = match camera.stream() {
                Ok(stream) => CameraSource::new(stream),
                Err(e) => return startup_failed(ready_tx, e.into()),
            };
            let _ = ready_tx.send(Ok(()));
            tracing::info!(threshold = engine.threshold(), "engine thread started");

            let summary = run_session(&mut source, &mut engine, config.pacing(), &cancel, |report| {
                match tx.blocking_send(report.clone()) {
                    Ok(()) => ControlFlow::Continue(()),
                    Err(_) => ControlFlow::Break(()),
                }
            })?;
            tracing::info!("engine thread exiting");
            Ok(summary)
        })
        .context("failed to spawn engine thread")?;

    Worker::start(rx, ready_rx, thread).await
}

/// Start capturing samples of `identity` on the engine thread.
pub async fn spawn_capture(
    config: Config,
    identity: String,
    camera_index: u32,
    cancel: Arc<AtomicBool>,
) -> Result<Worker<CaptureProgress, EnrollOutcome>> {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE);
    let (ready_tx, ready_rx) = oneshot::channel();

    let thread = std::thread::Builder::new()
        .name(THREAD_NAME.into())
        .spawn(move || {
            let mut detector = match load_detector(&config) {
                Ok(detector) => detector,
                Err(e) => return startup_failed(ready_tx, e),
            };
            let camera = match open_camera(camera_index, config.mirror) {
                Ok(camera) => camera,
                Err(e) => return startup_failed(ready_tx, e),
            };
            let mut source = match camera.stream() {
                Ok(stream) => CameraSource::new(stream),
                Err(e) => return startup_failed(ready_tx, e.into()),
            };
            let _ = ready_tx.send(Ok(()));

            let store = SampleStore::open(&config.dataset_dir);
            let outcome = enroll(
                &store,
                &identity,
                &config.enroll_options(),
                &mut source,
                &mut detector,
                &cancel,
                |progress| {
                    let progress = CaptureProgress {
                        captured: progress.captured,
                        target: progress.target,
                    };
                    forward_progress(&tx, &cancel, progress);
                },
            )?;
            Ok(outcome)
        })
        .context("failed to spawn engine thread")?;

    Worker::start(rx, ready_rx, thread).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: Vec<u8>, width: u32, height: u32) -> Frame {
        Frame {
            data,
            width,
            height,
            sequence: 0,
        }
    }

    #[test]
    fn test_frame_to_image() {
        let image = frame_to_image(frame(vec![1, 2, 3, 4, 5, 6], 3, 2)).unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(2, 1).0, [6]);
    }

    #[test]
    fn test_short_frame_is_transient() {
        let err = frame_to_image(frame(vec![0; 5], 3, 2)).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_capture_error_mapping() {
        assert!(capture_error(CameraError::Read("dequeue failed".into())).is_transient());
        assert!(!capture_error(CameraError::Busy("/dev/video0".into())).is_transient());
        assert!(!capture_error(CameraError::NotFound("/dev/video9".into())).is_transient());
    }

    #[test]
    fn test_closed_progress_receiver_cancels_capture() {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE);
        let cancel = AtomicBool::new(false);
        let progress = CaptureProgress {
            captured: 1,
            target: 100,
        };

        forward_progress(&tx, &cancel, progress);
        assert!(!cancel.load(Ordering::Relaxed));

        drop(rx);
        forward_progress(&tx, &cancel, progress);
        assert!(cancel.load(Ordering::Relaxed));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_join_waits_for_thread_result() {
        let (_tx, events) = mpsc::channel::<()>(1);
        let thread = std::thread::spawn(|| {
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok(7)
        });
        let worker = Worker { events, thread };
        assert_eq!(worker.join().await.unwrap(), 7);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_join_reports_panicked_thread() {
        let (_tx, events) = mpsc::channel::<()>(1);
        let thread = std::thread::spawn(|| -> Result<()> { panic!("boom") });
        let worker = Worker { events, thread };
        let err = worker.join().await.unwrap_err();
        assert!(err.to_string().contains("panicked"));
    }

    #[tokio::test]
    async fn test_login_fails_fast_without_models() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            detector_model: dir.path().join("missing.bin"),
            model_path: dir.path().join("model.json"),
            registry_path: dir.path().join("names.json"),
            ..Config::default()
        };
        let cancel = Arc::new(AtomicBool::new(false));
        assert!(spawn_login(config, 0, cancel).await.is_err());
    }

    #[tokio::test]
    async fn test_capture_fails_fast_without_detector() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            detector_model: dir.path().join("missing.bin"),
            dataset_dir: dir.path().join("dataset"),
            ..Config::default()
        };
        let cancel = Arc::new(AtomicBool::new(false));
        let result = spawn_capture(config, "alice".into(), 0, cancel).await;
        assert!(result.is_err());
        assert!(!dir.path().join("dataset").exists());
    }
}
