//! Face detection adapter.
//!
//! [`FaceDetector`] is the seam the rest of the crate talks to; [`SeetaDetector`]
//! backs it with the SeetaFace funnel cascade from `rustface`.

use crate::types::Region;
use image::GrayImage;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

const SEETA_MIN_FACE_SIZE: u32 = 20;
const SEETA_SCORE_THRESHOLD: f64 = 2.0;
const SEETA_PYRAMID_SCALE: f32 = 0.8;
const SEETA_WINDOW_STEP: u32 = 4;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector model not found: {0}; download seeta_fd_frontal_v1.0.bin and point detector_model at it")]
    ModelNotFound(String),
    #[error("failed to load detector model {path}: {source}")]
    Load {
        path: String,
        source: std::io::Error,
    },
    #[error("detection failed: {0}")]
    DetectionFailed(String),
}

/// Finds face regions in a grayscale frame. An empty result is valid.
///
/// Regions come back in whatever order the backend produces.
pub trait FaceDetector {
    fn detect(&mut self, frame: &GrayImage) -> Result<Vec<Region>, DetectorError>;
}

impl<D: FaceDetector + ?Sized> FaceDetector for Box<D> {
    fn detect(&mut self, frame: &GrayImage) -> Result<Vec<Region>, DetectorError> {
        (**self).detect(frame)
    }
}

/// SeetaFace frontal detector.
pub struct SeetaDetector {
    inner: Box<dyn rustface::Detector>,
}

impl SeetaDetector {
    /// Load a SeetaFace model file (e.g. `seeta_fd_frontal_v1.0.bin`).
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.is_file() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let load_err = |source| DetectorError::Load {
            path: model_path.display().to_string(),
            source,
        };
        let file = File::open(model_path).map_err(load_err)?;
        let model = rustface::read_model(BufReader::new(file)).map_err(load_err)?;

        let mut inner = rustface::create_detector_with_model(model);
        inner.set_min_face_size(SEETA_MIN_FACE_SIZE);
        inner.set_score_thresh(SEETA_SCORE_THRESHOLD);
        inner.set_pyramid_scale_factor(SEETA_PYRAMID_SCALE);
        inner.set_slide_window_step(SEETA_WINDOW_STEP, SEETA_WINDOW_STEP);

        tracing::info!(path = %model_path.display(), "loaded SeetaFace detector");

        Ok(Self { inner })
    }
}

impl FaceDetector for SeetaDetector {
    fn detect(&mut self, frame: &GrayImage) -> Result<Vec<Region>, DetectorError> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let image = rustface::ImageData::new(frame.as_raw(), width, height);
        let faces = self.inner.detect(&image);

        Ok(faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                Region::new(bbox.x(), bbox.y(), bbox.width(), bbox.height())
            })
            .collect())
    }
}
