//! Local Binary Patterns Histograms (LBPH) face classifier.
//!
//! Each sample is turned into a circular LBP code image, split into a grid of
//! cells, and summarised as one normalized histogram per cell. Prediction is a
//! nearest-neighbour search over the training histograms using the symmetric
//! chi-square distance, so the score is unbounded above and 0 for a perfect match.

use crate::classifier::{Classifier, ClassifierError, LabeledSample};
use crate::types::{Label, Prediction};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

// --- Named constants ---
const LBPH_DEFAULT_RADIUS: u32 = 1;
const LBPH_DEFAULT_NEIGHBORS: u32 = 8;
const LBPH_DEFAULT_GRID: u32 = 8;
const LBPH_MAX_NEIGHBORS: u32 = 16;
/// Interpolated neighbours this close to the centre count as "not darker".
const LBP_EPSILON: f64 = 1e-7;
const CHI_SQUARE_EPSILON: f64 = 1e-12;

/// Operator geometry. Stored inside every model so prediction always matches training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LbphParams {
    pub radius: u32,
    pub neighbors: u32,
    pub grid_x: u32,
    pub grid_y: u32,
}

impl Default for LbphParams {
    fn default() -> Self {
        Self {
            radius: LBPH_DEFAULT_RADIUS,
            neighbors: LBPH_DEFAULT_NEIGHBORS,
            grid_x: LBPH_DEFAULT_GRID,
            grid_y: LBPH_DEFAULT_GRID,
        }
    }
}

impl LbphParams {
    fn validate(&self) -> Result<(), ClassifierError> {
        if self.radius == 0 {
            return Err(ClassifierError::InvalidParameters("radius must be >= 1".into()));
        }
        if self.neighbors == 0 || self.neighbors > LBPH_MAX_NEIGHBORS {
            return Err(ClassifierError::InvalidParameters(format!(
                "neighbors must be in 1..={LBPH_MAX_NEIGHBORS}, got {}",
                self.neighbors
            )));
        }
        if self.grid_x == 0 || self.grid_y == 0 {
            return Err(ClassifierError::InvalidParameters("grid must be at least 1x1".into()));
        }
        Ok(())
    }

    fn bins(&self) -> usize {
        1usize << self.neighbors
    }

    fn histogram_len(&self) -> usize {
        (self.grid_x * self.grid_y) as usize * self.bins()
    }
}

/// Trained LBPH state: one spatial histogram per training sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LbphModel {
    pub params: LbphParams,
    histograms: Vec<Vec<f32>>,
    labels: Vec<Label>,
}

impl LbphModel {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn check(&self) -> Result<(), ClassifierError> {
        self.params.validate()?;
        if self.histograms.is_empty() {
            return Err(ClassifierError::Corrupt("model holds no histograms".into()));
        }
        if self.histograms.len() != self.labels.len() {
            return Err(ClassifierError::Corrupt(format!(
                "{} histograms but {} labels",
                self.histograms.len(),
                self.labels.len()
            )));
        }
        let expected = self.params.histogram_len();
        if let Some(bad) = self.histograms.iter().find(|h| h.len() != expected) {
            return Err(ClassifierError::Corrupt(format!(
                "histogram of length {}, expected {expected}",
                bad.len()
            )));
        }
        Ok(())
    }
}

/// LBPH classifier. Works with a single identity.
#[derive(Debug, Clone, Default)]
pub struct LbphClassifier {
    params: LbphParams,
}

impl LbphClassifier {
    pub fn new(params: LbphParams) -> Result<Self, ClassifierError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> LbphParams {
        self.params
    }
}

impl Classifier for LbphClassifier {
    type Model = LbphModel;

    fn train(&self, samples: &[LabeledSample]) -> Result<LbphModel, ClassifierError> {
        if samples.is_empty() {
            return Err(ClassifierError::EmptyTrainingSet);
        }

        let mut histograms = Vec::with_capacity(samples.len());
        let mut labels = Vec::with_capacity(samples.len());
        for sample in samples {
            histograms.push(describe(&sample.image, &self.params)?);
            labels.push(sample.label);
        }

        tracing::debug!(samples = labels.len(), params = ?self.params, "LBPH model fitted");

        Ok(LbphModel {
            params: self.params,
            histograms,
            labels,
        })
    }

    fn predict(&self, model: &LbphModel, sample: &GrayImage) -> Result<Prediction, ClassifierError> {
        let query = describe(sample, &model.params)?;

        let mut best: Option<Prediction> = None;
        for (hist, &label) in model.histograms.iter().zip(&model.labels) {
            let distance = chi_square(hist, &query);
            if best.map_or(true, |b| distance < b.distance) {
                best = Some(Prediction { label, distance });
            }
        }

        best.ok_or_else(|| ClassifierError::Corrupt("model holds no histograms".into()))
    }

    fn labels(&self, model: &LbphModel) -> Vec<Label> {
        let mut labels = model.labels.clone();
        labels.sort_unstable();
        labels.dedup();
        labels
    }

    fn save_model(&self, model: &LbphModel, path: &Path) -> Result<(), ClassifierError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, model)?;
        writer.flush()?;
        Ok(())
    }

    fn load_model(&self, path: &Path) -> Result<LbphModel, ClassifierError> {
        if !path.is_file() {
            return Err(ClassifierError::ModelNotFound(path.display().to_string()));
        }
        let model: LbphModel = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        model.check()?;
        tracing::info!(path = %path.display(), samples = model.len(), "loaded LBPH model");
        Ok(model)
    }
}

/// Spatial LBP histogram of one sample.
fn describe(image: &GrayImage, params: &LbphParams) -> Result<Vec<f32>, ClassifierError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(ClassifierError::InvalidSample("empty image".into()));
    }
    let (codes, code_w, code_h) = lbp_codes(image, params.radius, params.neighbors);
    Ok(spatial_histogram(&codes, code_w, code_h, params))
}

/// Circular LBP with bilinear interpolation of off-grid neighbours.
///
/// Returns the code image, which is `2 * radius` smaller in each dimension.
fn lbp_codes(image: &GrayImage, radius: u32, neighbors: u32) -> (Vec<u32>, usize, usize) {
    let (cols, rows) = (image.width() as usize, image.height() as usize);
    let r = radius as usize;
    if cols <= 2 * r || rows <= 2 * r {
        return (Vec::new(), 0, 0);
    }
    let out_w = cols - 2 * r;
    let out_h = rows - 2 * r;
    let mut codes = vec![0u32; out_w * out_h];

    let raw = image.as_raw();
    let px = |x: usize, y: usize| raw[y * cols + x] as f64;

    for n in 0..neighbors {
        let angle = 2.0 * std::f64::consts::PI * n as f64 / neighbors as f64;
        let sx = radius as f64 * angle.cos();
        let sy = -(radius as f64) * angle.sin();

        let (fx, fy) = (sx.floor(), sy.floor());
        let (cx, cy) = (sx.ceil(), sy.ceil());
        let (tx, ty) = (sx - fx, sy - fy);
        let w1 = (1.0 - tx) * (1.0 - ty);
        let w2 = tx * (1.0 - ty);
        let w3 = (1.0 - tx) * ty;
        let w4 = tx * ty;

        // Offsets lie in [-r, r], so shifting by r keeps indices unsigned.
        let (fx, fy) = ((fx as i64 + r as i64) as usize, (fy as i64 + r as i64) as usize);
        let (cx, cy) = ((cx as i64 + r as i64) as usize, (cy as i64 + r as i64) as usize);

        for oy in 0..out_h {
            for ox in 0..out_w {
                let t = w1 * px(ox + fx, oy + fy)
                    + w2 * px(ox + cx, oy + fy)
                    + w3 * px(ox + fx, oy + cy)
                    + w4 * px(ox + cx, oy + cy);
                let c = px(ox + r, oy + r);
                if t > c || (t - c).abs() < LBP_EPSILON {
                    codes[oy * out_w + ox] |= 1 << n;
                }
            }
        }
    }

    (codes, out_w, out_h)
}

/// Concatenated per-cell histograms, each normalized to sum to 1.
///
/// Cell bounds are proportional, so images smaller than the grid yield empty
/// (all-zero) cells instead of failing.
fn spatial_histogram(codes: &[u32], width: usize, height: usize, params: &LbphParams) -> Vec<f32> {
    let bins = params.bins();
    let (gx, gy) = (params.grid_x as usize, params.grid_y as usize);
    let mut hist = vec![0f32; params.histogram_len()];

    for row in 0..gy {
        let (y0, y1) = (row * height / gy, (row + 1) * height / gy);
        for col in 0..gx {
            let (x0, x1) = (col * width / gx, (col + 1) * width / gx);
            let count = (x1 - x0) * (y1 - y0);
            if count == 0 {
                continue;
            }

            let cell = &mut hist[(row * gx + col) * bins..][..bins];
            for y in y0..y1 {
                for x in x0..x1 {
                    cell[codes[y * width + x] as usize] += 1.0;
                }
            }
            for v in cell.iter_mut() {
                *v /= count as f32;
            }
        }
    }

    hist
}

/// Symmetric chi-square distance: `2 * Σ (a - b)² / (a + b)`.
fn chi_square(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&a, &b)| {
            let (a, b) = (a as f64, b as f64);
            let sum = a + b;
            if sum > CHI_SQUARE_EPSILON {
                2.0 * (a - b) * (a - b) / sum
            } else {
                0.0
            }
        })
        .sum()
}
