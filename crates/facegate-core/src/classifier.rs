//! Face classification adapter.
//!
//! A [`Classifier`] fits an opaque model from labeled samples in one batch and
//! predicts the closest label for a new sample. Scores are distances: lower
//! means a stronger match.

use crate::types::{Label, Prediction};
use image::GrayImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("no training samples supplied")]
    EmptyTrainingSet,
    #[error("classifier needs samples from at least {required} identities, got {found}")]
    InsufficientIdentities { required: usize, found: usize },
    #[error("invalid classifier parameters: {0}")]
    InvalidParameters(String),
    #[error("invalid sample: {0}")]
    InvalidSample(String),
    #[error("model file not found: {0}; run `facegate train` first")]
    ModelNotFound(String),
    #[error("model I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("model format error: {0}")]
    Format(#[from] serde_json::Error),
    #[error("model is corrupt: {0}")]
    Corrupt(String),
}

/// A grayscale face crop paired with its identity label.
#[derive(Debug, Clone)]
pub struct LabeledSample {
    pub image: GrayImage,
    pub label: Label,
}

pub trait Classifier {
    type Model;

    /// Fit a model from the full sample set. No incremental updates.
    fn train(&self, samples: &[LabeledSample]) -> Result<Self::Model, ClassifierError>;

    /// Closest label for `sample` and its distance.
    fn predict(&self, model: &Self::Model, sample: &GrayImage) -> Result<Prediction, ClassifierError>;

    /// Distinct labels the model can predict, ascending.
    fn labels(&self, model: &Self::Model) -> Vec<Label>;

    fn save_model(&self, model: &Self::Model, path: &Path) -> Result<(), ClassifierError>;

    fn load_model(&self, path: &Path) -> Result<Self::Model, ClassifierError>;
}
