//! Batch training: sample store → classifier model + identity registry.

use crate::classifier::{Classifier, ClassifierError, LabeledSample};
use crate::registry::{IdentityRegistry, RegistryError};
use crate::store::{SampleStore, StoreError};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("dataset directory not found: {0}; run `facegate capture` first")]
    DatasetMissing(String),
    #[error("no face samples found under {0}; run `facegate capture` first")]
    NoSamples(String),
    #[error("sample store error: {0}")]
    Store(#[from] StoreError),
    #[error("classifier rejected the training data: {0}; check the dataset or capture more people with `facegate capture`")]
    Classifier(#[source] ClassifierError),
    #[error("failed to write artifacts: {0}; check write permissions for the model and registry paths")]
    Persist(String),
}

/// Paths of the two files produced by training. They are only valid as a pair.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub model_path: PathBuf,
    pub registry_path: PathBuf,
}

impl Artifacts {
    pub fn new(model_path: impl Into<PathBuf>, registry_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            registry_path: registry_path.into(),
        }
    }

    /// Artifact files that do not exist yet.
    pub fn missing(&self) -> Vec<&Path> {
        [self.model_path.as_path(), self.registry_path.as_path()]
            .into_iter()
            .filter(|p| !p.is_file())
            .collect()
    }
}

/// Every loadable sample in the store, labeled in discovery order.
#[derive(Debug)]
pub struct TrainingSet {
    pub samples: Vec<LabeledSample>,
    pub registry: IdentityRegistry,
    /// Eligible files that could not be decoded.
    pub skipped: usize,
}

/// What a successful [`train`] wrote.
#[derive(Debug)]
pub struct TrainSummary {
    pub registry: IdentityRegistry,
    pub samples: usize,
    pub skipped: usize,
}

/// Walk the store and load every sample. Unreadable files are skipped with a warning.
pub fn collect_samples(store: &SampleStore) -> Result<TrainingSet, TrainError> {
    if !store.exists() {
        return Err(TrainError::DatasetMissing(store.root().display().to_string()));
    }

    let mut registry = IdentityRegistry::new();
    let mut samples = Vec::new();
    let mut skipped = 0usize;

    for identity in store.identities()? {
        let label = registry.assign(&identity);
        tracing::info!(identity = %identity, label, "training on identity");

        for path in store.sample_paths(&identity)? {
            match image::open(&path) {
                Ok(img) => samples.push(LabeledSample {
                    image: img.to_luma8(),
                    label,
                }),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "could not read sample; skipping");
                    skipped += 1;
                }
            }
        }
    }

    Ok(TrainingSet {
        samples,
        registry,
        skipped,
    })
}

/// Retrain from scratch and replace both artifacts.
///
/// Either both files are written or neither is touched: nothing is persisted
/// until the classifier has fitted successfully, and both files are staged
/// next to their targets before being renamed into place.
pub fn train<C: Classifier>(
    store: &SampleStore,
    classifier: &C,
    artifacts: &Artifacts,
) -> Result<TrainSummary, TrainError> {
    let set = collect_samples(store)?;
    if set.samples.is_empty() {
        return Err(TrainError::NoSamples(store.root().display().to_string()));
    }

    tracing::info!(
        samples = set.samples.len(),
        identities = set.registry.len(),
        skipped = set.skipped,
        "fitting classifier"
    );

    let model = classifier.train(&set.samples).map_err(TrainError::Classifier)?;
    persist(classifier, &model, &set.registry, artifacts)?;

    tracing::info!(
        model = %artifacts.model_path.display(),
        registry = %artifacts.registry_path.display(),
        "training complete"
    );

    Ok(TrainSummary {
        samples: set.samples.len(),
        skipped: set.skipped,
        registry: set.registry,
    })
}

fn persist<C: Classifier>(
    classifier: &C,
    model: &C::Model,
    registry: &IdentityRegistry,
    artifacts: &Artifacts,
) -> Result<(), TrainError> {
    for path in [&artifacts.model_path, &artifacts.registry_path] {
        if path.is_dir() {
            return Err(TrainError::Persist(format!(
                "{} is a directory; point the artifact path at a file",
                path.display()
            )));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| TrainError::Persist(format!("{}: {e}", parent.display())))?;
        }
    }

    let model_staged = staging_path(&artifacts.model_path);
    let registry_staged = staging_path(&artifacts.registry_path);

    let staged = classifier
        .save_model(model, &model_staged)
        .map_err(|e| TrainError::Persist(format!("{}: {e}", model_staged.display())))
        .and_then(|()| {
            registry
                .save(&registry_staged)
                .map_err(|e: RegistryError| TrainError::Persist(format!("{}: {e}", registry_staged.display())))
        });
    if let Err(e) = staged {
        discard(&[&model_staged, &registry_staged]);
        return Err(e);
    }

    if let Err(e) = commit(&model_staged, &registry_staged, artifacts) {
        discard(&[&model_staged, &registry_staged]);
        return Err(TrainError::Persist(e.to_string()));
    }
    Ok(())
}

/// Rename both staged files into place. The previous model is parked at
/// `<model>.bak` until the registry has landed, and put back if it does not.
fn commit(model_staged: &Path, registry_staged: &Path, artifacts: &Artifacts) -> std::io::Result<()> {
    let model = &artifacts.model_path;
    let backup = sibling_path(model, "bak");
    let had_model = model.is_file();
    if had_model {
        std::fs::rename(model, &backup)?;
    }

    let landed = std::fs::rename(model_staged, model)
        .and_then(|()| std::fs::rename(registry_staged, &artifacts.registry_path));
    if let Err(e) = landed {
        let restored = if had_model {
            std::fs::rename(&backup, model)
        } else if model.exists() {
            std::fs::remove_file(model)
        } else {
            Ok(())
        };
        if let Err(restore) = restored {
            tracing::error!(path = %model.display(), error = %restore, "failed to restore previous model");
        }
        return Err(e);
    }

    if had_model {
        if let Err(e) = std::fs::remove_file(&backup) {
            tracing::warn!(path = %backup.display(), error = %e, "failed to remove model backup");
        }
    }
    Ok(())
}

/// `<file>.tmp` next to `path`.
fn staging_path(path: &Path) -> PathBuf {
    sibling_path(path, "tmp")
}

/// `<file>.<suffix>` next to `path`.
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("artifact"));
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn discard(paths: &[&Path]) {
    for path in paths {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove staged artifact");
            }
        }
    }
}
