//! On-disk sample store: one directory per identity holding grayscale face crops.

use image::GrayImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File extensions eligible for training (compared case-insensitively).
pub const SAMPLE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

const SAMPLE_PREFIX: &str = "image_";
const SAMPLE_EXTENSION: &str = "png";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid identity name {0:?}: must be non-empty and must not contain path separators")]
    InvalidIdentity(String),
    #[error("sample store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to write sample {path}: {source}")]
    Write {
        path: String,
        source: image::ImageError,
    },
}

/// Check that `identity` can serve as a partition name.
pub fn validate_identity(identity: &str) -> Result<(), StoreError> {
    let trimmed = identity.trim();
    let invalid = trimmed.is_empty()
        || trimmed != identity
        || identity == "."
        || identity == ".."
        || identity.contains(|c: char| matches!(c, '/' | '\\' | '\0'));
    if invalid {
        return Err(StoreError::InvalidIdentity(identity.to_string()));
    }
    Ok(())
}

/// Whether `path` has one of the recognized raster extensions.
pub fn is_sample_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SAMPLE_EXTENSIONS.iter().any(|s| e.eq_ignore_ascii_case(s)))
        .unwrap_or(false)
}

/// Root directory of the sample store. Opening never touches the filesystem.
#[derive(Debug, Clone)]
pub struct SampleStore {
    root: PathBuf,
}

impl SampleStore {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Directory holding the samples of `identity`.
    pub fn partition(&self, identity: &str) -> PathBuf {
        self.root.join(identity)
    }

    /// Identity partitions, sorted by name. Non-directory entries are ignored;
    /// symlinks to directories count.
    pub fn identities(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => {
                    tracing::warn!(name = ?raw, "skipping partition with non UTF-8 name");
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Eligible sample files of `identity`, sorted by path.
    pub fn sample_paths(&self, identity: &str) -> Result<Vec<PathBuf>, StoreError> {
        let partition = self.partition(identity);
        if !partition.is_dir() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&partition)? {
            let path = entry?.path();
            if path.is_file() && is_sample_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    pub fn sample_count(&self, identity: &str) -> Result<usize, StoreError> {
        Ok(self.sample_paths(identity)?.len())
    }

    /// Persist `sample` as a new file under `identity`, creating the partition
    /// on first write. Existing samples are never overwritten.
    pub fn store_sample(&self, identity: &str, sample: &GrayImage) -> Result<PathBuf, StoreError> {
        validate_identity(identity)?;
        let partition = self.partition(identity);
        std::fs::create_dir_all(&partition)?;

        let index = next_sample_index(&partition)?;
        let path = partition.join(format!("{SAMPLE_PREFIX}{index}.{SAMPLE_EXTENSION}"));
        sample.save(&path).map_err(|source| StoreError::Write {
            path: path.display().to_string(),
            source,
        })?;
        Ok(path)
    }
}

/// One past the highest `image_<n>` index in `partition`.
fn next_sample_index(partition: &Path) -> Result<u64, StoreError> {
    let mut max = 0u64;
    for entry in std::fs::read_dir(partition)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let index = name
            .strip_prefix(SAMPLE_PREFIX)
            .and_then(|rest| rest.split('.').next())
            .and_then(|n| n.parse::<u64>().ok());
        if let Some(n) = index {
            max = max.max(n);
        }
    }
    Ok(max + 1)
}
