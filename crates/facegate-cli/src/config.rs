use facegate_core::{Artifacts, EnrollOptions, Pacing};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime configuration. Defaults, then an optional TOML file, then
/// `FACEGATE_*` environment variables; command-line flags override last.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Camera index (`/dev/video<N>`). Prompted for when unset.
    pub camera_index: Option<u32>,
    /// SeetaFace detection model file.
    pub detector_model: PathBuf,
    /// Sample store root: one directory per identity.
    pub dataset_dir: PathBuf,
    /// Trained classifier model.
    pub model_path: PathBuf,
    /// Identity name → label mapping.
    pub registry_path: PathBuf,
    /// LBPH distance below which a face is accepted.
    pub threshold: f64,
    /// Samples captured per enrollment.
    pub target_samples: usize,
    pub capture_interval_ms: u64,
    pub frame_interval_ms: u64,
    pub retry_delay_ms: u64,
    /// Flip frames left-to-right before detection.
    pub mirror: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_index: None,
            detector_model: PathBuf::from("seeta_fd_frontal_v1.0.bin"),
            dataset_dir: PathBuf::from("dataset"),
            model_path: PathBuf::from("model.lbph.json"),
            registry_path: PathBuf::from("name_mapping.json"),
            threshold: 65.0,
            target_samples: 50,
            capture_interval_ms: 50,
            frame_interval_ms: 10,
            retry_delay_ms: 10,
            mirror: true,
        }
    }
}

impl Config {
    /// Load from `path` (or `FACEGATE_CONFIG` when `path` is `None`) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("FACEGATE_CONFIG").map(PathBuf::from));

        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `FACEGATE_*` variables as returned by `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = env_parse::<u32>(&lookup, "FACEGATE_CAMERA_INDEX")? {
            self.camera_index = Some(v);
        }
        if let Some(v) = lookup("FACEGATE_DETECTOR_MODEL") {
            self.detector_model = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEGATE_DATASET_DIR") {
            self.dataset_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEGATE_MODEL_PATH") {
            self.model_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEGATE_REGISTRY_PATH") {
            self.registry_path = PathBuf::from(v);
        }
        if let Some(v) = env_parse(&lookup, "FACEGATE_THRESHOLD")? {
            self.threshold = v;
        }
        if let Some(v) = env_parse(&lookup, "FACEGATE_TARGET_SAMPLES")? {
            self.target_samples = v;
        }
        if let Some(v) = env_parse(&lookup, "FACEGATE_CAPTURE_INTERVAL_MS")? {
            self.capture_interval_ms = v;
        }
        if let Some(v) = env_parse(&lookup, "FACEGATE_FRAME_INTERVAL_MS")? {
            self.frame_interval_ms = v;
        }
        if let Some(v) = env_parse(&lookup, "FACEGATE_RETRY_DELAY_MS")? {
            self.retry_delay_ms = v;
        }
        if let Some(v) = lookup("FACEGATE_MIRROR") {
            self.mirror = v != "0";
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "threshold must be a positive number, got {}",
                self.threshold
            )));
        }
        if self.target_samples == 0 {
            return Err(ConfigError::Invalid("target_samples must be at least 1".into()));
        }
        Ok(())
    }

    pub fn artifacts(&self) -> Artifacts {
        Artifacts::new(&self.model_path, &self.registry_path)
    }

    pub fn enroll_options(&self) -> EnrollOptions {
        EnrollOptions {
            target: self.target_samples,
            capture_interval: Duration::from_millis(self.capture_interval_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn pacing(&self) -> Pacing {
        Pacing {
            frame_interval: Duration::from_millis(self.frame_interval_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    /// Files `login` needs, paired with how to obtain each missing one.
    pub fn missing_login_files(&self) -> Vec<(&Path, &'static str)> {
        [
            (
                self.detector_model.as_path(),
                "download the SeetaFace model (seeta_fd_frontal_v1.0.bin)",
            ),
            (self.model_path.as_path(), "run `facegate train`"),
            (self.registry_path.as_path(), "run `facegate train`"),
        ]
        .into_iter()
        .filter(|(path, _)| !path.is_file())
        .collect()
    }
}

fn env_parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}
