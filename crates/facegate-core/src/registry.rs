//! Identity registry: bijection between identity names and dense labels.
//!
//! Persisted as a flat JSON object (`{"alice": 0, "bob": 1}`) next to the
//! model artifact. The two files are only meaningful as a pair.

use crate::types::Label;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("registry file not found: {0}; run `facegate train` first")]
    NotFound(String),
    #[error("registry I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("registry is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("registry is inconsistent: {0}")]
    Inconsistent(String),
}

/// Identity ↔ label mapping. Labels are assigned densely in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityRegistry {
    /// Indexed by label.
    names: Vec<String>,
    labels: HashMap<String, Label>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the label for `identity`, assigning the next free one on first sight.
    pub fn assign(&mut self, identity: &str) -> Label {
        if let Some(&label) = self.labels.get(identity) {
            return label;
        }
        let label = self.names.len() as Label;
        self.names.push(identity.to_string());
        self.labels.insert(identity.to_string(), label);
        label
    }

    pub fn label_of(&self, identity: &str) -> Option<Label> {
        self.labels.get(identity).copied()
    }

    pub fn identity_of(&self, label: Label) -> Option<&str> {
        self.names.get(label as usize).map(String::as_str)
    }

    pub fn contains_label(&self, label: Label) -> bool {
        (label as usize) < self.names.len()
    }

    /// Label → identity view, as consumed by recognition.
    pub fn reverse(&self) -> BTreeMap<Label, String> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (i as Label, name.clone()))
            .collect()
    }

    /// Identities in label order.
    pub fn identities(&self) -> impl Iterator<Item = (&str, Label)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i as Label))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Serialize as a pretty-printed JSON object.
    pub fn to_json(&self) -> Result<String, RegistryError> {
        let map: BTreeMap<&str, Label> = self.identities().collect();
        Ok(serde_json::to_string_pretty(&map)?)
    }

    /// Parse a JSON object and check that labels form a dense `0..n` range.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let map: BTreeMap<String, Label> = serde_json::from_str(json)?;

        let mut names = vec![None; map.len()];
        for (name, &label) in &map {
            if name.is_empty() {
                return Err(RegistryError::Inconsistent("empty identity name".into()));
            }
            let slot = names.get_mut(label as usize).ok_or_else(|| {
                RegistryError::Inconsistent(format!(
                    "label {label} for {name:?} is outside 0..{}",
                    map.len()
                ))
            })?;
            if let Some(existing) = slot.replace(name.clone()) {
                return Err(RegistryError::Inconsistent(format!(
                    "label {label} assigned to both {existing:?} and {name:?}"
                )));
            }
        }

        let mut registry = Self::new();
        // Every slot is filled: map.len() distinct labels inside 0..map.len().
        for name in names.into_iter().flatten() {
            registry.assign(&name);
        }
        Ok(registry)
    }

    pub fn save(&self, path: &Path) -> Result<(), RegistryError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        if !path.exists() {
            return Err(RegistryError::NotFound(path.display().to_string()));
        }
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
