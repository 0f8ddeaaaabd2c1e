//! File-backed model store: one directory per model name, auto-increment
//! version subdirectories, and a `LATEST` pointer that always resolves to
//! the newest save. Prior versions stay retrievable.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::sarimax::{SarimaxModel, SarimaxOrder};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub rmse: f64,
    pub mae: f64,
    pub aic: f64,
    pub target: String,
    pub features: Vec<String>,
    pub order: SarimaxOrder,
    pub window_rows: usize,
    pub trained_at: DateTime<Utc>,
}

/// Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub name: String,
    pub version: u32,
    pub model: SarimaxModel,
    pub metadata: TrainingMetadata,
}

#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn model_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn artifact_path(&self, name: &str, version: u32) -> PathBuf {
        self.model_dir(name)
            .join(format!("v{version:04}"))
            .join("model.json")
    }

    fn pointer_path(&self, name: &str) -> PathBuf {
        self.model_dir(name).join("LATEST")
    }

    /// Saves under the next version number and advances the pointer.
    pub fn save(
        &self,
        name: &str,
        model: SarimaxModel,
        metadata: TrainingMetadata,
    ) -> Result<ModelArtifact> {
        let version = self.latest_version(name)?.map_or(1, |v| v + 1);
        let artifact = ModelArtifact {
            name: name.to_string(),
            version,
            model,
            metadata,
        };

        let path = self.artifact_path(name, version);
        let dir = path.parent().expect("artifact path has a parent");
        fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
        let body = serde_json::to_string_pretty(&artifact)?;
        fs::write(&path, body).map_err(|e| PipelineError::io(&path, e))?;

        let pointer = self.pointer_path(name);
        fs::write(&pointer, version.to_string()).map_err(|e| PipelineError::io(&pointer, e))?;

        info!("Saved model '{}' as version {}", name, version);
        Ok(artifact)
    }

    /// Newest version, via the pointer file with a directory scan as the
    /// fallback when the pointer is missing or unreadable.
    pub fn latest_version(&self, name: &str) -> Result<Option<u32>> {
        if let Ok(raw) = fs::read_to_string(self.pointer_path(name)) {
            if let Ok(version) = raw.trim().parse::<u32>() {
                return Ok(Some(version));
            }
        }

        let dir = self.model_dir(name);
        if !dir.exists() {
            return Ok(None);
        }
        let mut newest = None;
        let entries = fs::read_dir(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::io(&dir, e))?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(version) = file_name
                .strip_prefix('v')
                .and_then(|v| v.parse::<u32>().ok())
            {
                newest = Some(newest.map_or(version, |n: u32| n.max(version)));
            }
        }
        Ok(newest)
    }

    pub fn load_version(&self, name: &str, version: u32) -> Result<ModelArtifact> {
        let path = self.artifact_path(name, version);
        let raw = fs::read_to_string(&path).map_err(|e| PipelineError::io(&path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn load_latest(&self, name: &str) -> Result<ModelArtifact> {
        let version = self
            .latest_version(name)?
            .ok_or_else(|| PipelineError::ArtifactNotFound {
                name: name.to_string(),
                root: self.root.clone(),
            })?;
        self.load_version(name, version)
    }
}
