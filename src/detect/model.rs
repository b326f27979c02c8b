//! Model descriptors and the on-disk model catalog.
//!
//! A model is a JSON descriptor in the model directory, e.g. `bright_blobs.json`:
//!
//! ```json
//! { "backend": "cpu", "threshold": 200, "min_size": [30, 30] }
//! ```

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::backend::DetectorBackend;
use super::registry::BackendRegistry;
use super::result::BoundingBox;
use crate::error::{SnapwatchError, SnapwatchResult};

pub const MODEL_EXTENSION: &str = "json";

/// Parsed model descriptor.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSpec {
    /// Backend name; the registry default is used when absent.
    pub backend: Option<String>,
    /// Foreground luma threshold (cpu backend).
    pub threshold: Option<u8>,
    /// Minimum detection size as `[width, height]`.
    #[serde(default)]
    pub min_size: Option<[u32; 2]>,
    /// Per-frame results replayed by the stub backend.
    #[serde(default)]
    pub script: Vec<Vec<BoundingBox>>,
}

impl ModelSpec {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| anyhow!("invalid model descriptor: {}", e))
    }

    pub fn min_size(&self) -> Option<(u32, u32)> {
        self.min_size.map(|[w, h]| (w, h))
    }
}

/// Directory of model descriptors.
pub struct ModelCatalog {
    dir: PathBuf,
    registry: BackendRegistry,
}

impl ModelCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_registry(dir, BackendRegistry::with_builtin())
    }

    pub fn with_registry(dir: impl Into<PathBuf>, registry: BackendRegistry) -> Self {
        Self {
            dir: dir.into(),
            registry,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Model file names available for selection, sorted.
    ///
    /// A missing directory is not an error; it yields an empty list.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            log::warn!("model directory not found: {}", self.dir.display());
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("read model directory {}", self.dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some(MODEL_EXTENSION) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Resolve a selection (file name, extension optional) to a ready backend.
    pub fn load(&self, selection: &str) -> SnapwatchResult<Box<dyn DetectorBackend>> {
        let selection = selection.trim();
        if selection.is_empty() {
            return Err(SnapwatchError::NoModelSelected);
        }
        self.load_inner(selection)
            .map_err(|source| SnapwatchError::ModelLoad {
                model: selection.to_string(),
                source,
            })
    }

    fn load_inner(&self, selection: &str) -> Result<Box<dyn DetectorBackend>> {
        let path = self.resolve(selection)?;
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("read model file {}", path.display()))?;
        let spec = ModelSpec::from_json(&raw)?;
        let mut backend = self.registry.build(&spec)?;
        backend.warm_up()?;
        log::info!(
            "loaded model {} (backend={})",
            path.display(),
            backend.name()
        );
        Ok(backend)
    }

    fn resolve(&self, selection: &str) -> Result<PathBuf> {
        let candidate = Path::new(selection);
        if candidate.components().count() != 1 || candidate.file_name().is_none() {
            return Err(anyhow!("model selection must be a plain file name"));
        }
        let mut path = self.dir.join(candidate);
        if path.extension().is_none() {
            path.set_extension(MODEL_EXTENSION);
        }
        if !path.is_file() {
            return Err(anyhow!("model file not found: {}", path.display()));
        }
        Ok(path)
    }
}
