use std::collections::HashMap;

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;
use super::backends::{cpu, CpuBackend, StubBackend};
use super::model::ModelSpec;

/// Builds a backend from a model descriptor.
pub type BackendFactory = fn(&ModelSpec) -> Result<Box<dyn DetectorBackend>>;

/// Registry of detector backend factories, keyed by backend name.
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            default_name: None,
        }
    }

    /// Registry with the built-in `cpu` (default) and `stub` backends.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("cpu", build_cpu);
        registry.register("stub", build_stub);
        registry
    }

    /// Register a factory. The first registered backend becomes the default.
    pub fn register(&mut self, name: &str, factory: BackendFactory) {
        if self.default_name.is_none() {
            self.default_name = Some(name.to_string());
        }
        self.factories.insert(name.to_string(), factory);
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// List registered backends, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct the backend named by `spec`, or the default when the spec names none.
    pub fn build(&self, spec: &ModelSpec) -> Result<Box<dyn DetectorBackend>> {
        let name = spec
            .backend
            .as_deref()
            .or(self.default_name.as_deref())
            .ok_or_else(|| anyhow!("no backend named and no default registered"))?;
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| anyhow!("backend '{}' not registered", name))?;
        factory(spec)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

fn build_cpu(spec: &ModelSpec) -> Result<Box<dyn DetectorBackend>> {
    let threshold = spec.threshold.unwrap_or(cpu::DEFAULT_THRESHOLD);
    if threshold == 0 {
        return Err(anyhow!("cpu backend threshold must be greater than zero"));
    }
    let min_size = spec.min_size().unwrap_or(cpu::DEFAULT_MIN_SIZE);
    Ok(Box::new(CpuBackend::new(threshold, min_size)))
}

fn build_stub(spec: &ModelSpec) -> Result<Box<dyn DetectorBackend>> {
    Ok(Box::new(StubBackend::scripted(spec.script.clone())))
}
