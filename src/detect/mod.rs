mod backend;
mod backends;
mod model;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::{CpuBackend, StubBackend};
pub use model::{ModelCatalog, ModelSpec, MODEL_EXTENSION};
pub use registry::{BackendFactory, BackendRegistry};
pub use result::{BoundingBox, DetectionResult};
