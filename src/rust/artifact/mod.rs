//! Model artifact loading: manifest parsing, shard reassembly and the lazily
//! initialised model service shared by every request.

mod labels;
mod loader;
mod manifest;
mod service;

pub use labels::{ClassLabelTable, LABELS_FILE};
pub use loader::{load_artifact, ModelArtifact};
pub use manifest::{
    ArtifactFormat, ArtifactManifest, Quantization, WeightGroup, WeightSpec, MANIFEST_FILE,
};
pub use service::{LoadedModel, ModelService, ModelSettings};
