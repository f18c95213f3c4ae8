use std::fs;
use std::io;
use std::path::Path;

use crate::error::PipelineError;

/// Name of the label table file inside a model directory
pub const LABELS_FILE: &str = "labels.json";

/// Maps output-vector positions to `"<Crop>___<Condition>"` labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLabelTable {
    labels: Vec<String>,
}

impl ClassLabelTable {
    pub fn new(labels: Vec<String>) -> Result<Self, PipelineError> {
        if labels.is_empty() {
            return Err(PipelineError::ArtifactCorrupt("label table is empty".into()));
        }
        Ok(Self { labels })
    }

    /// Loads `labels.json` (a JSON array of strings) from the model directory.
    pub fn load(model_dir: &Path) -> Result<Self, PipelineError> {
        let path = model_dir.join(LABELS_FILE);
        let raw = fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => PipelineError::ArtifactNotFound(path.display().to_string()),
            _ => PipelineError::ArtifactCorrupt(format!("failed to read {}: {}", path.display(), e)),
        })?;
        let labels: Vec<String> = serde_json::from_slice(&raw).map_err(|e| {
            PipelineError::ArtifactCorrupt(format!("invalid label table {}: {}", path.display(), e))
        })?;
        Self::new(labels)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}
