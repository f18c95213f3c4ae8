use std::fmt;

use ndarray::Array4;

use super::interpreter::LayersInterpreter;
use super::onnx::OnnxBackend;
use crate::artifact::{ArtifactFormat, ModelArtifact};
use crate::error::PipelineError;
use crate::runtime::RuntimeConfig;

/// Runs a forward pass over a prepared model.
///
/// Implementations take ownership of the input tensor and must release it,
/// along with every scratch and output tensor they allocate, before
/// `forward` returns. Only the plain probability vector leaves the call.
pub trait InferenceBackend: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// (width, height) declared by the model, if any
    fn input_size(&self) -> Option<(u32, u32)>;

    /// Number of output classes, when the backend can tell ahead of time
    fn num_classes(&self) -> Option<usize>;

    /// Runs the model on a `[1, H, W, 3]` tensor and returns one probability per class.
    fn forward(&self, input: Array4<f32>) -> Result<Vec<f32>, PipelineError>;
}

/// Prepares the backend matching the artifact's declared format.
pub fn build_backend(
    artifact: &ModelArtifact,
    runtime: &RuntimeConfig,
) -> Result<Box<dyn InferenceBackend>, PipelineError> {
    match artifact.format {
        ArtifactFormat::LayersModel => Ok(Box::new(LayersInterpreter::from_artifact(artifact)?)),
        ArtifactFormat::Onnx => Ok(Box::new(OnnxBackend::from_artifact(artifact, runtime)?)),
    }
}

/// Reads a `[batch, H, W, C]` input shape from the topology, returning (width, height).
pub(crate) fn declared_input_size(shape: &serde_json::Value) -> Option<(u32, u32)> {
    let dims = shape.as_array()?;
    if dims.len() != 4 {
        return None;
    }
    let height = dims[1].as_u64()?;
    let width = dims[2].as_u64()?;
    if height == 0 || width == 0 {
        return None;
    }
    Some((u32::try_from(width).ok()?, u32::try_from(height).ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_declared_input_size() {
        assert_eq!(declared_input_size(&json!([null, 128, 96, 3])), Some((96, 128)));
        assert_eq!(declared_input_size(&json!([null, null, null, 3])), None);
        assert_eq!(declared_input_size(&json!([null, 3])), None);
    }
}
