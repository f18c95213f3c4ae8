use std::collections::HashMap;

use log::info;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;

use super::backend::{declared_input_size, InferenceBackend};
use crate::artifact::ModelArtifact;
use crate::error::PipelineError;
use crate::runtime::{create_session_builder, RuntimeConfig};

/// ONNX Runtime backend for artifacts whose reassembled buffer is a serialized graph.
#[derive(Debug)]
pub struct OnnxBackend {
    session: Session,
    input_name: String,
    input_size: Option<(u32, u32)>,
}

impl OnnxBackend {
    pub fn from_artifact(artifact: &ModelArtifact, runtime: &RuntimeConfig) -> Result<Self, PipelineError> {
        let session = create_session_builder(runtime)?.commit_from_memory(&artifact.weight_buffer)?;
        Self::validate_model(&session)?;

        let input_name = session.inputs[0].name.clone();
        let input_size = artifact
            .topology
            .get("inputShape")
            .and_then(declared_input_size);
        info!("ONNX session ready, feeding input '{}'", input_name);

        Ok(Self {
            session,
            input_name,
            input_size,
        })
    }

    fn validate_model(session: &Session) -> Result<(), PipelineError> {
        if session.inputs.is_empty() {
            return Err(PipelineError::Inference("Model must have an image input".into()));
        }
        if session.outputs.is_empty() {
            return Err(PipelineError::Inference(
                "Model must have at least 1 output for class probabilities".into(),
            ));
        }
        Ok(())
    }
}

impl InferenceBackend for OnnxBackend {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn input_size(&self) -> Option<(u32, u32)> {
        self.input_size
    }

    fn num_classes(&self) -> Option<usize> {
        None
    }

    fn forward(&self, input: Array4<f32>) -> Result<Vec<f32>, PipelineError> {
        let tensor = Tensor::from_array(input.into_dyn())
            .map_err(|e| PipelineError::Inference(format!("Failed to create input tensor: {}", e)))?;

        let mut inputs = HashMap::new();
        inputs.insert(self.input_name.as_str(), tensor);

        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| PipelineError::Inference(format!("Failed to run model: {}", e)))?;
        let probabilities = {
            let output = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| PipelineError::Inference(format!("Failed to extract output tensor: {}", e)))?;
            output.iter().copied().collect::<Vec<f32>>()
        };
        // Release the runtime-owned output buffers before handing back plain data.
        drop(outputs);

        Ok(probabilities)
    }
}
