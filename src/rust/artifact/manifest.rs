use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Name of the manifest file inside a model directory
pub const MANIFEST_FILE: &str = "model.json";

/// On-disk description of a model: its topology and where its weights live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactManifest {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub generated_by: Option<String>,
    #[serde(default)]
    pub model_topology: serde_json::Value,
    pub weights_manifest: Vec<WeightGroup>,
}

fn default_format() -> String {
    ArtifactFormat::LAYERS_MODEL.to_string()
}

/// One group of weights stored across one or more shard files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightGroup {
    pub paths: Vec<String>,
    pub weights: Vec<WeightSpec>,
}

impl WeightGroup {
    /// Total bytes the group's shards must hold
    pub fn byte_len(&self) -> Result<usize, PipelineError> {
        self.weights.iter().try_fold(0usize, |acc, spec| {
            let len = spec.byte_len()?;
            acc.checked_add(len).ok_or_else(|| {
                PipelineError::ArtifactCorrupt("declared weight size overflows".into())
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSpec {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<Quantization>,
}

/// Affine quantization: `value = stored * scale + min`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantization {
    pub dtype: String,
    pub scale: f32,
    pub min: f32,
}

impl WeightSpec {
    /// Bytes per stored element, from the quantization dtype when present
    pub fn element_size(&self) -> Result<usize, PipelineError> {
        match &self.quantization {
            Some(q) => match q.dtype.as_str() {
                "uint8" => Ok(1),
                "uint16" => Ok(2),
                other => Err(PipelineError::ArtifactCorrupt(format!(
                    "weight '{}' uses unsupported quantization dtype '{}'",
                    self.name, other
                ))),
            },
            None => match self.dtype.as_str() {
                "float32" | "int32" => Ok(4),
                "uint8" | "bool" => Ok(1),
                other => Err(PipelineError::ArtifactCorrupt(format!(
                    "weight '{}' uses unsupported dtype '{}'",
                    self.name, other
                ))),
            },
        }
    }

    pub fn byte_len(&self) -> Result<usize, PipelineError> {
        let size = self.element_size()?;
        self.shape
            .iter()
            .try_fold(size, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| {
                PipelineError::ArtifactCorrupt(format!("weight '{}' is too large", self.name))
            })
    }

    /// Decodes this weight's bytes into `f32` values, dequantizing if needed.
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<f32>, PipelineError> {
        let expected = self.byte_len()?;
        if bytes.len() != expected {
            return Err(PipelineError::ArtifactCorrupt(format!(
                "weight '{}' has {} bytes, expected {}",
                self.name,
                bytes.len(),
                expected
            )));
        }

        let values = match &self.quantization {
            Some(q) if q.dtype == "uint8" => bytes
                .iter()
                .map(|&b| b as f32 * q.scale + q.min)
                .collect(),
            Some(q) => bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]) as f32 * q.scale + q.min)
                .collect(),
            None => match self.dtype.as_str() {
                "float32" => bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
                "int32" => bytes
                    .chunks_exact(4)
                    .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32)
                    .collect(),
                _ => bytes.iter().map(|&b| b as f32).collect(),
            },
        };
        Ok(values)
    }
}

/// How the reassembled weight buffer is interpreted by the inference engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// Sequential layers topology with weights bound by layer name
    LayersModel,
    /// The buffer is a serialized ONNX graph
    Onnx,
}

impl ArtifactFormat {
    pub const LAYERS_MODEL: &'static str = "layers-model";
    pub const ONNX: &'static str = "onnx";

    pub fn parse(format: &str) -> Result<Self, PipelineError> {
        match format {
            Self::LAYERS_MODEL => Ok(Self::LayersModel),
            Self::ONNX => Ok(Self::Onnx),
            other => Err(PipelineError::ArtifactCorrupt(format!(
                "unknown model format '{}'",
                other
            ))),
        }
    }
}
