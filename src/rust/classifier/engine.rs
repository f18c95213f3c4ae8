use std::cmp::Ordering;

use log::debug;
use ndarray::Array4;
use serde::Serialize;

use super::preprocess::preprocess;
use crate::artifact::{ClassLabelTable, LoadedModel};
use crate::error::PipelineError;

/// One class with its probability, as produced by the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedPrediction {
    pub class_index: usize,
    pub label: String,
    pub probability: f32,
}

/// Every class ranked by probability, highest first.
///
/// Ties are broken by the lower class index so the ordering is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    ranked: Vec<RankedPrediction>,
}

impl PredictionResult {
    /// Ranks a raw probability vector against the label table.
    pub fn rank(probabilities: &[f32], labels: &ClassLabelTable) -> Result<Self, PipelineError> {
        if probabilities.len() != labels.len() {
            return Err(PipelineError::Inference(format!(
                "model produced {} probabilities for {} labels",
                probabilities.len(),
                labels.len()
            )));
        }
        if let Some(index) = probabilities.iter().position(|p| !p.is_finite()) {
            return Err(PipelineError::Inference(format!(
                "model produced a non-finite probability for class {}",
                index
            )));
        }

        let mut ranked: Vec<RankedPrediction> = probabilities
            .iter()
            .zip(labels.iter())
            .enumerate()
            .map(|(class_index, (&probability, label))| RankedPrediction {
                class_index,
                label: label.to_string(),
                probability,
            })
            .collect();
        ranked.sort_by(|a, b| match b.probability.total_cmp(&a.probability) {
            Ordering::Equal => a.class_index.cmp(&b.class_index),
            other => other,
        });

        Ok(Self { ranked })
    }

    pub fn top(&self) -> Option<&RankedPrediction> {
        self.ranked.first()
    }

    pub fn top_k(&self, k: usize) -> &[RankedPrediction] {
        &self.ranked[..k.min(self.ranked.len())]
    }

    pub fn iter(&self) -> impl Iterator<Item = &RankedPrediction> {
        self.ranked.iter()
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    pub fn total_probability(&self) -> f32 {
        self.ranked.iter().map(|p| p.probability).sum()
    }
}

/// Runs the model on a preprocessed tensor and ranks every class.
///
/// The tensor is moved into the backend, which frees it and its own output
/// buffers before returning; only the probability vector survives, and it is
/// dropped here once ranked.
pub fn classify(model: &LoadedModel, tensor: Array4<f32>) -> Result<PredictionResult, PipelineError> {
    let probabilities = model.backend.forward(tensor)?;
    let result = PredictionResult::rank(&probabilities, &model.labels);
    drop(probabilities);

    if let Ok(ranked) = &result {
        if let Some(top) = ranked.top() {
            debug!("Top prediction {} ({:.4})", top.label, top.probability);
        }
    }
    result
}

/// Preprocesses raw image bytes to the model's input size and classifies them.
pub fn classify_image(model: &LoadedModel, image_bytes: &[u8]) -> Result<PredictionResult, PipelineError> {
    let tensor = preprocess(image_bytes, model.input_size)?;
    classify(model, tensor)
}
