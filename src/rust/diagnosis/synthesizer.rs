use std::fmt::Write as _;

use log::debug;

use super::knowledge::{DiseaseKnowledgeEntry, KnowledgeBase};
use super::record::{Alternate, Severity};
use super::severity::bucket_severity;
use crate::classifier::{to_percent, PredictionResult, RankedPrediction};
use crate::error::PipelineError;

/// Delimiter between crop and condition in class labels
pub const LABEL_DELIMITER: &str = "___";

/// Number of ranked predictions carried in the record
pub const TOP_PREDICTIONS: usize = 5;

/// Number of alternates mentioned in guidance text
const GUIDANCE_ALTERNATES: usize = 3;

/// Crop and condition decoded from a `"<Crop>___<Condition>"` label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLabel {
    pub crop: String,
    pub disease: String,
    pub is_healthy: bool,
}

fn humanize(raw: &str) -> String {
    raw.replace('_', " ").trim().to_string()
}

pub fn parse_label(label: &str) -> ParsedLabel {
    let (crop_raw, condition_raw) = match label.split_once(LABEL_DELIMITER) {
        Some((crop, condition)) => (Some(crop), condition),
        None => (None, label),
    };
    let is_healthy = condition_raw.to_lowercase() == "healthy";
    ParsedLabel {
        crop: crop_raw.map(humanize).unwrap_or_else(|| "Unknown".to_string()),
        disease: if is_healthy {
            "Healthy".to_string()
        } else {
            humanize(condition_raw)
        },
        is_healthy,
    }
}

/// A fully structured diagnosis from the local classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredDiagnosis {
    pub crop: String,
    pub disease: String,
    pub is_healthy: bool,
    /// Percent, one decimal
    pub confidence: f32,
    pub severity: Severity,
    pub guidance: String,
    pub top_predictions: Vec<Alternate>,
}

fn alternate(prediction: &RankedPrediction) -> Alternate {
    let parsed = parse_label(&prediction.label);
    Alternate {
        crop: parsed.crop,
        disease: parsed.disease,
        confidence: to_percent(prediction.probability),
    }
}

/// Turns ranked predictions into a diagnosis with human-readable guidance.
#[derive(Debug, Clone, Default)]
pub struct Synthesizer {
    knowledge: KnowledgeBase,
}

impl Synthesizer {
    pub fn new(knowledge: KnowledgeBase) -> Self {
        Self { knowledge }
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn synthesize(&self, prediction: &PredictionResult) -> Result<StructuredDiagnosis, PipelineError> {
        let top = prediction
            .top()
            .ok_or_else(|| PipelineError::Inference("prediction list is empty".into()))?;
        let parsed = parse_label(&top.label);
        let confidence = to_percent(top.probability);
        let severity = bucket_severity(parsed.is_healthy, confidence);

        let top_predictions: Vec<Alternate> = prediction.top_k(TOP_PREDICTIONS).iter().map(alternate).collect();
        let others = &top_predictions[1.min(top_predictions.len())..];
        let others = &others[..others.len().min(GUIDANCE_ALTERNATES)];

        let guidance = if parsed.is_healthy {
            render_healthy(&parsed.crop, confidence)
        } else {
            match self.knowledge.lookup(&parsed.disease) {
                Some(entry) => render_known(&parsed, confidence, severity, entry, others),
                None => {
                    debug!("No knowledge base entry for '{}'", parsed.disease);
                    render_generic(&parsed, confidence, severity, others)
                }
            }
        };

        Ok(StructuredDiagnosis {
            crop: parsed.crop,
            disease: parsed.disease,
            is_healthy: parsed.is_healthy,
            confidence,
            severity,
            guidance,
            top_predictions,
        })
    }
}

fn render_healthy(crop: &str, confidence: f32) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Your {} plant appears healthy ({:.1}% confidence).", crop, confidence);
    out.push_str("\nTo keep it that way:\n");
    for tip in [
        "Water at the base of the plant, early in the day",
        "Keep spacing generous so leaves dry quickly",
        "Inspect leaves weekly, including the undersides",
        "Remove fallen leaves and crop debris",
        "Rotate crops each season and keep tools clean",
    ] {
        let _ = writeln!(out, "- {}", tip);
    }
    out
}

fn render_heading(out: &mut String, parsed: &ParsedLabel, confidence: f32, severity: Severity) {
    let _ = writeln!(
        out,
        "Detected {} on {} ({:.1}% confidence, severity: {}).",
        parsed.disease, parsed.crop, confidence, severity
    );
}

fn render_alternates(out: &mut String, others: &[Alternate]) {
    if others.is_empty() {
        return;
    }
    out.push_str("\nOther possibilities:\n");
    for alt in others {
        let _ = writeln!(out, "- {} on {} ({:.1}%)", alt.disease, alt.crop, alt.confidence);
    }
}

fn render_known(
    parsed: &ParsedLabel,
    confidence: f32,
    severity: Severity,
    entry: &DiseaseKnowledgeEntry,
    others: &[Alternate],
) -> String {
    let mut out = String::new();
    render_heading(&mut out, parsed, confidence, severity);
    let _ = write!(out, "\nSymptoms:\n{}\n", entry.symptoms);
    let _ = write!(out, "\nLikely causes:\n{}\n", entry.causes);
    out.push_str("\nTreatment:\n");
    for (i, step) in entry.treatment.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, step);
    }
    out.push_str("\nPrevention:\n");
    for step in &entry.prevention {
        let _ = writeln!(out, "- {}", step);
    }
    render_alternates(&mut out, others);
    out
}

fn render_generic(parsed: &ParsedLabel, confidence: f32, severity: Severity, others: &[Alternate]) -> String {
    let mut out = String::new();
    render_heading(&mut out, parsed, confidence, severity);
    out.push_str("\nGeneral recommendations:\n");
    for tip in [
        "Isolate affected plants to limit spread",
        "Remove and destroy visibly infected leaves",
        "Avoid overhead watering and improve air circulation",
        "Confirm the diagnosis with a local agricultural extension officer before spraying",
    ] {
        let _ = writeln!(out, "- {}", tip);
    }
    render_alternates(&mut out, others);
    out
}
