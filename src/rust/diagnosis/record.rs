use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse severity bucket attached to every diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Healthy,
    Mild,
    Moderate,
    Severe,
    Unknown,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Mild => "mild",
            Self::Moderate => "moderate",
            Self::Severe => "severe",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stage of the cascade produced a diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderTier {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "local+refine")]
    LocalRefined,
    #[serde(rename = "remote_vision")]
    RemoteVision,
    #[serde(rename = "remote_fallback")]
    RemoteFallback,
}

impl ProviderTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::LocalRefined => "local+refine",
            Self::RemoteVision => "remote_vision",
            Self::RemoteFallback => "remote_fallback",
        }
    }
}

impl fmt::Display for ProviderTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ranked alternative from the local classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternate {
    pub crop: String,
    pub disease: String,
    /// Percent, one decimal
    pub confidence: f32,
}

/// The pipeline's output, identical in shape whichever tier answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisRecord {
    pub crop: String,
    pub disease: String,
    pub is_healthy: bool,
    /// Percent with one decimal; `None` when the tier has no calibrated probability
    pub confidence: Option<f32>,
    pub severity: Severity,
    pub guidance: String,
    pub top_predictions: Vec<Alternate>,
    pub latency_ms: u64,
    pub provider_used: ProviderTier,
}
