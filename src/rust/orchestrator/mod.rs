//! Ordered fallback across the local classifier and remote services.
//!
//! Each tier is tried once, in order. The first success is normalized into a
//! [`DiagnosisRecord`]; failures are logged and the next tier runs. When every
//! tier fails the caller gets a single [`DiagnosisError::AnalysisFailed`].

mod tier;

use std::sync::Arc;
use std::time::Instant;

use log::{error, info, warn};

pub use tier::{LocalTier, RawTierResult, RemoteFallbackTier, RemoteVisionTier, Tier};

use crate::artifact::ModelService;
use crate::config::{PipelineConfig, RemoteServiceConfig};
use crate::diagnosis::{infer_severity_from_text, DiagnosisRecord, KnowledgeBase, ProviderTier, Severity, Synthesizer};
use crate::error::DiagnosisError;
use crate::remote::{ChatCompletionsClient, TextGenerator};

/// Default response language
pub const DEFAULT_LANGUAGE: &str = "en";

/// One diagnosis request as the pipeline sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosisRequest {
    pub image: Vec<u8>,
    pub crop_hint: Option<String>,
    /// Free-text notes from the farmer
    pub context: Option<String>,
    pub language: String,
}

impl DiagnosisRequest {
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            image,
            crop_hint: None,
            context: None,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    pub fn with_crop_hint(mut self, crop: impl Into<String>) -> Self {
        self.crop_hint = Some(crop.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// Runs tiers in order until one produces a diagnosis.
pub struct Orchestrator {
    tiers: Vec<Box<dyn Tier>>,
}

/// Builder for [`Orchestrator`]; tiers run in the order they are added.
#[derive(Default)]
pub struct OrchestratorBuilder {
    tiers: Vec<Box<dyn Tier>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tier<T: Tier + 'static>(mut self, tier: T) -> Self {
        self.tiers.push(Box::new(tier));
        self
    }

    pub fn with_boxed_tier(mut self, tier: Box<dyn Tier>) -> Self {
        self.tiers.push(tier);
        self
    }

    pub fn build(self) -> Result<Orchestrator, DiagnosisError> {
        if self.tiers.is_empty() {
            return Err(DiagnosisError::Config("at least one tier must be added".to_string()));
        }
        Ok(Orchestrator { tiers: self.tiers })
    }
}

fn remote_client(name: &str, config: Option<&RemoteServiceConfig>) -> Option<Arc<dyn TextGenerator>> {
    let config = config?;
    match ChatCompletionsClient::new(name, config.clone()) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!("Remote service '{}' disabled: {}", name, e);
            None
        }
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Assembles the standard local → vision → fallback cascade.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, DiagnosisError> {
        Self::from_config_with_models(config, Arc::new(ModelService::from_config(config)))
    }

    /// Like [`Orchestrator::from_config`] but shares an existing model service.
    pub fn from_config_with_models(config: &PipelineConfig, models: Arc<ModelService>) -> Result<Self, DiagnosisError> {
        let knowledge = match &config.knowledge_base_path {
            Some(path) => KnowledgeBase::from_file(path)
                .map_err(|e| DiagnosisError::Config(format!("knowledge base {:?}: {}", path, e)))?,
            None => KnowledgeBase::builtin(),
        };

        let mut local = LocalTier::new(models, Synthesizer::new(knowledge));
        if let Some(refiner) = remote_client("refine", config.refine.as_ref()) {
            local = local.with_refiner(refiner);
        }

        let mut builder = Self::builder().with_tier(local);
        if let Some(client) = remote_client("vision", config.vision.as_ref()) {
            builder = builder.with_tier(RemoteVisionTier::new(client));
        }
        if let Some(client) = remote_client("fallback", config.fallback.as_ref()) {
            builder = builder.with_tier(RemoteFallbackTier::new(client));
        }
        builder.build()
    }

    pub fn tier_names(&self) -> Vec<ProviderTier> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    pub async fn diagnose(&self, request: &DiagnosisRequest) -> Result<DiagnosisRecord, DiagnosisError> {
        for tier in &self.tiers {
            let name = tier.name();
            let started = Instant::now();
            let outcome = tier.attempt(request).await;
            let latency_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(raw) => {
                    let record = normalize(raw, name, latency_ms);
                    info!(
                        "Tier {} answered in {}ms: {} / {} ({})",
                        record.provider_used, latency_ms, record.crop, record.disease, record.severity
                    );
                    return Ok(record);
                }
                Err(e) => warn!("Tier {} failed after {}ms: {}", name, latency_ms, e),
            }
        }

        error!("All {} diagnosis tiers failed", self.tiers.len());
        Err(DiagnosisError::AnalysisFailed)
    }
}

fn normalize(raw: RawTierResult, tier: ProviderTier, latency_ms: u64) -> DiagnosisRecord {
    match raw {
        RawTierResult::Structured { diagnosis, refined } => DiagnosisRecord {
            crop: diagnosis.crop,
            disease: diagnosis.disease,
            is_healthy: diagnosis.is_healthy,
            confidence: Some(diagnosis.confidence),
            severity: diagnosis.severity,
            guidance: diagnosis.guidance,
            top_predictions: diagnosis.top_predictions,
            latency_ms,
            provider_used: if refined { ProviderTier::LocalRefined } else { tier },
        },
        RawTierResult::FreeText { text, crop_hint } => {
            let severity = infer_severity_from_text(&text);
            let is_healthy = severity == Severity::Healthy;
            DiagnosisRecord {
                crop: crop_hint
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| "Unknown".to_string()),
                disease: if is_healthy { "Healthy" } else { "Unknown" }.to_string(),
                is_healthy,
                confidence: None,
                severity,
                guidance: text,
                top_predictions: Vec::new(),
                latency_ms,
                provider_used: tier,
            }
        }
    }
}
