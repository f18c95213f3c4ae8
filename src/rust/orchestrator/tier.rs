use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};

use super::DiagnosisRequest;
use crate::artifact::ModelService;
use crate::classifier::classify_image;
use crate::diagnosis::{ProviderTier, StructuredDiagnosis, Synthesizer};
use crate::error::{PipelineError, TierError};
use crate::remote::prompt::{diagnosis_prompt, refine_prompt, DIAGNOSIS_SYSTEM_PROMPT, REFINE_SYSTEM_PROMPT};
use crate::remote::{GenerationRequest, ImageAttachment, TextGenerator};

/// What a tier hands back before the orchestrator normalizes it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTierResult {
    /// A full diagnosis from the local classifier
    Structured {
        diagnosis: StructuredDiagnosis,
        /// Guidance was rewritten by the refine service
        refined: bool,
    },
    /// A remote service's answer, used verbatim as guidance
    FreeText { text: String, crop_hint: Option<String> },
}

/// One stage of the diagnosis cascade.
#[async_trait]
pub trait Tier: Send + Sync {
    fn name(&self) -> ProviderTier;

    async fn attempt(&self, request: &DiagnosisRequest) -> Result<RawTierResult, TierError>;
}

/// Runs the bundled classifier, optionally polishing its guidance remotely.
pub struct LocalTier {
    models: Arc<ModelService>,
    synthesizer: Synthesizer,
    refiner: Option<Arc<dyn TextGenerator>>,
}

impl LocalTier {
    pub fn new(models: Arc<ModelService>, synthesizer: Synthesizer) -> Self {
        Self {
            models,
            synthesizer,
            refiner: None,
        }
    }

    pub fn with_refiner(mut self, refiner: Arc<dyn TextGenerator>) -> Self {
        self.refiner = Some(refiner);
        self
    }

    pub fn models(&self) -> &Arc<ModelService> {
        &self.models
    }

    /// Returns whether the guidance was replaced. Failures keep the template text.
    async fn refine(&self, diagnosis: &mut StructuredDiagnosis, request: &DiagnosisRequest) -> bool {
        let Some(refiner) = &self.refiner else {
            debug!("refine skipped: no refine service configured");
            return false;
        };

        let generation = GenerationRequest::new(
            REFINE_SYSTEM_PROMPT,
            refine_prompt(diagnosis, request.context.as_deref()),
        );
        match refiner.generate(generation).await {
            Ok(text) => {
                debug!("refine succeeded via {}", refiner.name());
                diagnosis.guidance = text;
                true
            }
            Err(e) => {
                warn!("refine failed via {}, keeping template guidance: {}", refiner.name(), e);
                false
            }
        }
    }
}

#[async_trait]
impl Tier for LocalTier {
    fn name(&self) -> ProviderTier {
        ProviderTier::Local
    }

    async fn attempt(&self, request: &DiagnosisRequest) -> Result<RawTierResult, TierError> {
        let model = self.models.load().await?;
        let image = request.image.clone();
        let prediction = tokio::task::spawn_blocking(move || classify_image(&model, &image))
            .await
            .unwrap_or_else(|e| Err(PipelineError::Inference(format!("classification task failed: {}", e))))?;
        let mut diagnosis = self.synthesizer.synthesize(&prediction)?;
        drop(prediction);

        let refined = self.refine(&mut diagnosis, request).await;
        Ok(RawTierResult::Structured { diagnosis, refined })
    }
}

/// Sends the image and a structured prompt to an image-capable service.
pub struct RemoteVisionTier {
    client: Arc<dyn TextGenerator>,
}

impl RemoteVisionTier {
    pub fn new(client: Arc<dyn TextGenerator>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tier for RemoteVisionTier {
    fn name(&self) -> ProviderTier {
        ProviderTier::RemoteVision
    }

    async fn attempt(&self, request: &DiagnosisRequest) -> Result<RawTierResult, TierError> {
        let prompt = diagnosis_prompt(request.crop_hint.as_deref(), request.context.as_deref(), true);
        let generation = GenerationRequest::new(DIAGNOSIS_SYSTEM_PROMPT, prompt)
            .with_image(ImageAttachment::from_bytes(request.image.clone()));
        let text = self.client.generate(generation).await?;
        Ok(RawTierResult::FreeText {
            text,
            crop_hint: request.crop_hint.clone(),
        })
    }
}

/// Last resort: the same prompt without the image, to a text-only service.
pub struct RemoteFallbackTier {
    client: Arc<dyn TextGenerator>,
}

impl RemoteFallbackTier {
    pub fn new(client: Arc<dyn TextGenerator>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tier for RemoteFallbackTier {
    fn name(&self) -> ProviderTier {
        ProviderTier::RemoteFallback
    }

    async fn attempt(&self, request: &DiagnosisRequest) -> Result<RawTierResult, TierError> {
        let prompt = diagnosis_prompt(request.crop_hint.as_deref(), request.context.as_deref(), false);
        let text = self
            .client
            .generate(GenerationRequest::new(DIAGNOSIS_SYSTEM_PROMPT, prompt))
            .await?;
        Ok(RawTierResult::FreeText {
            text,
            crop_hint: request.crop_hint.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ModelSettings;
    use crate::error::PipelineError;
    use crate::remote::RemoteServiceError;
    use std::sync::Mutex;

    /// Records every request and replays a canned answer.
    struct Recorder {
        answer: Result<String, RemoteServiceError>,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl Recorder {
        fn new(answer: Result<String, RemoteServiceError>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn generate(&self, request: GenerationRequest) -> Result<String, RemoteServiceError> {
            self.seen.lock().unwrap().push(request);
            self.answer.clone()
        }
    }

    #[tokio::test]
    async fn test_vision_tier_sends_image() {
        let recorder = Recorder::new(Ok("Looks like early blight, moderate".into()));
        let tier = RemoteVisionTier::new(recorder.clone());
        let request = DiagnosisRequest::new(vec![1, 2, 3]).with_crop_hint("Potato");

        let result = tier.attempt(&request).await.unwrap();
        assert_eq!(
            result,
            RawTierResult::FreeText {
                text: "Looks like early blight, moderate".into(),
                crop_hint: Some("Potato".into())
            }
        );
        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen[0].image.as_ref().unwrap().bytes, vec![1, 2, 3]);
        assert!(seen[0].prompt.contains("Crop: Potato"));
    }

    #[tokio::test]
    async fn test_fallback_tier_sends_no_image() {
        let recorder = Recorder::new(Ok("healthy".into()));
        let tier = RemoteFallbackTier::new(recorder.clone());
        tier.attempt(&DiagnosisRequest::new(vec![9])).await.unwrap();
        assert!(recorder.seen.lock().unwrap()[0].image.is_none());
    }

    #[tokio::test]
    async fn test_remote_error_becomes_tier_error() {
        let tier = RemoteFallbackTier::new(Recorder::new(Err(RemoteServiceError::Auth("nope".into()))));
        let err = tier.attempt(&DiagnosisRequest::new(vec![])).await.unwrap_err();
        assert!(matches!(err, TierError::Remote(RemoteServiceError::Auth(_))));
    }

    #[tokio::test]
    async fn test_local_tier_reports_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let models = Arc::new(ModelService::new(dir.path(), ModelSettings::default()));
        let tier = LocalTier::new(models, Synthesizer::default());
        let err = tier.attempt(&DiagnosisRequest::new(vec![1])).await.unwrap_err();
        assert!(matches!(err, TierError::Local(PipelineError::ArtifactNotFound(_))));
    }
}
