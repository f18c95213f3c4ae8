mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cropdoc::orchestrator::{LocalTier, RemoteFallbackTier, RemoteVisionTier};
use cropdoc::remote::GenerationRequest;
use cropdoc::{
    DiagnosisError, DiagnosisRequest, ModelService, ModelSettings, Orchestrator, ProviderTier, RemoteServiceError,
    Severity, Synthesizer, TextGenerator,
};

/// A remote service stub that counts calls and replays a fixed answer.
struct CountingService {
    calls: AtomicUsize,
    answer: Result<String, RemoteServiceError>,
}

impl CountingService {
    fn answering(text: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            answer: Ok(text.to_string()),
        })
    }

    fn failing(err: RemoteServiceError) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            answer: Err(err),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for CountingService {
    fn name(&self) -> &str {
        "counting"
    }

    async fn generate(&self, _request: GenerationRequest) -> Result<String, RemoteServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}

fn empty_model_service() -> (tempfile::TempDir, Arc<ModelService>) {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(ModelService::new(dir.path(), ModelSettings::default()));
    (dir, service)
}

fn fixture_model_service() -> (tempfile::TempDir, Arc<ModelService>) {
    let dir = tempfile::tempdir().unwrap();
    common::write_model(dir.path(), 2);
    let service = Arc::new(ModelService::new(dir.path(), ModelSettings::default()));
    (dir, service)
}

#[tokio::test]
async fn test_missing_artifact_falls_through_to_vision() {
    let (_dir, models) = empty_model_service();
    let vision = CountingService::answering("Early blight with moderate spread. Remove lower leaves.");
    let fallback = CountingService::answering("unused");

    let orchestrator = Orchestrator::builder()
        .with_tier(LocalTier::new(models, Synthesizer::default()))
        .with_tier(RemoteVisionTier::new(vision.clone()))
        .with_tier(RemoteFallbackTier::new(fallback.clone()))
        .build()
        .unwrap();

    let request = DiagnosisRequest::new(common::red_leaf()).with_crop_hint("Potato");
    let record = orchestrator.diagnose(&request).await.unwrap();

    assert_eq!(vision.calls(), 1);
    assert_eq!(fallback.calls(), 0);
    assert_eq!(record.provider_used, ProviderTier::RemoteVision);
    assert_eq!(record.crop, "Potato");
    assert_eq!(record.severity, Severity::Moderate);
    assert_eq!(record.confidence, None);
    assert!(record.top_predictions.is_empty());
}

#[tokio::test]
async fn test_vision_failure_falls_through_to_fallback() {
    let (_dir, models) = empty_model_service();
    let vision = CountingService::failing(RemoteServiceError::Timeout { timeout_ms: 30_000 });
    let fallback = CountingService::answering("The plant looks healthy.");

    let orchestrator = Orchestrator::builder()
        .with_tier(LocalTier::new(models, Synthesizer::default()))
        .with_tier(RemoteVisionTier::new(vision.clone()))
        .with_tier(RemoteFallbackTier::new(fallback.clone()))
        .build()
        .unwrap();

    let record = orchestrator.diagnose(&DiagnosisRequest::new(vec![1, 2, 3])).await.unwrap();
    assert_eq!(vision.calls(), 1);
    assert_eq!(fallback.calls(), 1);
    assert_eq!(record.provider_used, ProviderTier::RemoteFallback);
    assert!(record.is_healthy);
    assert_eq!(record.disease, "Healthy");
    assert_eq!(record.crop, "Unknown");
}

#[tokio::test]
async fn test_all_tiers_failing_is_one_generic_error() {
    let (_dir, models) = empty_model_service();
    let vision = CountingService::failing(RemoteServiceError::Auth("invalid key sk-secret".into()));
    let fallback = CountingService::failing(RemoteServiceError::RateLimited { retry_after_secs: Some(5) });

    let orchestrator = Orchestrator::builder()
        .with_tier(LocalTier::new(models, Synthesizer::default()))
        .with_tier(RemoteVisionTier::new(vision.clone()))
        .with_tier(RemoteFallbackTier::new(fallback.clone()))
        .build()
        .unwrap();

    let err = orchestrator.diagnose(&DiagnosisRequest::new(vec![0])).await.unwrap_err();
    assert!(matches!(err, DiagnosisError::AnalysisFailed));
    assert_eq!(err.to_string(), "analysis failed");
    assert_eq!(vision.calls(), 1);
    assert_eq!(fallback.calls(), 1);
}

#[tokio::test]
async fn test_local_success_skips_remote_tiers() {
    let (_dir, models) = fixture_model_service();
    let vision = CountingService::answering("unused");

    let orchestrator = Orchestrator::builder()
        .with_tier(LocalTier::new(models, Synthesizer::default()))
        .with_tier(RemoteVisionTier::new(vision.clone()))
        .build()
        .unwrap();

    let record = orchestrator.diagnose(&DiagnosisRequest::new(common::red_leaf())).await.unwrap();
    assert_eq!(vision.calls(), 0);
    assert_eq!(record.provider_used, ProviderTier::Local);
    assert_eq!(record.disease, "Late blight");
    assert_eq!(record.severity, Severity::Severe);
    assert!(record.confidence.unwrap() > 95.0);
    assert_eq!(record.top_predictions[0].disease, "Late blight");
}

#[tokio::test]
async fn test_undecodable_image_falls_through() {
    let (_dir, models) = fixture_model_service();
    let vision = CountingService::answering("Mild leaf spot");

    let orchestrator = Orchestrator::builder()
        .with_tier(LocalTier::new(models, Synthesizer::default()))
        .with_tier(RemoteVisionTier::new(vision.clone()))
        .build()
        .unwrap();

    let record = orchestrator
        .diagnose(&DiagnosisRequest::new(b"not an image".to_vec()))
        .await
        .unwrap();
    assert_eq!(record.provider_used, ProviderTier::RemoteVision);
    assert_eq!(record.severity, Severity::Mild);
}

#[tokio::test]
async fn test_refine_success_marks_provider() {
    let (_dir, models) = fixture_model_service();
    let refiner = CountingService::answering("Act fast: remove infected tomato plants today.");

    let orchestrator = Orchestrator::builder()
        .with_tier(LocalTier::new(models, Synthesizer::default()).with_refiner(refiner.clone()))
        .build()
        .unwrap();

    let record = orchestrator.diagnose(&DiagnosisRequest::new(common::red_leaf())).await.unwrap();
    assert_eq!(refiner.calls(), 1);
    assert_eq!(record.provider_used, ProviderTier::LocalRefined);
    assert_eq!(record.guidance, "Act fast: remove infected tomato plants today.");
    assert_eq!(record.disease, "Late blight");
}

#[tokio::test]
async fn test_refine_failure_keeps_template_guidance() {
    let (_dir, models) = fixture_model_service();
    let refiner = CountingService::failing(RemoteServiceError::Status {
        status: 500,
        message: "boom".into(),
    });

    let orchestrator = Orchestrator::builder()
        .with_tier(LocalTier::new(models, Synthesizer::default()).with_refiner(refiner.clone()))
        .build()
        .unwrap();

    let record = orchestrator.diagnose(&DiagnosisRequest::new(common::red_leaf())).await.unwrap();
    assert_eq!(refiner.calls(), 1);
    assert_eq!(record.provider_used, ProviderTier::Local);
    assert!(record.guidance.contains("Treatment:"));
}

#[tokio::test]
async fn test_record_serializes_identically_across_tiers() {
    let (_dir, models) = empty_model_service();
    let orchestrator = Orchestrator::builder()
        .with_tier(LocalTier::new(models, Synthesizer::default()))
        .with_tier(RemoteVisionTier::new(CountingService::answering("severe rust")))
        .build()
        .unwrap();

    let record = orchestrator.diagnose(&DiagnosisRequest::new(vec![1])).await.unwrap();
    let json = serde_json::to_value(&record).unwrap();
    for key in [
        "crop",
        "disease",
        "isHealthy",
        "confidence",
        "severity",
        "guidance",
        "topPredictions",
        "latencyMs",
        "providerUsed",
    ] {
        assert!(json.get(key).is_some(), "missing {}", key);
    }
    assert!(json["confidence"].is_null());
    assert_eq!(json["providerUsed"], "remote_vision");
}

#[tokio::test]
async fn test_local_classification_does_not_block_the_runtime() {
    let (_dir, models) = fixture_model_service();
    models.load().await.unwrap();
    let orchestrator = Orchestrator::builder()
        .with_tier(LocalTier::new(models, Synthesizer::default()))
        .build()
        .unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let ticker = {
        let done = Arc::clone(&done);
        tokio::spawn(async move { !done.load(Ordering::SeqCst) })
    };

    let record = orchestrator
        .diagnose(&DiagnosisRequest::new(common::red_leaf()))
        .await
        .unwrap();
    done.store(true, Ordering::SeqCst);

    assert_eq!(record.provider_used, ProviderTier::Local);
    assert!(ticker.await.unwrap());
}

#[tokio::test]
async fn test_unreadable_onnx_model_falls_through_to_vision() {
    let dir = tempfile::tempdir().unwrap();
    common::write_garbage_onnx_model(dir.path());
    let models = Arc::new(ModelService::new(dir.path(), ModelSettings::default()));
    let vision = CountingService::answering("Severity: mild\nEarly blight on the lower leaves.");

    let orchestrator = Orchestrator::builder()
        .with_tier(LocalTier::new(Arc::clone(&models), Synthesizer::default()))
        .with_tier(RemoteVisionTier::new(vision.clone()))
        .build()
        .unwrap();

    let record = orchestrator
        .diagnose(&DiagnosisRequest::new(common::red_leaf()))
        .await
        .unwrap();

    assert_eq!(models.load_count(), 1);
    assert_eq!(vision.calls(), 1);
    assert_eq!(record.provider_used, ProviderTier::RemoteVision);
    assert_eq!(record.severity, Severity::Mild);
}
