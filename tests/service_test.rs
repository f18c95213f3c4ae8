mod common;

use std::fs;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cropdoc::orchestrator::LocalTier;
use cropdoc::{
    DiagnosisError, DiagnosisService, HistoryEntry, HistoryStore, ModelService, ModelSettings, Orchestrator,
    ProviderTier, RequestMeta, Synthesizer, TempUpload, Translator,
};

struct UpperTranslator;

#[async_trait]
impl Translator for UpperTranslator {
    async fn translate(&self, text: &str, from: &str, to: &str) -> anyhow::Result<String> {
        assert_eq!(from, "en");
        Ok(format!("[{}] {}", to, text.to_uppercase()))
    }
}

struct BrokenTranslator;

#[async_trait]
impl Translator for BrokenTranslator {
    async fn translate(&self, _text: &str, _from: &str, _to: &str) -> anyhow::Result<String> {
        anyhow::bail!("translation service unavailable")
    }
}

#[derive(Default)]
struct MemoryHistory {
    entries: Mutex<Vec<HistoryEntry>>,
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn save(&self, entry: HistoryEntry) -> anyhow::Result<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

struct FailingHistory;

#[async_trait]
impl HistoryStore for FailingHistory {
    async fn save(&self, _entry: HistoryEntry) -> anyhow::Result<()> {
        anyhow::bail!("database offline")
    }
}

fn local_orchestrator(model_dir: &std::path::Path) -> Arc<Orchestrator> {
    let models = Arc::new(ModelService::new(model_dir, ModelSettings::default()));
    Arc::new(
        Orchestrator::builder()
            .with_tier(LocalTier::new(models, Synthesizer::default()))
            .build()
            .unwrap(),
    )
}

fn write_upload(dir: &std::path::Path, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join("upload-1234.png");
    fs::write(&path, bytes).unwrap();
    path
}

#[tokio::test]
async fn test_failed_analysis_removes_upload() {
    let model_dir = tempfile::tempdir().unwrap();
    let uploads = tempfile::tempdir().unwrap();
    let path = write_upload(uploads.path(), &common::red_leaf());

    let service = DiagnosisService::new(local_orchestrator(model_dir.path()));
    let err = service
        .handle(TempUpload::new(&path), RequestMeta::default())
        .await
        .unwrap_err();

    assert!(matches!(err, DiagnosisError::AnalysisFailed));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_unreadable_upload_is_generic_failure() {
    let model_dir = tempfile::tempdir().unwrap();
    common::write_model(model_dir.path(), 1);
    let uploads = tempfile::tempdir().unwrap();

    let service = DiagnosisService::new(local_orchestrator(model_dir.path()));
    let err = service
        .handle(TempUpload::new(uploads.path().join("missing.png")), RequestMeta::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "analysis failed");
}

#[tokio::test]
async fn test_success_keeps_upload_and_persists_history() {
    let model_dir = tempfile::tempdir().unwrap();
    common::write_model(model_dir.path(), 2);
    let uploads = tempfile::tempdir().unwrap();
    let path = write_upload(uploads.path(), &common::red_leaf());
    let history = Arc::new(MemoryHistory::default());

    let service = DiagnosisService::new(local_orchestrator(model_dir.path()))
        .with_translator(Arc::new(UpperTranslator))
        .with_history(history.clone());
    let meta = RequestMeta {
        language: Some("sw".into()),
        ..Default::default()
    };
    let response = service.handle(TempUpload::new(&path), meta).await.unwrap();

    assert!(path.exists());
    assert_eq!(response.language, "sw");
    assert_eq!(response.record.provider_used, ProviderTier::Local);
    assert!(response.localized_guidance.starts_with("[sw] "));
    assert_eq!(response.image_ref, path.to_string_lossy());

    let entries = history.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].guidance, response.localized_guidance);
    assert_eq!(entries[0].record, response.record);
}

#[tokio::test]
async fn test_translation_failure_serves_native_text() {
    let model_dir = tempfile::tempdir().unwrap();
    common::write_model(model_dir.path(), 1);
    let uploads = tempfile::tempdir().unwrap();
    let path = write_upload(uploads.path(), &common::green_leaf());

    let service = DiagnosisService::new(local_orchestrator(model_dir.path())).with_translator(Arc::new(BrokenTranslator));
    let meta = RequestMeta {
        language: Some("fr".into()),
        ..Default::default()
    };
    let response = service.handle(TempUpload::new(&path), meta).await.unwrap();

    assert_eq!(response.localized_guidance, response.record.guidance);
    assert!(response.record.is_healthy);
}

#[tokio::test]
async fn test_english_is_not_translated() {
    let model_dir = tempfile::tempdir().unwrap();
    common::write_model(model_dir.path(), 1);
    let uploads = tempfile::tempdir().unwrap();
    let path = write_upload(uploads.path(), &common::red_leaf());

    let service = DiagnosisService::new(local_orchestrator(model_dir.path())).with_translator(Arc::new(UpperTranslator));
    let response = service.handle(TempUpload::new(&path), RequestMeta::default()).await.unwrap();
    assert_eq!(response.language, "en");
    assert_eq!(response.localized_guidance, response.record.guidance);
}

#[tokio::test]
async fn test_history_failure_does_not_fail_request() {
    let model_dir = tempfile::tempdir().unwrap();
    common::write_model(model_dir.path(), 1);
    let uploads = tempfile::tempdir().unwrap();
    let path = write_upload(uploads.path(), &common::red_leaf());

    let service = DiagnosisService::new(local_orchestrator(model_dir.path())).with_history(Arc::new(FailingHistory));
    let response = service.handle(TempUpload::new(&path), RequestMeta::default()).await;
    assert!(response.is_ok());
    assert!(path.exists());
}
