//! Glue between an upload handler and the orchestrator.
//!
//! The caller owns transport and persistence; this module reads the upload,
//! runs the cascade, localizes the guidance and hands the result to a
//! [`HistoryStore`]. The uploaded file is removed on every failure path.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::diagnosis::DiagnosisRecord;
use crate::error::DiagnosisError;
use crate::orchestrator::{DiagnosisRequest, Orchestrator, DEFAULT_LANGUAGE};

/// Text localization collaborator.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, from: &str, to: &str) -> anyhow::Result<String>;
}

/// What gets persisted for a user's diagnosis history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub image_ref: String,
    pub record: DiagnosisRecord,
    /// Guidance in the requested language
    pub guidance: String,
    pub language: String,
}

/// Persistence collaborator for diagnosis history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn save(&self, entry: HistoryEntry) -> anyhow::Result<()>;
}

/// Owns an uploaded file and deletes it on drop unless kept.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
    keep: bool,
}

impl TempUpload {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            keep: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        fs::read(&self.path)
    }

    /// Keeps the file on disk and returns its path
    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        self.path.clone()
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed upload {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove upload {:?}: {}", self.path, e),
        }
    }
}

/// Request details that arrive alongside the upload.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub crop_hint: Option<String>,
    pub context: Option<String>,
    /// Defaults to English when absent
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisResponse {
    pub record: DiagnosisRecord,
    pub localized_guidance: String,
    pub language: String,
    pub image_ref: String,
}

pub struct DiagnosisService {
    orchestrator: Arc<Orchestrator>,
    translator: Option<Arc<dyn Translator>>,
    history: Option<Arc<dyn HistoryStore>>,
}

impl DiagnosisService {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            translator: None,
            history: None,
        }
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub async fn handle(&self, upload: TempUpload, meta: RequestMeta) -> Result<DiagnosisResponse, DiagnosisError> {
        let image = upload.read().map_err(|e| {
            error!("Failed to read upload {:?}: {}", upload.path(), e);
            DiagnosisError::AnalysisFailed
        })?;

        let language = meta
            .language
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
        let mut request = DiagnosisRequest::new(image).with_language(language.clone());
        request.crop_hint = meta.crop_hint;
        request.context = meta.context;

        // on error the upload is dropped here and its file removed
        let record = self.orchestrator.diagnose(&request).await?;
        drop(request);

        let localized_guidance = self.localize(&record.guidance, &language).await;
        let image_ref = upload.path().to_string_lossy().into_owned();

        if let Some(history) = &self.history {
            let entry = HistoryEntry {
                image_ref: image_ref.clone(),
                record: record.clone(),
                guidance: localized_guidance.clone(),
                language: language.clone(),
            };
            if let Err(e) = history.save(entry).await {
                error!("Failed to save diagnosis history for {}: {}", image_ref, e);
            }
        }

        upload.keep();
        info!("Diagnosis served via {} in {}ms", record.provider_used, record.latency_ms);
        Ok(DiagnosisResponse {
            record,
            localized_guidance,
            language,
            image_ref,
        })
    }

    async fn localize(&self, text: &str, language: &str) -> String {
        if language == DEFAULT_LANGUAGE {
            return text.to_string();
        }
        let Some(translator) = &self.translator else {
            warn!("No translator configured, serving guidance in {}", DEFAULT_LANGUAGE);
            return text.to_string();
        };
        match translator.translate(text, DEFAULT_LANGUAGE, language).await {
            Ok(translated) => translated,
            Err(e) => {
                warn!("Translation to {} failed, serving native text: {}", language, e);
                text.to_string()
            }
        }
    }
}
