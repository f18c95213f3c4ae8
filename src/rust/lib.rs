//! Crop-disease diagnosis from leaf photos.
//!
//! A locally bundled image classifier is tried first. When it is missing,
//! broken or cannot read the image, the request falls through to a remote
//! vision service and then to a text-only service. Whichever answers, the
//! caller receives the same [`DiagnosisRecord`].
//!
//! # Basic Usage
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use cropdoc::{DiagnosisRequest, Orchestrator, PipelineConfig};
//!
//! let config = PipelineConfig::from_env().with_model_dir("/opt/cropdoc/model");
//! let orchestrator = Orchestrator::from_config(&config)?;
//!
//! let image = std::fs::read("leaf.jpg")?;
//! let request = DiagnosisRequest::new(image)
//!     .with_crop_hint("Tomato")
//!     .with_context("Spots appeared after a week of rain");
//!
//! let record = orchestrator.diagnose(&request).await?;
//! println!("{} on {} ({})", record.disease, record.crop, record.severity);
//! println!("{}", record.guidance);
//! # Ok(())
//! # }
//! ```
//!
//! # Model directory
//!
//! The local model is a `model.json` manifest, its weight shards and a
//! `labels.json` array of `"<Crop>___<Condition>"` labels. It is loaded once
//! per [`ModelService`] on first use; share the service with `Arc` to share
//! the model:
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use cropdoc::{ModelService, ModelSettings};
//!
//! let models = Arc::new(ModelService::new("/opt/cropdoc/model", ModelSettings::default()));
//! let model = models.load().await?;
//! let ranked = cropdoc::classify_image(&model, &std::fs::read("leaf.png")?)?;
//! if let Some(top) = ranked.top() {
//!     println!("{}: {:.1}%", top.label, top.probability * 100.0);
//! }
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod classifier;
pub mod config;
pub mod diagnosis;
pub mod error;
pub mod orchestrator;
pub mod remote;
mod runtime;
pub mod service;

pub use artifact::{load_artifact, ClassLabelTable, LoadedModel, ModelArtifact, ModelService, ModelSettings};
pub use classifier::{classify, classify_image, preprocess, PredictionResult, RankedPrediction};
pub use config::{default_model_dir, PipelineConfig, RemoteServiceConfig};
pub use diagnosis::{DiagnosisRecord, KnowledgeBase, ProviderTier, Severity, Synthesizer};
pub use error::{DiagnosisError, PipelineError, TierError};
pub use orchestrator::{DiagnosisRequest, Orchestrator, OrchestratorBuilder, RawTierResult, Tier};
pub use remote::{ChatCompletionsClient, RemoteServiceError, TextGenerator};
pub use runtime::{create_session_builder, RuntimeConfig};
pub use service::{DiagnosisResponse, DiagnosisService, HistoryEntry, HistoryStore, RequestMeta, TempUpload, Translator};

pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}
