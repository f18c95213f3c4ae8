use ort::Error as OrtError;
use thiserror::Error;

use crate::remote::RemoteServiceError;

/// Errors raised by the local classifier path (loader, preprocessor, engine).
///
/// These never reach the caller directly: the orchestrator treats any of them
/// as "local tier unavailable" and moves on to the next tier. The type is
/// `Clone` so a failed model load can be cached and replayed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// The manifest, a weight shard or the label table is missing
    #[error("Model artifact not found: {0}")]
    ArtifactNotFound(String),
    /// The artifact exists but is malformed or inconsistent with its manifest
    #[error("Model artifact corrupt: {0}")]
    ArtifactCorrupt(String),
    /// The uploaded bytes could not be decoded as an image
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    /// The forward pass or its output failed
    #[error("Inference error: {0}")]
    Inference(String),
}

impl From<OrtError> for PipelineError {
    fn from(err: OrtError) -> Self {
        PipelineError::Inference(err.to_string())
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(err: image::ImageError) -> Self {
        PipelineError::ImageDecode(err.to_string())
    }
}

/// Failure of a single tier attempt.
#[derive(Debug, Error)]
pub enum TierError {
    #[error(transparent)]
    Local(#[from] PipelineError),
    #[error(transparent)]
    Remote(#[from] RemoteServiceError),
}

/// The only errors a caller of the pipeline ever sees.
///
/// `AnalysisFailed` deliberately carries no detail; the per-tier causes are
/// logged where they happen.
#[derive(Debug, Error)]
pub enum DiagnosisError {
    #[error("analysis failed")]
    AnalysisFailed,
    #[error("Configuration error: {0}")]
    Config(String),
}
