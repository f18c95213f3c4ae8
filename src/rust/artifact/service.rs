use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::Mutex;

use super::labels::ClassLabelTable;
use super::loader::{load_artifact, ModelArtifact};
use crate::classifier::{build_backend, InferenceBackend};
use crate::config::{default_model_dir, PipelineConfig};
use crate::error::PipelineError;
use crate::runtime::RuntimeConfig;

/// Settings that affect how a model directory is turned into a runnable model.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// Square input size used when the artifact does not declare one
    pub default_input_size: u32,
    pub runtime: RuntimeConfig,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            default_input_size: 224,
            runtime: RuntimeConfig::default(),
        }
    }
}

/// Everything the local tier needs to run: artifact, labels and a prepared backend.
#[derive(Debug)]
pub struct LoadedModel {
    pub artifact: Arc<ModelArtifact>,
    pub labels: ClassLabelTable,
    pub backend: Box<dyn InferenceBackend>,
    /// (width, height) the preprocessor must produce
    pub input_size: (u32, u32),
}

#[derive(Debug)]
enum LoadState {
    Unloaded,
    Loaded(Arc<LoadedModel>),
    Failed(PipelineError),
}

/// Lazily loads a model directory once and hands out the shared result.
///
/// The mutex only guards the loading transition. Callers that arrive while
/// a load is running wait for it and then read the cached model; a failed
/// load is cached as well and is not retried until [`ModelService::invalidate`].
#[derive(Debug)]
pub struct ModelService {
    model_dir: PathBuf,
    settings: ModelSettings,
    state: Mutex<LoadState>,
    loads: AtomicUsize,
}

impl ModelService {
    pub fn new<P: AsRef<Path>>(model_dir: P, settings: ModelSettings) -> Self {
        Self {
            model_dir: model_dir.as_ref().to_path_buf(),
            settings,
            state: Mutex::new(LoadState::Unloaded),
            loads: AtomicUsize::new(0),
        }
    }

    /// Creates a service for the default model directory
    pub fn new_default() -> Self {
        Self::new(default_model_dir(), ModelSettings::default())
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            &config.model_dir,
            ModelSettings {
                default_input_size: config.default_input_size,
                runtime: config.runtime.clone(),
            },
        )
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Returns the loaded model, performing the load on first use.
    pub async fn load(&self) -> Result<Arc<LoadedModel>, PipelineError> {
        let mut state = self.state.lock().await;
        match &*state {
            LoadState::Loaded(model) => return Ok(Arc::clone(model)),
            LoadState::Failed(err) => return Err(err.clone()),
            LoadState::Unloaded => {}
        }

        self.loads.fetch_add(1, Ordering::SeqCst);
        info!("Loading model from {:?}", self.model_dir);
        let model_dir = self.model_dir.clone();
        let settings = self.settings.clone();
        let loaded = tokio::task::spawn_blocking(move || load_from_disk(&model_dir, &settings))
            .await
            .unwrap_or_else(|e| Err(PipelineError::Inference(format!("model load task failed: {}", e))));
        match loaded {
            Ok(model) => {
                let model = Arc::new(model);
                info!(
                    "Model ready: {} classes, input {}x{}, backend {}",
                    model.labels.len(),
                    model.input_size.0,
                    model.input_size.1,
                    model.backend.name()
                );
                *state = LoadState::Loaded(Arc::clone(&model));
                Ok(model)
            }
            Err(e) => {
                error!("Failed to load model from {:?}: {}", self.model_dir, e);
                *state = LoadState::Failed(e.clone());
                Err(e)
            }
        }
    }

    /// Drops the cached model or cached failure so the next call loads again.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        if !matches!(*state, LoadState::Unloaded) {
            warn!("Invalidating cached model for {:?}", self.model_dir);
        }
        *state = LoadState::Unloaded;
    }

    pub async fn is_loaded(&self) -> bool {
        matches!(*self.state.lock().await, LoadState::Loaded(_))
    }

    /// Number of load attempts made so far
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

/// Reads, verifies and prepares a model directory. Blocking.
fn load_from_disk(model_dir: &Path, settings: &ModelSettings) -> Result<LoadedModel, PipelineError> {
    let artifact = Arc::new(load_artifact(model_dir)?);
    let labels = ClassLabelTable::load(model_dir)?;
    let backend = build_backend(&artifact, &settings.runtime)?;

    if let Some(classes) = backend.num_classes() {
        if classes != labels.len() {
            return Err(PipelineError::ArtifactCorrupt(format!(
                "model produces {} classes but the label table has {}",
                classes,
                labels.len()
            )));
        }
    }

    let default = settings.default_input_size;
    let input_size = backend.input_size().unwrap_or((default, default));
    Ok(LoadedModel {
        artifact,
        labels,
        backend,
        input_size,
    })
}
