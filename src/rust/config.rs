use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::runtime::RuntimeConfig;

/// Default per-request timeout for remote services
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 30_000;

/// Resolves where the model artifact lives when nothing is configured.
///
/// `CROPDOC_MODEL_DIR` wins, then the platform cache directory, then
/// `~/.cache`, then the system temp directory.
pub fn default_model_dir() -> PathBuf {
    if let Ok(path) = env::var("CROPDOC_MODEL_DIR") {
        return PathBuf::from(path);
    }

    if let Some(cache_dir) = dirs::cache_dir() {
        return cache_dir.join("cropdoc").join("model");
    }

    if let Some(home_dir) = dirs::home_dir() {
        return home_dir.join(".cache").join("cropdoc").join("model");
    }

    env::temp_dir().join("cropdoc").join("model")
}

/// Connection settings for one OpenAI-compatible chat-completions service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteServiceConfig {
    /// Base URL up to and including the API version, e.g. `https://api.example.com/v1`
    pub base_url: String,
    /// Literal key, or `$NAME` to read it from the environment when the client is built
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_ms: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for RemoteServiceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            model: String::new(),
            timeout_ms: DEFAULT_REMOTE_TIMEOUT_MS,
            max_tokens: 1024,
            temperature: 0.3,
        }
    }
}

impl RemoteServiceConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.trim().is_empty()
    }

    fn from_env_prefix(prefix: &str, timeout_ms: u64) -> Option<Self> {
        let base_url = env::var(format!("{}_URL", prefix)).ok()?;
        let config = Self {
            base_url,
            api_key: env::var(format!("{}_API_KEY", prefix)).ok(),
            model: env::var(format!("{}_MODEL", prefix)).unwrap_or_default(),
            timeout_ms,
            ..Default::default()
        };
        config.is_configured().then_some(config)
    }
}

/// Everything needed to assemble the diagnosis cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub model_dir: PathBuf,
    /// Square input size used when the artifact does not declare one
    pub default_input_size: u32,
    /// Replaces the built-in disease knowledge base when set
    pub knowledge_base_path: Option<PathBuf>,
    /// Image-capable service for the second tier
    pub vision: Option<RemoteServiceConfig>,
    /// Text-only service for the last tier
    pub fallback: Option<RemoteServiceConfig>,
    /// Text service that rewrites local guidance
    pub refine: Option<RemoteServiceConfig>,
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            default_input_size: 224,
            knowledge_base_path: None,
            vision: None,
            fallback: None,
            refine: None,
            runtime: RuntimeConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON config file; omitted fields keep their defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        debug!("Loaded pipeline config from {:?}", path);
        Ok(config)
    }

    /// Builds a config from `CROPDOC_*` environment variables.
    pub fn from_env() -> Self {
        let timeout_ms = env::var("CROPDOC_REMOTE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_REMOTE_TIMEOUT_MS);
        Self {
            vision: RemoteServiceConfig::from_env_prefix("CROPDOC_VISION", timeout_ms),
            fallback: RemoteServiceConfig::from_env_prefix("CROPDOC_FALLBACK", timeout_ms),
            refine: RemoteServiceConfig::from_env_prefix("CROPDOC_REFINE", timeout_ms),
            ..Default::default()
        }
    }

    pub fn with_model_dir<P: AsRef<Path>>(mut self, model_dir: P) -> Self {
        self.model_dir = model_dir.as_ref().to_path_buf();
        self
    }

    /// Drops every remote service so only the local classifier runs
    pub fn local_only(mut self) -> Self {
        self.vision = None;
        self.fallback = None;
        self.refine = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cropdoc.json");
        fs::write(
            &path,
            r#"{"model_dir": "/opt/models/plant", "vision": {"base_url": "https://vision.example/v1", "model": "v"}}"#,
        )
        .unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.model_dir, PathBuf::from("/opt/models/plant"));
        assert_eq!(config.default_input_size, 224);
        let vision = config.vision.unwrap();
        assert_eq!(vision.timeout_ms, DEFAULT_REMOTE_TIMEOUT_MS);
        assert!(vision.is_configured());
        assert!(config.fallback.is_none());
    }

    #[test]
    fn test_local_only_clears_remote_services() {
        let config = PipelineConfig {
            vision: Some(RemoteServiceConfig::new("https://a/v1", "m")),
            refine: Some(RemoteServiceConfig::new("https://b/v1", "m")),
            ..Default::default()
        }
        .local_only();
        assert!(config.vision.is_none());
        assert!(config.refine.is_none());
    }

    #[test]
    fn test_blank_url_is_not_configured() {
        assert!(!RemoteServiceConfig::new("  ", "m").is_configured());
    }
}
