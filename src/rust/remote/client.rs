use std::env;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use log::debug;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde_json::{json, Value};

use super::error::RemoteServiceError;
use crate::config::RemoteServiceConfig;

const CONNECT_TIMEOUT_MS: u64 = 10_000;

/// An image sent alongside a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImageAttachment {
    /// Wraps raw upload bytes, sniffing the MIME type from the content.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let mime = image::guess_format(&bytes)
            .map(|format| format.to_mime_type())
            .unwrap_or("application/octet-stream")
            .to_string();
        Self { mime, bytes }
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, general_purpose::STANDARD.encode(&self.bytes))
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
    pub image: Option<ImageAttachment>,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.image = Some(image);
        self
    }
}

/// A remote service that turns a prompt (and optionally an image) into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    async fn generate(&self, request: GenerationRequest) -> Result<String, RemoteServiceError>;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    http: Client,
    name: String,
    endpoint: String,
    api_key: Option<String>,
    config: RemoteServiceConfig,
}

fn resolve_api_key(raw: Option<&str>) -> Result<Option<String>, RemoteServiceError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(reference) if reference.starts_with('$') => {
            let var = &reference[1..];
            env::var(var)
                .map(Some)
                .map_err(|_| RemoteServiceError::NotConfigured(format!("environment variable {} is not set", var)))
        }
        Some(key) => Ok(Some(key.to_string())),
    }
}

impl ChatCompletionsClient {
    pub fn new(name: impl Into<String>, config: RemoteServiceConfig) -> Result<Self, RemoteServiceError> {
        let name = name.into();
        if !config.is_configured() {
            return Err(RemoteServiceError::NotConfigured(format!("{} has no base_url", name)));
        }
        let api_key = resolve_api_key(config.api_key.as_deref())?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(CONNECT_TIMEOUT_MS.min(config.timeout_ms)))
            .build()
            .map_err(|e| RemoteServiceError::Transport(e.to_string()))?;

        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        Ok(Self {
            http,
            name,
            endpoint,
            api_key,
            config,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn config(&self) -> &RemoteServiceConfig {
        &self.config
    }

    pub(crate) fn build_payload(&self, request: &GenerationRequest) -> Value {
        let user_content = match &request.image {
            None => Value::String(request.prompt.clone()),
            Some(image) => json!([
                { "type": "text", "text": request.prompt },
                { "type": "image_url", "image_url": { "url": image.data_uri() } }
            ]),
        };
        json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": user_content }
            ],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature
        })
    }

    fn map_transport(&self, err: reqwest::Error) -> RemoteServiceError {
        if err.is_timeout() {
            RemoteServiceError::Timeout {
                timeout_ms: self.config.timeout_ms,
            }
        } else {
            RemoteServiceError::Transport(err.to_string())
        }
    }
}

/// Pulls the first choice's message text out of a completion body.
pub(crate) fn extract_content(body: &Value) -> Result<String, RemoteServiceError> {
    let content = body
        .pointer("/choices/0/message/content")
        .ok_or_else(|| RemoteServiceError::MalformedResponse("no choices[0].message.content".into()))?;

    let text = match content {
        Value::String(s) => s.clone(),
        // some providers return content parts
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        other => {
            return Err(RemoteServiceError::MalformedResponse(format!(
                "unexpected content type: {}",
                other
            )))
        }
    };

    let text = text.trim();
    if text.is_empty() {
        return Err(RemoteServiceError::MalformedResponse("empty completion".into()));
    }
    Ok(text.to_string())
}

#[async_trait]
impl TextGenerator for ChatCompletionsClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, RemoteServiceError> {
        let payload = self.build_payload(&request);
        debug!(
            "POST {} (model {}, image: {})",
            self.endpoint,
            self.config.model,
            request.image.is_some()
        );

        let mut builder = self.http.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteServiceError::from_status(status.as_u16(), retry_after, &body));
        }

        let body: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.map_transport(e)
            } else {
                RemoteServiceError::MalformedResponse(e.to_string())
            }
        })?;
        extract_content(&body)
    }
}
