//! OpenAI-compatible embedding backend implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use cohort_core::defaults::{
    EMBED_DIMENSION, EMBED_MAX_INPUT_CHARS, EMBED_MODEL, EMBED_TIMEOUT_SECS,
};
use cohort_core::{EmbeddingBackend, Error, Result};

use super::error::{to_provider_error, OpenAIErrorCode};
use super::types::*;

/// Default OpenAI API endpoint.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Maximum characters forwarded to the provider.
pub const MAX_INPUT_CHARS: usize = EMBED_MAX_INPUT_CHARS;

/// Configuration for the OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key for authentication (optional for local endpoints).
    pub api_key: Option<String>,
    /// Model to use for embeddings.
    pub embed_model: String,
    /// Expected embedding dimension (0 = accept whatever the model returns).
    pub embed_dimension: usize,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_URL.to_string(),
            api_key: None,
            embed_model: EMBED_MODEL.to_string(),
            embed_dimension: EMBED_DIMENSION,
            timeout_seconds: EMBED_TIMEOUT_SECS,
        }
    }
}

impl OpenAIConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `OPENAI_BASE_URL` | `https://api.openai.com/v1` | API endpoint |
    /// | `OPENAI_API_KEY` | (none) | Bearer token |
    /// | `OPENAI_EMBED_MODEL` | `text-embedding-3-small` | Embedding model |
    /// | `OPENAI_EMBED_DIM` | `1536` | Expected dimension |
    /// | `OPENAI_TIMEOUT` | `60` | Request timeout (seconds) |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            embed_model: std::env::var("OPENAI_EMBED_MODEL").unwrap_or(defaults.embed_model),
            embed_dimension: std::env::var("OPENAI_EMBED_DIM")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.embed_dimension),
            timeout_seconds: std::env::var("OPENAI_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_seconds),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.embed_dimension = dimension;
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

/// Cut `text` to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// OpenAI-compatible embedding backend.
///
/// Holds one pooled HTTP client; safe to share across tasks.
pub struct OpenAIBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    /// Create a new backend with the given configuration.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openai",
            op = "init",
            base_url = %config.base_url,
            model = %config.embed_model,
            dimension = config.embed_dimension,
            "Initializing OpenAI embedding backend"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env())
    }

    /// Get the current configuration.
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.bearer_auth(api_key);
        }

        req
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAIBackend {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let input = truncate_chars(text, MAX_INPUT_CHARS);

        let request = EmbeddingRequest {
            model: self.config.embed_model.clone(),
            input: vec![input.to_string()],
            encoding_format: Some("float".to_string()),
        };

        let response = self
            .build_request("/embeddings")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body: Option<OpenAIErrorResponse> = response.json().await.ok();
            let (error_type, message) = body
                .map(|b| (b.error.error_type, b.error.message))
                .unwrap_or_else(|| (String::new(), "Unknown error".to_string()));
            let code = OpenAIErrorCode::from_response(status.as_u16(), &error_type);
            return Err(to_provider_error(code, status.as_u16(), &message));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Failed to parse response: {}", e)))?;

        let embedding = result
            .data
            .into_iter()
            .min_by_key(|d| d.index)
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Provider("Provider returned no embedding".to_string()))?;

        if self.config.embed_dimension > 0 && embedding.len() != self.config.embed_dimension {
            return Err(Error::Provider(format!(
                "Expected dimension {}, got {}",
                self.config.embed_dimension,
                embedding.len()
            )));
        }

        debug!(
            subsystem = "inference",
            component = "openai",
            op = "embed",
            input_chars = input.chars().count(),
            truncated = input.len() < text.len(),
            dimension = embedding.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Embedding generated"
        );
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.config.embed_dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}
