//! Ollama provider (local, thin wrapper of the OpenAI-compatible core)

use super::openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};
use crate::provider::{ChunkStream, InferenceProvider, ProviderKind};
use crate::types::*;
use async_trait::async_trait;

/// Ollama provider configuration
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL (default: http://localhost:11434/v1); no API key needed
    pub base_url: String,
    /// Default model id, e.g. llama3.1:8b
    pub default_model: String,
    pub default_temperature: f32,
    pub default_max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            default_model: "llama3.1:8b".to_string(),
            default_temperature: 0.7,
            default_max_tokens: 2048,
            timeout_secs: 120,
        }
    }
}

impl OllamaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            cfg.default_model = model;
        }
        if let Ok(base_url) = std::env::var("OLLAMA_BASE_URL") {
            let base = base_url.trim_end_matches('/');
            // Accept both host roots and already-suffixed /v1 endpoints
            cfg.base_url = if base.ends_with("/v1") {
                base.to_string()
            } else {
                format!("{}/v1", base)
            };
        }
        cfg
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Ollama provider
pub struct OllamaProvider {
    inner: OpenAiCompatProvider,
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OllamaProvider {
    /// Provider with the default localhost endpoint
    pub fn new() -> Self {
        Self::with_config(OllamaConfig::new())
    }

    /// Provider reading `OLLAMA_BASE_URL` and `OLLAMA_MODEL` from the
    /// environment
    pub fn from_env() -> Self {
        Self::with_config(OllamaConfig::from_env())
    }

    pub fn with_config(config: OllamaConfig) -> Self {
        let inner = OpenAiCompatProvider::with_config(OpenAiCompatConfig {
            name: "ollama".to_string(),
            kind: ProviderKind::Local,
            api_key: "not-needed".to_string(),
            base_url: Some(config.base_url),
            default_model: config.default_model,
            default_temperature: config.default_temperature,
            default_max_tokens: config.default_max_tokens,
            timeout_secs: config.timeout_secs,
        });
        Self { inner }
    }
}

#[async_trait]
impl InferenceProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    async fn complete(&self, request: CompletionRequest) -> ProviderResult<CompletionResponse> {
        self.inner.complete(request).await
    }

    async fn stream(&self, request: CompletionRequest) -> ProviderResult<ChunkStream> {
        self.inner.stream(request).await
    }

    async fn embed(&self, request: EmbeddingRequest) -> ProviderResult<EmbeddingResponse> {
        self.inner.embed(request).await
    }

    async fn close(&self) {
        self.inner.close().await
    }
}
