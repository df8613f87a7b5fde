//! vLLM provider (local, thin wrapper of the OpenAI-compatible core)
//!
//! vLLM serves an OpenAI-compatible endpoint out of the box; the only
//! differences from Ollama are the defaults.

use super::openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};
use crate::provider::{ChunkStream, InferenceProvider, ProviderKind};
use crate::types::*;
use async_trait::async_trait;

/// vLLM provider configuration
#[derive(Debug, Clone)]
pub struct VllmConfig {
    /// Base URL (default: http://localhost:8000/v1)
    pub base_url: String,
    /// Served model id, e.g. meta-llama/Llama-3.1-8B-Instruct
    pub default_model: String,
    pub default_temperature: f32,
    pub default_max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for VllmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            default_model: "meta-llama/Llama-3.1-8B-Instruct".to_string(),
            default_temperature: 0.7,
            default_max_tokens: 2048,
            timeout_secs: 120,
        }
    }
}

impl VllmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(model) = std::env::var("VLLM_MODEL") {
            cfg.default_model = model;
        }
        if let Ok(base_url) = std::env::var("VLLM_BASE_URL") {
            let base = base_url.trim_end_matches('/');
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
}

/// vLLM provider
pub struct VllmProvider {
    inner: OpenAiCompatProvider,
}

impl Default for VllmProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl VllmProvider {
    pub fn new() -> Self {
        Self::with_config(VllmConfig::new())
    }

    pub fn from_env() -> Self {
        Self::with_config(VllmConfig::from_env())
    }

    pub fn with_config(config: VllmConfig) -> Self {
        let inner = OpenAiCompatProvider::with_config(OpenAiCompatConfig {
            name: "vllm".to_string(),
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
impl InferenceProvider for VllmProvider {
    fn name(&self) -> &str {
        "vllm"
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_identity() {
        let provider = VllmProvider::new();
        assert_eq!(provider.name(), "vllm");
        assert_eq!(provider.kind(), ProviderKind::Local);
        assert!(provider.is_available());
    }

    #[test]
    fn test_env_url_normalization() {
        let config = VllmConfig::new().with_base_url("http://gpu-box:8000/v1");
        assert_eq!(config.base_url, "http://gpu-box:8000/v1");
    }
}
