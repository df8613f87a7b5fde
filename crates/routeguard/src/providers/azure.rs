//! Azure OpenAI provider (cloud)
//!
//! Azure exposes deployments behind a per-deployment URL; this adapter
//! rewrites the base URL accordingly and otherwise reuses the shared
//! OpenAI-compatible core.

use super::openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};
use crate::provider::{ChunkStream, InferenceProvider, ProviderKind};
use crate::types::*;
use async_trait::async_trait;

/// Azure OpenAI configuration
#[derive(Debug, Clone)]
pub struct AzureConfig {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`
    pub endpoint: String,
    /// API key
    pub api_key: String,
    /// Deployment name; doubles as the default model identifier
    pub deployment: String,
    pub default_temperature: f32,
    pub default_max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            deployment: String::new(),
            default_temperature: 0.7,
            default_max_tokens: 4096,
            timeout_secs: 60,
        }
    }
}

impl AzureConfig {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            deployment: deployment.into(),
            ..Default::default()
        }
    }

    /// Read `AZURE_OPENAI_ENDPOINT`, `AZURE_OPENAI_API_KEY` and
    /// `AZURE_OPENAI_DEPLOYMENT` from the environment.
    pub fn from_env() -> Self {
        Self {
            endpoint: std::env::var("AZURE_OPENAI_ENDPOINT").unwrap_or_default(),
            api_key: std::env::var("AZURE_OPENAI_API_KEY").unwrap_or_default(),
            deployment: std::env::var("AZURE_OPENAI_DEPLOYMENT").unwrap_or_default(),
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.default_temperature = temp;
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.default_max_tokens = tokens;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Azure OpenAI provider
pub struct AzureOpenAIProvider {
    inner: OpenAiCompatProvider,
    configured: bool,
}

impl AzureOpenAIProvider {
    pub fn from_env() -> Self {
        Self::with_config(AzureConfig::from_env())
    }

    pub fn with_config(config: AzureConfig) -> Self {
        let configured = !config.endpoint.is_empty()
            && !config.api_key.is_empty()
            && !config.deployment.is_empty();

        // Azure routes requests per deployment rather than per model
        let base_url = format!(
            "{}/openai/deployments/{}",
            config.endpoint.trim_end_matches('/'),
            config.deployment
        );

        let inner = OpenAiCompatProvider::with_config(OpenAiCompatConfig {
            name: "azure".to_string(),
            kind: ProviderKind::Cloud,
            api_key: config.api_key,
            base_url: Some(base_url),
            default_model: config.deployment,
            default_temperature: config.default_temperature,
            default_max_tokens: config.default_max_tokens,
            timeout_secs: config.timeout_secs,
        });
        Self { inner, configured }
    }
}

#[async_trait]
impl InferenceProvider for AzureOpenAIProvider {
    fn name(&self) -> &str {
        "azure"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Cloud
    }

    fn is_available(&self) -> bool {
        self.configured
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
    fn test_unconfigured_is_unavailable() {
        let provider = AzureOpenAIProvider::with_config(AzureConfig::default());
        assert!(!provider.is_available());
    }

    #[test]
    fn test_configured_is_available() {
        let provider = AzureOpenAIProvider::with_config(AzureConfig::new(
            "https://unit-test.openai.azure.com",
            "key",
            "gpt-4o",
        ));
        assert!(provider.is_available());
        assert_eq!(provider.name(), "azure");
        assert_eq!(provider.kind(), ProviderKind::Cloud);
    }

    #[test]
    fn test_deployment_url_rewrite() {
        let provider = AzureOpenAIProvider::with_config(AzureConfig::new(
            "https://unit-test.openai.azure.com/",
            "key",
            "gpt-4o",
        ));
        let base = provider.inner.config().base_url.clone().unwrap();
        assert_eq!(
            base,
            "https://unit-test.openai.azure.com/openai/deployments/gpt-4o"
        );
    }
}
