//! Shared OpenAI-compatible adapter core
//!
//! Azure OpenAI, Ollama and vLLM all speak the OpenAI chat-completions wire
//! protocol; this module holds the one conversion surface (messages,
//! responses, chunks, embeddings, errors) they share. Each named adapter is
//! a thin wrapper that supplies its own configuration and identity.

use crate::provider::{ChunkStream, InferenceProvider, ProviderKind};
use crate::types::*;
use async_openai::{
    Client,
    config::OpenAIConfig as AsyncOpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateEmbeddingRequestArgs,
    },
};
use async_trait::async_trait;
use futures::StreamExt;

/// Configuration for one OpenAI-compatible endpoint
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    /// Backend name reported in cost records and logs
    pub name: String,
    /// Cloud (metered) or local (free)
    pub kind: ProviderKind,
    /// API key; local engines accept any placeholder
    pub api_key: String,
    /// API base URL
    pub base_url: Option<String>,
    /// Model used when the request does not name one
    pub default_model: String,
    pub default_temperature: f32,
    pub default_max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            name: "openai-compatible".to_string(),
            kind: ProviderKind::Cloud,
            api_key: String::new(),
            base_url: None,
            default_model: String::new(),
            default_temperature: 0.7,
            default_max_tokens: 4096,
            timeout_secs: 60,
        }
    }
}

/// Provider for any OpenAI-compatible endpoint
pub struct OpenAiCompatProvider {
    client: Client<AsyncOpenAIConfig>,
    config: OpenAiCompatConfig,
}

impl OpenAiCompatProvider {
    pub fn with_config(config: OpenAiCompatConfig) -> Self {
        let mut openai_config = AsyncOpenAIConfig::new().with_api_key(&config.api_key);
        if let Some(ref base_url) = config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }
        let client = Client::with_config(openai_config);
        Self { client, config }
    }

    pub fn config(&self) -> &OpenAiCompatConfig {
        &self.config
    }

    fn resolve_model(&self, requested: Option<&str>) -> String {
        match requested {
            Some(model) if !model.is_empty() => model.to_string(),
            _ => self.config.default_model.clone(),
        }
    }

    fn convert_messages(
        messages: &[ChatMessage],
    ) -> Result<Vec<ChatCompletionRequestMessage>, ProviderError> {
        messages
            .iter()
            .map(|msg| match msg.role {
                Role::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(msg.content.clone())
                    .build()
                    .map(Into::into)
                    .map_err(|e| ProviderError::Config(e.to_string())),
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(msg.content.clone())
                    .build()
                    .map(Into::into)
                    .map_err(|e| ProviderError::Config(e.to_string())),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(msg.content.clone())
                    .build()
                    .map(Into::into)
                    .map_err(|e| ProviderError::Config(e.to_string())),
            })
            .collect()
    }

    fn convert_finish_reason(reason: async_openai::types::FinishReason) -> FinishReason {
        match reason {
            async_openai::types::FinishReason::Stop => FinishReason::Stop,
            async_openai::types::FinishReason::Length => FinishReason::Length,
            async_openai::types::FinishReason::ContentFilter => FinishReason::ContentFilter,
            async_openai::types::FinishReason::ToolCalls
            | async_openai::types::FinishReason::FunctionCall => FinishReason::Stop,
        }
    }

    /// Classify SDK errors into the backend-scoped taxonomy.
    fn convert_error(err: async_openai::error::OpenAIError) -> ProviderError {
        match err {
            async_openai::error::OpenAIError::ApiError(api_err) => {
                let code = api_err.code.clone();
                let message = api_err.message.clone();
                if message.contains("rate limit") {
                    ProviderError::RateLimited(message)
                } else if message.contains("api key") || message.contains("authentication") {
                    ProviderError::Auth(message)
                } else {
                    ProviderError::Api { code, message }
                }
            }
            async_openai::error::OpenAIError::Reqwest(e) => {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            }
            async_openai::error::OpenAIError::JSONDeserialize(e) => {
                ProviderError::Serialization(e.to_string())
            }
            async_openai::error::OpenAIError::InvalidArgument(msg) => ProviderError::Config(msg),
            _ => ProviderError::Api {
                code: None,
                message: err.to_string(),
            },
        }
    }
}

#[async_trait]
impl InferenceProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> ProviderKind {
        self.config.kind
    }

    fn is_available(&self) -> bool {
        // Local engines need no credentials; cloud endpoints need a key.
        self.config.kind == ProviderKind::Local || !self.config.api_key.is_empty()
    }

    async fn complete(&self, request: CompletionRequest) -> ProviderResult<CompletionResponse> {
        let messages = Self::convert_messages(&request.messages)?;
        let model = self.resolve_model(request.model.as_deref());
        let prompt_chars = request.prompt_chars();

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&model)
            .messages(messages)
            .temperature(request.temperature.unwrap_or(self.config.default_temperature));
        if let Some(max_tokens) = request.max_tokens {
            builder.max_tokens(max_tokens);
        }

        let openai_request = builder
            .build()
            .map_err(|e| ProviderError::Config(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(openai_request)
            .await
            .map_err(Self::convert_error)?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        let finish_reason = response
            .choices
            .first()
            .and_then(|c| c.finish_reason)
            .map(Self::convert_finish_reason);
        let usage = response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_else(|| TokenUsage::approximate(prompt_chars, content.len()));

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("response_id".to_string(), serde_json::json!(response.id));
        if let Some(fingerprint) = response.system_fingerprint {
            metadata.insert("system_fingerprint".to_string(), serde_json::json!(fingerprint));
        }

        Ok(CompletionResponse {
            content,
            backend: self.config.name.clone(),
            model: response.model,
            usage,
            finish_reason,
            metadata,
        })
    }

    async fn stream(&self, request: CompletionRequest) -> ProviderResult<ChunkStream> {
        let messages = Self::convert_messages(&request.messages)?;
        let model = self.resolve_model(request.model.as_deref());

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&model)
            .messages(messages)
            .stream(true)
            .temperature(request.temperature.unwrap_or(self.config.default_temperature));
        if let Some(max_tokens) = request.max_tokens {
            builder.max_tokens(max_tokens);
        }

        let openai_request = builder
            .build()
            .map_err(|e| ProviderError::Config(e.to_string()))?;

        let stream = self
            .client
            .chat()
            .create_stream(openai_request)
            .await
            .map_err(Self::convert_error)?;

        let backend = self.config.name.clone();
        let converted = stream.filter_map(move |result| {
            let backend = backend.clone();
            async move {
                match result {
                    Ok(chunk) => {
                        let choice = chunk.choices.first();
                        Some(Ok(StreamChunk {
                            content: choice
                                .and_then(|c| c.delta.content.clone())
                                .unwrap_or_default(),
                            backend,
                            model: chunk.model,
                            finish_reason: choice
                                .and_then(|c| c.finish_reason)
                                .map(Self::convert_finish_reason),
                        }))
                    }
                    Err(e) => {
                        let err_str = e.to_string();
                        // Some compatible servers emit invalid UTF-8 mid-stream;
                        // skip those frames instead of killing the stream.
                        if err_str.contains("stream did not contain valid UTF-8")
                            || err_str.contains("utf8")
                        {
                            tracing::warn!("skipping invalid UTF-8 chunk from stream");
                            None
                        } else {
                            Some(Err(Self::convert_error(e)))
                        }
                    }
                }
            }
        });

        Ok(Box::pin(converted))
    }

    async fn embed(&self, request: EmbeddingRequest) -> ProviderResult<EmbeddingResponse> {
        let model = self.resolve_model(request.model.as_deref());

        let openai_request = CreateEmbeddingRequestArgs::default()
            .model(&model)
            .input(request.texts)
            .build()
            .map_err(|e| ProviderError::Config(e.to_string()))?;

        let response = self
            .client
            .embeddings()
            .create(openai_request)
            .await
            .map_err(Self::convert_error)?;

        let vectors = response.data.into_iter().map(|d| d.embedding).collect();

        Ok(EmbeddingResponse {
            vectors,
            backend: self.config.name.clone(),
            model: response.model,
            usage: EmbeddingUsage {
                prompt_tokens: response.usage.prompt_tokens,
                total_tokens: response.usage.total_tokens,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloud_availability_requires_key() {
        let provider = OpenAiCompatProvider::with_config(OpenAiCompatConfig {
            name: "cloudy".into(),
            kind: ProviderKind::Cloud,
            ..Default::default()
        });
        assert!(!provider.is_available());

        let provider = OpenAiCompatProvider::with_config(OpenAiCompatConfig {
            name: "cloudy".into(),
            kind: ProviderKind::Cloud,
            api_key: "sk-test".into(),
            ..Default::default()
        });
        assert!(provider.is_available());
    }

    #[test]
    fn test_local_availability_needs_no_key() {
        let provider = OpenAiCompatProvider::with_config(OpenAiCompatConfig {
            name: "local".into(),
            kind: ProviderKind::Local,
            base_url: Some("http://localhost:11434/v1".into()),
            ..Default::default()
        });
        assert!(provider.is_available());
    }

    #[test]
    fn test_model_resolution_prefers_request() {
        let provider = OpenAiCompatProvider::with_config(OpenAiCompatConfig {
            default_model: "gpt-4o-mini".into(),
            ..Default::default()
        });
        assert_eq!(provider.resolve_model(Some("gpt-4o")), "gpt-4o");
        assert_eq!(provider.resolve_model(Some("")), "gpt-4o-mini");
        assert_eq!(provider.resolve_model(None), "gpt-4o-mini");
    }

    #[test]
    fn test_message_conversion_covers_roles() {
        let messages = vec![
            ChatMessage::system("be terse"),
            ChatMessage::user("hello"),
            ChatMessage::assistant("hi"),
        ];
        let converted = OpenAiCompatProvider::convert_messages(&messages).unwrap();
        assert_eq!(converted.len(), 3);
    }
}
