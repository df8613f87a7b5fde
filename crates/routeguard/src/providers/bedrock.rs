//! AWS Bedrock provider (cloud, text-only)
//!
//! Talks to the Bedrock runtime Converse API with bearer-token
//! authentication. Streaming uses AWS's binary event-stream framing and is
//! not implemented here; the router's fallback traversal covers it.

use crate::provider::{ChunkStream, InferenceProvider, ProviderKind};
use crate::types::*;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Bedrock provider configuration
#[derive(Debug, Clone)]
pub struct BedrockConfig {
    /// Bearer API key (Bedrock API keys)
    pub api_key: String,
    /// AWS region, e.g. us-east-1
    pub region: String,
    /// Endpoint override; defaults to the regional runtime endpoint
    pub base_url: Option<String>,
    /// Default model id, e.g. anthropic.claude-3-haiku-20240307-v1:0
    pub default_model: String,
    pub default_temperature: f32,
    pub default_max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            region: "us-east-1".to_string(),
            base_url: None,
            default_model: "anthropic.claude-3-haiku-20240307-v1:0".to_string(),
            default_temperature: 0.7,
            default_max_tokens: 4096,
            timeout_secs: 60,
        }
    }
}

impl BedrockConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Read `AWS_BEDROCK_API_KEY`, `AWS_REGION` and `BEDROCK_MODEL` from the
    /// environment.
    pub fn from_env() -> Self {
        let mut cfg = Self {
            api_key: std::env::var("AWS_BEDROCK_API_KEY").unwrap_or_default(),
            ..Default::default()
        };
        if let Ok(region) = std::env::var("AWS_REGION") {
            cfg.region = region;
        }
        if let Ok(model) = std::env::var("BEDROCK_MODEL") {
            cfg.default_model = model;
        }
        cfg
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
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

    fn endpoint(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| {
            format!("https://bedrock-runtime.{}.amazonaws.com", self.region)
        })
    }
}

/// Bedrock provider
pub struct BedrockProvider {
    client: reqwest::Client,
    config: BedrockConfig,
}

impl BedrockProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_config(BedrockConfig::new(api_key))
    }

    pub fn from_env() -> Self {
        Self::with_config(BedrockConfig::from_env())
    }

    pub fn with_config(config: BedrockConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    /// Converse wants system prompts separated from the turn list, and
    /// alternating user/assistant turns.
    fn convert_messages(messages: &[ChatMessage]) -> (Vec<serde_json::Value>, Vec<serde_json::Value>) {
        let mut system = Vec::new();
        let mut turns = Vec::new();
        for msg in messages {
            match msg.role {
                Role::System => system.push(serde_json::json!({"text": msg.content})),
                Role::User => turns.push(serde_json::json!({
                    "role": "user",
                    "content": [{"text": msg.content}],
                })),
                Role::Assistant => turns.push(serde_json::json!({
                    "role": "assistant",
                    "content": [{"text": msg.content}],
                })),
            }
        }
        (system, turns)
    }

    fn convert_stop_reason(reason: &str) -> FinishReason {
        match reason {
            "end_turn" | "stop_sequence" => FinishReason::Stop,
            "max_tokens" => FinishReason::Length,
            "content_filtered" => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        }
    }

    fn map_error(err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            ProviderError::Network(err.to_string())
        } else {
            ProviderError::Api {
                code: None,
                message: err.to_string(),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseOutput {
    message: Option<ConverseMessage>,
}

#[derive(Debug, Deserialize)]
struct ConverseMessage {
    content: Vec<ConverseContent>,
}

#[derive(Debug, Deserialize)]
struct ConverseContent {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseUsage {
    input_tokens: u32,
    output_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseResponse {
    output: Option<ConverseOutput>,
    stop_reason: Option<String>,
    usage: Option<ConverseUsage>,
}

#[async_trait]
impl InferenceProvider for BedrockProvider {
    fn name(&self) -> &str {
        "bedrock"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Cloud
    }

    fn is_available(&self) -> bool {
        !self.config.api_key.is_empty() && !self.config.region.is_empty()
    }

    async fn complete(&self, request: CompletionRequest) -> ProviderResult<CompletionResponse> {
        let (system, turns) = Self::convert_messages(&request.messages);
        let model = request
            .model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.config.default_model.clone());
        let prompt_chars: usize = request.messages.iter().map(|m| m.content.len()).sum();

        let mut body = serde_json::json!({
            "messages": turns,
            "inferenceConfig": {
                "temperature": request
                    .temperature
                    .unwrap_or(self.config.default_temperature),
                "maxTokens": request
                    .max_tokens
                    .unwrap_or(self.config.default_max_tokens),
            }
        });
        if !system.is_empty() {
            body["system"] = serde_json::json!(system);
        }

        let url = format!(
            "{}/model/{}/converse",
            self.config.endpoint().trim_end_matches('/'),
            model
        );

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_error)?;

        let status = resp.status();
        let text = resp.text().await.map_err(Self::map_error)?;

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ProviderError::Auth(text));
        }
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited(text));
        }
        if !status.is_success() {
            return Err(ProviderError::Api {
                code: Some(status.as_u16().to_string()),
                message: text,
            });
        }

        let parsed: ConverseResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Serialization(e.to_string()))?;

        let content = parsed
            .output
            .and_then(|o| o.message)
            .map(|m| {
                m.content
                    .into_iter()
                    .filter_map(|c| c.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_else(|| TokenUsage::approximate(prompt_chars, content.len()));

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("region".to_string(), serde_json::json!(self.config.region));

        Ok(CompletionResponse {
            content,
            backend: "bedrock".to_string(),
            model,
            usage,
            finish_reason: parsed.stop_reason.as_deref().map(Self::convert_stop_reason),
            metadata,
        })
    }

    async fn stream(&self, _request: CompletionRequest) -> ProviderResult<ChunkStream> {
        Err(ProviderError::Unsupported {
            backend: "bedrock".to_string(),
            operation: "stream".to_string(),
        })
    }
}
