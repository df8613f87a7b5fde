//! Core types shared by the routing subsystem
//!
//! Defines the message/response shapes exchanged with inference backends,
//! the tier and data-classification vocabulary used by the router, and the
//! two-layer error taxonomy (backend-scoped vs router-scoped).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Messages
// ============================================================================

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message (configures model behavior)
    System,
    /// User message
    #[default]
    User,
    /// Assistant (model) response
    Assistant,
}

/// Chat message
///
/// Immutable once constructed; text-only — multimodal content is handled by
/// collaborators outside this subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Completion request handed to a backend adapter
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Message list
    pub messages: Vec<ChatMessage>,
    /// Model override; `None` resolves through the tier table / adapter default
    pub model: Option<String>,
    /// Temperature parameter
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Backend-specific extra options, passed through opaquely
    pub extra: HashMap<String, serde_json::Value>,
}

impl CompletionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message
    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Add a system message
    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::system(content));
        self
    }

    /// Add a user message
    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::user(content));
        self
    }

    /// Set the model identifier
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set temperature
    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    /// Set maximum tokens
    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    /// Attach a backend-specific option
    pub fn option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Total character count of all message contents; input to the token
    /// approximation when a backend does not report usage.
    pub fn prompt_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.len()).sum()
    }
}

/// Batch embedding request
#[derive(Debug, Clone, Default)]
pub struct EmbeddingRequest {
    pub texts: Vec<String>,
    pub model: Option<String>,
    pub extra: HashMap<String, serde_json::Value>,
}

impl EmbeddingRequest {
    pub fn new(texts: Vec<String>) -> Self {
        Self {
            texts,
            ..Default::default()
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Token usage reported (or approximated) for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Character-based approximation (~4 chars per token for English text)
    /// for backends that do not report usage. Rough budget enforcement only.
    pub fn approximate(prompt_chars: usize, completion_chars: usize) -> Self {
        Self::new(
            (prompt_chars / CHARS_PER_TOKEN) as u32,
            (completion_chars / CHARS_PER_TOKEN) as u32,
        )
    }
}

/// Heuristic ratio used by [`TokenUsage::approximate`].
pub(crate) const CHARS_PER_TOKEN: usize = 4;

/// Why a completion stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Completed normally
    Stop,
    /// Length limit reached
    Length,
    /// Content filtered
    ContentFilter,
    /// Backend-side error terminated the stream
    Error,
}

/// Non-streaming completion response
///
/// `backend` and `model` are the *resolved* identifiers — what actually
/// served the request after fallback, not what the caller asked for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub backend: String,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: Option<FinishReason>,
    /// Free-form backend metadata (response ids, fingerprints, region, ...)
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Incremental chunk of a streaming completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub content: String,
    pub backend: String,
    pub model: String,
    /// Set on the final chunk of the sequence
    pub finish_reason: Option<FinishReason>,
}

/// Embedding usage statistics
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EmbeddingUsage {
    pub prompt_tokens: u32,
    pub total_tokens: u32,
}

/// Batch embedding response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub vectors: Vec<Vec<f32>>,
    pub backend: String,
    pub model: String,
    pub usage: EmbeddingUsage,
}

// ============================================================================
// Tiers and data classification
// ============================================================================

/// Quality/cost class of model requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Best-quality, high-cost
    Sota,
    /// Cheaper, faster
    #[default]
    CostEffective,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Sota => write!(f, "sota"),
            Tier::CostEffective => write!(f, "cost_effective"),
        }
    }
}

/// Data-sensitivity classification attached to a request
///
/// `Internal` and `Confidential` payloads must never leave the premises:
/// the router restricts their candidate chain to local backends regardless
/// of explicit backend choice or breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataClassification {
    Public,
    General,
    Internal,
    Confidential,
}

impl DataClassification {
    /// True iff this classification may only be served by a local backend
    pub fn requires_local(&self) -> bool {
        matches!(self, Self::Internal | Self::Confidential)
    }
}

impl std::fmt::Display for DataClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::General => write!(f, "general"),
            Self::Internal => write!(f, "internal"),
            Self::Confidential => write!(f, "confidential"),
        }
    }
}

// ============================================================================
// Error types
// ============================================================================

/// Backend-scoped error
///
/// Every adapter wraps its transport/SDK failures in this enum; no
/// backend-specific error type leaks past the adapter boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// API error
    #[error("API error: {message} (code: {code:?})")]
    Api {
        code: Option<String>,
        message: String,
    },
    /// Authentication error
    #[error("Authentication failed: {0}")]
    Auth(String),
    /// Rate limit exceeded
    #[error("Rate limited: {0}")]
    RateLimited(String),
    /// Network error
    #[error("Network error: {0}")]
    Network(String),
    /// Request timeout
    #[error("Request timeout: {0}")]
    Timeout(String),
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Operation not implemented by this backend
    #[error("Backend {backend} does not support {operation}")]
    Unsupported { backend: String, operation: String },
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Backend-scoped result type
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Router-scoped error — the subsystem's wire format toward collaborators
#[derive(Debug, Clone, thiserror::Error)]
pub enum RouterError {
    /// A backend call failed; recovered by fallback unless it was the last
    /// viable candidate.
    #[error("provider {backend} failed: {source}")]
    Provider {
        backend: String,
        #[source]
        source: ProviderError,
    },
    /// Backend was never successfully registered
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Admission-control rejection from the budget breaker
    #[error("budget exceeded: ${spent:.2} of ${limit:.2} monthly limit")]
    BudgetExceeded { spent: f64, limit: f64 },
    /// Terminal: the whole candidate chain was exhausted
    #[error("all providers failed; attempted: [{}]", .attempted.join(", "))]
    AllProvidersFailed { attempted: Vec<String> },
    /// Missing (backend, tier) entry in the model tier table
    #[error("no model tier entry for backend '{backend}' tier '{tier}'")]
    ModelNotFound { backend: String, tier: Tier },
    /// Configuration loading/validation error
    #[error("configuration error: {0}")]
    Config(String),
}

impl RouterError {
    /// Stable machine-readable code; the HTTP collaborator maps these to
    /// status codes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Provider { .. } => "provider_error",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::AllProvidersFailed { .. } => "all_providers_failed",
            Self::ModelNotFound { .. } => "model_not_found",
            Self::Config(_) => "config_error",
        }
    }
}

/// Router-scoped result type
pub type RouterResult<T> = Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = CompletionRequest::new()
            .system("You are a financial analyst.")
            .user("Summarize the filing.")
            .temperature(0.2)
            .max_tokens(512);

        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.temperature, Some(0.2));
        assert_eq!(req.max_tokens, Some(512));
        assert!(req.model.is_none());
    }

    #[test]
    fn test_token_usage_approximation() {
        let usage = TokenUsage::approximate(400, 120);
        assert_eq!(usage.prompt_tokens, 100);
        assert_eq!(usage.completion_tokens, 30);
        assert_eq!(usage.total_tokens, 130);
    }

    #[test]
    fn test_classification_residency() {
        assert!(DataClassification::Confidential.requires_local());
        assert!(DataClassification::Internal.requires_local());
        assert!(!DataClassification::General.requires_local());
        assert!(!DataClassification::Public.requires_local());
    }

    #[test]
    fn test_tier_serde_names() {
        assert_eq!(serde_json::to_string(&Tier::Sota).unwrap(), "\"sota\"");
        assert_eq!(
            serde_json::to_string(&Tier::CostEffective).unwrap(),
            "\"cost_effective\""
        );
        assert_eq!(Tier::CostEffective.to_string(), "cost_effective");
    }

    #[test]
    fn test_error_codes_are_stable() {
        let err = RouterError::AllProvidersFailed {
            attempted: vec!["azure".into(), "ollama".into()],
        };
        assert_eq!(err.code(), "all_providers_failed");
        assert!(err.to_string().contains("azure, ollama"));

        let err = RouterError::BudgetExceeded {
            spent: 480.0,
            limit: 500.0,
        };
        assert_eq!(err.code(), "budget_exceeded");
        assert!(err.to_string().contains("480.00"));
        assert!(err.to_string().contains("500.00"));
    }
}
